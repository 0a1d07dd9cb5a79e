//! Data source connection configuration.
//!
//! A [`ConnectionConfig`] carries everything a backend needs to be reached.
//! Which fields matter depends on the [`BackendKind`]:
//!
//! - Relational kinds: `connection_string` shaped `host:port/database`,
//!   plus `username`/`password`
//! - MongoDB: `connection_string` is a `mongodb://` URI
//! - Google Sheets: `connection_string` holds service-account JSON (or is
//!   empty when `api_key` is used), `spreadsheet_id` names the document
//! - Imported PDF: `document` scopes retrieval to a tenant and file

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

static RELATIONAL_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:/]+):(\d+)/(.+)$").expect("valid regex"));

/// Supported data source technologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// PostgreSQL (and Postgres-compatible hosts such as Supabase)
    Postgres,
    /// MySQL
    MySql,
    /// MongoDB
    MongoDb,
    /// Google Sheets spreadsheet
    GoogleSheet,
    /// PDF ingested into the vector index
    ImportedPdf,
}

impl BackendKind {
    /// Every backend kind, in declaration order.
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Postgres,
        BackendKind::MySql,
        BackendKind::MongoDb,
        BackendKind::GoogleSheet,
        BackendKind::ImportedPdf,
    ];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::MySql => "mysql",
            BackendKind::MongoDb => "mongodb",
            BackendKind::GoogleSheet => "google_sheet",
            BackendKind::ImportedPdf => "imported_pdf",
        }
    }

    /// Whether the kind speaks SQL.
    pub fn is_relational(&self) -> bool {
        matches!(self, BackendKind::Postgres | BackendKind::MySql)
    }

    /// Whether schema analysis applies to this kind.
    ///
    /// Imported PDFs have no schema; their "schema" is the embedding index.
    pub fn has_schema(&self) -> bool {
        !matches!(self, BackendKind::ImportedPdf)
    }

    /// Default port for network backends.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            BackendKind::Postgres => Some(5432),
            BackendKind::MySql => Some(3306),
            BackendKind::MongoDb => Some(27017),
            BackendKind::GoogleSheet | BackendKind::ImportedPdf => None,
        }
    }
}

impl FromStr for BackendKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "supabase" => Ok(BackendKind::Postgres),
            "mysql" => Ok(BackendKind::MySql),
            "mongodb" | "mongo" => Ok(BackendKind::MongoDb),
            "google_sheet" | "googlesheet" | "spreadsheet" => Ok(BackendKind::GoogleSheet),
            "imported_pdf" | "pdf" => Ok(BackendKind::ImportedPdf),
            other => Err(CoreError::unsupported(other, "backend kind")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant and document a retrieval is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentScope {
    /// Owning account.
    pub owner: String,
    /// Ingested file name.
    pub file_name: String,
}

/// Connection parameters for a data source.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Kind-specific connection string.
    #[serde(default)]
    pub connection_string: String,
    /// Username (relational and MongoDB).
    #[serde(default)]
    pub username: Option<String>,
    /// Password (relational and MongoDB).
    #[serde(default)]
    pub password: Option<String>,
    /// API key (Google Sheets without a service account).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Spreadsheet document id.
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    /// Retrieval scope for imported documents.
    #[serde(default)]
    pub document: Option<DocumentScope>,
}

impl ConnectionConfig {
    /// Config for a relational server reached at `host:port/database`.
    pub fn relational(
        connection_string: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            connection_string: connection_string.into(),
            username: Some(username.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    /// Config for a MongoDB URI.
    pub fn mongodb(uri: impl Into<String>) -> Self {
        Self {
            connection_string: uri.into(),
            ..Default::default()
        }
    }

    /// Config for a Google Sheets document.
    pub fn google_sheet(credentials: impl Into<String>, spreadsheet_id: impl Into<String>) -> Self {
        Self {
            connection_string: credentials.into(),
            spreadsheet_id: Some(spreadsheet_id.into()),
            ..Default::default()
        }
    }

    /// Config for an imported document.
    pub fn imported_document(owner: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            document: Some(DocumentScope {
                owner: owner.into(),
                file_name: file_name.into(),
            }),
            ..Default::default()
        }
    }

    /// Parse the relational `host:port/database` target.
    pub fn relational_target(&self) -> CoreResult<RelationalTarget> {
        RelationalTarget::parse(&self.connection_string)
    }

    /// The spreadsheet id, or an error if absent.
    pub fn require_spreadsheet_id(&self) -> CoreResult<&str> {
        self.spreadsheet_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| CoreError::InvalidConfig("spreadsheet id is missing".to_string()))
    }

    /// The document scope, or an error if absent.
    pub fn require_document(&self) -> CoreResult<&DocumentScope> {
        self.document
            .as_ref()
            .filter(|d| !d.owner.is_empty() && !d.file_name.is_empty())
            .ok_or_else(|| {
                CoreError::InvalidConfig("owner and file name are required for documents".into())
            })
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("ConnectionConfig")
            .field("connection_string", &self.connection_string)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("api_key", &redact(&self.api_key))
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("document", &self.document)
            .finish()
    }
}

/// Parsed relational endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl RelationalTarget {
    /// Parse `host:port/database`.
    pub fn parse(s: &str) -> CoreResult<Self> {
        let caps = RELATIONAL_TARGET.captures(s.trim()).ok_or_else(|| {
            CoreError::InvalidConfig(format!(
                "expected connection string shaped host:port/database, got '{}'",
                s
            ))
        })?;

        let port = caps[2]
            .parse()
            .map_err(|_| CoreError::InvalidConfig(format!("port out of range: {}", &caps[2])))?;

        Ok(Self {
            host: caps[1].to_string(),
            port,
            database: caps[3].to_string(),
        })
    }
}
