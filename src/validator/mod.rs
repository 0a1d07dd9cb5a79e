//! Connection validators.
//!
//! A validator runs the cheapest liveness check a backend offers and reports
//! a plain `bool`. Every error is absorbed and logged; nothing propagates to
//! the caller. Opened resources are released before returning.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{BackendKind, ConnectionConfig, ExecutionSettings};
use crate::context::CoreContext;
use crate::error::{CoreError, CoreResult};
use crate::source::{MongoSource, RelationalConnection, SheetConnector, SourceError};
use crate::sql::{Dialect, SqlDialect};

/// Checks that a data source is reachable with the given credentials.
#[async_trait]
pub trait ConnectionValidator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn validate_connection(&self, config: &ConnectionConfig) -> bool;
}

fn report(validator: &'static str, result: CoreResult<()>) -> bool {
    match result {
        Ok(()) => {
            debug!(validator, "connection ok");
            true
        }
        Err(e) => {
            warn!(validator, error = %e, "connection check failed");
            false
        }
    }
}

/// Connect and ping a SQL server.
pub struct RelationalConnectionValidator {
    dialect: Dialect,
    execution: ExecutionSettings,
}

impl RelationalConnectionValidator {
    pub fn new(dialect: Dialect, execution: ExecutionSettings) -> Self {
        Self { dialect, execution }
    }

    async fn ping(&self, config: &ConnectionConfig) -> CoreResult<()> {
        let mut conn =
            RelationalConnection::open(self.dialect, config, self.execution.connect_timeout())
                .await
                .map_err(SourceError::on_connect)?;
        let result = conn.ping(self.execution.connect_timeout()).await;
        conn.close().await;
        result.map_err(SourceError::on_connect)
    }
}

#[async_trait]
impl ConnectionValidator for RelationalConnectionValidator {
    fn name(&self) -> &'static str {
        match self.dialect {
            Dialect::Postgres => "postgres_connection_validator",
            Dialect::MySql => "mysql_connection_validator",
        }
    }

    async fn validate_connection(&self, config: &ConnectionConfig) -> bool {
        debug!(dialect = self.dialect.name(), "checking connection");
        report(self.name(), self.ping(config).await)
    }
}

/// Run `ping` against the URI's database.
pub struct DocumentConnectionValidator {
    execution: ExecutionSettings,
}

impl DocumentConnectionValidator {
    pub fn new(execution: ExecutionSettings) -> Self {
        Self { execution }
    }

    async fn ping(&self, config: &ConnectionConfig) -> CoreResult<()> {
        let budget = self.execution.connect_timeout();
        let source = MongoSource::open(config, budget, budget)
            .await
            .map_err(SourceError::on_connect)?;
        let result = source.ping().await;
        source.close().await;
        result.map_err(SourceError::on_connect)
    }
}

#[async_trait]
impl ConnectionValidator for DocumentConnectionValidator {
    fn name(&self) -> &'static str {
        "mongodb_connection_validator"
    }

    async fn validate_connection(&self, config: &ConnectionConfig) -> bool {
        report(self.name(), self.ping(config).await)
    }
}

/// Fetch spreadsheet metadata.
pub struct SheetConnectionValidator {
    connector: Arc<dyn SheetConnector>,
}

impl SheetConnectionValidator {
    pub fn new(connector: Arc<dyn SheetConnector>) -> Self {
        Self { connector }
    }

    async fn ping(&self, config: &ConnectionConfig) -> CoreResult<()> {
        let source = self.connector.connect(config).await?;
        let titles = source
            .sheet_titles()
            .await
            .map_err(|e| CoreError::Connection(e.to_string()))?;
        debug!(sheets = titles.len(), "spreadsheet reachable");
        Ok(())
    }
}

#[async_trait]
impl ConnectionValidator for SheetConnectionValidator {
    fn name(&self) -> &'static str {
        "google_sheet_connection_validator"
    }

    async fn validate_connection(&self, config: &ConnectionConfig) -> bool {
        report(self.name(), self.ping(config).await)
    }
}

/// Select the validator for `kind`.
pub fn validator_for(
    kind: BackendKind,
    ctx: &CoreContext,
) -> CoreResult<Box<dyn ConnectionValidator>> {
    let validator: Box<dyn ConnectionValidator> = match kind {
        BackendKind::Postgres | BackendKind::MySql => {
            let dialect = Dialect::for_kind(kind)
                .ok_or_else(|| CoreError::unsupported(kind, "connection validator"))?;
            Box::new(RelationalConnectionValidator::new(
                dialect,
                ctx.settings.execution.clone(),
            ))
        }
        BackendKind::MongoDb => Box::new(DocumentConnectionValidator::new(
            ctx.settings.execution.clone(),
        )),
        BackendKind::GoogleSheet => Box::new(SheetConnectionValidator::new(ctx.sheets.clone())),
        BackendKind::ImportedPdf => {
            return Err(CoreError::unsupported(kind, "connection validator"))
        }
    };
    Ok(validator)
}
