//! Quarry CLI - query live data sources in natural language
//!
//! Usage:
//!   quarry test-connection --kind <kind> [connection flags]
//!   quarry analyze --kind <kind> [connection flags]
//!   quarry generate --kind <kind> [connection flags] --description <text> [--schema <file.json>]
//!   quarry run --kind <kind> [connection flags] --artifact <text> [--page N] [--page-size N]
//!
//! Examples:
//!   quarry analyze --kind postgres -c db:5432/sales -u admin -p secret
//!   quarry generate --kind mongodb -c mongodb://localhost/app -d "users who signed up this week"
//!   quarry run --kind mysql -c db:3306/shop -u app --artifact "SELECT * FROM orders" --page 2

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use quarry::ai::provider_from_settings;
use quarry::analyzer::analyzer_for;
use quarry::builder::{builder_for, QueryContext};
use quarry::config::{BackendKind, ConnectionConfig, DocumentScope, Settings};
use quarry::executor::{executor_for, Pagination};
use quarry::schema::NormalizedSchema;
use quarry::validator::validator_for;
use quarry::{CoreContext, CoreError, CoreResult};

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Quarry - natural-language queries over heterogeneous data sources")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to QUARRY_CONFIG, ./quarry.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a data source is reachable
    TestConnection {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Capture the normalized schema of a data source
    Analyze {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Generate a query artifact from a description
    Generate {
        #[command(flatten)]
        source: SourceArgs,

        /// What to query, in natural language
        #[arg(short, long)]
        description: String,

        /// Previously captured schema JSON (analyzes the source when omitted)
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Semantic layer JSON used instead of the schema
        #[arg(long, conflicts_with = "schema")]
        semantic_layer: Option<PathBuf>,
    },

    /// Execute a query artifact and print one page of results
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Artifact text
        #[arg(long, conflicts_with = "artifact_file", required_unless_present = "artifact_file")]
        artifact: Option<String>,

        /// File holding the artifact text
        #[arg(long)]
        artifact_file: Option<PathBuf>,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u64,

        /// Rows per page
        #[arg(long, default_value_t = 10)]
        page_size: u64,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Backend kind (postgres, mysql, mongodb, google_sheet, imported_pdf)
    #[arg(short, long)]
    kind: BackendKind,

    /// Connection string (host:port/db, mongodb:// URI or service-account JSON)
    #[arg(short, long, env = "QUARRY_CONNECTION_STRING", default_value = "")]
    connection_string: String,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long, env = "QUARRY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Google API key for sheets without a service account
    #[arg(long, env = "QUARRY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long)]
    spreadsheet_id: Option<String>,

    /// Owning account of an imported document
    #[arg(long, requires = "file_name")]
    owner: Option<String>,

    /// File name of an imported document
    #[arg(long, requires = "owner")]
    file_name: Option<String>,
}

impl SourceArgs {
    fn config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connection_string: self.connection_string.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            api_key: self.api_key.clone(),
            spreadsheet_id: self.spreadsheet_id.clone(),
            document: match (&self.owner, &self.file_name) {
                (Some(owner), Some(file_name)) => Some(DocumentScope {
                    owner: owner.clone(),
                    file_name: file_name.clone(),
                }),
                _ => None,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quarry=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = match load_context(cli.config.as_ref()) {
        Ok(ctx) => ctx,
        Err(e) => return report(e),
    };

    let result = match cli.command {
        Commands::TestConnection { source } => cmd_test_connection(&ctx, source).await,
        Commands::Analyze { source } => cmd_analyze(&ctx, source).await,
        Commands::Generate {
            source,
            description,
            schema,
            semantic_layer,
        } => cmd_generate(&ctx, source, description, schema, semantic_layer).await,
        Commands::Run {
            source,
            artifact,
            artifact_file,
            page,
            page_size,
        } => cmd_run(&ctx, source, artifact, artifact_file, page, page_size).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => report(e),
    }
}

fn report(e: CoreError) -> ExitCode {
    eprintln!("Error [{}]: {}", e.kind_label(), e);
    ExitCode::FAILURE
}

fn load_context(path: Option<&PathBuf>) -> CoreResult<CoreContext> {
    let settings = match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
    .map_err(|e| CoreError::InvalidConfig(e.to_string()))?;

    let ai = provider_from_settings(&settings.ai)?;
    CoreContext::new(settings, ai)
}

fn print_json<T: Serialize>(value: &T) -> CoreResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CoreError::InvalidConfig(format!("cannot render output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn read_file(path: &PathBuf) -> CoreResult<String> {
    fs::read_to_string(path).map_err(|e| {
        CoreError::InvalidConfig(format!("Error reading file '{}': {}", path.display(), e))
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> CoreResult<T> {
    serde_json::from_str(&read_file(path)?).map_err(|e| {
        CoreError::InvalidConfig(format!("'{}' is not valid JSON: {}", path.display(), e))
    })
}

async fn cmd_test_connection(ctx: &CoreContext, source: SourceArgs) -> CoreResult<ExitCode> {
    let validator = validator_for(source.kind, ctx)?;
    let ok = validator.validate_connection(&source.config()).await;
    print_json(&serde_json::json!({ "kind": source.kind, "reachable": ok }))?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn cmd_analyze(ctx: &CoreContext, source: SourceArgs) -> CoreResult<ExitCode> {
    let schema = analyzer_for(source.kind, ctx)?
        .fetch_schema(&source.config())
        .await?;
    print_json(&schema)?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_generate(
    ctx: &CoreContext,
    source: SourceArgs,
    description: String,
    schema: Option<PathBuf>,
    semantic_layer: Option<PathBuf>,
) -> CoreResult<ExitCode> {
    let context = match (semantic_layer, schema) {
        (Some(path), _) => QueryContext::SemanticLayer(read_json(&path)?),
        (None, Some(path)) => QueryContext::Schema(read_json(&path)?),
        (None, None) if !source.kind.has_schema() => QueryContext::Schema(NormalizedSchema::new()),
        (None, None) => QueryContext::Schema(
            analyzer_for(source.kind, ctx)?
                .fetch_schema(&source.config())
                .await?,
        ),
    };

    let artifact = builder_for(source.kind, ctx)?
        .generate_query(&description, &context)
        .await?;
    println!("{}", artifact);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_run(
    ctx: &CoreContext,
    source: SourceArgs,
    artifact: Option<String>,
    artifact_file: Option<PathBuf>,
    page: u64,
    page_size: u64,
) -> CoreResult<ExitCode> {
    let artifact = match (artifact, artifact_file) {
        (Some(text), _) => text,
        (None, Some(path)) => read_file(&path)?,
        (None, None) => return Err(CoreError::InvalidConfig("no artifact given".into())),
    };
    let pagination = Pagination::new(page, page_size)?;

    let result = executor_for(source.kind, ctx)?
        .execute_query(&artifact, &source.config(), pagination)
        .await?;
    print_json(&result)?;
    Ok(ExitCode::SUCCESS)
}
