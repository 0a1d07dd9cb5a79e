//! Shared collaborators handed to every factory.

use std::sync::Arc;

use tracing::debug;

use crate::ai::{AiClients, Embedder, GenerativeProvider};
use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::sandbox::{CodeExecutor, LuaSandbox};
use crate::source::{ChunkRetriever, GoogleSheetsConnector, PgVectorRetriever, SheetConnector};

/// Injected dependencies for analyzers, validators, builders and executors.
///
/// Factories stay pure functions of [`crate::config::BackendKind`]; the
/// collaborators an implementation needs are cloned out of this context.
#[derive(Clone)]
pub struct CoreContext {
    pub settings: Arc<Settings>,
    pub generator: Arc<dyn GenerativeProvider>,
    pub embedder: Arc<dyn Embedder>,
    pub sheets: Arc<dyn SheetConnector>,
    pub retriever: Option<Arc<dyn ChunkRetriever>>,
    pub sandbox: Arc<dyn CodeExecutor>,
}

impl CoreContext {
    /// Context with the default live collaborators.
    pub fn new(settings: Settings, ai: AiClients) -> CoreResult<Self> {
        let sheets = GoogleSheetsConnector::new(settings.execution.query_timeout())?;
        let sandbox = LuaSandbox::new(settings.sandbox.clone());

        let retriever: Option<Arc<dyn ChunkRetriever>> = match settings
            .retrieval
            .resolved_database_url()
            .map_err(|e| CoreError::InvalidConfig(e.to_string()))?
        {
            Some(url) => Some(Arc::new(PgVectorRetriever::new(
                url,
                settings.execution.connect_timeout(),
                settings.execution.query_timeout(),
            ))),
            None => {
                debug!("no vector index configured; document queries are unavailable");
                None
            }
        };

        Ok(Self {
            settings: Arc::new(settings),
            generator: ai.generator,
            embedder: ai.embedder,
            sheets: Arc::new(sheets),
            retriever,
            sandbox: Arc::new(sandbox),
        })
    }

    pub fn with_sheet_connector(mut self, sheets: Arc<dyn SheetConnector>) -> Self {
        self.sheets = sheets;
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn ChunkRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn CodeExecutor>) -> Self {
        self.sandbox = sandbox;
        self
    }
}
