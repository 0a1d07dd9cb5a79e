//! In-memory stand-ins for the live collaborators.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use quarry::ai::{AiClients, AiResponse, Embedder, GenerativeProvider, OutputFormat, Prompt, ProviderError};
use quarry::config::{ConnectionConfig, DocumentScope, Settings};
use quarry::source::{ChunkRetriever, SheetConnector, SheetSource, SourceError};
use quarry::{CoreContext, CoreError, CoreResult};

/// Replays canned completions in order and records every prompt.
#[derive(Default)]
pub struct FakeProvider {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl FakeProvider {
    pub fn replying<I, S>(responses: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GenerativeProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        format: OutputFormat,
    ) -> Result<AiResponse, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let raw = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Transport("no canned response left".into()))?;
        AiResponse::from_raw(&raw, format)
    }
}

/// Embeds every text as the same short vector.
#[derive(Default)]
pub struct FakeEmbedder {
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.1, 0.2, 0.3])
    }
}

/// Spreadsheet held in memory, sheet title -> rows.
#[derive(Default)]
pub struct MemorySheets {
    sheets: BTreeMap<String, Vec<Vec<String>>>,
    reads: AtomicUsize,
}

impl MemorySheets {
    pub fn with_sheet(mut self, title: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        self.sheets.insert(title.to_string(), rows);
        self
    }

    /// Number of `values` calls served.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Split `'Sheet 1'!A1:Z10` into the title and the last row.
fn parse_range(range: &str) -> (String, Option<usize>) {
    let (sheet, cells) = range.rsplit_once('!').unwrap_or((range, ""));
    let title = sheet
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace("''", "'"))
        .unwrap_or_else(|| sheet.to_string());
    let last_row = cells
        .rsplit(':')
        .next()
        .map(|end| end.trim_start_matches(|c: char| c.is_ascii_alphabetic()))
        .and_then(|digits| digits.parse().ok());
    (title, last_row)
}

#[async_trait]
impl SheetSource for MemorySheets {
    async fn sheet_titles(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.sheets.keys().cloned().collect())
    }

    async fn values(&self, range: &str) -> Result<Vec<Vec<String>>, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let (title, last_row) = parse_range(range);
        let rows = self
            .sheets
            .get(&title)
            .ok_or_else(|| SourceError::Invalid(format!("Unable to parse range: {}", range)))?;
        Ok(rows.iter().take(last_row.unwrap_or(usize::MAX)).cloned().collect())
    }
}

/// Hands out one shared [`MemorySheets`] for any config naming a spreadsheet.
pub struct MemoryConnector {
    pub sheets: Arc<MemorySheets>,
}

impl MemoryConnector {
    pub fn new(sheets: MemorySheets) -> Arc<Self> {
        Arc::new(Self {
            sheets: Arc::new(sheets),
        })
    }
}

#[async_trait]
impl SheetConnector for MemoryConnector {
    async fn connect(&self, config: &ConnectionConfig) -> CoreResult<Arc<dyn SheetSource>> {
        let id = config.require_spreadsheet_id()?;
        if id == "unreachable" {
            return Err(CoreError::Connection("spreadsheet not found".into()));
        }
        Ok(self.sheets.clone())
    }
}

/// Returns fixed chunks and records the scopes it was asked for.
#[derive(Default)]
pub struct FakeRetriever {
    chunks: Vec<String>,
    unreachable: bool,
    scopes: Mutex<Vec<DocumentScope>>,
}

impl FakeRetriever {
    pub fn with_chunks(chunks: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        })
    }

    /// Fails every lookup the way an index that refuses connections does.
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            unreachable: true,
            ..Self::default()
        })
    }

    pub fn scopes(&self) -> Vec<DocumentScope> {
        self.scopes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChunkRetriever for FakeRetriever {
    async fn nearest_chunks(
        &self,
        scope: &DocumentScope,
        _embedding: &[f32],
        top_k: u32,
    ) -> Result<Vec<String>, SourceError> {
        self.scopes.lock().unwrap().push(scope.clone());
        if self.unreachable {
            let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
            return Err(SourceError::from(sqlx::Error::Io(refused)).connecting());
        }
        Ok(self.chunks.iter().take(top_k as usize).cloned().collect())
    }
}

/// Context with default settings, the given provider and no live services.
pub fn context(provider: Arc<FakeProvider>) -> CoreContext {
    context_with(Settings::default(), provider, Arc::new(FakeEmbedder::default()))
}

pub fn context_with(
    settings: Settings,
    provider: Arc<FakeProvider>,
    embedder: Arc<FakeEmbedder>,
) -> CoreContext {
    let ai = AiClients {
        generator: provider,
        embedder,
    };
    CoreContext::new(settings, ai).unwrap()
}

pub fn sheet_config() -> ConnectionConfig {
    ConnectionConfig::google_sheet("", "sheet-1")
}
