//! Spreadsheet builder: generates a Lua program for the sandbox.

use std::sync::Arc;

use async_trait::async_trait;

use super::{generate_code, require_description, QueryBuilder, QueryContext};
use crate::ai::{GenerativeProvider, Prompt};
use crate::error::{CoreError, CoreResult};
use crate::sandbox::CodeExecutor;

const PROGRAM_RULES: &str = "The program runs in a restricted Lua 5.4 interpreter. \
Only the table, string, math and utf8 libraries exist; there is no os, io, require or print.\n\
Read rows with the global `accessor`:\n\n\
    local rows = accessor.getData(\"Sheet1\")\n\n\
getData returns an array of records keyed by the sheet's header row. Every cell value is \
a string, or nil when the cell is empty; convert with tonumber where you compare numbers.\n\
The globals `page` and `pageSize` hold the requested 1-based page window.\n\n\
Ensure the program:\n\
1. Reads data from the correct sheet(s) using accessor.getData(sheetName).\n\
2. Applies the filters, sorting and aggregation described by the user.\n\
3. Ends with `return { data = <rows of the requested page>, total = <count of all matching rows> }`.\n\
Return only Lua code, with no comments, explanation or markdown.\n\
Do not assume anything about the data beyond what the analysis shows.";

/// Generates Lua programs against the spreadsheet data accessor.
pub struct SheetQueryBuilder {
    generator: Arc<dyn GenerativeProvider>,
    sandbox: Arc<dyn CodeExecutor>,
}

impl SheetQueryBuilder {
    pub fn new(generator: Arc<dyn GenerativeProvider>, sandbox: Arc<dyn CodeExecutor>) -> Self {
        Self { generator, sandbox }
    }

    pub(crate) fn prompt(&self, description: &str, context: &QueryContext) -> Prompt {
        let system = format!(
            "You are an expert developer that writes Lua programs to query Google Sheets data.\n\
             This is the {} of the spreadsheet: {}\n\n{}",
            context.label(),
            context.to_prompt_json(),
            PROGRAM_RULES,
        );

        Prompt::new().system(system).user(format!(
            "Generate a Lua program based on the following description: {}",
            description
        ))
    }
}

#[async_trait]
impl QueryBuilder for SheetQueryBuilder {
    fn name(&self) -> &'static str {
        "google_sheet_query_builder"
    }

    async fn generate_query(&self, description: &str, context: &QueryContext) -> CoreResult<String> {
        let description = require_description(description)?;
        let prompt = self.prompt(description, context);

        let program = generate_code(self.generator.as_ref(), &prompt).await?;
        self.sandbox.check_syntax(&program)?;
        if !program.contains("getData") {
            return Err(CoreError::QueryGeneration(
                "generated program never reads sheet data".into(),
            ));
        }
        Ok(program)
    }
}
