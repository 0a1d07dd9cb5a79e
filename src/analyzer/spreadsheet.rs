//! Google Sheets schema inference from a sample window.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::SchemaAnalyzer;
use crate::config::{ConnectionConfig, SheetSettings};
use crate::error::{CoreError, CoreResult};
use crate::schema::{Column, NormalizedSchema, PrimitiveType};
use crate::source::{SheetConnector, SheetSource};

/// Analyzer for spreadsheets.
pub struct SheetSchemaAnalyzer {
    connector: Arc<dyn SheetConnector>,
    settings: SheetSettings,
}

impl SheetSchemaAnalyzer {
    pub fn new(connector: Arc<dyn SheetConnector>, settings: SheetSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    async fn analyze(&self, source: &dyn SheetSource) -> CoreResult<NormalizedSchema> {
        let titles = source
            .sheet_titles()
            .await
            .map_err(|e| CoreError::Connection(e.to_string()))?;
        if titles.is_empty() {
            return Err(CoreError::Schema("No sheets found in the spreadsheet".into()));
        }

        let mut schema = NormalizedSchema::new();
        for title in titles {
            let rows = source
                .values(&self.settings.sample_range(&title))
                .await
                .map_err(|e| CoreError::Schema(format!("reading sheet '{}': {}", title, e)))?;

            if rows.len() < 2 {
                warn!(sheet = %title, "sheet has no data rows, skipping");
                continue;
            }
            for column in columns_from_sample(&rows) {
                schema.push_column(title.as_str(), column);
            }
        }
        Ok(schema)
    }
}

/// Header row names the columns; the rows below it decide the types.
pub(crate) fn columns_from_sample(rows: &[Vec<String>]) -> Vec<Column> {
    let Some((headers, samples)) = rows.split_first() else {
        return Vec::new();
    };

    headers
        .iter()
        .enumerate()
        .filter(|(_, header)| !header.trim().is_empty())
        .map(|(idx, header)| {
            let cells = samples
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""));
            Column::new(header.as_str(), PrimitiveType::infer_from_cells(cells))
        })
        .collect()
}

#[async_trait]
impl SchemaAnalyzer for SheetSchemaAnalyzer {
    fn name(&self) -> &'static str {
        "google_sheet_schema_analyzer"
    }

    async fn fetch_schema(&self, config: &ConnectionConfig) -> CoreResult<NormalizedSchema> {
        let source = self.connector.connect(config).await?;
        let schema = self.analyze(source.as_ref()).await?;
        info!(sheets = schema.len(), "schema captured");
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_columns_from_sample() {
        let sample = rows(&[
            &["region", "units", "shipped", "note"],
            &["north", "12", "TRUE"],
            &["south", "7.5", "false", "late"],
        ]);
        let columns = columns_from_sample(&sample);
        let types: Vec<(&str, PrimitiveType)> = columns
            .iter()
            .map(|c| (c.name.as_str(), c.data_type))
            .collect();
        assert_eq!(
            types,
            vec![
                ("region", PrimitiveType::String),
                ("units", PrimitiveType::Number),
                ("shipped", PrimitiveType::Boolean),
                ("note", PrimitiveType::String),
            ]
        );
    }

    #[test]
    fn test_blank_headers_are_dropped() {
        let sample = rows(&[&["id", "", "name"], &["1", "x", "a"]]);
        let names: Vec<String> = columns_from_sample(&sample)
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["id", "name"]);
    }
}
