//! Transient MongoDB clients.

use std::time::Duration;

use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, Credential};
use mongodb::{Client, Database};
use serde_json::Value;
use tracing::debug;

use super::{bounded, SourceError};
use crate::config::ConnectionConfig;

/// A MongoDB client bound to the database named in the URI.
pub struct MongoSource {
    client: Client,
    database: Database,
    query_budget: Duration,
}

impl MongoSource {
    /// Parse the URI and build a client.
    ///
    /// The driver connects lazily; the first command proves reachability.
    pub async fn open(
        config: &ConnectionConfig,
        connect_budget: Duration,
        query_budget: Duration,
    ) -> Result<Self, SourceError> {
        let mut options =
            bounded(connect_budget, ClientOptions::parse(&config.connection_string)).await?;
        options.connect_timeout = Some(connect_budget);
        options.server_selection_timeout = Some(connect_budget);

        if options.credential.is_none() {
            if let (Some(username), Some(password)) = (&config.username, &config.password) {
                options.credential = Some(
                    Credential::builder()
                        .username(username.clone())
                        .password(password.clone())
                        .build(),
                );
            }
        }

        let client = Client::with_options(options)?;
        let database = client.default_database().ok_or_else(|| {
            SourceError::Invalid("MongoDB connection string must name a database".into())
        })?;

        debug!(database = database.name(), "mongodb client ready");
        Ok(Self {
            client,
            database,
            query_budget,
        })
    }

    pub async fn ping(&self) -> Result<(), SourceError> {
        bounded(self.query_budget, self.database.run_command(doc! { "ping": 1 })).await?;
        Ok(())
    }

    pub async fn collection_names(&self) -> Result<Vec<String>, SourceError> {
        let mut names = bounded(self.query_budget, self.database.list_collection_names()).await?;
        names.sort();
        Ok(names)
    }

    /// One document from `collection`, if it has any.
    pub async fn sample_one(&self, collection: &str) -> Result<Option<Document>, SourceError> {
        let coll = self.database.collection::<Document>(collection);
        bounded(self.query_budget, coll.find_one(doc! {})).await
    }

    pub async fn count(&self, collection: &str, filter: Document) -> Result<u64, SourceError> {
        let coll = self.database.collection::<Document>(collection);
        bounded(self.query_budget, coll.count_documents(filter)).await
    }

    /// Find with executor-applied skip/limit, as relaxed extended JSON.
    pub async fn find_page(
        &self,
        collection: &str,
        filter: Document,
        projection: Document,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Value>, SourceError> {
        let coll = self.database.collection::<Document>(collection);
        let limit = i64::try_from(limit)
            .map_err(|_| SourceError::Invalid(format!("page size {} too large", limit)))?;

        let find = coll
            .find(filter)
            .projection(projection)
            .skip(skip)
            .limit(limit);
        let docs = bounded(self.query_budget, async {
            let cursor = find.await?;
            cursor.try_collect::<Vec<Document>>().await
        })
        .await?;

        Ok(docs
            .into_iter()
            .map(|d| Bson::Document(d).into_relaxed_extjson())
            .collect())
    }

    /// Release the client's connections.
    pub async fn close(self) {
        self.client.shutdown().await;
    }
}

/// Convert a JSON object (extended JSON accepted) into a BSON document.
pub fn json_to_document(value: &Value) -> Result<Document, SourceError> {
    match Bson::try_from(value.clone()) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(_) => Err(SourceError::Invalid("expected a JSON object".into())),
        Err(e) => Err(SourceError::Invalid(e.to_string())),
    }
}
