/// Database and collection handles
///
/// Handles are lightweight named references into a client. Constructing one
/// never touches the network and never fails; names are only validated by
/// the server once a command is actually issued.
use bson::{doc, Document};
use tracing::debug;

use crate::client::command;
use crate::client::Client;
use crate::error::PuenteResult;

/// A named database scoped to a client
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    name: String,
}

impl Database {
    pub(crate) fn new(client: Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    /// Name of this database
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a handle to a collection within this database
    pub fn get_collection(&self, name: impl Into<String>) -> Collection {
        Collection::new(self.clone(), name)
    }

    /// Execute an arbitrary command document against this database
    ///
    /// The command is sent to the database's `$cmd` collection; the result
    /// document is returned once the server reports success.
    pub async fn run_command(&self, command_doc: Document) -> PuenteResult<Document> {
        let connection = self.client.connection().await?;
        let reply = connection.execute(&self.name, command_doc).await?;
        command::check_reply(reply)
    }
}

/// A named collection scoped to a database
#[derive(Debug, Clone)]
pub struct Collection {
    database: Database,
    name: String,
}

impl Collection {
    pub(crate) fn new(database: Database, name: impl Into<String>) -> Self {
        Self {
            database,
            name: name.into(),
        }
    }

    /// Name of this collection
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified `database.collection` name
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database.name(), self.name)
    }

    /// Count all documents in the collection
    pub async fn count(&self) -> PuenteResult<u64> {
        self.count_command(None).await
    }

    /// Count documents matching a query filter
    pub async fn count_with_query(&self, filter: Document) -> PuenteResult<u64> {
        self.count_command(Some(filter)).await
    }

    async fn count_command(&self, filter: Option<Document>) -> PuenteResult<u64> {
        let mut command_doc = doc! { "count": self.name.clone() };
        if let Some(filter) = filter {
            command_doc.insert("query", filter);
        }

        let result = self.database.run_command(command_doc).await?;
        let count = command::extract_count(&result)?;
        debug!("Counted {} document(s) in {}", count, self.full_name());
        Ok(count)
    }
}
