//! Document persistence.
//!
//! Users, books and orders are stored as whole documents keyed by `id`. Every
//! document carries a `version`; updates and deletes only apply when the
//! stored version still matches the one that was read, so two requests racing
//! on the same document cannot silently overwrite each other. All writes that
//! belong together go through a single [`Transaction`] and are applied
//! atomically by [`Database::commit`].

use aws_sdk_dynamodb::{
    error::SdkError,
    operation::{
        get_item::GetItemError, scan::ScanError, transact_write_items::TransactWriteItemsError,
    },
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub mod dynamo;
pub mod memory;

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Conditional write failed: {0}")]
    Conflict(String),
    #[error("DynamoDB Error: GetItem: {0}")]
    DynamoDBGetError(#[from] SdkError<GetItemError>),
    #[error("DynamoDB Error: Scan: {0}")]
    DynamoDBScanError(#[from] SdkError<ScanError>),
    #[error("DynamoDB Error: TransactWriteItems: {0}")]
    DynamoDBTransactWriteItemsError(#[from] SdkError<TransactWriteItemsError>),
    #[error("Failed to build transaction: {0}")]
    TransactionBuildError(#[from] aws_sdk_dynamodb::error::BuildError),
    #[error("SerdeDynamo failed to process DynamoDB data: {0}")]
    SerdeDynamoError(#[from] serde_dynamo::Error),
    #[error("Failed to process document: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("{0}")]
    Backend(String),
}

/// A record stored in its own table.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const TABLE: &'static str;

    fn id(&self) -> &str;
    fn version(&self) -> u64;
    fn version_mut(&mut self) -> &mut u64;
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    /// Fails if a document with the same id exists.
    Insert(Value),
    /// Fails unless the stored version equals `expected`.
    Update { expected: u64, doc: Value },
    /// Fails unless the stored version equals `expected`.
    Delete { expected: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub table: &'static str,
    pub id: String,
    pub kind: WriteKind,
}

#[derive(Debug, Default)]
pub struct Transaction {
    writes: Vec<Write>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Document>(mut self, doc: &T) -> StoreResult<Self> {
        self.writes.push(Write {
            table: T::TABLE,
            id: doc.id().to_string(),
            kind: WriteKind::Insert(serde_json::to_value(doc)?),
        });
        Ok(self)
    }

    /// Queues a conditional overwrite of `doc` and bumps its version in place.
    pub fn update<T: Document>(mut self, doc: &mut T) -> StoreResult<Self> {
        let expected = doc.version();
        *doc.version_mut() = expected + 1;
        self.writes.push(Write {
            table: T::TABLE,
            id: doc.id().to_string(),
            kind: WriteKind::Update {
                expected,
                doc: serde_json::to_value(&*doc)?,
            },
        });
        Ok(self)
    }

    pub fn delete<T: Document>(mut self, doc: &T) -> StoreResult<Self> {
        self.writes.push(Write {
            table: T::TABLE,
            id: doc.id().to_string(),
            kind: WriteKind::Delete {
                expected: doc.version(),
            },
        });
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

#[derive(Clone)]
pub enum Database {
    Memory(MemoryStore),
    Dynamo(DynamoStore),
}

impl Database {
    pub async fn get<T: Document>(&self, id: &str) -> StoreResult<Option<T>> {
        match self {
            Self::Memory(store) => store.get(id).await,
            Self::Dynamo(store) => store.get(id).await,
        }
    }

    /// Loads every document of the table.
    pub async fn list<T: Document>(&self) -> StoreResult<Vec<T>> {
        match self {
            Self::Memory(store) => store.list().await,
            Self::Dynamo(store) => store.list().await,
        }
    }

    pub async fn commit(&self, tx: Transaction) -> StoreResult<()> {
        if tx.is_empty() {
            return Ok(());
        }
        match self {
            Self::Memory(store) => store.commit(tx).await,
            Self::Dynamo(store) => store.commit(tx).await,
        }
    }

    pub async fn insert<T: Document>(&self, doc: &T) -> StoreResult<()> {
        self.commit(Transaction::new().insert(doc)?).await
    }

    pub async fn save<T: Document>(&self, doc: &mut T) -> StoreResult<()> {
        self.commit(Transaction::new().update(doc)?).await
    }
}
