use std::collections::HashMap;

use aws_config::SdkConfig;
use aws_sdk_dynamodb::{
    types::{AttributeValue, Delete, Put, TransactWriteItem},
    Client,
};
use serde_dynamo::{from_item, from_items, to_item};

use super::{Document, StoreError, StoreResult, Transaction, WriteKind};

/// DynamoDB backed store. Every table uses a string hash key named `id`.
#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub async fn get<T: Document>(&self, id: &str) -> StoreResult<Option<T>> {
        let resp = self
            .client
            .get_item()
            .table_name(T::TABLE)
            .key("id", AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await?;

        Ok(resp.item.map(from_item).transpose()?)
    }

    pub async fn list<T: Document>(&self) -> StoreResult<Vec<T>> {
        let mut out = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let resp = self
                .client
                .scan()
                .table_name(T::TABLE)
                .set_exclusive_start_key(start_key)
                .send()
                .await?;

            let docs: Vec<T> = from_items(resp.items().to_vec())?;
            out.extend(docs);

            match resp.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(out)
    }

    pub async fn commit(&self, tx: Transaction) -> StoreResult<()> {
        let mut items = Vec::new();

        for w in tx.into_writes() {
            let item = match w.kind {
                WriteKind::Insert(doc) => TransactWriteItem::builder()
                    .put(
                        Put::builder()
                            .table_name(w.table)
                            .set_item(Some(to_item(doc)?))
                            .condition_expression("attribute_not_exists(id)")
                            .build()?,
                    )
                    .build(),
                WriteKind::Update { expected, doc } => TransactWriteItem::builder()
                    .put(
                        Put::builder()
                            .table_name(w.table)
                            .set_item(Some(to_item(doc)?))
                            .condition_expression("version = :v")
                            .expression_attribute_values(
                                ":v",
                                AttributeValue::N(expected.to_string()),
                            )
                            .build()?,
                    )
                    .build(),
                WriteKind::Delete { expected } => TransactWriteItem::builder()
                    .delete(
                        Delete::builder()
                            .table_name(w.table)
                            .key("id", AttributeValue::S(w.id.clone()))
                            .condition_expression("version = :v")
                            .expression_attribute_values(
                                ":v",
                                AttributeValue::N(expected.to_string()),
                            )
                            .build()?,
                    )
                    .build(),
            };
            items.push(item);
        }

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_transaction_canceled_exception() => {
                    StoreError::Conflict(se.to_string())
                }
                _ => StoreError::from(e),
            })?;

        Ok(())
    }
}
