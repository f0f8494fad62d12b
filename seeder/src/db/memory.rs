//! In-memory store with a fixed schema, standing in for a live cluster in tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{InsertSummary, Record, Store, Value, WriteError, filter_record};

#[derive(Default)]
pub struct MemoryStore {
    schema: HashMap<String, HashSet<String>>,
    rows: Mutex<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, columns: &[&str]) -> Self {
        self.schema.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    /// The chat tables with the same columns the seeder writes.
    pub fn chat_schema() -> Self {
        Self::new()
            .with_table(
                "users",
                &["user_id", "username", "name", "email", "phone_number", "profile_picture_url"],
            )
            .with_table("chats", &["chat_id", "name", "chat_picture_url"])
            .with_table("chatmembersassociation", &["chat_id", "user_id"])
            .with_table(
                "messages",
                &["message_id", "chat_id", "author_id", "text", "send_at", "updated_at"],
            )
            .with_table("attachments", &["attachment_id", "attachment_url"])
            .with_table("messageattachmentassociation", &["attachment_id", "message_id"])
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.rows
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn try_insert_row(
        &self,
        table: &str,
        record: &Record,
    ) -> Result<InsertSummary, WriteError> {
        let existing = self
            .schema
            .get(table)
            .ok_or_else(|| WriteError::TableNotFound(table.to_string()))?;
        let (kept, dropped) = filter_record(self.name(), table, record, existing)?;
        let columns_written = kept.len();

        self.rows
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(kept);

        Ok(InsertSummary {
            columns_written,
            dropped_columns: dropped,
        })
    }

    async fn get_column(&self, table: &str, column: &str) -> Vec<Value> {
        if !self.schema.get(table).is_some_and(|c| c.contains(column)) {
            return Vec::new();
        }
        self.rows(table)
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
            .collect()
    }
}
