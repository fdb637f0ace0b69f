//! Fixtures shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    backend::{BoundCommand, CommandExecutor, RowCursor},
    document::{Document, DocumentExt, Identity},
    error::DocumentStoreResult,
    value::{DbValue, Row},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub first_name: String,
    pub user_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Person {
    pub fn new(first_name: &str, user_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            user_name: user_name.to_string(),
            tags: Vec::new(),
        }
    }
}

impl Document for Person {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn collection_name() -> &'static str {
        "people"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

impl Document for Tag {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn collection_name() -> &'static str {
        "tags"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub body: String,
}

impl Document for Note {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn collection_name() -> &'static str {
        "notes"
    }
}

/// Executor answering every query with its seeded rows, filtered by id for
/// id lookups, and recording every command and table it receives.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    rows: Mutex<Vec<Row>>,
    commands: Mutex<Vec<BoundCommand>>,
    ensured: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn with_documents(people: &[Person]) -> Self {
        let rows = people
            .iter()
            .map(|person| {
                Row::new(vec![
                    person.id.to_db(),
                    DbValue::from(person.to_body().unwrap()),
                    DbValue::Null,
                ])
            })
            .collect();

        Self {
            rows: Mutex::new(rows),
            commands: Mutex::default(),
            ensured: Mutex::default(),
        }
    }

    pub fn commands(&self) -> Vec<BoundCommand> {
        self.commands.lock().clone()
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().len()
    }

    /// Tables passed to `ensure_table`, in call order.
    pub fn ensured_tables(&self) -> Vec<String> {
        self.ensured.lock().clone()
    }

    fn respond(&self, command: &BoundCommand) -> RowCursor {
        self.commands.lock().push(command.clone());

        let rows = self.rows.lock().clone();
        let rows: Vec<Row> = if command.sql.contains("d.id") && command.params.len() > 1 {
            let ids = &command.params[1..];
            rows.into_iter()
                .filter(|row| row.get(0).is_ok_and(|id| ids.contains(id)))
                .collect()
        } else {
            rows
        };

        Box::new(rows.into_iter().map(Ok))
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    fn execute(&self, command: &BoundCommand) -> DocumentStoreResult<RowCursor> {
        Ok(self.respond(command))
    }

    async fn execute_async(&self, command: &BoundCommand) -> DocumentStoreResult<RowCursor> {
        Ok(self.respond(command))
    }

    fn execute_batch(&self, commands: &[BoundCommand]) -> DocumentStoreResult<()> {
        self.commands
            .lock()
            .extend(commands.iter().cloned());
        Ok(())
    }

    async fn execute_batch_async(&self, commands: &[BoundCommand]) -> DocumentStoreResult<()> {
        self.execute_batch(commands)
    }

    fn explain(&self, command: &BoundCommand) -> DocumentStoreResult<String> {
        Ok(format!("SCAN d ({} parameters)", command.params.len()))
    }

    fn ensure_table(&self, table: &str) -> DocumentStoreResult<()> {
        self.ensured.lock().push(table.to_string());
        Ok(())
    }
}
