//! Todo persistence
//!
//! Every operation is a single statement; nothing spans several writes.

use sqlx::SqlitePool;
use todo_common::todo::{CreateTodoInput, Todo};
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, sqlx::FromRow)]
struct TodoRow {
    id: i64,
    text: String,
    completed: bool,
}

impl From<TodoRow> for Todo {
    fn from(row: TodoRow) -> Self {
        Todo {
            id: row.id,
            text: row.text,
            completed: row.completed,
        }
    }
}

pub struct TodoStore {
    pool: SqlitePool,
}

impl TodoStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All todos in insertion order
    pub async fn list(&self) -> Result<Vec<Todo>> {
        let rows: Vec<TodoRow> =
            sqlx::query_as("SELECT id, text, completed FROM todos ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(Todo::from).collect())
    }

    /// Insert a new, not yet completed todo
    pub async fn create(&self, input: CreateTodoInput) -> Result<Todo> {
        if input.is_blank() {
            return Err(Error::TodoTextEmpty);
        }

        let row: TodoRow = sqlx::query_as(
            "INSERT INTO todos (text, completed) VALUES (?, 0) RETURNING id, text, completed",
        )
        .bind(&input.text)
        .fetch_one(&self.pool)
        .await?;

        info!("[Todo] Created #{}", row.id);
        Ok(row.into())
    }

    /// Set `completed` to exactly `completed`
    pub async fn set_completed(&self, id: i64, completed: bool) -> Result<Todo> {
        let row: Option<TodoRow> = sqlx::query_as(
            "UPDATE todos SET completed = ? WHERE id = ? RETURNING id, text, completed",
        )
        .bind(completed)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or(Error::TodoNotFound { id })?;
        info!("[Todo] #{} completed = {}", id, completed);
        Ok(row.into())
    }

    /// Remove a todo, returning the removed row
    pub async fn delete(&self, id: i64) -> Result<Todo> {
        let row: Option<TodoRow> =
            sqlx::query_as("DELETE FROM todos WHERE id = ? RETURNING id, text, completed")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let row = row.ok_or(Error::TodoNotFound { id })?;
        info!("[Todo] Deleted #{}", id);
        Ok(row.into())
    }
}
