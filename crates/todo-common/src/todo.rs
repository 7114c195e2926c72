use serde::{Deserialize, Serialize};

/// A row of the todo list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    pub text: String,
    pub completed: bool,
}

/// Input of `todo.create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTodoInput {
    pub text: String,
}

impl CreateTodoInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Blank or whitespace-only text is never stored
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Input of `todo.toggle`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleTodoInput {
    pub id: i64,
    pub completed: bool,
}

/// Input of `todo.delete`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTodoInput {
    pub id: i64,
}
