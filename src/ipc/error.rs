use rusqlite::ErrorCode;
use serde_json::json;
use thiserror::Error;

use crate::actor::ActorError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadParams(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{message}")]
    Conflict { table: &'static str, message: String },
    #[error("select a workspace first")]
    NoWorkspace,
    #[error(transparent)]
    Actor(#[from] ActorError),
    #[error(transparent)]
    Query(#[from] rusqlite::Error),
    #[error("{message}")]
    Update { table: &'static str, message: String },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
    #[error("{message}")]
    Io { path: String, message: String },
}

impl HandlerError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::BadParams(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn io(path: impl Into<String>, e: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.into(),
            message: e.to_string(),
        }
    }

    /// Maps a failed write on `table`; constraint violations surface as
    /// `conflict` so callers can tell a duplicate key from a broken database.
    pub fn update(table: &'static str) -> impl FnOnce(rusqlite::Error) -> HandlerError {
        move |e| match &e {
            rusqlite::Error::SqliteFailure(f, msg) if f.code == ErrorCode::ConstraintViolation => {
                HandlerError::Conflict {
                    table,
                    message: msg.clone().unwrap_or_else(|| f.to_string()),
                }
            }
            _ => HandlerError::Update {
                table,
                message: e.to_string(),
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::BadParams(_) | HandlerError::Actor(_) => "bad_params",
            HandlerError::NotFound(_) => "not_found",
            HandlerError::Forbidden(_) => "forbidden",
            HandlerError::Conflict { .. } => "conflict",
            HandlerError::NoWorkspace => "no_workspace",
            HandlerError::Query(_) | HandlerError::Storage(_) => "db_query_failed",
            HandlerError::Update { .. } => "db_update_failed",
            HandlerError::Io { .. } => "io_failed",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            HandlerError::Conflict { table, .. } | HandlerError::Update { table, .. } => {
                Some(json!({ "table": table }))
            }
            HandlerError::Io { path, .. } => Some(json!({ "path": path })),
            _ => None,
        }
    }

    pub fn response(&self, id: &str) -> serde_json::Value {
        err(id, self.code(), self.to_string(), self.details())
    }
}
