use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabletError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TabletError>;
