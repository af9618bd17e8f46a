//! tablet — an embeddable, single-process relational data store.
//!
//! A small SQL dialect over typed row tables. Each table persists to a
//! directory as two JSON documents (schema + rows) written atomically, and
//! an optional session layer scopes row visibility by owning user. The
//! engine is single-threaded and synchronous: every statement validates,
//! mutates, and persists before it returns.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod parser;
pub mod storage;

pub use db::{Database, QueryOutput};
pub use error::{Result, TabletError};
pub use storage::{Row, Value};
