// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuilddagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("target '{target}' of task '{task}' is already produced by task '{existing}'")]
    DuplicateTarget {
        target: String,
        existing: String,
        task: String,
    },

    #[error("task '{0}' is already declared")]
    DuplicateTask(String),

    #[error("task '{task}' depends on '{dep}', which is neither a task nor an existing file")]
    UnknownDependency { task: String, dep: String },

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BuilddagError>;
