// src/config/mod.rs

//! Build description loaded from TOML.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: read a file and turn it into a validated [`ConfigFile`].
//! - `validate.rs`: semantic checks (unknown tasks, duplicate targets,
//!   cycles).
//! - `specs.rs`: conversion into [`TaskSpec`](crate::task::TaskSpec)s.

pub mod loader;
pub mod model;
pub mod specs;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_and_validate};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, TaskConfig};
pub use specs::to_task_specs;
