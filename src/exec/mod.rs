// src/exec/mod.rs

//! Process execution for tasks declared in the TOML front-end.

pub mod command;

pub use command::{run_shell, shell_action};
