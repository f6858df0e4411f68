//! Configuration sources, in ascending precedence: file, then environment.

pub mod config_file;
pub mod environment;
