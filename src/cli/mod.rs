//! CLI module for autoheal

pub mod args;

pub use args::{Args, Commands, FailureArgs, Verbosity};
