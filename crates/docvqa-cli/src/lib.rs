//! # docvqa-cli
//!
//! Command-line entry points and the HTTP transport for the legal
//! document question-answering runtime.

pub mod cli;
pub mod commands;
pub mod server;

pub use cli::{Cli, Command};
pub use server::{create_router, AppError, AppState};
