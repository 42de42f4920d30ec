//! Out-of-band execution of a session's buffer.
//!
//! The [`Dispatcher`] looks up the strategy for the buffer's language and
//! runs it in a throwaway child process under a wall-clock budget. Every
//! outcome, including failures of the sandbox itself, comes back as an
//! [`ExecutionResult`].

mod config;
mod dispatcher;
mod error;
mod languages;
mod process;
mod result;
mod strategy;
mod transpile;

pub use config::*;
pub use dispatcher::Dispatcher;
pub use error::{SandboxError, TranslationError};
pub use languages::{InterpreterStrategy, ScriptContextStrategy, TranspiledStrategy};
pub use process::{ProcessReport, Termination};
pub use result::{ExecutionResult, NO_OUTPUT};
pub use strategy::{ExecutionStrategy, RunContext};
pub use transpile::transpile;
pub use tokio_util::sync::CancellationToken;
