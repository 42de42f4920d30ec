use std::io;

pub use crate::transpile::TranslationError;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare the run directory: {0}")]
    Workspace(#[source] io::Error),
    #[error("failed to wait for the interpreter: {0}")]
    Wait(#[source] io::Error),
}
