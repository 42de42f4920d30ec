use super::ScriptContextStrategy;
use crate::process::ProcessReport;
use crate::strategy::{ExecutionStrategy, RunContext};
use crate::transpile::transpile;
use crate::{SandboxError, TranslationError};
use async_trait::async_trait;
use codepad_system::Language;
use std::borrow::Cow;

/// Types are erased up front; what remains runs exactly like javascript.
pub struct TranspiledStrategy {
    inner: ScriptContextStrategy,
}

impl TranspiledStrategy {
    pub fn new(node_bin: impl Into<String>) -> Self {
        Self {
            inner: ScriptContextStrategy::new(node_bin),
        }
    }
}

#[async_trait]
impl ExecutionStrategy for TranspiledStrategy {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn interpreter(&self) -> &str {
        self.inner.interpreter()
    }

    fn compile<'a>(&self, source: &'a str) -> Result<Cow<'a, str>, TranslationError> {
        transpile(source).map(Cow::Owned)
    }

    async fn run(&self, program: &str, ctx: &RunContext) -> Result<ProcessReport, SandboxError> {
        self.inner.execute(program, ctx).await
    }
}
