use crate::process::{run_isolated, ProcessReport, ProcessSpec};
use crate::strategy::{ExecutionStrategy, RunContext};
use crate::SandboxError;
use async_trait::async_trait;
use codepad_system::Language;

const BOOTSTRAP_NAME: &str = "bootstrap.py";
const BOOTSTRAP: &str = include_str!("bootstrap.py");

/// Fresh `python3` process per run, configured by a bootstrap that narrows
/// builtins and imports and counts executed lines.
pub struct InterpreterStrategy {
    python_bin: String,
    allowed_modules: String,
}

impl InterpreterStrategy {
    pub fn new(python_bin: impl Into<String>, allowed_modules: &[String]) -> Self {
        Self {
            python_bin: python_bin.into(),
            allowed_modules: allowed_modules.join(","),
        }
    }
}

#[async_trait]
impl ExecutionStrategy for InterpreterStrategy {
    fn language(&self) -> Language {
        Language::Python
    }

    fn interpreter(&self) -> &str {
        &self.python_bin
    }

    async fn run(&self, program: &str, ctx: &RunContext) -> Result<ProcessReport, SandboxError> {
        let spec = ProcessSpec {
            program: &self.python_bin,
            // Isolated mode, no site packages, no bytecode files, unbuffered.
            args: vec![
                "-I".to_owned(),
                "-S".to_owned(),
                "-B".to_owned(),
                "-u".to_owned(),
                BOOTSTRAP_NAME.to_owned(),
                self.allowed_modules.clone(),
                ctx.limits.step_budget.to_string(),
            ],
            stdin: program,
            files: vec![(BOOTSTRAP_NAME, BOOTSTRAP)],
            memory_limit: Some(ctx.limits.memory_bytes),
            process_limit: Some(ctx.limits.max_processes),
        };
        run_isolated(spec, &ctx.limits, &ctx.cancel).await
    }
}
