use crate::process::{run_isolated, ProcessReport, ProcessSpec};
use crate::strategy::{ExecutionStrategy, RunContext};
use crate::SandboxError;
use async_trait::async_trait;
use codepad_system::Language;

const BOOTSTRAP_NAME: &str = "script_context.js";
const BOOTSTRAP: &str = include_str!("script_context.js");

/// Fresh `node` process per run; the buffer executes inside a new `vm`
/// context that only exposes a capturing `console`.
pub struct ScriptContextStrategy {
    node_bin: String,
}

impl ScriptContextStrategy {
    pub fn new(node_bin: impl Into<String>) -> Self {
        Self {
            node_bin: node_bin.into(),
        }
    }

    pub(crate) async fn execute(
        &self,
        program: &str,
        ctx: &RunContext,
    ) -> Result<ProcessReport, SandboxError> {
        let spec = ProcessSpec {
            program: &self.node_bin,
            args: vec![
                "--disallow-code-generation-from-strings".to_owned(),
                "--max-old-space-size=128".to_owned(),
                BOOTSTRAP_NAME.to_owned(),
            ],
            stdin: program,
            files: vec![(BOOTSTRAP_NAME, BOOTSTRAP)],
            // V8 reserves far more address space than it uses, and its
            // threads count against RLIMIT_NPROC.
            memory_limit: None,
            process_limit: None,
        };
        run_isolated(spec, &ctx.limits, &ctx.cancel).await
    }
}

#[async_trait]
impl ExecutionStrategy for ScriptContextStrategy {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn interpreter(&self) -> &str {
        &self.node_bin
    }

    async fn run(&self, program: &str, ctx: &RunContext) -> Result<ProcessReport, SandboxError> {
        self.execute(program, ctx).await
    }
}
