use crate::process::{ProcessReport, Termination};
use crate::{ExecutionResult, Limits, SandboxError, TranslationError};
use async_trait::async_trait;
use codepad_system::{Language, RunStatus};
use std::borrow::Cow;
use tokio_util::sync::CancellationToken;

/// Exit codes the bootstraps use to report how a run failed.
pub const EXIT_SYNTAX_ERROR: i32 = 65;
pub const EXIT_RUNTIME_ERROR: i32 = 66;
pub const EXIT_STEP_LIMIT: i32 = 67;

pub struct RunContext {
    pub limits: Limits,
    pub cancel: CancellationToken,
}

/// One way of executing a language's source in a child process.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn language(&self) -> Language;

    /// Interpreter binary the strategy spawns.
    fn interpreter(&self) -> &str;

    fn compile<'a>(&self, source: &'a str) -> Result<Cow<'a, str>, TranslationError> {
        Ok(Cow::Borrowed(source))
    }

    async fn run(&self, program: &str, ctx: &RunContext) -> Result<ProcessReport, SandboxError>;
}

/// Maps a finished process onto the uniform result.
pub fn classify(report: ProcessReport, limits: &Limits) -> ExecutionResult {
    let ProcessReport {
        termination,
        stdout,
        stderr,
        elapsed,
    } = report;
    let status = match termination {
        Termination::TimedOut => return ExecutionResult::timed_out(stdout, limits.timeout, elapsed),
        Termination::Cancelled => return ExecutionResult::cancelled(stdout, elapsed),
        Termination::Exited(status) => status,
    };
    if status.success() {
        return ExecutionResult::completed(stdout, elapsed);
    }

    let (run_status, fallback) = match status.code() {
        Some(EXIT_SYNTAX_ERROR) => (RunStatus::SyntaxError, "Syntax error".to_owned()),
        Some(EXIT_RUNTIME_ERROR) => (RunStatus::RuntimeError, "Runtime error".to_owned()),
        Some(EXIT_STEP_LIMIT) => (
            RunStatus::StepLimitExceeded,
            "Execution exceeded its step budget".to_owned(),
        ),
        Some(code) => (
            RunStatus::RuntimeError,
            format!("Process exited with status {}", code),
        ),
        None => (
            RunStatus::RuntimeError,
            "Process was terminated by a signal".to_owned(),
        ),
    };
    let stderr = stderr.trim_end();
    let error = if stderr.is_empty() {
        fallback
    } else {
        stderr.to_owned()
    };
    ExecutionResult::failed(run_status, stdout, error, elapsed)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::time::Duration;

    fn report(termination: Termination, stdout: &str, stderr: &str) -> ProcessReport {
        ProcessReport {
            termination,
            stdout: stdout.to_owned(),
            stderr: stderr.to_owned(),
            elapsed: Duration::from_millis(5),
        }
    }

    fn exited(code: i32) -> Termination {
        Termination::Exited(ExitStatusExt::from_raw(code << 8))
    }

    #[test]
    fn it_maps_exit_codes() {
        let limits = Limits::default();
        let ok = classify(report(exited(0), "1\n", ""), &limits);
        assert_eq!(ok.status, RunStatus::Completed);
        assert_eq!(ok.output, "1\n");

        let syntax = classify(report(exited(65), "", "SyntaxError: bad\n"), &limits);
        assert_eq!(syntax.status, RunStatus::SyntaxError);
        assert_eq!(syntax.error.as_deref(), Some("SyntaxError: bad"));

        let steps = classify(report(exited(67), "partial", ""), &limits);
        assert_eq!(steps.status, RunStatus::StepLimitExceeded);
        assert_eq!(steps.output, "partial");

        let other = classify(report(exited(3), "", ""), &limits);
        assert_eq!(other.status, RunStatus::RuntimeError);
        assert_eq!(other.error.as_deref(), Some("Process exited with status 3"));
    }

    #[test]
    fn signals_are_runtime_errors() {
        let killed = Termination::Exited(ExitStatusExt::from_raw(9));
        let result = classify(report(killed, "", ""), &Limits::default());
        assert_eq!(result.status, RunStatus::RuntimeError);
        assert_eq!(
            result.error.as_deref(),
            Some("Process was terminated by a signal")
        );
    }

    #[test]
    fn timeouts_report_the_budget() {
        let limits = Limits {
            timeout: Duration::from_millis(1500),
            ..Limits::default()
        };
        let result = classify(report(Termination::TimedOut, "tick\n", ""), &limits);
        assert_eq!(result.status, RunStatus::TimedOut);
        assert_eq!(result.output, "tick\n");
        assert_eq!(
            result.error.as_deref(),
            Some("Execution timed out after 1500ms")
        );
    }
}
