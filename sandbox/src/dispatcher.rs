use crate::languages::{InterpreterStrategy, ScriptContextStrategy, TranspiledStrategy};
use crate::process::interpreter_available;
use crate::strategy::{classify, ExecutionStrategy, RunContext};
use crate::{ExecutionResult, Limits, SandboxConfig};
use codepad_system::{Language, RunStatus};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Routes a run to the strategy registered for its language.
///
/// Every run gets its own process; nothing is reused between runs, and no
/// failure escapes as an `Err`. At most `max_concurrent_runs` interpreters
/// are alive at once; later runs queue for a permit.
pub struct Dispatcher {
    strategies: HashMap<Language, Box<dyn ExecutionStrategy>>,
    limits: Limits,
    permits: Semaphore,
}

impl Dispatcher {
    /// Dispatcher with no strategies; every run is `unavailable`.
    pub fn empty(limits: Limits) -> Self {
        Self {
            strategies: HashMap::new(),
            permits: Semaphore::new(limits.max_concurrent_runs.max(1)),
            limits,
        }
    }

    pub fn new(config: &SandboxConfig) -> Self {
        Self::empty(config.limits.clone())
            .with_strategy(ScriptContextStrategy::new(config.node_bin.clone()))
            .with_strategy(TranspiledStrategy::new(config.node_bin.clone()))
            .with_strategy(InterpreterStrategy::new(
                config.python_bin.clone(),
                &config.python_modules,
            ))
    }

    pub fn with_strategy<S: ExecutionStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.insert(strategy.language(), Box::new(strategy));
        self
    }

    pub async fn run(&self, language: &str, source: &str) -> ExecutionResult {
        self.run_with_cancel(language, source, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        language: &str,
        source: &str,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let strategy = match language
            .parse::<Language>()
            .ok()
            .and_then(|lang| self.strategies.get(&lang))
        {
            Some(strategy) => strategy,
            None => {
                log::debug!("no strategy for {:?}", language);
                return ExecutionResult::unavailable(language);
            }
        };

        let started = Instant::now();
        let program = match strategy.compile(source) {
            Ok(program) => program,
            Err(e) => {
                return ExecutionResult::failed(
                    RunStatus::TranslationError,
                    String::new(),
                    e.to_string(),
                    started.elapsed(),
                )
            }
        };

        let _permit = tokio::select! {
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    return ExecutionResult::failed(
                        RunStatus::SandboxError,
                        String::new(),
                        e.to_string(),
                        started.elapsed(),
                    )
                }
            },
            _ = cancel.cancelled() => {
                log::debug!("{} run cancelled while queued", strategy.language());
                return ExecutionResult::cancelled(String::new(), started.elapsed());
            }
        };

        let ctx = RunContext {
            limits: self.limits.clone(),
            cancel,
        };
        log::debug!("running {} bytes of {}", program.len(), strategy.language());
        match strategy.run(&program, &ctx).await {
            Ok(report) => {
                let result = classify(report, &self.limits);
                log::debug!(
                    "{} run finished: {:?} in {}ms",
                    strategy.language(),
                    result.status,
                    result.duration_ms
                );
                result
            }
            Err(e) => {
                log::error!("{} run failed to start: {}", strategy.language(), e);
                ExecutionResult::failed(
                    RunStatus::SandboxError,
                    String::new(),
                    e.to_string(),
                    started.elapsed(),
                )
            }
        }
    }

    /// Which interpreters can actually be started, keyed by language.
    pub async fn probe(&self) -> BTreeMap<Language, bool> {
        let mut found = BTreeMap::new();
        for (language, strategy) in &self.strategies {
            found.insert(*language, interpreter_available(strategy.interpreter()).await);
        }
        found
    }
}
