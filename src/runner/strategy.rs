//! Ordered fallback over build strategies.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use super::process::{self, CommandSpec, Outcome};
use crate::error::RunnerError;

/// Executes one command and reports its outcome.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, spec: &CommandSpec) -> Result<Outcome, RunnerError>;
}

/// Executor that spawns real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, spec: &CommandSpec) -> Result<Outcome, RunnerError> {
        process::run_timed(spec).await
    }
}

/// A named way of running a command, e.g. a build with BuildKit disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub name: String,
    pub command: CommandSpec,
}

impl Strategy {
    pub fn new(name: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            command,
        }
    }
}

/// One strategy that was tried.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub strategy: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

/// Progress notifications for callers that narrate the run.
#[derive(Debug)]
pub enum StrategyEvent<'a> {
    Started {
        index: usize,
        total: usize,
        strategy: &'a Strategy,
    },
    Finished(&'a Attempt),
}

/// Result of a fallback run: every attempt, in order.
#[derive(Debug, Clone, Default)]
pub struct FallbackReport {
    pub attempts: Vec<Attempt>,
}

impl FallbackReport {
    pub fn succeeded(&self) -> bool {
        self.attempts.last().is_some_and(|a| a.outcome.is_success())
    }

    /// Name of the strategy that succeeded.
    pub fn winner(&self) -> Option<&str> {
        self.attempts
            .last()
            .filter(|a| a.outcome.is_success())
            .map(|a| a.strategy.as_str())
    }
}

/// Callback for progress events.
type Observer = Box<dyn Fn(StrategyEvent<'_>) + Send + Sync>;

/// Tries strategies strictly in order until one succeeds.
pub struct StrategyRunner<E> {
    executor: E,
    observer: Option<Observer>,
}

impl<E: CommandExecutor> StrategyRunner<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            observer: None,
        }
    }

    /// Call `observer` before and after each attempt.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(StrategyEvent<'_>) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    fn notify(&self, event: StrategyEvent<'_>) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }

    /// Run the strategies in order.
    ///
    /// Failures and timeouts advance to the next strategy; a strategy is never
    /// retried. An executor error counts as a failure without an exit code.
    pub async fn run(&self, strategies: &[Strategy]) -> FallbackReport {
        let total = strategies.len();
        let mut report = FallbackReport::default();

        for (index, strategy) in strategies.iter().enumerate() {
            self.notify(StrategyEvent::Started {
                index,
                total,
                strategy,
            });
            info!(
                strategy = %strategy.name,
                attempt = index + 1,
                total,
                "trying strategy"
            );

            let started = Instant::now();
            let outcome = match self.executor.execute(&strategy.command).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(strategy = %strategy.name, "strategy could not run: {}", e);
                    Outcome::Failed { code: None }
                }
            };

            let attempt = Attempt {
                strategy: strategy.name.clone(),
                outcome,
                elapsed: started.elapsed(),
            };
            info!(
                strategy = %attempt.strategy,
                outcome = %attempt.outcome,
                elapsed_secs = attempt.elapsed.as_secs(),
                "strategy finished"
            );
            self.notify(StrategyEvent::Finished(&attempt));

            let done = attempt.outcome.is_success();
            report.attempts.push(attempt);
            if done {
                break;
            }
        }

        report
    }
}
