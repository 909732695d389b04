//! Timed execution of external commands.
//!
//! This module provides:
//! - Running one command under a deadline, killing it when the deadline passes
//! - Ordered fallback across named strategies until one succeeds

pub mod process;
pub mod strategy;

pub use process::{capture, CapturedOutput, CommandSpec, Outcome};
pub use strategy::{FallbackReport, ProcessExecutor, Strategy, StrategyEvent, StrategyRunner};
