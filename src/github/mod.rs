//! GitHub repository secrets and variables.

pub mod client;
pub mod push;

pub use client::{GhCli, RepoSettings};
pub use push::{push, PushAction, PushItem};
