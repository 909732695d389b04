//! Docker image builds and container smoke tests.
//!
//! This module provides functionality for:
//! - Talking to the Docker CLI (daemon check, cache prune, image lookup, containers)
//! - The ordered list of build strategies handed to the runner
//! - HTTP smoke testing of a started container

pub mod engine;
pub mod smoke;
pub mod strategies;

pub use engine::{ContainerSpec, DockerCli};
pub use smoke::SmokeTester;
pub use strategies::BuildOptions;
