//! Azure AD identity for GitHub Actions.
//!
//! This module provides functionality for:
//! - Querying and creating app registrations, service principals, role
//!   assignments and federated credentials through `az`
//! - Reuse-or-create provisioning in dependency order
//! - Read-only verification of an existing setup
//! - The JSON setup summary consumed by `secrets push`

pub mod client;
pub mod ensure;
pub mod models;
pub mod summary;
pub mod verify;

#[cfg(test)]
mod fake;

pub use client::{AzCli, DirectoryClient};
pub use ensure::{EnsureOutcome, Ensurer, OidcPlan};
pub use summary::{SetupSummary, DEFAULT_SUMMARY_FILE};
pub use verify::Verifier;
