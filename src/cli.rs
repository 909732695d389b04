//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Build, identity and secrets tooling for the Todo web application.
#[derive(Parser, Debug)]
#[command(name = "todo-ops", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file merged over the built-in defaults
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the Docker image, falling back across build strategies
    Build(BuildArgs),

    /// Run the image in a throwaway container and smoke test it
    TestContainer(TestContainerArgs),

    /// Azure AD identity for GitHub Actions
    #[command(subcommand)]
    Oidc(OidcCommands),

    /// GitHub repository secrets and variables
    #[command(subcommand)]
    Secrets(SecretsCommands),

    /// Check that docker, az and gh are installed and signed in
    Doctor,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Prune the build cache first and build without layer cache
    #[arg(long)]
    pub clean_build: bool,

    /// Deadline for each strategy
    #[arg(long, value_name = "N")]
    pub timeout_minutes: Option<u64>,

    /// Image tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Build context directory
    #[arg(long, value_name = "DIR")]
    pub context: Option<String>,

    /// Dockerfile path
    #[arg(long, value_name = "FILE")]
    pub dockerfile: Option<String>,
}

#[derive(Args, Debug)]
pub struct TestContainerArgs {
    /// Image tag to run
    #[arg(long)]
    pub tag: Option<String>,

    /// Host port mapped to the application
    #[arg(long)]
    pub port: Option<u16>,

    /// Database password; enables the connection string
    #[arg(long, env = "POSTGRES_PASSWORD", hide_env_values = true)]
    pub postgres_password: Option<String>,

    /// Leave the container running after a successful test
    #[arg(long)]
    pub keep: bool,
}

/// GitHub repository that workflows run in; falls back to `[github]` in the
/// configuration.
#[derive(Args, Debug, Clone)]
pub struct RepoArgs {
    /// GitHub organization or user
    #[arg(short, long)]
    pub org: Option<String>,

    /// Repository name
    #[arg(short, long)]
    pub repo: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum OidcCommands {
    /// Create or reuse the app registration, service principal, role
    /// assignment and federated credentials
    Setup {
        #[command(flatten)]
        repo: RepoArgs,

        /// App registration display name
        #[arg(long)]
        app_name: Option<String>,

        /// Where to write the setup summary
        #[arg(long, value_name = "PATH")]
        summary: Option<PathBuf>,
    },

    /// Check the existing setup without changing anything
    Verify {
        #[command(flatten)]
        repo: RepoArgs,

        /// App registration display name
        #[arg(long)]
        app_name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SecretsCommands {
    /// Push Azure login values into the repository
    Push {
        #[command(flatten)]
        repo: RepoArgs,

        /// Client ID to push instead of the one in the summary
        #[arg(long)]
        client_id: Option<String>,

        /// Also push POSTGRES_PASSWORD
        #[arg(long, env = "POSTGRES_PASSWORD", hide_env_values = true)]
        postgres_password: Option<String>,

        /// Setup summary to read
        #[arg(long, value_name = "PATH")]
        summary: Option<PathBuf>,

        /// Overwrite values that already exist
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build() {
        let cli = Cli::parse_from(["todo-ops", "-v", "build", "--clean-build", "--timeout-minutes", "5"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Build(args) => {
                assert!(args.clean_build);
                assert_eq!(args.timeout_minutes, Some(5));
                assert!(args.tag.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_oidc_setup() {
        let cli = Cli::parse_from(["todo-ops", "oidc", "setup", "-o", "acme", "-r", "todo"]);
        match cli.command {
            Commands::Oidc(OidcCommands::Setup { repo, app_name, summary }) => {
                assert_eq!(repo.org.as_deref(), Some("acme"));
                assert_eq!(repo.repo.as_deref(), Some("todo"));
                assert!(app_name.is_none());
                assert!(summary.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_secrets_push_force() {
        let cli = Cli::parse_from([
            "todo-ops", "secrets", "push", "--org", "acme", "--repo", "todo", "--client-id", "abc", "--force",
        ]);
        match cli.command {
            Commands::Secrets(SecretsCommands::Push { client_id, force, .. }) => {
                assert_eq!(client_id.as_deref(), Some("abc"));
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
