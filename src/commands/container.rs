//! `todo-ops test-container`: run the image and smoke test it.

use std::collections::BTreeMap;

use tracing::{info, warn};
use uuid::Uuid;

use super::output;
use crate::cli::TestContainerArgs;
use crate::config::Config;
use crate::docker::{ContainerSpec, DockerCli, SmokeTester};
use crate::error::AppError;

pub async fn run(args: TestContainerArgs, config: &Config) -> Result<(), AppError> {
    output::header("Container smoke test");

    let docker = DockerCli::new();
    docker.check_daemon().await?;

    let tag = args
        .tag
        .clone()
        .unwrap_or_else(|| config.docker.image_tag.clone());
    match docker.image_summary(&tag).await? {
        Some(image) => output::success(&format!("Found {} ({}, {})", tag, image.id, image.size)),
        None => return Err(AppError::ImageMissing { tag }),
    }

    let container = container_spec(&args, config, &tag);
    let base_url = format!("http://localhost:{}", container.host_port);
    let tester = SmokeTester::new(&base_url, &config.smoke.health_path, &config.smoke.api_path)
        .map_err(|e| AppError::Config(e.to_string()))?;
    if args.postgres_password.is_none() {
        output::warning("No database password given; the API check may fail without a database");
    }

    let result = exercise(&docker, &container, &tester, config).await;

    if let Err(e) = &result {
        warn!("Smoke test failed: {}", e);
        dump_logs(&docker, &container.name).await;
    }

    if args.keep && result.is_ok() {
        output::detail("Container kept", &container.name);
        output::detail("Stop with", &format!("docker rm -f {}", container.name));
    } else {
        output::step(&format!("Removing container {}", container.name));
        docker.remove_container(&container.name).await;
    }

    result
}

/// Start the container and run both endpoint checks.
async fn exercise(
    docker: &DockerCli,
    container: &ContainerSpec,
    tester: &SmokeTester,
    config: &Config,
) -> Result<(), AppError> {
    output::step(&format!(
        "Starting {} on port {}",
        container.name, container.host_port
    ));
    let id = docker.run_detached(container).await?;
    info!("Container id {}", id);

    output::step(&format!("Waiting for {}", tester.health_url()));
    let health = tester
        .wait_healthy(
            config.container.startup_attempts,
            config.container.startup_interval(),
        )
        .await?;
    output::success(&format!(
        "{} answered {}{}",
        health.url,
        health.status,
        health
            .reported_status
            .as_deref()
            .map(|s| format!(" ({})", s))
            .unwrap_or_default()
    ));

    output::step(&format!("Calling {}", tester.api_url()));
    let api = tester.check_api().await?;
    output::success(&format!("{} answered {}", api.url, api.status));
    Ok(())
}

async fn dump_logs(docker: &DockerCli, name: &str) {
    match docker.logs(name).await {
        Ok(logs) if !logs.trim().is_empty() => {
            output::step(&format!("Last log lines of {}", name));
            for line in logs.lines() {
                eprintln!("     {}", line);
            }
        }
        Ok(_) => output::warning("The container produced no log output"),
        Err(e) => warn!("Could not read logs of {}: {}", name, e),
    }
}

fn container_spec(args: &TestContainerArgs, config: &Config, tag: &str) -> ContainerSpec {
    let settings = &config.container;
    let suffix = Uuid::new_v4().simple().to_string();

    let env = BTreeMap::from([
        (
            "ASPNETCORE_ENVIRONMENT".to_string(),
            settings.environment.clone(),
        ),
        (
            "ASPNETCORE_URLS".to_string(),
            format!("http://+:{}", settings.container_port),
        ),
    ]);
    let mut secret_env = BTreeMap::new();
    if let Some(password) = &args.postgres_password {
        secret_env.insert(
            "ConnectionStrings__DefaultConnection".to_string(),
            settings.connection_string(password),
        );
    }

    ContainerSpec {
        name: format!("{}-{}", settings.name_prefix, &suffix[..8]),
        image: tag.to_string(),
        host_port: args.port.unwrap_or(settings.host_port),
        container_port: settings.container_port,
        env,
        secret_env,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> TestContainerArgs {
        TestContainerArgs {
            tag: None,
            port: Some(9090),
            postgres_password: Some("pw".into()),
            keep: false,
        }
    }

    #[test]
    fn test_container_spec() {
        let config = Config::embedded();

        let spec = container_spec(&args(), &config, "todoapp:latest");

        assert!(spec.name.starts_with("todoapp-test-"));
        assert_eq!(spec.name.len(), "todoapp-test-".len() + 8);
        assert_eq!(spec.host_port, 9090);
        assert_eq!(spec.env["ASPNETCORE_ENVIRONMENT"], "Development");
        assert!(spec.secret_env["ConnectionStrings__DefaultConnection"].ends_with("Password=pw"));
        assert!(!spec.run_args().iter().any(|a| a.contains("Password")));
    }

    #[test]
    fn test_names_are_unique() {
        let config = Config::embedded();
        let a = container_spec(&args(), &config, "todoapp:latest");
        let b = container_spec(&args(), &config, "todoapp:latest");
        assert_ne!(a.name, b.name);
    }

    #[test]
    fn test_no_password_means_no_connection_string() {
        let mut args = args();
        args.postgres_password = None;

        let spec = container_spec(&args, &Config::embedded(), "todoapp:latest");

        assert!(spec.secret_env.is_empty());
    }
}
