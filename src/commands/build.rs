//! `todo-ops build`: Docker image build with strategy fallback.

use std::time::Duration;

use tracing::warn;

use super::output;
use crate::cli::BuildArgs;
use crate::config::Config;
use crate::docker::{strategies, BuildOptions, DockerCli};
use crate::error::AppError;
use crate::runner::{FallbackReport, ProcessExecutor, StrategyEvent, StrategyRunner};

pub async fn run(args: BuildArgs, config: &Config) -> Result<(), AppError> {
    output::header("Docker build");

    let options = build_options(&args, config)?;
    let plan = strategies::strategies(&config.docker.strategies, &options).map_err(AppError::Config)?;

    let docker = DockerCli::new();
    let version = docker.check_daemon().await?;
    output::success(&format!("Docker daemon is running (server {})", version));

    if options.clean {
        output::step("Pruning build cache");
        match docker.prune_build_cache().await {
            Ok(()) => output::success("Build cache pruned"),
            Err(e) => {
                warn!("Cache prune failed: {}", e);
                output::warning("Could not prune the build cache; continuing without it");
            }
        }
    }

    output::detail("Image", &options.tag);
    output::detail("Dockerfile", &options.dockerfile);
    output::detail("Timeout per strategy", &output::elapsed(options.timeout));

    let runner = StrategyRunner::new(ProcessExecutor).with_observer(narrate);
    let report = runner.run(&plan).await;

    print_attempts(&report);

    if !report.succeeded() {
        return Err(AppError::BuildExhausted {
            attempts: report.attempts.len(),
        });
    }
    output::success(&format!(
        "Built {} with the {} strategy",
        options.tag,
        report.winner().unwrap_or_default()
    ));

    match docker.image_summary(&options.tag).await {
        Ok(Some(image)) => {
            output::detail(
                "Image ID",
                &format!("{} ({}:{})", image.id, image.repository, image.tag),
            );
            output::detail("Size", &image.size);
            if !image.created_since.is_empty() {
                output::detail("Created", &image.created_since);
            }
        }
        Ok(None) => output::warning("Build reported success but the image is not listed"),
        Err(e) => warn!("Could not inspect {}: {}", options.tag, e),
    }
    Ok(())
}

/// Command-line flags over configured defaults.
fn build_options(args: &BuildArgs, config: &Config) -> Result<BuildOptions, AppError> {
    let timeout = match args.timeout_minutes {
        Some(0) => {
            return Err(AppError::Config(
                "--timeout-minutes must be greater than zero".to_string(),
            ))
        }
        Some(minutes) => minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                AppError::Config(format!("--timeout-minutes {} is too large", minutes))
            })?,
        None => config.docker.timeout(),
    };

    Ok(BuildOptions {
        tag: args
            .tag
            .clone()
            .unwrap_or_else(|| config.docker.image_tag.clone()),
        context: args
            .context
            .clone()
            .unwrap_or_else(|| config.docker.context.clone()),
        dockerfile: args
            .dockerfile
            .clone()
            .unwrap_or_else(|| config.docker.dockerfile.clone()),
        platform: config.docker.platform.clone(),
        clean: args.clean_build,
        timeout,
    })
}

fn narrate(event: StrategyEvent<'_>) {
    match event {
        StrategyEvent::Started {
            index,
            total,
            strategy,
        } => output::step(&format!(
            "Strategy {}/{}: {} ({})",
            index + 1,
            total,
            strategy.name,
            strategy.command.display()
        )),
        StrategyEvent::Finished(attempt) if attempt.outcome.is_success() => {
            output::success(&format!(
                "{} succeeded in {}",
                attempt.strategy,
                output::elapsed(attempt.elapsed)
            ))
        }
        StrategyEvent::Finished(attempt) => output::failure(&format!(
            "{} {} after {}",
            attempt.strategy,
            attempt.outcome,
            output::elapsed(attempt.elapsed)
        )),
    }
}

fn print_attempts(report: &FallbackReport) {
    if report.attempts.len() <= 1 {
        return;
    }
    output::step("Attempts");
    for attempt in &report.attempts {
        output::detail(
            &attempt.strategy,
            &format!("{} ({})", attempt.outcome, output::elapsed(attempt.elapsed)),
        );
    }
}
