//! Build strategies for `docker build`, tried in order by the runner.

use std::time::Duration;

use crate::runner::{CommandSpec, Strategy};

/// Names accepted in `docker.strategies`.
pub const KNOWN_STRATEGIES: [&str; 4] = ["standard", "no-cache", "legacy", "platform"];

/// What to build and how long each attempt may take.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub tag: String,
    pub context: String,
    pub dockerfile: String,
    pub platform: String,
    /// Disable the layer cache for every strategy.
    pub clean: bool,
    pub timeout: Duration,
}

impl BuildOptions {
    fn base(&self, no_cache: bool) -> CommandSpec {
        let mut spec = CommandSpec::new("docker", self.timeout).args([
            "build",
            "-t",
            self.tag.as_str(),
            "-f",
            self.dockerfile.as_str(),
        ]);
        if no_cache || self.clean {
            spec = spec.arg("--no-cache");
        }
        spec
    }
}

/// Build one named strategy, or `None` for an unknown name.
///
/// - `standard`: BuildKit with plain progress output
/// - `no-cache`: BuildKit, no layer cache, base images re-pulled
/// - `legacy`: the classic builder (`DOCKER_BUILDKIT=0`)
/// - `platform`: BuildKit pinned to the configured platform
pub fn strategy(name: &str, options: &BuildOptions) -> Option<Strategy> {
    let context = options.context.as_str();
    let command = match name {
        "standard" => options
            .base(false)
            .args(["--progress=plain", context])
            .env("DOCKER_BUILDKIT", "1"),
        "no-cache" => options
            .base(true)
            .args(["--pull", "--progress=plain", context])
            .env("DOCKER_BUILDKIT", "1"),
        "legacy" => options.base(false).arg(context).env("DOCKER_BUILDKIT", "0"),
        "platform" => options
            .base(false)
            .args(["--platform", options.platform.as_str(), "--progress=plain", context])
            .env("DOCKER_BUILDKIT", "1"),
        _ => return None,
    };
    Some(Strategy::new(name, command))
}

/// Build the configured strategy list; unknown names are rejected.
pub fn strategies(names: &[String], options: &BuildOptions) -> Result<Vec<Strategy>, String> {
    names
        .iter()
        .map(|name| {
            strategy(name, options).ok_or_else(|| {
                format!(
                    "unknown build strategy `{}` (expected one of: {})",
                    name,
                    KNOWN_STRATEGIES.join(", ")
                )
            })
        })
        .collect()
}
