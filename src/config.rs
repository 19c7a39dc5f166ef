//! Configuration for pgspawn.
//!
//! Every knob resolves in the same order: CLI flag > environment variable >
//! `pgspawn.toml` > built-in default. The two environment variables with
//! historical names, `POSTGRES_IMAGE` and `APP_NAME`, select the image to
//! run and the container name to assign.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable naming the database image reference.
pub const IMAGE_ENV: &str = "POSTGRES_IMAGE";

/// Environment variable naming the container to create.
pub const NAME_ENV: &str = "APP_NAME";

/// Image used when nothing else is configured.
pub const DEFAULT_IMAGE: &str = "postgres:15";

/// Default timeout values for the container lifecycle.
pub mod defaults {
    use std::time::Duration;

    /// Connection timeout: fail fast on unreachable instances
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Readiness deadline: total budget for the post-start readiness poll
    pub const READINESS_TIMEOUT: Duration = Duration::from_secs(30);

    /// Stop timeout: grace period given to the container before SIGKILL
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);
}

/// Whether to pull the image before creating the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullPolicy {
    /// Pull unconditionally on every run.
    #[default]
    Always,
    /// Pull only when the image is not already present locally.
    Missing,
}

impl PullPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "always" => Some(PullPolicy::Always),
            "missing" => Some(PullPolicy::Missing),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PullPolicy::Always => "always",
            PullPolicy::Missing => "missing",
        }
    }
}

/// Main configuration structure loaded from pgspawn.toml
#[derive(Deserialize, Default, Debug)]
pub struct Config {
    pub container: Option<ContainerConfig>,
    pub database: Option<DatabaseConfig>,
    pub lifecycle: Option<LifecycleConfig>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ContainerConfig {
    pub image: Option<String>,
    pub name: Option<String>,
    pub platform: Option<String>,
    pub timezone: Option<String>,
    pub locale: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct DatabaseConfig {
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct LifecycleConfig {
    pub pull_policy: Option<String>,
    pub connect_timeout: Option<String>,
    pub readiness_timeout: Option<String>,
    pub stop_timeout: Option<String>,
}

impl Config {
    /// Load config from file, or return default if no config exists.
    /// If an explicit path is provided via --config, it MUST exist (error if not).
    /// If no path is provided, check ./pgspawn.toml (use default if not found).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                // User explicitly specified a path - it MUST exist
                if !p.exists() {
                    bail!("Config file not found: {}", p.display());
                }
                p
            }
            None => {
                let default_path = Path::new("pgspawn.toml");
                if default_path.exists() {
                    default_path
                } else {
                    return Ok(Config::default());
                }
            }
        };

        let contents = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", config_path.display(), e))?;

        Ok(config)
    }

    /// Resolve the image reference: CLI > POSTGRES_IMAGE > config > default.
    pub fn image(&self, cli_image: Option<&str>) -> String {
        if let Some(image) = cli_image {
            return image.to_string();
        }
        if let Ok(image) = std::env::var(IMAGE_ENV) {
            if !image.is_empty() {
                return image;
            }
        }
        self.container
            .as_ref()
            .and_then(|c| c.image.clone())
            .unwrap_or_else(|| DEFAULT_IMAGE.to_string())
    }

    /// Resolve the container name: CLI > APP_NAME > config > generated.
    ///
    /// A generated name is unique per process and per call, so multiple
    /// fixtures can coexist in one test binary.
    pub fn container_name(&self, cli_name: Option<&str>) -> Result<String> {
        let name = if let Some(name) = cli_name {
            name.to_string()
        } else if let Ok(name) = std::env::var(NAME_ENV) {
            if name.is_empty() {
                generated_name()
            } else {
                name
            }
        } else if let Some(name) = self.container.as_ref().and_then(|c| c.name.clone()) {
            name
        } else {
            generated_name()
        };

        validate_container_name(&name)?;
        Ok(name)
    }

    /// Platform passed to container create, if any (e.g. "linux/amd64").
    pub fn platform(&self) -> Option<String> {
        self.container.as_ref().and_then(|c| c.platform.clone())
    }

    pub fn timezone(&self) -> &str {
        self.container
            .as_ref()
            .and_then(|c| c.timezone.as_deref())
            .unwrap_or("UTC")
    }

    pub fn locale(&self) -> &str {
        self.container
            .as_ref()
            .and_then(|c| c.locale.as_deref())
            .unwrap_or("C.UTF-8")
    }

    pub fn database_name(&self) -> &str {
        self.database
            .as_ref()
            .and_then(|d| d.name.as_deref())
            .unwrap_or("postgres")
    }

    pub fn database_user(&self) -> &str {
        self.database
            .as_ref()
            .and_then(|d| d.user.as_deref())
            .unwrap_or("postgres")
    }

    pub fn database_password(&self) -> &str {
        self.database
            .as_ref()
            .and_then(|d| d.password.as_deref())
            .unwrap_or("postgres")
    }

    /// Resolve the pull policy: CLI > config > `always`.
    pub fn pull_policy(&self, cli_policy: Option<&str>) -> Result<PullPolicy> {
        let raw = cli_policy
            .map(str::to_string)
            .or_else(|| self.lifecycle.as_ref().and_then(|l| l.pull_policy.clone()));

        match raw {
            Some(s) => PullPolicy::from_str(&s)
                .ok_or_else(|| anyhow::anyhow!("Invalid pull policy '{}'. Use: always, missing", s)),
            None => Ok(PullPolicy::default()),
        }
    }

    pub fn connect_timeout(&self, cli_value: Option<&str>) -> Result<Duration> {
        self.resolve_duration(
            cli_value,
            |l| l.connect_timeout.as_deref(),
            defaults::CONNECT_TIMEOUT,
            "connect_timeout",
        )
    }

    pub fn readiness_timeout(&self, cli_value: Option<&str>) -> Result<Duration> {
        self.resolve_duration(
            cli_value,
            |l| l.readiness_timeout.as_deref(),
            defaults::READINESS_TIMEOUT,
            "readiness_timeout",
        )
    }

    pub fn stop_timeout(&self, cli_value: Option<&str>) -> Result<Duration> {
        self.resolve_duration(
            cli_value,
            |l| l.stop_timeout.as_deref(),
            defaults::STOP_TIMEOUT,
            "stop_timeout",
        )
    }

    fn resolve_duration(
        &self,
        cli_value: Option<&str>,
        from_file: impl Fn(&LifecycleConfig) -> Option<&str>,
        default: Duration,
        field: &str,
    ) -> Result<Duration> {
        let raw = cli_value.or_else(|| self.lifecycle.as_ref().and_then(|l| from_file(l)));
        match raw {
            Some(s) => parse_duration(s).with_context(|| format!("Invalid {}", field)),
            None => Ok(default),
        }
    }

    /// Environment list handed to the container: timezone, locale, database
    /// name, superuser credentials, trust auth, and initdb encoding flags.
    pub fn container_env(&self) -> Vec<String> {
        vec![
            format!("TZ={}", self.timezone()),
            format!("LANG={}", self.locale()),
            format!("POSTGRES_DB={}", self.database_name()),
            format!("POSTGRES_USER={}", self.database_user()),
            format!("POSTGRES_PASSWORD={}", self.database_password()),
            "POSTGRES_INITDB_ARGS=--encoding=UTF-8".to_string(),
            "POSTGRES_HOST_AUTH_METHOD=trust".to_string(),
        ]
    }
}

static NAME_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a process-unique container name.
fn generated_name() -> String {
    let count = NAME_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("pgspawn-{}-{}", std::process::id(), count)
}

fn container_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Container name rules enforced by the Docker daemon.
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("container name pattern is valid")
    })
}

/// Validate a container name against the daemon's naming rules.
pub fn validate_container_name(name: &str) -> Result<()> {
    if !container_name_regex().is_match(name) {
        bail!(
            "Invalid container name '{}': must start with an alphanumeric \
             character and contain only [a-zA-Z0-9_.-]",
            name
        );
    }
    Ok(())
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    // Try to find the unit suffix
    let (num_part, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else {
        // Default to seconds if no unit
        (s, "s")
    };

    let num: u64 = num_part
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration number: '{}'", num_part))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num * 60),
        _ => anyhow::bail!("Unknown duration unit: '{}'", unit),
    };

    Ok(duration)
}
