//! Output layer for the pgspawn CLI.
//!
//! Centralizes stdout/stderr separation and human vs JSON output modes.
//! - stdout: data (the "answer" - results, JSON)
//! - stderr: diagnostics (progress, verbose messages, human-mode errors)

use serde::Serialize;

/// Output mode for the CLI
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Output helper that centralizes all CLI output
#[derive(Debug, Clone)]
pub struct Output {
    pub mode: OutputMode,
    pub quiet: bool,
    pub verbose: bool,
}

impl Output {
    pub fn new(json: bool, quiet: bool, verbose: bool) -> Self {
        Self {
            mode: if json {
                OutputMode::Json
            } else {
                OutputMode::Human
            },
            quiet,
            verbose,
        }
    }

    /// Write JSON data to stdout
    /// Returns error if serialization fails (should be propagated to become JSON error)
    pub fn json<T: Serialize>(&self, data: &T) -> Result<(), serde_json::Error> {
        let json = serde_json::to_string_pretty(data)?;
        println!("{}", json);
        Ok(())
    }

    /// Write a diagnostic/progress message to stderr
    /// Suppressed in JSON mode and when --quiet is set
    pub fn info(&self, message: &str) {
        if self.mode == OutputMode::Json || self.quiet {
            return;
        }
        eprintln!("{}", message);
    }

    /// Write a verbose diagnostic message to stderr
    /// Only shown with --verbose in human mode
    pub fn verbose(&self, message: &str) {
        if self.mode == OutputMode::Json || self.quiet || !self.verbose {
            return;
        }
        eprintln!("{}", message);
    }

    /// Write a warning to stderr
    /// Shown in human mode unless --quiet, suppressed in JSON mode
    pub fn warn(&self, message: &str) {
        if self.mode == OutputMode::Json || self.quiet {
            return;
        }
        eprintln!("{}", message);
    }

    /// Check if we're in JSON mode
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Check if we're in quiet mode
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

// =============================================================================
// JSON Response Types
// =============================================================================

/// Tool version from Cargo.toml.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON error response (written to stdout with non-zero exit).
#[derive(Debug, Serialize)]
pub struct JsonError {
    pub ok: bool,
    pub schema_id: &'static str,
    pub tool_version: &'static str,
    pub generated_at: String,
    pub error: JsonErrorInfo,
}

#[derive(Debug, Serialize)]
pub struct JsonErrorInfo {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl JsonError {
    pub const SCHEMA_ID: &'static str = "pgspawn.error";

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            schema_id: Self::SCHEMA_ID,
            tool_version: TOOL_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            error: JsonErrorInfo {
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            ok: false,
            schema_id: Self::SCHEMA_ID,
            tool_version: TOOL_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            error: JsonErrorInfo {
                message: message.into(),
                details: Some(details.into()),
            },
        }
    }

    /// Print this error as JSON to stdout
    /// Panics if serialization fails (should never happen for JsonError)
    pub fn print(&self) {
        let json =
            serde_json::to_string_pretty(self).expect("JsonError serialization should never fail");
        println!("{}", json);
    }
}

/// JSON success response for `up`
#[derive(Debug, Serialize)]
pub struct UpResponse {
    pub ok: bool,
    pub container_id: String,
    pub name: String,
    pub image: String,
    pub port: u16,
    pub url: String,
}

/// JSON success response for `probe`
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub ok: bool,
    pub value: i32,
}

/// JSON response for `down`
#[derive(Debug, Serialize)]
pub struct DownResponse {
    pub ok: bool,
    pub container_id: String,
    pub stopped: bool,
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// JSON response for `run`: the probe verdict and the teardown outcome,
/// reported side by side rather than one masking the other.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub ok: bool,
    pub container_id: String,
    pub url: String,
    pub probe: ProbeVerdict,
    pub teardown: TeardownVerdict,
}

#[derive(Debug, Serialize)]
pub struct ProbeVerdict {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TeardownVerdict {
    pub clean: bool,
    pub stopped: bool,
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
