use anyhow::Result;
use clap::{error::ErrorKind, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use pgspawn::config::Config;
use pgspawn::connection::ConnectionDescriptor;
use pgspawn::exit_codes;
use pgspawn::output::{
    DownResponse, JsonError, Output, ProbeResponse, ProbeVerdict, RunResponse, TeardownVerdict,
    UpResponse,
};
use pgspawn::provision::{self, ProvisionRequest};
use pgspawn::runtime::{ContainerHandle, Runtime};
use pgspawn::{probe, teardown};

/// Version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "pgspawn")]
#[command(version = VERSION)]
#[command(about = "Disposable PostgreSQL containers for integration tests", long_about = None)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Path to config file (default: ./pgspawn.toml)
    #[arg(long = "config", global = true)]
    config_path: Option<PathBuf>,

    /// Minimal output (errors only)
    #[arg(long, global = true)]
    quiet: bool,

    /// Show lifecycle steps as they happen
    #[arg(long, global = true)]
    verbose: bool,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a container and print its connection URL
    Up {
        #[command(flatten)]
        spawn: SpawnArgs,
    },
    /// Probe an instance: connect, ping, SELECT 1
    Probe {
        /// Connection URL (defaults to DATABASE_URL)
        #[arg(long)]
        url: Option<String>,
        /// Connection timeout (e.g., "5s", "500ms")
        #[arg(long = "connect-timeout", value_name = "DURATION")]
        connect_timeout: Option<String>,
    },
    /// Stop and remove a container by id
    Down {
        /// Container id as printed by `up`
        container_id: String,
        /// Grace period before the daemon kills the container
        #[arg(long = "stop-timeout", value_name = "DURATION")]
        stop_timeout: Option<String>,
    },
    /// Full cycle: provision, probe, tear down
    Run {
        #[command(flatten)]
        spawn: SpawnArgs,
    },
}

/// Provisioning flags shared by `up` and `run`.
#[derive(clap::Args)]
struct SpawnArgs {
    /// Image reference (overrides POSTGRES_IMAGE env var and config file)
    #[arg(short = 'i', long)]
    image: Option<String>,

    /// Container name (overrides APP_NAME env var and config file)
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Pull policy: "always" or "missing"
    #[arg(long, value_name = "POLICY")]
    pull: Option<String>,

    /// Total budget for the post-start readiness poll (e.g., "30s")
    #[arg(long = "readiness-timeout", value_name = "DURATION")]
    readiness_timeout: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before parsing CLI so env vars are available)
    let _ = dotenvy::dotenv();

    // Check for --json flag early (before full parsing) for error handling
    let json_mode = std::env::args().any(|arg| arg == "--json");

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if json_mode
                && !matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
            {
                JsonError::new(e.to_string()).print();
                std::process::exit(2);
            }
            // Human mode and meta UX flags: let clap print its formatted output
            e.exit();
        }
    };

    let output = Output::new(cli.json, cli.quiet, cli.verbose);

    let code = match run(cli, &output).await {
        Ok(code) => code,
        Err(e) => {
            report_error(&output, &e);
            exit_codes::OPERATIONAL_FAILURE
        }
    };
    std::process::exit(code);
}

fn report_error(output: &Output, e: &anyhow::Error) {
    if output.is_json() {
        JsonError::with_details(e.to_string(), format!("{e:#}")).print();
    } else {
        eprintln!("Error: {e:#}");
    }
}

async fn run(cli: Cli, output: &Output) -> Result<i32> {
    let config = match Config::load(cli.config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            report_error(output, &e.context("Failed to load configuration"));
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    match cli.command {
        Commands::Up { spawn } => cmd_up(&config, &spawn, output).await,
        Commands::Probe {
            url,
            connect_timeout,
        } => cmd_probe(&config, url.as_deref(), connect_timeout.as_deref(), output).await,
        Commands::Down {
            container_id,
            stop_timeout,
        } => cmd_down(&config, container_id, stop_timeout.as_deref(), output).await,
        Commands::Run { spawn } => cmd_run(&config, &spawn, output).await,
    }
}

fn resolve_request(config: &Config, spawn: &SpawnArgs, output: &Output) -> Option<ProvisionRequest> {
    match ProvisionRequest::from_config(
        config,
        spawn.image.as_deref(),
        spawn.name.as_deref(),
        spawn.pull.as_deref(),
        spawn.readiness_timeout.as_deref(),
    ) {
        Ok(request) => Some(request),
        Err(e) => {
            report_error(output, &e);
            None
        }
    }
}

async fn cmd_up(config: &Config, spawn: &SpawnArgs, output: &Output) -> Result<i32> {
    let Some(request) = resolve_request(config, spawn, output) else {
        return Ok(exit_codes::CONFIG_ERROR);
    };

    let runtime = Runtime::connect()?;
    runtime.ping().await?;

    let provisioned = provision::provision(&runtime, config, &request, output).await?;

    if output.is_json() {
        output.json(&UpResponse {
            ok: true,
            container_id: provisioned.handle.id().to_string(),
            name: request.name.clone(),
            image: request.image.clone(),
            port: provisioned.descriptor.port,
            url: provisioned.descriptor.url(),
        })?;
    } else {
        if !output.is_quiet() {
            eprintln!(
                "{}",
                format!(
                    "Started '{}' ({})",
                    request.name,
                    provisioned.handle.short_id()
                )
                .green()
            );
            eprintln!(
                "Tear down with: pgspawn down {}",
                provisioned.handle.short_id()
            );
        }
        println!("{}", provisioned.descriptor.url());
    }

    Ok(exit_codes::SUCCESS)
}

async fn cmd_probe(
    config: &Config,
    url: Option<&str>,
    connect_timeout: Option<&str>,
    output: &Output,
) -> Result<i32> {
    let raw_url = match url.map(str::to_string).or_else(|| std::env::var("DATABASE_URL").ok()) {
        Some(u) => u,
        None => {
            let e = anyhow::anyhow!("No connection URL. Use --url or set DATABASE_URL");
            report_error(output, &e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let descriptor = match ConnectionDescriptor::parse(&raw_url) {
        Ok(d) => d,
        Err(e) => {
            report_error(output, &e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let timeout = match config.connect_timeout(connect_timeout) {
        Ok(t) => t,
        Err(e) => {
            report_error(output, &e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    match probe::probe(&descriptor, timeout).await {
        Ok(value) => {
            if output.is_json() {
                output.json(&ProbeResponse { ok: true, value })?;
            } else if !output.is_quiet() {
                println!(
                    "{}",
                    format!("Probe passed against {}", descriptor.masked_url()).green()
                );
            }
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => {
            if output.is_json() {
                JsonError::with_details("Probe failed", format!("{e:#}")).print();
            } else {
                eprintln!("{} {e:#}", "Probe failed:".red());
            }
            Ok(exit_codes::PROBE_FAILURE)
        }
    }
}

async fn cmd_down(
    config: &Config,
    container_id: String,
    stop_timeout: Option<&str>,
    output: &Output,
) -> Result<i32> {
    let timeout = match config.stop_timeout(stop_timeout) {
        Ok(t) => t,
        Err(e) => {
            report_error(output, &e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let runtime = Runtime::connect()?;
    let handle = ContainerHandle::from_raw(container_id.clone());
    let report = teardown::decommission(&runtime, handle, timeout).await;

    if output.is_json() {
        output.json(&DownResponse {
            ok: report.is_clean(),
            container_id,
            stopped: report.stopped,
            removed: report.removed,
            error: report.error.as_ref().map(|e| format!("{e:#}")),
        })?;
    } else if report.is_clean() {
        if !output.is_quiet() {
            println!(
                "{}",
                format!("Stopped and removed container {}", container_id).green()
            );
        }
    } else if let Some(ref e) = report.error {
        eprintln!("{} {e:#}", "Teardown failed:".red());
    }

    if report.is_clean() {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::TEARDOWN_FAILURE)
    }
}

async fn cmd_run(config: &Config, spawn: &SpawnArgs, output: &Output) -> Result<i32> {
    let Some(request) = resolve_request(config, spawn, output) else {
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let connect_timeout = match config.connect_timeout(None) {
        Ok(t) => t,
        Err(e) => {
            report_error(output, &e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let stop_timeout = match config.stop_timeout(None) {
        Ok(t) => t,
        Err(e) => {
            report_error(output, &e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let runtime = Runtime::connect()?;
    runtime.ping().await?;

    // Provisioning failures are fatal and abort before any probe runs.
    let provisioned = provision::provision(&runtime, config, &request, output).await?;
    let container_id = provisioned.handle.id().to_string();

    let probe_result = probe::probe(&provisioned.descriptor, connect_timeout).await;

    // Teardown always runs; its outcome is reported next to the probe
    // verdict instead of overwriting it.
    let report = teardown::decommission(&runtime, provisioned.handle, stop_timeout).await;

    let probe_passed = probe_result.is_ok();
    let code = if !probe_passed {
        exit_codes::PROBE_FAILURE
    } else if !report.is_clean() {
        exit_codes::TEARDOWN_FAILURE
    } else {
        exit_codes::SUCCESS
    };

    if output.is_json() {
        output.json(&RunResponse {
            ok: code == exit_codes::SUCCESS,
            container_id,
            url: provisioned.descriptor.masked_url(),
            probe: ProbeVerdict {
                passed: probe_passed,
                value: probe_result.as_ref().ok().copied(),
                error: probe_result.as_ref().err().map(|e| format!("{e:#}")),
            },
            teardown: TeardownVerdict {
                clean: report.is_clean(),
                stopped: report.stopped,
                removed: report.removed,
                error: report.error.as_ref().map(|e| format!("{e:#}")),
            },
        })?;
    } else {
        match &probe_result {
            Ok(_) => {
                if !output.is_quiet() {
                    println!("{}", "Probe passed (SELECT 1 = 1)".green());
                }
            }
            Err(e) => eprintln!("{} {e:#}", "Probe failed:".red()),
        }
        match &report.error {
            None => {
                if !output.is_quiet() {
                    println!("{}", "Teardown clean".green());
                }
            }
            Some(e) => eprintln!("{} {e:#}", "Teardown failed:".yellow()),
        }
    }

    Ok(code)
}
