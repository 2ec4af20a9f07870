use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use worker_health::build_info;
use worker_health::compose::ComposeCli;
use worker_health::config::MonitorConfig;
use worker_health::health::remediation::parse_scale;
use worker_health::health::{ApiClient, Collaborators, Pipeline, RunOptions, print_event};
use worker_health::prompt::ConfirmPolicy;

/// Check worker health by submitting test tasks and restart failed workers.
///
/// A timed-out tree builder coordinator triggers a look at its queue, which
/// can be purged (after confirmation) so the worker gets restarted as well.
#[derive(Parser, Debug)]
#[command(name = "worker-health")]
struct Cli {
    /// Names of specific workers to check and restart
    workers: Vec<String>,

    /// Hostname for the deployment, e.g. askcos.mit.edu
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Do not restart containers, only check health
    #[arg(short = 'n', long)]
    no_restart: bool,

    /// Docker image version to use when restarting
    #[arg(short = 'v', long = "version", value_name = "TAG")]
    image_version: Option<String>,

    /// Deployment directory (Compose file location)
    #[arg(short = 'd', long, value_name = "DIR")]
    project_directory: Option<PathBuf>,

    /// Worker scales, as name=scale pairs like docker-compose
    #[arg(short = 's', long = "scale", value_name = "NAME=SCALE", value_parser = parse_scale)]
    scales: Vec<(String, u32)>,

    /// Additional configuration file layered over the defaults
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of tests to probe concurrently
    #[arg(long, default_value_t = 1, value_name = "N")]
    parallel: usize,

    /// Clear the queue without asking
    #[arg(long, conflicts_with = "no_confirm")]
    yes: bool,

    /// Never clear the queue (non-interactive runs)
    #[arg(long)]
    no_confirm: bool,

    /// Validate the API's TLS certificate
    #[arg(long)]
    verify_tls: bool,

    /// Print build information and exit
    #[arg(long)]
    build_info: bool,
}

impl Cli {
    fn confirm_policy(&self) -> ConfirmPolicy {
        if self.yes {
            ConfirmPolicy::AlwaysAllow
        } else if self.no_confirm {
            ConfirmPolicy::AlwaysDeny
        } else {
            ConfirmPolicy::Prompt
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            workers: self.workers.iter().cloned().collect::<HashSet<_>>(),
            restart: !self.no_restart,
            scales: self.scales.clone(),
            version: self.image_version.clone(),
            parallelism: self.parallel,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.build_info {
        println!("{}", build_info::detailed_info());
        return Ok(());
    }

    info!(version = %build_info::version_string(), "worker-health starting");

    let mut config =
        MonitorConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if cli.verify_tls {
        config.api.accept_invalid_certs = false;
    }
    if config.api.accept_invalid_certs {
        warn!(host = %cli.host, "TLS certificate validation is disabled");
    }

    let client =
        ApiClient::new(&cli.host, &config.api).context("failed to create API client")?;
    let compose = ComposeCli::new(
        config.compose.clone(),
        cli.project_directory.clone(),
        cli.image_version.clone(),
    );
    let confirm = cli.confirm_policy();

    let summary = Pipeline::new(
        &config,
        Collaborators {
            client: &client,
            inspector: &compose,
            confirm: &confirm,
            restarter: &compose,
        },
    )
    .run(&cli.run_options(), print_event);

    std::process::exit(summary.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "worker-health",
            "tb_c_worker",
            "sites_worker",
            "--host",
            "https://askcos.example.org",
            "-n",
            "-v",
            "2020.07",
            "-s",
            "tb_c_worker=2",
            "--scale",
            "sites_worker=3",
        ])
        .unwrap();

        let options = cli.run_options();
        assert_eq!(options.workers.len(), 2);
        assert!(!options.restart);
        assert_eq!(options.version.as_deref(), Some("2020.07"));
        assert_eq!(
            options.scales,
            [("tb_c_worker".to_string(), 2), ("sites_worker".to_string(), 3)]
        );
        assert_eq!(cli.host, "https://askcos.example.org");
        assert_eq!(cli.confirm_policy(), ConfirmPolicy::Prompt);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["worker-health"]).unwrap();

        assert_eq!(cli.host, "localhost");
        assert!(cli.run_options().restart);
        assert!(cli.run_options().workers.is_empty());
        assert_eq!(cli.parallel, 1);
    }

    #[test]
    fn test_confirmation_flags_conflict() {
        assert!(Cli::try_parse_from(["worker-health", "--yes", "--no-confirm"]).is_err());
        let cli = Cli::try_parse_from(["worker-health", "--no-confirm"]).unwrap();
        assert_eq!(cli.confirm_policy(), ConfirmPolicy::AlwaysDeny);
    }

    #[test]
    fn test_bad_scale_is_rejected() {
        assert!(Cli::try_parse_from(["worker-health", "-s", "tb_c_worker"]).is_err());
    }
}
