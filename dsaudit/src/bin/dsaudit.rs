use std::{
    io::{self, Write},
    num::NonZeroUsize,
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};
use dsaudit::{
    audit,
    collector::{self, ConnectivityError, Elasticsearch},
    config::{self, Config},
    report::{self, Format, Sort},
};
use tokio::runtime::Builder;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::Error),
    #[error("Could not set up cluster client: {0}")]
    Collector(#[from] collector::elasticsearch::Error),
    #[error("Cluster unreachable, no report produced: {0}")]
    Connectivity(#[from] ConnectivityError),
    #[error("Failed to write report: {0}")]
    Report(#[from] report::Error),
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit every data stream of the cluster and print the report
    Run(Box<RunCommand>),
    /// Validate configuration file and exit
    ConfigCheck(ConfigCheckCommand),
}

#[derive(Args)]
struct RunCommand {
    /// path on disk to the configuration file
    #[clap(long)]
    config_path: Option<PathBuf>,
    /// base url of the cluster, e.g. https://localhost:9200
    #[clap(long)]
    url: Option<String>,
    /// user for basic authentication, password is read from DSAUDIT_PASSWORD
    #[clap(long)]
    username: Option<String>,
    /// number of data streams fetched concurrently
    #[clap(long)]
    workers: Option<NonZeroUsize>,
    /// extra attempts per data stream after a transient failure
    #[clap(long)]
    max_retries: Option<u32>,
    /// event time field used for retention and recency
    #[clap(long)]
    timestamp_field: Option<String>,
    /// days without new data after which a stream is stagnant
    #[clap(long)]
    stagnant_after_days: Option<f64>,
    /// retention, in days, below which a stream is short-lived
    #[clap(long)]
    short_lived_below_days: Option<f64>,
    /// recency, in days, reported as "now"
    #[clap(long)]
    now_within_days: Option<f64>,
    /// output format, table or json
    #[clap(long)]
    format: Option<Format>,
    /// row order, listed or ingest
    #[clap(long)]
    sort: Option<Sort>,
    /// leave stagnant streams out of the report
    #[clap(long)]
    exclude_stagnant: bool,
}

#[derive(Args)]
struct ConfigCheckCommand {
    /// path on disk to the configuration file
    #[clap(long)]
    config_path: Option<PathBuf>,
}

fn get_config(args: &RunCommand) -> Result<Config, Error> {
    let mut config = Config::load(args.config_path.as_deref())?;

    if let Some(url) = &args.url {
        config.cluster.url.clone_from(url);
    }
    if let Some(username) = &args.username {
        config.cluster.username = Some(username.clone());
    }
    if let Some(timestamp_field) = &args.timestamp_field {
        config.cluster.timestamp_field.clone_from(timestamp_field);
    }
    if let Some(workers) = args.workers {
        config.audit.max_workers = workers;
    }
    if let Some(max_retries) = args.max_retries {
        config.audit.max_retries = max_retries;
    }
    if let Some(days) = args.stagnant_after_days {
        config.thresholds.stagnant_after_days = days;
    }
    if let Some(days) = args.short_lived_below_days {
        config.thresholds.short_lived_below_days = days;
    }
    if let Some(days) = args.now_within_days {
        config.thresholds.now_within_days = days;
    }
    if let Some(format) = args.format {
        config.report.format = format;
    }
    if let Some(sort) = args.sort {
        config.report.sort = sort;
    }
    if args.exclude_stagnant {
        config.report.exclude_stagnant = true;
    }

    config.validate()?;
    Ok(config)
}

async fn inner_main(config: Config) -> Result<(), Error> {
    let collector = Elasticsearch::new(config.cluster.clone())?;
    let audit = audit::run(&collector, &config.audit, &config.thresholds).await?;

    let summary = audit.summary();
    if summary.unavailable > 0 {
        info!(
            "{unavailable} of {streams} data streams were unavailable",
            unavailable = summary.unavailable,
            streams = summary.streams
        );
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    report::render(&audit, &config.report, &mut out)?;
    out.flush()?;
    Ok(())
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(io::stderr)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting dsaudit {version} run.");

    let args = match Cli::parse().command {
        Commands::Run(run_cmd) => run_cmd,
        Commands::ConfigCheck(config_check_cmd) => {
            match Config::load(config_check_cmd.config_path.as_deref()) {
                Ok(_) => {
                    info!("Configuration file is valid");
                    std::process::exit(0)
                }
                Err(err) => {
                    error!("Configuration validation failed: {err}");
                    std::process::exit(1)
                }
            }
        }
    };

    let config = get_config(&args)?;
    info!("Auditing data streams at {url}", url = config.cluster.url);

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let res = runtime.block_on(inner_main(config));
    if let Err(err) = &res {
        error!("{err}");
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_command(args: &[&str]) -> RunCommand {
        let cli = Cli::parse_from(args);
        match cli.command {
            Commands::Run(run_cmd) => *run_cmd,
            Commands::ConfigCheck(_) => panic!("expected the run subcommand"),
        }
    }

    #[test]
    fn flags_override_configuration() {
        let tmp_dir = std::env::temp_dir().join(format!("dsaudit-{}", std::process::id()));
        std::fs::create_dir_all(&tmp_dir).expect("directory could not be created");
        let config_path = tmp_dir.join("dsaudit.yaml");
        std::fs::write(
            &config_path,
            "cluster:\n  url: http://config:9200\naudit:\n  max_workers: 2\n",
        )
        .expect("config written");
        let config_arg = format!("--config-path={}", config_path.display());

        let args = run_command(&[
            "dsaudit",
            "run",
            config_arg.as_str(),
            "--url",
            "https://flag:9200",
            "--workers",
            "9",
            "--format",
            "json",
            "--sort",
            "ingest",
            "--exclude-stagnant",
            "--stagnant-after-days",
            "7",
        ]);
        let config = get_config(&args).expect("valid configuration");

        assert_eq!(config.cluster.url, "https://flag:9200");
        assert_eq!(config.audit.max_workers.get(), 9);
        assert_eq!(config.report.format, Format::Json);
        assert_eq!(config.report.sort, Sort::Ingest);
        assert!(config.report.exclude_stagnant);
        assert!((config.thresholds.stagnant_after_days - 7.0).abs() < f64::EPSILON);
        std::fs::remove_dir_all(&tmp_dir).expect("directory removed");
    }

    #[test]
    fn invalid_threshold_flags_are_rejected() {
        let tmp_dir = std::env::temp_dir().join(format!("dsaudit-bad-{}", std::process::id()));
        std::fs::create_dir_all(&tmp_dir).expect("directory could not be created");
        let config_path = tmp_dir.join("dsaudit.yaml");
        std::fs::write(&config_path, "{}").expect("config written");
        let config_arg = format!("--config-path={}", config_path.display());

        let args = run_command(&[
            "dsaudit",
            "run",
            config_arg.as_str(),
            "--now-within-days",
            "5",
        ]);
        assert!(matches!(get_config(&args), Err(Error::Config(_))));
        std::fs::remove_dir_all(&tmp_dir).expect("directory removed");
    }

    #[test]
    fn unknown_format_is_a_usage_error() {
        let result = Cli::try_parse_from(["dsaudit", "run", "--format", "yaml"]);
        assert!(result.is_err());
    }
}
