#![forbid(unsafe_code)]

//! `statement-runner`: interactive session worker binary.
//!
//! Loads configuration, opens the metadata and data source databases,
//! resolves collaborators, and drives one session until it goes idle or
//! another worker takes it over.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use statement_runner::config::GlobalConfig;
use statement_runner::orchestrator::session_driver::{SessionDriver, SessionOutcome};
use statement_runner::orchestrator::ExecutionContext;
use statement_runner::registry::{Registry, Resources};
use statement_runner::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "statement-runner", about = "Interactive session statement worker", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override `session.session_id`.
    #[arg(long)]
    session_id: Option<String>,

    /// Override `session.job_id`.
    #[arg(long)]
    job_id: Option<String>,

    /// Override `session.application_id`.
    #[arg(long)]
    application_id: Option<String>,

    /// Override `session.data_source`.
    #[arg(long)]
    data_source: Option<String>,

    /// Override `session.excluded_job_ids` (repeatable).
    #[arg(long = "exclude-job-id")]
    excluded_job_ids: Vec<String>,

    /// Override `timeouts.inactivity_limit_seconds`.
    #[arg(long)]
    inactivity_limit_seconds: Option<u64>,

    /// Override `timeouts.query_execution_timeout_seconds`.
    #[arg(long)]
    query_execution_timeout_seconds: Option<u64>,

    /// Override `timeouts.query_wait_limit_seconds`.
    #[arg(long)]
    query_wait_limit_seconds: Option<u64>,

    /// Override `timeouts.poll_interval_millis`.
    #[arg(long)]
    poll_interval_millis: Option<u64>,

    /// Override `timeouts.ownership_check_interval_seconds`.
    #[arg(long)]
    ownership_check_interval_seconds: Option<u64>,

    /// Override `heartbeat.interval_seconds`.
    #[arg(long)]
    heartbeat_interval_seconds: Option<u64>,

    /// Override `heartbeat.initial_delay_seconds`.
    #[arg(long)]
    heartbeat_initial_delay_seconds: Option<u64>,

    /// Override `retry.max_retries`.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Override `retry.initial_delay_millis`.
    #[arg(long)]
    retry_initial_delay_millis: Option<u64>,
}

impl Cli {
    /// Fold command-line overrides into `config`.
    fn apply_overrides(&self, config: &mut GlobalConfig) {
        let session = &mut config.session;
        if let Some(id) = &self.session_id {
            session.session_id.clone_from(id);
        }
        if let Some(id) = &self.job_id {
            session.job_id.clone_from(id);
        }
        if let Some(id) = &self.application_id {
            session.application_id.clone_from(id);
        }
        if let Some(source) = &self.data_source {
            session.data_source.clone_from(source);
        }
        if !self.excluded_job_ids.is_empty() {
            session.excluded_job_ids.clone_from(&self.excluded_job_ids);
        }

        let timeouts = &mut config.timeouts;
        override_with(&mut timeouts.inactivity_limit_seconds, self.inactivity_limit_seconds);
        override_with(
            &mut timeouts.query_execution_timeout_seconds,
            self.query_execution_timeout_seconds,
        );
        override_with(&mut timeouts.query_wait_limit_seconds, self.query_wait_limit_seconds);
        override_with(&mut timeouts.poll_interval_millis, self.poll_interval_millis);
        override_with(
            &mut timeouts.ownership_check_interval_seconds,
            self.ownership_check_interval_seconds,
        );

        override_with(&mut config.heartbeat.interval_seconds, self.heartbeat_interval_seconds);
        override_with(
            &mut config.heartbeat.initial_delay_seconds,
            self.heartbeat_initial_delay_seconds,
        );
        override_with(&mut config.retry.max_retries, self.max_retries);
        override_with(&mut config.retry.initial_delay_millis, self.retry_initial_delay_millis);
    }
}

fn override_with<T: Copy>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    info!("statement-runner bootstrap");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(SessionOutcome::Completed | SessionOutcome::Superseded) => ExitCode::SUCCESS,
        Ok(SessionOutcome::Failed(reason)) => {
            error!(%reason, "session failed");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(%err, "statement-runner exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<SessionOutcome> {
    // ── Load configuration ──────────────────────────────
    let raw = std::fs::read_to_string(&args.config)
        .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
    let mut config: GlobalConfig = toml::from_str(&raw)?;
    args.apply_overrides(&mut config);
    config.validate()?;
    let config = Arc::new(config);
    info!(session_id = %config.session.session_id, "configuration loaded");

    // ── Open databases and resolve collaborators ────────
    let resources = Resources::open(Arc::clone(&config)).await?;
    info!("databases connected");
    let collaborators = Registry::with_defaults().resolve(&config.collaborators, &resources)?;

    // ── Drive the session ───────────────────────────────
    let ctx = Arc::new(ExecutionContext::from_config(&config, collaborators));
    let driver = SessionDriver::new(ctx);

    let outcome = tokio::select! {
        outcome = driver.run() => outcome?,
        () = shutdown_signal() => {
            warn!("shutdown signal received before the session finished");
            return Err(AppError::Conflict("interrupted by shutdown signal".into()));
        }
    };

    resources.metadata_db.close().await;
    resources.data_source_db.close().await;
    info!(?outcome, "statement-runner shut down");
    Ok(outcome)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
