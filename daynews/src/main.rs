use clap::Parser;
use daynews::config::AppConfig;
use daynews::config::PipelineSettings;
use daynews::logging::init_logging;
use daynews::pipeline::{self, Collaborators, Orchestrator, EXIT_FAILED};
use daynews::{DeliveryMode, EbookConvert, HttpFeedSource, MailTransport};
use email_delivery::SmtpMailer;
use interfaces::empty::RefusingTransport;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// DayNews: RSS to e-book automation
#[derive(Debug, Parser)]
#[command(name = "daynews", version)]
struct Cli {
    /// Run the full pipeline now; implies --dry-run unless --send-email is given
    #[arg(long)]
    test: bool,

    /// Do everything except transmit the email
    #[arg(long)]
    dry_run: bool,

    /// Send the email even in --test mode
    #[arg(long)]
    send_email: bool,

    /// Directory holding feeds.json, email_config.json and pipeline.json
    #[arg(long, env = "DAYNEWS_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,
}

impl Cli {
    fn delivery_mode(&self) -> DeliveryMode {
        if self.dry_run || (self.test && !self.send_email) {
            DeliveryMode::DryRun
        } else {
            DeliveryMode::Live
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // The log directory comes from the configuration, so load it first and
    // report any problem once logging is up.
    let loaded = AppConfig::load(&cli.config_dir);
    let log_dir = match &loaded {
        Ok(config) => config.pipeline.log_dir.clone(),
        Err(_) => PipelineSettings::default().log_dir,
    };
    let default_level = if cli.test { "debug" } else { "info" };
    let _guard = init_logging(&log_dir, default_level)?;

    info!("Starting DayNews process (mode: {}, test: {})", cli.delivery_mode(), cli.test);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => return Ok(exit_code(pipeline::failed_before_start(&e).exit_code)),
    };
    info!(
        "Configuration loaded from {} ({} feeds)",
        config.config_dir.display(),
        config.feeds.len()
    );

    let feed_source = match HttpFeedSource::new(config.pipeline.fetch_config()) {
        Ok(source) => Arc::new(source),
        Err(e) => return Ok(exit_code(pipeline::failed_before_start(&e).exit_code)),
    };

    let mode = cli.delivery_mode();
    let mail_transport: Arc<dyn MailTransport> = match mode {
        DeliveryMode::Live => Arc::new(SmtpMailer::new(config.email.smtp_config())),
        DeliveryMode::DryRun => Arc::new(RefusingTransport),
    };

    let collaborators = Collaborators {
        feed_source,
        conversion_tool: Arc::new(EbookConvert::new(config.pipeline.converter_program.clone())),
        mail_transport,
    };

    let orchestrator = Orchestrator::new(config, mode, collaborators);
    let outcome = orchestrator.run_until(shutdown_signal()).await;

    Ok(exit_code(outcome.exit_code))
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(EXIT_FAILED as u8))
}

/// Resolves with the signal name on SIGINT or SIGTERM.
async fn shutdown_signal() -> String {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                return ctrl_c().await;
            }
        };

        tokio::select! {
            name = ctrl_c() => name,
            _ = terminate.recv() => "SIGTERM".to_string(),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await
    }
}

async fn ctrl_c() -> String {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT".to_string(),
        Err(e) => {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending().await
        }
    }
}
