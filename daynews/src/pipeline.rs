use crate::assembler;
use crate::config::AppConfig;
use crate::converter::ConversionInvoker;
use crate::delivery::DeliveryDispatcher;
use crate::feed_manager::FeedManager;
use crate::lock::{LockPolicy, RunLock};
use crate::normalizer;
use crate::rss_utils::time::format_duration;
use crate::traits::{ConversionTool, FeedSource};
use crate::types::{
    CompiledDocument, DayNewsError, DeliveryMode, DeliveryReport, FeedOutcome, FeedSection,
    MailTransport, Result, RunRecord, RunStatus,
};
use chrono::{Local, Utc};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
/// EX_TEMPFAIL: another run holds the lock; try again next period
pub const EXIT_LOCK_CONTENDED: i32 = 75;
/// EX_CONFIG
pub const EXIT_CONFIG_INVALID: i32 = 78;

/// Stages of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Idle,
    AcquiringLock,
    Fetching,
    Assembling,
    Converting,
    Delivering,
    Done,
    Failed,
}

impl RunStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStage::Done | RunStage::Failed)
    }

    pub fn can_transition_to(self, next: RunStage) -> bool {
        use RunStage::*;
        match (self, next) {
            (Idle, AcquiringLock)
            | (AcquiringLock, Fetching)
            | (Fetching, Assembling)
            | (Assembling, Converting)
            | (Converting, Delivering)
            | (Delivering, Done) => true,
            // Unexpected errors, timeouts and interrupts can end any live stage
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// The run's state machine value. Owned by the orchestrator alone.
#[derive(Debug)]
pub struct RunState {
    stage: RunStage,
    record: RunRecord,
    document: Option<CompiledDocument>,
    delivery: Option<DeliveryReport>,
}

impl RunState {
    fn new(run_id: Uuid) -> Self {
        Self {
            stage: RunStage::Idle,
            record: RunRecord::new(run_id, Utc::now()),
            document: None,
            delivery: None,
        }
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    fn transition(&mut self, next: RunStage) -> Result<()> {
        if !self.stage.can_transition_to(next) {
            return Err(DayNewsError::General(format!(
                "invalid run transition {:?} -> {:?}",
                self.stage, next
            )));
        }
        debug!("Run {}: {:?} -> {:?}", self.record.run_id, self.stage, next);
        self.stage = next;
        Ok(())
    }
}

/// How the pipeline ended when it reached the delivery stage
#[derive(Debug)]
enum PipelineEnd {
    Delivered,
    Undelivered(String),
}

/// Everything a caller needs after a run: the exit code is the only thing
/// the scheduler looks at.
#[derive(Debug)]
pub struct RunOutcome {
    pub record: RunRecord,
    pub final_stage: RunStage,
    pub exit_code: i32,
    pub document: Option<CompiledDocument>,
    pub delivery: Option<DeliveryReport>,
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        self.record.status.unwrap_or(RunStatus::Failed)
    }
}

/// External collaborators of the pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub feed_source: Arc<dyn FeedSource>,
    pub conversion_tool: Arc<dyn ConversionTool>,
    pub mail_transport: Arc<dyn MailTransport>,
}

pub struct Orchestrator {
    config: AppConfig,
    mode: DeliveryMode,
    collaborators: Collaborators,
}

impl Orchestrator {
    pub fn new(config: AppConfig, mode: DeliveryMode, collaborators: Collaborators) -> Self {
        Self {
            config,
            mode,
            collaborators,
        }
    }

    pub async fn run(&self) -> RunOutcome {
        self.run_until(std::future::pending()).await
    }

    /// Run the pipeline; if `shutdown` resolves first the run is cancelled
    /// and recorded as failed with the returned reason.
    pub async fn run_until<F>(&self, shutdown: F) -> RunOutcome
    where
        F: Future<Output = String>,
    {
        let settings = &self.config.pipeline;
        let mut state = RunState::new(Uuid::new_v4());
        let run_id = state.record.run_id;

        info!(
            "Starting DayNews run {} ({} mode, {} feeds)",
            run_id,
            self.mode,
            self.config.feeds.len()
        );

        if let Err(e) = state.transition(RunStage::AcquiringLock) {
            return finish_failed(state, e.to_string(), EXIT_FAILED);
        }

        let policy = LockPolicy {
            max_age: Duration::from_secs(settings.stale_lock_max_age_secs),
        };
        let lock = match RunLock::acquire(&settings.lock_path, run_id, policy) {
            Ok(lock) => lock,
            Err(e @ DayNewsError::LockContended { .. }) => {
                error!("Lock contention, another run is in progress: {}", e);
                return finish_failed(state, format!("lock contended: {}", e), EXIT_LOCK_CONTENDED);
            }
            Err(e) => {
                error!("Failed to acquire run lock {}: {}", settings.lock_path.display(), e);
                return finish_failed(state, e.to_string(), EXIT_FAILED);
            }
        };

        let work_dir = settings.output_dir.join(".work").join(run_id.to_string());
        let budget = Duration::from_secs(settings.run_budget_secs);

        let result = tokio::select! {
            result = tokio::time::timeout(budget, self.execute(&mut state, &work_dir)) => {
                match result {
                    Ok(result) => result,
                    Err(_) => Err(DayNewsError::RunTimedOut { seconds: budget.as_secs() }),
                }
            }
            reason = shutdown => Err(DayNewsError::Interrupted(reason)),
        };

        remove_work_dir(&work_dir);
        if let Err(e) = lock.release() {
            warn!("Failed to release run lock: {}", e);
        }

        match result {
            Ok(PipelineEnd::Delivered) => finish(state, RunStatus::Success, None, EXIT_OK),
            // The artifact exists; a delivery problem is logged, not escalated
            Ok(PipelineEnd::Undelivered(reason)) => {
                finish(state, RunStatus::PartialFailure, Some(reason), EXIT_OK)
            }
            Err(e) => {
                error!("Run failed during {:?}: {}", state.stage, e);
                finish_failed(state, e.to_string(), EXIT_FAILED)
            }
        }
    }

    async fn execute(&self, state: &mut RunState, work_dir: &Path) -> Result<PipelineEnd> {
        let settings = &self.config.pipeline;
        let started_at = state.record.started_at;

        state.transition(RunStage::Fetching)?;
        // The per-request timeout is feed_timeout_secs; retries get room too
        let feed_manager = FeedManager::new(
            self.collaborators.feed_source.clone(),
            settings.fetch_config().total_budget(),
            settings.concurrent_fetch,
        );
        let fetches = feed_manager.fetch_all(&self.config.feeds).await;

        let mut sections = Vec::with_capacity(fetches.len());
        for fetch in fetches {
            let label = fetch.feed.label.clone();
            match fetch.result {
                Ok(entries) => {
                    let articles = normalizer::normalize(&fetch.feed, entries, started_at);
                    state
                        .record
                        .record_feed(&label, FeedOutcome::ArticleCount(articles.len()));
                    sections.push(FeedSection {
                        label,
                        articles,
                        fetch_error: None,
                    });
                }
                Err(e) => {
                    let reason = match e {
                        DayNewsError::FeedUnavailable { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    state
                        .record
                        .record_feed(&label, FeedOutcome::FetchError(reason.clone()));
                    sections.push(FeedSection {
                        label,
                        articles: Vec::new(),
                        fetch_error: Some(reason),
                    });
                }
            }
        }

        let failed = state.record.failed_feed_count();
        if failed > 0 {
            warn!("{} of {} feeds failed; continuing with the rest", failed, self.config.feeds.len());
        }

        state.transition(RunStage::Assembling)?;
        let document = assembler::compile(&settings.digest_title, Utc::now(), sections);
        state.document = Some(document.clone());
        let assembled = assembler::assemble(document, work_dir)?;

        state.transition(RunStage::Converting)?;
        let invoker = ConversionInvoker::new(
            self.collaborators.conversion_tool.clone(),
            Duration::from_secs(settings.conversion_timeout_secs),
            settings.converter_flags.clone(),
        );
        let artifact_path = settings.artifact_path(started_at.with_timezone(&Local).date_naive());
        let conversion = invoker
            .convert(&assembled.document_path, &artifact_path, &settings.digest_title)
            .await?;
        state.record.artifact_path = Some(conversion.artifact_path.clone());

        state.transition(RunStage::Delivering)?;
        let dispatcher = DeliveryDispatcher::new(self.collaborators.mail_transport.clone(), &self.config.email);
        match dispatcher.deliver(&conversion, self.mode).await {
            Ok(report) => {
                state.delivery = Some(report);
                Ok(PipelineEnd::Delivered)
            }
            Err(e) => Ok(PipelineEnd::Undelivered(e.to_string())),
        }
    }
}

/// Outcome for a run that never got as far as the lock, e.g. bad configuration.
pub fn failed_before_start(error: &DayNewsError) -> RunOutcome {
    let exit_code = match error {
        DayNewsError::ConfigInvalid(_) => EXIT_CONFIG_INVALID,
        _ => EXIT_FAILED,
    };
    error!("Cannot start run: {}", error);
    finish_failed(RunState::new(Uuid::new_v4()), error.to_string(), exit_code)
}

fn finish_failed(state: RunState, reason: String, exit_code: i32) -> RunOutcome {
    finish(state, RunStatus::Failed, Some(reason), exit_code)
}

fn finish(mut state: RunState, status: RunStatus, reason: Option<String>, exit_code: i32) -> RunOutcome {
    let terminal = match status {
        RunStatus::Failed => RunStage::Failed,
        RunStatus::Success | RunStatus::PartialFailure => RunStage::Done,
    };
    if let Err(e) = state.transition(terminal) {
        // Only reachable through a bug; the status still stands
        warn!("{}", e);
        state.stage = terminal;
    }

    let finished_at = Utc::now();
    state.record.finished_at = Some(finished_at);
    state.record.status = Some(status);
    state.record.failure_reason = reason;

    log_summary(&state.record, exit_code);

    RunOutcome {
        record: state.record,
        final_stage: state.stage,
        exit_code,
        document: state.document,
        delivery: state.delivery,
    }
}

/// The single closing line of every run.
fn log_summary(record: &RunRecord, exit_code: i32) {
    let finished_at = record.finished_at.unwrap_or_else(Utc::now);
    let duration = finished_at
        .signed_duration_since(record.started_at)
        .to_std()
        .unwrap_or_default();
    let feeds = record
        .outcomes_in_order()
        .iter()
        .map(|(label, outcome)| format!("{}: {}", label, outcome))
        .collect::<Vec<_>>()
        .join("; ");
    let artifact = record
        .artifact_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "none".to_string());
    let status = record.status.unwrap_or(RunStatus::Failed);
    let reason = record.failure_reason.as_deref().unwrap_or("-");

    let line = format!(
        "run summary: status={} exit_code={} run_id={} started={} finished={} duration={} artifact={} feeds=[{}] reason={}",
        status,
        exit_code,
        record.run_id,
        record.started_at.to_rfc3339(),
        finished_at.to_rfc3339(),
        format_duration(duration),
        artifact,
        feeds,
        reason
    );

    match status {
        RunStatus::Success => info!("{}", line),
        RunStatus::PartialFailure => warn!("{}", line),
        RunStatus::Failed => error!("{}", line),
    }
}

fn remove_work_dir(work_dir: &Path) {
    match std::fs::remove_dir_all(work_dir) {
        Ok(()) => debug!("Removed working directory {}", work_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove working directory {}: {}", work_dir.display(), e),
    }
}
