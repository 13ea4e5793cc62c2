//! Main orchestrator implementation
//!
//! Runs a batch of subjects through the stage pipeline on a bounded worker
//! pool, using dependency injection for every external capability.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use oximetry::{DesaturationCounter, SignalCleaner};
use shared::{logging, subject_error, FailureKind, PipelineConfig, Recording};

use crate::{
    core::{RunSummary, SubjectOutcome},
    error::{ArtifactError, OrchestratorError, OrchestratorResult},
    pipeline::{BatchSettings, RunMode, SubjectPipeline},
    traits::{ArtifactStore, BiomarkerEngine, Fetcher, SignalSource},
};

/// Coordinates a batch of subjects through fetch, clean, evict and features
pub struct Orchestrator<F, S, B, A>
where
    F: Fetcher + 'static,
    S: SignalSource + 'static,
    B: BiomarkerEngine + 'static,
    A: ArtifactStore + 'static,
{
    /// Injected services
    fetcher: Arc<F>,
    source: Arc<S>,
    engine: Arc<B>,
    store: Arc<A>,

    cleaner: Arc<SignalCleaner>,
    counter: DesaturationCounter,
    settings: BatchSettings,
    config: PipelineConfig,

    /// Bounds the number of subjects in flight
    workers: Arc<Semaphore>,
}

impl<F, S, B, A> Orchestrator<F, S, B, A>
where
    F: Fetcher + 'static,
    S: SignalSource + 'static,
    B: BiomarkerEngine + 'static,
    A: ArtifactStore + 'static,
{
    /// Create new orchestrator with injected dependencies
    pub fn new(
        fetcher: F,
        source: S,
        engine: B,
        store: A,
        settings: BatchSettings,
        config: PipelineConfig,
    ) -> OrchestratorResult<Self> {
        config.validate()?;
        if settings.channel.trim().is_empty() {
            return Err(OrchestratorError::config("channel"));
        }

        let workers = Arc::new(Semaphore::new(config.max_workers));
        Ok(Self {
            fetcher: Arc::new(fetcher),
            source: Arc::new(source),
            engine: Arc::new(engine),
            store: Arc::new(store),
            cleaner: Arc::new(SignalCleaner::default()),
            counter: DesaturationCounter::default(),
            settings,
            config,
            workers,
        })
    }

    pub fn with_cleaner(mut self, cleaner: SignalCleaner) -> Self {
        self.cleaner = Arc::new(cleaner);
        self
    }

    pub fn with_counter(mut self, counter: DesaturationCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn store(&self) -> &A {
        &self.store
    }

    /// Feature-table width: the engine's panel plus the desaturation index
    pub fn feature_columns(&self) -> usize {
        self.engine.feature_names().len() + 1
    }

    fn pipeline(&self) -> SubjectPipeline<F, S, B, A> {
        SubjectPipeline {
            fetcher: Arc::clone(&self.fetcher),
            source: Arc::clone(&self.source),
            engine: Arc::clone(&self.engine),
            store: Arc::clone(&self.store),
            cleaner: Arc::clone(&self.cleaner),
            counter: self.counter.clone(),
            settings: self.settings.clone(),
        }
    }

    /// fetch → clean → evict → features for every recording
    pub async fn run_all(&self, recordings: &[Recording]) -> OrchestratorResult<RunSummary> {
        self.run(RunMode::Full, recordings).await
    }

    pub async fn run_download(&self, recordings: &[Recording]) -> OrchestratorResult<RunSummary> {
        self.run(RunMode::Download, recordings).await
    }

    pub async fn run_clean(&self, recordings: &[Recording]) -> OrchestratorResult<RunSummary> {
        self.run(RunMode::Clean, recordings).await
    }

    pub async fn run_evict(&self, recordings: &[Recording]) -> OrchestratorResult<RunSummary> {
        self.run(RunMode::Evict, recordings).await
    }

    pub async fn run_features(&self, recordings: &[Recording]) -> OrchestratorResult<RunSummary> {
        self.run(RunMode::Features, recordings).await
    }

    /// Process every recording in `mode` and summarise the outcomes
    ///
    /// Per-subject failures are recorded in the summary; only an unusable
    /// output location or worker pool aborts the run.
    pub async fn run(&self, mode: RunMode, recordings: &[Recording]) -> OrchestratorResult<RunSummary> {
        let started_at = Utc::now();

        self.store.prepare().await.map_err(|e| match e {
            ArtifactError::Io { path, source } => OrchestratorError::file_system("create output directory", path, source),
            other => other.into(),
        })?;

        logging::log_startup(&format!(
            "{} of {} subject(s) from {} with {} worker(s)",
            mode,
            recordings.len(),
            self.settings.dataset,
            self.config.max_workers
        ));

        let pipeline = Arc::new(self.pipeline());
        let mut handles: Vec<(Recording, JoinHandle<SubjectOutcome>)> = Vec::with_capacity(recordings.len());

        for recording in recordings {
            let permit = Arc::clone(&self.workers)
                .acquire_owned()
                .await
                .map_err(|e| OrchestratorError::WorkerPoolError { reason: e.to_string() })?;

            let pipeline = Arc::clone(&pipeline);
            let task_recording = recording.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                pipeline.process(mode, task_recording).await
            });
            handles.push((recording.clone(), handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (recording, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    subject_error!(recording.subject, mode.first_stage(), "💥 Worker panicked: {}", e);
                    SubjectOutcome::failed(recording, mode.first_stage(), FailureKind::WorkerPanicked, e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        let summary = RunSummary::new(started_at, outcomes);
        logging::log_summary(summary.processed(), summary.skipped(), summary.failed());
        Ok(summary)
    }
}
