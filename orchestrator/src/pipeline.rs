//! One subject's walk through fetch, clean, evict and features
//!
//! Every stage is gated on the artifact store: a stage whose artifact already
//! exists is never re-run. Errors never escape `process`; they are classified
//! into the subject's outcome so sibling subjects are unaffected.

use std::fmt;
use std::sync::Arc;

use oximetry::{CleanedSeries, DesaturationCounter, SamplingRate, SignalCleaner};
use shared::{subject_debug, subject_error, subject_info, subject_warn, ArtifactKind, RawFormat, Recording, Stage, SubjectState};

use crate::core::{SkipReason, SubjectOutcome};
use crate::error::{ArtifactError, PipelineError};
use crate::export;
use crate::traits::{ArtifactStore, BiomarkerEngine, FetchRequest, Fetcher, SignalSource};

/// Feature-table column holding the rolling-median desaturation index
pub const ODI_COLUMN: &str = "ODI";

/// Which part of the stage sequence a batch runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// fetch → clean → evict → features
    Full,
    Download,
    Clean,
    Evict,
    Features,
}

impl RunMode {
    /// Whether this mode may need to download
    pub fn fetches(&self) -> bool {
        matches!(self, RunMode::Full | RunMode::Download)
    }

    pub fn first_stage(&self) -> Stage {
        match self {
            RunMode::Full | RunMode::Download => Stage::Fetch,
            RunMode::Clean => Stage::Clean,
            RunMode::Evict => Stage::Evict,
            RunMode::Features => Stage::Features,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunMode::Full => "full pipeline",
            RunMode::Download => "download",
            RunMode::Clean => "clean",
            RunMode::Evict => "evict",
            RunMode::Features => "features",
        };
        f.write_str(name)
    }
}

/// Batch-wide parameters shared by every subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    pub dataset: String,
    /// Archive sub-path; also the local directory under the dataset
    pub subpath: String,
    /// Preferred channel name; known SpO2 aliases are tried after it
    pub channel: String,
}

impl BatchSettings {
    pub fn new(dataset: impl Into<String>, subpath: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            subpath: subpath.into(),
            channel: channel.into(),
        }
    }
}

pub struct SubjectPipeline<F, S, B, A> {
    pub(crate) fetcher: Arc<F>,
    pub(crate) source: Arc<S>,
    pub(crate) engine: Arc<B>,
    pub(crate) store: Arc<A>,
    pub(crate) cleaner: Arc<SignalCleaner>,
    pub(crate) counter: DesaturationCounter,
    pub(crate) settings: BatchSettings,
}

impl<F, S, B, A> SubjectPipeline<F, S, B, A>
where
    F: Fetcher + 'static,
    S: SignalSource + 'static,
    B: BiomarkerEngine + 'static,
    A: ArtifactStore + 'static,
{
    pub async fn process(&self, mode: RunMode, recording: Recording) -> SubjectOutcome {
        match mode {
            RunMode::Full => self.run_full(recording).await,
            RunMode::Download => self.run_download(recording).await,
            RunMode::Clean => self.run_clean(recording).await,
            RunMode::Evict => self.run_evict(recording).await,
            RunMode::Features => self.run_features(recording).await,
        }
    }

    /// Current state as evidenced by artifacts on disk
    pub async fn resume_state(&self, recording: &Recording) -> Result<SubjectState, PipelineError> {
        if self.store.exists(ArtifactKind::FeatureRow, recording).await? {
            return Ok(SubjectState::Featured);
        }
        if self.store.exists(ArtifactKind::SkipMarker, recording).await? {
            return Ok(SubjectState::Skipped);
        }
        let cleaned = self.store.exists(ArtifactKind::Cleaned, recording).await?;
        let raw = self.store.exists(ArtifactKind::Raw, recording).await?;
        Ok(match (cleaned, raw) {
            (true, true) => SubjectState::Cleaned,
            (true, false) => SubjectState::RawEvicted,
            (false, true) => SubjectState::Fetched,
            (false, false) => SubjectState::Pending,
        })
    }

    async fn run_full(&self, recording: Recording) -> SubjectOutcome {
        let mut state = match self.resume_state(&recording).await {
            Ok(state) => state,
            Err(e) => return self.failure(recording, Stage::Fetch, e),
        };
        if state == SubjectState::Skipped {
            return self.recorded_skip(recording).await;
        }
        if state != SubjectState::Pending {
            subject_debug!(recording.subject, Stage::Fetch, "⏩ Resuming from {}", state);
        }

        let mut ran = Vec::new();
        let mut regenerated = false;

        while let Some(stage) = state.next_stage() {
            let result = match stage {
                Stage::Fetch => self.fetch(&recording).await.map(|_| SubjectState::Fetched),
                Stage::Clean => self.clean(&recording).await.map(|_| SubjectState::Cleaned),
                Stage::Evict => self.evict(&recording).await.map(|_| SubjectState::RawEvicted),
                Stage::Features => match self.store.read_cleaned(&recording).await {
                    Ok(series) => self.features(&recording, series).await.map(|_| SubjectState::Featured),
                    Err(ArtifactError::Malformed { path, message }) if !regenerated => {
                        subject_warn!(
                            recording.subject,
                            stage,
                            "♻️ Cleaned series {} unreadable ({}), regenerating",
                            path.display(),
                            message
                        );
                        regenerated = true;
                        match self.regenerate_from(&recording).await {
                            Ok(restart) => {
                                state = restart;
                                continue;
                            }
                            Err(e) => Err(e),
                        }
                    }
                    Err(e) => Err(e.into()),
                },
            };

            match result {
                Ok(next) => {
                    ran.push(stage);
                    state = next;
                }
                Err(e) => return self.failure(recording, stage, e),
            }
        }

        subject_info!(recording.subject, Stage::Features, "✅ Complete ({} stage(s) run)", ran.len());
        SubjectOutcome::completed(recording, SubjectState::Done, ran)
    }

    /// Drop a malformed cleaned artifact and pick the state to restart from
    async fn regenerate_from(&self, recording: &Recording) -> Result<SubjectState, PipelineError> {
        self.store.discard_cleaned(recording).await?;
        if self.store.exists(ArtifactKind::Raw, recording).await? {
            Ok(SubjectState::Fetched)
        } else {
            Ok(SubjectState::Pending)
        }
    }

    async fn run_download(&self, recording: Recording) -> SubjectOutcome {
        match self.resume_state(&recording).await {
            Ok(SubjectState::Pending) => match self.fetch(&recording).await {
                Ok(()) => SubjectOutcome::completed(recording, SubjectState::Fetched, vec![Stage::Fetch]),
                Err(e) => self.failure(recording, Stage::Fetch, e),
            },
            Ok(SubjectState::Skipped) => self.recorded_skip(recording).await,
            Ok(state) => {
                subject_debug!(recording.subject, Stage::Fetch, "⏩ Already downloaded ({})", state);
                SubjectOutcome::completed(recording, state, Vec::new())
            }
            Err(e) => self.failure(recording, Stage::Fetch, e),
        }
    }

    async fn run_clean(&self, recording: Recording) -> SubjectOutcome {
        match self.resume_state(&recording).await {
            Ok(SubjectState::Pending) => self.not_ready(recording, SubjectState::Pending, Stage::Clean, ArtifactKind::Raw),
            Ok(SubjectState::Fetched) => match self.clean(&recording).await {
                Ok(()) => SubjectOutcome::completed(recording, SubjectState::Cleaned, vec![Stage::Clean]),
                Err(e) => self.failure(recording, Stage::Clean, e),
            },
            Ok(SubjectState::Skipped) => self.recorded_skip(recording).await,
            Ok(state) => SubjectOutcome::completed(recording, state, Vec::new()),
            Err(e) => self.failure(recording, Stage::Clean, e),
        }
    }

    async fn run_evict(&self, recording: Recording) -> SubjectOutcome {
        match self.resume_state(&recording).await {
            Ok(state @ (SubjectState::Pending | SubjectState::Fetched)) => {
                self.not_ready(recording, state, Stage::Evict, ArtifactKind::Cleaned)
            }
            Ok(SubjectState::Skipped) => self.recorded_skip(recording).await,
            Ok(state) => match self.store.evict_raw(&recording).await {
                Ok(true) => {
                    subject_info!(recording.subject, Stage::Evict, "🗑️ Raw recording removed");
                    let state = if state == SubjectState::Cleaned {
                        SubjectState::RawEvicted
                    } else {
                        state
                    };
                    SubjectOutcome::completed(recording, state, vec![Stage::Evict])
                }
                Ok(false) => SubjectOutcome::completed(recording, state, Vec::new()),
                Err(e) => self.failure(recording, Stage::Evict, e.into()),
            },
            Err(e) => self.failure(recording, Stage::Evict, e),
        }
    }

    async fn run_features(&self, recording: Recording) -> SubjectOutcome {
        match self.resume_state(&recording).await {
            Ok(SubjectState::Featured) => SubjectOutcome::completed(recording, SubjectState::Featured, Vec::new()),
            Ok(state @ (SubjectState::Pending | SubjectState::Fetched)) => {
                self.not_ready(recording, state, Stage::Features, ArtifactKind::Cleaned)
            }
            Ok(SubjectState::Skipped) => self.recorded_skip(recording).await,
            Ok(_) => {
                let result = match self.store.read_cleaned(&recording).await {
                    Ok(series) => self.features(&recording, series).await,
                    Err(e @ ArtifactError::Malformed { .. }) => {
                        // Absent from now on, so the next clean pass regenerates it
                        if let Err(discard) = self.store.discard_cleaned(&recording).await {
                            subject_warn!(recording.subject, Stage::Features, "Could not discard: {}", discard);
                        }
                        Err(e.into())
                    }
                    Err(e) => Err(e.into()),
                };
                match result {
                    Ok(()) => SubjectOutcome::completed(recording, SubjectState::Featured, vec![Stage::Features]),
                    Err(e) => self.failure(recording, Stage::Features, e),
                }
            }
            Err(e) => self.failure(recording, Stage::Features, e),
        }
    }

    /// Download the archive's EDF; other raw formats are converted from it
    async fn fetch(&self, recording: &Recording) -> Result<(), PipelineError> {
        let raw = self.store.path(ArtifactKind::Raw, recording);
        let destination = raw.with_extension(RawFormat::Edf.extension());
        let request = FetchRequest {
            dataset: self.settings.dataset.clone(),
            subpath: self.settings.subpath.clone(),
            file_name: format!("{}.{}", recording.stem, RawFormat::Edf.extension()),
            destination: destination.clone(),
        };

        let bytes = self.fetcher.fetch(&request).await?;
        subject_info!(recording.subject, Stage::Fetch, "📥 Downloaded {} ({} bytes)", request.file_name, bytes);
        if destination == raw {
            return Ok(());
        }

        let source = Arc::clone(&self.source);
        let channel = self.settings.channel.clone();
        let edf = destination.clone();
        let output = raw.clone();
        let converted = tokio::task::spawn_blocking(move || export::convert_recording(source.as_ref(), &edf, &output, &channel))
            .await
            .map_err(|e| PipelineError::Worker { message: e.to_string() })
            .and_then(|result| result);

        if let Err(e) = tokio::fs::remove_file(&destination).await {
            subject_warn!(recording.subject, Stage::Fetch, "Could not remove {}: {}", destination.display(), e);
        }
        let samples = converted?;
        subject_debug!(recording.subject, Stage::Fetch, "📦 Kept {} samples in {}", samples, raw.display());
        Ok(())
    }

    async fn clean(&self, recording: &Recording) -> Result<(), PipelineError> {
        let path = self.store.path(ArtifactKind::Raw, recording);
        let source = Arc::clone(&self.source);
        let cleaner = Arc::clone(&self.cleaner);
        let channel = self.settings.channel.clone();

        let cleaned = tokio::task::spawn_blocking(move || -> Result<(SamplingRate, CleanedSeries), PipelineError> {
            let channel = source.read(&path, &channel)?;
            let rate = channel.sampling_rate()?;
            let series = cleaner.clean(channel.values(), rate)?;
            Ok((rate, series))
        })
        .await
        .map_err(|e| PipelineError::Worker { message: e.to_string() })?;

        let (rate, series) = match cleaned {
            Ok(cleaned) => cleaned,
            Err(e) if e.kind().is_skip() => {
                self.record_skip(recording, &e).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.store.write_cleaned(recording, &series).await?;
        subject_info!(recording.subject, Stage::Clean, "🧹 Cleaned {} recording into {} s", rate, series.len());
        Ok(())
    }

    async fn evict(&self, recording: &Recording) -> Result<(), PipelineError> {
        if !self.store.evict_raw(recording).await? {
            subject_debug!(recording.subject, Stage::Evict, "Raw recording already absent");
        }
        Ok(())
    }

    async fn features(&self, recording: &Recording, series: CleanedSeries) -> Result<(), PipelineError> {
        let engine = Arc::clone(&self.engine);
        let counter = self.counter.clone();
        let features = tokio::task::spawn_blocking(move || {
            let mut features = engine.compute(&series);
            features.insert(ODI_COLUMN, counter.odi(&series));
            features
        })
        .await
        .map_err(|e| PipelineError::Worker { message: e.to_string() })?;

        match self.store.upsert_features(&recording.subject, &features).await {
            Err(ArtifactError::LockTimeout { path, waited }) => {
                subject_warn!(
                    recording.subject,
                    Stage::Features,
                    "🔒 Lock {} not acquired after {:?}, retrying once",
                    path.display(),
                    waited
                );
                self.store.upsert_features(&recording.subject, &features).await?;
            }
            other => other?,
        }

        subject_info!(
            recording.subject,
            Stage::Features,
            "📊 Stored {} features (ODI {:.2}/h)",
            features.len(),
            features.get(ODI_COLUMN).unwrap_or(f64::NAN)
        );
        Ok(())
    }

    /// Leave a skip marker in place of the raw recording
    async fn record_skip(&self, recording: &Recording, error: &PipelineError) {
        if let Err(e) = self.store.mark_skipped(recording, &error.to_string()).await {
            subject_warn!(recording.subject, Stage::Clean, "Could not record skip: {}", e);
            return;
        }
        match self.store.evict_raw(recording).await {
            Ok(_) => subject_debug!(recording.subject, Stage::Clean, "🗑️ Raw recording of skipped subject removed"),
            Err(e) => subject_warn!(recording.subject, Stage::Clean, "Could not remove raw recording: {}", e),
        }
    }

    /// Outcome for a subject skipped by an earlier run
    async fn recorded_skip(&self, recording: Recording) -> SubjectOutcome {
        let message = match self.store.skip_reason(&recording).await {
            Ok(Some(reason)) => reason,
            Ok(None) => "recorded by an earlier run".to_string(),
            Err(e) => return self.failure(recording, Stage::Clean, e.into()),
        };
        subject_debug!(recording.subject, Stage::Clean, "⏩ Skipped earlier: {}", message);
        SubjectOutcome::skipped(recording, SubjectState::Skipped, Stage::Clean, SkipReason::InsufficientData { message })
    }

    fn not_ready(&self, recording: Recording, state: SubjectState, stage: Stage, missing: ArtifactKind) -> SubjectOutcome {
        subject_debug!(recording.subject, stage, "⏸️ No {} artifact yet", missing);
        SubjectOutcome::skipped(
            recording,
            state,
            stage,
            SkipReason::NotReady {
                missing: missing.to_string(),
            },
        )
    }

    /// Classify an error into a skip or a failure and log it
    fn failure(&self, recording: Recording, stage: Stage, error: PipelineError) -> SubjectOutcome {
        let kind = error.kind();
        if kind.is_skip() {
            subject_warn!(recording.subject, stage, "⏭️ Skipped: {}", error);
            let state = match stage {
                Stage::Fetch => SubjectState::Pending,
                _ => SubjectState::Skipped,
            };
            return SubjectOutcome::skipped(
                recording,
                state,
                stage,
                SkipReason::InsufficientData {
                    message: error.to_string(),
                },
            );
        }
        subject_error!(recording.subject, stage, kind = %kind, "❌ Failed: {}", error);
        SubjectOutcome::failed(recording, stage, kind, error.to_string())
    }
}
