//! Test helpers and builder patterns for orchestrator tests
//!
//! This module provides convenient helper functions and builder patterns
//! to reduce test boilerplate and improve maintainability.

use std::path::{Path, PathBuf};

use orchestrator::services::{FileSignalSource, FsArtifactStore, StatisticalBiomarkerEngine};
use orchestrator::traits::{MockArtifactStore, MockFetcher};
use orchestrator::{ArtifactStore, FetchError, FetchRequest, Orchestrator, OrchestratorResult, RunSummary};
use shared::{ArtifactKind, RawFormat, Recording};

use super::fixtures::TestFixtures;

/// Type alias for an orchestrator over real files with a mocked archive
pub type TestOrchestrator = Orchestrator<MockFetcher, FileSignalSource, StatisticalBiomarkerEngine, FsArtifactStore>;

/// Type alias for an orchestrator whose artifact store is mocked too
pub type MockStoreOrchestrator =
    Orchestrator<MockFetcher, FileSignalSource, StatisticalBiomarkerEngine, MockArtifactStore>;

/// Builder pattern for creating test orchestrators with sensible defaults
pub struct OrchestratorBuilder {
    root: PathBuf,
    fetcher: MockFetcher,
    max_workers: usize,
}

impl OrchestratorBuilder {
    /// Create a builder whose archive serves a viable recording for any subject
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            fetcher: TestHelpers::serving(TestFixtures::raw_edf(TestFixtures::VIABLE_SECONDS)),
            max_workers: 4,
        }
    }

    /// Replace the archive mock
    pub fn with_fetcher(mut self, fetcher: MockFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Configure the archive mock with a setup function
    pub fn with_fetch<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockFetcher),
    {
        let mut fetcher = MockFetcher::new();
        setup(&mut fetcher);
        self.fetcher = fetcher;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    fn config(&self) -> shared::PipelineConfig {
        TestFixtures::config().with_max_workers(self.max_workers)
    }

    /// Build the orchestrator over a real store rooted at the builder's directory
    pub fn build(self) -> TestOrchestrator {
        self.try_build().unwrap()
    }

    pub fn try_build(self) -> OrchestratorResult<TestOrchestrator> {
        let config = self.config();
        let store = TestHelpers::store(&self.root, &config);
        Orchestrator::new(
            self.fetcher,
            FileSignalSource::new(),
            StatisticalBiomarkerEngine::new(false),
            store,
            TestFixtures::settings(),
            config,
        )
    }

    /// Build the orchestrator over a mocked store
    pub fn build_with_store(self, store: MockArtifactStore) -> MockStoreOrchestrator {
        let config = self.config();
        Orchestrator::new(
            self.fetcher,
            FileSignalSource::new(),
            StatisticalBiomarkerEngine::new(false),
            store,
            TestFixtures::settings(),
            config,
        )
        .unwrap()
    }
}

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    pub fn store(root: &Path, config: &shared::PipelineConfig) -> FsArtifactStore {
        FsArtifactStore::new(
            root,
            TestFixtures::DATASET,
            TestFixtures::SUBPATH,
            RawFormat::Csv,
            TestFixtures::FEATURE_COLUMNS,
            config,
        )
    }

    /// Write a download the way the real fetcher leaves it
    pub fn write_download(request: &FetchRequest, content: &[u8]) -> Result<u64, FetchError> {
        if let Some(parent) = request.destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&request.destination, content)?;
        Ok(content.len() as u64)
    }

    /// Archive mock that serves `content` for every request, any number of times
    pub fn serving(content: Vec<u8>) -> MockFetcher {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(move |request| Self::write_download(request, &content));
        fetcher
    }

    /// Archive mock that must not be called
    pub fn offline() -> MockFetcher {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().times(0);
        fetcher
    }

    pub fn exists(orchestrator: &TestOrchestrator, kind: ArtifactKind, recording: &Recording) -> bool {
        orchestrator.store().path(kind, recording).exists()
    }

    /// Subject ids present in the feature table
    pub async fn table_subjects(orchestrator: &TestOrchestrator) -> Vec<String> {
        let table = orchestrator.store().table().read().await.unwrap();
        table.rows.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn assert_counts(summary: &RunSummary, processed: usize, skipped: usize, failed: usize) {
        assert_eq!(
            (summary.processed(), summary.skipped(), summary.failed()),
            (processed, skipped, failed),
            "summary was:\n{summary}"
        );
    }
}
