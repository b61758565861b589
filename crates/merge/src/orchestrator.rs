use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};
use whisper_common::{MergeMode, Result, WhisperError};
use whisper_storage::WhisperFile;

use crate::aggregation::{merge_into, strategy_for, MergeStrategy};
use crate::factory;

/// Settings for one merge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub mode: MergeMode,
    /// Open an existing destination and keep adding to it. When false an
    /// existing destination is an error.
    pub reuse_destination: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            mode: MergeMode::Sum,
            reuse_destination: true,
        }
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    ResolvingSources,
    EstablishingDestination,
    MergingSource(usize),
    Done,
    Failed,
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeState::ResolvingSources => write!(f, "resolving sources"),
            MergeState::EstablishingDestination => write!(f, "establishing destination"),
            MergeState::MergingSource(i) => write!(f, "merging source {i}"),
            MergeState::Done => write!(f, "done"),
            MergeState::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub destination: PathBuf,
    /// True when the destination was cloned from the first source.
    pub created_destination: bool,
    /// Sources merged, in the order they were applied.
    pub sources: Vec<PathBuf>,
}

/// Folds every file matching a glob into a single destination file.
///
/// Runs strictly one source at a time: the destination stays open for the
/// whole run, each source is opened, merged and closed before the next.
/// Re-running over the same sources adds their contribution again.
pub struct Orchestrator {
    config: MergeConfig,
    strategy: Box<dyn MergeStrategy>,
    state: MergeState,
}

impl Orchestrator {
    pub fn new(config: MergeConfig) -> Self {
        Self {
            config,
            strategy: strategy_for(config.mode),
            state: MergeState::ResolvingSources,
        }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    pub fn run(&mut self, destination: &Path, pattern: &str) -> Result<MergeReport> {
        self.run_with_progress(destination, pattern, |_, _| {})
    }

    /// Like [`Orchestrator::run`], calling `progress(index, path)` before each
    /// source is merged.
    pub fn run_with_progress<F>(
        &mut self,
        destination: &Path,
        pattern: &str,
        progress: F,
    ) -> Result<MergeReport>
    where
        F: FnMut(usize, &Path),
    {
        self.state = MergeState::ResolvingSources;
        let result = self.execute(destination, pattern, progress);
        if result.is_err() {
            self.transition(MergeState::Failed);
        }
        result
    }

    fn execute<F>(&mut self, destination: &Path, pattern: &str, mut progress: F) -> Result<MergeReport>
    where
        F: FnMut(usize, &Path),
    {
        let sources = resolve_sources(pattern, destination)?;

        self.transition(MergeState::EstablishingDestination);
        let (mut dest, created_destination) = self.establish_destination(destination, &sources[0])?;

        for (i, path) in sources.iter().enumerate() {
            self.transition(MergeState::MergingSource(i));
            progress(i, path.as_path());
            info!(source = %path.display(), mode = %self.config.mode, "merging source");

            let source = WhisperFile::open_read_only(path)?;
            merge_into(&mut dest, &source, self.strategy.as_ref())
                .map_err(|e| WhisperError::merge_failed(path, destination, e))?;
            source.close()?;
        }

        dest.close()?;
        self.transition(MergeState::Done);

        Ok(MergeReport {
            destination: destination.to_path_buf(),
            created_destination,
            sources,
        })
    }

    fn establish_destination(&self, destination: &Path, first: &Path) -> Result<(WhisperFile, bool)> {
        if destination.exists() {
            if !self.config.reuse_destination {
                return Err(WhisperError::AlreadyExists {
                    path: destination.to_path_buf(),
                });
            }
            debug!(dest = %destination.display(), "reusing existing destination");
            return Ok((WhisperFile::open(destination)?, false));
        }

        let file = factory::clone(first, destination).map_err(|e| match e {
            WhisperError::Clone { .. } => e,
            other => WhisperError::clone_failed(first, destination, other),
        })?;
        Ok((file, true))
    }

    fn transition(&mut self, next: MergeState) {
        debug!(from = %self.state, to = %next, "merge state");
        self.state = next;
    }
}

/// Expand `pattern` into the files to merge, in glob order, leaving out
/// `destination` itself.
pub fn resolve_sources(pattern: &str, destination: &Path) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern).map_err(|e| WhisperError::NoSources {
        pattern: pattern.to_string(),
        reason: Some(e.to_string()),
    })?;

    let mut sources = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            WhisperError::open(&path, WhisperError::Io(e.into_error()))
        })?;
        if same_file(&path, destination) {
            debug!(path = %path.display(), "skipping destination in source set");
            continue;
        }
        sources.push(path);
    }

    if sources.is_empty() {
        return Err(WhisperError::NoSources {
            pattern: pattern.to_string(),
            reason: None,
        });
    }
    debug!(pattern, count = sources.len(), "resolved sources");
    Ok(sources)
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
