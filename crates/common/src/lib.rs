use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Unix timestamp in seconds, always aligned to an archive's precision once stored.
pub type Interval = u32;

/// Sparse, time-ordered view of an archive: interval → value. Absent keys are null.
pub type Series = BTreeMap<Interval, f64>;

/// Ordered archive list, finest precision first.
pub type Schema = Vec<ArchiveDescriptor>;

/// Default minimum fraction of known points required for a rollup.
pub const DEFAULT_X_FILES_FACTOR: f32 = 0.5;

/// Size of the metadata block at the start of every file.
pub const METADATA_SIZE: usize = 16;

/// Size of one archive info record following the metadata.
pub const ARCHIVE_INFO_SIZE: usize = 12;

/// Size of one stored point (interval u32 + value f64).
pub const POINT_SIZE: usize = 12;

/// A single timestamped sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub interval: Interval,
    pub value: f64,
}

impl Point {
    pub fn new(interval: Interval, value: f64) -> Self {
        Self { interval, value }
    }
}

// ---------------------------------------------------------------------------
// Archive descriptor: one resolution tier
// ---------------------------------------------------------------------------

/// One (precision, retention) pair of a multi-resolution schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    /// Seconds covered by one point.
    pub precision: u32,
    /// Number of points kept.
    pub retention: u32,
}

impl ArchiveDescriptor {
    pub fn new(precision: u32, retention: u32) -> Self {
        Self {
            precision,
            retention,
        }
    }

    /// Seconds of history this archive covers. Computed in u64 so it never overflows.
    pub fn retention_span(&self) -> u64 {
        u64::from(self.precision) * u64::from(self.retention)
    }
}

impl fmt::Display for ArchiveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.precision, self.retention)
    }
}

// ---------------------------------------------------------------------------
// Aggregation method: how finer points roll up into coarser ones
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    #[default]
    Average,
    Sum,
    Last,
    Max,
    Min,
    /// Rejection sentinel; never written to a file.
    Unknown,
}

impl AggregationMethod {
    /// On-disk code, or `None` for `Unknown`.
    pub fn code(self) -> Option<u32> {
        match self {
            AggregationMethod::Average => Some(1),
            AggregationMethod::Sum => Some(2),
            AggregationMethod::Last => Some(3),
            AggregationMethod::Max => Some(4),
            AggregationMethod::Min => Some(5),
            AggregationMethod::Unknown => None,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            1 => AggregationMethod::Average,
            2 => AggregationMethod::Sum,
            3 => AggregationMethod::Last,
            4 => AggregationMethod::Max,
            5 => AggregationMethod::Min,
            _ => AggregationMethod::Unknown,
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregationMethod::Average => "average",
            AggregationMethod::Sum => "sum",
            AggregationMethod::Last => "last",
            AggregationMethod::Max => "max",
            AggregationMethod::Min => "min",
            AggregationMethod::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl FromStr for AggregationMethod {
    type Err = WhisperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "average" => Ok(AggregationMethod::Average),
            "sum" => Ok(AggregationMethod::Sum),
            "last" => Ok(AggregationMethod::Last),
            "max" => Ok(AggregationMethod::Max),
            "min" => Ok(AggregationMethod::Min),
            _ => Err(WhisperError::InvalidOptions(format!(
                "unknown aggregation method \"{s}\""
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Create options
// ---------------------------------------------------------------------------

/// Per-file settings fixed at creation time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateOptions {
    pub x_files_factor: f32,
    pub aggregation_method: AggregationMethod,
    /// Allocate the data region with `set_len` instead of writing zeros. Not persisted.
    #[serde(default)]
    pub sparse: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            x_files_factor: DEFAULT_X_FILES_FACTOR,
            aggregation_method: AggregationMethod::Average,
            sparse: false,
        }
    }
}

impl CreateOptions {
    /// Reject an `Unknown` method or an xFilesFactor outside `[0, 1]`.
    pub fn check(&self) -> Result<()> {
        if self.aggregation_method == AggregationMethod::Unknown {
            return Err(WhisperError::InvalidOptions(
                "aggregation method must not be unknown".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.x_files_factor) {
            return Err(WhisperError::InvalidOptions(format!(
                "xFilesFactor {} is outside [0, 1]",
                self.x_files_factor
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Merge mode
// ---------------------------------------------------------------------------

/// Which aggregation function a merge applies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Running sum across sources (sumSeries).
    #[default]
    Sum,
    /// Non-negative derivative of each source, then summed.
    Delta,
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeMode::Sum => f.write_str("sum"),
            MergeMode::Delta => f.write_str("delta"),
        }
    }
}

impl FromStr for MergeMode {
    type Err = WhisperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(MergeMode::Sum),
            "delta" => Ok(MergeMode::Delta),
            _ => Err(WhisperError::InvalidOptions(format!(
                "invalid mode \"{s}\" (expected sum or delta)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WhisperError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt whisper file: {0}")]
    Corrupt(String),

    #[error("invalid archive spec {spec:?}: {reason}")]
    Format { spec: String, reason: String },

    #[error("schema must contain at least one archive")]
    EmptySchema,

    #[error("archive {index}: precision {precision}s must be greater than the previous archive's {previous}s")]
    DuplicatePrecision {
        index: usize,
        precision: u32,
        previous: u32,
    },

    #[error("archive {index}: retention span {span}s must be greater than the previous archive's {previous}s")]
    RetentionNotIncreasing { index: usize, span: u64, previous: u64 },

    #[error("archive {index}: precision {precision}s is not a multiple of the previous archive's {previous}s")]
    PrecisionNotDivisible {
        index: usize,
        precision: u32,
        previous: u32,
    },

    #[error("{0}")]
    InvalidOptions(String),

    #[error("{} already exists", .path.display())]
    AlreadyExists { path: PathBuf },

    #[error("cannot open {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: Box<WhisperError>,
    },

    #[error("cannot clone {} into {}", .from.display(), .to.display())]
    Clone {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: Box<WhisperError>,
    },

    #[error("no files match {pattern:?}{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    NoSources {
        pattern: String,
        reason: Option<String>,
    },

    #[error("cannot merge {} into {}", .from.display(), .into.display())]
    Merge {
        from: PathBuf,
        into: PathBuf,
        #[source]
        source: Box<WhisperError>,
    },

    #[error("incompatible archives: {0}")]
    Incompatible(String),

    #[error("invalid time range: from {from} until {until}")]
    InvalidRange { from: Interval, until: Interval },
}

impl WhisperError {
    pub fn open(path: &Path, source: WhisperError) -> Self {
        WhisperError::Open {
            path: path.to_path_buf(),
            source: Box::new(source),
        }
    }

    pub fn clone_failed(from: &Path, to: &Path, source: WhisperError) -> Self {
        WhisperError::Clone {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: Box::new(source),
        }
    }

    pub fn merge_failed(from: &Path, into: &Path, source: WhisperError) -> Self {
        WhisperError::Merge {
            from: from.to_path_buf(),
            into: into.to_path_buf(),
            source: Box::new(source),
        }
    }

    pub fn format(spec: &str, reason: impl Into<String>) -> Self {
        WhisperError::Format {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = WhisperError> = std::result::Result<T, E>;
