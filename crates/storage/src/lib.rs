//! Round-robin time-series files in the Graphite whisper layout.
//!
//! A file is a header followed by one fixed-size ring of points per archive.
//! Writes land in the finest archive that still covers a point's age and are
//! rolled up into coarser archives according to the file's aggregation method
//! and xFilesFactor.

pub mod archive;
pub mod file;
pub mod header;
pub mod rollup;

pub use archive::window_start;
pub use file::{TimeSeries, WhisperFile};
pub use header::{ArchiveInfo, Header};
