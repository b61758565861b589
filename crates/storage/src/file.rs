use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};
use whisper_common::{
    ArchiveDescriptor, CreateOptions, Interval, Point, Result, Series, WhisperError,
    METADATA_SIZE,
};

use crate::archive::ArchiveSlots;
use crate::header::{header_size, ArchiveInfo, Header};
use crate::rollup::{aggregate, meets_x_files_factor};

const ZERO_CHUNK: usize = 16 * 1024;

/// Result of a range query against the best-fitting archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    /// First interval covered (inclusive).
    pub from: Interval,
    /// End of the range (exclusive).
    pub until: Interval,
    pub step: u32,
    pub values: Vec<Option<f64>>,
}

impl TimeSeries {
    /// Pair every value with its interval.
    pub fn points(&self) -> impl Iterator<Item = (Interval, Option<f64>)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| (self.from + i as u32 * self.step, *v))
    }
}

/// An open round-robin time-series file.
///
/// The handle owns the underlying `File`. Reads take `&self`; anything that
/// writes takes `&mut self` so a handle cannot be written from two places.
#[derive(Debug)]
pub struct WhisperFile {
    path: PathBuf,
    file: File,
    header: Header,
}

impl WhisperFile {
    /// Open an existing file for reading and writing.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, OpenOptions::new().read(true).write(true))
    }

    /// Open an existing file for reading only. Writes through the handle fail.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        Self::open_with(path, OpenOptions::new().read(true))
    }

    fn open_with(path: &Path, options: &OpenOptions) -> Result<Self> {
        let open = || -> Result<Self> {
            let file = options.open(path)?;
            let header = read_header(&file)?;
            Ok(Self {
                path: path.to_path_buf(),
                file,
                header,
            })
        };
        open().map_err(|e| WhisperError::open(path, e))
    }

    /// Allocate a new file at `path`. Fails if anything already exists there.
    pub fn create(
        path: &Path,
        archives: &[ArchiveDescriptor],
        options: &CreateOptions,
    ) -> Result<Self> {
        let header = Header::new(archives, options)?;
        let bytes = header.encode()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => WhisperError::AlreadyExists {
                    path: path.to_path_buf(),
                },
                _ => WhisperError::Io(e),
            })?;

        if let Err(e) = allocate(&file, &header, &bytes, options.sparse) {
            drop(file);
            let _ = fs::remove_file(path);
            return Err(e.into());
        }

        info!(
            path = %path.display(),
            archives = header.archives.len(),
            bytes = header.file_size(),
            method = %header.aggregation_method,
            "created whisper file"
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
        })
    }

    /// Create an empty file at `path` with this file's schema and options.
    pub fn clone_to(&self, path: &Path) -> Result<Self> {
        Self::create(path, &self.schema(), &self.options())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn schema(&self) -> Vec<ArchiveDescriptor> {
        self.header.schema()
    }

    pub fn options(&self) -> CreateOptions {
        self.header.options()
    }

    pub fn archive(&self, index: usize) -> Option<ArchiveInfo> {
        self.header.archives.get(index).copied()
    }

    /// Index of the archive stored at `precision` seconds per point.
    pub fn archive_index(&self, precision: u32) -> Option<usize> {
        self.header
            .archives
            .iter()
            .position(|a| a.precision == precision)
    }

    fn load_slots(&self, index: usize) -> Result<ArchiveSlots> {
        let info = self.archive(index).ok_or_else(|| {
            WhisperError::Incompatible(format!(
                "archive {index} does not exist in {}",
                self.path.display()
            ))
        })?;
        Ok(ArchiveSlots::load(&self.file, info)?)
    }

    /// Valid points of one archive, oldest first.
    pub fn read_archive(&self, index: usize) -> Result<Series> {
        Ok(self.load_slots(index)?.series())
    }

    /// Write `series` straight into one archive, without propagating to
    /// coarser archives.
    pub fn write_archive(&mut self, index: usize, series: &Series) -> Result<()> {
        self.store_series(index, series)?;
        Ok(())
    }

    /// Write `series` into one archive, then roll the touched intervals up
    /// into every coarser archive as a regular update would.
    pub fn write_archive_and_propagate(&mut self, index: usize, series: &Series) -> Result<()> {
        if let Some((slots, intervals)) = self.store_series(index, series)? {
            self.propagate(index, slots, intervals)?;
        }
        Ok(())
    }

    fn store_series(
        &mut self,
        index: usize,
        series: &Series,
    ) -> Result<Option<(ArchiveSlots, BTreeSet<Interval>)>> {
        if series.is_empty() {
            return Ok(None);
        }
        let mut slots = self.load_slots(index)?;
        let info = slots.info();
        let mut intervals = BTreeSet::new();
        for (&interval, &value) in series {
            slots.set(interval, value);
            intervals.insert(info.align(interval));
        }
        slots.store(&self.file)?;
        debug!(path = %self.path.display(), archive = index, points = series.len(), "wrote archive");
        Ok(Some((slots, intervals)))
    }

    /// Fetch `(from, until]` relative to the current wall clock.
    pub fn fetch(&self, from: Interval, until: Interval) -> Result<TimeSeries> {
        self.fetch_at(from, until, unix_now())
    }

    /// Fetch from the finest archive whose retention still reaches `from`.
    pub fn fetch_at(&self, from: Interval, until: Interval, now: Interval) -> Result<TimeSeries> {
        if from > until {
            return Err(WhisperError::InvalidRange { from, until });
        }
        let oldest = now.saturating_sub(self.header.max_retention);
        let from = from.max(oldest);
        let until = until.min(now);
        if from > until {
            return Err(WhisperError::InvalidRange { from, until });
        }

        let age = u64::from(now - from);
        let index = self
            .header
            .archives
            .iter()
            .position(|a| a.retention() >= age)
            .unwrap_or(self.header.archives.len() - 1);
        let slots = self.load_slots(index)?;
        let info = slots.info();
        let step = info.precision;

        let from_interval = info.align(from) + step;
        let mut until_interval = info.align(until) + step;
        if from_interval == until_interval {
            until_interval += step;
        }

        let values = (from_interval..until_interval)
            .step_by(step as usize)
            .map(|interval| slots.get(interval))
            .collect();

        Ok(TimeSeries {
            from: from_interval,
            until: until_interval,
            step,
            values,
        })
    }

    /// Write each point into the finest archive that still covers its age,
    /// then roll the touched intervals up into the coarser archives.
    ///
    /// Points in the future or older than the file's maximum retention are
    /// dropped. Returns the number of points written.
    pub fn update_many_at(&mut self, points: &[Point], now: Interval) -> Result<usize> {
        let max_retention = u64::from(self.header.max_retention);
        let mut pending: Vec<Point> = points
            .iter()
            .copied()
            .filter(|p| {
                let keep = p.interval <= now && u64::from(now - p.interval) < max_retention;
                if !keep {
                    warn!(path = %self.path.display(), interval = p.interval, now, "dropping point outside retention");
                }
                keep
            })
            .collect();
        // Stable: for duplicate intervals the later input point wins.
        pending.sort_by_key(|p| p.interval);

        let mut written = 0;
        for index in 0..self.header.archives.len() {
            if pending.is_empty() {
                break;
            }
            let info = self.header.archives[index];
            let (covered, rest): (Vec<Point>, Vec<Point>) = std::mem::take(&mut pending)
                .into_iter()
                .partition(|p| u64::from(now - p.interval) < info.retention());
            pending = rest;
            if covered.is_empty() {
                continue;
            }

            let mut slots = self.load_slots(index)?;
            let mut intervals = BTreeSet::new();
            for point in &covered {
                slots.set(point.interval, point.value);
                intervals.insert(info.align(point.interval));
            }
            slots.store(&self.file)?;
            written += covered.len();
            debug!(path = %self.path.display(), archive = index, points = covered.len(), "updated archive");

            self.propagate(index, slots, intervals)?;
        }
        Ok(written)
    }

    /// Roll `intervals` of archive `index` down through every coarser archive,
    /// stopping at the first level where nothing clears the xFilesFactor.
    fn propagate(
        &mut self,
        index: usize,
        mut higher: ArchiveSlots,
        mut intervals: BTreeSet<Interval>,
    ) -> Result<()> {
        let method = self.header.aggregation_method;
        let x_files_factor = self.header.x_files_factor;

        for lower_index in index + 1..self.header.archives.len() {
            let high = higher.info();
            let low = self.header.archives[lower_index];
            let ratio = (low.precision / high.precision) as usize;

            let starts: BTreeSet<Interval> = intervals.iter().map(|&t| low.align(t)).collect();
            let mut lower = self.load_slots(lower_index)?;
            let mut updated = BTreeSet::new();

            for start in starts {
                let known: Vec<f64> = (0..ratio as u32)
                    .filter_map(|k| higher.get(start + k * high.precision))
                    .collect();
                if !meets_x_files_factor(known.len(), ratio, x_files_factor) {
                    continue;
                }
                if let Some(value) = aggregate(method, &known) {
                    lower.set(start, value);
                    updated.insert(start);
                }
            }

            if updated.is_empty() {
                break;
            }
            lower.store(&self.file)?;
            debug!(path = %self.path.display(), archive = lower_index, points = updated.len(), "propagated rollup");
            intervals = updated;
            higher = lower;
        }
        Ok(())
    }

    /// Flush file contents to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Flush and release the handle.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        debug!(path = %self.path.display(), "closed whisper file");
        Ok(())
    }
}

fn read_header(file: &File) -> Result<Header> {
    let mut file = file;
    let file_len = file.metadata()?.len();

    let mut buf = vec![0u8; METADATA_SIZE];
    read_or_corrupt(&mut file, &mut buf)?;
    let archive_count = Header::archive_count(&buf)?;
    let size = header_size(archive_count);
    if size as u64 > file_len {
        return Err(WhisperError::Corrupt(format!(
            "header for {archive_count} archives is longer than the {file_len} byte file"
        )));
    }

    buf.resize(size, 0);
    read_or_corrupt(&mut file, &mut buf[METADATA_SIZE..])?;
    Header::decode(&buf, file_len)
}

fn read_or_corrupt(file: &mut &File, buf: &mut [u8]) -> Result<()> {
    match file.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Err(WhisperError::Corrupt("file ends inside the header".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Write the header and reserve the data region.
fn allocate(file: &File, header: &Header, bytes: &[u8], sparse: bool) -> std::io::Result<()> {
    {
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        if !sparse {
            let zeros = [0u8; ZERO_CHUNK];
            let mut remaining = header.file_size() - bytes.len() as u64;
            while remaining > 0 {
                let n = remaining.min(ZERO_CHUNK as u64) as usize;
                writer.write_all(&zeros[..n])?;
                remaining -= n as u64;
            }
        }
        writer.flush()?;
    }
    if sparse {
        file.set_len(header.file_size())?;
    }
    file.sync_all()
}

fn unix_now() -> Interval {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Interval)
        .unwrap_or(0)
}
