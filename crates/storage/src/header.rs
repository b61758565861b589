use serde::Serialize;
use whisper_common::{
    AggregationMethod, ArchiveDescriptor, CreateOptions, Interval, Result, WhisperError,
    ARCHIVE_INFO_SIZE, METADATA_SIZE, POINT_SIZE,
};

/// Location and shape of one archive inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArchiveInfo {
    /// Byte offset of the first point.
    pub offset: u32,
    /// Seconds per point.
    pub precision: u32,
    /// Number of point slots.
    pub points: u32,
}

impl ArchiveInfo {
    /// Seconds of history covered by this archive.
    pub fn retention(&self) -> u64 {
        u64::from(self.precision) * u64::from(self.points)
    }

    /// Bytes occupied by the point slots.
    pub fn size(&self) -> u64 {
        u64::from(self.points) * POINT_SIZE as u64
    }

    pub fn end(&self) -> u64 {
        u64::from(self.offset) + self.size()
    }

    pub fn descriptor(&self) -> ArchiveDescriptor {
        ArchiveDescriptor::new(self.precision, self.points)
    }

    /// Round `interval` down to this archive's precision.
    pub fn align(&self, interval: Interval) -> Interval {
        interval - interval % self.precision
    }
}

/// Decoded file header: metadata block plus one info record per archive.
///
/// Layout (big-endian):
///   aggregation : u32
///   max_retention : u32
///   x_files_factor : f32
///   archive_count : u32
///   then per archive: offset u32, seconds_per_point u32, points u32
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub aggregation_method: AggregationMethod,
    pub max_retention: u32,
    pub x_files_factor: f32,
    pub archives: Vec<ArchiveInfo>,
}

impl Header {
    /// Lay out a header for a new file. Archives are placed back to back after
    /// the header in the order given.
    pub fn new(archives: &[ArchiveDescriptor], options: &CreateOptions) -> Result<Self> {
        options.check()?;
        if archives.is_empty() {
            return Err(WhisperError::EmptySchema);
        }

        let mut offset = header_size(archives.len()) as u64;
        let mut infos = Vec::with_capacity(archives.len());
        let mut max_retention = 0u64;

        for archive in archives {
            if archive.precision == 0 || archive.retention == 0 {
                return Err(WhisperError::format(
                    &archive.to_string(),
                    "precision and retention must be positive",
                ));
            }
            let info_offset = u32::try_from(offset).map_err(|_| {
                WhisperError::format(&archive.to_string(), "file would exceed 4 GiB")
            })?;
            let info = ArchiveInfo {
                offset: info_offset,
                precision: archive.precision,
                points: archive.retention,
            };
            offset += info.size();
            max_retention = max_retention.max(info.retention());
            infos.push(info);
        }

        if u32::try_from(offset).is_err() {
            return Err(WhisperError::format(
                &archives[archives.len() - 1].to_string(),
                "file would exceed 4 GiB",
            ));
        }
        let max_retention = u32::try_from(max_retention).map_err(|_| {
            WhisperError::InvalidOptions(format!(
                "maximum retention {max_retention}s does not fit the file format"
            ))
        })?;

        Ok(Self {
            aggregation_method: options.aggregation_method,
            max_retention,
            x_files_factor: options.x_files_factor,
            archives: infos,
        })
    }

    /// Total header length in bytes.
    pub fn size(&self) -> usize {
        header_size(self.archives.len())
    }

    /// Total file length implied by the header.
    pub fn file_size(&self) -> u64 {
        self.archives
            .last()
            .map(ArchiveInfo::end)
            .unwrap_or(self.size() as u64)
    }

    pub fn schema(&self) -> Vec<ArchiveDescriptor> {
        self.archives.iter().map(ArchiveInfo::descriptor).collect()
    }

    pub fn options(&self) -> CreateOptions {
        CreateOptions {
            x_files_factor: self.x_files_factor,
            aggregation_method: self.aggregation_method,
            sparse: false,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let aggregation = self.aggregation_method.code().ok_or_else(|| {
            WhisperError::InvalidOptions("aggregation method must not be unknown".to_string())
        })?;
        let archive_count = self.archives.len() as u32;

        let mut buf = Vec::with_capacity(self.size());
        buf.extend_from_slice(&aggregation.to_be_bytes());
        buf.extend_from_slice(&self.max_retention.to_be_bytes());
        buf.extend_from_slice(&self.x_files_factor.to_be_bytes());
        buf.extend_from_slice(&archive_count.to_be_bytes());
        for info in &self.archives {
            buf.extend_from_slice(&info.offset.to_be_bytes());
            buf.extend_from_slice(&info.precision.to_be_bytes());
            buf.extend_from_slice(&info.points.to_be_bytes());
        }
        Ok(buf)
    }

    /// Decode a header from the start of a file of `file_len` bytes.
    ///
    /// `buf` must hold at least the metadata block; use [`Header::archive_count`]
    /// to learn how many more bytes are needed.
    pub fn decode(buf: &[u8], file_len: u64) -> Result<Self> {
        let archive_count = Self::archive_count(buf)?;
        let size = header_size(archive_count);
        if buf.len() < size || file_len < size as u64 {
            return Err(WhisperError::Corrupt(format!(
                "header needs {size} bytes for {archive_count} archives"
            )));
        }

        let aggregation_method = AggregationMethod::from_code(read_u32(buf, 0));
        if aggregation_method == AggregationMethod::Unknown {
            return Err(WhisperError::Corrupt(format!(
                "unknown aggregation type {}",
                read_u32(buf, 0)
            )));
        }
        let max_retention = read_u32(buf, 4);
        let x_files_factor = f32::from_bits(read_u32(buf, 8));

        let mut archives = Vec::with_capacity(archive_count);
        for i in 0..archive_count {
            let at = METADATA_SIZE + i * ARCHIVE_INFO_SIZE;
            let info = ArchiveInfo {
                offset: read_u32(buf, at),
                precision: read_u32(buf, at + 4),
                points: read_u32(buf, at + 8),
            };
            if info.precision == 0 || info.points == 0 {
                return Err(WhisperError::Corrupt(format!("archive {i} is empty")));
            }
            if u64::from(info.offset) < size as u64 || info.end() > file_len {
                return Err(WhisperError::Corrupt(format!(
                    "archive {i} spans bytes {}..{} outside file of {file_len} bytes",
                    info.offset,
                    info.end()
                )));
            }
            archives.push(info);
        }

        Ok(Self {
            aggregation_method,
            max_retention,
            x_files_factor,
            archives,
        })
    }

    /// Read the archive count out of the metadata block.
    pub fn archive_count(buf: &[u8]) -> Result<usize> {
        if buf.len() < METADATA_SIZE {
            return Err(WhisperError::Corrupt(format!(
                "file is {} bytes, shorter than the {METADATA_SIZE} byte metadata",
                buf.len()
            )));
        }
        let count = read_u32(buf, 12) as usize;
        if count == 0 {
            return Err(WhisperError::Corrupt("file has no archives".to_string()));
        }
        Ok(count)
    }
}

pub fn header_size(archive_count: usize) -> usize {
    METADATA_SIZE + archive_count * ARCHIVE_INFO_SIZE
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
