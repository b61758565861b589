use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use whisper_common::{Interval, Point, Series, POINT_SIZE};

use crate::header::ArchiveInfo;

/// In-memory copy of every slot of one archive.
///
/// Reads and writes go through whole-archive buffers: the slots are loaded
/// once, edited in place, then written back in a single call.
#[derive(Debug, Clone)]
pub struct ArchiveSlots {
    info: ArchiveInfo,
    slots: Vec<Point>,
}

impl ArchiveSlots {
    pub fn load(file: &File, info: ArchiveInfo) -> Result<Self, std::io::Error> {
        let mut file = file;
        let mut buf = vec![0u8; info.size() as usize];
        file.seek(SeekFrom::Start(u64::from(info.offset)))?;
        file.read_exact(&mut buf)?;

        let slots = buf.chunks_exact(POINT_SIZE).map(decode_point).collect();
        Ok(Self { info, slots })
    }

    /// Write every slot back to the archive's region of the file.
    pub fn store(&self, file: &File) -> Result<(), std::io::Error> {
        let mut file = file;
        let mut buf = Vec::with_capacity(self.info.size() as usize);
        for point in &self.slots {
            buf.extend_from_slice(&encode_point(point));
        }
        file.seek(SeekFrom::Start(u64::from(self.info.offset)))?;
        file.write_all(&buf)?;
        Ok(())
    }

    pub fn info(&self) -> ArchiveInfo {
        self.info
    }

    /// Interval stored in slot 0, or 0 when the archive has never been written.
    pub fn base_interval(&self) -> Interval {
        self.slots.first().map(|p| p.interval).unwrap_or(0)
    }

    /// Slot that holds `interval`. The interval must already be aligned.
    fn slot_of(&self, interval: Interval) -> usize {
        let base = self.base_interval();
        if base == 0 {
            return 0;
        }
        let step = i64::from(self.info.precision);
        let distance = (i64::from(interval) - i64::from(base)) / step;
        distance.rem_euclid(i64::from(self.info.points)) as usize
    }

    /// Value stored for exactly `interval`, if that slot has not been overwritten.
    pub fn get(&self, interval: Interval) -> Option<f64> {
        if self.base_interval() == 0 {
            return None;
        }
        let point = self.slots[self.slot_of(interval)];
        (point.interval == interval && !point.value.is_nan()).then_some(point.value)
    }

    /// Store `value` for `interval`, aligning the interval to the archive precision.
    pub fn set(&mut self, interval: Interval, value: f64) {
        let interval = self.info.align(interval);
        let slot = self.slot_of(interval);
        self.slots[slot] = Point::new(interval, value);
    }

    /// Newest interval held by any slot.
    pub fn newest(&self) -> Option<Interval> {
        self.slots
            .iter()
            .map(|p| p.interval)
            .filter(|&i| i != 0)
            .max()
    }

    /// Points inside the valid window: the last `points` intervals ending at
    /// the newest stored one. Older slots are stale leftovers of the ring.
    pub fn series(&self) -> Series {
        let Some(newest) = self.newest() else {
            return Series::new();
        };
        let horizon = window_start(newest, &self.info);
        self.slots
            .iter()
            .filter(|p| p.interval != 0 && p.interval >= horizon && p.interval <= newest)
            .filter(|p| p.interval % self.info.precision == 0 && !p.value.is_nan())
            .map(|p| (p.interval, p.value))
            .collect()
    }
}

/// Oldest interval still inside the window that ends at `newest`.
pub fn window_start(newest: Interval, info: &ArchiveInfo) -> Interval {
    let span = u64::from(info.points - 1) * u64::from(info.precision);
    u64::from(newest).saturating_sub(span) as Interval
}

fn decode_point(buf: &[u8]) -> Point {
    let interval = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let value = f64::from_be_bytes([
        buf[4], buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11],
    ]);
    Point::new(interval, value)
}

fn encode_point(point: &Point) -> [u8; POINT_SIZE] {
    let mut buf = [0u8; POINT_SIZE];
    buf[0..4].copy_from_slice(&point.interval.to_be_bytes());
    buf[4..12].copy_from_slice(&point.value.to_be_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(precision: u32, points: u32) -> ArchiveSlots {
        ArchiveSlots {
            info: ArchiveInfo {
                offset: 0,
                precision,
                points,
            },
            slots: vec![Point::new(0, 0.0); points as usize],
        }
    }

    #[test]
    fn test_point_codec() {
        let point = Point::new(1_600_000_000, -12.5);
        assert_eq!(decode_point(&encode_point(&point)), point);
    }

    #[test]
    fn test_first_write_lands_in_slot_zero() {
        let mut archive = empty(60, 5);
        archive.set(6_030, 1.0);
        assert_eq!(archive.base_interval(), 6_000);
        assert_eq!(archive.get(6_000), Some(1.0));
    }

    #[test]
    fn test_slots_wrap_around() {
        let mut archive = empty(60, 3);
        for (i, interval) in [600, 660, 720, 780].into_iter().enumerate() {
            archive.set(interval, i as f64);
        }
        // 780 overwrote 600 in slot 0.
        assert_eq!(archive.get(600), None);
        assert_eq!(archive.get(780), Some(3.0));
        assert_eq!(archive.base_interval(), 780);

        let series = archive.series();
        assert_eq!(series.keys().copied().collect::<Vec<_>>(), vec![660, 720, 780]);
    }

    #[test]
    fn test_writes_before_base_wrap_backwards() {
        let mut archive = empty(60, 4);
        archive.set(600, 1.0);
        archive.set(540, 2.0);
        assert_eq!(archive.get(540), Some(2.0));
        assert_eq!(archive.get(600), Some(1.0));
    }

    #[test]
    fn test_series_drops_stale_slots() {
        let mut archive = empty(60, 3);
        archive.set(600, 1.0);
        archive.set(660, 2.0);
        // Jump far ahead: slot of 1200 is ((1200-600)/60) % 3 = 1, replacing 660.
        archive.set(1_200, 3.0);
        let series = archive.series();
        assert_eq!(series.len(), 1);
        assert_eq!(series.get(&1_200), Some(&3.0));
    }

    #[test]
    fn test_nan_is_null() {
        let mut archive = empty(60, 3);
        archive.set(600, f64::NAN);
        assert_eq!(archive.get(600), None);
        assert!(archive.series().is_empty());
    }

    #[test]
    fn test_window_start_saturates() {
        let info = ArchiveInfo {
            offset: 0,
            precision: 60,
            points: 100,
        };
        assert_eq!(window_start(120, &info), 0);
        assert_eq!(window_start(60_000, &info), 60_000 - 99 * 60);
    }
}
