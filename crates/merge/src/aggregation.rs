use tracing::debug;
use whisper_common::{Interval, MergeMode, Result, Series, WhisperError};
use whisper_storage::{window_start, WhisperFile};

/// How one source series is folded into a destination series.
pub trait MergeStrategy {
    fn mode(&self) -> MergeMode;

    /// Fold `source` into `destination` in place.
    fn combine(&self, destination: &mut Series, source: &Series);
}

/// sumSeries: every known source value is added to the destination slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct SumMerge;

/// nonNegativeDerivative: the difference between consecutive known source
/// values is added to the destination; counter resets contribute nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeltaMerge;

impl MergeStrategy for SumMerge {
    fn mode(&self) -> MergeMode {
        MergeMode::Sum
    }

    fn combine(&self, destination: &mut Series, source: &Series) {
        for (&interval, &value) in source {
            if !value.is_nan() {
                accumulate(destination, interval, value);
            }
        }
    }
}

impl MergeStrategy for DeltaMerge {
    fn mode(&self) -> MergeMode {
        MergeMode::Delta
    }

    fn combine(&self, destination: &mut Series, source: &Series) {
        let mut known = source.iter().filter(|(_, v)| !v.is_nan());
        let Some((_, &first)) = known.next() else {
            return;
        };
        let mut previous = first;
        for (&interval, &value) in known {
            let rate = value - previous;
            previous = value;
            if rate >= 0.0 {
                accumulate(destination, interval, rate);
            }
        }
    }
}

fn accumulate(destination: &mut Series, interval: u32, value: f64) {
    destination
        .entry(interval)
        .and_modify(|v| *v += value)
        .or_insert(value);
}

/// Pick the strategy for `mode` once, up front.
pub fn strategy_for(mode: MergeMode) -> Box<dyn MergeStrategy> {
    match mode {
        MergeMode::Sum => Box::new(SumMerge),
        MergeMode::Delta => Box::new(DeltaMerge),
    }
}

/// Merge every archive of `source` that has a same-precision counterpart in
/// `destination`, finest first. Archives only the destination has are left
/// alone. Returns the number of archives written to directly.
///
/// The finest merged archive is rolled up into the coarser destination
/// archives through the file's aggregation method. A coarser pair only
/// contributes intervals older than what the finer destination archives
/// hold. Contributions older than what the destination archive can hold
/// (relative to the newest interval on either side) are discarded.
pub fn merge_into(
    destination: &mut WhisperFile,
    source: &WhisperFile,
    strategy: &dyn MergeStrategy,
) -> Result<usize> {
    let mut pairs: Vec<(usize, usize)> = source
        .header()
        .archives
        .iter()
        .enumerate()
        .filter_map(|(si, a)| destination.archive_index(a.precision).map(|di| (di, si)))
        .collect();

    if pairs.is_empty() {
        return Err(WhisperError::Incompatible(format!(
            "{} shares no archive precision with {}",
            source.path().display(),
            destination.path().display()
        )));
    }
    pairs.sort_unstable();

    // Oldest interval held by an already merged, finer destination archive.
    let mut covered_from: Option<Interval> = None;
    let mut changed = 0;
    for (di, si) in pairs {
        let info = destination
            .archive(di)
            .ok_or_else(|| WhisperError::Incompatible(format!("missing archive {di}")))?;
        let src = source.read_archive(si)?;
        let Some(&src_newest) = src.keys().next_back() else {
            continue;
        };
        let dst = destination.read_archive(di)?;
        let newest = dst.keys().next_back().map_or(src_newest, |&d| d.max(src_newest));
        let horizon = window_start(newest, &info);
        let rolled_up_from = covered_from.map(|c| info.align(c));
        covered_from = Some(covered_from.map_or(horizon, |c| c.min(horizon)));

        let mut merged = dst.clone();
        strategy.combine(&mut merged, &src);

        let updates: Series = merged
            .into_iter()
            .filter(|&(interval, value)| {
                interval >= horizon
                    && rolled_up_from.map_or(true, |limit| interval < limit)
                    && dst.get(&interval) != Some(&value)
            })
            .collect();
        if updates.is_empty() {
            continue;
        }

        debug!(
            mode = %strategy.mode(),
            precision = info.precision,
            points = updates.len(),
            "merging archive"
        );
        destination.write_archive_and_propagate(di, &updates)?;
        changed += 1;
    }
    Ok(changed)
}
