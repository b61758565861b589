use tracing::debug;
use whisper_common::{ArchiveDescriptor, Result, WhisperError};

/// Parse a single `PRECISION:RETENTION` string.
///
/// `RETENTION` is either a point count or a duration such as `1d` or `52w`,
/// which must be an exact multiple of the precision.
pub fn parse_archive(spec: &str) -> Result<ArchiveDescriptor> {
    let trimmed = spec.trim();
    let (precision, retention) = trimmed
        .split_once(':')
        .ok_or_else(|| WhisperError::format(spec, "expected PRECISION:RETENTION"))?;

    let precision = parse_positive(spec, precision, "precision")?;
    let retention = parse_retention(spec, retention, precision)?;

    let archive = ArchiveDescriptor::new(precision, retention);
    debug!(%spec, %archive, "parsed archive spec");
    Ok(archive)
}

/// Parse every spec in order, stopping at the first malformed one.
pub fn parse_archives<I, S>(specs: I) -> Result<Vec<ArchiveDescriptor>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    specs
        .into_iter()
        .map(|s| parse_archive(s.as_ref()))
        .collect()
}

fn parse_positive(spec: &str, field: &str, name: &str) -> Result<u32> {
    let field = field.trim();
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WhisperError::format(
            spec,
            format!("{name} {field:?} is not a positive integer"),
        ));
    }
    let value: u32 = field
        .parse()
        .map_err(|_| WhisperError::format(spec, format!("{name} {field:?} is out of range")))?;
    if value == 0 {
        return Err(WhisperError::format(spec, format!("{name} must be positive")));
    }
    Ok(value)
}

fn parse_retention(spec: &str, field: &str, precision: u32) -> Result<u32> {
    let field = field.trim();
    let split = field
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(field.len());
    let (digits, unit) = field.split_at(split);

    if unit.is_empty() {
        return parse_positive(spec, digits, "retention");
    }

    let count = parse_positive(spec, digits, "retention")?;
    let unit_seconds = unit_seconds(unit)
        .ok_or_else(|| WhisperError::format(spec, format!("unknown retention unit {unit:?}")))?;
    let duration = u64::from(count) * unit_seconds;
    let precision = u64::from(precision);

    if duration % precision != 0 {
        return Err(WhisperError::format(
            spec,
            format!("retention {duration}s is not a multiple of precision {precision}s"),
        ));
    }
    let points = duration / precision;
    match u32::try_from(points) {
        Ok(0) => Err(WhisperError::format(spec, "retention must cover at least one point")),
        Ok(points) => Ok(points),
        Err(_) => Err(WhisperError::format(spec, "retention is too large")),
    }
}

fn unit_seconds(unit: &str) -> Option<u64> {
    let seconds = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        "y" | "year" | "years" => 31_536_000,
        _ => return None,
    };
    Some(seconds)
}
