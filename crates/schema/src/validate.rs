use whisper_common::{ArchiveDescriptor, Result, WhisperError};

/// Check that `archives` form a legal multi-resolution schema.
///
/// Fails on the first violated rule:
/// - at least one archive;
/// - every archive has a positive precision and retention;
/// - precision strictly increases;
/// - each precision is a multiple of the previous one;
/// - each retention span is strictly longer than the previous one.
pub fn validate(archives: &[ArchiveDescriptor]) -> Result<()> {
    if archives.is_empty() {
        return Err(WhisperError::EmptySchema);
    }

    for archive in archives {
        check_positive(archive)?;
    }

    for (i, pair) in archives.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let index = i + 1;
        check_precision_increasing(index, previous, current)?;
        check_precision_divisible(index, previous, current)?;
        check_retention_increasing(index, previous, current)?;
    }

    Ok(())
}

fn check_positive(archive: &ArchiveDescriptor) -> Result<()> {
    if archive.precision == 0 || archive.retention == 0 {
        return Err(WhisperError::format(
            &archive.to_string(),
            "precision and retention must be positive",
        ));
    }
    Ok(())
}

fn check_precision_increasing(
    index: usize,
    previous: &ArchiveDescriptor,
    current: &ArchiveDescriptor,
) -> Result<()> {
    if current.precision <= previous.precision {
        return Err(WhisperError::DuplicatePrecision {
            index,
            precision: current.precision,
            previous: previous.precision,
        });
    }
    Ok(())
}

fn check_precision_divisible(
    index: usize,
    previous: &ArchiveDescriptor,
    current: &ArchiveDescriptor,
) -> Result<()> {
    if current.precision % previous.precision != 0 {
        return Err(WhisperError::PrecisionNotDivisible {
            index,
            precision: current.precision,
            previous: previous.precision,
        });
    }
    Ok(())
}

fn check_retention_increasing(
    index: usize,
    previous: &ArchiveDescriptor,
    current: &ArchiveDescriptor,
) -> Result<()> {
    let span = current.retention_span();
    let previous_span = previous.retention_span();
    if span <= previous_span {
        return Err(WhisperError::RetentionNotIncreasing {
            index,
            span,
            previous: previous_span,
        });
    }
    Ok(())
}
