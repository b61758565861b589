use std::path::Path;

use tracing::info;
use whisper_common::{ArchiveDescriptor, CreateOptions, Result, WhisperError};
use whisper_schema::validate;
use whisper_storage::WhisperFile;

/// Create a new file after checking the options and the schema.
///
/// Nothing touches the filesystem unless both checks pass and `path` is free.
pub fn create(
    path: &Path,
    archives: &[ArchiveDescriptor],
    options: &CreateOptions,
) -> Result<WhisperFile> {
    options.check()?;
    validate(archives)?;
    if path.exists() {
        return Err(WhisperError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    WhisperFile::create(path, archives, options)
}

/// Create `dest` with the exact schema and options of the file at `source`.
pub fn clone(source: &Path, dest: &Path) -> Result<WhisperFile> {
    let reference = WhisperFile::open_read_only(source)?;
    let schema = reference.schema();
    let options = reference.options();
    reference.close()?;

    let file = create(dest, &schema, &options)
        .map_err(|e| WhisperError::clone_failed(source, dest, e))?;
    info!(
        source = %source.display(),
        dest = %dest.display(),
        archives = schema.len(),
        "cloned schema"
    );
    Ok(file)
}
