//! Archive schema parsing and validation.
//!
//! A schema is parsed from `PRECISION:RETENTION` strings and then validated as
//! a whole before any file is allocated for it.

pub mod parse;
pub mod validate;

use whisper_common::{Result, Schema};

pub use parse::{parse_archive, parse_archives};
pub use validate::validate;

/// Parse every spec string and validate the resulting schema.
pub fn parse_schema<I, S>(specs: I) -> Result<Schema>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let schema = parse_archives(specs)?;
    validate(&schema)?;
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisper_common::{ArchiveDescriptor, WhisperError};

    #[test]
    fn test_parse_schema_valid() {
        let schema = parse_schema(["60:1d", "300:7d", "3600:1y"]).unwrap();
        assert_eq!(
            schema,
            vec![
                ArchiveDescriptor::new(60, 1440),
                ArchiveDescriptor::new(300, 2016),
                ArchiveDescriptor::new(3600, 8760),
            ]
        );
    }

    #[test]
    fn test_parse_schema_runs_validator() {
        let err = parse_schema(["60:1d", "300:288"]).unwrap_err();
        assert!(matches!(err, WhisperError::RetentionNotIncreasing { .. }));
    }

    #[test]
    fn test_parse_schema_empty() {
        let err = parse_schema(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, WhisperError::EmptySchema));
    }
}
