use std::process::Command;

use tempfile::TempDir;
use whisper_common::{AggregationMethod, ArchiveDescriptor, CreateOptions, Point, WhisperError};
use whisper_merge::factory;
use whisper_schema::{parse_archive, parse_schema, validate};
use whisper_storage::WhisperFile;
use whisper_tools::config::ToolConfig;

const NOW: u32 = 1_599_998_400;

fn whisper_create() -> Command {
    Command::new(env!("CARGO_BIN_EXE_whisper-create"))
}

// =========================================================================
// Test 1: Archive spec parsing, units and point counts
// =========================================================================
#[test]
fn test_parse_archive_specs() {
    assert_eq!(parse_archive("60:1d").unwrap(), ArchiveDescriptor::new(60, 1440));
    assert_eq!(parse_archive("60:100").unwrap(), ArchiveDescriptor::new(60, 100));
    assert_eq!(parse_archive("3600:1y").unwrap(), ArchiveDescriptor::new(3600, 8760));

    for bad in ["0:10", "60", "60:0", "abc:1d", "1m:10", "60:1x", "7:1m"] {
        let err = parse_archive(bad).unwrap_err();
        assert!(
            matches!(err, WhisperError::Format { .. }),
            "{bad}: expected format error, got {err:?}"
        );
    }
}

// =========================================================================
// Test 2: Equal retention spans are a tie, not an increase
// =========================================================================
#[test]
fn test_retention_tie_rejected() {
    let schema = [ArchiveDescriptor::new(60, 1440), ArchiveDescriptor::new(300, 288)];
    let err = validate(&schema).unwrap_err();
    assert!(matches!(err, WhisperError::RetentionNotIncreasing { .. }));

    let err = parse_schema(["60:1d", "300:1d"]).unwrap_err();
    assert!(matches!(err, WhisperError::RetentionNotIncreasing { .. }));
}

// =========================================================================
// Test 3: Each schema invariant has its own error
// =========================================================================
#[test]
fn test_schema_invariants() {
    assert!(parse_schema(["10:6h", "60:7d", "600:5y"]).is_ok());
    assert!(matches!(
        parse_schema(Vec::<&str>::new()).unwrap_err(),
        WhisperError::EmptySchema
    ));
    assert!(matches!(
        parse_schema(["60:10", "60:100"]).unwrap_err(),
        WhisperError::DuplicatePrecision { .. }
    ));
    assert!(matches!(
        parse_schema(["60:100", "90:1000"]).unwrap_err(),
        WhisperError::PrecisionNotDivisible { .. }
    ));
    assert!(matches!(
        parse_schema(["60:1000", "120:100"]).unwrap_err(),
        WhisperError::RetentionNotIncreasing { .. }
    ));
}

// =========================================================================
// Test 4: Created file reopens with the same header
// =========================================================================
#[test]
fn test_create_then_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metric.wsp");
    let schema = parse_schema(["60:1d", "300:7d", "3600:1y"]).unwrap();
    let options = CreateOptions {
        x_files_factor: 0.25,
        aggregation_method: AggregationMethod::Max,
        sparse: false,
    };

    factory::create(&path, &schema, &options).unwrap().close().unwrap();

    let file = WhisperFile::open(&path).unwrap();
    assert_eq!(file.schema(), schema);
    assert_eq!(file.options(), options);
    assert_eq!(file.header().max_retention, 365 * 86_400);
    assert_eq!(
        std::fs::metadata(&path).unwrap().len(),
        file.header().file_size()
    );
}

// =========================================================================
// Test 5: Existing paths are never overwritten
// =========================================================================
#[test]
fn test_create_existing_path_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metric.wsp");
    std::fs::write(&path, b"keep me").unwrap();

    let schema = parse_schema(["60:10"]).unwrap();
    let err = factory::create(&path, &schema, &CreateOptions::default()).unwrap_err();
    assert!(matches!(err, WhisperError::AlreadyExists { .. }));
    assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
}

// =========================================================================
// Test 6: Written points come back and roll up past the xFilesFactor
// =========================================================================
#[test]
fn test_update_fetch_and_rollup() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metric.wsp");
    let schema = parse_schema(["60:10", "300:10"]).unwrap();
    let options = CreateOptions {
        x_files_factor: 0.5,
        aggregation_method: AggregationMethod::Average,
        sparse: false,
    };
    let mut file = factory::create(&path, &schema, &options).unwrap();

    // 2 of 5 fine points known in the coarse window: below the factor.
    file.update_many_at(&[Point::new(NOW - 300, 1.0), Point::new(NOW - 240, 2.0)], NOW)
        .unwrap();
    assert!(file.read_archive(1).unwrap().is_empty());

    // 3 of 5: rolled up as the average of the known points.
    file.update_many_at(&[Point::new(NOW - 180, 6.0)], NOW).unwrap();
    let coarse = file.read_archive(1).unwrap();
    assert_eq!(coarse.get(&(NOW - 300)), Some(&3.0));

    let series = file.fetch_at(NOW - 300, NOW, NOW).unwrap();
    assert_eq!(series.step, 60);
    assert_eq!(series.from, NOW - 240);
    assert_eq!(series.values, vec![Some(2.0), Some(6.0), None, None, None]);
}

// =========================================================================
// Test 7: Config file supplies defaults that flags override
// =========================================================================
#[test]
fn test_config_defaults() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("tools.toml");
    std::fs::write(
        &config_path,
        "[create]\naggregation_method = \"sum\"\nx_files_factor = 0.0\narchives = [\"60:1d\", \"300:7d\"]\n",
    )
    .unwrap();

    let config = ToolConfig::load(&config_path).unwrap();
    assert_eq!(
        parse_schema(&config.create.archives).unwrap(),
        vec![ArchiveDescriptor::new(60, 1440), ArchiveDescriptor::new(300, 2016)]
    );
    let options = config.create.options(None, Some(0.5), false);
    assert_eq!(options.aggregation_method, AggregationMethod::Sum);
    assert_eq!(options.x_files_factor, 0.5);

    assert!(ToolConfig::load(&dir.path().join("missing.toml")).is_err());
}

// =========================================================================
// Test 8: Binary accepts Go-style flags
// =========================================================================
#[test]
fn test_cli_creates_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cli.wsp");

    let output = whisper_create()
        .args(["-aggregationMethod=sum", "-xFilesFactor=0"])
        .arg(&path)
        .args(["60:10", "300:10"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let file = WhisperFile::open(&path).unwrap();
    assert_eq!(file.header().aggregation_method, AggregationMethod::Sum);
    assert_eq!(file.header().x_files_factor, 0.0);
    assert_eq!(file.schema().len(), 2);
}

// =========================================================================
// Test 9: Binary fails on missing archives and bad schemas
// =========================================================================
#[test]
fn test_cli_usage_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cli.wsp");

    let output = whisper_create().arg(&path).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("PRECISION:RETENTION"));

    let output = whisper_create().arg(&path).args(["60:1d", "300:288"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("retention"), "{stderr}");
    assert!(stderr.contains("Usage:"), "{stderr}");
    assert!(!path.exists());

    let output = whisper_create()
        .args(["-aggregationMethod=median"])
        .arg(&path)
        .arg("60:10")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(!path.exists());
}

// =========================================================================
// Test 10: Info binary reports the header and a fetched range
// =========================================================================
#[test]
fn test_info_fetch_range() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("info.wsp");
    let schema = parse_schema(["60:10", "300:10"]).unwrap();
    factory::create(&path, &schema, &CreateOptions::default())
        .unwrap()
        .close()
        .unwrap();

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as u32;
    let output = Command::new(env!("CARGO_BIN_EXE_whisper-info"))
        .args(["-json", "-from"])
        .arg((now - 300).to_string())
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["aggregation_method"], "average");
    assert_eq!(report["archives"].as_array().unwrap().len(), 2);
    assert_eq!(report["fetch"]["step"], 60);
    let values = report["fetch"]["values"].as_array().unwrap();
    assert!(!values.is_empty());
    assert!(values.iter().all(|v| v.is_null()));

    let output = Command::new(env!("CARGO_BIN_EXE_whisper-info"))
        .arg("--from")
        .arg((now - 300).to_string())
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("Archive 1"));
    assert!(text.contains("step 60"));
}
