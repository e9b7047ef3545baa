//! Filter presets and subscriber installation.

use sidelegate::config::{Config, LoggingConfig};
use sidelegate::logging::{filter_for, LoggingGuard};
use tracing::level_filters::LevelFilter;

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn base_filter_alone_keeps_its_level() {
    let filter = filter_for("warn", &LoggingConfig::default()).expect("valid filter");
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
}

#[test]
fn revocation_tracing_raises_to_trace() {
    let settings = LoggingConfig {
        trace_revocations: true,
        timings: false,
    };
    let filter = filter_for("warn", &settings).expect("valid filter");
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
}

#[test]
fn timings_raise_to_debug() {
    let settings = LoggingConfig {
        trace_revocations: false,
        timings: true,
    };
    let filter = filter_for("warn", &settings).expect("valid filter");
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
}

#[test]
fn invalid_base_filter_is_an_error() {
    assert!(filter_for("sidelegate=loudest", &LoggingConfig::default()).is_err());
}

#[test]
fn logging_section_parses() {
    let config: Config = toml::from_str(
        r#"
cluster_id = "c1"
[logging]
trace_revocations = true
"#,
    )
    .expect("should parse");
    assert!(config.logging.trace_revocations);
    assert!(!config.logging.timings);
}

#[test]
fn init_production_creates_logs_dir_and_second_init_errors() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    // Only this test installs a global subscriber in this binary.
    let guard = sidelegate::logging::init_production(&logs_dir, &LoggingConfig::default());
    assert!(logs_dir.exists(), "logs directory should be created");
    assert!(guard.is_ok());

    assert!(sidelegate::logging::init_cli(&LoggingConfig::default()).is_err());
}
