// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use memfeed_config::{FeedConfig, PollMode, WindowPolicyKind};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn write_temp_file(prefix: &str, contents: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("memfeed-config-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = dir.join(format!("{}-{}.yaml", prefix, nonce));
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

#[test]
fn test_minimal_file_parses() {
    let path = write_temp_file(
        "minimal",
        r#"
schema_version: "1.0"
controls:
  perform_reading: true
"#,
    );
    let config = FeedConfig::from_file(&path).unwrap();
    assert!(config.controls.perform_reading);
    assert_eq!(config.controls.divide_factor, 65536);
    assert_eq!(config.window.policy, WindowPolicyKind::Coupled);
    assert_eq!(config.window_size().unwrap(), None);
}

#[test]
fn test_hex_addresses_parse() {
    let yaml = r#"
reader:
  register_base: 0x44A00000
window:
  base: 0x10000000
"#;
    let config: FeedConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.reader.register_base, 0x44A0_0000);
    assert_eq!(config.window.base, 0x1000_0000);
}

#[test]
fn test_missing_file_reports_path() {
    let err = FeedConfig::from_file("does/not/exist.yaml").unwrap_err();
    assert!(format!("{:#}", err).contains("does/not/exist.yaml"));
}

#[test]
fn test_yield_mode_without_interval() {
    let config = FeedConfig::from_yaml("poll:\n  mode: yield\n").unwrap();
    assert_eq!(config.poll.mode, PollMode::Yield);
    assert_eq!(config.poll.interval_us, None);
}

#[test]
fn test_simulation_memory_size() {
    let config = FeedConfig::from_yaml("simulation:\n  memory_size: \"2MB\"\n").unwrap();
    assert_eq!(
        config.simulation_memory_size().unwrap(),
        memfeed_config::parse_size("2MB").unwrap()
    );
    assert!(config.simulation_memory_size().unwrap() > 1_000_000);
}
