//! Settings file loading and command-line precedence.

use std::fs;

use mandel_interop::prelude::*;

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, r#"{ "device": "cpu", "width": 640, "transfer": "staged" }"#).unwrap();

    let s = Settings::load_from(&path).unwrap();
    assert_eq!(s.device, DeviceClass::Cpu);
    assert_eq!(s.transfer, TransferMode::Staged);
    assert_eq!(s.width, 640);
    assert_eq!(s.height, DEFAULT_SIZE);
    assert_eq!(s.target_items_per_group, DEFAULT_TARGET_ITEMS);
    assert!(s.kernel_path.is_none());
}

#[test]
fn test_zero_values_fall_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, r#"{ "width": 0, "target_items_per_group": 0, "report_interval": 0 }"#).unwrap();

    let s = Settings::load_from(&path).unwrap();
    assert_eq!(s, Settings::default());
}

#[test]
fn test_bad_files_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    assert!(matches!(Settings::load_from(&path), Err(Error::Io(_))));

    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(Settings::load_from(&path), Err(Error::Io(_))));

    fs::write(&path, r#"{ "device": "fpga" }"#).unwrap();
    assert!(Settings::load_from(&path).is_err());
}

#[test]
fn test_command_line_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, r#"{ "device": "cpu", "max_iterations": 500, "kernel_path": "a.wgsl" }"#).unwrap();

    let mut s = Settings::load_from(&path).unwrap();
    let rest = s.apply_args(&["gpu", "--iterations", "80", "--kernel", "b.wgsl"]).unwrap();
    assert!(rest.is_empty());
    assert_eq!(s.device, DeviceClass::Gpu);
    assert_eq!(s.max_iterations, 80);
    assert_eq!(s.kernel_path.as_deref(), Some(std::path::Path::new("b.wgsl")));
    assert_eq!(s.params().max_iterations(), 80);
}
