use std::path::PathBuf;

use mbcache_core::config::yaml_to_json;
use mbcache_core::{ConfigError, LoaderConfig};
use mbcache_formats::TypeTag;

fn fixture_path(name: &str) -> PathBuf {
    // CARGO_MANIFEST_DIR for this crate → crates/core
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn parse_imgclass_loader() {
    let cfg = LoaderConfig::from_yaml_file(fixture_path("loader_imgclass.yaml"))
        .expect("should load loader_imgclass.yaml");
    assert_eq!(cfg.manifest, PathBuf::from("/data/imagenet/train.csv"));
    assert_eq!(cfg.root_str(), "/data/imagenet");
    assert!(!cfg.shuffle_manifest);
    assert_eq!(cfg.subset_fraction(), 1.0);
    assert_eq!(cfg.macrobatch_size, 1024);
    assert_eq!(cfg.tag().unwrap(), TypeTag::ImageClass);
}

#[test]
fn parse_bbox_subset_loader() {
    let cfg = LoaderConfig::from_yaml_file(fixture_path("loader_bbox_subset.yaml"))
        .expect("should load loader_bbox_subset.yaml");
    assert!(cfg.shuffle_manifest);
    assert_eq!(cfg.subset_percent, 25);
    assert_eq!(cfg.subset_seed, 42);
    assert_eq!(cfg.macrobatch_size, 256);
    assert_eq!(cfg.tag().unwrap(), TypeTag::BoundingBox);
}

#[test]
fn rejects_out_of_range_subset() {
    match LoaderConfig::from_yaml_file(fixture_path("loader_bad_percent.yaml")) {
        Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "subset_percent"),
        other => panic!("expected subset_percent error, got {other:?}"),
    }
}

#[test]
fn missing_file_is_a_read_error() {
    assert!(matches!(
        LoaderConfig::from_yaml_file(fixture_path("does_not_exist.yaml")),
        Err(ConfigError::Read { .. })
    ));
}

#[test]
fn fixture_converts_to_json() {
    let text = std::fs::read_to_string(fixture_path("loader_bbox_subset.yaml")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&yaml_to_json(&text).unwrap()).unwrap();
    assert_eq!(json["type_tag"], "bbox");
    assert_eq!(json["subset_percent"], 25);
}
