use std::fs;
use std::path::Path;

use tempfile::tempdir;
use veil::{default_output_path, resolve_config, sha256_file, ConfigOverrides};
use veil_core::Scheme;

#[test]
fn scheme_is_the_base_when_no_config_file() {
    let overrides = ConfigOverrides { scheme: Some(Scheme::Easy), ..Default::default() };
    let config = resolve_config(None, &overrides).expect("config");
    assert_eq!(config, Scheme::Easy.config());
}

#[test]
fn flags_override_the_base() {
    let overrides = ConfigOverrides {
        seed: Some(5),
        no_rename: true,
        no_const: true,
        no_opaque: true,
        garbage_count: Some(0),
        coverage: Some(0.25),
        clang: Some("/opt/llvm/bin/clang".into()),
        clang_args: Some("-Iinc;-DDEBUG".into()),
        ..Default::default()
    };
    let config = resolve_config(None, &overrides).expect("config");
    assert_eq!(config.seed, Some(5));
    assert!(!config.enable_rename && !config.enable_numeric_splitting);
    assert!(!config.enable_dead_code_injection);
    assert_eq!(config.opaque_predicate_count, Some(0));
    assert_eq!(config.rename_coverage_ratio, 0.25);
    assert_eq!(config.structural.clang_path.as_deref(), Some(Path::new("/opt/llvm/bin/clang")));
    assert_eq!(config.structural.clang_args, vec!["-Iinc".to_string(), "-DDEBUG".to_string()]);
}

#[test]
fn config_file_errors_carry_context() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").expect("write");
    let err = resolve_config(Some(&path), &ConfigOverrides::default()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config JSON"));
}

#[test]
fn sha256_file_matches_known_digest() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("abc.txt");
    fs::write(&path, b"abc").expect("write");
    assert_eq!(
        sha256_file(&path).expect("hash"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert!(sha256_file(&dir.path().join("missing")).is_err());
}

#[test]
fn default_output_is_a_sibling() {
    let out = default_output_path(Path::new("/work/src/net.h"));
    assert_eq!(out, Path::new("/work/src/net_obf.h"));
}
