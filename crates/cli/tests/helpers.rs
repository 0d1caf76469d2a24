use std::fs;
use std::path::Path;

use fwstamp::commands::{hex32, resolve_input_path};
use fwstamp::{canonicalize_or_current, infer_project_name, sha256_file};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let cwd = std::env::current_dir().expect("cwd");
    let result = canonicalize_or_current(".").expect("canonicalize");
    assert_eq!(result, cwd);
}

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let subdir = tmp.path().join("nested");
    fs::create_dir_all(&subdir).expect("create nested");

    let result = canonicalize_or_current(subdir.to_str().unwrap()).expect("canonicalize nested");
    assert_eq!(result, subdir.canonicalize().expect("canonicalize subdir"));
}

#[test]
fn canonicalize_or_current_accepts_missing_path() {
    let result = canonicalize_or_current("does/not/exist/yet").expect("fallback");
    assert!(result.is_absolute());
    assert!(result.ends_with("does/not/exist/yet"));
}

#[test]
fn infer_project_name_uses_last_path_component() {
    assert_eq!(infer_project_name(Path::new("/work/motor-controller")), "motor-controller");
    assert_eq!(infer_project_name(Path::new("/")), "unnamed-project");
}

#[test]
fn sha256_file_matches_known_hash() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("abc.bin");
    fs::write(&path, b"abc").unwrap();
    assert_eq!(
        sha256_file(&path).unwrap(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert!(sha256_file(&tmp.path().join("missing.bin")).is_err());
}

#[test]
fn input_paths_are_relative_to_root() {
    let root = Path::new("/proj");
    assert_eq!(resolve_input_path(root, "build/app.bin"), Path::new("/proj/build/app.bin"));
    assert_eq!(resolve_input_path(root, "/abs/app.bin"), Path::new("/abs/app.bin"));
    assert_eq!(hex32(0xCBF4_3926), "0xCBF43926");
}
