use oak_core::*;
use std::env;
use std::path::PathBuf;

#[test]
fn test_discover_project_root_with_explicit() {
    let explicit_root = "/explicit/project/root";
    let result = discover_project_root(Some(explicit_root)).unwrap();
    assert_eq!(result, PathBuf::from(explicit_root));
}

#[test]
fn test_discover_project_root_priority() {
    unsafe {
        env::set_var("OAK_PROJECT_ROOT", "/env/project/root");
    }

    let result = discover_project_root(Some("/explicit/root")).unwrap();
    assert_eq!(result, PathBuf::from("/explicit/root"));

    unsafe {
        env::remove_var("OAK_PROJECT_ROOT");
    }
}

#[test]
fn test_discover_project_root_falls_back_to_cwd() {
    unsafe {
        env::remove_var("OAK_PROJECT_ROOT");
    }

    let result = discover_project_root(None).unwrap();
    assert!(result.is_absolute() || result == PathBuf::from("."));
}

#[test]
fn test_resolve_workspace_path_explicit() {
    let result = resolve_workspace_path(Some("~/custom-oak")).unwrap();
    assert!(result.to_string_lossy().ends_with("custom-oak"));
}

#[test]
fn test_machine_id_is_stable_within_process() {
    assert_eq!(machine_id(), machine_id());
}
