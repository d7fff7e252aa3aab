//! Integration tests for template scaffolding.

use std::fs;
use tempfile::tempdir;

use sfai_templates::{template_names, Scaffolder, DEFAULT_TEMPLATE};

/// Test that every template produces a deployable directory.
#[test]
fn test_every_template_scaffolds_deployable_files() {
    for name in template_names() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("orders-api");

        let report = Scaffolder::for_app("orders-api")
            .scaffold(&dest, name, false)
            .unwrap();
        assert_eq!(report.template, name);

        for file in ["app.py", "requirements.txt", "Dockerfile", "Procfile", "version.json"] {
            assert!(dest.join(file).exists(), "{} missing from {}", file, name);
        }

        let version = fs::read_to_string(dest.join("version.json")).unwrap();
        assert!(version.contains("\"orders-api\""));
        assert!(version.contains("\"0.1.0\""));
    }
}

/// Test that scaffolding into a file path fails.
#[test]
fn test_destination_must_be_a_directory() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("not-a-dir");
    fs::write(&file, "x").unwrap();

    let result = Scaffolder::for_app("demo").scaffold(&file, DEFAULT_TEMPLATE, true);
    assert!(result.is_err());
}
