//! Unit tests for configuration loading and root folder resolution
//!
//! Tests that touch PANTRY_ROOT_FOLDER are marked #[serial] so they do not
//! race on the process environment.

use pantry_common::config::{
    load_toml_config, read_startup_config, CompiledDefaults, ConfigSource, LoggingConfig,
    RootFolderInitializer, RootFolderResolver, TomlConfig, DATABASE_FILE_NAME, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();
    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert!(defaults.root_folder.to_string_lossy().contains("pantry"));
}

#[test]
#[serial]
fn test_cli_arg_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/pantry-env");

    let resolver = RootFolderResolver::new("test")
        .with_cli_arg(Some(PathBuf::from("/tmp/pantry-cli")))
        .with_toml_config(TomlConfig {
            root_folder: Some(PathBuf::from("/tmp/pantry-toml")),
            ..Default::default()
        });
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/pantry-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/pantry-env");

    let resolver = RootFolderResolver::new("test").with_toml_config(TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/pantry-toml")),
        ..Default::default()
    });
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/pantry-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_beats_compiled_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new("test").with_toml_config(TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/pantry-toml")),
        ..Default::default()
    });
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/pantry-toml"));

    let resolver = RootFolderResolver::new("test").with_toml_config(TomlConfig::default());
    assert_eq!(resolver.resolve(), CompiledDefaults::for_current_platform().root_folder);
}

#[test]
fn test_missing_toml_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, TomlConfig::default());
    assert_eq!(config.logging, LoggingConfig::default());
}

#[test]
fn test_toml_enrichment_section_parses() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/pantry"
boilerplate_tokens = ["acme", "northwind"]

[logging]
level = "debug"

[enrichment]
batch_size = 250
workers = 4
similarity_threshold = 0.8
create_missing_canonicals = true
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/pantry")));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.enrichment.batch_size, Some(250));
    assert_eq!(config.enrichment.workers, Some(4));
    assert_eq!(config.enrichment.similarity_threshold, Some(0.8));
    assert_eq!(config.enrichment.create_missing_canonicals, Some(true));
    assert_eq!(config.enrichment.min_key_length, None);
    assert_eq!(config.boilerplate_tokens, vec!["acme", "northwind"]);
}

#[test]
fn test_malformed_toml_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[enrichment\nbatch_size = ").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Parse TOML failed"));
}

#[test]
fn test_startup_config_reports_source_without_logging() {
    let temp_dir = TempDir::new().unwrap();

    let absent = temp_dir.path().join("absent.toml");
    let (config, source) = read_startup_config(Some(absent.as_path())).unwrap();
    assert_eq!(config, TomlConfig::default());
    assert_eq!(source, ConfigSource::Missing(absent));

    let present = temp_dir.path().join("config.toml");
    std::fs::write(&present, "[logging]\nlevel = \"warn\"\n").unwrap();
    let (config, source) = read_startup_config(Some(present.as_path())).unwrap();
    assert_eq!(config.logging.level, "warn");
    assert_eq!(source, ConfigSource::Loaded(present.clone()));

    std::fs::write(&present, "[logging\n").unwrap();
    let err = read_startup_config(Some(present.as_path())).unwrap_err();
    assert!(err.to_string().contains("Parse TOML failed"));
}

#[test]
fn test_initializer_creates_folder_and_locates_database() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("pantry-root");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join(DATABASE_FILE_NAME));
}
