use moonbridge::frontend::{Config, ErrorMode};
use moonbridge::{ConfigError, MarshalMode, Session, Variant};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_find_and_load_walks_up() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("moonbridge.toml"),
        "[session]\nerror_mode = \"silent\"\nmarshal_mode = \"strict\"\n",
    )
    .unwrap();
    let nested = dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();

    let config = Config::find_and_load(&nested).unwrap().unwrap();
    assert_eq!(config.session.error_mode, ErrorMode::Silent);

    let session = Session::with_config(&config).unwrap();
    assert_eq!(session.marshal_mode(), MarshalMode::Strict);
    session.eval("error('swallowed')").unwrap();
    assert_eq!(session.failures(), 1);
}

#[test]
fn test_session_without_libs() {
    let config = Config::from_toml_str("[session]\nopen_libs = false\n").unwrap();
    let session = Session::with_config(&config).unwrap();
    session.eval("has_string = string ~= nil").unwrap();
    assert_eq!(session.get_global("has_string").unwrap(), Variant::from(false));
}

#[test]
fn test_unreadable_file() {
    let dir = TempDir::new().unwrap();
    let err = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_malformed_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("moonbridge.toml");
    fs::write(&path, "[session\nopen_libs = ").unwrap();
    assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse(_))));
}
