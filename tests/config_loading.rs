//! Settings file resolution, environment overrides and validation.

use pretty_assertions::assert_eq;
use serial_test::serial;
use serialtx::config::{resolve_config_path, ConfigError, ConfigLoader, LogFormat};
use serialtx::{DataBits, Parity, StopBits};
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const SAMPLE: &str = r#"
[serial]
device = "plc"
baud_rate = 19200
byte_size = "seven"
parity = "even"
stop_bits = "two"
timeout_ms = 20

[serial.port_aliases]
plc = "/dev/ttyUSB3"

[transport]
read_buffer_size = 512

[logging]
level = "debug"
format = "json"
"#;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("serialtx.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
#[serial]
fn loads_every_section_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, SAMPLE);

    let loader = ConfigLoader::load_from(&path).unwrap();
    let config = loader.config();

    assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(
        config.serial.resolved_device().as_deref(),
        Some("/dev/ttyUSB3")
    );
    assert_eq!(config.transport.read_buffer_size, Some(512));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);

    let port = config.serial.port_config();
    assert_eq!(port.baud_rate, 19200);
    assert_eq!(port.byte_size, DataBits::Seven);
    assert_eq!(port.parity, Parity::Even);
    assert_eq!(port.stop_bits, StopBits::Two);
    assert_eq!(port.timeout, Some(Duration::from_millis(20)));
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, SAMPLE);
    env::set_var("SERIALTX_SERIAL_BAUD_RATE", "115200");
    env::set_var("SERIALTX_LOGGING_FORMAT", "compact");

    let loader = ConfigLoader::load_from(&path);

    env::remove_var("SERIALTX_SERIAL_BAUD_RATE");
    env::remove_var("SERIALTX_LOGGING_FORMAT");

    let config = loader.unwrap().into_config();
    assert_eq!(config.serial.baud_rate, 115200);
    assert_eq!(config.logging.format, LogFormat::Compact);
    // Untouched keys keep their file values.
    assert_eq!(config.serial.parity, Parity::Even);
}

#[test]
#[serial]
fn explicit_path_variable_is_resolved_first() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[serial]\nbaud_rate = 57600\n");
    env::set_var("SERIALTX_CONFIG", &path);

    let resolved = resolve_config_path();
    let loaded = ConfigLoader::load();

    env::remove_var("SERIALTX_CONFIG");

    assert_eq!(resolved, Some(path));
    assert_eq!(loaded.unwrap().config().serial.baud_rate, 57600);
}

#[test]
#[serial]
fn malformed_toml_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[serial\nbaud_rate = ");

    assert!(matches!(
        ConfigLoader::load_from(&path),
        Err(ConfigError::Malformed(_))
    ));
}

#[test]
#[serial]
fn missing_file_is_a_read_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    assert!(matches!(
        ConfigLoader::load_from(&path),
        Err(ConfigError::Unreadable { .. })
    ));
}

#[test]
#[serial]
fn invalid_line_settings_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "[serial]\nbyte_size = \"eight\"\nstop_bits = \"one_point_five\"\n",
    );

    match ConfigLoader::load_from(&path) {
        Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "serial"),
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
#[serial]
fn bad_environment_value_names_the_variable() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");
    env::set_var("SERIALTX_TRANSPORT_READ_BUFFER_SIZE", "lots");

    let result = ConfigLoader::load_from(&path);

    env::remove_var("SERIALTX_TRANSPORT_READ_BUFFER_SIZE");

    match result {
        Err(ConfigError::BadOverride { var, value, .. }) => {
            assert_eq!(var, "SERIALTX_TRANSPORT_READ_BUFFER_SIZE");
            assert_eq!(value, "lots");
        }
        other => panic!("expected an env parse error, got {other:?}"),
    }
}

#[test]
#[serial]
fn saved_file_loads_back() {
    let dir = TempDir::new().unwrap();
    let source = write_config(&dir, SAMPLE);
    let target = dir.path().join("nested").join("copy.toml");

    let saved = ConfigLoader::load_from(&source).unwrap();
    saved.save_to(&target).unwrap();

    let copy = ConfigLoader::load_from(&target).unwrap();
    assert_eq!(copy.config(), saved.config());
}
