//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use crate::port::{DataBits, Parity, StopBits};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIALTX";

/// Config file name
const CONFIG_FILE_NAME: &str = "serialtx.toml";

/// Directory under the platform config dir
const CONFIG_DIR_NAME: &str = "serialtx";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIALTX_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIALTX_CONFIG` environment variable (explicit path)
    /// 2. `./serialtx.toml` (current directory)
    /// 3. `~/.config/serialtx/serialtx.toml` (XDG on Linux/macOS)
    /// 4. `%APPDATA%\serialtx\serialtx.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override file values; the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Write the effective settings, overrides included, to `path`.
    /// Missing parent directories are created.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    default_config_path().filter(|path| path.exists())
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// `<config dir>/serialtx/serialtx.toml`.
fn default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::Malformed)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Unwritable {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Unwritable {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Reject settings no transport could open a port with.
pub fn validate(config: &Config) -> ConfigResult<()> {
    let port = config.serial.port_config();
    port.validate()
        .map_err(|e| ConfigError::invalid("serial", e))?;
    port.flow_control()
        .map_err(|e| ConfigError::invalid("serial.xonxoff", e))?;

    if config.transport.read_buffer_size == Some(0) {
        return Err(ConfigError::invalid(
            "transport.read_buffer_size",
            "must be greater than zero",
        ));
    }
    Ok(())
}

/// Read `SERIALTX_<key>` and parse it with `parse`.
fn env_override<T>(
    key: &str,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> ConfigResult<Option<T>> {
    let var = format!("{ENV_PREFIX}_{key}");
    match std::env::var(&var) {
        Ok(value) => match parse(value.trim()) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(reason) => Err(ConfigError::BadOverride { var, value, reason }),
        },
        Err(_) => Ok(None),
    }
}

fn parse_number<T: FromStr>(val: &str) -> Result<T, String> {
    val.parse().map_err(|_| "not a number".to_string())
}

fn parse_flag(val: &str) -> Result<bool, String> {
    match val.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected true/false, yes/no, on/off or 1/0".to_string()),
    }
}

fn parse_data_bits(val: &str) -> Result<DataBits, String> {
    match val.to_ascii_lowercase().as_str() {
        "5" | "five" => Ok(DataBits::Five),
        "6" | "six" => Ok(DataBits::Six),
        "7" | "seven" => Ok(DataBits::Seven),
        "8" | "eight" => Ok(DataBits::Eight),
        _ => Err("expected 5, 6, 7 or 8 data bits".to_string()),
    }
}

fn parse_parity(val: &str) -> Result<Parity, String> {
    match val.to_ascii_lowercase().as_str() {
        "n" | "none" => Ok(Parity::None),
        "o" | "odd" => Ok(Parity::Odd),
        "e" | "even" => Ok(Parity::Even),
        "m" | "mark" => Ok(Parity::Mark),
        "s" | "space" => Ok(Parity::Space),
        _ => Err("expected none, odd, even, mark or space".to_string()),
    }
}

fn parse_stop_bits(val: &str) -> Result<StopBits, String> {
    match val.to_ascii_lowercase().as_str() {
        "1" | "one" => Ok(StopBits::One),
        "1.5" | "one_point_five" => Ok(StopBits::OnePointFive),
        "2" | "two" => Ok(StopBits::Two),
        _ => Err("expected 1, 1.5 or 2 stop bits".to_string()),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern `SERIALTX_<SECTION>_<KEY>`, for
/// example `SERIALTX_SERIAL_BAUD_RATE=115200` or `SERIALTX_LOGGING_FORMAT=json`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    let serial = &mut config.serial;
    if let Some(device) = env_override("SERIAL_DEVICE", |v| Ok(v.to_string()))? {
        serial.device = Some(device);
    }
    if let Some(baud) = env_override("SERIAL_BAUD_RATE", parse_number)? {
        serial.baud_rate = baud;
    }
    if let Some(bits) = env_override("SERIAL_BYTE_SIZE", parse_data_bits)? {
        serial.byte_size = bits;
    }
    if let Some(parity) = env_override("SERIAL_PARITY", parse_parity)? {
        serial.parity = parity;
    }
    if let Some(bits) = env_override("SERIAL_STOP_BITS", parse_stop_bits)? {
        serial.stop_bits = bits;
    }
    if let Some(timeout) = env_override("SERIAL_TIMEOUT_MS", parse_number)? {
        serial.timeout_ms = Some(timeout);
    }
    if let Some(flag) = env_override("SERIAL_XONXOFF", parse_flag)? {
        serial.xonxoff = flag;
    }
    if let Some(flag) = env_override("SERIAL_RTSCTS", parse_flag)? {
        serial.rtscts = flag;
    }

    if let Some(size) = env_override("TRANSPORT_READ_BUFFER_SIZE", parse_number)? {
        config.transport.read_buffer_size = Some(size);
    }

    if let Some(level) = env_override("LOGGING_LEVEL", |v| Ok(v.to_string()))? {
        config.logging.level = level;
    }
    if let Some(format) = env_override("LOGGING_FORMAT", LogFormat::from_str)? {
        config.logging.format = format;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("SERIALTX_SERIAL_BAUD_RATE", "57600");
        env::set_var("SERIALTX_SERIAL_PARITY", "odd");
        env::set_var("SERIALTX_SERIAL_RTSCTS", "yes");

        let mut config = Config::default();
        let applied = apply_env_overrides(&mut config);

        env::remove_var("SERIALTX_SERIAL_BAUD_RATE");
        env::remove_var("SERIALTX_SERIAL_PARITY");
        env::remove_var("SERIALTX_SERIAL_RTSCTS");

        applied.unwrap();
        assert_eq!(config.serial.baud_rate, 57600);
        assert_eq!(config.serial.parity, Parity::Odd);
        assert!(config.serial.rtscts);
        assert_eq!(config.serial.stop_bits, StopBits::One);
    }

    #[test]
    #[serial]
    fn test_malformed_env_is_reported() {
        env::set_var("SERIALTX_SERIAL_STOP_BITS", " 3 ");

        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();

        env::remove_var("SERIALTX_SERIAL_STOP_BITS");

        match err {
            ConfigError::BadOverride { var, value, .. } => {
                assert_eq!(var, "SERIALTX_SERIAL_STOP_BITS");
                assert_eq!(value, " 3 ");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        assert!(validate(&config).is_ok());

        config.serial.baud_rate = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Invalid { key: "serial", .. })
        ));

        config.serial.baud_rate = 9600;
        config.serial.xonxoff = true;
        config.serial.rtscts = true;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Invalid { key: "serial.xonxoff", .. })
        ));

        config.serial.rtscts = false;
        config.transport.read_buffer_size = Some(0);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Invalid { key: "transport.read_buffer_size", .. })
        ));
    }

    #[test]
    fn test_value_parsers() {
        assert_eq!(parse_data_bits("7"), Ok(DataBits::Seven));
        assert_eq!(parse_parity("E"), Ok(Parity::Even));
        assert_eq!(parse_stop_bits("1.5"), Ok(StopBits::OnePointFive));
        assert_eq!(parse_flag("off"), Ok(false));
        assert!(parse_number::<u32>("fast").is_err());
    }
}
