//! Settings for the `serialtx` binary.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIALTX_CONFIG` environment variable (explicit path)
//! 2. `./serialtx.toml` (current directory)
//! 3. `~/.config/serialtx/serialtx.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\serialtx\serialtx.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Any value can be overridden with `SERIALTX_<SECTION>_<KEY>`, e.g.
//! `SERIALTX_SERIAL_DEVICE=/dev/ttyUSB0` or `SERIALTX_SERIAL_BAUD_RATE=115200`.
//!
//! # Example
//!
//! ```no_run
//! use serialtx::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let port = loader.config().serial.port_config();
//! println!("baud rate: {}", port.baud_rate);
//! # Ok::<(), serialtx::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{resolve_config_path, validate, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig, TransportConfig};
