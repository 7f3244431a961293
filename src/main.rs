use clap::Parser;
use serialtx::config::{ConfigError, ConfigLoader, LogFormat, SerialConfig};
use serialtx::logging::init_logging;
use serialtx::transport::TransportOptions;
use serialtx::{DisconnectReason, PlatformLoop, PlatformTransport, Protocol, Transport};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Open a serial port on a single-threaded event loop and stream it to stdout.",
    long_about = "Opens a serial device with the platform's native asynchronous I/O model \
                  (readiness on POSIX, overlapped completion on Windows), prints everything \
                  received to stdout and optionally sends data or echoes it back. Settings \
                  come from serialtx.toml and SERIALTX_* variables; flags override both."
)]
struct Args {
    /// Device path or configured alias. Falls back to `serial.device`.
    #[arg(short, long)]
    device: Option<String>,

    /// Baud rate. Falls back to `serial.baud_rate`.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Settings file to use instead of the standard locations.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write every received chunk back to the device.
    #[arg(long)]
    echo: bool,

    /// Send this text once the port is open. May be repeated.
    #[arg(short, long)]
    send: Vec<String>,

    /// Close the port after this many bytes have been received.
    #[arg(long)]
    count: Option<usize>,

    /// Print received bytes as hex instead of raw.
    #[arg(long)]
    hex: bool,

    /// Bytes requested per read.
    #[arg(long)]
    read_buffer_size: Option<usize>,

    /// Log filter, e.g. `debug` or `serialtx=trace`. `RUST_LOG` wins.
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: pretty, compact or json.
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Write the merged file and environment settings to this path and exit.
    #[arg(long, value_name = "PATH")]
    save_config: Option<PathBuf>,
}

/// `--device` (through the alias table) wins over `serial.device`.
fn resolve_device(requested: Option<&str>, serial: &SerialConfig) -> Result<String, ConfigError> {
    requested
        .map(|name| serial.resolve_port(name))
        .or_else(|| serial.resolved_device())
        .ok_or(ConfigError::NoDevice)
}

/// Prints what arrives and sends what it was asked to.
struct Monitor {
    greeting: Vec<Vec<u8>>,
    echo: bool,
    hex: bool,
    limit: Option<usize>,
    received: usize,
    lost: Option<DisconnectReason>,
}

impl Monitor {
    fn print(&self, data: &[u8]) -> std::io::Result<()> {
        let mut stdout = std::io::stdout().lock();
        if self.hex {
            let line: Vec<String> = data.iter().map(|b| format!("{b:02x}")).collect();
            writeln!(stdout, "{}", line.join(" "))?;
        } else {
            stdout.write_all(data)?;
        }
        stdout.flush()
    }
}

impl Protocol for Monitor {
    fn connection_established(&mut self, transport: &mut dyn Transport) {
        info!(
            device = transport.device_name(),
            baud_rate = transport.config().baud_rate,
            "port open"
        );
        let greeting = std::mem::take(&mut self.greeting);
        if let Err(e) = transport.write_sequence(greeting) {
            warn!(error = %e, "could not send initial data");
        }
    }

    fn bytes_received(&mut self, data: &[u8], transport: &mut dyn Transport) {
        if let Err(e) = self.print(data) {
            warn!(error = %e, "stdout closed");
            transport.lose_connection();
            return;
        }
        if self.echo {
            if let Err(e) = transport.write(data.to_vec()) {
                debug!(error = %e, "echo dropped");
            }
        }

        self.received += data.len();
        if self.limit.is_some_and(|limit| self.received >= limit) {
            transport.lose_connection();
        }
    }

    fn connection_lost(&mut self, reason: DisconnectReason) {
        info!(%reason, received = self.received, "port closed");
        self.lost = Some(reason);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    if let Some(path) = &args.save_config {
        loader.save_to(path)?;
        println!("settings written to {}", path.display());
        return Ok(());
    }
    let config = loader.into_config();

    init_logging(
        &config.logging,
        args.log_format,
        args.log_level.as_deref(),
    )?;

    let device = resolve_device(args.device.as_deref(), &config.serial)?;

    let mut port_config = config.serial.port_config();
    if let Some(baud) = args.baud {
        port_config.baud_rate = baud;
    }

    let mut options = TransportOptions::default();
    if let Some(size) = args.read_buffer_size.or(config.transport.read_buffer_size) {
        options = options.with_read_buffer_size(size);
    }

    let monitor = Monitor {
        greeting: args.send.iter().map(|s| s.as_bytes().to_vec()).collect(),
        echo: args.echo,
        hex: args.hex,
        limit: args.count,
        received: 0,
        lost: None,
    };

    let reactor = PlatformLoop::new();
    let mut transport =
        PlatformTransport::open_with_options(monitor, &device, port_config, &reactor, options)?;
    reactor.run(&mut transport, None)?;

    match transport.protocol_mut().lost.take() {
        Some(reason) if reason.is_error() => Err(reason.to_string().into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_flag_goes_through_aliases() {
        let mut serial = SerialConfig {
            device: Some("/dev/ttyS0".to_string()),
            ..SerialConfig::default()
        };
        serial
            .port_aliases
            .insert("plc".to_string(), "/dev/ttyUSB3".to_string());

        assert_eq!(resolve_device(Some("plc"), &serial).unwrap(), "/dev/ttyUSB3");
        assert_eq!(resolve_device(Some("/dev/ttyACM0"), &serial).unwrap(), "/dev/ttyACM0");
        assert_eq!(resolve_device(None, &serial).unwrap(), "/dev/ttyS0");
    }

    #[test]
    fn test_missing_device_is_reported() {
        let serial = SerialConfig::default();
        assert!(matches!(
            resolve_device(None, &serial),
            Err(ConfigError::NoDevice)
        ));
    }

    #[test]
    fn test_save_config_flag_parses() {
        let args = Args::try_parse_from(["serialtx", "--save-config", "out.toml"]).unwrap();
        assert_eq!(args.save_config, Some(PathBuf::from("out.toml")));
        assert!(args.device.is_none());
    }
}
