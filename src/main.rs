use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use usb_serial_bridge::config::{Config, ConfigLoader};
use usb_serial_bridge::logging::init_logging;
use usb_serial_bridge::port::available_ports;
use usb_serial_bridge::{
    DeviceIdentity, DriverRegistry, NativeSerialPort, PortEvent, SerialDevice, SerialPort,
};

#[derive(Parser, Debug)]
#[command(
    name = "usb-serial",
    version,
    about = "Inspect USB serial bridges and talk to serial ports."
)]
struct Cli {
    /// Configuration file (defaults to the standard search path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports the OS exposes, with the driver family for USB ones
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show the vendor/product table the registry matches against
    Drivers,
    /// Open a port and print received lines
    Monitor {
        /// Port path or configured alias
        port: String,
        /// Baud rate (defaults to the configured one)
        #[arg(short, long)]
        baud: Option<u32>,
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Print the effective configuration
    Config {
        /// Print only the resolved file path
        #[arg(long)]
        path: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let mut config = loader.config().clone();
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    init_logging(&config.logging);

    let registry = DriverRegistry::with_builtin_drivers();
    let added = registry.register_all(&config.drivers.extra);
    if added > 0 {
        info!("Registered {} identities from configuration", added);
    }

    match cli.command {
        Command::List { json } => list_ports(&registry, json)?,
        Command::Drivers => {
            for (identity, chip) in registry.entries() {
                println!("{identity}  {chip}");
            }
        }
        Command::Monitor {
            port,
            baud,
            seconds,
        } => monitor(&config, &port, baud, seconds.map(Duration::from_secs))?,
        Command::Config { path } => {
            if path {
                match &loader.config_path {
                    Some(p) => println!("{}", p.display()),
                    None => println!("(defaults)"),
                }
            } else {
                print!("{}", loader.to_toml()?);
            }
        }
    }
    Ok(())
}

fn list_ports(registry: &DriverRegistry, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ports = available_ports()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        match &port.usb {
            Some(usb) => {
                let identity = DeviceIdentity::new(usb.vendor_id, usb.product_id);
                let chip = registry
                    .chip_kind(identity)
                    .map_or_else(|| "unsupported".to_string(), |c| c.to_string());
                let product = usb.product.as_deref().unwrap_or("");
                println!("{:<20} {}  {:<10} {}", port.name, identity, chip, product);
            }
            None => println!("{:<20} (not USB)", port.name),
        }
    }
    Ok(())
}

fn monitor(
    config: &Config,
    port: &str,
    baud: Option<u32>,
    limit: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.resolve_port(port);
    let mut params = config.serial.clone();
    if let Some(baud) = baud {
        params.baud_rate = baud;
    }
    // Line reads block up to the read timeout; keep polling responsive.
    params.read_timeout_ms = params.read_timeout_ms.max(100);

    let device = SerialDevice::new(
        Arc::new(NativeSerialPort::new(path)),
        params.clone(),
        config.monitor.options(),
    );
    device.subscribe(Arc::new(|event: &PortEvent| {
        if let PortEvent::ErrorReceived { kind, message } = event {
            warn!("{:?}: {}", kind, message);
        }
    }));
    device.open(params)?;
    info!("Monitoring {}", device.name());

    let started = Instant::now();
    while limit.map_or(true, |l| started.elapsed() < l) {
        let line = device.read_line()?;
        if !line.is_empty() {
            println!("{line}");
        }
    }
    device.close()?;
    Ok(())
}
