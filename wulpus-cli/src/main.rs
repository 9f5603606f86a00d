use std::error::Error;
use std::net::IpAddr;
use std::thread::sleep;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::warn;
use wulpus_lib::WulpusDevice;
use wulpus_lib::acquisition::{Acquisition, AcquisitionOptions};
use wulpus_lib::device::{CONFIG_PACKAGE_SIZE, DeviceConfig};
use wulpus_lib::discovery::{DEFAULT_PORT, NetworkDevice};
use wulpus_lib::frame::ProtocolVersion;

#[derive(Parser)]
#[command(
    name = "wulpus-cli",
    about = "Control and stream a WULPUS ultrasound probe over TCP"
)]
struct Cli {
    /// Probe IP address (pass the address resolved by your mDNS browser)
    #[arg(long)]
    ip: IpAddr,

    /// Probe TCP port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Samples per acquisition frame
    #[arg(long, default_value_t = 400)]
    acq_length: usize,

    /// Speak the legacy (pre-streaming) firmware protocol
    #[arg(long)]
    legacy: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Round-trip a PING and report the echo
    Ping,
    /// Restart the acquisition firmware
    Reset,
    /// Push a 68-byte configuration package, given as hex
    Config {
        /// Configuration package as a hex string (136 hex digits)
        package: String,
    },
    /// Stream data records and print them
    Stream {
        /// Number of records to consume before stopping
        #[arg(long, default_value_t = 100)]
        count: u64,

        /// Print records as JSON lines instead of summaries
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // The library only emits tracing events; the subscriber lives here.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.tracing_level_filter())
        .init();

    let config = DeviceConfig {
        acq_length: cli.acq_length,
        version: if cli.legacy {
            ProtocolVersion::V1
        } else {
            ProtocolVersion::V2
        },
        ..DeviceConfig::default()
    };

    let mut device = WulpusDevice::new(config);
    device.open(Some(NetworkDevice::new(
        "wulpus",
        String::new(),
        cli.ip,
        cli.port,
    )))?;

    run(device, cli.command)
}

fn run(mut device: WulpusDevice, command: Cmd) -> Result<(), Box<dyn Error>> {
    match command {
        Cmd::Ping => {
            let start = Instant::now();
            let (_, payload) = device.ping()?;
            println!(
                "probe answered in {:.1} ms ({} payload bytes)",
                start.elapsed().as_secs_f64() * 1000.0,
                payload.len()
            );
        }
        Cmd::Reset => {
            device.reset()?;
            println!("probe reset");
        }
        Cmd::Config { package } => {
            let package = hex::decode(package.trim())?;
            if package.len() != CONFIG_PACKAGE_SIZE {
                device.close();
                return Err(format!(
                    "configuration package must be {CONFIG_PACKAGE_SIZE} bytes, got {}",
                    package.len()
                )
                .into());
            }
            device.send_config(&package)?;
            println!("configuration acknowledged");
        }
        Cmd::Stream { count, json } => {
            stream(device, count, json)?;
            return Ok(());
        }
    }

    device.close();
    Ok(())
}

/// Consume `count` records through the latest-record handoff, the same way a
/// rendering loop would.
fn stream(device: WulpusDevice, count: u64, json: bool) -> Result<(), Box<dyn Error>> {
    let acquisition = Acquisition::spawn(device, AcquisitionOptions::default());

    let mut consumed = 0u64;
    while consumed < count {
        if acquisition.is_finished() {
            break;
        }
        match acquisition.latest() {
            Some(record) => {
                consumed += 1;
                if json {
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    println!("{record}");
                }
            }
            None => sleep(Duration::from_millis(5)),
        }
    }

    let (mut device, outcome) = acquisition.stop();
    if let Err(err) = outcome {
        warn!(error = %err, "acquisition ended early");
    }
    device.close();

    println!("consumed {consumed} record(s)");
    Ok(())
}
