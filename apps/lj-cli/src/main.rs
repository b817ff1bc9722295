use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use labjack_channels::ljm::DeviceChannel;
use labjack_channels::{
    loader, ljm, u12, ChannelError, ChannelHost, ChannelId, Command, DeviceRegistry, MetricsHub,
    Param, RegisterOptions, Reply,
};
use labjack_sdk::diag::{self, Direction};
use labjack_sdk::{Ljm, MockLjm, MockU12, U12};

#[derive(Parser, Debug)]
#[command(
    name = "lj",
    version,
    about = "LabJack channels CLI",
    disable_help_subcommand = true
)]
struct Cli {
    /// Driver backend
    #[arg(long, value_enum, default_value_t = Backend::Mock, global = true)]
    backend: Backend,

    /// Print results as JSON lines
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    json: bool,

    /// Print Prometheus metrics on exit
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend {
    /// In-process T7/U12 models
    Mock,
    /// The installed LabJack libraries
    Ljm,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command script, one host command per line
    Run {
        script: PathBuf,
    },
    /// Build a station from YAML and poll its registers
    Station {
        file: PathBuf,
        /// Polling rounds
        #[arg(long, default_value_t = 1u32)]
        count: u32,
        /// Pause between rounds
        #[arg(long, default_value_t = 1000u64)]
        interval_ms: u64,
    },
    /// Open a device and print its connection report
    Info {
        /// DeviceType ConnectionType Identifier; empty opens any device
        selectors: Vec<String>,
    },
    /// Dump a Modbus feedback packet given as hex bytes
    Feedback {
        bytes: Vec<String>,
        /// Treat the packet as a device response
        #[arg(long, action = ArgAction::SetTrue)]
        response: bool,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { ref script } => run_script(&cli, script),
        Commands::Station {
            ref file,
            count,
            interval_ms,
        } => run_station(&cli, file, count, interval_ms),
        Commands::Info { ref selectors } => device_info(cli.backend, selectors),
        Commands::Feedback {
            ref bytes,
            response,
        } => feedback(bytes, response),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn ljm_backend(backend: Backend) -> Result<Arc<dyn Ljm>> {
    match backend {
        Backend::Mock => Ok(Arc::new(MockLjm::t7())),
        #[cfg(feature = "ljm")]
        Backend::Ljm => Ok(Arc::new(labjack_sdk::LjmLibrary::new())),
        #[cfg(not(feature = "ljm"))]
        Backend::Ljm => anyhow::bail!("lj was built without the `ljm` feature"),
    }
}

fn u12_backend(backend: Backend) -> Option<Arc<dyn U12>> {
    match backend {
        Backend::Mock => Some(Arc::new(MockU12::new())),
        Backend::Ljm => vendor_u12(),
    }
}

#[cfg(all(feature = "u12", windows))]
fn vendor_u12() -> Option<Arc<dyn U12>> {
    Some(Arc::new(labjack_sdk::U12Library::new()))
}

#[cfg(not(all(feature = "u12", windows)))]
fn vendor_u12() -> Option<Arc<dyn U12>> {
    None
}

/// Returns the host together with the LJM driver, which names error codes.
fn build_host(cli: &Cli, options: RegisterOptions) -> Result<(ChannelHost, Arc<dyn Ljm>)> {
    let mut host = ChannelHost::new();
    if cli.metrics {
        let hub = MetricsHub::new().map_err(|e| anyhow::anyhow!(e))?;
        host = host.with_metrics(hub);
    }
    let sdk = ljm_backend(cli.backend)?;
    ljm::install(&mut host, Arc::clone(&sdk), options);
    match u12_backend(cli.backend) {
        Some(u12_sdk) => u12::install(&mut host, u12_sdk),
        None => debug!("u12 driver not available, skipping ljai/ljao/ljdo/ljdi"),
    }
    Ok((host, sdk))
}

/// Vendor codes are printed with the driver's name for them.
fn describe_error(sdk: &dyn Ljm, context: &str, err: &ChannelError) -> String {
    match err {
        ChannelError::Vendor { code, address } => {
            diag::describe_status(context, *code, &sdk.error_to_string(*code), *address)
        }
        _ => format!("{context}: {err}"),
    }
}

fn finish(cli: &Cli, host: &ChannelHost) {
    if let Some(m) = host.metrics().filter(|_| cli.metrics) {
        print!("{}", m.encode_text());
    }
}

#[derive(Serialize)]
struct ReplyRecord<'a> {
    command: usize,
    reply: serde_json::Value,
    text: &'a str,
}

#[derive(Serialize)]
struct Reading {
    ts: String,
    channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn reply_json(reply: &Reply) -> serde_json::Value {
    match reply {
        Reply::Empty => serde_json::Value::Null,
        Reply::Int(v) => serde_json::json!(v),
        Reply::Float(v) => serde_json::json!(v),
        Reply::Text(s) => serde_json::json!(s),
        Reply::Buffer(b) => serde_json::json!(b),
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

fn run_script(cli: &Cli, path: &PathBuf) -> Result<()> {
    let commands = loader::load_script(path)?;
    let (mut host, sdk) = build_host(cli, RegisterOptions::default())?;
    for (n, cmd) in commands.into_iter().enumerate() {
        let reply = host.execute(cmd).map_err(|e| {
            let context = format!("command {} of {}", n + 1, path.display());
            anyhow::anyhow!(describe_error(sdk.as_ref(), &context, &e))
        })?;
        if reply.is_empty() {
            continue;
        }
        let text = reply.to_string();
        if cli.json {
            let rec = ReplyRecord {
                command: n + 1,
                reply: reply_json(&reply),
                text: &text,
            };
            println!("{}", serde_json::to_string(&rec)?);
        } else {
            println!("{text}");
        }
    }
    finish(cli, &host);
    Ok(())
}

fn run_station(cli: &Cli, path: &PathBuf, count: u32, interval_ms: u64) -> Result<()> {
    let station = loader::load_station_file(path)?;
    let (mut host, sdk) = build_host(cli, station.options())?;
    for cmd in station.to_commands() {
        let what = format!("building station: {cmd:?}");
        host.execute(cmd)
            .map_err(|e| anyhow::anyhow!(describe_error(sdk.as_ref(), &what, &e)))?;
    }
    let registers = station.register_names();
    info!(
        registers = registers.len(),
        devices = station.devices.len(),
        "station ready"
    );

    for round in 0..count {
        if round > 0 {
            thread::sleep(Duration::from_millis(interval_ms));
        }
        for name in &registers {
            // A bare write reads the register and publishes to its links.
            let outcome = host
                .execute(Command::Write {
                    channel: name.clone(),
                    params: Vec::new(),
                })
                .map_err(|e| describe_error(sdk.as_ref(), name, &e));
            let ts = now_rfc3339();
            if let Err(e) = &outcome {
                warn!(register = %name, error = %e, "poll failed");
            }
            if cli.json {
                let (value, error) = match outcome {
                    Ok(reply) => (Some(reply_json(&reply)), None),
                    Err(e) => (None, Some(e)),
                };
                let rec = Reading {
                    ts,
                    channel: name.clone(),
                    value,
                    error,
                };
                println!("{}", serde_json::to_string(&rec)?);
            } else {
                match outcome {
                    Ok(reply) => println!("{ts}\t{name}\t{reply}"),
                    Err(e) => println!("{ts}\t{e}"),
                }
            }
        }
    }
    finish(cli, &host);
    Ok(())
}

fn device_info(backend: Backend, selectors: &[String]) -> Result<()> {
    if !selectors.is_empty() && selectors.len() != 3 {
        anyhow::bail!("expected DeviceType ConnectionType Identifier, or nothing");
    }
    let registry = DeviceRegistry::new();
    let device = DeviceChannel::new(ljm_backend(backend)?, registry.register_device(ChannelId(1)));
    let params: Vec<Param> = selectors.iter().map(|s| Param::from(s.as_str())).collect();
    device.open(&params).context("opening device")?;
    print!("{}", device.info().context("querying handle")?);
    Ok(())
}

fn parse_hex_bytes(parts: &[String]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for s in parts.iter().flat_map(|p| p.split([',', ' '])) {
        let t = s.trim();
        if t.is_empty() {
            continue;
        }
        let no_prefix = t.strip_prefix("0x").unwrap_or(t);
        let b = u8::from_str_radix(no_prefix, 16)
            .map_err(|e| anyhow::anyhow!("invalid hex byte '{t}': {e}"))?;
        out.push(b);
    }
    Ok(out)
}

fn feedback(bytes: &[String], response: bool) -> Result<()> {
    let packet = parse_hex_bytes(bytes)?;
    let (direction, description) = if response {
        (Direction::Response, "Feedback response")
    } else {
        (Direction::Command, "Feedback command")
    };
    print!("{}", diag::feedback_report(&packet, description, direction));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_bytes_accept_prefixes_and_commas() {
        let parts = vec!["0x01,ff".to_string(), "0A".to_string()];
        assert_eq!(parse_hex_bytes(&parts).unwrap(), vec![0x01, 0xff, 0x0a]);
        assert!(parse_hex_bytes(&["zz".to_string()]).is_err());
    }

    #[test]
    fn cli_parses_station_options() {
        let cli = Cli::parse_from([
            "lj",
            "--json",
            "station",
            "bench.yaml",
            "--count",
            "3",
            "--interval-ms",
            "50",
        ]);
        assert!(cli.json);
        assert_eq!(cli.backend, Backend::Mock);
        assert!(matches!(
            cli.command,
            Commands::Station {
                count: 3,
                interval_ms: 50,
                ..
            }
        ));
    }

    #[test]
    fn replies_as_json() {
        assert_eq!(reply_json(&Reply::Empty), serde_json::Value::Null);
        assert_eq!(reply_json(&Reply::Buffer(vec![1, 2])), serde_json::json!([1, 2]));
        assert_eq!(reply_json(&Reply::Float(2.5)), serde_json::json!(2.5));
    }

    #[test]
    fn vendor_errors_use_driver_names() {
        let sdk = MockLjm::t7();
        let err = ChannelError::Vendor {
            code: 1224,
            address: Some(0),
        };
        assert_eq!(
            describe_error(&sdk, "ain0", &err),
            "ain0 error: \"LJME_DEVICE_NOT_OPEN\" (code 1224) at address 0"
        );
        let warning = ChannelError::Vendor {
            code: 201,
            address: None,
        };
        assert_eq!(
            describe_error(&sdk, "ain0", &warning),
            "ain0 warning: \"LJM error 201\" (warning code 201)"
        );
        assert_eq!(
            describe_error(&sdk, "ain0", &ChannelError::NotConfigured),
            format!("ain0: {}", ChannelError::NotConfigured)
        );
    }
}
