//! Command-line tool for Inficon VGC50x vacuum gauge controllers.
//!
//! Subcommands:
//! - `info`: Identity, gauge count, unit and connected sensors
//! - `read`: Pressure of one or all gauges
//! - `unit`: Get or set the pressure unit
//! - `sensors`: Sensor type per channel
//! - `errors`: Controller error flags
//! - `log`: Periodic pressure logging to CSV, driven by a JSON config
//! - `repl`: Interactive raw command exchange

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gauge_hardware::inficon::poll::{self, PressureSample};
use gauge_hardware::inficon::{
    ControllerConfig, ControllerState, PollConfig, PressureUnit, Vgc502, DEFAULT_PORT,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Default controller address
const DEFAULT_HOST: &str = "192.168.1.60";

/// Inficon VGC50x Gauge Controller Tool
#[derive(Parser, Debug)]
#[command(name = "vgc_tool")]
#[command(about = "Query and log Inficon VGC50x vacuum gauge controllers")]
#[command(version)]
struct Args {
    /// Controller hostname or IP address
    #[arg(long, global = true, default_value = DEFAULT_HOST)]
    host: String,

    /// Controller TCP port
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Read/write timeout in milliseconds
    #[arg(long, global = true, default_value = "1000")]
    timeout_ms: u64,

    /// JSON controller config (overrides --host, --port and --timeout-ms)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show device identity, gauge count, unit and sensors
    Info,

    /// Read gauge pressures
    Read {
        /// Gauge to read (reads all if not specified)
        #[arg(short, long)]
        gauge: Option<u8>,

        /// Read all gauges in a single PRX exchange
        #[arg(long, conflicts_with = "gauge")]
        combined: bool,
    },

    /// Get or set the pressure unit
    Unit {
        /// Unit to select (prints the current unit if omitted)
        #[arg(value_enum)]
        set: Option<PressureUnit>,
    },

    /// Show the sensor type connected to each channel
    Sensors,

    /// Show controller error flags
    Errors,

    /// Log pressures periodically to CSV
    Log {
        /// JSON logging config (device_host, log_channels, interval_secs, ...)
        #[arg(short, long)]
        poll_config: PathBuf,

        /// Number of polling passes (0 = until interrupted)
        #[arg(short, long, default_value = "0")]
        count: u32,
    },

    /// Interactive raw command REPL
    Repl,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match &args.command {
        Command::Info => cmd_info(&controller_config(&args)?),
        Command::Read { gauge, combined } => {
            cmd_read(&controller_config(&args)?, *gauge, *combined)
        }
        Command::Unit { set } => cmd_unit(&controller_config(&args)?, *set),
        Command::Sensors => cmd_sensors(&controller_config(&args)?),
        Command::Errors => cmd_errors(&controller_config(&args)?),
        Command::Log { poll_config, count } => cmd_log(poll_config, *count),
        Command::Repl => cmd_repl(&controller_config(&args)?),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn controller_config(args: &Args) -> Result<ControllerConfig> {
    if let Some(path) = &args.config {
        return ControllerConfig::load_from_file(path)
            .with_context(|| format!("Loading {}", path.display()));
    }
    Ok(ControllerConfig::new(args.host.as_str())
        .with_port(args.port)
        .with_timeout(Duration::from_millis(args.timeout_ms)))
}

fn open(config: &ControllerConfig) -> Result<Vgc502> {
    info!("Connecting to VGC at {}:{}...", config.host, config.port);
    Ok(Vgc502::open(config.clone())?)
}

// ==================== Query Commands ====================

fn cmd_info(config: &ControllerConfig) -> Result<()> {
    let mut vgc = open(config)?;

    if let Some(identity) = vgc.identity() {
        println!("Model:    {}", identity.model);
        println!("Part no.: {}", identity.part_number);
        println!("Serial:   {}", identity.serial_number);
        println!("Firmware: {}", identity.firmware_version);
        println!("Hardware: {}", identity.hardware_version);
    }
    println!("Gauges:   {}", vgc.gauge_count().unwrap_or(0));
    println!("Unit:     {}", vgc.get_unit()?);

    for (i, sensor) in vgc.sensor_types()?.iter().enumerate() {
        println!("Sensor {}: {}", i + 1, sensor);
    }

    vgc.shutdown();
    Ok(())
}

fn cmd_read(config: &ControllerConfig, gauge: Option<u8>, combined: bool) -> Result<()> {
    let mut vgc = open(config)?;
    let unit = vgc.get_unit()?;

    let readings = if combined {
        vgc.read_all()?
    } else {
        let gauges: Vec<u8> = match gauge {
            Some(g) => vec![g],
            None => (1..=vgc.gauge_count().unwrap_or(0)).collect(),
        };
        gauges
            .into_iter()
            .map(|g| vgc.read_gauge(g))
            .collect::<Result<Vec<_>, _>>()?
    };

    for reading in readings {
        println!(
            "Gauge {}: {:e} {} ({})",
            reading.gauge, reading.value, unit, reading.status
        );
    }

    vgc.shutdown();
    Ok(())
}

fn cmd_unit(config: &ControllerConfig, set: Option<PressureUnit>) -> Result<()> {
    let mut vgc = open(config)?;

    match set {
        Some(unit) => {
            if !vgc.set_unit(unit)? {
                bail!(
                    "Controller did not accept unit {unit}, still reports {}",
                    vgc.get_unit()?
                );
            }
            println!("Unit set to {unit}");
        }
        None => println!("{}", vgc.get_unit()?),
    }

    vgc.shutdown();
    Ok(())
}

fn cmd_sensors(config: &ControllerConfig) -> Result<()> {
    let mut vgc = open(config)?;
    for (i, sensor) in vgc.sensor_types()?.iter().enumerate() {
        println!("Gauge {}: {}", i + 1, sensor);
    }
    vgc.shutdown();
    Ok(())
}

fn cmd_errors(config: &ControllerConfig) -> Result<()> {
    let mut vgc = open(config)?;
    let status = vgc.error_status()?;

    if status.is_empty() {
        println!("No errors");
    } else {
        for (name, _) in status.iter_names() {
            println!("{name}");
        }
    }

    vgc.shutdown();
    Ok(())
}

// ==================== Log Command ====================

fn open_output(csv_file: Option<&Path>) -> Result<Box<dyn Write>> {
    match csv_file {
        Some(path) => {
            let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Opening {}", path.display()))?;
            if is_new {
                writeln!(file, "{}", PressureSample::CSV_HEADER)?;
            }
            Ok(Box::new(file))
        }
        None => {
            let mut stdout = io::stdout();
            writeln!(stdout, "{}", PressureSample::CSV_HEADER)?;
            Ok(Box::new(stdout))
        }
    }
}

fn cmd_log(poll_config: &Path, count: u32) -> Result<()> {
    let config = PollConfig::load_from_file(poll_config)
        .with_context(|| format!("Loading {}", poll_config.display()))?;
    let channels = config.channels()?;
    let mut out = open_output(config.csv_file.as_deref())?;

    let mut vgc = Vgc502::new(config.controller());
    let mut passes = 0u32;

    loop {
        if vgc.state() != ControllerState::Ready {
            info!("Connecting to VGC at {}...", config.device_host);
            if let Err(e) = vgc.initialize() {
                warn!("Controller not available: {}, will retry", e);
            }
        }

        if vgc.state() == ControllerState::Ready {
            for sample in poll::poll_channels(&mut vgc, &channels) {
                sample.write_csv(&mut out)?;
                if config.verbose {
                    if let Ok(p) = &sample.pressure {
                        info!("{} = {:e} {}", sample.field, p, sample.units);
                    }
                }
            }
            out.flush()?;
        }

        passes += 1;
        if count > 0 && passes >= count {
            break;
        }

        info!("Waiting {} seconds...", config.interval_secs);
        std::thread::sleep(config.interval());
    }

    vgc.shutdown();
    Ok(())
}

// ==================== REPL Command ====================

fn cmd_repl(config: &ControllerConfig) -> Result<()> {
    let mut vgc = open(config)?;

    if let Some(identity) = vgc.identity() {
        println!("Connected: {identity}");
    }
    println!();
    println!("VGC REPL - Enter MNEMONIC[,args], 'quit' to exit");
    println!("Examples: PR1, PRX, UNI, UNI,1, AYT, TID, ERR");
    println!();

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break; // EOF
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            println!("Bye!");
            break;
        }

        let mut parts = line.split(',').map(str::trim);
        let code = parts.next().unwrap_or_default().to_ascii_uppercase();
        let args: Vec<&str> = parts.collect();

        match vgc.query_raw(&code, &args) {
            Ok(payload) => println!("{payload}"),
            Err(e) => {
                println!("Error: {e}");
                if vgc.state() == ControllerState::Disconnected {
                    bail!("Connection lost");
                }
            }
        }
    }

    vgc.shutdown();
    Ok(())
}
