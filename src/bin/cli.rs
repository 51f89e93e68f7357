//! Rangelink CLI - Command-line interface
//!
//! Discovers the ultrasonic sensor and trigger device and runs their links
//! from the terminal, for bench testing and headless operation.

use chrono::Local;
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::fmt::Display;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rangelink_core::cli::{parse_line, render, CliResult, ControlLine, OutputFormat};
use rangelink_core::config::{AppConfig, LoggingConfig};
use rangelink_core::core::codec::parse_escapes;
use rangelink_core::{
    ConnectionMonitor, DeviceIdentity, DeviceResolver, DistanceEvent, MonitorEvent, TriggerEvent,
    TriggerTransmitter, UltrasonicReader,
};

const SENSOR: &str = "sensor";
const TRIGGER: &str = "trigger";

/// Rangelink CLI
#[derive(Parser, Debug)]
#[command(
    name = "rangelink",
    version,
    about = "Ultrasonic distance sensor and trigger device link tool",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "RANGELINK_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Prefix text output with the local time
    #[arg(short, long, global = true)]
    timestamps: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List USB serial devices and the expected pair
    Scan,

    /// Print the device path for a vendor/product identity
    Resolve {
        /// Vendor ID (hex)
        #[arg(long)]
        vid: String,

        /// Product ID (hex)
        #[arg(long)]
        pid: String,

        /// Wait up to this many seconds for the device
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Print distance readings from the ultrasonic sensor
    Listen {
        /// Serial port (resolved from the sensor identity if omitted)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,
    },

    /// Send trigger payloads; stdin lines are sent once or reconfigure the link
    Trigger {
        /// Serial port (resolved from the trigger identity if omitted)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Interval (ms)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Payload text, escapes such as \r\n are expanded
        #[arg(long)]
        payload: Option<String>,
    },

    /// Resolve both devices, run both links and watch for disconnects
    Run,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return CliResult::from(&e).to_exit_code();
        }
    };
    let _guard = init_logging(&cli, &config.logging);

    let result = match &cli.command {
        Commands::Scan => scan(&cli, &config),
        Commands::Resolve { vid, pid, wait } => resolve(&config, vid, pid, *wait).await,
        Commands::Listen { port, baud } => listen(&cli, &config, port.clone(), *baud).await,
        Commands::Trigger {
            port,
            baud,
            interval,
            payload,
        } => {
            trigger(
                &cli,
                &config,
                port.clone(),
                *baud,
                *interval,
                payload.as_deref(),
            )
            .await
        }
        Commands::Run => run(&cli, &config).await,
    };

    let result = result.unwrap_or_else(|e| CliResult::from_error(&e));
    match (&result, result.message()) {
        (CliResult::Success(_), Some(msg)) if !cli.quiet => eprintln!("{}", msg),
        (CliResult::Error(..), Some(msg)) => eprintln!("Error: {}", msg),
        _ => {}
    }
    result.to_exit_code()
}

fn init_logging(cli: &Cli, logging: &LoggingConfig) -> Option<WorkerGuard> {
    let default_directive = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        logging.level.as_str()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rangelink.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn resolver_for(config: &AppConfig) -> DeviceResolver {
    if cfg!(target_os = "linux") {
        config.resolver.resolver()
    } else {
        DeviceResolver::system()
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Run `wait_for` off the async runtime
async fn locate(
    resolver: DeviceResolver,
    identity: DeviceIdentity,
    timeout: Duration,
) -> anyhow::Result<Option<PathBuf>> {
    let found = tokio::task::spawn_blocking(move || {
        resolver.wait_for(&identity.vendor_hex(), &identity.product_hex(), timeout)
    })
    .await?;
    Ok(found)
}

async fn device_port(
    config: &AppConfig,
    port: Option<String>,
    identity: DeviceIdentity,
) -> anyhow::Result<Option<String>> {
    if port.is_some() {
        return Ok(port);
    }
    let found = locate(resolver_for(config), identity, config.resolver.wait_timeout()).await?;
    Ok(found.as_deref().map(path_string))
}

/// Bridge a link's event channel onto the async runtime
fn forward<T: Send + 'static>(rx: Receiver<T>) -> mpsc::UnboundedReceiver<T> {
    let (tx, out) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for item in rx.iter() {
            if tx.send(item).is_err() {
                break;
            }
        }
    });
    out
}

/// Read stdin lines on a detached thread so exit never waits for input
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, out) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    out
}

fn emit<T: Serialize + Display>(cli: &Cli, value: &T) {
    let line = render(value, cli.format);
    if cli.timestamps && cli.format == OutputFormat::Text {
        println!("[{}] {}", Local::now().format("%H:%M:%S%.3f"), line);
    } else {
        println!("{}", line);
    }
}

fn scan(cli: &Cli, config: &AppConfig) -> anyhow::Result<CliResult> {
    let report = resolver_for(config).status_report();

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", report),
    }

    Ok(CliResult::success())
}

async fn resolve(
    config: &AppConfig,
    vid: &str,
    pid: &str,
    wait: Option<u64>,
) -> anyhow::Result<CliResult> {
    let Some(identity) = DeviceIdentity::parse(vid, pid) else {
        return Ok(CliResult::invalid_args(format!(
            "Malformed device identity {}:{}",
            vid, pid
        )));
    };

    let resolver = resolver_for(config);
    let found = match wait {
        Some(secs) => locate(resolver, identity, Duration::from_secs(secs)).await?,
        None => resolver.resolve_identity(identity),
    };

    match found {
        Some(path) => {
            println!("{}", path.display());
            Ok(CliResult::success())
        }
        None => Ok(CliResult::device_not_found(&identity.to_string())),
    }
}

async fn listen(
    cli: &Cli,
    config: &AppConfig,
    port: Option<String>,
    baud: Option<u32>,
) -> anyhow::Result<CliResult> {
    let identity = config.sensor.identity()?;
    let Some(port) = device_port(config, port, identity).await? else {
        return Ok(CliResult::device_not_found(&identity.to_string()));
    };

    let mut serial = config.sensor.serial(&port);
    if let Some(baud) = baud {
        serial = serial.baud_rate(baud);
    }

    let reader = UltrasonicReader::new(serial);
    let mut events = forward(reader.subscribe());
    reader.start()?;

    if !cli.quiet {
        eprintln!(
            "Listening on {}. Press Ctrl+C to exit.",
            reader.config().connection_info()
        );
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => break CliResult::success(),
            event = events.recv() => match event {
                Some(event) => {
                    emit(cli, &event);
                    if let DistanceEvent::Error { message } = event {
                        break CliResult::link_failed(message);
                    }
                }
                None => break CliResult::link_failed("Sensor event channel closed"),
            },
        }
    };

    reader.stop();
    info!("Decoder stats: {:?}", reader.stats());
    Ok(result)
}

async fn trigger(
    cli: &Cli,
    config: &AppConfig,
    port: Option<String>,
    baud: Option<u32>,
    interval: Option<u64>,
    payload: Option<&str>,
) -> anyhow::Result<CliResult> {
    let interval_ms = interval.unwrap_or(config.trigger.interval_ms);
    if interval_ms == 0 {
        return Ok(CliResult::invalid_args("Interval must be positive"));
    }

    let identity = config.trigger.identity()?;
    let Some(port) = device_port(config, port, identity).await? else {
        return Ok(CliResult::device_not_found(&identity.to_string()));
    };

    let mut serial = config.trigger.serial(&port);
    if let Some(baud) = baud {
        serial = serial.baud_rate(baud);
    }
    let payload = payload.map_or_else(|| config.trigger.payload_bytes(), parse_escapes);

    let transmitter = TriggerTransmitter::new(serial)
        .with_trigger_data(payload)
        .with_interval(Duration::from_millis(interval_ms));
    let mut events = forward(transmitter.subscribe());
    transmitter.start()?;

    if !cli.quiet {
        eprintln!(
            "Triggering {} every {} ms. Type a line to send it once, \
             :interval <ms> or :payload <text> to reconfigure. Press Ctrl+C to exit.",
            port, interval_ms
        );
    }

    let mut lines = stdin_lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => break CliResult::success(),
            Some(line) = lines.recv() => handle_control(&transmitter, &line),
            event = events.recv() => match event {
                Some(TriggerEvent::Error { message }) => break CliResult::link_failed(message),
                Some(TriggerEvent::Stopped) | None => {
                    break CliResult::link_failed("Trigger link stopped")
                }
                Some(event) => print_trigger_event(cli, &event),
            },
        }
    };

    transmitter.stop();
    Ok(result)
}

fn handle_control(transmitter: &TriggerTransmitter, line: &str) {
    match parse_line(line) {
        Ok(None) => {}
        Ok(Some(ControlLine::Interval(ms))) => {
            if let Err(e) = transmitter.update_interval(ms) {
                eprintln!("Error: {}", e);
            }
        }
        Ok(Some(ControlLine::Payload(data))) => transmitter.update_trigger_data(data),
        Ok(Some(ControlLine::Send(data))) => {
            if !transmitter.send_once(&data) {
                eprintln!("Error: manual send failed");
            }
        }
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn print_trigger_event(cli: &Cli, event: &TriggerEvent) {
    // Periodic sends are frequent; only show them when asked
    if matches!(event, TriggerEvent::Sent { manual: false, .. }) && !cli.verbose {
        return;
    }
    emit(cli, event);
}

async fn run(cli: &Cli, config: &AppConfig) -> anyhow::Result<CliResult> {
    let sensor_id = config.sensor.identity()?;
    let trigger_id = config.trigger.identity()?;
    let timeout = config.resolver.wait_timeout();

    let (sensor_path, trigger_path) = tokio::try_join!(
        locate(resolver_for(config), sensor_id, timeout),
        locate(resolver_for(config), trigger_id, timeout),
    )?;
    let Some(sensor_path) = sensor_path else {
        return Ok(CliResult::device_not_found(&sensor_id.to_string()));
    };
    let Some(trigger_path) = trigger_path else {
        return Ok(CliResult::device_not_found(&trigger_id.to_string()));
    };

    let reader = UltrasonicReader::new(config.sensor.serial(&path_string(&sensor_path)));
    let transmitter = TriggerTransmitter::new(config.trigger.serial(&path_string(&trigger_path)))
        .with_trigger_data(config.trigger.payload_bytes())
        .with_interval(config.trigger.interval());

    let mut readings = forward(reader.subscribe());
    let mut triggers = forward(transmitter.subscribe());

    reader.start()?;
    if let Err(e) = transmitter.start() {
        reader.stop();
        return Err(e.into());
    }

    let (monitor_tx, mut monitor_rx) = mpsc::channel(16);
    let mut monitor = ConnectionMonitor::new(config.monitor.period(), monitor_tx);
    monitor.watch(SENSOR, &sensor_path);
    monitor.watch(TRIGGER, &trigger_path);
    monitor.start();

    if !cli.quiet {
        eprintln!(
            "Running: sensor {}, trigger {}. Press Ctrl+C to exit.",
            sensor_path.display(),
            trigger_path.display()
        );
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => break CliResult::success(),
            Some(event) = readings.recv() => emit(cli, &event),
            Some(event) = triggers.recv() => print_trigger_event(cli, &event),
            Some(event) = monitor_rx.recv() => {
                emit(cli, &event);
                if matches!(event, MonitorEvent::Disconnected { .. }) {
                    match event.name() {
                        SENSOR => tokio::task::block_in_place(|| reader.stop()),
                        TRIGGER => tokio::task::block_in_place(|| transmitter.stop()),
                        other => debug!("Disconnect of unknown watch {}", other),
                    }
                }
            }
        }

        if !reader.is_running() && !transmitter.is_running() {
            break CliResult::link_failed("All links stopped");
        }
    };

    monitor.stop();
    transmitter.stop();
    reader.stop();
    Ok(result)
}
