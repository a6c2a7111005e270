use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use sigsift::alerting::{AlertFormat, AlertSink};
use sigsift::config::{OutputConfig, Settings};
use sigsift::engine::pipeline::{Pipeline, PipelineConfig};
use sigsift::engine::{Engine, RequestBuffer};
use sigsift::rules::{FlowDirection, Protocol, RuleSet};
use sigsift::session::{ConnKey, SessionTracker};
use sigsift::Result;
use std::io::{BufRead, BufReader, Write};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "sigsift")]
#[command(author = "SigSift Contributors")]
#[command(version = "0.1.0")]
#[command(about = "A signature-matching detection engine for HTTP request streams", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Rule files to load (overrides config file paths)
    #[arg(short = 'R', long = "rules", value_name = "FILE")]
    rule_files: Vec<PathBuf>,

    /// JSONL request file to replay instead of reading stdin
    #[arg(short = 'r', long, value_name = "FILE")]
    requests: Option<PathBuf>,

    /// Generate default configuration file
    #[arg(long)]
    generate_config: bool,

    /// Verbose logging (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress most output)
    #[arg(short, long)]
    quiet: bool,
}

/// One request on the wire, as serialized by the upstream HTTP tap
#[derive(Debug, Deserialize)]
struct RequestRecord {
    src_ip: IpAddr,
    src_port: u16,
    dst_ip: IpAddr,
    dst_port: u16,
    #[serde(default = "default_protocol")]
    protocol: Protocol,
    #[serde(default = "default_direction")]
    direction: FlowDirection,
    #[serde(default)]
    payload: String,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

fn default_protocol() -> Protocol {
    Protocol::Http
}

fn default_direction() -> FlowDirection {
    FlowDirection::ToServer
}

impl RequestRecord {
    fn into_buffer(self) -> RequestBuffer {
        let conn = ConnKey {
            src_ip: self.src_ip,
            src_port: self.src_port,
            dst_ip: self.dst_ip,
            dst_port: self.dst_port,
            protocol: self.protocol,
        };
        let mut buf = RequestBuffer::new(conn, self.direction, self.payload.into_bytes());
        if let Some(uri) = self.uri {
            buf = buf.with_uri(uri);
        }
        if let Some(method) = self.method {
            buf = buf.with_method(method);
        }
        if let Some(ts) = self.timestamp {
            buf = buf.with_timestamp(ts);
        }
        buf
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle config generation
    if cli.generate_config {
        generate_default_config()?;
        return Ok(());
    }

    // Load configuration FIRST (before logging, so we can use config settings)
    let mut settings = load_config(&cli)?;

    // Initialize logging (CLI flag overrides config file setting)
    init_logging(&cli, &settings)?;

    info!("Starting sigsift v{}", env!("CARGO_PKG_VERSION"));

    // Override config with CLI arguments
    if !cli.rule_files.is_empty() {
        settings.rules.paths = cli.rule_files.clone();
    }

    settings.validate().context("Invalid configuration")?;

    info!("Configuration loaded successfully");
    info!(
        "Worker threads: {}",
        if settings.detection.worker_threads == 0 {
            num_cpus::get().saturating_sub(2).max(1)
        } else {
            settings.detection.worker_threads
        }
    );

    // Set up graceful shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    ctrlc::set_handler(move || {
        warn!("Received shutdown signal");
        shutdown_clone.store(true, Ordering::Relaxed);
    })
    .context("Failed to set Ctrl+C handler")?;

    if let Err(e) = run(settings, shutdown, cli.requests) {
        error!("Detection error: {}", e);
        return Err(e.into());
    }

    info!("sigsift shutdown complete");
    Ok(())
}

fn init_logging(cli: &Cli, settings: &Settings) -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let log_level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => settings.logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter_string = format!("sigsift={}", log_level);

    // Use custom filter, but allow RUST_LOG to override if explicitly set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_string))
    } else {
        EnvFilter::new(filter_string)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Settings> {
    if let Some(config_path) = &cli.config {
        Settings::from_file(config_path).context("Failed to load configuration file")
    } else {
        // Try default locations
        let default_paths = vec![
            PathBuf::from("sigsift.yaml"),
            PathBuf::from("config/sigsift.yaml"),
            PathBuf::from("/etc/sigsift/sigsift.yaml"),
        ];

        for path in default_paths {
            if path.exists() {
                return Settings::from_file(&path)
                    .context(format!("Failed to load configuration from {:?}", path));
            }
        }

        Ok(Settings::default_config())
    }
}

fn generate_default_config() -> anyhow::Result<()> {
    let config = Settings::default_config();
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize config")?;

    let output_path = PathBuf::from("sigsift.yaml");
    std::fs::write(&output_path, yaml).context("Failed to write config file")?;

    println!("Generated default configuration at: {:?}", output_path);
    Ok(())
}

fn load_rules(settings: &Settings) -> Result<RuleSet> {
    let mut set = RuleSet::new();

    for (name, value) in &settings.variables {
        set.variables_mut()
            .define(name, value)
            .map_err(sigsift::SigError::Config)?;
    }

    let report = set.load_from_files(&settings.rules.paths)?;
    info!(
        "Loaded {} rules ({} skipped)",
        report.loaded,
        report.skipped.len()
    );
    for skipped in &report.skipped {
        warn!("Skipped rule at line {}: {}", skipped.line, skipped.error);
    }
    if settings.rules.strict && !report.skipped.is_empty() {
        return Err(sigsift::SigError::Config(format!(
            "{} rules failed to parse in strict mode",
            report.skipped.len()
        )));
    }

    Ok(set)
}

fn open_sink(settings: &Settings) -> Result<AlertSink> {
    let capacity = settings.detection.alert_queue_size;
    let (writer, format): (Box<dyn Write + Send>, AlertFormat) = match &settings.output {
        OutputConfig::Json { path } => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            (Box::new(file), AlertFormat::Json)
        }
        OutputConfig::Fast { path } => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            (Box::new(file), AlertFormat::Fast)
        }
        OutputConfig::Stdout { format } => {
            let fmt = if format == "json" {
                AlertFormat::Json
            } else {
                AlertFormat::Fast
            };
            (Box::new(std::io::stdout()), fmt)
        }
    };
    Ok(AlertSink::spawn(writer, format, capacity))
}

fn run(settings: Settings, shutdown: Arc<AtomicBool>, requests: Option<PathBuf>) -> Result<()> {
    info!("Initializing detection components...");

    let rule_set = load_rules(&settings)?;
    let stats = rule_set.stats();
    info!("Rule set:\n{}", stats);

    let engine = Arc::new(Engine::new(rule_set)?);
    let tracker = Arc::new(SessionTracker::new(
        chrono::Duration::seconds(settings.session.idle_timeout_secs as i64),
        settings.session.history_depth,
    ));
    let sink = Arc::new(open_sink(&settings)?);

    let pipeline = Pipeline::start(
        PipelineConfig {
            workers: settings.detection.worker_threads,
            queue_size: settings.detection.request_queue_size,
            expire_interval: Duration::from_secs(settings.session.expire_interval_secs),
        },
        engine.clone(),
        tracker.clone(),
        sink.clone(),
    );

    // Request source: JSONL file, or stdin when none given
    let reader: Box<dyn BufRead> = match &requests {
        Some(path) => {
            info!("Replaying requests from: {:?}", path);
            Box::new(BufReader::new(std::fs::File::open(path)?))
        }
        None => {
            info!("Reading requests from stdin");
            Box::new(BufReader::new(std::io::stdin()))
        }
    };

    let mut submitted = 0u64;
    let mut malformed = 0u64;

    for line in reader.lines() {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping request intake");
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RequestRecord>(&line) {
            Ok(record) => {
                pipeline.submit(record.into_buffer())?;
                submitted += 1;
            }
            Err(e) => {
                malformed += 1;
                warn!("Skipping malformed request record: {}", e);
            }
        }
    }

    info!("Request intake finished, draining pipeline...");
    let stats = pipeline.stats_handle();
    pipeline.stop();

    info!(
        "Final stats: submitted={}, malformed={}, processed={}, alerts={}, sessions={}",
        submitted,
        malformed,
        stats.requests(),
        stats.alerts(),
        tracker.len()
    );

    match Arc::try_unwrap(sink) {
        Ok(sink) => {
            let dropped = sink.dropped();
            if dropped > 0 {
                warn!("Alert queue overflowed, {} alerts dropped", dropped);
            }
            sink.finish();
        }
        Err(_) => warn!("Alert sink still shared at shutdown, output may be truncated"),
    }

    Ok(())
}
