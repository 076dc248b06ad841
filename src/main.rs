//! procpulse - streaming /proc/stat sampler binary
//!
//! Prints CPU utilization deltas at a fixed interval until interrupted.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use procpulse::{
    Delta, DeliveryPolicy, SamplerConfig, SamplingTicker, Snapshot, SnapshotBuilder,
    DEFAULT_INTERVAL_MS, PROC_STAT_PATH,
};
use std::path::PathBuf;
use tracing::{error, info, warn, Level, Subscriber};
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "procpulse")]
#[command(about = "Streaming /proc/stat CPU utilization sampler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Samples /proc/stat on an interval and prints per-CPU utilization deltas")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Stat file to sample
    #[arg(long, default_value = PROC_STAT_PATH)]
    path: PathBuf,

    /// Sampling interval in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_MS)]
    interval: u64,

    /// JSON config file; command-line flags are ignored when set
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Pretty)]
    format: Format,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream deltas until interrupted (default)
    Watch(WatchArgs),

    /// Print a single raw snapshot and exit
    Snapshot,
}

#[derive(Args, Default)]
struct WatchArgs {
    /// Stop after this many deltas
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// What to do when the output falls behind
    #[arg(long, value_enum, default_value_t = Policy::Block)]
    policy: Policy,

    /// Queue size for bounded and dropping policies
    #[arg(long, default_value_t = 8)]
    capacity: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum Policy {
    #[default]
    Block,
    Bounded,
    DropNewest,
    DropOldest,
}

impl Policy {
    fn delivery(self, capacity: usize) -> DeliveryPolicy {
        match self {
            Self::Block => DeliveryPolicy::Block,
            Self::Bounded => DeliveryPolicy::Bounded { capacity },
            Self::DropNewest => DeliveryPolicy::DropNewest { capacity },
            Self::DropOldest => DeliveryPolicy::DropOldest { capacity },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Watch(args)) => watch_command(&cli, args).await,
        Some(Commands::Snapshot) => snapshot_command(&cli),
        None => watch_command(&cli, &WatchArgs::default()).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    tracing::subscriber::set_global_default(log_subscriber(cli))?;
    Ok(())
}

fn log_level(cli: &Cli) -> Level {
    if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    }
}

/// The flag level is the default; `RUST_LOG` directives refine it.
fn log_subscriber(cli: &Cli) -> impl Subscriber + Send + Sync + 'static {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level(cli)).into())
        .from_env_lossy();

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish()
}

fn sampler_config(cli: &Cli, args: &WatchArgs) -> anyhow::Result<SamplerConfig> {
    if let Some(path) = &cli.config {
        info!("Loading configuration from {}", path.display());
        return Ok(SamplerConfig::from_json_file(path)?);
    }

    // One extra tick for the baseline.
    let max_ticks = args.count.map(|count| count + 1);
    Ok(SamplerConfig::new(&cli.path, cli.interval)
        .with_delivery(args.policy.delivery(args.capacity))
        .with_max_ticks(max_ticks))
}

async fn watch_command(cli: &Cli, args: &WatchArgs) -> anyhow::Result<()> {
    let config = sampler_config(cli, args)?;
    let mut ticker = SamplingTicker::from_config(config)
        .with_context(|| format!("cannot sample {}", cli.path.display()))?;
    ticker.start()?;

    let errors = ticker.take_errors().map(|mut errors| {
        tokio::spawn(async move {
            while let Some(err) = errors.recv().await {
                if err.is_terminal() {
                    error!("Sampling stopped: {}", err);
                } else {
                    warn!("Sample skipped: {}", err);
                }
            }
        })
    });

    let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        let delta = tokio::select! {
            delta = ticker.next_delta() => delta,
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                None
            }
        };
        match delta {
            Some(delta) => print_delta(&delta, cli.format)?,
            None => break,
        }
    }

    ticker.stop();
    ticker.close().await?;
    if let Some(errors) = errors {
        errors.await?;
    }
    Ok(())
}

fn snapshot_command(cli: &Cli) -> anyhow::Result<()> {
    let path = match &cli.config {
        Some(config) => SamplerConfig::from_json_file(config)?.source_path,
        None => cli.path.clone(),
    };
    let mut builder = SnapshotBuilder::open(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let snapshot = builder.build()?;

    match cli.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        Format::Pretty => print_pretty_snapshot(&snapshot),
    }
    Ok(())
}

fn format_timestamp(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .unwrap_or_default()
        .format("%Y-%m-%d %H:%M:%S%.3f UTC")
        .to_string()
}

fn print_delta(delta: &Delta, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(delta)?),
        Format::Pretty => {
            println!(
                "{}  cpu {:5.1}%  ctxt {:>8}  forks {:>5}  running {:>3}  blocked {:>3}",
                format_timestamp(delta.taken_at),
                delta.aggregate.usage_percent,
                delta.context_switches,
                delta.processes_created,
                delta.procs_running,
                delta.procs_blocked
            );
            for unit in &delta.units {
                println!(
                    "  {:<6} {:5.1}%  (usr {:4.1}  sys {:4.1}  iow {:4.1}  idle {:5.1})",
                    unit.name,
                    unit.usage_percent,
                    unit.user * 100.0,
                    unit.system * 100.0,
                    unit.iowait * 100.0,
                    unit.idle * 100.0
                );
            }
        }
    }
    Ok(())
}

fn print_pretty_snapshot(snapshot: &Snapshot) {
    println!("Snapshot ({})", format_timestamp(snapshot.taken_at));
    println!("==========================================");
    println!();

    println!("System:");
    println!(
        "  Boot time: {}",
        format_timestamp(snapshot.global.boot_time.saturating_mul(1000))
    );
    println!("  Context switches: {}", snapshot.global.context_switches);
    println!("  Processes created: {}", snapshot.global.processes);
    println!(
        "  Running / blocked: {} / {}",
        snapshot.global.procs_running, snapshot.global.procs_blocked
    );
    println!();

    println!("CPU ticks:");
    for row in std::iter::once(&snapshot.aggregate).chain(&snapshot.units) {
        println!(
            "  {:<6} user {:>10}  system {:>10}  idle {:>12}  iowait {:>8}",
            row.name, row.user, row.system, row.idle, row.iowait
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["procpulse", "--interval", "250", "watch", "-n", "3"]).unwrap();
        assert_eq!(cli.interval, 250);
        match cli.command {
            Some(Commands::Watch(args)) => assert_eq!(args.count, Some(3)),
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["procpulse"]).unwrap();
        assert_eq!(cli.interval, DEFAULT_INTERVAL_MS);
        assert_eq!(cli.path, PathBuf::from(PROC_STAT_PATH));
        assert!(cli.format == Format::Pretty);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_watch_config() {
        let cli = Cli::try_parse_from([
            "procpulse",
            "--path",
            "/tmp/stat",
            "watch",
            "--policy",
            "drop-oldest",
            "--capacity",
            "4",
            "-n",
            "2",
        ])
        .unwrap();
        let Some(Commands::Watch(args)) = &cli.command else {
            panic!("expected watch");
        };
        let config = sampler_config(&cli, args).unwrap();
        assert_eq!(config.source_path, PathBuf::from("/tmp/stat"));
        assert_eq!(config.delivery, DeliveryPolicy::DropOldest { capacity: 4 });
        assert_eq!(config.max_ticks, Some(3));
    }

    fn enabled_levels(cli: &Cli) -> [bool; 3] {
        tracing::subscriber::with_default(log_subscriber(cli), || {
            [
                tracing::enabled!(Level::DEBUG),
                tracing::enabled!(Level::INFO),
                tracing::enabled!(Level::WARN),
            ]
        })
    }

    #[test]
    fn test_log_flags_raise_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let debug = Cli::try_parse_from(["procpulse", "--debug"]).unwrap();
        assert_eq!(enabled_levels(&debug), [true, true, true]);

        let verbose = Cli::try_parse_from(["procpulse", "--verbose"]).unwrap();
        assert_eq!(enabled_levels(&verbose), [false, true, true]);

        let quiet = Cli::try_parse_from(["procpulse"]).unwrap();
        assert_eq!(enabled_levels(&quiet), [false, false, true]);
    }

    #[test]
    fn test_timestamp_out_of_range() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00.000 UTC");
        assert_eq!(format_timestamp(1_500), "1970-01-01 00:00:01.500 UTC");
        assert_eq!(format_timestamp(u64::MAX), format_timestamp(0));

        let mut snapshot = Snapshot::default();
        snapshot.global.boot_time = u64::MAX;
        print_pretty_snapshot(&snapshot);
    }
}
