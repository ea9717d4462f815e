use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tailguard::config::Config;
use tailguard::control::CommandProcessManager;
use tailguard::status::{FileSink, LogSink, StatusSink};
use tailguard::Supervisor;

/// Command-line arguments for the log guard
#[derive(Parser)]
#[command(
    name = "tailguard",
    about = "Watch application error logs and stop, restart or revive the managed processes",
    long_about = "Tails a set of append-only JSON log files. When a line matches the configured \
                  error signature the owning process is stopped through the process manager \
                  (pm2 by default) and optionally restarted after a delay. Processes whose logs \
                  go quiet for too long can be restarted automatically."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "/etc/tailguard/config.toml",
        help = "Configuration file path (TOML format)"
    )]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate the configuration, list the targets and exit")]
    check: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if self.config.exists() && !self.config.is_file() {
            return Err(format!(
                "Configuration path is not a file: {}",
                self.config.display()
            ));
        }

        if let Some(extension) = self.config.extension() {
            if extension != "toml" {
                warn!(
                    "Configuration file does not have .toml extension: {}",
                    self.config.display()
                );
            }
        }

        Ok(())
    }
}

/// Load configuration; any problem here is fatal
fn load_config(path: &Path) -> anyhow::Result<Config> {
    info!("Loading configuration from: {}", path.display());
    Config::from_file(path)
        .with_context(|| format!("invalid configuration in {}", path.display()))
}

fn build_sink(config: &Config) -> anyhow::Result<Arc<dyn StatusSink>> {
    match config.status_log {
        Some(ref path) => {
            let sink = FileSink::open(path)
                .with_context(|| format!("cannot open status log {}", path.display()))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(LogSink)),
    }
}

fn print_targets(config: &Config) {
    for target in config.watch_targets() {
        println!(
            "{} ({}): {} restart_after_stop={} restart_on_inactivity={}",
            target.display_name,
            target.process_name,
            target.path.display(),
            target.restart_after_stop,
            target.restart_on_inactivity
        );
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;

    if cli.check {
        println!("Configuration OK: {} target(s)", config.targets.len());
        print_targets(&config);
        return Ok(());
    }

    let sink = build_sink(&config)?;
    let manager = Arc::new(CommandProcessManager::from_config(&config.process_manager));
    let mut supervisor = Supervisor::new(&config, manager, sink)?;

    let shutdown = supervisor.shutdown_signal();
    let handler_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Received termination signal, shutting down gracefully...");
        handler_signal.trigger();
    })
    .context("failed to install signal handler")?;

    supervisor
        .start()
        .context("failed to start worker threads")?;

    info!("tailguard is running. Press Ctrl+C to stop.");
    shutdown.wait();

    let summary = supervisor.stop();
    info!(
        "Shutdown complete: {} app(s) stopped, {} restart(s) pending",
        summary.stopped.len(),
        summary.pending.len()
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
