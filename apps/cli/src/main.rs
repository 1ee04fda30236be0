use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use brom_core::capture::CaptureSink;
use brom_core::session::{BromSession, CaptureMode, SessionConfig, SessionMode, SessionOutcome};
use clap::{ArgGroup, Parser};
use tracing::{error, info};

/// Replay vendor flashing tool traffic to run download agents that execute
/// arbitrary code. Works only with devices booted into BROM mode.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").args(["identify", "payload", "simple_payload"])))]
#[command(group(
    ArgGroup::new("source")
        .args(["identify", "payload", "simple_payload", "config"])
        .multiple(true)
        .required(true)
))]
struct Args {
    /// Identify mode: print hardware info and exit
    #[arg(short = 'i', long)]
    identify: bool,

    /// Payload mode: replay the bring-up for the device, then push PAYLOAD and jump to it
    #[arg(short = 'p', long, value_name = "PAYLOAD")]
    payload: Option<PathBuf>,

    /// Simple payload mode: just disable the watchdog, then push PAYLOAD and jump to it
    #[arg(short = 's', long, value_name = "PAYLOAD")]
    simple_payload: Option<PathBuf>,

    /// First-stage DA for two-stage families (MT6252)
    #[arg(long, value_name = "FILE")]
    bootstrap: Option<PathBuf>,

    /// Skip receiving remaining data after the jump. Useful for standalone
    /// payloads, breaks piggyback ones.
    #[arg(long)]
    skip_remaining_data: bool,

    /// Wait for >Mtk and <Mtk magics and save records to dump-N.bin
    #[arg(long, conflicts_with = "greedy")]
    receive: bool,

    /// Receive and print all data after the jump, 4 bytes at a time
    #[arg(long)]
    greedy: bool,

    /// Directory for dump files
    #[arg(long, value_name = "DIR")]
    dump_dir: Option<PathBuf>,

    /// Session configuration (TOML); flags override it. Stands in for
    /// -i/-p/-s when it sets the mode.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// -v prints every BROM command, -vv also every read/write
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn into_config(self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load_from_file(path)
                .with_context(|| format!("Cannot load config {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if self.identify {
            config.mode = SessionMode::Identify;
        }
        if let Some(path) = self.payload {
            config.mode = SessionMode::Replay;
            config.payload_path = Some(path);
        }
        if let Some(path) = self.simple_payload {
            config.mode = SessionMode::SimpleReplay;
            config.payload_path = Some(path);
        }
        if let Some(path) = self.bootstrap {
            config.bootstrap_path = Some(path);
        }
        if self.skip_remaining_data {
            config.skip_remaining_data = true;
        }
        if self.receive {
            config.capture = CaptureMode::Receive;
        }
        if self.greedy {
            config.capture = CaptureMode::Greedy;
        }
        if let Some(dir) = self.dump_dir {
            config.capture_dir = dir;
        }
        Ok(config)
    }
}

/// Writes each captured record to `dump-<index>.bin`.
struct FileSink {
    dir: PathBuf,
}

impl CaptureSink for FileSink {
    fn record(&mut self, index: usize, data: &[u8]) -> Result<()> {
        let path = self.dir.join(format!("dump-{}.bin", index));
        std::fs::write(&path, data).with_context(|| format!("Cannot write {}", path.display()))?;
        info!("Saved to {}", path.display());
        Ok(())
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn run(args: Args) -> Result<()> {
    let config = args.into_config()?;
    let mut sink = FileSink {
        dir: config.capture_dir.clone(),
    };
    let mut session = BromSession::new(config);

    let stop = session.stop_flag();
    ctrlc::set_handler(move || {
        info!("Interrupted, stopping");
        stop.store(true, Ordering::SeqCst);
    })
    .context("Cannot install Ctrl+C handler")?;

    match session.run(&mut sink)? {
        SessionOutcome::Identified(identity) => info!("Identified: {}", identity),
        SessionOutcome::Replayed { platform, captured } => {
            info!(%platform, captured, "Payload is running")
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }

    info!("Starting brom-replay (nusb backend)...");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
