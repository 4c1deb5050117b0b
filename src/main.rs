use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use rssguard_updater::config::{Config, ExtractorKind};
use rssguard_updater::fsops::StdFileSystem;
use rssguard_updater::progress::{ConsoleSink, TeeSink, TranscriptSink};
use rssguard_updater::prompt::wait_for_keypress;
use rssguard_updater::update::extract::{ArchiveExtractor, BuiltinExtractor, ExternalExtractor};
use rssguard_updater::update::instance::{LocalSocketChannel, PollingWaiter};
use rssguard_updater::update::launch::DetachedLauncher;
use rssguard_updater::{Services, Updater};

#[derive(Parser, Debug)]
#[command(name = "rssguard-updater", version)]
#[command(about = "Replace an RSS Guard installation with a downloaded update", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Exit without waiting for a keypress
    #[arg(long)]
    no_wait: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Also append the progress log to this file
    #[arg(long, value_name = "PATH")]
    transcript: Option<PathBuf>,

    /// Print debug diagnostics to stderr
    #[arg(short, long)]
    verbose: bool,

    /// <current_version> <next_version> <target_executable> <update_archive>
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    arguments: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<u8> {
    let config = Config::load(cli.config.as_deref())?;
    let interactive = std::io::stdout().is_terminal();

    let mut sink = TeeSink::new().with(ConsoleSink::new(!cli.no_color && interactive));
    if let Some(path) = cli.transcript.as_ref().or(config.transcript.as_ref()) {
        sink = sink.with(TranscriptSink::open(path)?);
    }

    let channel = match &config.instance_socket {
        Some(path) => LocalSocketChannel::at(path.clone()),
        None => LocalSocketChannel::new(&config.instance_id),
    };
    let waiter = PollingWaiter::new(interactive);
    let extractor: Box<dyn ArchiveExtractor> = match config.extractor_kind {
        ExtractorKind::External => {
            Box::new(ExternalExtractor::new(config.extractor.clone(), interactive))
        }
        ExtractorKind::Builtin => Box::new(BuiltinExtractor),
    };

    let services = Services {
        fs: &StdFileSystem,
        channel: &channel,
        waiter: &waiter,
        extractor: extractor.as_ref(),
        launcher: &DetachedLauncher,
    };

    let mut raw = Vec::with_capacity(cli.arguments.len() + 1);
    raw.push(updater_path());
    raw.extend(cli.arguments);

    let mut updater = Updater::new(&config, services, sink);
    let state = updater.start_upgrade(&raw);

    if !cli.no_wait {
        if let Err(e) = wait_for_keypress() {
            tracing::warn!(error = %e, "could not wait for keypress");
        }
    }

    Ok(state.exit_code() as u8)
}

/// Path of this executable, falling back to how it was invoked.
fn updater_path() -> String {
    std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| std::env::args().next().unwrap_or_default())
}
