use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bdj_bridge::config::RuntimeBackend;
use bdj_bridge::{BridgeConfig, DiscIdentity, EventCode, Host, Session, locator, resources};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "bdj", about = "BD-J runtime bridge: locate the JVM, inspect discs, play titles")]
struct Cli {
    /// Config file (defaults to ~/.config/bdj/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-process stub runtime instead of a real JVM
    #[arg(long, global = true)]
    stub: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show where the runtime library and boot archive would be loaded from
    Locate {
        #[arg(long)]
        json: bool,
    },
    /// Print the organization and disc id from CERTIFICATE/id.bdmv
    DiscId { disc_root: PathBuf },
    /// Open a session, start a title, relay events, then shut down
    Play {
        disc_root: PathBuf,
        #[arg(long, default_value_t = 0)]
        title: u32,
        /// Event to relay after the title starts, as CODE:PARAM (e.g. CHAPTER:2)
        #[arg(long = "event", value_parser = parse_event)]
        events: Vec<EventArg>,
    },
}

#[derive(Serialize)]
struct LocateReport {
    candidates: Vec<String>,
    loaded: Option<String>,
    error: Option<String>,
    boot_archive: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EventArg {
    event: EventCode,
    param: u32,
}

fn parse_event(s: &str) -> Result<EventArg, String> {
    let (code, param) = s
        .split_once(':')
        .ok_or_else(|| format!("expected CODE:PARAM, got {s:?}"))?;
    let event = EventCode::parse(code).ok_or_else(|| format!("unknown event {code:?}"))?;
    let param = param
        .parse::<u32>()
        .map_err(|e| format!("bad event parameter {param:?}: {e}"))?;
    Ok(EventArg { event, param })
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for reports.
    fmt()
        .with_env_filter(EnvFilter::from_env("BDJ_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = BridgeConfig::load(cli.config.as_deref()).context("loading config")?;
    if cli.stub {
        config.runtime.backend = RuntimeBackend::Stub;
    }
    tracing::debug!(backend = ?config.runtime.backend, "Configuration loaded");

    match cli.command {
        Command::Locate { json } => locate(&config, json),
        Command::DiscId { disc_root } => disc_id(&disc_root),
        Command::Play {
            disc_root,
            title,
            events,
        } => play(&config, &disc_root, title, &events),
    }
}

fn locate(config: &BridgeConfig, json: bool) -> Result<()> {
    let candidates = locator::library_candidates(&config.runtime);
    let loader = config.build_loader();
    let (loaded, error) = match locator::load_runtime_library(&config.runtime, loader.as_ref()) {
        Ok(library) => (Some(library.origin().to_string()), None),
        Err(e) => (None, Some(e.to_string())),
    };

    let report = LocateReport {
        candidates: candidates.iter().map(ToString::to_string).collect(),
        loaded,
        error,
        boot_archive: resources::find_boot_archive(&config.boot),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Runtime library candidates:");
    for candidate in &report.candidates {
        println!("  {candidate}");
    }
    match (&report.loaded, &report.error) {
        (Some(loaded), _) => println!("Loaded: {loaded}"),
        (None, Some(error)) => println!("Not loadable: {error}"),
        (None, None) => {}
    }
    println!("Boot archive: {}", report.boot_archive.display());
    Ok(())
}

fn disc_id(disc_root: &std::path::Path) -> Result<()> {
    match DiscIdentity::read(disc_root) {
        Ok(identity) => {
            println!("Organization ID: {}", identity.org_id);
            println!("Disc ID:         {}", identity.disc_id);
        }
        Err(e) => {
            let path = DiscIdentity::path_for(disc_root);
            tracing::warn!(path = %path.display(), "No disc identity: {e}");
            println!("Disc ID:         {}", DiscIdentity::ZERO_DISC_ID);
        }
    }
    Ok(())
}

fn play(
    config: &BridgeConfig,
    disc_root: &std::path::Path,
    title: u32,
    events: &[EventArg],
) -> Result<()> {
    if !disc_root.is_dir() && config.runtime.backend == RuntimeBackend::Jni {
        bail!("disc root {} is not a directory", disc_root.display());
    }

    let session = Session::open(disc_root, Host::detached(), config).context("opening session")?;
    tracing::info!(handle = session.handle(), "Session open");

    let started = session.start(title);
    if let Err(e) = &started {
        tracing::warn!(title, "Title did not start: {e}");
    }

    for arg in events {
        session.process_event(arg.event, arg.param);
    }

    if started.is_ok() {
        if let Err(e) = session.stop() {
            tracing::warn!("Title did not stop: {e}");
        }
    }
    session.close();

    started.with_context(|| format!("starting title {title}"))
}
