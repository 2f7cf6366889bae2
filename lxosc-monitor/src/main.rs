use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crossbeam_channel::Receiver;
use lxosc_core::{OscConfig, OscEngine, OscMessage, StateChange};

mod value;

#[derive(Parser, Debug)]
#[command(name = "lxosc-monitor")]
#[command(author, version, about = "Watch or send OSC traffic")]
struct Args {
    /// JSON config file. Defaults to <config dir>/lxosc/osc.json when it exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the effective configuration (file plus flags) back to the config file.
    #[arg(long, global = true)]
    save_config: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bind the receive port and log every inbound message until Ctrl-C.
    Listen {
        #[arg(long)]
        host: Option<String>,

        #[arg(long, short)]
        port: Option<u16>,

        /// Only log messages at or below this address.
        #[arg(long)]
        prefix: Option<String>,

        /// Dispatch interval in milliseconds.
        #[arg(long, default_value_t = 10)]
        tick_ms: u64,
    },
    /// Send one message, e.g. `send /lx/tempo/bpm f:120`.
    Send {
        address: String,

        /// Arguments written as i:1 h:2 f:2.5 d:0.1 s:text S:sym c:x b:0aff r:ff0000ff T F N I
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long, short)]
        port: Option<u16>,
    },
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("lxosc=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub).context("Failed to set global subscriber")
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lxosc").join("osc.json"))
}

/// The config to start from, and where `--save-config` would write it.
fn load_config(explicit: Option<&Path>) -> Result<(OscConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let config = OscConfig::load(path)
            .with_context(|| format!("Could not load config {}", path.display()))?;
        return Ok((config, Some(path.to_path_buf())));
    }
    match default_config_path() {
        Some(path) if path.exists() => {
            let config = OscConfig::load(&path)
                .with_context(|| format!("Could not load config {}", path.display()))?;
            info!("Loaded OSC config from {}", path.display());
            Ok((config, Some(path)))
        }
        other => Ok((OscConfig::default(), other)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();
    let (mut config, config_path) = load_config(args.config.as_deref())?;

    match &args.command {
        Command::Listen { host, port, .. } => {
            config.receive_active = true;
            config.transmit_active = false;
            if let Some(host) = host {
                config.receive_host = host.clone();
            }
            if let Some(port) = port {
                config.receive_port = *port;
            }
        }
        Command::Send { host, port, .. } => {
            config.receive_active = false;
            config.transmit_active = true;
            if let Some(host) = host {
                config.transmit_host = host.clone();
            }
            if let Some(port) = port {
                config.transmit_port = *port;
            }
        }
    }
    config.validate()?;

    if args.save_config {
        let Some(path) = &config_path else {
            bail!("No config path: pass --config or set up a config directory");
        };
        config.save(path)?;
        info!("Saved OSC config to {}", path.display());
    }

    match args.command {
        Command::Listen {
            prefix, tick_ms, ..
        } => run_listen(config, prefix, Duration::from_millis(tick_ms.max(1))).await,
        Command::Send { address, args, .. } => run_send(config, address, &args),
    }
}

async fn run_listen(config: OscConfig, prefix: Option<String>, tick: Duration) -> Result<()> {
    let mut engine = OscEngine::new(config);
    let states = engine.subscribe_state();
    engine.start().context("Could not start OSC receiver")?;
    log_states(&states)?;
    let state = engine.receive_state();
    if !state.is_bound() {
        bail!(
            "OSC receiver is {state} for {}:{}",
            engine.config().receive_host,
            engine.config().receive_port
        );
    }

    engine.add_listener_fn(move |message| {
        if prefix.as_deref().is_none_or(|p| message.has_prefix(p)) {
            match message.source() {
                Some(from) => info!("{from} {message}"),
                None => info!("{message}"),
            }
        }
        Ok(())
    });

    let mut ticker = time::interval(tick);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.dispatch();
                log_states(&states)?;
            }
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!("Ctrl-C handler failed: {e}");
                }
                break;
            }
        }
    }

    info!("Shutting down OSC monitor");
    engine.shutdown();
    Ok(())
}

/// One JSON line per state change, so the output can be filtered by tools.
fn log_states(states: &Receiver<StateChange>) -> Result<()> {
    for change in states.try_iter() {
        let line = serde_json::to_string(&change)?;
        if change.state.is_error() {
            warn!("OSC state {line}");
        } else {
            info!("OSC state {line}");
        }
    }
    Ok(())
}

fn run_send(config: OscConfig, address: String, raw_args: &[String]) -> Result<()> {
    let arguments = raw_args
        .iter()
        .map(|raw| value::parse_argument(raw))
        .collect::<Result<Vec<_>>>()?;
    let message = OscMessage::with_arguments(address, arguments);

    let mut engine = OscEngine::new(config);
    engine.start().context("Could not open OSC transmitter")?;
    let state = engine.transmit_state();
    if !state.is_bound() {
        bail!(
            "OSC transmitter is {state} for {}:{}",
            engine.config().transmit_host,
            engine.config().transmit_port
        );
    }

    let size = engine.send(&message)?;
    info!(
        "Sent {size} bytes to {}:{}: {message}",
        engine.config().transmit_host,
        engine.config().transmit_port
    );
    engine.shutdown();
    Ok(())
}
