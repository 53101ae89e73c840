//! rotelctl - control a Rotel network amplifier from the command line

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rotel_client::{AmplifierHandle, DeviceConfig, DeviceEvent, DeviceSnapshot};
use rotel_protocol::{FrameMode, PowerState, SourceMap, DEFAULT_PORT};
use rotel_sim::{VirtualAmpCommand, VirtualAmplifier};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod settings;

use crate::settings::Settings;

/// Control a Rotel network amplifier over its TCP protocol
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Amplifier hostname or IP address
    #[arg(long, env = "ROTEL_HOST", global = true)]
    host: Option<String>,

    /// Amplifier control port
    #[arg(long, env = "ROTEL_PORT", global = true)]
    port: Option<u16>,

    /// Display name
    #[arg(long, global = true)]
    name: Option<String>,

    /// Use the legacy frame splitter
    #[arg(long, global = true)]
    legacy_framing: bool,

    /// Settings file (defaults to the XDG config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the effective amplifier settings back to the settings file
    #[arg(long, global = true)]
    save: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the amplifier state as JSON
    Status,
    /// Power on
    On,
    /// Power off (standby)
    Off,
    /// Set absolute volume, in percent
    Volume {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },
    /// One volume step up
    Up,
    /// One volume step down
    Down,
    /// Mute or unmute
    Mute {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Select an input by display label
    Source { label: String },
    /// List input labels
    Sources,
    /// Print traffic and state changes until the connection ends
    Monitor,
    /// Run a virtual amplifier on a local port
    Simulate {
        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Model name the virtual amplifier reports
        #[arg(long, default_value = "A14")]
        model: String,
        /// Sample rate the virtual amplifier reports for `freq?`
        #[arg(long, default_value = "off")]
        freq: String,
        /// Split every reply into pieces of this many bytes
        #[arg(long)]
        chunk_size: Option<usize>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rotelctl=info,rotel_protocol=info,rotel_client=info,rotel_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let settings_path = args.config.clone().or_else(Settings::default_path);
    let mut settings = match &settings_path {
        Some(path) => Settings::load_from(path)?,
        None => Settings::default(),
    };

    if let Cmd::Simulate {
        port,
        bind,
        model,
        freq,
        chunk_size,
    } = &args.command
    {
        return simulate(bind, *port, model, freq, *chunk_size).await;
    }

    if let Cmd::Sources = args.command {
        let sources = match &settings.amplifier {
            Some(saved) => saved.source_map()?,
            None => SourceMap::rotel(),
        };
        for label in sources.labels() {
            println!("{}", label);
        }
        return Ok(());
    }

    let config = resolve_config(&args, settings.amplifier.as_ref())?;

    if args.save {
        let path = settings_path.context("Could not determine settings path")?;
        settings.amplifier = Some(config.clone());
        settings.save_to(&path)?;
        info!("Saved settings to {}", path.display());
    }

    let reply_timeout = Duration::from_millis(settings.reply_timeout_ms);
    let (amp, mut events) = AmplifierHandle::connect(&config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.addr()))?;

    if let Cmd::Monitor = args.command {
        return monitor(&amp, &mut events).await;
    }

    let initial = wait_for_state(&mut events, reply_timeout, handshake_complete)
        .await
        .context("Amplifier did not answer the handshake")?;

    let snapshot = match &args.command {
        Cmd::Status => initial,
        Cmd::On => {
            amp.turn_on();
            settle(&mut events, reply_timeout, initial, |s| {
                s.power == Some(PowerState::On)
            })
            .await
        }
        Cmd::Off => {
            amp.turn_off();
            settle(&mut events, reply_timeout, initial, |s| {
                s.power == Some(PowerState::Standby)
            })
            .await
        }
        Cmd::Volume { percent } => {
            let level = f32::from(*percent) / 100.0;
            amp.set_volume_level(level);
            settle(&mut events, reply_timeout, initial, |s| {
                s.volume_level == Some(level)
            })
            .await
        }
        Cmd::Up | Cmd::Down => {
            let before = initial.volume_level;
            if matches!(args.command, Cmd::Up) {
                amp.volume_up();
            } else {
                amp.volume_down();
            }
            settle(&mut events, reply_timeout, initial, |s| {
                s.volume_level != before
            })
            .await
        }
        Cmd::Mute { state } => {
            let muted = *state == Toggle::On;
            amp.mute(muted);
            settle(&mut events, reply_timeout, initial, |s| s.muted == Some(muted)).await
        }
        Cmd::Source { label } => {
            // Fail before sending anything
            config.source_map()?.code(label)?;
            amp.select_source(label.clone());
            settle(&mut events, reply_timeout, initial, |s| {
                s.source.as_deref() == Some(label.as_str())
            })
            .await
        }
        // Handled above
        Cmd::Sources | Cmd::Monitor | Cmd::Simulate { .. } => initial,
    };

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    amp.shutdown();
    Ok(())
}

/// Merge settings-file config with command-line overrides
fn resolve_config(args: &Args, saved: Option<&DeviceConfig>) -> Result<DeviceConfig> {
    let mut config = match (&args.host, saved) {
        (Some(host), Some(saved)) => DeviceConfig {
            host: host.clone(),
            ..saved.clone()
        },
        (Some(host), None) => DeviceConfig::new(host.clone()),
        (None, Some(saved)) => saved.clone(),
        (None, None) => bail!("No amplifier configured; pass --host or set ROTEL_HOST"),
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(name) = &args.name {
        config.display_name = name.clone();
    }
    if args.legacy_framing {
        config.frame_mode = FrameMode::Legacy;
    }

    debug!(?config, "Resolved amplifier config");
    Ok(config)
}

/// Every handshake reply has arrived; `model` goes first and `freq` last
fn handshake_complete(snapshot: &DeviceSnapshot) -> bool {
    snapshot.model.is_some() && snapshot.frequency.is_some()
}

/// Wait for a state notification matching `pred`
async fn wait_for_state<F>(
    events: &mut mpsc::Receiver<DeviceEvent>,
    timeout: Duration,
    mut pred: F,
) -> Result<DeviceSnapshot>
where
    F: FnMut(&DeviceSnapshot) -> bool,
{
    let wait = async {
        while let Some(event) = events.recv().await {
            match event {
                DeviceEvent::StateChanged(snapshot) if pred(&snapshot) => return Ok(snapshot),
                DeviceEvent::ConnectionLost { cause } => bail!("Connection lost: {}", cause),
                DeviceEvent::Error { message, .. } => bail!("{}", message),
                _ => {}
            }
        }
        bail!("Device actor stopped")
    };

    tokio::time::timeout(timeout, wait)
        .await
        .context("Timed out waiting for the amplifier")?
}

/// Wait for the expected change; fall back to the last known state
async fn settle<F>(
    events: &mut mpsc::Receiver<DeviceEvent>,
    timeout: Duration,
    fallback: DeviceSnapshot,
    pred: F,
) -> DeviceSnapshot
where
    F: FnMut(&DeviceSnapshot) -> bool,
{
    match wait_for_state(events, timeout, pred).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("{:#}", e);
            fallback
        }
    }
}

async fn monitor(amp: &AmplifierHandle, events: &mut mpsc::Receiver<DeviceEvent>) -> Result<()> {
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                amp.shutdown();
                return Ok(());
            }
        };

        let Some(event) = event else {
            return Ok(());
        };

        match event {
            DeviceEvent::Connected { addr } => println!("connected {}", addr),
            DeviceEvent::DataIn { data } => println!("<< {}", String::from_utf8_lossy(&data)),
            DeviceEvent::DataOut { data } => println!(">> {}", String::from_utf8_lossy(&data)),
            DeviceEvent::StateChanged(snapshot) => {
                println!("== {}", serde_json::to_string(&snapshot)?)
            }
            DeviceEvent::Error { source, message } => println!("!! {}: {}", source, message),
            DeviceEvent::ConnectionLost { cause } => {
                println!("connection lost: {}", cause);
                amp.shutdown();
                return Ok(());
            }
        }
    }
}

async fn simulate(
    bind: &str,
    port: u16,
    model: &str,
    freq: &str,
    chunk_size: Option<usize>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", bind, port))?;

    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (state_tx, mut state_rx) = broadcast::channel(64);
    let mut amp = VirtualAmplifier::new("simulator", model);
    amp.set_freq(freq);

    let server = tokio::spawn(rotel_sim::serve(listener, amp, cmd_rx, state_tx));

    if chunk_size.is_some() {
        cmd_tx.send(VirtualAmpCommand::SetChunkSize(chunk_size)).await?;
    }

    loop {
        tokio::select! {
            state = state_rx.recv() => match state {
                Ok(state) => println!("{}", serde_json::to_string(&state)?),
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("Skipped {} state events", n),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping simulator");
                let _ = cmd_tx.send(VirtualAmpCommand::Shutdown).await;
                break;
            }
        }
    }

    server.await.context("Simulator task panicked")??;
    Ok(())
}
