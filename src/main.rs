use anyhow::{Context, Result};
use amj_bridge::{JackBridge, cli::Cli, graph::GraphNotification};
use crossbeam_channel::Sender;
use env_logger::Env;
use std::{process, thread};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse_known();
    let aliases = match cli.load_aliases() {
        Ok(aliases) => aliases,
        Err(e) => {
            log::error!("{e}");
            process::exit(1);
        }
    };
    let config = cli.config();

    let (mut bridge, shutdown) = match JackBridge::start(&config, aliases) {
        Ok(started) => started,
        Err(e) => {
            log::error!("cannot start JACK client {:?}: {e}", config.client_name);
            process::exit(1);
        }
    };
    log::info!("🖖 Bridging MIDI devices as {}", config.client_name);

    watch_signals(shutdown)?;
    bridge.run()?;
    Ok(())
}

/// Posts a shutdown into the control loop on SIGINT or SIGTERM.
fn watch_signals(shutdown: Sender<GraphNotification>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("signal runtime")?;

    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            rt.block_on(async {
                let reason = match wait_for_signal().await {
                    Ok(reason) => reason,
                    Err(e) => {
                        log::error!("signal handler: {e:#}");
                        return;
                    }
                };
                log::info!("{reason} received");
                let _ = shutdown.send(GraphNotification::Shutdown(reason.to_owned()));
            })
        })
        .context("spawn signal thread")?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT").context("install SIGINT handler"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await.context("install Ctrl-C handler")?;
    Ok("Ctrl-C")
}
