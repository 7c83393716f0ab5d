use skillsmith_core::{Ack, Config, ControlMessage, ControlResponse, Paths, TabId};
use skillsmith_recorder::{list_tabs, EventPump, Recorder, StartOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// List open page targets of the configured browser.
pub async fn tabs() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let tabs = list_tabs(&config.recorder.cdp_endpoint)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!();
    if tabs.is_empty() {
        println!("(No open tabs)");
    } else {
        println!("🌐 Open tabs ({})", tabs.len());
        for tab in &tabs {
            println!("  {}  {}", tab.id, tab.title);
            println!("      {}", tab.url);
        }
    }
    println!();
    Ok(())
}

/// Connect to the browser and wire a recorder to its event stream.
async fn start_recorder(paths: &Paths) -> anyhow::Result<(Arc<Recorder>, tokio::task::JoinHandle<()>)> {
    let config = Config::load_or_default(paths)?;
    let store = super::open_store(paths)?;

    let debugger = skillsmith_recorder::connect(&config.recorder.cdp_endpoint).await?;
    let recorder = Arc::new(Recorder::new(
        debugger.clone(),
        store,
        config.recorder.protocol_version.clone(),
    ));

    let pump = EventPump::new(recorder.clone(), debugger);
    let events = pump.subscribe().await;
    let handle = tokio::spawn(pump.run(events));

    info!(endpoint = %config.recorder.cdp_endpoint, "Connected to browser");
    Ok((recorder, handle))
}

/// Record a single tab in the foreground.
pub async fn record(tab: &str, description: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    let (recorder, mut pump) = start_recorder(&paths).await?;
    let tab = TabId::from(tab);

    let session_id = match recorder.start(&tab, description).await? {
        StartOutcome::Started { session_id } => session_id,
        StartOutcome::AlreadyRecording { .. } => anyhow::bail!("Tab {} is already recording", tab),
    };

    println!();
    println!("🔴 Recording tab {}", tab);
    println!("  Session: {}", session_id);
    println!("  Press Ctrl-C to stop.");
    println!();

    let mut notifications = recorder.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                break;
            }
            _ = &mut pump => {
                warn!("Browser connection closed");
                break;
            }
            note = notifications.recv() => match note {
                Ok(skillsmith_core::Notification::RecordAdded { count, .. }) => {
                    println!("  + record #{}", count);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Missed record notifications");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                if !recorder.is_recording(&tab) {
                    println!("  Debugger detached from tab.");
                    break;
                }
            }
        }
    }

    recorder.stop_all().await;

    println!();
    println!("⏹  Stopped. Session {} saved.", session_id);
    println!();
    Ok(())
}

/// JSON-lines control bus: one `ControlMessage` per stdin line, one response
/// per stdout line, plus `RECORD_ADDED` notifications.
pub async fn serve() -> anyhow::Result<()> {
    let paths = Paths::new();
    let (recorder, pump) = start_recorder(&paths).await?;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    let mut notifications = recorder.subscribe();
    let note_tx = out_tx.clone();
    let notifier = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(note) => {
                    if let Ok(line) = serde_json::to_string(&note) {
                        if note_tx.send(line).is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Notification observer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    info!("Control bus ready on stdin/stdout");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<ControlMessage>(&line) {
                    Ok(msg) => recorder.handle_message(msg).await,
                    Err(e) => ControlResponse::Ack(Ack::failed(format!("Invalid message: {}", e))),
                };
                out_tx.send(serde_json::to_string(&response)?)?;
            }
            _ = &mut ctrl_c => break,
        }
    }

    recorder.stop_all().await;
    notifier.abort();
    pump.abort();
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}
