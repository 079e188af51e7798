use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use log::{error, info, warn};
use std::io::{BufRead, BufReader};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::thread;

use crate::daemon::ingest::DaemonEvent;
use whowas_core::classify::GatewayEvent;

/// Accepts connector sessions on a Unix socket. Each line a client writes is
/// one JSON-encoded [`GatewayEvent`]; malformed lines are discarded with a
/// warning so a buggy connector cannot wedge the intake.
pub struct IngestServer {
    socket_path: PathBuf,
}

impl IngestServer {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    pub fn start(&self, events: Sender<DaemonEvent>) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind ingest socket: {:?}", self.socket_path))?;
        info!("ingest socket listening on {:?}", self.socket_path);

        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let events = events.clone();
                        thread::spawn(move || handle_connection(stream, events));
                    }
                    Err(e) => {
                        error!("error accepting ingest connection: {e}");
                    }
                }
            }
        });

        Ok(())
    }
}

fn handle_connection(stream: UnixStream, events: Sender<DaemonEvent>) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("ingest read error, dropping connection: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<GatewayEvent>(&line) {
            Ok(event) => {
                if events.send(DaemonEvent::Gateway(event)).is_err() {
                    // Ingest loop is gone; the daemon is shutting down.
                    break;
                }
            }
            Err(e) => warn!("discarding malformed gateway event: {e}"),
        }
    }
}

impl Drop for IngestServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}
