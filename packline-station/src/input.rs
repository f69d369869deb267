//! Operator input surface
//!
//! Wedge scanners present as a keyboard: they type the code and press
//! Enter. The reader buffers one line at a time from stdin and forwards
//! each flushed buffer as one raw scan. Scanners that cannot emit a hyphen
//! can be configured with a substitute character that is mapped back to a
//! literal `-` here.

use packline_common::config::InputConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawn the stdin reader task feeding raw scans into `tx`.
pub fn spawn_reader(cfg: InputConfig, tx: mpsc::Sender<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("listening for scans on stdin");
        let mut reader = BufReader::new(tokio::io::stdin());
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("stdin closed");
                    break;
                }
                Ok(_) => {
                    let scan = flush_buffer(&line, cfg.hyphen_substitute);
                    if scan.is_empty() {
                        continue;
                    }
                    if tx.send(scan).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("stdin read error: {}", e);
                    break;
                }
            }
        }
    })
}

/// Turn one buffered line into a raw scan: drop control characters and map
/// the configured substitute character to a hyphen.
pub fn flush_buffer(line: &str, hyphen_substitute: Option<char>) -> String {
    line.chars()
        .filter(|c| !c.is_control())
        .map(|c| match hyphen_substitute {
            Some(sub) if c == sub => '-',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
