//! Upload reconciler
//!
//! Periodically sweeps the local store for rows the central database never
//! confirmed and replays them in one transaction per container. A row is
//! only marked confirmed after its batch insert succeeds, so a crash
//! between insert and mark leaves the row pending and it is replayed next
//! cycle; duplicate replays are acceptable, silent loss is not.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::store::RecordStore;
use crate::uplink::RecordWriter;

/// Run the reconciler forever. The first sweep happens immediately so
/// records cached during an outage are replayed as soon as the station
/// restarts.
pub async fn run(store: Arc<RecordStore>, writer: Arc<dyn RecordWriter>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match cycle(&store, writer.as_ref()).await {
            Ok(0) => debug!("reconcile: nothing pending"),
            Ok(n) => info!("reconcile: {} record(s) confirmed", n),
            Err(e) => warn!("reconcile sweep failed: {}", e),
        }
    }
}

/// One sweep over every container. Returns how many rows were confirmed.
/// A container whose batch insert fails is left untouched for the next
/// cycle; other containers still get their turn.
pub async fn cycle(
    store: &RecordStore,
    writer: &dyn RecordWriter,
) -> packline_common::Result<usize> {
    let mut confirmed = 0usize;
    for container in store.containers()? {
        let pending = match store.pending_rows(&container) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(container = %container.display(), "unreadable container skipped: {}", e);
                continue;
            }
        };
        if pending.is_empty() {
            continue;
        }

        let records: Vec<_> = pending.iter().map(|row| row.record.clone()).collect();
        match writer.write_batch(&records).await {
            Ok(()) => {
                let indices: Vec<_> = pending.iter().map(|row| row.index).collect();
                // a failed rewrite leaves the rows pending for the next
                // cycle; the rest of the sweep still runs
                if let Err(e) = store.mark_confirmed(&container, &indices) {
                    warn!(
                        container = %container.display(),
                        "confirm rewrite failed, rows stay pending: {}",
                        e
                    );
                    continue;
                }
                debug!(
                    container = %container.display(),
                    count = indices.len(),
                    "pending rows confirmed"
                );
                confirmed += indices.len();
            }
            Err(e) => {
                warn!(
                    container = %container.display(),
                    count = pending.len(),
                    "batch replay failed, will retry: {}",
                    e
                );
            }
        }
    }
    Ok(confirmed)
}
