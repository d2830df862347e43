//! Periodic liveness poll
//!
//! The heartbeat runs as a tokio task that owns nothing but a transport
//! handle and a watch receiver. The controller publishes the selected write
//! characteristic on the watch channel while connected and clears it on
//! every reset; the task stops on the first tick that sees it cleared.

use std::sync::Arc;
use std::time::Duration;

use fanlight_protocol::build_poll;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::log::EventLog;
use crate::transport::{CharacteristicRef, Transport};

/// Handle to a running heartbeat task; aborts the task when dropped
#[derive(Debug)]
pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawn the heartbeat. The first poll goes out one `period` from now.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        gate: watch::Receiver<Option<CharacteristicRef>>,
        period: Duration,
        log: EventLog,
    ) -> Self {
        let handle = tokio::spawn(heartbeat_loop(transport, gate, period, log));
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn heartbeat_loop(
    transport: Arc<dyn Transport>,
    gate: watch::Receiver<Option<CharacteristicRef>>,
    period: Duration,
    log: EventLog,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let frame = build_poll();

    loop {
        ticker.tick().await;

        let characteristic = match &*gate.borrow() {
            Some(c) => c.clone(),
            None => {
                debug!("Heartbeat stopping: no write characteristic");
                return;
            }
        };

        let without_response = characteristic.props.write_without_response;
        match transport
            .write(&characteristic, frame.as_bytes(), without_response)
            .await
        {
            Ok(()) => trace!("Heartbeat poll sent"),
            Err(e) => {
                warn!("Heartbeat poll failed: {}", e);
                log.error(format!("heartbeat: {e}"));
            }
        }
    }
}
