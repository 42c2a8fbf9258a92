//! Polling synchronizer
//!
//! Keeps the [`Mirror`] fresh with as little traffic as possible. Each cycle asks
//! the server for its state hash and only downloads the full snapshot when the
//! hash differs from the mirrored one. Cycles are chained: the next check is
//! scheduled only after the previous one has finished, so slow responses never
//! pile up.
//!
//! ```text
//! Joining -> Polling -> Unchanged ---------------> reschedule (short)
//!                    -> Changed -> Fetching -----> reschedule (short)
//!                    -> NotFound -> Joining -----> reschedule (short)
//!                    -> NetworkError ------------> reschedule (long)
//! ```
//!
//! Failures are never fatal; polling continues until [`Synchronizer::stop`].

use crate::config::PollTiming;
use crate::mirror::Mirror;
use crate::network::{ApiError, GameApi};
use log::{debug, info, warn};
use shared::StateHash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Result of a single hash-check cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Unchanged,
    /// A new snapshot with this hash was fetched into the mirror
    Changed(StateHash),
    /// The session was gone and a join request was sent
    Rejoined,
    Failed,
}

impl CheckOutcome {
    pub fn next_delay(&self, timing: &PollTiming) -> Duration {
        match self {
            CheckOutcome::Failed => timing.error,
            _ => timing.success,
        }
    }
}

#[derive(Clone)]
struct Poller {
    api: Arc<dyn GameApi>,
    mirror: Mirror,
    timing: PollTiming,
}

impl Poller {
    async fn check_once(&self) -> CheckOutcome {
        let known = self.mirror.known_hash();

        match self.api.state_hash(known.unwrap_or_default()).await {
            Ok(hash) if Some(hash) == known => CheckOutcome::Unchanged,
            Ok(hash) => match self.fetch().await {
                Ok(()) => CheckOutcome::Changed(hash),
                Err(e) => {
                    warn!("Fetching state for hash {} failed: {}", hash, e);
                    CheckOutcome::Failed
                }
            },
            Err(ApiError::NotFound) => {
                info!("Session not found, rejoining");
                match self.api.join().await {
                    Ok(()) => CheckOutcome::Rejoined,
                    Err(e) => {
                        warn!("Rejoin failed: {}", e);
                        CheckOutcome::Failed
                    }
                }
            }
            Err(e) => {
                warn!("State hash check failed: {}", e);
                CheckOutcome::Failed
            }
        }
    }

    async fn fetch(&self) -> Result<(), ApiError> {
        let snapshot = self.api.state().await?;
        snapshot.validate().map_err(ApiError::Decode)?;
        debug!(
            "New snapshot {}: {} players, stage {}",
            snapshot.state_hash,
            snapshot.players.len(),
            snapshot.stage.as_str()
        );
        self.mirror.replace(snapshot);
        Ok(())
    }

    async fn run(self, cancelled: Arc<AtomicBool>) {
        info!("Joining game");
        if let Err(e) = self.api.join().await {
            warn!("Initial join failed: {}", e);
        }

        while !cancelled.load(Ordering::SeqCst) {
            let outcome = self.check_once().await;
            let delay = outcome.next_delay(&self.timing);

            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            debug!("{:?}, next check in {}ms", outcome, delay.as_millis());
            sleep(delay).await;
        }

        info!("Polling stopped");
    }
}

struct Running {
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct Synchronizer {
    poller: Poller,
    running: Mutex<Option<Running>>,
}

impl Synchronizer {
    pub fn new(api: Arc<dyn GameApi>, mirror: Mirror, timing: PollTiming) -> Self {
        Self {
            poller: Poller {
                api,
                mirror,
                timing,
            },
            running: Mutex::new(None),
        }
    }

    /// Runs one hash-check cycle without scheduling the next one
    pub async fn check_once(&self) -> CheckOutcome {
        self.poller.check_once().await
    }

    /// Joins the game and starts the polling chain. Must be called from within a
    /// tokio runtime. Calling it while already running does nothing.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().map_or(false, |r| !r.handle.is_finished()) {
            return;
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(self.poller.clone().run(Arc::clone(&cancelled)));
        *running = Some(Running { cancelled, handle });
    }

    /// Stops the chain. No check is issued after this returns.
    pub fn stop(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(r) = running.take() {
            r.cancelled.store(true, Ordering::SeqCst);
            r.handle.abort();
            info!("Synchronizer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.as_ref().map_or(false, |r| !r.handle.is_finished())
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}
