//! Status-change overlay sequencing
//!
//! When the local player goes from spectating to alive (they have been dealt
//! into the game) the UI plays a short overlay. The sequence is an explicit
//! state machine advanced by timestamps, so it can be driven by any scheduler
//! and tested without real time passing.

use crate::mirror::Mirror;
use log::debug;
use shared::PlayerStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

pub const APPEAR: Duration = Duration::from_millis(400);
pub const FADE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPhase {
    /// No overlay; the previous status is on screen
    ShowingOld,
    /// Overlay is popping in
    Transitioning { until: Instant },
    /// Overlay fading out over the new status
    ShowingNew { until: Instant },
}

pub struct StatusOverlay {
    phase: OverlayPhase,
    previous: Option<PlayerStatus>,
}

impl StatusOverlay {
    pub fn new() -> Self {
        Self {
            phase: OverlayPhase::ShowingOld,
            previous: None,
        }
    }

    pub fn phase(&self) -> OverlayPhase {
        self.phase
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self.phase, OverlayPhase::ShowingOld)
    }

    /// Feeds the local player's latest status. Returns true if this starts a
    /// new overlay sequence.
    pub fn observe(&mut self, status: Option<PlayerStatus>, now: Instant) -> bool {
        let triggered =
            self.previous == Some(PlayerStatus::Spectating) && status == Some(PlayerStatus::Alive);
        self.previous = status;

        if triggered {
            self.phase = OverlayPhase::Transitioning { until: now + APPEAR };
        }
        triggered
    }

    /// Advances through every phase whose time is up
    pub fn tick(&mut self, now: Instant) -> OverlayPhase {
        loop {
            self.phase = match self.phase {
                OverlayPhase::Transitioning { until } if until <= now => {
                    OverlayPhase::ShowingNew {
                        until: until + FADE,
                    }
                }
                OverlayPhase::ShowingNew { until } if until <= now => OverlayPhase::ShowingOld,
                phase => return phase,
            };
        }
    }

    /// When the current phase ends, if it ends at all
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            OverlayPhase::ShowingOld => None,
            OverlayPhase::Transitioning { until } | OverlayPhase::ShowingNew { until } => {
                Some(until)
            }
        }
    }
}

impl Default for StatusOverlay {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a [`StatusOverlay`] against the mirror until cancelled, publishing
/// every phase change on `phases`
pub async fn drive(mirror: Mirror, phases: Arc<watch::Sender<OverlayPhase>>) {
    let mut snapshots = mirror.subscribe();
    let mut overlay = StatusOverlay::new();
    overlay.observe(mirror.my_status(), Instant::now());

    loop {
        let deadline = overlay.deadline();
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                snapshots.borrow_and_update();
                if overlay.observe(mirror.my_status(), Instant::now()) {
                    debug!("Player dealt in, showing status overlay");
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
        }

        let phase = overlay.tick(Instant::now());
        phases.send_if_modified(|current| {
            let modified = *current != phase;
            *current = phase;
            modified
        });
    }
}
