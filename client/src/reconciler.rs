//! Game config reconciliation
//!
//! Three config values are in play:
//! - the server's config, as last seen in the mirror,
//! - the default baseline, used to seed a fresh customisation,
//! - the user's local draft, which may be mid-edit.
//!
//! The reconciler keeps one more value, the *pivot*: the config it last
//! attributed to the server. A server push only overwrites the draft when the
//! draft still equals the pivot, i.e. the user has nothing pending. A local
//! edit is only sent when it differs from the pivot, and the pivot advances to
//! the sent value immediately so the server's echo is not mistaken for news.

use crate::mirror::Mirror;
use crate::network::{ApiError, GameApi};
use log::{debug, info, warn};
use shared::{ConfigMode, GameConfig};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// `None` means "use the server defaults"
pub type Draft = Option<GameConfig>;

/// A config write that has to go out to the server
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigUpdate {
    pub draft: Draft,
    /// Increases with every update issued, used to discard stale failures
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct ConfigReconciler {
    draft: Draft,
    pivot: Draft,
    /// Last config actually seen from the server, independent of local writes
    last_observed: Draft,
    generation: u64,
}

impl ConfigReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> Option<&GameConfig> {
        self.draft.as_ref()
    }

    pub fn is_customized(&self) -> bool {
        self.draft.is_some()
    }

    /// True while the draft holds something the server has not confirmed
    pub fn has_pending_edit(&self) -> bool {
        self.draft != self.pivot
    }

    /// Merges a config observed from the server. Returns whether the draft changed.
    ///
    /// Only a value different from the last observed one counts. Snapshots
    /// that changed for other reasons still carry the old config, and must not
    /// roll back an update that is still in flight.
    pub fn observe_server(&mut self, server: Draft) -> bool {
        if server == self.last_observed {
            return false;
        }

        let adopt = self.draft == self.pivot && self.draft != server;
        if adopt {
            debug!("Adopting server config {:?}", server);
            self.draft = server.clone();
        } else if self.draft != self.pivot {
            debug!("Keeping local edit over server config {:?}", server);
        }
        self.pivot = server.clone();
        self.last_observed = server;
        adopt
    }

    /// Replaces the draft on behalf of the user. Returns the update to send,
    /// or `None` when the server already holds this value.
    pub fn set_draft(&mut self, draft: Draft) -> Option<ConfigUpdate> {
        self.draft = draft;
        if self.draft == self.pivot {
            return None;
        }

        self.pivot = self.draft.clone();
        self.generation += 1;
        Some(ConfigUpdate {
            draft: self.draft.clone(),
            generation: self.generation,
        })
    }

    /// Edits the draft in place. Editing a non-customised draft starts from an
    /// all-default config.
    pub fn edit(&mut self, f: impl FnOnce(&mut GameConfig)) -> Option<ConfigUpdate> {
        let mut config = self.draft.clone().unwrap_or_default();
        f(&mut config);
        self.set_draft(Some(config))
    }

    /// Turns customisation on or off. Switching on seeds the draft from the
    /// server's config, or `baseline` when the server runs on defaults.
    pub fn set_customize(&mut self, on: bool, baseline: GameConfig) -> Option<ConfigUpdate> {
        match (on, self.is_customized()) {
            (true, false) => {
                let seed = self.last_observed.clone().unwrap_or(baseline);
                self.set_draft(Some(seed))
            }
            (false, true) => self.set_draft(None),
            _ => None,
        }
    }

    /// Whether no update has been issued after `generation`
    pub fn is_latest(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Called when an update could not be delivered. If no newer update has been
    /// issued since, the pivot falls back to what the server was last seen
    /// holding, which leaves the draft as a pending local edit. Returns whether
    /// the rollback happened.
    pub fn update_failed(&mut self, generation: u64) -> bool {
        if !self.is_latest(generation) {
            return false;
        }
        self.pivot = self.last_observed.clone();
        true
    }
}

struct Inner {
    api: Arc<dyn GameApi>,
    mirror: Mirror,
    state: Mutex<ConfigReconciler>,
    mode: Mutex<Option<ConfigMode>>,
    auto_update_mode: bool,
    last_error: Mutex<Option<String>>,
    mode_refresh: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Inner {
    fn observe_mirror(&self) -> bool {
        let Some(snapshot) = self.mirror.snapshot() else {
            return false;
        };
        lock(&self.state).observe_server(snapshot.game_config.clone())
    }

    async fn push(&self, update: Option<ConfigUpdate>) -> Result<bool, ApiError> {
        let Some(update) = update else {
            return Ok(false);
        };

        match self.api.set_game_config(update.draft.as_ref()).await {
            Ok(()) => {
                if lock(&self.state).is_latest(update.generation) {
                    lock(&self.last_error).take();
                }
                Ok(true)
            }
            Err(e) => {
                warn!("Config update {} failed: {}", update.generation, e);
                if lock(&self.state).update_failed(update.generation) {
                    *lock(&self.last_error) = Some(e.reason());
                } else {
                    debug!("Update {} was already superseded", update.generation);
                }
                Err(e)
            }
        }
    }

    async fn refresh_mode(&self) -> Result<ConfigMode, ApiError> {
        let mode = self.api.game_config_mode().await?;
        *lock(&self.mode) = Some(mode);
        Ok(mode)
    }

    async fn watch_mirror(self: Arc<Self>) {
        let mut rx = self.mirror.subscribe();
        // Whatever is already mirrored counts as the first observation
        loop {
            rx.borrow_and_update();
            self.observe_mirror();
            self.spawn_mode_refresh();

            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Re-reads the mode off the merge path. A newer refresh replaces one
    /// still waiting on the server.
    fn spawn_mode_refresh(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            if let Err(e) = inner.refresh_mode().await {
                debug!("Could not refresh config mode: {}", e);
            }
        });
        if let Some(previous) = lock(&self.mode_refresh).replace(task) {
            previous.abort();
        }
    }
}

/// Drives a [`ConfigReconciler`] against the mirror and the server
pub struct ConfigSync {
    inner: Arc<Inner>,
    observer: Mutex<Option<JoinHandle<()>>>,
}

impl ConfigSync {
    pub fn new(api: Arc<dyn GameApi>, mirror: Mirror, auto_update_mode: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                mirror,
                state: Mutex::new(ConfigReconciler::new()),
                mode: Mutex::new(None),
                auto_update_mode,
                last_error: Mutex::new(None),
                mode_refresh: Mutex::new(None),
            }),
            observer: Mutex::new(None),
        }
    }

    /// Starts merging every snapshot the mirror receives
    pub fn start(&self) {
        let mut observer = lock(&self.observer);
        if observer.as_ref().map_or(false, |h| !h.is_finished()) {
            return;
        }
        *observer = Some(tokio::spawn(Arc::clone(&self.inner).watch_mirror()));
    }

    pub fn stop(&self) {
        if let Some(handle) = lock(&self.observer).take() {
            handle.abort();
        }
        if let Some(handle) = lock(&self.inner.mode_refresh).take() {
            handle.abort();
        }
    }

    /// Merges the mirror's current config right away
    pub fn observe(&self) -> bool {
        self.inner.observe_mirror()
    }

    pub fn draft(&self) -> Draft {
        lock(&self.inner.state).draft().cloned()
    }

    pub fn is_customized(&self) -> bool {
        lock(&self.inner.state).is_customized()
    }

    pub fn has_pending_edit(&self) -> bool {
        lock(&self.inner.state).has_pending_edit()
    }

    /// Reason of the last failed config update, cleared by the next success
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }

    /// Replaces the draft. `Ok(true)` when an update was sent.
    pub async fn set_draft(&self, draft: Draft) -> Result<bool, ApiError> {
        let update = lock(&self.inner.state).set_draft(draft);
        self.inner.push(update).await
    }

    pub async fn edit(&self, f: impl FnOnce(&mut GameConfig)) -> Result<bool, ApiError> {
        let update = lock(&self.inner.state).edit(f);
        self.inner.push(update).await
    }

    pub async fn set_customize(&self, on: bool) -> Result<bool, ApiError> {
        let baseline = GameConfig::baseline(self.inner.mirror.players().len());
        let update = lock(&self.inner.state).set_customize(on, baseline);
        self.inner.push(update).await
    }

    pub fn mode(&self) -> Option<ConfigMode> {
        *lock(&self.inner.mode)
    }

    pub async fn refresh_mode(&self) -> Result<ConfigMode, ApiError> {
        self.inner.refresh_mode().await
    }

    /// Selects a preset locally, and on the server too when auto-update is on
    pub async fn change_mode(&self, mode: ConfigMode) -> Result<(), ApiError> {
        // A read still in flight would report the old mode
        if let Some(refresh) = lock(&self.inner.mode_refresh).take() {
            refresh.abort();
        }
        *lock(&self.inner.mode) = Some(mode);
        if self.inner.auto_update_mode {
            info!("Changing config mode to {}", mode.as_str());
            self.inner.api.set_game_config_mode(mode).await?;
        }
        Ok(())
    }
}

impl Drop for ConfigSync {
    fn drop(&mut self) {
        self.stop();
    }
}
