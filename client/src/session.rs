//! One client session against one game
//!
//! Owns the mirror and the three services that read or write it, and starts
//! and stops their background tasks together.

use crate::config::ClientConfig;
use crate::gateway::ActionGateway;
use crate::mirror::Mirror;
use crate::network::{ApiError, GameApi, HttpApi};
use crate::overlay::{self, OverlayPhase};
use crate::reconciler::ConfigSync;
use crate::sync::Synchronizer;
use log::info;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct Session {
    game_tag: String,
    mirror: Mirror,
    sync: Synchronizer,
    config: ConfigSync,
    gateway: ActionGateway,
    overlay: Mutex<Option<JoinHandle<()>>>,
    overlay_phase: Arc<watch::Sender<OverlayPhase>>,
}

impl Session {
    pub fn new(api: Arc<dyn GameApi>, config: &ClientConfig) -> Self {
        let mirror = Mirror::new();
        let (overlay_phase, _rx) = watch::channel(OverlayPhase::ShowingOld);

        Self {
            game_tag: config.game_tag.clone(),
            sync: Synchronizer::new(api.clone(), mirror.clone(), config.timing),
            config: ConfigSync::new(api.clone(), mirror.clone(), config.auto_update_mode),
            gateway: ActionGateway::new(api, mirror.clone(), config.error_flash),
            mirror,
            overlay: Mutex::new(None),
            overlay_phase: Arc::new(overlay_phase),
        }
    }

    /// Session talking to a real server over HTTP
    pub fn connect(config: &ClientConfig) -> Result<Self, ApiError> {
        let api = HttpApi::with_timeout(&config.server, &config.game_tag, config.request_timeout)?;
        Ok(Self::new(Arc::new(api), config))
    }

    pub fn game_tag(&self) -> &str {
        &self.game_tag
    }

    /// Joins the game and starts every background task
    pub fn start(&self) {
        info!("Starting session for game {}", self.game_tag);
        self.config.start();
        self.sync.start();

        let mut task = self.overlay.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().map_or(true, |h| h.is_finished()) {
            *task = Some(tokio::spawn(overlay::drive(
                self.mirror.clone(),
                Arc::clone(&self.overlay_phase),
            )));
        }
    }

    /// Stops every background task. The mirror keeps its last snapshot.
    pub fn stop(&self) {
        self.sync.stop();
        self.config.stop();
        if let Some(handle) = self
            .overlay
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        info!("Session for game {} stopped", self.game_tag);
    }

    pub fn is_running(&self) -> bool {
        self.sync.is_running()
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn config(&self) -> &ConfigSync {
        &self.config
    }

    pub fn gateway(&self) -> &ActionGateway {
        &self.gateway
    }

    pub fn subscribe_overlay(&self) -> watch::Receiver<OverlayPhase> {
        self.overlay_phase.subscribe()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
