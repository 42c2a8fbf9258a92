//! Read-model of the last authoritative server snapshot
//!
//! The mirror only ever changes by wholesale replacement. Readers get an
//! `Arc` to an immutable snapshot, so they can never observe a half-applied
//! update. Local state (config drafts, player selection) lives elsewhere.

use shared::{
    ChatEntry, Controls, GameConfig, Identity, Player, PlayerId, PlayerStatus, Stage, StateHash,
    StateSnapshot,
};
use std::sync::Arc;
use tokio::sync::watch;

pub type SharedSnapshot = Option<Arc<StateSnapshot>>;

#[derive(Clone)]
pub struct Mirror {
    tx: Arc<watch::Sender<SharedSnapshot>>,
}

impl Mirror {
    /// An empty mirror; nothing has been fetched from the server yet
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the whole snapshot. Always accepted and always announced to
    /// subscribers, even when identical to the current one.
    pub fn replace(&self, snapshot: StateSnapshot) {
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }

    /// Receiver that wakes on every replacement
    pub fn subscribe(&self) -> watch::Receiver<SharedSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> SharedSnapshot {
        self.tx.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_none()
    }

    /// Hash of the mirrored snapshot, or `None` before the first fetch
    pub fn known_hash(&self) -> Option<StateHash> {
        self.read(|s| s.state_hash)
    }

    pub fn players(&self) -> Vec<Player> {
        self.read(|s| s.players.clone()).unwrap_or_default()
    }

    pub fn player(&self, id: &PlayerId) -> Option<Player> {
        self.read(|s| s.player(id).cloned()).flatten()
    }

    pub fn chat(&self) -> Vec<ChatEntry> {
        self.read(|s| s.chat.clone()).unwrap_or_default()
    }

    pub fn stage(&self) -> Option<Stage> {
        self.read(|s| s.stage)
    }

    pub fn controls(&self) -> Option<Controls> {
        self.read(|s| s.controls.clone())
    }

    /// Config the server currently holds. `None` both before the first fetch
    /// and when the server runs on defaults.
    pub fn confirmed_config(&self) -> Option<GameConfig> {
        self.read(|s| s.game_config.clone()).flatten()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.read(|s| s.identity.clone())
    }

    pub fn my_status(&self) -> Option<PlayerStatus> {
        self.read(|s| s.me().map(|p| p.status)).flatten()
    }

    pub fn show_secret_chat(&self) -> bool {
        self.read(|s| s.show_secret_chat).unwrap_or(false)
    }

    fn read<T>(&self, f: impl FnOnce(&StateSnapshot) -> T) -> Option<T> {
        self.tx.borrow().as_deref().map(f)
    }
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use uuid::Uuid;

    pub fn snapshot(hash: i64) -> StateSnapshot {
        let me = Uuid::from_u128(1);
        StateSnapshot {
            state_hash: StateHash(hash),
            players: vec![
                Player::new(me, "Rosie", PlayerStatus::Alive),
                Player::new(Uuid::from_u128(2), "Gaby", PlayerStatus::Alive),
                Player::new(Uuid::from_u128(3), "Euan", PlayerStatus::Wolfed),
            ],
            chat: vec![ChatEntry {
                msg: "Sophie was killed in the night".to_string(),
                is_strong: true,
            }],
            stage: Stage::Day,
            controls: Controls {
                title: "Villager".to_string(),
                text: "Vote someone off".to_string(),
                button_visible: true,
                button_enabled: true,
                button_text: Some("Vote".to_string()),
                button_confirm_text: None,
                button_submit_func: Some("vote".to_string()),
                button_submit_person: Some(true),
            },
            identity: Identity {
                id: me,
                name: "Rosie".to_string(),
                name_is_generated: false,
            },
            show_secret_chat: false,
            game_config: None,
        }
    }
}
