use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub type PlayerId = Uuid;

/// Average probability that a player is dealt a plain villager
pub const PROB_VILLAGER: f64 = 0.1;

/// Relative weights of the optional roles. Weights only have meaning relative to each other.
pub const RANDOMISED_ROLES: [(&str, u32); 10] = [
    ("JESTER", 20),
    ("VIGILANTE", 10),
    ("MAYOR", 10),
    ("MILLER", 10),
    ("ACOLYTE", 5),
    ("PRIEST", 10),
    ("PROSTITUTE", 10),
    ("MASON", 7),
    ("EXORCIST", 10),
    ("FOOL", 10),
];

/// Number of wolves the server deals when the config leaves it open
pub fn default_num_wolves(num_players: usize) -> u32 {
    match num_players {
        3..=6 => 1,
        7..=9 => 2,
        10..=15 => 3,
        n => ((n + 4) / 5) as u32,
    }
}

/// Opaque change-detection token. Equal hashes mean nothing changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateHash(pub i64);

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Lobby,
    Day,
    Night,
    Voting,
    Ended,
    Unknown,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Lobby => "LOBBY",
            Stage::Day => "DAY",
            Stage::Night => "NIGHT",
            Stage::Voting => "VOTING",
            Stage::Ended => "ENDED",
            Stage::Unknown => "UNKNOWN",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "LOBBY" => Stage::Lobby,
            "DAY" => Stage::Day,
            "NIGHT" => Stage::Night,
            "VOTING" => Stage::Voting,
            "ENDED" => Stage::Ended,
            _ => Stage::Unknown,
        }
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Stage::parse(&raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerStatus {
    Alive,
    Nominated,
    Seconded,
    Lynched,
    Wolfed,
    Shot,
    Spectating,
    Unknown,
}

impl PlayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Alive => "ALIVE",
            PlayerStatus::Nominated => "NOMINATED",
            PlayerStatus::Seconded => "SECONDED",
            PlayerStatus::Lynched => "LYNCHED",
            PlayerStatus::Wolfed => "WOLFED",
            PlayerStatus::Shot => "SHOT",
            PlayerStatus::Spectating => "SPECTATING",
            PlayerStatus::Unknown => "UNKNOWN",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            // Older servers call a living player "normal"
            "ALIVE" | "NORMAL" => PlayerStatus::Alive,
            "NOMINATED" => PlayerStatus::Nominated,
            "SECONDED" => PlayerStatus::Seconded,
            "LYNCHED" => PlayerStatus::Lynched,
            "WOLFED" => PlayerStatus::Wolfed,
            "SHOT" => PlayerStatus::Shot,
            "SPECTATING" => PlayerStatus::Spectating,
            _ => PlayerStatus::Unknown,
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(
            self,
            PlayerStatus::Alive | PlayerStatus::Nominated | PlayerStatus::Seconded
        )
    }
}

impl Serialize for PlayerStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PlayerStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(PlayerStatus::parse(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub status: PlayerStatus,
    #[serde(default)]
    pub role: Option<String>,
    /// Seed used to pick the role artwork so every client draws the same picture
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub ready: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: &str, status: PlayerStatus) -> Self {
        Self {
            id,
            name: name.to_string(),
            status,
            role: None,
            seed: None,
            ready: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub msg: String,
    #[serde(rename = "isStrong", default)]
    pub is_strong: bool,
}

/// What the action panel shows for the local player's role in the current stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Controls {
    pub title: String,
    pub text: String,
    pub button_visible: bool,
    pub button_enabled: bool,
    #[serde(default)]
    pub button_text: Option<String>,
    #[serde(default)]
    pub button_confirm_text: Option<String>,
    /// Endpoint name the button posts to
    #[serde(default)]
    pub button_submit_func: Option<String>,
    /// Whether the action needs a selected player
    #[serde(default)]
    pub button_submit_person: Option<bool>,
}

impl Controls {
    /// The action the button would submit right now, if it can be pressed
    pub fn action(&self) -> Option<&str> {
        if self.button_visible && self.button_enabled {
            self.button_submit_func.as_deref()
        } else {
            None
        }
    }

    pub fn requires_target(&self) -> bool {
        self.button_submit_person.unwrap_or(false)
    }

    pub fn validate(&self) -> Result<(), String> {
        let has_text = self
            .button_text
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false);
        if self.button_visible && !has_text {
            return Err("no button text provided when button is visible".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "myID")]
    pub id: PlayerId,
    #[serde(rename = "myName")]
    pub name: String,
    #[serde(rename = "myNameIsGenerated")]
    pub name_is_generated: bool,
}

/// Game distribution settings. Every field left as `None` falls back to the server default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default)]
    pub number_of_wolves: Option<u32>,
    #[serde(default)]
    pub role_weights: Option<BTreeMap<String, u32>>,
    #[serde(default)]
    pub probability_of_villager: Option<f64>,
}

impl GameConfig {
    pub fn is_default(&self) -> bool {
        self.number_of_wolves.is_none()
            && self.role_weights.is_none()
            && self.probability_of_villager.is_none()
    }

    /// Fully spelled-out defaults for a game of `num_players`
    pub fn baseline(num_players: usize) -> Self {
        Self {
            number_of_wolves: Some(default_num_wolves(num_players)),
            role_weights: Some(
                RANDOMISED_ROLES
                    .iter()
                    .map(|(role, weight)| (role.to_string(), *weight))
                    .collect(),
            ),
            probability_of_villager: Some(PROB_VILLAGER),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigMode {
    Easy,
    Medium,
    Hard,
}

impl ConfigMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigMode::Easy => "easy",
            ConfigMode::Medium => "medium",
            ConfigMode::Hard => "hard",
        }
    }
}

/// Complete authoritative view of a game as seen by one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub state_hash: StateHash,
    pub players: Vec<Player>,
    pub chat: Vec<ChatEntry>,
    pub stage: Stage,
    #[serde(rename = "controls_state")]
    pub controls: Controls,
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(rename = "showSecretChat", default)]
    pub show_secret_chat: bool,
    #[serde(default)]
    pub game_config: Option<GameConfig>,
}

impl StateSnapshot {
    pub fn validate(&self) -> Result<(), String> {
        self.controls.validate()
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn me(&self) -> Option<&Player> {
        self.player(&self.identity.id)
    }
}
