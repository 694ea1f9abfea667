use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

const ROOM_ADJECTIVES: [&str; 10] = [
    "bright", "calm", "gentle", "happy", "peaceful", "swift", "quiet", "bold", "wise", "kind",
];
const ROOM_ANIMALS: [&str; 10] = [
    "dolphin", "eagle", "fox", "owl", "deer", "wolf", "bear", "hawk", "lion", "otter",
];
const ROOM_VERBS: [&str; 10] = [
    "swimming", "flying", "running", "jumping", "dancing", "gliding", "climbing", "soaring",
    "diving", "wandering",
];

/// Room ID type (opaque string chosen by whoever books the call)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Generate a human-friendly `adjective-animal-verb` room id
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let pick = |words: &[&'static str], rng: &mut rand::rngs::ThreadRng| {
            words.choose(rng).copied().unwrap_or_default()
        };
        let adjective = pick(&ROOM_ADJECTIVES, &mut rng);
        let animal = pick(&ROOM_ANIMALS, &mut rng);
        let verb = pick(&ROOM_VERBS, &mut rng);
        Self(format!("{adjective}-{animal}-{verb}"))
    }

    #[must_use]
    pub const fn from_string(id: String) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Participant identifier as resolved by the caller's identity check
/// (provider, patient or guest)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    #[must_use]
    pub const fn from_string(id: String) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters followed by `...`, for diagnostics output
    #[must_use]
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(8).collect();
        format!("{prefix}...")
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
