use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::random_token;
use crate::nickname::{self, NicknameError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// `player_<token>_<millis>`. Unique only together with the registry's
    /// collision check in `PlayerRegistry::register`.
    pub fn generate(now_ms: u64) -> Self {
        Self(format!("player_{}_{}", random_token(9), now_ms))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub nickname: String,
    pub joined_at: u64,
    pub is_active: bool,
}

#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<PlayerId, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `raw`, checks it against the nicknames of registered players
    /// (case-sensitive) and stores a new player.
    pub fn register(&mut self, raw: &str, now_ms: u64) -> Result<&Player, NicknameError> {
        let nickname = nickname::validate(raw)?;

        if self.find_by_nickname(nickname).is_some() {
            return Err(NicknameError::Taken);
        }

        let mut id = PlayerId::generate(now_ms);
        while self.players.contains_key(&id) {
            log::warn!("Player id collision on {}, drawing again", id);
            id = PlayerId::generate(now_ms);
        }

        let player = Player {
            id: id.clone(),
            nickname: nickname.to_string(),
            joined_at: now_ms,
            is_active: true,
        };

        Ok(self.players.entry(id).or_insert(player))
    }

    pub fn remove(&mut self, id: &PlayerId) -> Option<Player> {
        self.players.remove(id)
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    pub fn find_by_nickname(&self, nickname: &str) -> Option<&Player> {
        self.players
            .values()
            .find(|p| p.is_active && p.nickname == nickname)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
