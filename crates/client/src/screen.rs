use std::fmt;
use std::sync::mpsc::Receiver;

use bomber::nickname::{self, NicknameError};
use serde_json::{Map, Value};

use crate::events::EventBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Nickname,
    Loading,
    Game,
}

impl Screen {
    pub fn as_str(&self) -> &'static str {
        match self {
            Screen::Nickname => "nickname",
            Screen::Loading => "loading",
            Screen::Game => "game",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenChange {
    pub screen: Screen,
    pub previous: Screen,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub nickname: String,
    pub id: Option<String>,
    pub is_connected: bool,
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityPatch {
    pub nickname: Option<String>,
    pub id: Option<String>,
    pub is_connected: Option<bool>,
}

/// Which screen is showing, who the local player is, and free-form game data.
///
/// Screen and identity changes are published to every subscriber, in the
/// order they happen, before the setter returns.
#[derive(Debug, Default)]
pub struct GameStateManager {
    current: Screen,
    previous: Option<Screen>,
    identity: Identity,
    game_data: Map<String, Value>,
    screen_changes: EventBus<ScreenChange>,
    identity_changes: EventBus<Identity>,
}

impl GameStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_screen(&mut self) -> Receiver<ScreenChange> {
        self.screen_changes.subscribe()
    }

    pub fn subscribe_identity(&mut self) -> Receiver<Identity> {
        self.identity_changes.subscribe()
    }

    pub fn set_screen(&mut self, screen: Screen) {
        let previous = self.current;
        self.previous = Some(previous);
        self.current = screen;

        log::debug!("Screen changed from {} to {}", previous, screen);
        self.screen_changes.publish(ScreenChange { screen, previous });
    }

    pub fn current_screen(&self) -> Screen {
        self.current
    }

    pub fn previous_screen(&self) -> Option<Screen> {
        self.previous
    }

    pub fn set_identity(&mut self, patch: IdentityPatch) {
        if let Some(nickname) = patch.nickname {
            self.identity.nickname = nickname;
        }
        if let Some(id) = patch.id {
            self.identity.id = Some(id);
        }
        if let Some(is_connected) = patch.is_connected {
            self.identity.is_connected = is_connected;
        }

        self.identity_changes.publish(self.identity.clone());
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Shallow merge: top-level keys in `data` overwrite, others are kept.
    pub fn set_game_data(&mut self, data: Map<String, Value>) {
        self.game_data.extend(data);
    }

    pub fn game_data(&self) -> &Map<String, Value> {
        &self.game_data
    }

    /// Trimmed length 2..=20 and only `[A-Za-z0-9_-]`.
    pub fn is_nickname_valid(&self, raw: &str) -> bool {
        nickname::is_valid(raw)
    }

    /// Strips disallowed characters; the result may still be too short or long.
    pub fn sanitize_nickname(&self, raw: &str) -> String {
        nickname::sanitize(raw)
    }

    /// The rule used for submissions: input that sanitising would alter is
    /// rejected rather than silently rewritten.
    pub fn canonical_nickname(&self, raw: &str) -> Result<String, NicknameError> {
        nickname::canonicalize(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_starts_on_nickname_screen() {
        let manager = GameStateManager::new();
        assert_eq!(manager.current_screen(), Screen::Nickname);
        assert_eq!(manager.previous_screen(), None);
    }

    #[test]
    fn test_screen_change_published_with_previous() {
        let mut manager = GameStateManager::new();
        let first = manager.subscribe_screen();
        let second = manager.subscribe_screen();

        manager.set_screen(Screen::Loading);
        manager.set_screen(Screen::Game);

        let expected = [
            ScreenChange {
                screen: Screen::Loading,
                previous: Screen::Nickname,
            },
            ScreenChange {
                screen: Screen::Game,
                previous: Screen::Loading,
            },
        ];
        assert_eq!(first.try_iter().collect::<Vec<_>>(), expected);
        assert_eq!(second.try_iter().collect::<Vec<_>>(), expected);
        assert_eq!(manager.previous_screen(), Some(Screen::Loading));
    }

    #[test]
    fn test_identity_patch_is_shallow() {
        let mut manager = GameStateManager::new();
        let changes = manager.subscribe_identity();

        manager.set_identity(IdentityPatch {
            nickname: Some("bomber42".into()),
            ..Default::default()
        });
        manager.set_identity(IdentityPatch {
            id: Some("player_abc_1".into()),
            is_connected: Some(true),
            ..Default::default()
        });

        let identity = manager.identity();
        assert_eq!(identity.nickname, "bomber42");
        assert_eq!(identity.id.as_deref(), Some("player_abc_1"));
        assert!(identity.is_connected);
        assert_eq!(changes.try_iter().count(), 2);
    }

    #[test]
    fn test_game_data_merge() {
        let mut manager = GameStateManager::new();
        let Value::Object(first) = json!({"level": 1, "mode": "classic"}) else {
            unreachable!()
        };
        let Value::Object(second) = json!({"level": 2}) else {
            unreachable!()
        };

        manager.set_game_data(first);
        manager.set_game_data(second);
        assert_eq!(
            Value::Object(manager.game_data().clone()),
            json!({"level": 2, "mode": "classic"})
        );
    }

    #[test]
    fn test_nickname_rules() {
        let manager = GameStateManager::new();
        assert!(manager.is_nickname_valid("player_1"));
        assert!(manager.is_nickname_valid("valid-name_99"));
        assert!(!manager.is_nickname_valid("p"));
        assert!(!manager.is_nickname_valid("has space"));

        assert_eq!(manager.sanitize_nickname("has space!"), "hasspace");
        // Sanitised, but still too short.
        assert!(!manager.is_nickname_valid(&manager.sanitize_nickname("a!")));

        assert_eq!(manager.canonical_nickname(" bomber42 ").as_deref(), Ok("bomber42"));
        assert_eq!(
            manager.canonical_nickname("has space"),
            Err(NicknameError::Characters)
        );
    }
}
