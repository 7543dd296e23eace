// Transport-free relay state.
//
// `Relay` owns the player registry and one slot per open connection. The
// network layer (`net::server::RelayServer`) reports connection open/close
// and hands over every inbound frame; the relay answers with a list of
// `Outbound` messages addressed by connection id. Keeping sockets out of
// this type lets the whole protocol be exercised without I/O.

use std::collections::{HashMap, VecDeque};

use crate::net::{
    Action, ClientMessage, DisconnectReason, NicknameResponse, ProtocolError, ServerEvent,
    ServerMessage, now_ms,
};
use crate::nickname::NicknameError;

use super::registry::{Player, PlayerId, PlayerRegistry};

pub type ConnectionId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: ConnectionId,
    pub message: ServerMessage,
}

impl Outbound {
    fn new(to: ConnectionId, message: ServerMessage) -> Self {
        Self { to, message }
    }
}

#[derive(Debug, Default)]
struct ConnectionSlot {
    player_id: Option<PlayerId>,
}

#[derive(Debug, Default)]
pub struct Relay {
    registry: PlayerRegistry,
    connections: HashMap<ConnectionId, ConnectionSlot>,
    player_connections: HashMap<PlayerId, ConnectionId>,
    next_connection_id: ConnectionId,
    pending_events: VecDeque<ServerEvent>,
}

impl Relay {
    pub fn new() -> Self {
        Self {
            next_connection_id: 1,
            ..Default::default()
        }
    }

    pub fn open_connection(&mut self) -> ConnectionId {
        let id = self.next_connection_id;
        self.next_connection_id += 1;
        self.connections.insert(id, ConnectionSlot::default());
        id
    }

    /// Drops the connection and, if it registered, its player. There is no
    /// grace period: the nickname is free again as soon as this returns.
    pub fn close_connection(
        &mut self,
        connection: ConnectionId,
        reason: DisconnectReason,
    ) -> Option<Player> {
        let slot = self.connections.remove(&connection)?;
        let player_id = slot.player_id?;
        self.player_connections.remove(&player_id);

        let player = self.registry.remove(&player_id)?;
        log::info!(
            "Player {} ({}) {}",
            player.nickname,
            player.id,
            reason.as_str()
        );
        self.pending_events.push_back(ServerEvent::PlayerLeft {
            player_id: player.id.clone(),
            nickname: player.nickname.clone(),
        });
        Some(player)
    }

    pub fn handle_frame(&mut self, connection: ConnectionId, data: &[u8]) -> Vec<Outbound> {
        if !self.connections.contains_key(&connection) {
            return Vec::new();
        }

        match ClientMessage::decode(data) {
            Ok(message) => self.handle_message(connection, message),
            Err(ProtocolError::UnknownType(kind)) => {
                log::info!("Unknown message type from connection {}: {:?}", connection, kind);
                Vec::new()
            }
            Err(e) => {
                log::error!("Error parsing message from connection {}: {}", connection, e);
                self.protocol_error(connection, "Invalid message format")
            }
        }
    }

    pub fn handle_message(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
    ) -> Vec<Outbound> {
        log::debug!("Received {} from connection {}", message.kind(), connection);

        match message {
            ClientMessage::SetNickname { nickname, .. } => {
                vec![self.set_nickname(connection, &nickname)]
            }
            ClientMessage::GameAction { action, .. } => self.game_action(connection, action),
        }
    }

    fn set_nickname(&mut self, connection: ConnectionId, raw: &str) -> Outbound {
        let already_registered = self
            .connections
            .get(&connection)
            .is_some_and(|slot| slot.player_id.is_some());

        let result = if already_registered {
            Err(NicknameError::AlreadyRegistered)
        } else {
            self.registry.register(raw, now_ms()).cloned()
        };

        let player = match result {
            Ok(player) => player,
            Err(reason) => {
                log::warn!("Rejected nickname {:?} on connection {}: {}", raw, connection, reason);
                self.pending_events.push_back(ServerEvent::NicknameRejected {
                    connection,
                    reason: reason.to_string(),
                });
                return Outbound::new(
                    connection,
                    ServerMessage::NicknameResponse(NicknameResponse::rejected(reason.to_string())),
                );
            }
        };

        if let Some(slot) = self.connections.get_mut(&connection) {
            slot.player_id = Some(player.id.clone());
        }
        self.player_connections.insert(player.id.clone(), connection);

        log::info!("Player {} ({}) joined the game", player.nickname, player.id);
        self.pending_events.push_back(ServerEvent::PlayerJoined {
            connection,
            player_id: player.id.clone(),
            nickname: player.nickname.clone(),
        });

        Outbound::new(
            connection,
            ServerMessage::NicknameResponse(NicknameResponse::accepted(
                "Nickname set successfully",
                &player.nickname,
                player.id.as_str(),
            )),
        )
    }

    fn game_action(&mut self, connection: ConnectionId, action: Action) -> Vec<Outbound> {
        let Some(player_id) = self
            .connections
            .get(&connection)
            .and_then(|slot| slot.player_id.clone())
        else {
            return self.protocol_error(connection, "Player not registered");
        };

        let Some(player) = self.registry.get(&player_id) else {
            return self.protocol_error(connection, "Player not found");
        };

        log::debug!("Game action from {}: {:?}", player.nickname, action);
        self.broadcast_from(&player_id, action)
    }

    /// One `game_update` per registered player other than the sender, in
    /// registry iteration order.
    pub fn broadcast_from(&self, from: &PlayerId, action: Action) -> Vec<Outbound> {
        let message = ServerMessage::game_update(from.as_str(), action);

        self.registry
            .iter()
            .filter(|player| &player.id != from)
            .filter_map(|player| self.player_connections.get(&player.id))
            .map(|&to| Outbound::new(to, message.clone()))
            .collect()
    }

    fn protocol_error(&mut self, connection: ConnectionId, message: &str) -> Vec<Outbound> {
        self.pending_events.push_back(ServerEvent::ProtocolError {
            connection,
            message: message.to_string(),
        });
        vec![Outbound::new(connection, ServerMessage::error(message))]
    }

    pub fn player_for(&self, connection: ConnectionId) -> Option<&Player> {
        self.connections
            .get(&connection)
            .and_then(|slot| slot.player_id.as_ref())
            .and_then(|id| self.registry.get(id))
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn player_count(&self) -> usize {
        self.registry.len()
    }

    pub fn player_list(&self) -> Vec<Player> {
        self.registry.iter().cloned().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{ErrorMessage, GameUpdate};
    use serde_json::json;

    fn register(relay: &mut Relay, connection: ConnectionId, nickname: &str) -> NicknameResponse {
        let frame = ClientMessage::set_nickname(nickname).encode().unwrap();
        let mut out = relay.handle_frame(connection, &frame);
        assert_eq!(out.len(), 1);
        let reply = out.remove(0);
        assert_eq!(reply.to, connection);
        match reply.message {
            ServerMessage::NicknameResponse(response) => response,
            other => panic!("expected nickname_response, got {other:?}"),
        }
    }

    fn place_bomb() -> Action {
        let mut action = Action::new();
        action.insert("type".into(), json!("place_bomb"));
        action.insert("position".into(), json!({"x": 64, "y": 64}));
        action
    }

    fn error_text(outbound: &Outbound) -> &str {
        match &outbound.message {
            ServerMessage::Error(ErrorMessage { message, .. }) => message,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_register_round_trip() {
        let mut relay = Relay::new();
        let conn = relay.open_connection();

        let response = register(&mut relay, conn, "bomber42");
        assert!(response.success);
        assert_eq!(response.nickname.as_deref(), Some("bomber42"));
        assert_eq!(response.message, "Nickname set successfully");

        let id = response.player_id.unwrap();
        assert_eq!(relay.player_for(conn).unwrap().id.as_str(), id);
    }

    #[test]
    fn test_second_alice_rejected() {
        let mut relay = Relay::new();
        let a = relay.open_connection();
        let b = relay.open_connection();

        assert!(register(&mut relay, a, "Alice").success);

        let second = register(&mut relay, b, "Alice");
        assert!(!second.success);
        assert_eq!(second.message, "Nickname already taken");
        assert_eq!(second.player_id, None);

        assert_eq!(relay.player_count(), 1);
        assert_eq!(relay.player_for(a).unwrap().nickname, "Alice");
        assert!(relay.player_for(b).is_none());
    }

    #[test]
    fn test_nickname_freed_on_disconnect() {
        let mut relay = Relay::new();
        let a = relay.open_connection();
        let first = register(&mut relay, a, "Alice");

        let left = relay.close_connection(a, DisconnectReason::Closed).unwrap();
        assert_eq!(left.nickname, "Alice");
        assert_eq!(relay.player_count(), 0);

        let b = relay.open_connection();
        let second = register(&mut relay, b, "Alice");
        assert!(second.success);
        assert_ne!(second.player_id, first.player_id);
    }

    #[test]
    fn test_invalid_nickname_keeps_connection() {
        let mut relay = Relay::new();
        let conn = relay.open_connection();

        let short = register(&mut relay, conn, "p");
        assert!(!short.success);
        assert_eq!(short.message, "Invalid nickname length (2-20 characters required)");

        let spaced = register(&mut relay, conn, "has space");
        assert!(!spaced.success);
        assert!(spaced.message.starts_with("Invalid characters"));

        assert!(register(&mut relay, conn, "player_1").success);
    }

    #[test]
    fn test_reregistration_rejected() {
        let mut relay = Relay::new();
        let conn = relay.open_connection();
        assert!(register(&mut relay, conn, "first").success);

        let again = register(&mut relay, conn, "second");
        assert!(!again.success);
        assert_eq!(again.message, "Player already registered");
        assert_eq!(relay.player_count(), 1);
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let mut relay = Relay::new();
        let a = relay.open_connection();
        let b = relay.open_connection();
        let c = relay.open_connection();
        let idle = relay.open_connection();

        let a_id = register(&mut relay, a, "Alice").player_id.unwrap();
        register(&mut relay, b, "Bob");
        register(&mut relay, c, "Carol");

        let frame = ClientMessage::game_action(place_bomb()).encode().unwrap();
        let out = relay.handle_frame(a, &frame);

        let mut recipients: Vec<ConnectionId> = out.iter().map(|o| o.to).collect();
        recipients.sort();
        assert_eq!(recipients, vec![b, c]);
        assert!(!recipients.contains(&idle));

        for outbound in &out {
            match &outbound.message {
                ServerMessage::GameUpdate(GameUpdate {
                    from_player, action, ..
                }) => {
                    assert_eq!(from_player, &a_id);
                    assert_eq!(action, &place_bomb());
                }
                other => panic!("expected game_update, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_action_from_unregistered_connection() {
        let mut relay = Relay::new();
        let conn = relay.open_connection();

        let frame = ClientMessage::game_action(place_bomb()).encode().unwrap();
        let out = relay.handle_frame(conn, &frame);
        assert_eq!(out.len(), 1);
        assert_eq!(error_text(&out[0]), "Player not registered");
    }

    #[test]
    fn test_malformed_and_unknown_frames() {
        let mut relay = Relay::new();
        let conn = relay.open_connection();

        let out = relay.handle_frame(conn, b"{{{");
        assert_eq!(error_text(&out[0]), "Invalid message format");

        let out = relay.handle_frame(conn, br#"{"type":"teleport"}"#);
        assert!(out.is_empty());

        // still usable afterwards
        assert!(register(&mut relay, conn, "survivor").success);
    }

    #[test]
    fn test_events_recorded() {
        let mut relay = Relay::new();
        let conn = relay.open_connection();
        register(&mut relay, conn, "Alice");
        relay.close_connection(conn, DisconnectReason::Closed);

        let events: Vec<ServerEvent> = relay.drain_events().collect();
        assert!(matches!(events[0], ServerEvent::PlayerJoined { .. }));
        assert!(matches!(events[1], ServerEvent::PlayerLeft { .. }));
        assert_eq!(relay.drain_events().count(), 0);
    }

    #[test]
    fn test_frames_from_closed_connection_ignored() {
        let mut relay = Relay::new();
        let conn = relay.open_connection();
        relay.close_connection(conn, DisconnectReason::Closed);

        let frame = ClientMessage::set_nickname("ghost").encode().unwrap();
        assert!(relay.handle_frame(conn, &frame).is_empty());
        assert_eq!(relay.player_count(), 0);
    }
}
