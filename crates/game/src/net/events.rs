use std::net::SocketAddr;

use crate::relay::{ConnectionId, PlayerId};

#[derive(Debug, Clone)]
pub enum ServerEvent {
    ClientConnected {
        connection: ConnectionId,
        addr: SocketAddr,
    },
    ClientDisconnected {
        connection: ConnectionId,
        reason: DisconnectReason,
    },
    ConnectionDenied {
        addr: SocketAddr,
        reason: String,
    },
    PlayerJoined {
        connection: ConnectionId,
        player_id: PlayerId,
        nickname: String,
    },
    PlayerLeft {
        player_id: PlayerId,
        nickname: String,
    },
    NicknameRejected {
        connection: ConnectionId,
        reason: String,
    },
    ProtocolError {
        connection: ConnectionId,
        message: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Closed,
    Error,
    Kicked,
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Closed => "disconnected",
            DisconnectReason::Error => "dropped after a socket error",
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::Shutdown => "closed by shutdown",
        }
    }
}
