use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use bomber::net::random_token;
use bomber::{
    Action, ClientMessage, ErrorMessage, GameUpdate, NicknameResponse, ProtocolError,
    ServerMessage,
};

use crate::events::EventBus;

use super::config::ClientConfig;
use super::transport::{Connector, Link, LinkEvent, TcpConnector};

pub const OFFLINE_CONNECT_DELAY: Duration = Duration::from_millis(100);
pub const OFFLINE_RESPONSE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Retries are exhausted (or the client was built without a transport);
    /// nothing is sent anywhere until the next manual `connect`.
    Offline,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Offline => "offline",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    /// TCP to `host:port`.
    Real(String),
    /// No transport at all; the client goes straight to Offline.
    Simulated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// `simulated` is set when the connection is the local offline stand-in.
    Connected { simulated: bool },
    Disconnected,
    Offline,
    Message(ServerMessage),
    Error(String),
    ServerError(ErrorMessage),
    NicknameResponse(NicknameResponse),
    GameUpdate(GameUpdate),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not connected to server")]
    NotConnected,
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Connection to the relay with bounded linear reconnects and an explicit
/// offline fallback.
///
/// Nothing happens in the background: `update(now)` polls the link and fires
/// whichever timers are due, and every observable change is published as a
/// [`ClientEvent`] to the receivers handed out by `subscribe`.
pub struct ServerClient {
    config: ClientConfig,
    connector: Option<Box<dyn Connector>>,
    link: Option<Box<dyn Link>>,
    state: ConnectionState,
    reconnect_attempts: u32,
    reconnect_at: Option<Instant>,
    simulated_connect_at: Option<Instant>,
    simulated_replies: VecDeque<(Instant, ServerMessage)>,
    events: EventBus<ClientEvent>,
}

impl ServerClient {
    pub fn new(config: ClientConfig, mode: TransportMode) -> Self {
        let connector: Option<Box<dyn Connector>> = match mode {
            TransportMode::Real(addr) => {
                Some(Box::new(TcpConnector::new(addr, config.connect_timeout)))
            }
            TransportMode::Simulated => None,
        };
        Self::build(config, connector)
    }

    pub fn with_connector(config: ClientConfig, connector: Box<dyn Connector>) -> Self {
        Self::build(config, Some(connector))
    }

    fn build(config: ClientConfig, connector: Option<Box<dyn Connector>>) -> Self {
        Self {
            config,
            connector,
            link: None,
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            reconnect_at: None,
            simulated_connect_at: None,
            simulated_replies: VecDeque::new(),
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_offline(&self) -> bool {
        self.state == ConnectionState::Offline
    }

    pub fn is_simulated(&self) -> bool {
        self.connector.is_none()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn next_reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Opens a real connection, or enters Offline when there is no transport.
    /// A manual connect starts a fresh retry budget.
    pub fn connect(&mut self, now: Instant) {
        self.cancel_timers();
        self.reconnect_attempts = 0;
        if let Some(mut link) = self.link.take() {
            link.close();
        }

        if self.connector.is_none() {
            self.enter_offline(now);
            return;
        }
        self.open_link(now);
    }

    /// Closes the connection and cancels every pending timer. No reconnect
    /// follows a manual disconnect.
    pub fn disconnect(&mut self) {
        self.cancel_timers();
        if let Some(mut link) = self.link.take() {
            link.close();
        }

        if self.state != ConnectionState::Disconnected {
            log::info!("Disconnected from server");
            self.state = ConnectionState::Disconnected;
            self.events.publish(ClientEvent::Disconnected);
        }
    }

    pub fn update(&mut self, now: Instant) {
        self.poll_link(now);

        if self.reconnect_at.is_some_and(|at| now >= at) {
            self.reconnect_at = None;
            self.open_link(now);
        }

        if self.simulated_connect_at.is_some_and(|at| now >= at) {
            self.simulated_connect_at = None;
            log::info!("Offline mode ready");
            self.events.publish(ClientEvent::Connected { simulated: true });
        }

        while self
            .simulated_replies
            .front()
            .is_some_and(|(due, _)| now >= *due)
        {
            if let Some((_, message)) = self.simulated_replies.pop_front() {
                self.dispatch(message);
            }
        }
    }

    pub fn send(&mut self, message: &ClientMessage, now: Instant) -> Result<(), ClientError> {
        match self.state {
            ConnectionState::Connected => {
                let payload = message.encode()?;
                let link = self.link.as_mut().ok_or(ClientError::NotConnected)?;
                link.send(&payload)?;
                log::debug!("Sent {}", message.kind());
                Ok(())
            }
            ConnectionState::Offline => {
                self.simulate_response(message, now);
                Ok(())
            }
            _ => {
                log::warn!("Cannot send {}: not connected to server", message.kind());
                Err(ClientError::NotConnected)
            }
        }
    }

    pub fn send_nickname(&mut self, nickname: &str, now: Instant) -> Result<(), ClientError> {
        self.send(&ClientMessage::set_nickname(nickname), now)
    }

    pub fn send_game_action(&mut self, action: Action, now: Instant) -> Result<(), ClientError> {
        self.send(&ClientMessage::game_action(action), now)
    }

    fn open_link(&mut self, now: Instant) {
        let Some(connector) = self.connector.as_mut() else {
            return;
        };

        self.state = ConnectionState::Connecting;
        log::info!("Connecting to {}", connector.target());

        match connector.open() {
            Ok(link) => self.link = Some(link),
            Err(e) => {
                log::error!("Failed to connect to server: {}", e);
                self.events.publish(ClientEvent::Error(e.to_string()));
                self.link_lost(now);
            }
        }
    }

    fn poll_link(&mut self, now: Instant) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        for event in link.poll() {
            match event {
                LinkEvent::Opened => {
                    log::info!("Connected to server");
                    self.state = ConnectionState::Connected;
                    self.reconnect_attempts = 0;
                    self.events.publish(ClientEvent::Connected { simulated: false });
                }
                LinkEvent::Frame(frame) => self.handle_frame(&frame),
                LinkEvent::Error(message) => {
                    log::error!("Connection error: {}", message);
                    self.events.publish(ClientEvent::Error(message));
                }
                LinkEvent::Closed => {
                    self.link = None;
                    self.link_lost(now);
                    return;
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        match ServerMessage::decode(frame) {
            Ok(message) => self.dispatch(message),
            Err(ProtocolError::UnknownType(kind)) => {
                log::info!("Unhandled message type: {:?}", kind);
            }
            Err(e) => log::error!("Error parsing message: {}", e),
        }
    }

    fn dispatch(&mut self, message: ServerMessage) {
        log::debug!("Received {}", message.kind());
        self.events.publish(ClientEvent::Message(message.clone()));

        let event = match message {
            ServerMessage::NicknameResponse(response) => ClientEvent::NicknameResponse(response),
            ServerMessage::GameUpdate(update) => ClientEvent::GameUpdate(update),
            ServerMessage::Error(error) => ClientEvent::ServerError(error),
        };
        self.events.publish(event);
    }

    fn link_lost(&mut self, now: Instant) {
        log::info!("Disconnected from server");
        self.state = ConnectionState::Disconnected;
        self.events.publish(ClientEvent::Disconnected);

        if self.reconnect_attempts < self.config.max_reconnect_attempts {
            self.reconnect_attempts += 1;
            let delay = self.config.reconnect_delay_for(self.reconnect_attempts);
            log::info!(
                "Attempting to reconnect ({}/{}) in {:?}",
                self.reconnect_attempts,
                self.config.max_reconnect_attempts,
                delay
            );
            self.state = ConnectionState::Reconnecting;
            self.reconnect_at = Some(now + delay);
        } else {
            log::warn!("Max reconnection attempts reached. Switching to offline mode.");
            self.enter_offline(now);
        }
    }

    fn enter_offline(&mut self, now: Instant) {
        log::info!("Running in offline mode (no server connection)");
        self.state = ConnectionState::Offline;
        self.simulated_connect_at = Some(now + OFFLINE_CONNECT_DELAY);
        self.events.publish(ClientEvent::Offline);
    }

    fn simulate_response(&mut self, message: &ClientMessage, now: Instant) {
        match message {
            ClientMessage::SetNickname { nickname, .. } => {
                let response = NicknameResponse::accepted(
                    "Nickname set successfully (offline mode)",
                    nickname,
                    &format!("offline_{}", random_token(9)),
                );
                self.simulated_replies.push_back((
                    now + OFFLINE_RESPONSE_DELAY,
                    ServerMessage::NicknameResponse(response),
                ));
            }
            ClientMessage::GameAction { .. } => {
                log::debug!("Offline mode: dropping game action");
            }
        }
    }

    fn cancel_timers(&mut self) {
        self.reconnect_at = None;
        self.simulated_connect_at = None;
        self.simulated_replies.clear();
    }
}
