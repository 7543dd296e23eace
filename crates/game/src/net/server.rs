use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::relay::{ConnectionId, Outbound, Player, Relay};

use super::events::{DisconnectReason, ServerEvent};
use super::framing::{FrameDecoder, encode_frame};
use super::protocol::ServerMessage;
use super::stats::NetworkStats;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_clients: usize,
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 64,
            poll_interval: Duration::from_millis(1),
        }
    }
}

struct Peer {
    stream: TcpStream,
    addr: SocketAddr,
    decoder: FrameDecoder,
    outbox: Vec<u8>,
    connected_at: Instant,
    closing: Option<DisconnectReason>,
}

impl Peer {
    fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            decoder: FrameDecoder::new(),
            outbox: Vec::new(),
            connected_at: Instant::now(),
            closing: None,
        }
    }

    /// Reads everything currently available and returns the complete frames.
    fn read_frames(&mut self, stats: &mut NetworkStats) -> Vec<Vec<u8>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.closing = Some(DisconnectReason::Closed);
                    break;
                }
                Ok(n) => self.decoder.push(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("Stream error from {}: {}", self.addr, e);
                    self.closing = Some(DisconnectReason::Error);
                    break;
                }
            }
        }

        let mut frames = Vec::new();
        loop {
            match self.decoder.next_frame() {
                Ok(Some(frame)) => {
                    stats.record_received(frame.len());
                    frames.push(frame);
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("Dropping {}: {}", self.addr, e);
                    stats.malformed_frames += 1;
                    self.closing = Some(DisconnectReason::Error);
                    break;
                }
            }
        }
        frames
    }

    fn flush(&mut self) {
        while !self.outbox.is_empty() {
            match self.stream.write(&self.outbox) {
                Ok(0) => {
                    self.closing.get_or_insert(DisconnectReason::Closed);
                    return;
                }
                Ok(n) => {
                    self.outbox.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("Failed to write to {}: {}", self.addr, e);
                    self.closing.get_or_insert(DisconnectReason::Error);
                    return;
                }
            }
        }
    }
}

/// Single-threaded relay host: one non-blocking listener and one non-blocking
/// stream per client, all driven from `tick_once`.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    relay: Relay,
    peers: HashMap<ConnectionId, Peer>,
    config: ServerConfig,
    stats: NetworkStats,
    running: Arc<AtomicBool>,
    start_time: Instant,
    pending_events: VecDeque<ServerEvent>,
}

impl RelayServer {
    pub fn bind<A: ToSocketAddrs>(addr: A, config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            relay: Relay::new(),
            peers: HashMap::new(),
            config,
            stats: NetworkStats::default(),
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
            pending_events: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            std::thread::sleep(self.config.poll_interval);
        }
        self.shutdown_connections();
    }

    pub fn tick_once(&mut self) {
        self.accept_connections();

        let mut ids: Vec<ConnectionId> = self.peers.keys().copied().collect();
        ids.sort_unstable();

        // Frames from one connection are handled in arrival order; connections
        // are visited in id order.
        for id in &ids {
            let frames = match self.peers.get_mut(id) {
                Some(peer) => peer.read_frames(&mut self.stats),
                None => continue,
            };

            for frame in frames {
                let outbound = self.relay.handle_frame(*id, &frame);
                self.route(outbound);
            }

            // A closed peer releases its nickname before later peers are read.
            if let Some(reason) = self.peers.get(id).and_then(|peer| peer.closing) {
                self.drop_peer(*id, reason);
            }
        }

        for peer in self.peers.values_mut() {
            peer.flush();
        }

        let closed: Vec<(ConnectionId, DisconnectReason)> = self
            .peers
            .iter()
            .filter_map(|(&id, peer)| peer.closing.map(|reason| (id, reason)))
            .collect();
        for (id, reason) in closed {
            self.drop_peer(id, reason);
        }

        self.collect_relay_events();
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.admit(stream, addr),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.pending_events.push_back(ServerEvent::Error {
                        message: format!("Accept failed: {}", e),
                    });
                    break;
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.peers.len() >= self.config.max_clients {
            log::warn!("Refusing {}: server full", addr);
            if let Ok(frame) = ServerMessage::error("Server full")
                .encode()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
                .and_then(|payload| encode_frame(&payload))
            {
                let mut stream = stream;
                let _ = stream.write_all(&frame);
            }
            self.pending_events.push_back(ServerEvent::ConnectionDenied {
                addr,
                reason: "Server full".to_string(),
            });
            return;
        }

        if let Err(e) = stream.set_nonblocking(true) {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("Could not configure socket for {}: {}", addr, e),
            });
            return;
        }
        let _ = stream.set_nodelay(true);

        let connection = self.relay.open_connection();
        self.peers.insert(connection, Peer::new(stream, addr));

        log::info!("New client connected from {} (connection {})", addr, connection);
        self.pending_events
            .push_back(ServerEvent::ClientConnected { connection, addr });
    }

    fn route(&mut self, outbound: Vec<Outbound>) {
        for Outbound { to, message } in outbound {
            let Some(peer) = self.peers.get_mut(&to) else {
                continue;
            };
            if peer.closing.is_some() {
                continue;
            }

            let frame = message
                .encode()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
                .and_then(|payload| encode_frame(&payload));
            match frame {
                Ok(frame) => {
                    self.stats.record_sent(frame.len());
                    peer.outbox.extend_from_slice(&frame);
                }
                Err(e) => {
                    self.pending_events.push_back(ServerEvent::Error {
                        message: format!("Failed to encode {} for {}: {}", message.kind(), to, e),
                    });
                }
            }
        }
    }

    fn drop_peer(&mut self, connection: ConnectionId, reason: DisconnectReason) {
        if let Some(peer) = self.peers.remove(&connection) {
            let _ = peer.stream.shutdown(Shutdown::Both);
            log::info!("Client {} disconnected ({})", peer.addr, reason.as_str());
        }
        self.relay.close_connection(connection, reason);
        self.pending_events
            .push_back(ServerEvent::ClientDisconnected { connection, reason });
    }

    fn collect_relay_events(&mut self) {
        self.pending_events.extend(self.relay.drain_events());
    }

    pub fn kick(&mut self, connection: ConnectionId) {
        if let Some(peer) = self.peers.get_mut(&connection) {
            peer.flush();
        }
        if self.peers.contains_key(&connection) {
            self.drop_peer(connection, DisconnectReason::Kicked);
            self.collect_relay_events();
        }
    }

    pub fn shutdown_connections(&mut self) {
        let ids: Vec<ConnectionId> = self.peers.keys().copied().collect();
        for id in ids {
            if let Some(peer) = self.peers.get_mut(&id) {
                peer.flush();
            }
            self.drop_peer(id, DisconnectReason::Shutdown);
        }
        self.collect_relay_events();
    }

    pub fn player_count(&self) -> usize {
        self.relay.player_count()
    }

    pub fn player_list(&self) -> Vec<Player> {
        self.relay.player_list()
    }

    pub fn connection_infos(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .peers
            .iter()
            .map(|(&connection, peer)| ConnectionInfo {
                connection,
                addr: peer.addr,
                player: self.relay.player_for(connection).cloned(),
                connected_secs: peer.connected_at.elapsed().as_secs(),
            })
            .collect();
        infos.sort_by_key(|info| info.connection);
        infos
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            connection_count: self.peers.len(),
            player_count: self.relay.player_count(),
            max_clients: self.config.max_clients,
            network_stats: self.stats.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection: ConnectionId,
    pub addr: SocketAddr,
    pub player: Option<Player>,
    pub connected_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub uptime_secs: u64,
    pub connection_count: usize,
    pub player_count: usize,
    pub max_clients: usize,
    pub network_stats: NetworkStats,
}
