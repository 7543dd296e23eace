pub mod client;
pub mod config;
pub mod transport;

pub use client::{
    ClientError, ClientEvent, ConnectionState, OFFLINE_CONNECT_DELAY, OFFLINE_RESPONSE_DELAY,
    ServerClient, TransportMode,
};
pub use config::ClientConfig;
pub use transport::{Connector, Link, LinkEvent, TcpConnector, TcpLink};
