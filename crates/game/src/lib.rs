pub mod net;
pub mod nickname;
pub mod relay;

pub use net::{
    Action, ClientMessage, ConnectionInfo, DEFAULT_PORT, DisconnectReason, ErrorMessage,
    FrameDecoder, GameUpdate, NetworkStats, NicknameResponse, ProtocolError, RelayServer,
    ServerConfig, ServerEvent, ServerMessage, ServerStats, now_ms,
};
pub use nickname::NicknameError;
pub use relay::{ConnectionId, Outbound, Player, PlayerId, PlayerRegistry, Relay};
