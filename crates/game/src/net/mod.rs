mod events;
mod framing;
mod protocol;
mod server;
mod stats;

pub use events::{DisconnectReason, ServerEvent};
pub use framing::{FrameDecoder, MAX_MESSAGE_SIZE, encode_frame, read_frame, write_frame};
pub use protocol::{
    Action, ClientMessage, DEFAULT_PORT, ErrorMessage, GameUpdate, NicknameResponse,
    ProtocolError, ServerMessage, now_ms,
};
pub use server::{ConnectionInfo, RelayServer, ServerConfig, ServerStats};
pub use stats::{NetworkStats, rand_u64, random_token};
