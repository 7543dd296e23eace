mod registry;
mod session;

pub use registry::{Player, PlayerId, PlayerRegistry};
pub use session::{ConnectionId, Outbound, Relay};
