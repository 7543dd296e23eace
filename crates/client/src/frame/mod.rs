pub mod clock;
pub mod renderer;
pub mod state;

pub use clock::{DEFAULT_TARGET_FPS, FrameHandler, GameLoop, MAX_TARGET_FPS};
pub use renderer::{FrameSnapshot, GameRenderer, Mount};
pub use state::{Bomb, Explosion, FrameEvent, FrameState, PlayerView, Tile};
