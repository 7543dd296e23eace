pub mod app;
pub mod events;
pub mod frame;
pub mod net;
pub mod screen;
pub mod tui;

pub use app::{App, Scene, ViewState};
pub use events::EventBus;
pub use frame::{FrameEvent, FrameHandler, FrameState, GameLoop, GameRenderer, Mount};
pub use net::{
    ClientConfig, ClientError, ClientEvent, ConnectionState, ServerClient, TransportMode,
};
pub use screen::{GameStateManager, Identity, IdentityPatch, Screen, ScreenChange};
