use crate::net::ConnectionState;

pub const BOMB_FUSE_SECS: f32 = 3.0;
pub const EXPLOSION_SECS: f32 = 0.3;
pub const TILE_SIZE: i32 = 32;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerView {
    pub x: i32,
    pub y: i32,
    pub nickname: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bomb {
    pub x: i32,
    pub y: i32,
    pub timer: f32,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Explosion {
    pub x: i32,
    pub y: i32,
    pub timer: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

impl Tile {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Everything the game screen draws. Replaced wholesale every frame by
/// [`FrameState::apply`]; never mutated through shared references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameState {
    pub player: PlayerView,
    pub bombs: Vec<Bomb>,
    pub blocks: Vec<Tile>,
    pub walls: Vec<Tile>,
    pub explosions: Vec<Explosion>,
    pub score: u32,
    pub fps: u32,
    pub connection_status: ConnectionState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    Tick(f32),
    PlaceBomb {
        x: i32,
        y: i32,
        owner: Option<String>,
    },
    ConnectionChanged(ConnectionState),
}

const START_BLOCKS: [Tile; 6] = [
    Tile::new(128, 128),
    Tile::new(160, 128),
    Tile::new(192, 128),
    Tile::new(128, 160),
    Tile::new(256, 192),
    Tile::new(320, 256),
];

const START_WALLS: [Tile; 7] = [
    Tile::new(0, 0),
    Tile::new(32, 0),
    Tile::new(64, 0),
    Tile::new(96, 0),
    Tile::new(0, 32),
    Tile::new(0, 64),
    Tile::new(0, 96),
];

impl FrameState {
    pub fn initial(nickname: &str, id: Option<&str>, status: ConnectionState) -> Self {
        Self {
            player: PlayerView {
                x: 64,
                y: 64,
                nickname: nickname.to_string(),
                id: id.map(str::to_string),
            },
            bombs: Vec::new(),
            blocks: START_BLOCKS.to_vec(),
            walls: START_WALLS.to_vec(),
            explosions: Vec::new(),
            score: 0,
            fps: 0,
            connection_status: status,
        }
    }

    pub fn apply(mut self, event: FrameEvent) -> Self {
        match event {
            FrameEvent::Tick(dt) => self.advance(dt),
            FrameEvent::PlaceBomb { x, y, owner } => {
                self.bombs.push(Bomb {
                    x,
                    y,
                    timer: BOMB_FUSE_SECS,
                    owner,
                });
            }
            FrameEvent::ConnectionChanged(status) => self.connection_status = status,
        }
        self
    }

    pub fn set_fps(&mut self, fps: u32) {
        self.fps = fps;
    }

    pub fn is_online(&self) -> bool {
        self.connection_status == ConnectionState::Connected
    }

    // Explosions spawned this tick age by the same `dt` as older ones.
    fn advance(&mut self, dt: f32) {
        let mut detonated = Vec::new();
        self.bombs.retain_mut(|bomb| {
            bomb.timer -= dt;
            if bomb.timer <= 0.0 {
                detonated.push(Explosion {
                    x: bomb.x,
                    y: bomb.y,
                    timer: EXPLOSION_SECS,
                });
                false
            } else {
                true
            }
        });
        self.explosions.extend(detonated);

        self.explosions.retain_mut(|explosion| {
            explosion.timer -= dt;
            explosion.timer > 0.0
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_bomb() -> FrameState {
        FrameState::initial("bomber42", Some("player_x_1"), ConnectionState::Connected).apply(
            FrameEvent::PlaceBomb {
                x: 64,
                y: 64,
                owner: Some("player_x_1".into()),
            },
        )
    }

    #[test]
    fn test_initial_layout() {
        let state = FrameState::initial("bomber42", None, ConnectionState::Offline);
        assert_eq!((state.player.x, state.player.y), (64, 64));
        assert_eq!(state.blocks.len(), 6);
        assert_eq!(state.walls.len(), 7);
        assert!(!state.is_online());
    }

    #[test]
    fn test_bomb_fuse_counts_down() {
        let state = with_bomb().apply(FrameEvent::Tick(1.0));
        assert_eq!(state.bombs.len(), 1);
        assert!((state.bombs[0].timer - 2.0).abs() < 1e-6);
        assert!(state.explosions.is_empty());
    }

    #[test]
    fn test_bomb_becomes_explosion() {
        let state = with_bomb()
            .apply(FrameEvent::Tick(2.95))
            .apply(FrameEvent::Tick(0.1));

        assert!(state.bombs.is_empty());
        assert_eq!(state.explosions.len(), 1);
        // Aged by the detonating tick as well.
        assert!((state.explosions[0].timer - (EXPLOSION_SECS - 0.1)).abs() < 1e-5);
    }

    #[test]
    fn test_explosion_expires() {
        let state = with_bomb()
            .apply(FrameEvent::Tick(2.9))
            .apply(FrameEvent::Tick(0.15))
            .apply(FrameEvent::Tick(0.1));
        assert_eq!(state.explosions.len(), 1);

        let state = state.apply(FrameEvent::Tick(0.1));
        assert!(state.explosions.is_empty());
    }

    #[test]
    fn test_connection_change() {
        let state =
            FrameState::default().apply(FrameEvent::ConnectionChanged(ConnectionState::Connected));
        assert!(state.is_online());
    }
}
