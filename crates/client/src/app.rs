use std::rc::Rc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use bomber::{Action, GameUpdate, NicknameResponse};
use crossterm::event::{KeyCode, KeyModifiers};
use serde_json::{Value, json};

use crate::frame::{FrameEvent, FrameSnapshot, FrameState, GameRenderer, Mount};
use crate::net::{ClientEvent, ConnectionState, ServerClient};
use crate::screen::{GameStateManager, IdentityPatch, Screen, ScreenChange};

const INVALID_NICKNAME: &str = "Invalid nickname. Please check the requirements.";
const CONNECTION_LOST: &str = "Connection lost. Please try again.";
const LOADING_MESSAGE: &str = "Connecting to game...";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NicknameForm {
    pub input: String,
    pub error: Option<String>,
    pub is_loading: bool,
}

/// Everything on screen. The renderer owns it; input and network events go
/// through `GameRenderer::modify_state`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub screen: Screen,
    pub form: NicknameForm,
    pub connection: ConnectionState,
    pub game: FrameState,
}

impl FrameSnapshot for ViewState {
    fn set_fps(&mut self, fps: u32) {
        self.game.set_fps(fps);
    }
}

/// What gets mounted on the terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum Scene {
    Nickname {
        form: NicknameForm,
        connection: ConnectionState,
    },
    Loading {
        message: String,
    },
    Game(FrameState),
}

impl Scene {
    pub fn from_view(view: &ViewState) -> Self {
        match view.screen {
            Screen::Nickname => Scene::Nickname {
                form: view.form.clone(),
                connection: view.connection,
            },
            Screen::Loading => Scene::Loading {
                message: LOADING_MESSAGE.to_string(),
            },
            Screen::Game => Scene::Game(view.game.clone()),
        }
    }
}

fn advance(view: &ViewState, dt: f32) -> Option<ViewState> {
    if view.screen != Screen::Game {
        return None;
    }
    let mut next = view.clone();
    next.game = std::mem::take(&mut next.game).apply(FrameEvent::Tick(dt));
    Some(next)
}

/// Hands back the previous scene while the view is unchanged, so the mount
/// only sees a new tree when something visible moved.
fn memoized_scene() -> impl FnMut(&ViewState, f32) -> Rc<Scene> {
    let mut last: Option<(ViewState, Rc<Scene>)> = None;
    move |view: &ViewState, _dt: f32| {
        if let Some((seen, scene)) = &last
            && seen == view
        {
            return Rc::clone(scene);
        }
        let scene = Rc::new(Scene::from_view(view));
        last = Some((view.clone(), Rc::clone(&scene)));
        scene
    }
}

pub struct App<M: Mount<Scene>> {
    manager: GameStateManager,
    client: ServerClient,
    client_events: Receiver<ClientEvent>,
    screen_events: Receiver<ScreenChange>,
    renderer: GameRenderer<ViewState, Scene, M>,
    should_quit: bool,
}

impl<M: Mount<Scene>> App<M> {
    pub fn new(mut client: ServerClient, mount: M, target_fps: u32) -> Self {
        let mut manager = GameStateManager::new();
        let client_events = client.subscribe();
        let screen_events = manager.subscribe_screen();

        let view = ViewState {
            connection: client.state(),
            ..Default::default()
        };
        let mut renderer = GameRenderer::new(mount, view, target_fps);
        renderer.set_update_fn(advance);
        renderer.set_render_fn(memoized_scene());

        Self {
            manager,
            client,
            client_events,
            screen_events,
            renderer,
            should_quit: false,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.client.connect(now);
        self.sync_connection();
        self.renderer.start(now);
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn view(&self) -> &ViewState {
        self.renderer.state()
    }

    pub fn manager(&self) -> &GameStateManager {
        &self.manager
    }

    pub fn client(&self) -> &ServerClient {
        &self.client
    }

    pub fn mount(&self) -> &M {
        self.renderer.mount()
    }

    pub fn fps(&self) -> u32 {
        self.renderer.fps()
    }

    pub fn time_until_next_frame(&self, now: Instant) -> Duration {
        self.renderer.time_until_next_frame(now)
    }

    /// One pass of the client: network, screen bookkeeping, then a frame if due.
    pub fn pump(&mut self, now: Instant) {
        self.client.update(now);

        let events: Vec<ClientEvent> = self.client_events.try_iter().collect();
        for event in events {
            self.handle_client_event(event);
        }

        for change in self.screen_events.try_iter() {
            log::info!("Screen changed from {} to {}", change.previous, change.screen);
        }

        self.renderer.tick(now);
    }

    pub fn redraw(&mut self) {
        if let Err(e) = self.renderer.remount() {
            log::error!("Redraw failed: {:#}", e);
        }
    }

    pub fn shutdown(&mut self) {
        self.renderer.stop();
        self.client.disconnect();
    }

    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers, now: Instant) {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        match self.manager.current_screen() {
            Screen::Nickname => self.handle_nickname_key(code, now),
            Screen::Loading => {
                if code == KeyCode::Esc {
                    self.should_quit = true;
                }
            }
            Screen::Game => match code {
                KeyCode::Char(' ') => self.place_bomb(now),
                KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
                _ => {}
            },
        }
    }

    fn handle_nickname_key(&mut self, code: KeyCode, now: Instant) {
        match code {
            KeyCode::Enter => self.submit_nickname(now),
            KeyCode::Backspace => self.renderer.modify_state(|mut view| {
                view.form.input.pop();
                view.form.error = None;
                view
            }),
            KeyCode::Char(c) => self.renderer.modify_state(|mut view| {
                view.form.input.push(c);
                view.form.error = None;
                view
            }),
            KeyCode::Esc => self.should_quit = true,
            _ => {}
        }
    }

    pub fn submit_nickname(&mut self, now: Instant) {
        if self.renderer.state().form.is_loading {
            return;
        }

        let input = self.renderer.state().form.input.clone();
        let nickname = match self.manager.canonical_nickname(&input) {
            Ok(nickname) => nickname,
            Err(e) => {
                log::warn!("Rejected nickname {:?}: {}", input, e);
                self.set_form_error(INVALID_NICKNAME.to_string());
                return;
            }
        };

        if let Err(e) = self.client.send_nickname(&nickname, now) {
            log::warn!("Could not submit nickname: {}", e);
            self.set_form_error(e.to_string());
            return;
        }

        self.renderer.modify_state(|mut view| {
            view.form.is_loading = true;
            view.form.error = None;
            view
        });
        self.change_screen(Screen::Loading);
    }

    fn place_bomb(&mut self, now: Instant) {
        let player = self.renderer.state().game.player.clone();
        let owner = player.id.clone();
        self.renderer.modify_state(|mut view| {
            view.game = std::mem::take(&mut view.game).apply(FrameEvent::PlaceBomb {
                x: player.x,
                y: player.y,
                owner,
            });
            view
        });

        let Value::Object(action) = json!({
            "type": "place_bomb",
            "position": { "x": player.x, "y": player.y },
            "playerId": player.id,
        }) else {
            return;
        };
        if let Err(e) = self.client.send_game_action(action, now) {
            log::warn!("Bomb not sent: {}", e);
        }
    }

    fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Connected { .. } => self.sync_connection(),
            ClientEvent::Disconnected | ClientEvent::Offline => {
                self.sync_connection();
                // A reply to the pending nickname can no longer arrive.
                if self.manager.current_screen() == Screen::Loading {
                    self.set_form_error(CONNECTION_LOST.to_string());
                    self.change_screen(Screen::Nickname);
                }
            }
            ClientEvent::NicknameResponse(response) => self.handle_nickname_response(response),
            ClientEvent::GameUpdate(update) => self.handle_game_update(update),
            ClientEvent::ServerError(error) => {
                log::warn!("Server error: {}", error.message);
                if self.manager.current_screen() == Screen::Loading {
                    self.set_form_error(error.message);
                    self.change_screen(Screen::Nickname);
                }
            }
            ClientEvent::Error(message) => log::debug!("Connection error: {}", message),
            ClientEvent::Message(_) => {}
        }
    }

    fn handle_nickname_response(&mut self, response: NicknameResponse) {
        if !response.success {
            let message = if response.message.is_empty() {
                "Failed to set nickname. Please try again.".to_string()
            } else {
                response.message
            };
            self.set_form_error(message);
            self.change_screen(Screen::Nickname);
            return;
        }

        let nickname = response.nickname.unwrap_or_default();
        self.manager.set_identity(IdentityPatch {
            nickname: Some(nickname.clone()),
            id: response.player_id.clone(),
            is_connected: Some(self.client.is_connected()),
        });

        let status = self.client.state();
        let game = FrameState::initial(&nickname, response.player_id.as_deref(), status);
        self.renderer.modify_state(|mut view| {
            view.form.is_loading = false;
            view.game = game;
            view
        });
        self.change_screen(Screen::Game);
    }

    fn handle_game_update(&mut self, update: GameUpdate) {
        if self.manager.current_screen() != Screen::Game {
            return;
        }
        let Some((x, y)) = bomb_position(&update.action) else {
            log::debug!("Ignoring update from {}", update.from_player);
            return;
        };

        self.renderer.modify_state(|mut view| {
            view.game = std::mem::take(&mut view.game).apply(FrameEvent::PlaceBomb {
                x,
                y,
                owner: Some(update.from_player),
            });
            view
        });
    }

    fn change_screen(&mut self, screen: Screen) {
        self.manager.set_screen(screen);
        self.renderer.modify_state(|mut view| {
            view.screen = screen;
            view
        });
    }

    fn set_form_error(&mut self, message: String) {
        self.renderer.modify_state(|mut view| {
            view.form.error = Some(message);
            view.form.is_loading = false;
            view
        });
    }

    fn sync_connection(&mut self) {
        let status = self.client.state();
        self.renderer.modify_state(|mut view| {
            view.connection = status;
            view.game = std::mem::take(&mut view.game)
                .apply(FrameEvent::ConnectionChanged(status));
            view
        });
    }
}

fn bomb_position(action: &Action) -> Option<(i32, i32)> {
    if action.get("type").and_then(Value::as_str) != Some("place_bomb") {
        return None;
    }
    let position = action.get("position")?;
    let x = position.get("x")?.as_i64()?;
    let y = position.get("y")?.as_i64()?;
    Some((i32::try_from(x).ok()?, i32::try_from(y).ok()?))
}
