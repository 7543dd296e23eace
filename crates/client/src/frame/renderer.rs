use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use super::clock::{FrameHandler, GameLoop};
use super::state::FrameState;

/// Presents a tree on some surface. Mounting the same tree twice must leave
/// the surface unchanged.
pub trait Mount<T: ?Sized> {
    fn mount(&mut self, tree: &T) -> anyhow::Result<()>;
}

impl<T: ?Sized, M: Mount<T>> Mount<T> for Rc<RefCell<M>> {
    fn mount(&mut self, tree: &T) -> anyhow::Result<()> {
        self.borrow_mut().mount(tree)
    }
}

/// State types that carry the measured frame rate.
pub trait FrameSnapshot {
    fn set_fps(&mut self, fps: u32);
}

impl FrameSnapshot for FrameState {
    fn set_fps(&mut self, fps: u32) {
        FrameState::set_fps(self, fps);
    }
}

pub type UpdateFn<S> = Box<dyn FnMut(&S, f32) -> Option<S>>;
pub type RenderFn<S, T> = Box<dyn FnMut(&S, f32) -> Rc<T>>;

struct RenderBinding<S, T, M> {
    state: S,
    update_fn: Option<UpdateFn<S>>,
    render_fn: Option<RenderFn<S, T>>,
    current_tree: Option<Rc<T>>,
    mount: M,
    mount_count: u64,
}

impl<S, T, M> FrameHandler for RenderBinding<S, T, M>
where
    S: FrameSnapshot,
    M: Mount<T>,
{
    fn update(&mut self, dt: f32) -> anyhow::Result<()> {
        if let Some(update) = self.update_fn.as_mut()
            && let Some(next) = update(&self.state, dt)
        {
            self.state = next;
        }
        Ok(())
    }

    fn render(&mut self, dt: f32) -> anyhow::Result<()> {
        let Some(render) = self.render_fn.as_mut() else {
            return Ok(());
        };

        let tree = render(&self.state, dt);
        let unchanged = self
            .current_tree
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, &tree));
        if unchanged {
            return Ok(());
        }

        self.mount.mount(&tree)?;
        self.current_tree = Some(tree);
        self.mount_count += 1;
        Ok(())
    }

    fn on_fps(&mut self, fps: u32) {
        self.state.set_fps(fps);
    }
}

/// Binds a state value, a pure update function and a pure render function
/// to a [`GameLoop`]. The render output is handed to the mount only when it
/// is a different allocation from the last mounted tree; equal trees that
/// were built separately are mounted again.
pub struct GameRenderer<S, T, M> {
    game_loop: GameLoop,
    binding: RenderBinding<S, T, M>,
}

impl<S, T, M> GameRenderer<S, T, M>
where
    S: FrameSnapshot,
    M: Mount<T>,
{
    pub fn new(mount: M, state: S, target_fps: u32) -> Self {
        Self {
            game_loop: GameLoop::new(target_fps),
            binding: RenderBinding {
                state,
                update_fn: None,
                render_fn: None,
                current_tree: None,
                mount,
                mount_count: 0,
            },
        }
    }

    pub fn set_update_fn<F>(&mut self, update: F)
    where
        F: FnMut(&S, f32) -> Option<S> + 'static,
    {
        self.binding.update_fn = Some(Box::new(update));
    }

    pub fn set_render_fn<F>(&mut self, render: F)
    where
        F: FnMut(&S, f32) -> Rc<T> + 'static,
    {
        self.binding.render_fn = Some(Box::new(render));
    }

    pub fn start(&mut self, now: Instant) {
        self.game_loop.start(now);
    }

    pub fn stop(&mut self) {
        self.game_loop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.game_loop.is_running()
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        self.game_loop.tick(now, &mut self.binding)
    }

    pub fn time_until_next_frame(&self, now: Instant) -> Duration {
        self.game_loop.time_until_next_frame(now)
    }

    pub fn fps(&self) -> u32 {
        self.game_loop.fps()
    }

    pub fn state(&self) -> &S {
        &self.binding.state
    }

    pub fn set_state(&mut self, state: S) {
        self.binding.state = state;
    }

    /// Replaces the state with `f(state)`, for changes driven from outside
    /// the frame loop (input, network events).
    pub fn modify_state<F>(&mut self, f: F)
    where
        S: Default,
        F: FnOnce(S) -> S,
    {
        let state = std::mem::take(&mut self.binding.state);
        self.binding.state = f(state);
    }

    /// Mounts the last tree again, e.g. after the surface was resized.
    pub fn remount(&mut self) -> anyhow::Result<()> {
        match &self.binding.current_tree {
            Some(tree) => self.binding.mount.mount(tree),
            None => Ok(()),
        }
    }

    pub fn mount_count(&self) -> u64 {
        self.binding.mount_count
    }

    pub fn mount(&self) -> &M {
        &self.binding.mount
    }

    pub fn mount_mut(&mut self) -> &mut M {
        &mut self.binding.mount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::state::FrameEvent;
    use crate::net::ConnectionState;

    #[derive(Default)]
    struct Recording {
        mounted: Vec<String>,
    }

    impl Mount<String> for Recording {
        fn mount(&mut self, tree: &String) -> anyhow::Result<()> {
            self.mounted.push(tree.clone());
            Ok(())
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    type Shared = Rc<RefCell<Recording>>;

    fn renderer() -> (GameRenderer<FrameState, String, Shared>, Shared) {
        let surface = Rc::new(RefCell::new(Recording::default()));
        let state = FrameState::initial("bomber42", None, ConnectionState::Offline);
        (GameRenderer::new(Rc::clone(&surface), state, 50), surface)
    }

    #[test]
    fn test_update_result_replaces_state() {
        let (mut renderer, _) = renderer();
        renderer.set_update_fn(|state, _| {
            Some(FrameState {
                score: state.score + 1,
                ..state.clone()
            })
        });

        let start = Instant::now();
        renderer.start(start);
        renderer.tick(start + ms(20));
        renderer.tick(start + ms(40));
        assert_eq!(renderer.state().score, 2);
    }

    #[test]
    fn test_update_yielding_nothing_keeps_state() {
        let (mut renderer, _) = renderer();
        renderer.set_update_fn(|_, _| None);

        let before = renderer.state().clone();
        let start = Instant::now();
        renderer.start(start);
        assert!(renderer.tick(start + ms(20)));
        assert_eq!(renderer.state(), &before);
    }

    #[test]
    fn test_same_tree_mounted_once() {
        let (mut renderer, surface) = renderer();
        let tree = Rc::new("board".to_string());
        let shared = Rc::clone(&tree);
        renderer.set_render_fn(move |_, _| Rc::clone(&shared));

        let start = Instant::now();
        renderer.start(start);
        for i in 1..=5 {
            renderer.tick(start + ms(20 * i));
        }
        assert_eq!(renderer.mount_count(), 1);
        assert_eq!(surface.borrow().mounted, vec!["board".to_string()]);
    }

    #[test]
    fn test_equal_but_fresh_tree_mounted_again() {
        let (mut renderer, surface) = renderer();
        renderer.set_render_fn(|state, _| Rc::new(format!("score {}", state.score)));

        let start = Instant::now();
        renderer.start(start);
        renderer.tick(start + ms(20));
        renderer.tick(start + ms(40));
        assert_eq!(renderer.mount_count(), 2);
        assert_eq!(surface.borrow().mounted.len(), 2);
    }

    #[test]
    fn test_fps_written_into_state() {
        let (mut renderer, _) = renderer();
        renderer.set_update_fn(|state, dt| Some(state.clone().apply(FrameEvent::Tick(dt))));

        let start = Instant::now();
        renderer.start(start);
        for i in 1..=50 {
            renderer.tick(start + ms(20 * i));
        }
        assert_eq!(renderer.fps(), 50);
        assert_eq!(renderer.state().fps, 50);
    }

    #[test]
    fn test_modify_state_outside_loop() {
        let (mut renderer, _) = renderer();
        renderer.modify_state(|state| {
            state.apply(FrameEvent::PlaceBomb {
                x: 64,
                y: 64,
                owner: None,
            })
        });
        assert_eq!(renderer.state().bombs.len(), 1);
    }

    #[test]
    fn test_failed_mount_retried_next_frame() {
        struct Flaky {
            fail_next: bool,
            mounted: u32,
        }

        impl Mount<String> for Flaky {
            fn mount(&mut self, _tree: &String) -> anyhow::Result<()> {
                if std::mem::take(&mut self.fail_next) {
                    anyhow::bail!("surface gone");
                }
                self.mounted += 1;
                Ok(())
            }
        }

        let mount = Flaky {
            fail_next: true,
            mounted: 0,
        };
        let mut renderer = GameRenderer::new(mount, FrameState::default(), 50);
        let tree = Rc::new("board".to_string());
        renderer.set_render_fn(move |_, _| Rc::clone(&tree));

        let start = Instant::now();
        renderer.start(start);
        renderer.tick(start + ms(20));
        assert_eq!(renderer.mount().mounted, 0);
        renderer.tick(start + ms(40));
        assert_eq!(renderer.mount().mounted, 1);
        assert!(renderer.is_running());
    }
}
