use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

pub const DEFAULT_TARGET_FPS: u32 = 60;
pub const MAX_TARGET_FPS: u32 = 1000;

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Callbacks driven by [`GameLoop::tick`]. `dt` is the elapsed time since the
/// previous dispatched frame, in seconds.
pub trait FrameHandler {
    fn update(&mut self, dt: f32) -> anyhow::Result<()>;
    fn render(&mut self, dt: f32) -> anyhow::Result<()>;
    fn on_fps(&mut self, _fps: u32) {}
}

/// Fixed-timestep frame scheduler.
///
/// The host calls `tick` as often as it likes (every terminal poll, every
/// vsync, ...). A frame is dispatched only once a full frame interval has
/// elapsed, and the part of the elapsed time beyond a whole number of
/// intervals is carried into the next frame, so the long-run cadence matches
/// the target rate regardless of how irregularly `tick` is called.
#[derive(Debug, Clone)]
pub struct GameLoop {
    running: bool,
    target_fps: u32,
    frame_interval: Duration,
    last_time: Instant,
    frame_count: u32,
    last_fps_update: Instant,
    current_fps: u32,
}

impl Default for GameLoop {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_FPS)
    }
}

impl GameLoop {
    pub fn new(target_fps: u32) -> Self {
        let target_fps = target_fps.clamp(1, MAX_TARGET_FPS);
        let now = Instant::now();
        Self {
            running: false,
            target_fps,
            frame_interval: Duration::from_nanos(1_000_000_000 / target_fps as u64),
            last_time: now,
            frame_count: 0,
            last_fps_update: now,
            current_fps: 0,
        }
    }

    /// Starts scheduling from `now`. Calling it again while running does nothing.
    pub fn start(&mut self, now: Instant) {
        if self.running {
            return;
        }
        self.running = true;
        self.last_time = now;
        self.last_fps_update = now;
        self.frame_count = 0;
    }

    /// Prevents further frames. A frame already inside `tick` runs to the end.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    pub fn fps(&self) -> u32 {
        self.current_fps
    }

    /// How long the host may sleep before the next frame becomes due.
    pub fn time_until_next_frame(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last_time);
        self.frame_interval.saturating_sub(elapsed)
    }

    /// Dispatches at most one frame. Returns whether `update`/`render` ran.
    pub fn tick<H: FrameHandler + ?Sized>(&mut self, now: Instant, handler: &mut H) -> bool {
        if !self.running {
            return false;
        }

        let delta = now.saturating_duration_since(self.last_time);
        if delta < self.frame_interval {
            return false;
        }

        let dt = delta.as_secs_f32();
        guarded("update", || handler.update(dt));
        guarded("render", || handler.render(dt));
        self.update_fps(now, handler);

        let interval = self.frame_interval.as_nanos();
        let remainder = delta.as_nanos() % interval;
        self.last_time = now - Duration::from_nanos(remainder as u64);

        true
    }

    fn update_fps<H: FrameHandler + ?Sized>(&mut self, now: Instant, handler: &mut H) {
        self.frame_count += 1;

        let window = now.saturating_duration_since(self.last_fps_update);
        if window >= FPS_WINDOW {
            let millis = window.as_secs_f64() * 1000.0;
            self.current_fps = (self.frame_count as f64 * 1000.0 / millis).round() as u32;
            handler.on_fps(self.current_fps);

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

/// Runs one callback, logging an `Err` or a panic instead of letting it
/// escape the loop.
fn guarded<F: FnOnce() -> anyhow::Result<()>>(stage: &str, f: F) {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::error!("Error in {} callback: {:#}", stage, e),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("Panic in {} callback: {}", stage, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        updates: Vec<f32>,
        renders: u32,
        fps: Vec<u32>,
        fail_update: bool,
        panic_render: bool,
    }

    impl FrameHandler for Recorder {
        fn update(&mut self, dt: f32) -> anyhow::Result<()> {
            self.updates.push(dt);
            if self.fail_update {
                anyhow::bail!("update failed");
            }
            Ok(())
        }

        fn render(&mut self, _dt: f32) -> anyhow::Result<()> {
            self.renders += 1;
            if self.panic_render {
                panic!("render blew up");
            }
            Ok(())
        }

        fn on_fps(&mut self, fps: u32) {
            self.fps.push(fps);
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_target_fps_clamped() {
        let game_loop = GameLoop::new(2_000_000_000);
        assert_eq!(game_loop.frame_interval(), ms(1));

        let start = Instant::now();
        let mut game_loop = GameLoop::new(u32::MAX);
        let mut recorder = Recorder::default();
        game_loop.start(start);
        assert!(game_loop.tick(start + ms(5), &mut recorder));
        assert_eq!(recorder.updates.len(), 1);

        assert_eq!(GameLoop::new(0).frame_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_not_running_never_dispatches() {
        let mut game_loop = GameLoop::new(60);
        let mut recorder = Recorder::default();
        assert!(!game_loop.tick(Instant::now() + ms(100), &mut recorder));
        assert!(recorder.updates.is_empty());
    }

    #[test]
    fn test_skips_until_interval_elapsed() {
        let start = Instant::now();
        let mut game_loop = GameLoop::new(50); // 20 ms frames
        let mut recorder = Recorder::default();
        game_loop.start(start);

        assert!(!game_loop.tick(start + ms(5), &mut recorder));
        assert!(!game_loop.tick(start + ms(19), &mut recorder));
        assert!(game_loop.tick(start + ms(20), &mut recorder));
        assert_eq!(recorder.updates.len(), 1);
        assert_eq!(recorder.renders, 1);
        assert!((recorder.updates[0] - 0.020).abs() < 1e-6);
    }

    #[test]
    fn test_remainder_carried_into_next_frame() {
        let start = Instant::now();
        let mut game_loop = GameLoop::new(50);
        let mut recorder = Recorder::default();
        game_loop.start(start);

        // 27 ms elapsed: 7 ms carried, so the next frame is due at 40 ms, not 47 ms.
        assert!(game_loop.tick(start + ms(27), &mut recorder));
        assert_eq!(game_loop.time_until_next_frame(start + ms(27)), ms(13));
        assert!(!game_loop.tick(start + ms(39), &mut recorder));
        assert!(game_loop.tick(start + ms(40), &mut recorder));
    }

    #[test]
    fn test_dispatch_count_never_outruns_elapsed_time() {
        let start = Instant::now();
        let mut game_loop = GameLoop::new(60);
        let mut recorder = Recorder::default();
        game_loop.start(start);

        let interval = game_loop.frame_interval();
        let jitter = [3u64, 17, 1, 40, 9, 16, 16, 33, 2, 5, 120, 7, 16, 18, 11];
        let mut now = start;
        let mut dispatched: u32 = 0;

        for step in jitter.iter().cycle().take(600) {
            now += ms(*step);
            if game_loop.tick(now, &mut recorder) {
                dispatched += 1;
            }
            let elapsed = now - start;
            assert!(interval * dispatched <= elapsed + interval);
        }
        assert!(dispatched > 0);
    }

    #[test]
    fn test_start_is_idempotent() {
        let start = Instant::now();
        let mut game_loop = GameLoop::new(50);
        let mut recorder = Recorder::default();
        game_loop.start(start);
        game_loop.start(start + ms(15));

        assert!(game_loop.tick(start + ms(20), &mut recorder));
    }

    #[test]
    fn test_stop_prevents_next_frame() {
        let start = Instant::now();
        let mut game_loop = GameLoop::new(50);
        let mut recorder = Recorder::default();
        game_loop.start(start);
        game_loop.stop();

        assert!(!game_loop.is_running());
        assert!(!game_loop.tick(start + ms(100), &mut recorder));
    }

    #[test]
    fn test_callback_faults_do_not_stop_cadence() {
        let start = Instant::now();
        let mut game_loop = GameLoop::new(50);
        let mut recorder = Recorder {
            fail_update: true,
            panic_render: true,
            ..Default::default()
        };
        game_loop.start(start);

        assert!(game_loop.tick(start + ms(20), &mut recorder));
        assert!(game_loop.tick(start + ms(40), &mut recorder));
        assert_eq!(recorder.updates.len(), 2);
        assert_eq!(recorder.renders, 2);
        assert!(game_loop.is_running());
    }

    #[test]
    fn test_fps_reported_once_per_window() {
        let start = Instant::now();
        let mut game_loop = GameLoop::new(50);
        let mut recorder = Recorder::default();
        game_loop.start(start);

        for i in 1..=50 {
            game_loop.tick(start + ms(20 * i), &mut recorder);
        }
        assert_eq!(recorder.fps, vec![50]);
        assert_eq!(game_loop.fps(), 50);
    }
}
