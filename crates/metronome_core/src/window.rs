//! # Window Backend
//!
//! The scheduler talks to the platform only through [`WindowBackend`]. The
//! crate ships [`HeadlessWindow`], which renders nothing and closes itself
//! after a frame budget; it drives tests and the headless binary.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// RGBA clear color, components in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
    /// Alpha.
    pub a: f32,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);

    /// Opaque color from RGB.
    #[must_use]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Returns true if every component is within `[0, 1]`.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        [self.r, self.g, self.b, self.a]
            .iter()
            .all(|c| (0.0..=1.0).contains(c))
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Platform window and clock used by the scheduler.
pub trait WindowBackend {
    /// Opens the window.
    fn open(&mut self, width: u32, height: u32, title: &str);

    /// Returns true once the window wants the loop to stop.
    fn should_close(&self) -> bool;

    /// Starts drawing a frame.
    fn begin_frame(&mut self);

    /// Clears the back buffer.
    fn clear(&mut self, color: Color);

    /// Presents the frame.
    fn end_frame(&mut self);

    /// Closes the window. Safe to call more than once.
    fn close(&mut self);

    /// Monotonic time in seconds.
    fn now(&self) -> f64;
}

/// Time source of a [`HeadlessWindow`].
#[derive(Clone, Debug)]
pub enum HeadlessClock {
    /// Real elapsed time since creation.
    Wall(Instant),
    /// Advances by a fixed amount every presented frame.
    Scripted {
        /// Seconds added per `end_frame`.
        frame_time: f64,
        /// Current time.
        now: f64,
    },
}

/// Counts of backend calls made by the scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowCalls {
    /// `open` calls.
    pub opened: u32,
    /// `begin_frame` calls.
    pub frames_begun: u64,
    /// `clear` calls.
    pub clears: u64,
    /// `end_frame` calls.
    pub frames_presented: u64,
    /// `close` calls.
    pub closed: u32,
}

/// Window that draws nothing.
#[derive(Clone, Debug)]
pub struct HeadlessWindow {
    frame_budget: Option<u64>,
    clock: HeadlessClock,
    is_open: bool,
    size: (u32, u32),
    title: String,
    last_clear: Option<Color>,
    calls: WindowCalls,
}

impl HeadlessWindow {
    /// Runs on the wall clock until closed, or for `frame_budget` frames.
    #[must_use]
    pub fn new(frame_budget: Option<u64>) -> Self {
        Self::with_clock(frame_budget, HeadlessClock::Wall(Instant::now()))
    }

    /// Runs for `frame_budget` frames with time advancing `frame_time` per frame.
    #[must_use]
    pub fn scripted(frame_budget: u64, frame_time: f64) -> Self {
        Self::with_clock(
            Some(frame_budget),
            HeadlessClock::Scripted {
                frame_time,
                now: 0.0,
            },
        )
    }

    fn with_clock(frame_budget: Option<u64>, clock: HeadlessClock) -> Self {
        Self {
            frame_budget,
            clock,
            is_open: false,
            size: (0, 0),
            title: String::new(),
            last_clear: None,
            calls: WindowCalls::default(),
        }
    }

    /// Returns true between `open` and `close`.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Size passed to `open`.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Title passed to `open`.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Color of the most recent clear.
    #[must_use]
    pub fn last_clear(&self) -> Option<Color> {
        self.last_clear
    }

    /// Call counters.
    #[must_use]
    pub fn calls(&self) -> WindowCalls {
        self.calls
    }
}

impl WindowBackend for HeadlessWindow {
    fn open(&mut self, width: u32, height: u32, title: &str) {
        tracing::info!("headless window opened: {}x{} \"{}\"", width, height, title);
        self.is_open = true;
        self.size = (width, height);
        self.title = title.to_owned();
        self.calls.opened += 1;
    }

    fn should_close(&self) -> bool {
        !self.is_open
            || self
                .frame_budget
                .is_some_and(|budget| self.calls.frames_presented >= budget)
    }

    fn begin_frame(&mut self) {
        self.calls.frames_begun += 1;
    }

    fn clear(&mut self, color: Color) {
        self.last_clear = Some(color);
        self.calls.clears += 1;
    }

    fn end_frame(&mut self) {
        self.calls.frames_presented += 1;
        if let HeadlessClock::Scripted { frame_time, now } = &mut self.clock {
            *now += *frame_time;
        }
    }

    fn close(&mut self) {
        if self.is_open {
            tracing::info!(
                "headless window closed after {} frames",
                self.calls.frames_presented
            );
        }
        self.is_open = false;
        self.calls.closed += 1;
    }

    fn now(&self) -> f64 {
        match &self.clock {
            HeadlessClock::Wall(start) => start.elapsed().as_secs_f64(),
            HeadlessClock::Scripted { now, .. } => *now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_closes_window() {
        let mut window = HeadlessWindow::scripted(2, 0.5);
        assert!(window.should_close());

        window.open(640, 480, "test");
        assert!(!window.should_close());
        for _ in 0..2 {
            window.begin_frame();
            window.clear(Color::BLACK);
            window.end_frame();
        }
        assert!(window.should_close());
        assert!(window.is_open());
    }

    #[test]
    fn test_scripted_clock_advances_per_frame() {
        let mut window = HeadlessWindow::scripted(10, 0.25);
        window.open(1, 1, "clock");
        assert_eq!(window.now(), 0.0);
        window.end_frame();
        window.end_frame();
        assert_eq!(window.now(), 0.5);
    }

    #[test]
    fn test_headless_window_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HeadlessWindow>();

        let mut window = HeadlessWindow::scripted(3, 0.5);
        window.open(1, 1, "threads");
        let now = std::thread::scope(|scope| scope.spawn(|| window.now()).join().unwrap());
        assert_eq!(now, 0.0);
    }

    #[test]
    fn test_records_calls() {
        let mut window = HeadlessWindow::new(None);
        window.open(800, 600, "calls");
        window.begin_frame();
        window.clear(Color::rgb(0.1, 0.2, 0.3));
        window.end_frame();
        window.close();

        assert_eq!(window.size(), (800, 600));
        assert_eq!(window.title(), "calls");
        assert_eq!(window.last_clear(), Some(Color::rgb(0.1, 0.2, 0.3)));
        assert_eq!(
            window.calls(),
            WindowCalls {
                opened: 1,
                frames_begun: 1,
                clears: 1,
                frames_presented: 1,
                closed: 1,
            }
        );
        assert!(window.should_close());
    }

    #[test]
    fn test_color_normalized() {
        assert!(Color::BLACK.is_normalized());
        assert!(!Color::rgb(1.5, 0.0, 0.0).is_normalized());
    }
}
