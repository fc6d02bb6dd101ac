//! Hooks a host render loop calls, and a simple loop driving them.

use crate::bridge::{BridgeState, FrameSinkBridge};
use crate::error::BridgeError;
use crate::frame::FrameImage;
use crate::sink::CaptureSink;
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Refresh rate assumed when pacing to vsync.
pub const DISPLAY_REFRESH_RATE: u32 = 60;

/// Callbacks invoked by whatever owns the render loop.
pub trait FrameHook {
    /// Called once before the first frame.
    fn on_start(&mut self);

    /// Called once per rendered frame. `image` is only valid during the call.
    fn on_frame_rendered(&mut self, image: &FrameImage<'_>);

    /// Called once after the last frame.
    fn on_stop(&mut self);
}

impl<S: CaptureSink> FrameHook for FrameSinkBridge<S> {
    fn on_start(&mut self) {
        match self.initialize() {
            Ok(()) => {}
            Err(e @ BridgeError::InstanceCreation(_)) => {
                let reason = e.source().map(|s| s.to_string()).unwrap_or_default();
                error!("{}: {}. Rendering continues without capture.", e, reason);
            }
            Err(e) => error!("Capture start ignored: {}", e),
        }
    }

    fn on_frame_rendered(&mut self, image: &FrameImage<'_>) {
        if self.state() == BridgeState::Disabled {
            return;
        }
        let config = self.config();
        if let Err(e) = self.submit(image, &config) {
            error!("Frame rendered outside the capture lifecycle: {}", e);
        }
    }

    fn on_stop(&mut self) {
        self.shutdown();
    }
}

/// Render-loop tuning supplied alongside the capture settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Frames per second to aim for; 0 renders as fast as possible
    pub target_frame_rate: u32,
    /// Pace to the display refresh rate, overriding `target_frame_rate`
    pub vsync: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            target_frame_rate: 60,
            vsync: false,
        }
    }
}

impl RenderSettings {
    /// Time budget of one frame, or `None` when unthrottled.
    pub fn frame_interval(&self) -> Option<Duration> {
        let rate = if self.vsync {
            DISPLAY_REFRESH_RATE
        } else {
            self.target_frame_rate
        };
        (rate > 0).then(|| Duration::from_secs_f64(1.0 / rate as f64))
    }
}

/// Paces frames according to [`RenderSettings`].
pub struct RenderLoop {
    interval: Option<Duration>,
    frame_start: Instant,
    frame_index: u64,
}

impl RenderLoop {
    pub fn new(settings: &RenderSettings) -> Self {
        if settings.vsync && settings.target_frame_rate != DISPLAY_REFRESH_RATE {
            warn!(
                "VSync enabled, ignoring target frame rate of {} fps",
                settings.target_frame_rate
            );
        }
        Self {
            interval: settings.frame_interval(),
            frame_start: Instant::now(),
            frame_index: 0,
        }
    }

    /// Marks the start of a frame and returns its index.
    pub fn begin_frame(&mut self) -> u64 {
        self.frame_start = Instant::now();
        self.frame_index
    }

    /// Sleeps out the rest of the frame budget.
    pub fn end_frame(&mut self) {
        self.frame_index += 1;
        if let Some(interval) = self.interval {
            let elapsed = self.frame_start.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
    }

    pub fn apply(&mut self, settings: &RenderSettings) {
        self.interval = settings.frame_interval();
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_index
    }
}

/// Measures a frame rate over fixed windows.
///
/// Timestamps are passed in by the caller so the render thread and the
/// consumer thread can each feed their own clock readings.
pub struct FpsCounter {
    window: Duration,
    window_start: Instant,
    frames_in_window: u32,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: Instant::now(),
            frames_in_window: 0,
        }
    }

    /// Counts a frame finished at `now`. Returns the rate of the window once it closes.
    pub fn record(&mut self, now: Instant) -> Option<f32> {
        self.frames_in_window += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        let secs = elapsed.as_secs_f32().max(f32::EPSILON);
        let fps = self.frames_in_window as f32 / secs;
        self.window_start = now;
        self.frames_in_window = 0;
        Some(fps)
    }

    pub fn update(&mut self) -> Option<f32> {
        self.record(Instant::now())
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Texture, TextureFormat};
    use crate::sink::{ScriptedSink, SendStatus, SubmitConfig};

    #[test]
    fn failed_start_skips_all_submissions() {
        let mut bridge = FrameSinkBridge::new(ScriptedSink::new().failing_create(), SubmitConfig::default());
        let mut render_loop = RenderLoop::new(&RenderSettings {
            target_frame_rate: 0,
            vsync: false,
        });
        let texture = Texture::new(4, 4, TextureFormat::Rgba8);

        bridge.on_start();
        for _ in 0..10 {
            render_loop.begin_frame();
            bridge.on_frame_rendered(&FrameImage::Cpu(&texture));
            render_loop.end_frame();
        }
        bridge.on_stop();

        assert_eq!(render_loop.frames_rendered(), 10);
        assert!(bridge.sink().submissions().is_empty());
        assert_eq!(bridge.sink().destroyed(), 0);
    }

    #[test]
    fn hooks_use_current_config() {
        let mut bridge = FrameSinkBridge::new(ScriptedSink::new(), SubmitConfig::default());
        let texture = Texture::new(4, 4, TextureFormat::Rgba8);

        bridge.on_start();
        bridge.on_frame_rendered(&FrameImage::Cpu(&texture));
        let updated = SubmitConfig {
            double_buffering: true,
            ..Default::default()
        };
        bridge.set_config(updated);
        bridge.on_frame_rendered(&FrameImage::Cpu(&texture));
        bridge.on_stop();
        // Late frames after stop are refused, not forwarded.
        bridge.on_frame_rendered(&FrameImage::Cpu(&texture));

        let submissions = bridge.sink().submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].config, SubmitConfig::default());
        assert_eq!(submissions[1].config, updated);
        assert_eq!(bridge.sink().created(), 1);
        assert_eq!(bridge.sink().destroyed(), 1);
    }

    #[test]
    fn errors_do_not_stop_hooks() {
        let sink = ScriptedSink::new().with_fallback(SendStatus::ReadbackFailed);
        let mut bridge = FrameSinkBridge::new(sink, SubmitConfig::default());
        let texture = Texture::new(4, 4, TextureFormat::Rgba8);

        bridge.on_start();
        for _ in 0..5 {
            bridge.on_frame_rendered(&FrameImage::Cpu(&texture));
        }
        assert_eq!(bridge.sink().submissions().len(), 5);
        assert_eq!(bridge.stats().errors, 5);
    }

    #[test]
    fn frame_interval_follows_vsync() {
        let settings = RenderSettings {
            target_frame_rate: 30,
            vsync: false,
        };
        assert_eq!(settings.frame_interval(), Some(Duration::from_secs_f64(1.0 / 30.0)));

        let vsync = RenderSettings {
            target_frame_rate: 30,
            vsync: true,
        };
        assert_eq!(vsync.frame_interval(), Some(Duration::from_secs_f64(1.0 / 60.0)));

        let unthrottled = RenderSettings {
            target_frame_rate: 0,
            vsync: false,
        };
        assert_eq!(unthrottled.frame_interval(), None);
    }

    #[test]
    fn fps_counter_reports_once_per_window() {
        let mut counter = FpsCounter::new(Duration::from_secs(1));
        let start = counter.window_start;

        for i in 1..4 {
            assert!(counter.record(start + Duration::from_millis(250 * i)).is_none());
        }
        let fps = counter.record(start + Duration::from_secs(1)).unwrap();
        assert!((fps - 4.0).abs() < 1e-3);

        // The next window starts where the last one closed.
        assert!(counter.record(start + Duration::from_millis(1500)).is_none());
        let fps = counter.record(start + Duration::from_secs(3)).unwrap();
        assert!((fps - 1.0).abs() < 1e-3);
    }

    #[test]
    fn fps_counter_ignores_clock_going_backwards() {
        let mut counter = FpsCounter::new(Duration::from_millis(10));
        let before = counter
            .window_start
            .checked_sub(Duration::from_millis(50))
            .unwrap_or(counter.window_start);
        assert!(counter.record(before).is_none());
    }

    #[test]
    fn second_start_keeps_capture_running() {
        let mut bridge = FrameSinkBridge::new(ScriptedSink::new(), SubmitConfig::default());
        let texture = Texture::new(4, 4, TextureFormat::Rgba8);

        bridge.on_start();
        bridge.on_start();
        assert_eq!(bridge.state(), BridgeState::Ready);

        bridge.on_frame_rendered(&FrameImage::Cpu(&texture));
        bridge.on_stop();
        assert_eq!(bridge.sink().created(), 1);
        assert_eq!(bridge.sink().submissions().len(), 1);
        assert_eq!(bridge.sink().destroyed(), 1);
    }
}
