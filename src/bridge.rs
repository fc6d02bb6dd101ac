//! Bridge between a host render loop and a capture sink.

use crate::error::BridgeError;
use crate::frame::FrameImage;
use crate::outcome::{ErrorKind, SubmissionOutcome};
use crate::sink::{CaptureSink, SubmitConfig};
use tracing::{debug, error, info, warn};

/// Tuning for how outcomes are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Log an unsupported graphics device once instead of every frame
    pub suppress_repeats: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            suppress_repeats: true,
        }
    }
}

/// Counters over every submitted frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub submitted: u64,
    pub accepted: u64,
    pub warnings: u64,
    pub errors: u64,
    /// Errors that were not logged because they repeated
    pub suppressed: u64,
    /// Warning and error events actually logged
    pub reported: u64,
}

/// Lifecycle phase of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Ready,
    /// Instance creation failed; rendering continues without capture
    Disabled,
    Destroyed,
}

enum State<I> {
    Uninitialized,
    Ready(I),
    Disabled,
    Destroyed,
}

/// Owns one capture instance and submits rendered frames to it.
///
/// Transitions are `Uninitialized -> Ready | Disabled -> Destroyed` and never
/// go back. Submitting requires `&mut self`, so at most one call is in flight.
pub struct FrameSinkBridge<S: CaptureSink> {
    sink: S,
    state: State<S::Instance>,
    config: SubmitConfig,
    options: BridgeOptions,
    stats: BridgeStats,
    device_error_reported: bool,
}

impl<S: CaptureSink> FrameSinkBridge<S> {
    pub fn new(sink: S, config: SubmitConfig) -> Self {
        Self::with_options(sink, config, BridgeOptions::default())
    }

    pub fn with_options(sink: S, config: SubmitConfig, options: BridgeOptions) -> Self {
        Self {
            sink,
            state: State::Uninitialized,
            config,
            options,
            stats: BridgeStats::default(),
            device_error_reported: false,
        }
    }

    /// Acquires the capture instance.
    ///
    /// On failure the bridge is disabled for good and the caller should keep
    /// rendering without capture.
    pub fn initialize(&mut self) -> Result<(), BridgeError> {
        match self.state {
            State::Uninitialized => {}
            State::Ready(_) => return Err(BridgeError::InvalidState("already initialized")),
            State::Disabled => return Err(BridgeError::InvalidState("initialization already failed")),
            State::Destroyed => return Err(BridgeError::InvalidState("already shut down")),
        }

        match self.sink.create_instance() {
            Ok(instance) => {
                self.state = State::Ready(instance);
                info!("Capture instance created");
                Ok(())
            }
            Err(e) => {
                self.state = State::Disabled;
                Err(BridgeError::InstanceCreation(e))
            }
        }
    }

    /// Releases the capture instance. Safe to call in any state, any number of times.
    pub fn shutdown(&mut self) {
        match std::mem::replace(&mut self.state, State::Destroyed) {
            State::Ready(instance) => {
                self.sink.destroy_instance(instance);
                info!(
                    "Capture instance destroyed after {} frames ({} accepted)",
                    self.stats.submitted, self.stats.accepted
                );
            }
            State::Uninitialized | State::Disabled => debug!("Shutdown without a capture instance"),
            State::Destroyed => {}
        }
    }

    /// Sends one frame to the sink and reports the outcome.
    ///
    /// Outcomes never stop the caller; only a call outside the `Ready` state
    /// returns an error.
    pub fn submit(
        &mut self,
        image: &FrameImage<'_>,
        config: &SubmitConfig,
    ) -> Result<SubmissionOutcome, BridgeError> {
        let instance = match &mut self.state {
            State::Ready(instance) => instance,
            State::Uninitialized => return Err(BridgeError::NotInitialized),
            State::Disabled => return Err(BridgeError::CaptureDisabled),
            State::Destroyed => return Err(BridgeError::ShutDown),
        };

        let status = self.sink.submit(instance, image, config);
        let outcome = SubmissionOutcome::from(status);
        self.stats.submitted += 1;
        self.report(outcome);
        Ok(outcome)
    }

    fn report(&mut self, outcome: SubmissionOutcome) {
        match outcome {
            SubmissionOutcome::Success => {
                self.stats.accepted += 1;
                self.device_error_reported = false;
            }
            SubmissionOutcome::Warning(kind) => {
                self.stats.warnings += 1;
                self.stats.reported += 1;
                warn!("{}", kind);
            }
            SubmissionOutcome::Error(ErrorKind::UnsupportedDevice)
                if self.options.suppress_repeats && self.device_error_reported =>
            {
                self.stats.errors += 1;
                self.stats.suppressed += 1;
            }
            SubmissionOutcome::Error(kind) => {
                self.stats.errors += 1;
                if kind == ErrorKind::UnsupportedDevice {
                    self.device_error_reported = true;
                }
                self.stats.reported += 1;
                error!("{}", kind);
            }
        }
    }

    pub fn state(&self) -> BridgeState {
        match self.state {
            State::Uninitialized => BridgeState::Uninitialized,
            State::Ready(_) => BridgeState::Ready,
            State::Disabled => BridgeState::Disabled,
            State::Destroyed => BridgeState::Destroyed,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Config used by the host hooks.
    pub fn config(&self) -> SubmitConfig {
        self.config
    }

    /// Replaces the config for subsequent frames.
    pub fn set_config(&mut self, config: SubmitConfig) {
        if config != self.config {
            info!("Capture config updated: {:?}", config);
        }
        self.config = config;
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: CaptureSink> Drop for FrameSinkBridge<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Texture, TextureFormat};
    use crate::outcome::WarningKind;
    use crate::sink::{MirrorMode, ResizeMode, ScriptedSink, SendStatus, SharedMemorySink};

    fn texture() -> Texture {
        Texture::new(8, 4, TextureFormat::Rgba8)
    }

    fn ready(sink: ScriptedSink) -> FrameSinkBridge<ScriptedSink> {
        let mut bridge = FrameSinkBridge::new(sink, SubmitConfig::default());
        bridge.initialize().unwrap();
        bridge
    }

    #[test]
    fn forwards_every_config_unchanged() {
        let mut bridge = ready(ScriptedSink::new());
        let texture = texture();
        let mut sent = Vec::new();

        for double_buffering in [false, true] {
            for resize_mode in [ResizeMode::RejectMismatch, ResizeMode::LinearResize] {
                for mirror_mode in [MirrorMode::None, MirrorMode::Horizontal] {
                    let config = SubmitConfig {
                        double_buffering,
                        resize_mode,
                        mirror_mode,
                    };
                    bridge.submit(&FrameImage::Cpu(&texture), &config).unwrap();
                    sent.push(config);
                }
            }
        }

        let received: Vec<_> = bridge.sink().submissions().iter().map(|s| s.config).collect();
        assert_eq!(received, sent);
        assert!(bridge.sink().submissions().iter().all(|s| s.dimensions == Some((8, 4))));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut bridge = ready(ScriptedSink::new());
        bridge.shutdown();
        bridge.shutdown();
        assert_eq!(bridge.state(), BridgeState::Destroyed);
        assert_eq!(bridge.sink().created(), 1);
        assert_eq!(bridge.sink().destroyed(), 1);
    }

    #[test]
    fn shutdown_without_initialize() {
        let mut bridge = FrameSinkBridge::new(ScriptedSink::new(), SubmitConfig::default());
        bridge.shutdown();
        assert_eq!(bridge.sink().destroyed(), 0);
        assert!(matches!(bridge.initialize(), Err(BridgeError::InvalidState(_))));
    }

    #[test]
    fn submit_outside_ready_is_rejected() {
        let texture = texture();
        let image = FrameImage::Cpu(&texture);
        let mut bridge = FrameSinkBridge::new(ScriptedSink::new(), SubmitConfig::default());

        assert!(matches!(
            bridge.submit(&image, &SubmitConfig::default()),
            Err(BridgeError::NotInitialized)
        ));

        bridge.initialize().unwrap();
        bridge.shutdown();
        assert!(matches!(
            bridge.submit(&image, &SubmitConfig::default()),
            Err(BridgeError::ShutDown)
        ));
        assert!(bridge.sink().submissions().is_empty());
    }

    #[test]
    fn double_initialize_is_rejected() {
        let mut bridge = ready(ScriptedSink::new());
        assert!(matches!(bridge.initialize(), Err(BridgeError::InvalidState(_))));
        assert_eq!(bridge.sink().created(), 1);
    }

    #[test]
    fn failed_creation_disables_capture() {
        let mut bridge = FrameSinkBridge::new(ScriptedSink::new().failing_create(), SubmitConfig::default());
        assert!(matches!(bridge.initialize(), Err(BridgeError::InstanceCreation(_))));
        assert_eq!(bridge.state(), BridgeState::Disabled);

        let texture = texture();
        assert!(matches!(
            bridge.submit(&FrameImage::Cpu(&texture), &SubmitConfig::default()),
            Err(BridgeError::CaptureDisabled)
        ));
        bridge.shutdown();
        assert!(bridge.sink().submissions().is_empty());
        assert_eq!(bridge.sink().destroyed(), 0);
    }

    #[test]
    fn every_outcome_is_classified_and_frames_continue() {
        let statuses = [
            SendStatus::FrameSkipped,
            SendStatus::SinkInactive,
            SendStatus::UnsupportedDevice,
            SendStatus::InvalidParameter,
            SendStatus::ResolutionTooLarge,
            SendStatus::UnsupportedTextureFormat,
            SendStatus::ReadbackFailed,
            SendStatus::Success,
        ];
        let sink = statuses.iter().fold(ScriptedSink::new(), |sink, s| sink.then(*s));
        let mut bridge = ready(sink);
        let texture = texture();

        let outcomes: Vec<_> = statuses
            .iter()
            .map(|_| bridge.submit(&FrameImage::Cpu(&texture), &SubmitConfig::default()).unwrap())
            .collect();

        assert_eq!(outcomes[0], SubmissionOutcome::Warning(WarningKind::FrameSkipped));
        assert_eq!(outcomes[1], SubmissionOutcome::Warning(WarningKind::SinkInactive));
        assert_eq!(outcomes[2], SubmissionOutcome::Error(ErrorKind::UnsupportedDevice));
        assert_eq!(outcomes[3], SubmissionOutcome::Error(ErrorKind::InvalidParameter));
        assert_eq!(outcomes[4], SubmissionOutcome::Error(ErrorKind::ResolutionTooLarge));
        assert_eq!(outcomes[5], SubmissionOutcome::Error(ErrorKind::UnsupportedTextureFormat));
        assert_eq!(outcomes[6], SubmissionOutcome::Error(ErrorKind::ReadbackFailed));
        assert_eq!(outcomes[7], SubmissionOutcome::Success);

        let stats = bridge.stats();
        assert_eq!(stats.submitted, 8);
        assert_eq!(stats.warnings, 2);
        assert_eq!(stats.errors, 5);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.reported, 7);
        assert_eq!(bridge.state(), BridgeState::Ready);
    }

    #[test]
    fn hundred_successes_count_no_reports() {
        let mut bridge = ready(ScriptedSink::new());
        let texture = texture();
        for _ in 0..100 {
            let outcome = bridge.submit(&FrameImage::Cpu(&texture), &SubmitConfig::default()).unwrap();
            assert!(outcome.is_success());
        }
        bridge.shutdown();

        // `reported` is bumped beside every warn!/error! call.
        assert_eq!(bridge.stats().reported, 0);
        assert_eq!(bridge.stats().accepted, 100);
        assert_eq!(bridge.sink().created(), 1);
        assert_eq!(bridge.sink().destroyed(), 1);
    }

    #[test]
    fn transient_error_counts_one_report_then_capture_resumes() {
        let mut bridge = ready(ScriptedSink::new().then(SendStatus::ResolutionTooLarge));
        let texture = texture();

        let first = bridge.submit(&FrameImage::Cpu(&texture), &SubmitConfig::default()).unwrap();
        assert_eq!(first, SubmissionOutcome::Error(ErrorKind::ResolutionTooLarge));
        for _ in 0..10 {
            let outcome = bridge.submit(&FrameImage::Cpu(&texture), &SubmitConfig::default()).unwrap();
            assert!(outcome.is_success());
        }

        assert_eq!(bridge.stats().errors, 1);
        assert_eq!(bridge.stats().reported, 1);
    }

    #[test]
    fn repeated_device_errors_are_suppressed() {
        let mut bridge = ready(ScriptedSink::new().with_fallback(SendStatus::UnsupportedDevice));
        let texture = texture();
        for _ in 0..5 {
            bridge.submit(&FrameImage::Cpu(&texture), &SubmitConfig::default()).unwrap();
        }
        assert_eq!(bridge.stats().errors, 5);
        assert_eq!(bridge.stats().suppressed, 4);
        assert_eq!(bridge.stats().reported, 1);
    }

    #[test]
    fn repeated_device_errors_logged_when_not_suppressing() {
        let sink = ScriptedSink::new().with_fallback(SendStatus::UnsupportedDevice);
        let options = BridgeOptions {
            suppress_repeats: false,
        };
        let mut bridge = FrameSinkBridge::with_options(sink, SubmitConfig::default(), options);
        bridge.initialize().unwrap();
        let texture = texture();
        for _ in 0..3 {
            bridge.submit(&FrameImage::Cpu(&texture), &SubmitConfig::default()).unwrap();
        }
        assert_eq!(bridge.stats().reported, 3);
    }

    #[test]
    fn drop_releases_instance() {
        let sink = SharedMemorySink::new();
        let mut other = sink.clone();
        {
            let mut bridge = FrameSinkBridge::new(sink, SubmitConfig::default());
            bridge.initialize().unwrap();
            assert!(other.create_instance().is_err());
        }
        assert!(other.create_instance().is_ok());
    }
}
