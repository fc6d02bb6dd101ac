//! Capture sinks that receive rendered frames.

#[cfg(feature = "native-plugin")]
pub mod native;
pub mod scripted;
pub mod shared;

#[cfg(feature = "native-plugin")]
pub use native::NativeSink;
pub use scripted::ScriptedSink;
pub use shared::{FrameReceiver, SharedMemorySink};

use crate::error::SinkError;
use crate::frame::FrameImage;
use serde::{Deserialize, Serialize};

/// Trait for external capture sinks.
///
/// A sink hands out instances; the bridge owns exactly one and submits every
/// frame against it. Implementations need not be reentrant for one instance.
pub trait CaptureSink {
    /// Per-instance sink state.
    type Instance;

    /// Allocates a capture instance.
    fn create_instance(&mut self) -> Result<Self::Instance, SinkError>;

    /// Releases an instance. Called at most once per instance.
    fn destroy_instance(&mut self, instance: Self::Instance);

    /// Sends one frame synchronously and returns the sink's status.
    ///
    /// `image` is only valid for the duration of the call.
    fn submit(
        &mut self,
        instance: &mut Self::Instance,
        image: &FrameImage<'_>,
        config: &SubmitConfig,
    ) -> SendStatus;
}

/// What the sink does when the frame size differs from its output size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Show a placeholder instead of the frame
    #[default]
    #[value(name = "reject")]
    RejectMismatch,
    /// Scale the frame to fit
    #[value(name = "linear")]
    LinearResize,
}

impl ResizeMode {
    /// Code passed across the native boundary.
    pub fn code(self) -> i32 {
        match self {
            ResizeMode::RejectMismatch => 0,
            ResizeMode::LinearResize => 1,
        }
    }
}

/// Optional flip applied before delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorMode {
    #[default]
    None,
    Horizontal,
}

impl MirrorMode {
    /// Code passed across the native boundary.
    pub fn code(self) -> i32 {
        match self {
            MirrorMode::None => 0,
            MirrorMode::Horizontal => 1,
        }
    }
}

/// Settings sent along with every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    /// Trade one frame of latency for smoother throughput
    pub double_buffering: bool,
    pub resize_mode: ResizeMode,
    pub mirror_mode: MirrorMode,
}

/// Raw status returned by a sink for one submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Success,
    FrameSkipped,
    SinkInactive,
    UnsupportedDevice,
    InvalidParameter,
    ResolutionTooLarge,
    UnsupportedTextureFormat,
    ReadbackFailed,
    Unknown(i32),
}

impl SendStatus {
    /// Decodes a status code from the native plugin.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => SendStatus::Success,
            1 => SendStatus::FrameSkipped,
            2 => SendStatus::SinkInactive,
            100 => SendStatus::UnsupportedDevice,
            101 => SendStatus::InvalidParameter,
            102 => SendStatus::ResolutionTooLarge,
            103 => SendStatus::UnsupportedTextureFormat,
            104 => SendStatus::ReadbackFailed,
            other => SendStatus::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            SendStatus::Success => 0,
            SendStatus::FrameSkipped => 1,
            SendStatus::SinkInactive => 2,
            SendStatus::UnsupportedDevice => 100,
            SendStatus::InvalidParameter => 101,
            SendStatus::ResolutionTooLarge => 102,
            SendStatus::UnsupportedTextureFormat => 103,
            SendStatus::ReadbackFailed => 104,
            SendStatus::Unknown(code) => code,
        }
    }
}
