//! Classification of sink statuses into submission outcomes.

use crate::sink::SendStatus;
use std::fmt;

/// Non-fatal conditions where rendering and capture both carry on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// The sink reads slower than we render and dropped a frame
    FrameSkipped,
    /// No consumer is reading frames
    SinkInactive,
}

/// Conditions where this frame was not captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The graphics backend cannot be read by the sink
    UnsupportedDevice,
    /// Image or configuration was malformed
    InvalidParameter,
    /// Render resolution exceeds what the sink accepts
    ResolutionTooLarge,
    /// Pixel format or color depth is not supported
    UnsupportedTextureFormat,
    /// Pixel data could not be read from the GPU this frame
    ReadbackFailed,
    /// Status code the bridge does not know
    Unrecognized(i32),
}

/// Result of submitting one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Success,
    Warning(WarningKind),
    Error(ErrorKind),
}

impl From<SendStatus> for SubmissionOutcome {
    fn from(status: SendStatus) -> Self {
        match status {
            SendStatus::Success => SubmissionOutcome::Success,
            SendStatus::FrameSkipped => SubmissionOutcome::Warning(WarningKind::FrameSkipped),
            SendStatus::SinkInactive => SubmissionOutcome::Warning(WarningKind::SinkInactive),
            SendStatus::UnsupportedDevice => SubmissionOutcome::Error(ErrorKind::UnsupportedDevice),
            SendStatus::InvalidParameter => SubmissionOutcome::Error(ErrorKind::InvalidParameter),
            SendStatus::ResolutionTooLarge => SubmissionOutcome::Error(ErrorKind::ResolutionTooLarge),
            SendStatus::UnsupportedTextureFormat => {
                SubmissionOutcome::Error(ErrorKind::UnsupportedTextureFormat)
            }
            SendStatus::ReadbackFailed => SubmissionOutcome::Error(ErrorKind::ReadbackFailed),
            SendStatus::Unknown(code) => SubmissionOutcome::Error(ErrorKind::Unrecognized(code)),
        }
    }
}

impl SubmissionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionOutcome::Success)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, SubmissionOutcome::Warning(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SubmissionOutcome::Error(_))
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::FrameSkipped => write!(
                f,
                "capture device skipped a frame, capture frame rate will not match render frame rate"
            ),
            WarningKind::SinkInactive => write!(f, "capture device is inactive"),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::UnsupportedDevice => {
                write!(f, "unsupported graphics device, capture will not work with this rendering backend")
            }
            ErrorKind::InvalidParameter => write!(f, "input parameter error"),
            ErrorKind::ResolutionTooLarge => write!(
                f,
                "render resolution is too large to send to capture device (reduce it or enable linear resize)"
            ),
            ErrorKind::UnsupportedTextureFormat => write!(
                f,
                "render texture format is unsupported (disable extended dynamic range output)"
            ),
            ErrorKind::ReadbackFailed => write!(f, "error while reading texture image data"),
            ErrorKind::Unrecognized(code) => write!(f, "capture sink returned unknown status {}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_lands_in_one_bucket() {
        let cases = [
            (SendStatus::Success, SubmissionOutcome::Success),
            (SendStatus::FrameSkipped, SubmissionOutcome::Warning(WarningKind::FrameSkipped)),
            (SendStatus::SinkInactive, SubmissionOutcome::Warning(WarningKind::SinkInactive)),
            (SendStatus::UnsupportedDevice, SubmissionOutcome::Error(ErrorKind::UnsupportedDevice)),
            (SendStatus::InvalidParameter, SubmissionOutcome::Error(ErrorKind::InvalidParameter)),
            (SendStatus::ResolutionTooLarge, SubmissionOutcome::Error(ErrorKind::ResolutionTooLarge)),
            (
                SendStatus::UnsupportedTextureFormat,
                SubmissionOutcome::Error(ErrorKind::UnsupportedTextureFormat),
            ),
            (SendStatus::ReadbackFailed, SubmissionOutcome::Error(ErrorKind::ReadbackFailed)),
            (SendStatus::Unknown(7), SubmissionOutcome::Error(ErrorKind::Unrecognized(7))),
        ];

        for (status, expected) in cases {
            let outcome = SubmissionOutcome::from(status);
            assert_eq!(outcome, expected);
            let buckets = [outcome.is_success(), outcome.is_warning(), outcome.is_error()];
            assert_eq!(buckets.iter().filter(|b| **b).count(), 1);
        }
    }
}
