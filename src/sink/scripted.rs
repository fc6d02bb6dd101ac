//! In-memory sink that returns scripted statuses.
//!
//! Stands in for a capture device when exercising the bridge: statuses are
//! replayed in order, then `fallback` is returned forever.

use super::{CaptureSink, SendStatus, SubmitConfig};
use crate::error::SinkError;
use crate::frame::FrameImage;
use std::collections::VecDeque;

/// One recorded call to [`CaptureSink::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Id of the instance the frame was sent to
    pub instance: u64,
    /// Config exactly as received
    pub config: SubmitConfig,
    /// Frame size for CPU textures
    pub dimensions: Option<(u32, u32)>,
}

/// Instance handed out by [`ScriptedSink`].
#[derive(Debug)]
pub struct ScriptedInstance {
    id: u64,
}

/// Sink returning configurable statuses and recording every call.
#[derive(Debug)]
pub struct ScriptedSink {
    script: VecDeque<SendStatus>,
    fallback: SendStatus,
    fail_create: bool,
    next_id: u64,
    created: usize,
    destroyed: usize,
    submissions: Vec<Submission>,
}

impl ScriptedSink {
    /// Creates a sink that accepts every frame.
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            fallback: SendStatus::Success,
            fail_create: false,
            next_id: 1,
            created: 0,
            destroyed: 0,
            submissions: Vec::new(),
        }
    }

    /// Queues a status for the next unscripted submit.
    pub fn then(mut self, status: SendStatus) -> Self {
        self.script.push_back(status);
        self
    }

    /// Status returned once the script runs out.
    pub fn with_fallback(mut self, status: SendStatus) -> Self {
        self.fallback = status;
        self
    }

    /// Makes `create_instance` fail.
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }
}

impl Default for ScriptedSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSink for ScriptedSink {
    type Instance = ScriptedInstance;

    fn create_instance(&mut self) -> Result<ScriptedInstance, SinkError> {
        if self.fail_create {
            return Err(SinkError::InstanceUnavailable("scripted failure".to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.created += 1;
        Ok(ScriptedInstance { id })
    }

    fn destroy_instance(&mut self, _instance: ScriptedInstance) {
        self.destroyed += 1;
    }

    fn submit(
        &mut self,
        instance: &mut ScriptedInstance,
        image: &FrameImage<'_>,
        config: &SubmitConfig,
    ) -> SendStatus {
        self.submissions.push(Submission {
            instance: instance.id,
            config: *config,
            dimensions: image.dimensions(),
        });
        self.script.pop_front().unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Texture, TextureFormat};

    #[test]
    fn replays_script_then_fallback() {
        let mut sink = ScriptedSink::new()
            .then(SendStatus::FrameSkipped)
            .then(SendStatus::ReadbackFailed)
            .with_fallback(SendStatus::SinkInactive);
        let mut instance = sink.create_instance().unwrap();
        let texture = Texture::new(4, 2, TextureFormat::Rgba8);
        let image = FrameImage::Cpu(&texture);
        let config = SubmitConfig::default();

        let statuses: Vec<_> = (0..4).map(|_| sink.submit(&mut instance, &image, &config)).collect();
        assert_eq!(
            statuses,
            vec![
                SendStatus::FrameSkipped,
                SendStatus::ReadbackFailed,
                SendStatus::SinkInactive,
                SendStatus::SinkInactive,
            ]
        );
        assert_eq!(sink.submissions().len(), 4);
        assert_eq!(sink.submissions()[0].dimensions, Some((4, 2)));
    }

    #[test]
    fn failing_create_counts_nothing() {
        let mut sink = ScriptedSink::new().failing_create();
        assert!(sink.create_instance().is_err());
        assert_eq!(sink.created(), 0);
    }
}
