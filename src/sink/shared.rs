//! In-process capture sink backed by a shared frame slot.
//!
//! The sender side mirrors what the native capture plugin does with a
//! mapped render texture: read it back as packed BGR24, optionally mirror
//! it, and publish it to a single slot that a [`FrameReceiver`] polls at the
//! capture device's own cadence.

use super::{CaptureSink, MirrorMode, ResizeMode, SendStatus, SubmitConfig};
use crate::error::SinkError;
use crate::frame::{mirror_bgr_rows, FrameImage, ReadbackError};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Largest image the slot accepts (4K BGR24).
pub const MAX_SHARED_IMAGE_SIZE: usize = 3840 * 2160 * 3;

/// How long a receiver waits for a new frame before reusing the old one.
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(200);

/// Placeholder color shown on a size mismatch (BGR).
const MISMATCH_FILL: [u8; 3] = [0x00, 0xFE, 0x00];

#[derive(Debug, Default)]
struct Slot {
    width: u32,
    height: u32,
    resize_mode: ResizeMode,
    data: Vec<u8>,
    has_frame: bool,
    /// Set by the sender after publishing, cleared by the receiver
    frame_sent: bool,
    /// Set by the receiver when polling, cleared by the sender
    frame_wanted: bool,
    receivers: usize,
    sender_claimed: bool,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    sent: Condvar,
    max_size: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Capture sink delivering frames to an in-process [`FrameReceiver`].
#[derive(Debug, Clone)]
pub struct SharedMemorySink {
    shared: Arc<Shared>,
}

impl SharedMemorySink {
    /// Creates a sink accepting images up to [`MAX_SHARED_IMAGE_SIZE`] bytes.
    pub fn new() -> Self {
        Self::with_capacity(MAX_SHARED_IMAGE_SIZE)
    }

    /// Creates a sink accepting images up to `max_size` bytes of BGR24.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::default()),
                sent: Condvar::new(),
                max_size,
            }),
        }
    }

    /// Connects a consumer. The sink reports itself inactive while none is connected.
    pub fn receiver(&self) -> FrameReceiver {
        self.shared.lock().receivers += 1;
        FrameReceiver {
            shared: self.shared.clone(),
            frame_index: 0,
        }
    }
}

impl Default for SharedMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

/// Sender state for one capture instance.
#[derive(Debug)]
pub struct SharedInstance {
    shared: Arc<Shared>,
    /// Readback of the current frame
    staging: Vec<u8>,
    /// Frame held back by double buffering
    back: Vec<u8>,
    back_size: Option<(u32, u32)>,
}

impl Drop for SharedInstance {
    fn drop(&mut self) {
        self.shared.lock().sender_claimed = false;
        debug!("Shared frame slot released");
    }
}

impl CaptureSink for SharedMemorySink {
    type Instance = SharedInstance;

    fn create_instance(&mut self) -> Result<SharedInstance, SinkError> {
        let mut slot = self.shared.lock();
        if slot.sender_claimed {
            return Err(SinkError::InstanceUnavailable(
                "shared frame slot is already in use by another instance".to_string(),
            ));
        }
        slot.sender_claimed = true;
        drop(slot);

        info!("Shared frame slot claimed (capacity {} bytes)", self.shared.max_size);
        Ok(SharedInstance {
            shared: self.shared.clone(),
            staging: Vec::new(),
            back: Vec::new(),
            back_size: None,
        })
    }

    fn destroy_instance(&mut self, instance: SharedInstance) {
        drop(instance);
    }

    fn submit(
        &mut self,
        instance: &mut SharedInstance,
        image: &FrameImage<'_>,
        config: &SubmitConfig,
    ) -> SendStatus {
        let FrameImage::Cpu(texture) = image else {
            // GPU handles are only readable through the native plugin.
            return SendStatus::UnsupportedDevice;
        };

        match texture.read_bgr(&mut instance.staging) {
            Ok(()) => {}
            Err(ReadbackError::UnsupportedFormat(_)) => return SendStatus::UnsupportedTextureFormat,
            Err(e) => {
                debug!("Texture readback failed: {}", e);
                return SendStatus::ReadbackFailed;
            }
        }

        if config.mirror_mode == MirrorMode::Horizontal {
            mirror_bgr_rows(&mut instance.staging, texture.width);
        }

        let shared = instance.shared.clone();
        let mut slot = shared.lock();
        if slot.receivers == 0 {
            return SendStatus::SinkInactive;
        }
        if instance.staging.len() > shared.max_size {
            return SendStatus::ResolutionTooLarge;
        }

        let size = (texture.width, texture.height);
        let (data, (width, height)) = if config.double_buffering {
            // Hold the current frame back and publish the previous one.
            std::mem::swap(&mut instance.staging, &mut instance.back);
            match instance.back_size.replace(size) {
                Some(previous) => (&instance.staging, previous),
                None => return SendStatus::Success,
            }
        } else {
            instance.back_size = None;
            (&instance.staging, size)
        };

        slot.width = width;
        slot.height = height;
        slot.resize_mode = config.resize_mode;
        slot.data.clear();
        slot.data.extend_from_slice(data);
        slot.has_frame = true;
        slot.frame_sent = true;
        let skipped = !std::mem::take(&mut slot.frame_wanted);
        drop(slot);
        shared.sent.notify_all();

        if skipped {
            SendStatus::FrameSkipped
        } else {
            SendStatus::Success
        }
    }
}

/// Result of one [`FrameReceiver::receive`] poll.
#[derive(Debug)]
pub enum ReceiveResult {
    /// Nothing has been published yet
    Inactive,
    /// A frame published since the last poll
    NewFrame(ReceivedFrame),
    /// No new frame within the timeout; the last one again
    OldFrame(ReceivedFrame),
}

/// A frame as delivered at the receiver's output size.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub width: u32,
    pub height: u32,
    /// Packed BGR24 pixels
    pub data: Vec<u8>,
    /// Size the frame was sent at
    pub source_size: (u32, u32),
    /// The sizes differed and resizing was not allowed
    pub mismatch: bool,
}

/// Consumer end of a [`SharedMemorySink`].
#[derive(Debug)]
pub struct FrameReceiver {
    shared: Arc<Shared>,
    frame_index: u64,
}

impl FrameReceiver {
    /// Requests a frame and waits briefly for the sender to publish one.
    pub fn receive(&mut self, width: u32, height: u32) -> ReceiveResult {
        let mut slot = self.shared.lock();
        slot.frame_wanted = true;
        let (mut slot, _) = self
            .shared
            .sent
            .wait_timeout_while(slot, RECEIVE_TIMEOUT, |slot| !slot.frame_sent)
            .unwrap_or_else(PoisonError::into_inner);

        let is_new = std::mem::take(&mut slot.frame_sent);
        if !slot.has_frame {
            return ReceiveResult::Inactive;
        }

        let frame = Self::scale_to_output(&slot, width, height);
        drop(slot);

        if is_new {
            self.frame_index += 1;
            ReceiveResult::NewFrame(frame)
        } else {
            ReceiveResult::OldFrame(frame)
        }
    }

    /// Number of new frames received so far.
    pub fn frames_received(&self) -> u64 {
        self.frame_index
    }

    fn scale_to_output(slot: &Slot, width: u32, height: u32) -> ReceivedFrame {
        let source_size = (slot.width, slot.height);
        let out_len = width as usize * height as usize * 3;

        if source_size == (width, height) {
            return ReceivedFrame {
                width,
                height,
                data: slot.data.clone(),
                source_size,
                mismatch: false,
            };
        }

        let scaled = match slot.resize_mode {
            ResizeMode::RejectMismatch => None,
            ResizeMode::LinearResize => letterbox(&slot.data, source_size, width, height),
        };

        match scaled {
            Some(data) => ReceivedFrame {
                width,
                height,
                data,
                source_size,
                mismatch: false,
            },
            None => ReceivedFrame {
                width,
                height,
                data: MISMATCH_FILL.iter().copied().cycle().take(out_len).collect(),
                source_size,
                mismatch: true,
            },
        }
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        let mut slot = self.shared.lock();
        slot.receivers = slot.receivers.saturating_sub(1);
    }
}

/// Scales `data` to fit `width` x `height`, preserving aspect ratio with black borders.
fn letterbox(data: &[u8], source: (u32, u32), width: u32, height: u32) -> Option<Vec<u8>> {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
        return None;
    }
    let img = RgbImage::from_raw(src_w, src_h, data.to_vec())?;

    let scale = (width as f64 / src_w as f64).min(height as f64 / src_h as f64);
    let new_width = ((src_w as f64 * scale).round() as u32).clamp(1, width);
    let new_height = ((src_h as f64 * scale).round() as u32).clamp(1, height);
    let resized = imageops::resize(&img, new_width, new_height, FilterType::Triangle);

    let mut canvas = RgbImage::new(width, height);
    let x = (width - new_width) / 2;
    let y = (height - new_height) / 2;
    imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
    Some(canvas.into_raw())
}
