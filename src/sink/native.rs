//! Capture sink backed by the native capture plugin.
//!
//! The plugin reads the GPU texture on the render thread's device, converts
//! it and pushes it to the virtual camera filter. Only compiled with the
//! `native-plugin` feature, since it needs the plugin library at link time.

#![allow(non_snake_case)]

use super::{CaptureSink, SendStatus, SubmitConfig};
use crate::error::SinkError;
use crate::frame::FrameImage;
use std::ffi::c_void;
use std::ptr::NonNull;
use tracing::{debug, info};

#[link(name = "UnityCapturePlugin")]
extern "C" {
    /// Allocates plugin state. Returns null on failure.
    fn CaptureCreateInstance() -> *mut c_void;

    /// Frees plugin state. Accepts null.
    fn CaptureDeleteInstance(instance: *mut c_void);

    /// Reads `texture` and sends it to the capture device. Flags are 32-bit BOOLs.
    fn CaptureSendTexture(
        instance: *mut c_void,
        texture: *mut c_void,
        double_buffering: i32,
        resize_mode: i32,
        mirror_mode: i32,
    ) -> i32;
}

/// Instance allocated by the plugin.
#[derive(Debug)]
pub struct NativeInstance {
    ptr: NonNull<c_void>,
}

/// Sink calling into the native capture plugin.
#[derive(Debug, Default)]
pub struct NativeSink;

impl NativeSink {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureSink for NativeSink {
    type Instance = NativeInstance;

    fn create_instance(&mut self) -> Result<NativeInstance, SinkError> {
        // SAFETY: takes no arguments; ownership of the result passes to us.
        let ptr = unsafe { CaptureCreateInstance() };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            SinkError::InstanceUnavailable("CaptureCreateInstance returned null".to_string())
        })?;
        info!("Native capture instance created");
        Ok(NativeInstance { ptr })
    }

    fn destroy_instance(&mut self, instance: NativeInstance) {
        // SAFETY: the pointer came from CaptureCreateInstance and is consumed here.
        unsafe { CaptureDeleteInstance(instance.ptr.as_ptr()) };
        debug!("Native capture instance deleted");
    }

    fn submit(
        &mut self,
        instance: &mut NativeInstance,
        image: &FrameImage<'_>,
        config: &SubmitConfig,
    ) -> SendStatus {
        let FrameImage::Native(texture) = image else {
            // The plugin reads from the graphics device, not from CPU memory.
            return SendStatus::UnsupportedDevice;
        };

        // SAFETY: the instance is live until destroy_instance, and the
        // texture handle is valid for the duration of this call.
        let code = unsafe {
            CaptureSendTexture(
                instance.ptr.as_ptr(),
                texture.as_ptr(),
                config.double_buffering as i32,
                config.resize_mode.code(),
                config.mirror_mode.code(),
            )
        };
        SendStatus::from_code(code)
    }
}
