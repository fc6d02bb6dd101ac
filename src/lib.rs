//! framesink: hands rendered frames to a virtual webcam capture sink.
//!
//! A host render loop owns a [`bridge::FrameSinkBridge`], calls its
//! [`host::FrameHook`] methods, and gets every sink outcome logged without
//! ever stopping rendering.

pub mod bridge;
pub mod config;
pub mod error;
pub mod frame;
pub mod host;
pub mod outcome;
pub mod sink;
