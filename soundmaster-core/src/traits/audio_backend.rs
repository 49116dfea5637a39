use std::sync::Arc;

use crate::models::audio_models::{
    Application, ApplicationId, AudioUsage, OutputDevice, StreamFormat,
};
use crate::models::error::RoutingError;

/// A read-only audio source scoped to one application's output.
///
/// `read` blocks until a frame is available. `close` may be called from any
/// thread and must make a blocked `read` return (with `Ok(0)` or an error).
pub trait CaptureStream: Send + Sync {
    /// Fill `buf` with interleaved 16-bit little-endian PCM.
    ///
    /// Returns the number of bytes written; `Ok(0)` means end of stream.
    fn read(&self, buf: &mut [u8]) -> Result<usize, RoutingError>;

    /// Stop and release the stream. Idempotent.
    fn close(&self) -> Result<(), RoutingError>;
}

/// A writable audio destination bound to one device.
pub trait OutputStream: Send {
    /// Write interleaved 16-bit little-endian PCM.
    fn write(&mut self, pcm: &[u8]) -> Result<(), RoutingError>;

    /// Stop and release the stream. Idempotent.
    fn close(&mut self) -> Result<(), RoutingError>;
}

/// Platform audio primitives.
pub trait AudioBackend: Send + Sync {
    /// Open a capture stream matching `usages` for the given application.
    fn open_capture_stream(
        &self,
        app: &ApplicationId,
        usages: &[AudioUsage],
        format: &StreamFormat,
    ) -> Result<Arc<dyn CaptureStream>, RoutingError>;

    /// Open an output stream on `device`, or on the default output when `None`.
    fn open_output_stream(
        &self,
        device: Option<&OutputDevice>,
        format: &StreamFormat,
    ) -> Result<Box<dyn OutputStream>, RoutingError>;
}

/// Enumeration of capturable applications and output devices.
pub trait Catalog: Send + Sync {
    fn list_applications(&self) -> Result<Vec<Application>, RoutingError>;

    fn list_output_devices(&self) -> Result<Vec<OutputDevice>, RoutingError>;
}
