//! Captured frame and its per-frame chunk metadata.

/// Auxiliary data delivered by the camera alongside the image payload.
///
/// The device timestamp is the camera's internal monotonic counter value
/// at capture time; exposure and gain are the values actually in effect
/// for this frame (relevant when the camera resolves them automatically).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkMeta {
    /// Device-clock timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Exposure time at capture, in microseconds.
    pub exposure_us: f64,
    /// Gain at capture, in camera-specific units.
    pub gain: f64,
}

/// A single frame received from a camera.
///
/// Owned exclusively by the session that received it until it is handed
/// to the frame sink, then discarded. The pixel buffer is RGB8, already
/// converted from the sensor format by the transport layer.
#[derive(Clone)]
pub struct CapturedFrame {
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    chunk: Option<ChunkMeta>,
}

impl CapturedFrame {
    /// Creates a frame from an RGB8 buffer and optional chunk metadata.
    pub fn new(buffer: Vec<u8>, width: u32, height: u32, chunk: Option<ChunkMeta>) -> Self {
        Self {
            buffer,
            width,
            height,
            chunk,
        }
    }

    /// Returns the RGB8 pixel buffer.
    #[inline]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns the frame width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the chunk metadata, if it was readable on this frame.
    #[inline]
    pub fn chunk(&self) -> Option<&ChunkMeta> {
        self.chunk.as_ref()
    }

    /// Validates that the buffer size matches the RGB8 dimensions.
    pub fn is_valid(&self) -> bool {
        self.buffer.len() == (self.width as usize) * (self.height as usize) * 3
    }
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("chunk", &self.chunk)
            .field("buffer_bytes", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_valid_size() {
        let frame = CapturedFrame::new(vec![0u8; 8 * 6 * 3], 8, 6, None);
        assert!(frame.is_valid());
        assert!(frame.chunk().is_none());
    }

    #[test]
    fn test_frame_invalid_size() {
        let frame = CapturedFrame::new(vec![0u8; 10], 8, 6, None);
        assert!(!frame.is_valid());
    }

    #[test]
    fn test_chunk_meta_carried() {
        let chunk = ChunkMeta {
            timestamp_ns: 42,
            exposure_us: 5000.0,
            gain: 2.5,
        };
        let frame = CapturedFrame::new(vec![0u8; 3], 1, 1, Some(chunk));
        assert_eq!(frame.chunk().map(|c| c.timestamp_ns), Some(42));
    }
}
