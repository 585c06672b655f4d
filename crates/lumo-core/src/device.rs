//! The hardware output seam.

use std::sync::Mutex;

use crate::color::{Frame, Rgb};

/// An LED output target.
///
/// Implementations must be cheap to call at animation frame rates (tens of
/// Hz) and idempotent for repeated identical colors. Single-color targets
/// only need `set_color`; multi-pixel targets also implement `set_pixel` and
/// `show`.
pub trait OutputDevice: Send + Sync {
    /// Set the primary output color.
    fn set_color(&self, color: Rgb);

    /// Set one pixel on a multi-pixel target. Default: ignored.
    fn set_pixel(&self, index: usize, color: Rgb) {
        let _ = (index, color);
    }

    /// Flush pixel writes to the hardware. Default: no-op.
    fn show(&self) {}

    /// Push a full frame: primary color plus any per-pixel channels.
    fn push_frame(&self, frame: &Frame) {
        self.set_color(frame.primary);
        if let Some(pixels) = &frame.pixels {
            for (i, px) in pixels.iter().enumerate() {
                self.set_pixel(i, *px);
            }
            self.show();
        }
    }
}

/// Device that discards all output.
#[derive(Debug, Default)]
pub struct NullDevice;

impl OutputDevice for NullDevice {
    fn set_color(&self, _color: Rgb) {}
}

/// Device that records every pushed color, for tests and demos.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    colors: Mutex<Vec<Rgb>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently pushed color.
    pub fn last(&self) -> Option<Rgb> {
        self.colors.lock().expect("device lock").last().copied()
    }

    /// All pushed colors, in order.
    pub fn history(&self) -> Vec<Rgb> {
        self.colors.lock().expect("device lock").clone()
    }

    /// Number of pushes seen.
    pub fn push_count(&self) -> usize {
        self.colors.lock().expect("device lock").len()
    }
}

impl OutputDevice for RecordingDevice {
    fn set_color(&self, color: Rgb) {
        self.colors.lock().expect("device lock").push(color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_device_tracks_history() {
        let device = RecordingDevice::new();
        device.set_color(Rgb(1, 2, 3));
        device.set_color(Rgb(4, 5, 6));
        assert_eq!(device.last(), Some(Rgb(4, 5, 6)));
        assert_eq!(device.history(), vec![Rgb(1, 2, 3), Rgb(4, 5, 6)]);
    }

    #[test]
    fn test_push_frame_sets_primary() {
        let device = RecordingDevice::new();
        device.push_frame(&Frame::solid(Rgb(9, 9, 9)));
        assert_eq!(device.last(), Some(Rgb(9, 9, 9)));
    }
}
