//! Render-side staging of captured frames
//!
//! Bridges the frame slot to whatever uploads textures: a pure
//! pixel-format-to-render-layout table, plus a staging surface that applies
//! the left shift packed sub-16-bit formats need before upload.

use std::time::Instant;

use crate::capture::frame::PixelFormat;
use crate::capture::slot::FrameSlot;

/// Pixel layout of the uploaded render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderLayout {
    Gray8,
    Gray16,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Rgb16,
    Bgr16,
}

impl RenderLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            RenderLayout::Gray8 => 1,
            RenderLayout::Gray16 => 2,
            RenderLayout::Rgb8 | RenderLayout::Bgr8 => 3,
            RenderLayout::Rgba8 | RenderLayout::Bgra8 => 4,
            RenderLayout::Rgb16 | RenderLayout::Bgr16 => 6,
        }
    }

    /// Whether samples are 16-bit words (and may need shifting).
    pub fn is_wide(self) -> bool {
        matches!(
            self,
            RenderLayout::Gray16 | RenderLayout::Rgb16 | RenderLayout::Bgr16
        )
    }
}

/// Upload layout plus the left shift that brings packed samples to full range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSpec {
    pub layout: RenderLayout,
    pub shift: u32,
}

/// Pure lookup from capture format to render spec. 10/12/14-bit samples live
/// in 16-bit words and are shifted up so downstream consumers see full-range
/// values.
pub fn render_spec(format: PixelFormat) -> RenderSpec {
    let (layout, shift) = match format {
        PixelFormat::Mono8 => (RenderLayout::Gray8, 0),
        PixelFormat::Mono10 => (RenderLayout::Gray16, 6),
        PixelFormat::Mono12 => (RenderLayout::Gray16, 4),
        PixelFormat::Mono14 => (RenderLayout::Gray16, 2),
        PixelFormat::Mono16 => (RenderLayout::Gray16, 0),
        PixelFormat::Rgb8 => (RenderLayout::Rgb8, 0),
        PixelFormat::Bgr8 => (RenderLayout::Bgr8, 0),
        PixelFormat::Rgba8 => (RenderLayout::Rgba8, 0),
        PixelFormat::Bgra8 => (RenderLayout::Bgra8, 0),
        PixelFormat::Rgb16 => (RenderLayout::Rgb16, 0),
        PixelFormat::Bgr16 => (RenderLayout::Bgr16, 0),
    };
    RenderSpec { layout, shift }
}

/// Outcome of one display tick for one camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceUpdate {
    /// No new frame since the last tick; keep drawing the previous upload.
    Unchanged,
    /// New samples copied in; update the existing render target in place.
    Updated,
    /// Dimensions or format changed; the render target must be recreated at
    /// the surface's new geometry before uploading.
    Reallocated,
}

/// CPU-side staging buffer fed from a [`FrameSlot`] once per display tick.
#[derive(Default)]
pub struct RenderSurface {
    width: u32,
    height: u32,
    layout: Option<RenderLayout>,
    pixels: Vec<u8>,
}

impl RenderSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the slot. The slot lock is held only for the copy.
    pub fn refresh(&mut self, slot: &FrameSlot) -> SurfaceUpdate {
        let read = slot.consume();
        if !read.has_new_data() {
            return SurfaceUpdate::Unchanged;
        }
        let Some(data) = read.data() else {
            return SurfaceUpdate::Unchanged;
        };
        let started = Instant::now();

        let spec = render_spec(read.format());
        let realloc = read.needs_realloc();
        if realloc {
            self.width = read.width();
            self.height = read.height();
            self.layout = Some(spec.layout);
            self.pixels =
                vec![0; spec.layout.bytes_per_pixel() * self.width as usize * self.height as usize];
        }

        let len = self.pixels.len().min(data.len());
        if spec.layout.is_wide() && spec.shift > 0 {
            for (out, chunk) in self.pixels[..len]
                .chunks_exact_mut(2)
                .zip(data[..len].chunks_exact(2))
            {
                let sample = u16::from_ne_bytes([chunk[0], chunk[1]]) << spec.shift;
                out.copy_from_slice(&sample.to_ne_bytes());
            }
        } else {
            self.pixels[..len].copy_from_slice(&data[..len]);
        }

        metrics::histogram!("surface_copy_us").record(started.elapsed().as_micros() as f64);
        if realloc {
            SurfaceUpdate::Reallocated
        } else {
            SurfaceUpdate::Updated
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Layout of the staged pixels; `None` until the first frame lands.
    pub fn layout(&self) -> Option<RenderLayout> {
        self.layout
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{Frame, FrameMetadata};
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Instant;

    fn frame(seq: u64, width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Frame {
        Frame {
            data: Bytes::from(data),
            meta: Arc::new(FrameMetadata {
                sequence: seq,
                width,
                height,
                stride: width,
                format,
            }),
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn packed_formats_map_to_wide_gray_with_shift() {
        assert_eq!(
            render_spec(PixelFormat::Mono10),
            RenderSpec { layout: RenderLayout::Gray16, shift: 6 }
        );
        assert_eq!(
            render_spec(PixelFormat::Mono12),
            RenderSpec { layout: RenderLayout::Gray16, shift: 4 }
        );
        assert_eq!(
            render_spec(PixelFormat::Mono14),
            RenderSpec { layout: RenderLayout::Gray16, shift: 2 }
        );
        assert_eq!(render_spec(PixelFormat::Mono16).shift, 0);
        assert_eq!(render_spec(PixelFormat::Mono8).layout, RenderLayout::Gray8);
        assert_eq!(render_spec(PixelFormat::Rgb8).layout, RenderLayout::Rgb8);
    }

    #[test]
    fn packed_samples_are_shifted_to_full_range() {
        let slot = FrameSlot::new();
        let mut samples = Vec::new();
        for value in [0x0123u16, 0x0fff, 0x0000, 0x0800] {
            samples.extend(value.to_ne_bytes());
        }
        slot.publish(frame(1, 2, 2, PixelFormat::Mono12, samples));

        let mut surface = RenderSurface::new();
        assert_eq!(surface.refresh(&slot), SurfaceUpdate::Reallocated);

        let staged: Vec<u16> = surface
            .pixels()
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(staged, vec![0x1230, 0xfff0, 0x0000, 0x8000]);
    }

    #[test]
    fn refresh_tracks_slot_transitions() {
        let slot = FrameSlot::new();
        let mut surface = RenderSurface::new();
        assert_eq!(surface.refresh(&slot), SurfaceUpdate::Unchanged);

        slot.publish(frame(1, 4, 2, PixelFormat::Mono8, vec![9u8; 8]));
        assert_eq!(surface.refresh(&slot), SurfaceUpdate::Reallocated);
        assert_eq!((surface.width(), surface.height()), (4, 2));
        assert_eq!(surface.layout(), Some(RenderLayout::Gray8));

        assert_eq!(surface.refresh(&slot), SurfaceUpdate::Unchanged);

        slot.publish(frame(2, 4, 2, PixelFormat::Mono8, vec![7u8; 8]));
        assert_eq!(surface.refresh(&slot), SurfaceUpdate::Updated);
        assert_eq!(surface.pixels()[0], 7);

        slot.publish(frame(3, 8, 4, PixelFormat::Mono8, vec![1u8; 32]));
        assert_eq!(surface.refresh(&slot), SurfaceUpdate::Reallocated);
        assert_eq!((surface.width(), surface.height()), (8, 4));
    }
}
