// Bitmap production strategies
//
// The controller describes what to draw as a strategy; the surface thread
// runs the strategy against its current client size and previous bitmap.
// Draw callbacks are caller code, so panics are contained here rather than
// allowed to take down the surface thread.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::oneshot;

use crate::metrics::Metrics;
use crate::protocol::Size;

/// An opaque pixel buffer, one `u32` per pixel, row-major.
///
/// Interpretation of the pixel values is up to the pane implementation;
/// nothing in this crate renders them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    size: Size,
    pixels: Vec<u32>,
}

impl Bitmap {
    /// Allocate a zero-filled bitmap.
    pub fn new(size: Size) -> Self {
        Self {
            size,
            pixels: vec![0; size.width as usize * size.height as usize],
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }
}

/// How the surface should obtain the bitmap for a canvas request.
pub enum BitmapSource {
    /// Draw into a fresh bitmap of a fixed size. The previous bitmap is
    /// dropped on success; on a draw panic it is kept and shown unchanged.
    DrawFixed {
        size: Size,
        draw: Box<dyn FnMut(&mut Bitmap) + Send>,
    },

    /// Create a bitmap sized by the strategy from the current client size.
    /// The previous bitmap is handed back through the slot if one is
    /// attached, otherwise dropped.
    Swap {
        create: Box<dyn FnMut(Size) -> Bitmap + Send>,
        previous_return: Option<oneshot::Sender<Bitmap>>,
    },

    /// Fully general: the strategy receives the previous bitmap (if any) and
    /// the client size, and owns disposal of whatever it discards.
    WithPrevious {
        create: Box<dyn FnMut(Option<Bitmap>, Size) -> Bitmap + Send>,
    },
}

impl BitmapSource {
    /// Run the strategy once and return the bitmap the surface should now
    /// hold, which may be `previous` itself when a panicking draw is
    /// contained.
    ///
    /// `DrawFixed` and `Swap` keep `previous` across a panic. `WithPrevious`
    /// cannot: the previous bitmap was already moved into the callback, so a
    /// panic there leaves the surface with no bitmap and the pane keeps
    /// showing whatever it last presented.
    pub fn produce(
        self,
        previous: Option<Bitmap>,
        client_size: Size,
        metrics: &Metrics,
    ) -> Option<Bitmap> {
        match self {
            Self::DrawFixed { size, mut draw } => {
                let mut bitmap = Bitmap::new(size);
                match catch_unwind(AssertUnwindSafe(move || {
                    draw(&mut bitmap);
                    bitmap
                })) {
                    Ok(bitmap) => Some(bitmap),
                    Err(_) => {
                        tracing::error!("draw callback panicked, keeping previous bitmap");
                        metrics.record_draw_failure();
                        previous
                    }
                }
            }
            Self::Swap {
                mut create,
                previous_return,
            } => match catch_unwind(AssertUnwindSafe(move || create(client_size))) {
                Ok(bitmap) => {
                    if let (Some(slot), Some(old)) = (previous_return, previous) {
                        let _ = slot.send(old);
                    }
                    Some(bitmap)
                }
                Err(_) => {
                    tracing::error!("bitmap factory panicked, keeping previous bitmap");
                    metrics.record_draw_failure();
                    previous
                }
            },
            Self::WithPrevious { mut create } => {
                match catch_unwind(AssertUnwindSafe(move || create(previous, client_size))) {
                    Ok(bitmap) => Some(bitmap),
                    Err(_) => {
                        tracing::error!("bitmap factory panicked, previous bitmap lost");
                        metrics.record_draw_failure();
                        None
                    }
                }
            }
        }
    }
}
