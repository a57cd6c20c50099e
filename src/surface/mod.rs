// Surface-side subsystem
//
// The interaction state machine ([`SurfaceDriver`]) runs on a dedicated
// surface thread behind a posted-closure execution context
// ([`spawn_surface`] / [`SurfaceHandle`]). The actual windowing toolkit sits
// behind the [`SurfacePane`] trait; tests drive the machine with fakes.

use crate::protocol::{Bitmap, ButtonSet, ParentHandle, Size};

pub mod context;
pub mod driver;

pub use context::{SurfaceHandle, spawn_surface};
pub use driver::SurfaceDriver;

/// Which pane the surface window is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneKind {
    /// Canvas only.
    Canvas,
    /// Canvas with a text input row underneath.
    CanvasWithTextInput,
    /// Multi-line text editor with a button row.
    BigText,
    /// Busy indicator, optionally with a cancel button.
    Busy,
}

/// Answer to the host's close request callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseResponse {
    /// Veto the close; the window stays open.
    KeepOpen,
    /// Let the window close.
    Close,
}

/// The rendering surface the driver manipulates.
///
/// Implementations wrap a real window; every method is called on the surface
/// thread only. The driver never interprets pixels or lays out widgets, it
/// just tells the pane what to show.
pub trait SurfacePane {
    /// Current drawable area of the window.
    fn client_size(&self) -> Size;

    /// Switch the visible pane.
    fn set_pane(&mut self, kind: PaneKind);

    /// Show a bitmap on the canvas pane.
    fn present_canvas(&mut self, bitmap: &Bitmap);

    /// Empty the canvas text input row.
    fn clear_text_input(&mut self);

    /// Populate and show the big-text editor.
    fn show_big_text(&mut self, label: &str, content: &str, read_only: bool, buttons: ButtonSet);

    /// Current contents of the big-text editor.
    fn big_text_content(&self) -> String;

    /// Populate and show the busy pane.
    fn show_busy(&mut self, message: &str, progress: Option<f64>, cancellable: bool);

    /// Grey out the busy pane's cancel button after it has been used.
    fn disable_busy_cancel(&mut self);

    /// Window handle for parenting modal dialogs.
    fn parent_handle(&self) -> ParentHandle;

    /// Tear the window down; called once when the request stream ends.
    fn close_window(&mut self);
}
