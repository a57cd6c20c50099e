// Protocol vocabulary
//
// The closed request/event vocabulary exchanged between the controller and
// the surface thread. Requests flow surface-ward, events flow back; every
// request is answered by exactly one event.

use std::any::Any;
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub mod bitmap;

pub use bitmap::{Bitmap, BitmapSource};

bitflags! {
    /// Which user interactions the controller is interested in while a
    /// canvas request is outstanding. Inputs whose flag is not set are
    /// absorbed by the surface without producing an event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventFlags: u32 {
        const TIMER_TICK = 1;
        const MOUSE_CLICK = 2;
        const TEXT_ENTRY = 4;
        /// Clear the text input box when the canvas pane is shown.
        const NEW_TEXT_ENTRY = 8;
        const KEY_DOWN = 16;
        const SIZE_CHANGED = 32;
    }
}

impl EventFlags {
    /// Whether the canvas pane should carry a text input row.
    pub fn wants_text_input(self) -> bool {
        self.contains(EventFlags::TEXT_ENTRY)
    }
}

/// Surface dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Platform key identifier, passed through without interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCode(pub u32);

/// Opaque handle to the surface window, usable as a modal dialog parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentHandle(pub u64);

/// Button rows available on the big-text pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonSet {
    Ok,
    OkCancel,
    YesNo,
    YesNoCancel,
}

/// Which button the user pressed on the big-text pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonChoice {
    Ok,
    Cancel,
    Yes,
    No,
}

/// A deferred modal interaction, run on the surface thread with the surface
/// window as parent. The boxed result travels back verbatim inside
/// [`SurfaceEvent::DialogResult`].
pub type ModalCall = Box<dyn FnOnce(ParentHandle) -> Box<dyn Any + Send> + Send>;

/// A request from the controller to the surface.
pub enum SurfaceRequest {
    /// Present a canvas produced by `source` and wait for the next user
    /// interaction matching `flags`.
    GetEvent {
        source: BitmapSource,
        flags: EventFlags,
    },

    /// Show the big-text editor pane and wait for a button press.
    GetBigText {
        label: String,
        read_only: bool,
        content: String,
        /// Write-once slot for the edited text; written on button press or
        /// when the user abandons the pane by closing the window.
        content_return: Option<oneshot::Sender<String>>,
        buttons: ButtonSet,
    },

    /// Show the busy pane. Acknowledged immediately with
    /// [`SurfaceEvent::BusyDisplayed`]; the controller keeps working and the
    /// optional token lets the user request cancellation.
    ShowBusy {
        message: String,
        progress: Option<f64>,
        cancel: Option<CancellationToken>,
    },

    /// Run a modal interaction on the surface thread.
    ShowModal(ModalCall),

    /// Poll for a close request queued while no request was outstanding.
    CheckPendingClose,
}

impl fmt::Debug for SurfaceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetEvent { flags, .. } => {
                f.debug_struct("GetEvent").field("flags", flags).finish()
            }
            Self::GetBigText {
                label,
                read_only,
                buttons,
                ..
            } => f
                .debug_struct("GetBigText")
                .field("label", label)
                .field("read_only", read_only)
                .field("buttons", buttons)
                .finish(),
            Self::ShowBusy {
                message,
                progress,
                cancel,
            } => f
                .debug_struct("ShowBusy")
                .field("message", message)
                .field("progress", progress)
                .field("cancellable", &cancel.is_some())
                .finish(),
            Self::ShowModal(_) => f.write_str("ShowModal"),
            Self::CheckPendingClose => f.write_str("CheckPendingClose"),
        }
    }
}

/// A single answer from the surface to an outstanding request.
pub enum SurfaceEvent {
    /// The timer fired while `TIMER_TICK` was requested.
    TimerTick,

    /// The user asked to close the window while a request was outstanding,
    /// or a queued close answered this request.
    UserCloseRequest,

    /// `CheckPendingClose` found no queued close.
    Nothing,

    /// Mouse click at surface coordinates.
    MouseClick { x: f64, y: f64 },

    /// Key press while `KEY_DOWN` was requested.
    KeyDown(KeyCode),

    /// Text submitted from the canvas input row.
    TextEntry(String),

    /// Button press on the big-text pane, with the edited content.
    BigTextEntry { button: ButtonChoice, text: String },

    /// Acknowledgement that the busy pane is showing.
    BusyDisplayed,

    /// Result of a `ShowModal` call, boxed verbatim.
    DialogResult(Box<dyn Any + Send>),

    /// The surface was resized while `SIZE_CHANGED` was requested.
    SizeChanged(Size),
}

impl fmt::Debug for SurfaceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimerTick => f.write_str("TimerTick"),
            Self::UserCloseRequest => f.write_str("UserCloseRequest"),
            Self::Nothing => f.write_str("Nothing"),
            Self::MouseClick { x, y } => f
                .debug_struct("MouseClick")
                .field("x", x)
                .field("y", y)
                .finish(),
            Self::KeyDown(code) => f.debug_tuple("KeyDown").field(code).finish(),
            Self::TextEntry(text) => f.debug_tuple("TextEntry").field(text).finish(),
            Self::BigTextEntry { button, text } => f
                .debug_struct("BigTextEntry")
                .field("button", button)
                .field("text", text)
                .finish(),
            Self::BusyDisplayed => f.write_str("BusyDisplayed"),
            Self::DialogResult(_) => f.write_str("DialogResult"),
            Self::SizeChanged(size) => f.debug_tuple("SizeChanged").field(size).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_match_wire_values() {
        assert_eq!(EventFlags::TIMER_TICK.bits(), 1);
        assert_eq!(EventFlags::MOUSE_CLICK.bits(), 2);
        assert_eq!(EventFlags::TEXT_ENTRY.bits(), 4);
        assert_eq!(EventFlags::NEW_TEXT_ENTRY.bits(), 8);
        assert_eq!(EventFlags::KEY_DOWN.bits(), 16);
        assert_eq!(EventFlags::SIZE_CHANGED.bits(), 32);
    }

    #[test]
    fn text_entry_flag_implies_text_input() {
        assert!(EventFlags::TEXT_ENTRY.wants_text_input());
        assert!((EventFlags::MOUSE_CLICK | EventFlags::TEXT_ENTRY).wants_text_input());
        assert!(!EventFlags::MOUSE_CLICK.wants_text_input());
        assert!(!EventFlags::empty().wants_text_input());
    }

    #[test]
    fn request_debug_omits_payloads() {
        let request = SurfaceRequest::ShowModal(Box::new(|_| Box::new(0u32)));
        assert_eq!(format!("{:?}", request), "ShowModal");

        let request = SurfaceRequest::ShowBusy {
            message: "working".into(),
            progress: Some(0.5),
            cancel: None,
        };
        let rendered = format!("{:?}", request);
        assert!(rendered.contains("working"));
        assert!(rendered.contains("cancellable: false"));
    }

    #[test]
    fn dialog_result_payload_round_trips_through_any() {
        let event = SurfaceEvent::DialogResult(Box::new(42i32));
        match event {
            SurfaceEvent::DialogResult(payload) => {
                assert_eq!(*payload.downcast::<i32>().unwrap(), 42);
            }
            other => panic!("expected dialog result, got {:?}", other),
        }
    }
}
