// Interaction state machine
//
// Owns the per-window protocol state: which pane is showing, whether a
// request is outstanding, and what the answer to the next host input or
// close attempt should be. All methods run on the surface thread; the
// execution context in `context.rs` serializes the calls.

use std::sync::Arc;

use crate::channel::ChannelSender;
use crate::metrics::Metrics;
use crate::protocol::{
    Bitmap, ButtonChoice, EventFlags, KeyCode, Size, SurfaceEvent, SurfaceRequest,
};
use crate::surface::{CloseResponse, PaneKind, SurfacePane};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

enum InteractionState {
    /// No request outstanding; the pane shows whatever was last requested.
    Idle(PaneKind),
    /// A canvas request awaits one of the interactions named by the flags.
    AwaitingCanvasEvent(EventFlags),
    /// The big-text editor awaits a button press. The slot, if present,
    /// receives the edited content exactly once.
    AwaitingBigText(Option<oneshot::Sender<String>>),
    /// The busy pane is showing; the acknowledgement has already been sent
    /// and the next request will replace this state.
    Busy(Option<CancellationToken>),
}

pub struct SurfaceDriver<P: SurfacePane> {
    pane: P,
    events: ChannelSender<SurfaceEvent>,
    metrics: Arc<Metrics>,
    state: InteractionState,
    bitmap: Option<Bitmap>,
    /// A close arrived while idle; it answers the next inbound request.
    pending_close: bool,
    /// The request stream has ended; no further events will be sent.
    closing: bool,
}

impl<P: SurfacePane> SurfaceDriver<P> {
    pub fn new(pane: P, events: ChannelSender<SurfaceEvent>, metrics: Arc<Metrics>) -> Self {
        Self {
            pane,
            events,
            metrics,
            state: InteractionState::Idle(PaneKind::Canvas),
            bitmap: None,
            pending_close: false,
            closing: false,
        }
    }

    /// Whether the request stream has ended and the context should stop.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    fn emit(&self, event: SurfaceEvent) {
        self.metrics.record_event_emitted();
        self.events.send(event);
    }

    fn canvas_kind(flags: EventFlags) -> PaneKind {
        if flags.wants_text_input() {
            PaneKind::CanvasWithTextInput
        } else {
            PaneKind::Canvas
        }
    }

    /// Handle one inbound request.
    ///
    /// # Panics
    /// Panics if a request arrives while a canvas or big-text request is
    /// still unanswered; the controller must await each response before
    /// sending the next request.
    pub fn on_request(&mut self, request: SurfaceRequest) {
        if self.closing {
            tracing::warn!(?request, "request after end-of-stream ignored");
            return;
        }
        self.metrics.record_request_handled();
        tracing::debug!(?request, "handling request");

        if self.pending_close {
            // The queued close answers this request; the request itself is
            // dropped unhandled.
            self.pending_close = false;
            self.emit(SurfaceEvent::UserCloseRequest);
            return;
        }

        assert!(
            matches!(
                self.state,
                InteractionState::Idle(_) | InteractionState::Busy(_)
            ),
            "request received while a previous request is outstanding"
        );

        match request {
            SurfaceRequest::GetEvent { source, flags } => {
                let client_size = self.pane.client_size();
                if let Some(bitmap) = source.produce(self.bitmap.take(), client_size, &self.metrics)
                {
                    self.pane.present_canvas(&bitmap);
                    self.bitmap = Some(bitmap);
                }
                self.pane.set_pane(Self::canvas_kind(flags));
                if flags.contains(EventFlags::NEW_TEXT_ENTRY) {
                    self.pane.clear_text_input();
                }
                self.state = InteractionState::AwaitingCanvasEvent(flags);
            }
            SurfaceRequest::GetBigText {
                label,
                read_only,
                content,
                content_return,
                buttons,
            } => {
                self.pane.show_big_text(&label, &content, read_only, buttons);
                self.pane.set_pane(PaneKind::BigText);
                self.state = InteractionState::AwaitingBigText(content_return);
            }
            SurfaceRequest::ShowBusy {
                message,
                progress,
                cancel,
            } => {
                self.pane.show_busy(&message, progress, cancel.is_some());
                self.pane.set_pane(PaneKind::Busy);
                self.state = InteractionState::Busy(cancel);
                self.emit(SurfaceEvent::BusyDisplayed);
            }
            SurfaceRequest::ShowModal(call) => {
                let result = call(self.pane.parent_handle());
                self.emit(SurfaceEvent::DialogResult(result));
            }
            SurfaceRequest::CheckPendingClose => {
                self.emit(SurfaceEvent::Nothing);
            }
        }
    }

    /// The request channel reached end-of-stream: finish the event stream
    /// and tear the window down.
    pub fn on_request_eof(&mut self) {
        if self.closing {
            return;
        }
        tracing::info!("request stream ended, closing surface");
        self.closing = true;
        self.events.send_eof();
        self.pane.close_window();
    }

    pub fn on_mouse_click(&mut self, x: f64, y: f64) {
        if let InteractionState::AwaitingCanvasEvent(flags) = self.state
            && flags.contains(EventFlags::MOUSE_CLICK)
        {
            self.state = InteractionState::Idle(Self::canvas_kind(flags));
            self.emit(SurfaceEvent::MouseClick { x, y });
        }
    }

    pub fn on_key_down(&mut self, code: KeyCode) {
        if let InteractionState::AwaitingCanvasEvent(flags) = self.state
            && flags.contains(EventFlags::KEY_DOWN)
        {
            self.state = InteractionState::Idle(Self::canvas_kind(flags));
            self.emit(SurfaceEvent::KeyDown(code));
        }
    }

    pub fn on_text_submitted(&mut self, text: String) {
        if let InteractionState::AwaitingCanvasEvent(flags) = self.state
            && flags.contains(EventFlags::TEXT_ENTRY)
        {
            self.pane.clear_text_input();
            self.state = InteractionState::Idle(PaneKind::Canvas);
            self.emit(SurfaceEvent::TextEntry(text));
        }
    }

    pub fn on_timer_tick(&mut self) {
        if let InteractionState::AwaitingCanvasEvent(flags) = self.state
            && flags.contains(EventFlags::TIMER_TICK)
        {
            self.state = InteractionState::Idle(Self::canvas_kind(flags));
            self.emit(SurfaceEvent::TimerTick);
        }
    }

    pub fn on_size_changed(&mut self, size: Size) {
        if let InteractionState::AwaitingCanvasEvent(flags) = self.state
            && flags.contains(EventFlags::SIZE_CHANGED)
        {
            self.state = InteractionState::Idle(Self::canvas_kind(flags));
            self.emit(SurfaceEvent::SizeChanged(size));
        }
    }

    pub fn on_big_text_button(&mut self, button: ButtonChoice) {
        if let InteractionState::AwaitingBigText(slot) = &mut self.state {
            let text = self.pane.big_text_content();
            if let Some(slot) = slot.take() {
                let _ = slot.send(text.clone());
            }
            self.state = InteractionState::Idle(PaneKind::BigText);
            self.emit(SurfaceEvent::BigTextEntry { button, text });
        }
    }

    pub fn on_busy_cancel_clicked(&mut self) {
        if let InteractionState::Busy(Some(token)) = &self.state {
            tracing::debug!("busy cancellation requested by user");
            token.cancel();
            self.pane.disable_busy_cancel();
        }
    }

    /// The user asked to close the window.
    ///
    /// The close is almost always vetoed so the controller can decide; the
    /// window actually closes only after the request stream has ended, or
    /// when a cancellable busy operation was already cancelled.
    pub fn on_close_requested(&mut self) -> CloseResponse {
        if self.closing {
            return CloseResponse::Close;
        }

        let state = std::mem::replace(&mut self.state, InteractionState::Idle(PaneKind::Canvas));
        match state {
            InteractionState::Idle(kind) => {
                tracing::debug!("close queued until the next request");
                self.pending_close = true;
                self.state = InteractionState::Idle(kind);
                CloseResponse::KeepOpen
            }
            InteractionState::AwaitingCanvasEvent(flags) => {
                self.state = InteractionState::Idle(Self::canvas_kind(flags));
                self.emit(SurfaceEvent::UserCloseRequest);
                CloseResponse::KeepOpen
            }
            InteractionState::AwaitingBigText(slot) => {
                // The edit is abandoned; hand the current content back so
                // nothing typed so far is lost. The big-text pane stays
                // displayed, so it is the pane to idle on.
                if let Some(slot) = slot {
                    let _ = slot.send(self.pane.big_text_content());
                }
                self.state = InteractionState::Idle(PaneKind::BigText);
                self.emit(SurfaceEvent::UserCloseRequest);
                CloseResponse::KeepOpen
            }
            InteractionState::Busy(Some(token)) => {
                if token.is_cancelled() {
                    // Cancellation was already requested and the controller
                    // has not finished; let the user force the close.
                    self.state = InteractionState::Busy(Some(token));
                    CloseResponse::Close
                } else {
                    token.cancel();
                    self.pane.disable_busy_cancel();
                    self.state = InteractionState::Busy(Some(token));
                    CloseResponse::KeepOpen
                }
            }
            InteractionState::Busy(None) => {
                // Nothing to cancel; defer the close until the busy work
                // finishes and the controller sends its next request.
                tracing::debug!("close queued behind non-cancellable busy work");
                self.pending_close = true;
                self.state = InteractionState::Busy(None);
                CloseResponse::KeepOpen
            }
        }
    }
}
