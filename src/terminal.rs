// Session façade
//
// `GraphicsTerminal` is what application code holds: one method per request
// shape, each sending a single request and awaiting its single answering
// event. Methods take `&mut self` so the one-outstanding-request rule is
// enforced by the borrow checker rather than at runtime.

use std::any::Any;
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelReceiver, ChannelRegistry, ChannelSender, ReceiveResult};
use crate::config::TerminalConfig;
use crate::metrics::Metrics;
use crate::protocol::{
    Bitmap, BitmapSource, ButtonSet, EventFlags, ParentHandle, Size, SurfaceEvent, SurfaceRequest,
};
use crate::surface::{SurfaceHandle, SurfacePane, spawn_surface};

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("failed to spawn surface thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("surface thread panicked")]
    SurfacePanicked,
}

/// Controller-side handle to one surface session.
///
/// Dropping the terminal without calling [`shutdown`](Self::shutdown) ends
/// the request stream but skips the event drain and the thread join; prefer
/// an explicit shutdown.
pub struct GraphicsTerminal {
    requests: ChannelSender<SurfaceRequest>,
    events: ChannelReceiver<SurfaceEvent>,
    metrics: Arc<Metrics>,
    surface_thread: Option<thread::JoinHandle<()>>,
    closed: bool,
}

impl GraphicsTerminal {
    /// Open a surface session.
    ///
    /// The pane is built by `pane_factory` on the surface thread; the
    /// returned [`SurfaceHandle`] is the same one the factory received and
    /// is how the host window feeds input back in.
    pub fn open<P, F>(
        registry: &ChannelRegistry,
        config: &TerminalConfig,
        pane_factory: F,
    ) -> Result<(Self, SurfaceHandle<P>), TerminalError>
    where
        P: SurfacePane + 'static,
        F: FnOnce(SurfaceHandle<P>) -> P + Send + 'static,
    {
        let connection = spawn_surface(registry, config.timer_interval(), pane_factory)?;
        tracing::info!(title = %config.title, "surface session opened");

        Ok((
            Self {
                requests: connection.requests,
                events: connection.events,
                metrics: registry.metrics(),
                surface_thread: Some(connection.thread),
                closed: false,
            },
            connection.handle,
        ))
    }

    async fn roundtrip(&mut self, request: SurfaceRequest) -> SurfaceEvent {
        assert!(!self.closed, "request after shutdown");
        self.requests.send(request);
        match self.events.receive().await {
            ReceiveResult::Item(event) => event,
            other => panic!("event stream ended while a request was outstanding: {:?}", other),
        }
    }

    /// Present a fixed-size canvas and wait for an interaction.
    pub async fn get_event_fixed<D>(
        &mut self,
        size: Size,
        draw: D,
        flags: EventFlags,
    ) -> SurfaceEvent
    where
        D: FnMut(&mut Bitmap) + Send + 'static,
    {
        self.roundtrip(SurfaceRequest::GetEvent {
            source: BitmapSource::DrawFixed {
                size,
                draw: Box::new(draw),
            },
            flags,
        })
        .await
    }

    /// Present a canvas sized from the surface, dropping the previous
    /// bitmap, and wait for an interaction.
    pub async fn get_event_swap<C>(&mut self, create: C, flags: EventFlags) -> SurfaceEvent
    where
        C: FnMut(Size) -> Bitmap + Send + 'static,
    {
        self.roundtrip(SurfaceRequest::GetEvent {
            source: BitmapSource::Swap {
                create: Box::new(create),
                previous_return: None,
            },
            flags,
        })
        .await
    }

    /// Like [`get_event_swap`](Self::get_event_swap), but hands the
    /// replaced bitmap back to the caller. `None` when there was no
    /// previous bitmap or the factory panicked.
    pub async fn get_event_swap_returning<C>(
        &mut self,
        create: C,
        flags: EventFlags,
    ) -> (SurfaceEvent, Option<Bitmap>)
    where
        C: FnMut(Size) -> Bitmap + Send + 'static,
    {
        let (slot_tx, mut slot_rx) = oneshot::channel();
        let event = self
            .roundtrip(SurfaceRequest::GetEvent {
                source: BitmapSource::Swap {
                    create: Box::new(create),
                    previous_return: Some(slot_tx),
                },
                flags,
            })
            .await;
        (event, slot_rx.try_recv().ok())
    }

    /// Present a canvas built from the previous bitmap and the surface
    /// size, and wait for an interaction.
    pub async fn get_event_with<C>(&mut self, create: C, flags: EventFlags) -> SurfaceEvent
    where
        C: FnMut(Option<Bitmap>, Size) -> Bitmap + Send + 'static,
    {
        self.roundtrip(SurfaceRequest::GetEvent {
            source: BitmapSource::WithPrevious {
                create: Box::new(create),
            },
            flags,
        })
        .await
    }

    /// Show the big-text editor and wait for a button press (or a close
    /// attempt).
    pub async fn get_big_text(
        &mut self,
        label: &str,
        read_only: bool,
        content: &str,
        buttons: ButtonSet,
    ) -> SurfaceEvent {
        self.roundtrip(SurfaceRequest::GetBigText {
            label: label.to_string(),
            read_only,
            content: content.to_string(),
            content_return: None,
            buttons,
        })
        .await
    }

    /// Like [`get_big_text`](Self::get_big_text), but also returns the
    /// edited content even when the pane was abandoned by a close attempt.
    pub async fn get_big_text_with_return(
        &mut self,
        label: &str,
        read_only: bool,
        content: &str,
        buttons: ButtonSet,
    ) -> (SurfaceEvent, Option<String>) {
        let (slot_tx, mut slot_rx) = oneshot::channel();
        let event = self
            .roundtrip(SurfaceRequest::GetBigText {
                label: label.to_string(),
                read_only,
                content: content.to_string(),
                content_return: Some(slot_tx),
                buttons,
            })
            .await;
        (event, slot_rx.try_recv().ok())
    }

    /// Show the busy pane and return once it is displayed.
    ///
    /// The caller keeps working and watches `cancel` (if given) for a user
    /// cancellation.
    ///
    /// # Panics
    /// Panics if the answer is anything but the display acknowledgement. A
    /// close queued while idle would answer this request instead, so poll
    /// [`check_pending_close`](Self::check_pending_close) first when the
    /// user may have tried to close the window.
    pub async fn show_busy(
        &mut self,
        message: &str,
        progress: Option<f64>,
        cancel: Option<CancellationToken>,
    ) {
        let event = self
            .roundtrip(SurfaceRequest::ShowBusy {
                message: message.to_string(),
                progress,
                cancel,
            })
            .await;
        assert!(
            matches!(event, SurfaceEvent::BusyDisplayed),
            "unexpected answer to a busy request: {:?}",
            event
        );
    }

    /// Run `f` on the surface thread with the window as modal parent and
    /// return its result.
    ///
    /// # Panics
    /// Panics if the answer is not a dialog result of type `T`. A queued
    /// close would answer this request instead, so poll
    /// [`check_pending_close`](Self::check_pending_close) first when the
    /// user may have tried to close the window.
    pub async fn show_modal<T, F>(&mut self, f: F) -> T
    where
        T: Any + Send + 'static,
        F: FnOnce(ParentHandle) -> T + Send + 'static,
    {
        let call = Box::new(move |parent: ParentHandle| {
            let result: Box<dyn Any + Send> = Box::new(f(parent));
            result
        });
        match self.roundtrip(SurfaceRequest::ShowModal(call)).await {
            SurfaceEvent::DialogResult(payload) => match payload.downcast::<T>() {
                Ok(result) => *result,
                Err(_) => panic!("modal dialog returned a result of the wrong type"),
            },
            other => panic!("expected dialog result, got {:?}", other),
        }
    }

    /// Poll for a close attempt made while no request was outstanding.
    ///
    /// Answers [`SurfaceEvent::UserCloseRequest`] if one was queued,
    /// [`SurfaceEvent::Nothing`] otherwise.
    pub async fn check_pending_close(&mut self) -> SurfaceEvent {
        self.roundtrip(SurfaceRequest::CheckPendingClose).await
    }

    /// End the session: close the request stream, drain remaining events,
    /// and join the surface thread. Idempotent.
    pub async fn shutdown(&mut self) -> Result<(), TerminalError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        tracing::info!("shutting down surface session");
        self.requests.send_eof();

        loop {
            match self.events.receive().await {
                ReceiveResult::Eof => break,
                ReceiveResult::Item(event) => {
                    // Every request was awaited, so nothing should be in
                    // flight here.
                    tracing::warn!(?event, "stray event while draining at shutdown");
                    debug_assert!(false, "stray event while draining at shutdown");
                }
                ReceiveResult::Cancelled => break,
            }
        }

        if let Some(handle) = self.surface_thread.take() {
            handle.join().map_err(|_| TerminalError::SurfacePanicked)?;
        }

        self.metrics.log_summary();
        Ok(())
    }
}

impl Drop for GraphicsTerminal {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!("terminal dropped without shutdown, closing request stream");
            self.requests.send_eof();
        }
    }
}
