// Surface execution context
//
// The driver is not thread-safe and must only ever run on one thread. This
// module owns that thread: a queue of boxed closures is drained with
// `blocking_recv`, each closure getting exclusive access to the driver.
// Host input callbacks, the request monitor, and the timer all talk to the
// driver by posting closures through a [`SurfaceHandle`].

use std::io;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::channel::{
    ChannelMonitor, ChannelReceiver, ChannelRegistry, ChannelSender, MonitorNotice,
};
use crate::protocol::{ButtonChoice, KeyCode, Size, SurfaceEvent, SurfaceRequest};
use crate::surface::{CloseResponse, SurfaceDriver, SurfacePane};

type Task<P> = Box<dyn FnOnce(&mut SurfaceDriver<P>) + Send>;

/// Poster for closures that run on the surface thread.
///
/// Cloneable and cheap; the pane implementation holds one to feed user
/// input back into the driver.
pub struct SurfaceHandle<P: SurfacePane + 'static> {
    tasks: mpsc::UnboundedSender<Task<P>>,
}

impl<P: SurfacePane + 'static> Clone for SurfaceHandle<P> {
    fn clone(&self) -> Self {
        Self {
            tasks: self.tasks.clone(),
        }
    }
}

impl<P: SurfacePane + 'static> SurfaceHandle<P> {
    /// Run `task` on the surface thread. Dropped with a warning if the
    /// context has already stopped.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce(&mut SurfaceDriver<P>) + Send + 'static,
    {
        if self.tasks.send(Box::new(task)).is_err() {
            tracing::warn!("surface context has stopped, task dropped");
        }
    }

    /// Like [`post`](Self::post) but silent, reporting whether the context
    /// is still running. Used by the timer loop as its stop signal.
    fn post_quiet<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut SurfaceDriver<P>) + Send + 'static,
    {
        self.tasks.send(Box::new(task)).is_ok()
    }

    pub fn mouse_click(&self, x: f64, y: f64) {
        self.post(move |driver| driver.on_mouse_click(x, y));
    }

    pub fn key_down(&self, code: KeyCode) {
        self.post(move |driver| driver.on_key_down(code));
    }

    pub fn text_submitted(&self, text: String) {
        self.post(move |driver| driver.on_text_submitted(text));
    }

    pub fn big_text_button(&self, button: ButtonChoice) {
        self.post(move |driver| driver.on_big_text_button(button));
    }

    pub fn busy_cancel_clicked(&self) {
        self.post(|driver| driver.on_busy_cancel_clicked());
    }

    pub fn size_changed(&self, size: Size) {
        self.post(move |driver| driver.on_size_changed(size));
    }

    /// Ask the driver whether a window close should proceed, blocking until
    /// it answers.
    ///
    /// Must not be called from the surface thread itself; the host's close
    /// callback normally fires on its own UI thread. If the context has
    /// already stopped the close is allowed.
    pub fn close_requested(&self) -> CloseResponse {
        let (reply_tx, reply_rx) = std::sync::mpsc::channel();
        let posted = self.post_quiet(move |driver| {
            let _ = reply_tx.send(driver.on_close_requested());
        });
        if !posted {
            return CloseResponse::Close;
        }
        reply_rx.recv().unwrap_or(CloseResponse::Close)
    }
}

/// Everything the controller needs to talk to a freshly spawned surface.
pub struct SurfaceConnection<P: SurfacePane + 'static> {
    pub requests: ChannelSender<SurfaceRequest>,
    pub events: ChannelReceiver<SurfaceEvent>,
    pub handle: SurfaceHandle<P>,
    pub thread: thread::JoinHandle<()>,
}

/// Spawn the surface thread with its driver, wire the request monitor, and
/// start the tick timer.
///
/// The pane is constructed on the surface thread itself via `pane_factory`,
/// which receives a handle it can keep for feeding input back in. The
/// context stops when the request channel reaches end-of-stream; the timer
/// thread notices the stopped context on its next tick and exits.
pub fn spawn_surface<P, F>(
    registry: &ChannelRegistry,
    timer_interval: Option<Duration>,
    pane_factory: F,
) -> io::Result<SurfaceConnection<P>>
where
    P: SurfacePane + 'static,
    F: FnOnce(SurfaceHandle<P>) -> P + Send + 'static,
{
    let (req_tx, req_rx) = registry.channel::<SurfaceRequest>();
    let (evt_tx, evt_rx) = registry.channel::<SurfaceEvent>();
    let metrics = registry.metrics();

    let (task_tx, mut task_rx) = mpsc::unbounded_channel::<Task<P>>();
    let handle = SurfaceHandle { tasks: task_tx };

    let monitor_handle = handle.clone();
    let monitor = ChannelMonitor::start(req_rx, move |notice| match notice {
        MonitorNotice::Item(request) => {
            monitor_handle.post(move |driver| driver.on_request(request));
        }
        MonitorNotice::Eof => {
            monitor_handle.post(|driver| driver.on_request_eof());
        }
    });

    let timer = timer_interval.filter(|interval| !interval.is_zero()).map(|interval| {
        let timer_handle = handle.clone();
        thread::Builder::new()
            .name("surface-timer".into())
            .spawn(move || {
                loop {
                    thread::sleep(interval);
                    if !timer_handle.post_quiet(|driver| driver.on_timer_tick()) {
                        break;
                    }
                }
            })
    });
    let timer = match timer {
        Some(result) => Some(result?),
        None => None,
    };

    let thread_handle = handle.clone();
    let thread = thread::Builder::new().name("surface".into()).spawn(move || {
        let pane = pane_factory(thread_handle);
        let mut driver = SurfaceDriver::new(pane, evt_tx, metrics);

        while let Some(task) = task_rx.blocking_recv() {
            task(&mut driver);
            if driver.is_closing() {
                break;
            }
        }

        monitor.stop();
        drop(task_rx);
        if let Some(timer) = timer {
            let _ = timer.join();
        }
        tracing::debug!("surface context stopped");
    })?;

    Ok(SurfaceConnection {
        requests: req_tx,
        events: evt_rx,
        handle,
        thread,
    })
}
