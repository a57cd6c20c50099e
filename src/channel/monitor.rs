// Channel monitor
//
// Continuously pumps a receiver: every delivered item (and the final eof)
// is forwarded through a caller-supplied function, and the receive is
// re-armed until end-of-stream or until the monitor is stopped. The surface
// side uses this to turn the inbound request stream into closures posted
// onto its single-threaded execution context.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{ChannelReceiver, ReceiveResult};

/// What the monitor observed on the channel.
pub enum MonitorNotice<T> {
    Item(T),
    Eof,
}

/// A running receive pump over one [`ChannelReceiver`].
///
/// Each item is forwarded before the next receive is registered, so the
/// forward function observes values strictly in channel order. Stopping the
/// monitor cancels the in-flight registration; the resulting `Cancelled`
/// outcome is swallowed.
pub struct ChannelMonitor {
    stop: CancellationToken,
}

impl ChannelMonitor {
    /// Start pumping `receiver` into `forward`.
    pub fn start<T, F>(receiver: ChannelReceiver<T>, forward: F) -> Self
    where
        T: Send + 'static,
        F: Fn(MonitorNotice<T>) + Send + Sync + 'static,
    {
        let stop = CancellationToken::new();
        arm(Arc::new(receiver), Arc::new(forward), stop.clone());
        Self { stop }
    }

    /// Stop the pump. The channel itself is left untouched.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

impl Drop for ChannelMonitor {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn arm<T, F>(receiver: Arc<ChannelReceiver<T>>, forward: Arc<F>, stop: CancellationToken)
where
    T: Send + 'static,
    F: Fn(MonitorNotice<T>) + Send + Sync + 'static,
{
    let token = stop.clone();
    let rx = Arc::clone(&receiver);
    receiver.receive_with_callback(
        move |result| match result {
            ReceiveResult::Item(item) => {
                (*forward)(MonitorNotice::Item(item));
                arm(rx, forward, stop);
            }
            ReceiveResult::Eof => {
                (*forward)(MonitorNotice::Eof);
            }
            ReceiveResult::Cancelled => {
                tracing::trace!(channel = rx.id(), "channel monitor stopped");
            }
        },
        token,
    );
}
