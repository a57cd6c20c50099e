// gfxterm - Request/response protocol core for interactive graphics surfaces
//
// A controller thread drives a surface owned by a dedicated surface thread
// through a pair of FIFO channels: requests go one way, exactly one
// answering event comes back per request. The windowing toolkit itself sits
// behind the SurfacePane trait and is not part of this crate.

pub mod channel;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod surface;
pub mod terminal;

// Re-export commonly used types for convenience
pub use channel::{ChannelMonitor, ChannelReceiver, ChannelRegistry, ChannelSender, ReceiveResult};
pub use config::{ConfigManager, TerminalConfig};
pub use protocol::{
    Bitmap, BitmapSource, ButtonChoice, ButtonSet, EventFlags, KeyCode, ModalCall, ParentHandle,
    Size, SurfaceEvent, SurfaceRequest,
};
pub use surface::{
    CloseResponse, PaneKind, SurfaceDriver, SurfaceHandle, SurfacePane, spawn_surface,
};
pub use terminal::{GraphicsTerminal, TerminalError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
