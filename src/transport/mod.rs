//! The duplex channel a session rides on.
//!
//! A [`Connector`] opens [`Port`]s by host name, the way a browser's `connectNative`
//! does. A port is an outbound sender, an inbound receiver and an optional close hook.
//! The inbound receiver ending is the disconnect signal.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

pub mod memory;
#[cfg(feature = "process")]
pub mod process;

pub use memory::{HostEnd, MemoryConnector};
#[cfg(feature = "process")]
pub use process::{HostLauncher, ProcessConnector};

/// Boxed future returned by [`Connector::open`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) type CloseHook = Box<dyn FnOnce() + Send>;

/// Opens ports to a native host.
pub trait Connector: Send + Sync {
    fn open<'a>(&'a self, host_name: &'a str) -> BoxFuture<'a, Result<Port>>;
}

/// One open channel to the host.
pub struct Port {
    pub(crate) outbound: mpsc::UnboundedSender<Value>,
    pub(crate) inbound: mpsc::UnboundedReceiver<Value>,
    pub(crate) on_close: Option<CloseHook>,
}

impl Port {
    pub fn new(
        outbound: mpsc::UnboundedSender<Value>,
        inbound: mpsc::UnboundedReceiver<Value>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            on_close: None,
        }
    }

    /// Run `hook` when the port is closed, e.g. to stop a child process.
    pub fn on_close(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Queue a message for the host.
    pub fn send(&self, message: Value) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| crate::error::HostError::Disconnected)
    }

    /// Next inbound message; `None` once the host side is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.inbound.recv().await
    }

    /// Close the port and run its close hook.
    pub fn close(mut self) {
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("closed", &self.outbound.is_closed())
            .field("has_close_hook", &self.on_close.is_some())
            .finish()
    }
}
