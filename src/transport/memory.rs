//! In-process connector. Each opened port's far end is handed out as a [`HostEnd`],
//! so a test (or an embedding that already owns the host side) can play the host.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{BoxFuture, Connector, Port};
use crate::error::{HostError, Result};

/// Connector whose ports are channel pairs.
#[derive(Debug)]
pub struct MemoryConnector {
    hosts: mpsc::UnboundedSender<HostEnd>,
    opened: AtomicUsize,
    refuse: AtomicBool,
}

impl MemoryConnector {
    /// Returns the connector and the stream of host ends, one per opened port.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostEnd>) {
        let (hosts, rx) = mpsc::unbounded_channel();
        let connector = Self {
            hosts,
            opened: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
        };
        (connector, rx)
    }

    /// Number of ports opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Make subsequent `open` calls fail as if the host were not installed.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Connector for MemoryConnector {
    fn open<'a>(&'a self, host_name: &'a str) -> BoxFuture<'a, Result<Port>> {
        Box::pin(async move {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(HostError::Connect {
                    host_name: host_name.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            let (to_host, incoming) = mpsc::unbounded_channel();
            let (outgoing, from_host) = mpsc::unbounded_channel();
            let end = HostEnd {
                host_name: host_name.to_string(),
                incoming,
                outgoing,
            };
            self.hosts.send(end).map_err(|_| HostError::Connect {
                host_name: host_name.to_string(),
                reason: "no host is listening".to_string(),
            })?;
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Port::new(to_host, from_host))
        })
    }
}

/// The host's side of a memory port.
#[derive(Debug)]
pub struct HostEnd {
    pub host_name: String,
    incoming: mpsc::UnboundedReceiver<Value>,
    outgoing: mpsc::UnboundedSender<Value>,
}

impl HostEnd {
    /// Next message from the client; `None` once the client closed the port.
    pub async fn recv(&mut self) -> Option<Value> {
        self.incoming.recv().await
    }

    /// Send a message to the client. Returns false if the client is gone.
    pub fn send(&self, message: Value) -> bool {
        self.outgoing.send(message).is_ok()
    }

    /// Answer `request` with the given result code and parameters.
    pub fn respond(&self, request: &Value, result: &str, parameters: Option<Value>) -> bool {
        let mut response = json!({
            "requestId": request.get("id").cloned().unwrap_or(Value::Null),
            "result": result,
        });
        if let Some(parameters) = parameters {
            response["parameters"] = parameters;
        }
        self.send(response)
    }

    /// True once the client stopped listening on this port.
    pub fn is_closed(&self) -> bool {
        self.outgoing.is_closed()
    }
}
