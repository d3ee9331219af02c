//! # native_integration
//!
//! The extension side of a **browser Native Messaging** integration:
//!
//! - Open a port to a companion desktop application (the *native host*)
//! - Handshake and negotiate the API version
//! - Correlate asynchronous responses to requests, with timeouts
//! - Retry through reconnection, and reconnect on its own when the port drops
//!
//! The goal is a session that the rest of an extension can call like a plain async API,
//! without caring that the host may restart, stall, or disappear under it.
//!
//! ---
//!
//! ## Protocol
//!
//! Every request is a JSON envelope carrying a fresh id:
//!
//! ```json
//! { "id": "ADG_00000000a", "type": "getCurrentAppState", "parameters": { } }
//! ```
//!
//! and the host answers with the same id:
//!
//! ```json
//! { "requestId": "ADG_00000000a", "result": "ok", "parameters": { "state": "active" } }
//! ```
//!
//! `result` is `ok` or `error`; anything else is treated as an error too. Messages
//! without a `requestId` are unsolicited host notifications, available through
//! [`HostSession::subscribe`].
//!
//! ### Most important behaviors (read this first)
//!
//! - **Timeouts are per attempt:** an attempt fails after
//!   [`SessionConfig::request_timeout_ms`] (1000 ms by default).
//! - **Retries reconnect:** a timed-out or disconnected attempt triggers a full
//!   reconnect (new port + handshake) before the next attempt, up to
//!   [`SessionConfig::max_attempts`] (5 by default).
//! - **Host errors are final:** a response with `result: "error"` fails the request with
//!   [`HostError::Protocol`] and is not retried.
//! - **Disconnects heal:** once connected, a dropped port is replaced in the background.
//!   A session whose first handshake failed stays disconnected until you call
//!   [`HostSession::connect`] again. So does one you closed with
//!   [`HostSession::disconnect`].
//! - **Logging goes through `tracing`:** install a subscriber to see traffic. Nothing is
//!   written to stdout.
//!
//! ---
//!
//! ## Crate layout
//!
//! - [`session`] — the session manager.
//! - [`protocol`] — envelopes, operation names, version check.
//! - [`transport`] — the [`Connector`] seam plus in-memory and child-process connectors.
//! - [`framing`] — length-prefixed JSON frames used on the host's stdio.
//! - [`discovery`] — finding the host through its browser manifest.
//! - [`config`] — [`SessionConfig`], loadable from TOML.
//!
//! ---
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use native_integration::{HostSession, RequestType, SessionConfig};
//! use native_integration::discovery::{Browser, Scope};
//! use native_integration::transport::ProcessConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), native_integration::HostError> {
//!     let config = SessionConfig::default().with_app_version("4.2.1");
//!     let connector = ProcessConnector::from_manifest(Browser::Chrome, Scope::User);
//!     let session = HostSession::new(Arc::new(connector), config);
//!
//!     session.connect().await?;
//!     if !session.are_api_versions_up_to_date() {
//!         eprintln!("host is older than this client");
//!     }
//!
//!     let state = session.request(RequestType::GetCurrentAppState, None).await?;
//!     eprintln!("app state: {state}");
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## Testing against a fake host
//!
//! [`MemoryConnector`] hands you the host's end of every port it opens:
//!
//! ```
//! use std::sync::Arc;
//! use native_integration::{HostSession, MemoryConnector, RequestType};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (connector, mut hosts) = MemoryConnector::new();
//! tokio::spawn(async move {
//!     while let Some(mut host) = hosts.recv().await {
//!         tokio::spawn(async move {
//!             while let Some(request) = host.recv().await {
//!                 let parameters = match request["type"].as_str() {
//!                     Some("init") => json!({"apiVersion": "1", "isValidatedOnHost": true}),
//!                     _ => json!({"state": "active"}),
//!                 };
//!                 host.respond(&request, "ok", Some(parameters));
//!             }
//!         });
//!     }
//! });
//!
//! let session = HostSession::builder(Arc::new(connector)).build();
//! session.connect().await.unwrap();
//! let state = session.request(RequestType::GetCurrentAppState, None).await.unwrap();
//! assert_eq!(state, json!({"state": "active"}));
//! # }
//! ```
//!
//! ---
//!
//! ## Troubleshooting
//!
//! ### `HostError::Unavailable` from `connect`
//! The host never answered the handshake. Check that the manifest exists for the browser
//! and scope you passed to [`ProcessConnector::from_manifest`], that its `name` matches
//! [`SessionConfig::host_name`], and that its `path` is absolute (macOS/Linux).
//!
//! ### Requests time out but the host is running
//! The host must echo the request `id` back as `requestId`. A host that writes logs to
//! its stdout corrupts the frame stream.

pub mod config;
pub mod discovery;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod session;
pub mod transport;

#[doc(inline)]
pub use config::SessionConfig;
#[doc(inline)]
pub use error::{HostError, Result};
#[doc(inline)]
pub use protocol::{is_api_compatible, RequestType};
#[doc(inline)]
pub use session::{FixedRetry, HostSession, HostSessionBuilder, RetryStrategy};
#[doc(inline)]
pub use transport::{Connector, MemoryConnector, Port};
#[cfg(feature = "process")]
#[doc(inline)]
pub use transport::ProcessConnector;
