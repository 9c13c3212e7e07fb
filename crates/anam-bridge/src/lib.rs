//! Mediated bridge between sandboxed mini-app script and the secret service
//!
//! Mini-app pages run in an embedded web runtime that must never touch key
//! material. This crate is the only path from that script to the process
//! holding secrets:
//!
//! - [`router`]: correlates requests by id, validates them and injects one
//!   completion event per request back into the sandbox
//! - [`service`]: cross-process client with a fail-fast connection state
//! - [`navigation`]: manifest allowlist for in-sandbox navigation
//!
//! All sandbox-facing work happens on a single [`BridgeEventLoop`]; service
//! callbacks are marshaled onto it through a channel.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod navigation;
pub mod protocol;
pub mod router;
pub mod sandbox;
pub mod service;

pub use error::{BridgeError, Result};
pub use navigation::NavigationGuard;
pub use protocol::{
    BridgeOperation, BridgeRequest, BridgeResponse, CompletionEvent, EventFamily, MalformedMessage,
    ServicePayload,
};
pub use router::{bridge, BridgeEventLoop, BridgeHandle};
pub use sandbox::{RelayKind, ResponseHandler, SandboxRuntime};
pub use service::{
    ConnectionState, KeystoreBackend, SecretService, SecretServiceClient, ServiceCallback,
    DecryptedKeystore, WorkerSecretService,
};
