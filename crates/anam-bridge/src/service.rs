//! Secret service client
//!
//! The secret service runs in the process that owns decrypted key
//! material. The bridge reaches it through a [`SecretService`] handle that
//! exists only while the platform reports the service as connected; every
//! call returns immediately and completes later through a
//! [`ServiceCallback`].

use crate::error::{BridgeError, Result};
use crate::protocol::{BridgeResponse, ServicePayload};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use zeroize::Zeroizing;

type CompletionSink = Arc<dyn Fn(BridgeResponse) + Send + Sync>;

/// One-shot completion handle for a service call
///
/// Cloneable because transports may hold on to it; the router drops every
/// completion after the first for a given request id.
#[derive(Clone)]
pub struct ServiceCallback {
    request_id: String,
    sink: CompletionSink,
}

impl std::fmt::Debug for ServiceCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCallback")
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl ServiceCallback {
    /// Callback delivering completions for `request_id` to `sink`
    pub fn new(
        request_id: impl Into<String>,
        sink: impl Fn(BridgeResponse) + Send + Sync + 'static,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            sink: Arc::new(sink),
        }
    }

    /// Request this callback completes
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Report success
    pub fn on_success(&self, payload: ServicePayload) {
        (self.sink)(BridgeResponse::success(self.request_id.clone(), payload));
    }

    /// Report a failure message from the service
    pub fn on_error(&self, message: impl Into<String>) {
        self.on_failure(BridgeError::OperationFailed(message.into()));
    }

    /// Report a typed failure
    pub fn on_failure(&self, error: BridgeError) {
        (self.sink)(BridgeResponse::failure(self.request_id.clone(), error));
    }
}

/// Callback-shaped secret service interface
///
/// An `Err` return means the call never reached the service; the callback
/// will not fire in that case.
pub trait SecretService: Send + Sync {
    /// Encrypt `secret` into a keystore for `address`
    fn create_keystore(&self, secret: &str, address: &str, callback: ServiceCallback)
        -> Result<()>;

    /// Decrypt `keystore`
    fn decrypt_keystore(&self, keystore: &str, callback: ServiceCallback) -> Result<()>;

    /// Run a QR scan with `options`
    fn capture_secret(&self, options: &Value, callback: ServiceCallback) -> Result<()>;
}

/// Connection to the secret service
#[derive(Clone, Default)]
pub enum ConnectionState {
    /// Not bound
    #[default]
    Disconnected,
    /// Bind requested, not yet connected
    Connecting,
    /// Bound
    Connected(Arc<dyn SecretService>),
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("Disconnected"),
            ConnectionState::Connecting => f.write_str("Connecting"),
            ConnectionState::Connected(_) => f.write_str("Connected"),
        }
    }
}

impl ConnectionState {
    /// Whether a service handle is available
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

/// Per-bridge client; state changes come only from platform callbacks
pub struct SecretServiceClient {
    state: watch::Sender<ConnectionState>,
}

impl Default for SecretServiceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretServiceClient {
    /// Disconnected client
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { state }
    }

    /// Platform started binding
    pub fn on_connecting(&self) {
        self.transition(ConnectionState::Connecting);
    }

    /// Platform delivered a service handle
    pub fn on_connected(&self, service: Arc<dyn SecretService>) {
        self.transition(ConnectionState::Connected(service));
    }

    /// Platform lost the service
    pub fn on_disconnected(&self) {
        self.transition(ConnectionState::Disconnected);
    }

    /// Whether calls can be issued right now
    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Snapshot of the connection state
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Observe connection transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Service handle, or `ServiceUnavailable` without waiting
    pub fn service(&self) -> Result<Arc<dyn SecretService>> {
        match &*self.state.borrow() {
            ConnectionState::Connected(service) => Ok(service.clone()),
            _ => Err(BridgeError::ServiceUnavailable),
        }
    }

    fn transition(&self, next: ConnectionState) {
        let to = format!("{:?}", next);
        let previous = self.state.send_replace(next);
        tracing::debug!(from = ?previous, to = %to, "Secret service connection changed");
    }
}

/// Decrypted keystore contents
pub struct DecryptedKeystore {
    /// Account address
    pub address: String,
    /// Raw secret bytes
    pub secret: Zeroizing<Vec<u8>>,
}

/// Asynchronous keystore implementation behind a [`WorkerSecretService`]
#[async_trait]
pub trait KeystoreBackend: Send + Sync {
    /// Encrypt `secret` for `address`, returning keystore JSON
    async fn create_keystore(&self, secret: Zeroizing<String>, address: String) -> Result<String>;

    /// Decrypt keystore JSON
    async fn decrypt_keystore(&self, keystore: String) -> Result<DecryptedKeystore>;

    /// Scan a QR code
    async fn scan(&self, options: Value) -> Result<String>;
}

/// In-process transport running a [`KeystoreBackend`] on a tokio runtime
pub struct WorkerSecretService {
    backend: Arc<dyn KeystoreBackend>,
    runtime: Handle,
}

impl WorkerSecretService {
    /// Service spawning backend calls on `runtime`
    pub fn new(backend: Arc<dyn KeystoreBackend>, runtime: Handle) -> Self {
        Self { backend, runtime }
    }
}

impl SecretService for WorkerSecretService {
    fn create_keystore(
        &self,
        secret: &str,
        address: &str,
        callback: ServiceCallback,
    ) -> Result<()> {
        let backend = self.backend.clone();
        let secret = Zeroizing::new(secret.to_string());
        let address = address.to_string();
        self.runtime.spawn(async move {
            match backend.create_keystore(secret, address).await {
                Ok(keystore) => callback.on_success(ServicePayload::Keystore(keystore)),
                Err(e) => callback.on_failure(e),
            }
        });
        Ok(())
    }

    fn decrypt_keystore(&self, keystore: &str, callback: ServiceCallback) -> Result<()> {
        let backend = self.backend.clone();
        let keystore = keystore.to_string();
        self.runtime.spawn(async move {
            match backend.decrypt_keystore(keystore).await {
                Ok(decrypted) => callback.on_success(ServicePayload::Decrypted {
                    address: decrypted.address,
                    secret: Zeroizing::new(hex::encode(decrypted.secret.as_slice())),
                }),
                Err(e) => callback.on_failure(e),
            }
        });
        Ok(())
    }

    fn capture_secret(&self, options: &Value, callback: ServiceCallback) -> Result<()> {
        let backend = self.backend.clone();
        let options = options.clone();
        self.runtime.spawn(async move {
            match backend.scan(options).await {
                Ok(data) => callback.on_success(ServicePayload::Scanned(data)),
                Err(e) => callback.on_failure(e),
            }
        });
        Ok(())
    }
}
