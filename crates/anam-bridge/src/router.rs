//! Bridge request router
//!
//! [`BridgeHandle`] is the object exposed to sandbox script. It only
//! enqueues; all validation, dispatch and completion happens on the
//! [`BridgeEventLoop`], which is the sandbox's serialized context. Service
//! callbacks re-enter the loop through the same queue, so the in-flight
//! table is never shared across threads.

use crate::error::BridgeError;
use crate::navigation::NavigationGuard;
use crate::protocol::{BridgeOperation, BridgeRequest, BridgeResponse, CompletionEvent, EventFamily};
use crate::sandbox::{RelayKind, ResponseHandler, SandboxRuntime};
use crate::service::{SecretServiceClient, ServiceCallback};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Tracing target for messages logged by sandbox script
pub const SANDBOX_LOG_TARGET: &str = "anam_bridge::sandbox";

enum Command {
    Invoke(BridgeRequest),
    Message(String),
    Complete {
        generation: u64,
        response: BridgeResponse,
    },
    Navigate(String),
    Relay {
        kind: RelayKind,
        request_id: String,
        response_json: String,
    },
    Log(String),
    Shutdown,
}

/// Create a bridge for one sandbox
///
/// The loop must be driven with [`BridgeEventLoop::run`] or
/// [`BridgeEventLoop::process_pending`] on the sandbox's context.
pub fn bridge(
    client: Arc<SecretServiceClient>,
    sandbox: Arc<dyn SandboxRuntime>,
    guard: NavigationGuard,
) -> (BridgeHandle, BridgeEventLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    let completions = tx.downgrade();
    let handle = BridgeHandle { tx };
    let event_loop = BridgeEventLoop {
        rx,
        completions,
        client,
        sandbox,
        guard,
        responses: None,
        in_flight: HashMap::new(),
        next_generation: 0,
        closed: false,
    };
    (handle, event_loop)
}

/// Script-facing bridge object
///
/// Every method returns immediately; results arrive as completion events.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl BridgeHandle {
    /// Submit a request
    pub fn invoke(&self, request: BridgeRequest) {
        self.send(Command::Invoke(request));
    }

    /// `createKeystore(secret, address)`
    pub fn create_keystore(
        &self,
        request_id: impl Into<String>,
        secret: impl Into<String>,
        address: impl Into<String>,
    ) {
        self.invoke(BridgeRequest::new(
            request_id,
            BridgeOperation::CreateKeystore {
                secret: secret.into(),
                address: address.into(),
            },
        ));
    }

    /// `decryptKeystore(keystoreJson)`
    pub fn decrypt_keystore(&self, request_id: impl Into<String>, keystore: impl Into<String>) {
        self.invoke(BridgeRequest::new(
            request_id,
            BridgeOperation::DecryptKeystore {
                keystore: keystore.into(),
            },
        ));
    }

    /// `captureSecret(options)`, a QR scan
    pub fn capture_secret(&self, request_id: impl Into<String>, options: Value) {
        self.invoke(BridgeRequest::new(
            request_id,
            BridgeOperation::CaptureSecret { options },
        ));
    }

    /// Tagged JSON message, `{"requestId": .., "op": .., ...}`
    pub fn handle_message(&self, json: impl Into<String>) {
        self.send(Command::Message(json.into()));
    }

    /// Navigate within the mini-app
    pub fn navigate_to(&self, page_path: impl Into<String>) {
        self.send(Command::Navigate(page_path.into()));
    }

    /// Log a message from script
    pub fn log(&self, message: impl Into<String>) {
        self.send(Command::Log(message.into()));
    }

    /// Transaction response from the headless blockchain sandbox
    pub fn send_transaction_response(
        &self,
        request_id: impl Into<String>,
        response_json: impl Into<String>,
    ) {
        self.relay(RelayKind::Transaction, request_id.into(), response_json.into());
    }

    /// Universal bridge response from the headless blockchain sandbox
    pub fn send_universal_response(
        &self,
        request_id: impl Into<String>,
        response_json: impl Into<String>,
    ) {
        self.relay(RelayKind::Universal, request_id.into(), response_json.into());
    }

    /// Tear the sandbox down; in-flight requests are abandoned
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    /// Whether the event loop has stopped accepting calls
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn relay(&self, kind: RelayKind, request_id: String, response_json: String) {
        self.send(Command::Relay {
            kind,
            request_id,
            response_json,
        });
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            tracing::debug!("Bridge closed, dropping sandbox call");
        }
    }
}

/// One dispatched request awaiting its completion
struct InFlight {
    /// Distinguishes reuses of the same request id
    generation: u64,
    family: EventFamily,
}

/// Serialized context owning all sandbox-facing state
pub struct BridgeEventLoop {
    rx: mpsc::UnboundedReceiver<Command>,
    completions: mpsc::WeakUnboundedSender<Command>,
    client: Arc<SecretServiceClient>,
    sandbox: Arc<dyn SandboxRuntime>,
    guard: NavigationGuard,
    responses: Option<Arc<dyn ResponseHandler>>,
    in_flight: HashMap<String, InFlight>,
    next_generation: u64,
    closed: bool,
}

impl BridgeEventLoop {
    /// Forward headless responses to `handler`
    pub fn with_response_handler(mut self, handler: Arc<dyn ResponseHandler>) -> Self {
        self.responses = Some(handler);
        self
    }

    /// Requests dispatched and not yet completed
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Run until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        tracing::debug!(app = %self.guard.host(), "Bridge event loop started");
        while let Some(command) = self.rx.recv().await {
            if !self.handle(command) {
                break;
            }
        }
        self.abandon();
        tracing::debug!(app = %self.guard.host(), "Bridge event loop stopped");
    }

    /// Handle every queued command without waiting; returns the count
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while !self.closed {
            match self.rx.try_recv() {
                Ok(command) => {
                    handled += 1;
                    self.handle(command);
                }
                Err(_) => break,
            }
        }
        handled
    }

    /// Returns `false` once the bridge is shut down
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Invoke(request) => self.dispatch(request),
            Command::Message(json) => self.dispatch_message(&json),
            Command::Complete {
                generation,
                response,
            } => self.complete(generation, response),
            Command::Navigate(page_path) => self.navigate(&page_path),
            Command::Relay {
                kind,
                request_id,
                response_json,
            } => self.relay(kind, &request_id, &response_json),
            Command::Log(message) => {
                tracing::debug!(target: SANDBOX_LOG_TARGET, "{}", message);
            }
            Command::Shutdown => {
                self.abandon();
                self.closed = true;
                self.rx.close();
                return false;
            }
        }
        true
    }

    fn dispatch_message(&mut self, json: &str) {
        match BridgeRequest::from_json(json) {
            Ok(request) => self.dispatch(request),
            Err(malformed) => match (malformed.request_id, malformed.family) {
                (Some(request_id), Some(family)) => self.reject(family, request_id, malformed.error),
                (request_id, _) => {
                    tracing::warn!(
                        request_id = ?request_id,
                        error = %malformed.error,
                        "Dropping unanswerable bridge message"
                    );
                }
            },
        }
    }

    fn dispatch(&mut self, request: BridgeRequest) {
        let family = request.operation.family();
        if let Err(e) = request.validate() {
            return self.reject(family, request.request_id, e);
        }

        let BridgeRequest {
            request_id,
            operation,
        } = request;
        if self.in_flight.contains_key(&request_id) {
            return self.reject(
                family,
                request_id,
                BridgeError::InvalidRequest("Duplicate request id".to_string()),
            );
        }
        let service = match self.client.service() {
            Ok(service) => service,
            Err(e) => return self.reject(family, request_id, e),
        };

        let generation = self.next_generation;
        self.next_generation += 1;
        let callback = self.callback(&request_id, generation);
        self.in_flight
            .insert(request_id.clone(), InFlight { generation, family });
        let issued = match &operation {
            BridgeOperation::CreateKeystore { secret, address } => {
                tracing::debug!(
                    request_id = %request_id,
                    address = %address,
                    secret_len = secret.len(),
                    "createKeystore"
                );
                service.create_keystore(secret, address, callback)
            }
            BridgeOperation::DecryptKeystore { keystore } => {
                tracing::debug!(
                    request_id = %request_id,
                    keystore_len = keystore.len(),
                    "decryptKeystore"
                );
                service.decrypt_keystore(keystore, callback)
            }
            BridgeOperation::CaptureSecret { options } => {
                tracing::debug!(request_id = %request_id, "captureSecret");
                service.capture_secret(options, callback)
            }
        };

        if let Err(e) = issued {
            self.in_flight.remove(&request_id);
            self.reject(family, request_id, e);
        }
    }

    fn callback(&self, request_id: &str, generation: u64) -> ServiceCallback {
        let completions = self.completions.clone();
        ServiceCallback::new(request_id, move |response: BridgeResponse| {
            let delivered = completions.upgrade().is_some_and(|tx| {
                tx.send(Command::Complete {
                    generation,
                    response,
                })
                .is_ok()
            });
            if !delivered {
                tracing::debug!("Bridge closed, dropping service completion");
            }
        })
    }

    fn complete(&mut self, generation: u64, response: BridgeResponse) {
        let current = self
            .in_flight
            .get(&response.request_id)
            .is_some_and(|entry| entry.generation == generation);
        let Some(InFlight { family, .. }) = current
            .then(|| self.in_flight.remove(&response.request_id))
            .flatten()
        else {
            tracing::warn!(
                request_id = %response.request_id,
                "Dropping completion for unknown or already completed request"
            );
            return;
        };

        let mismatched =
            matches!(&response.outcome, Ok(payload) if payload.family() != family);
        let response = if mismatched {
            tracing::warn!(
                request_id = %response.request_id,
                expected = ?family,
                "Service returned a result for another operation"
            );
            BridgeResponse::failure(
                response.request_id,
                BridgeError::OperationFailed("Unexpected service result".to_string()),
            )
        } else {
            response
        };

        match &response.outcome {
            Ok(_) => tracing::debug!(
                request_id = %response.request_id,
                event = family.event_name(),
                "Bridge request succeeded"
            ),
            Err(e) => tracing::warn!(
                request_id = %response.request_id,
                event = family.event_name(),
                error = %e,
                "Bridge request failed"
            ),
        }
        self.sandbox.dispatch(&CompletionEvent::new(family, response));
    }

    fn reject(&mut self, family: EventFamily, request_id: String, error: BridgeError) {
        tracing::warn!(
            request_id = %request_id,
            event = family.event_name(),
            error = %error,
            "Bridge request rejected"
        );
        self.sandbox.dispatch(&CompletionEvent::new(
            family,
            BridgeResponse::failure(request_id, error),
        ));
    }

    fn navigate(&self, page_path: &str) {
        if let Some(url) = self.guard.resolve(page_path) {
            tracing::debug!(url = %url, "Navigating");
            self.sandbox.load_url(&url);
        }
    }

    fn relay(&self, kind: RelayKind, request_id: &str, response_json: &str) {
        tracing::debug!(request_id = %request_id, kind = ?kind, "Relaying headless response");
        match &self.responses {
            Some(handler) => handler.on_response(kind, request_id, response_json),
            None => tracing::warn!(request_id = %request_id, "No response handler, dropping"),
        }
    }

    fn abandon(&mut self) {
        if !self.in_flight.is_empty() {
            tracing::info!(count = self.in_flight.len(), "Abandoning in-flight bridge requests");
            self.in_flight.clear();
        }
    }
}
