//! Host-side view of the embedded web runtime

use crate::protocol::CompletionEvent;
use url::Url;

/// Embedded web runtime hosting mini-app pages
///
/// Calls are made only from the bridge event loop.
pub trait SandboxRuntime: Send + Sync {
    /// Evaluate `script` in the page
    fn evaluate_script(&self, script: &str);

    /// Navigate the page to `url`
    fn load_url(&self, url: &Url);

    /// Inject a completion event
    fn dispatch(&self, event: &CompletionEvent) {
        self.evaluate_script(&event.to_script());
    }
}

/// Kind of response relayed from the headless blockchain sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    /// `sendTransactionResponse`
    Transaction,
    /// `sendUniversalResponse`
    Universal,
}

/// Host consumer of relayed responses
pub trait ResponseHandler: Send + Sync {
    /// Called on the bridge event loop, in arrival order
    fn on_response(&self, kind: RelayKind, request_id: &str, response_json: &str);
}

impl<F> ResponseHandler for F
where
    F: Fn(RelayKind, &str, &str) + Send + Sync,
{
    fn on_response(&self, kind: RelayKind, request_id: &str, response_json: &str) {
        self(kind, request_id, response_json)
    }
}
