//! Bridge wire model
//!
//! Requests arrive either as direct calls on [`crate::BridgeHandle`] or as
//! JSON messages with a closed `op` tag. Completions leave as one
//! `CustomEvent` per request, dispatched on `window`.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Event family, one per operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFamily {
    /// `createKeystore` completions
    KeystoreCreated,
    /// `decryptKeystore` completions
    KeystoreDecrypted,
    /// `captureSecret` completions
    QrScanned,
}

impl EventFamily {
    /// DOM event name
    pub fn event_name(self) -> &'static str {
        match self {
            EventFamily::KeystoreCreated => "keystoreCreated",
            EventFamily::KeystoreDecrypted => "keystoreDecrypted",
            EventFamily::QrScanned => "qrScanned",
        }
    }

    fn from_op(op: &str) -> Option<Self> {
        match op {
            "createKeystore" => Some(EventFamily::KeystoreCreated),
            "decryptKeystore" => Some(EventFamily::KeystoreDecrypted),
            "captureSecret" => Some(EventFamily::QrScanned),
            _ => None,
        }
    }
}

/// Operation requested by sandbox script
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum BridgeOperation {
    /// Encrypt `secret` into a keystore for `address`
    CreateKeystore {
        /// Secret material as supplied by the mini-app
        #[serde(default)]
        secret: String,
        /// Account address
        #[serde(default)]
        address: String,
    },
    /// Decrypt a keystore blob
    DecryptKeystore {
        /// Keystore JSON
        #[serde(default)]
        keystore: String,
    },
    /// Capture a secret through a QR scan
    CaptureSecret {
        /// Scanner options, passed through untouched
        #[serde(default)]
        options: Value,
    },
}

impl std::fmt::Debug for BridgeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeOperation::CreateKeystore { secret, address } => f
                .debug_struct("CreateKeystore")
                .field("secret_len", &secret.len())
                .field("address", address)
                .finish(),
            BridgeOperation::DecryptKeystore { keystore } => f
                .debug_struct("DecryptKeystore")
                .field("keystore_len", &keystore.len())
                .finish(),
            BridgeOperation::CaptureSecret { options } => f
                .debug_struct("CaptureSecret")
                .field("options", options)
                .finish(),
        }
    }
}

impl BridgeOperation {
    /// Completion event family for this operation
    pub fn family(&self) -> EventFamily {
        match self {
            BridgeOperation::CreateKeystore { .. } => EventFamily::KeystoreCreated,
            BridgeOperation::DecryptKeystore { .. } => EventFamily::KeystoreDecrypted,
            BridgeOperation::CaptureSecret { .. } => EventFamily::QrScanned,
        }
    }

    /// Reject blank required fields
    pub fn validate(&self) -> Result<(), BridgeError> {
        let missing = match self {
            BridgeOperation::CreateKeystore { secret, .. } if is_blank(secret) => {
                Some("Secret data is required")
            }
            BridgeOperation::CreateKeystore { address, .. } if is_blank(address) => {
                Some("Address is required")
            }
            BridgeOperation::DecryptKeystore { keystore } if is_blank(keystore) => {
                Some("Keystore JSON is required")
            }
            _ => None,
        };
        match missing {
            Some(message) => Err(BridgeError::InvalidRequest(message.to_string())),
            None => Ok(()),
        }
    }
}

impl Zeroize for BridgeOperation {
    fn zeroize(&mut self) {
        if let BridgeOperation::CreateKeystore { secret, .. } = self {
            secret.zeroize();
        }
    }
}

/// The `createKeystore` secret is wiped however the request ends
impl Drop for BridgeOperation {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for BridgeOperation {}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Request correlated by a caller-chosen id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    /// Caller-chosen id, unique among in-flight requests
    pub request_id: String,
    /// Requested operation
    #[serde(flatten)]
    pub operation: BridgeOperation,
}

/// A JSON message that could not be turned into a request
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedMessage {
    /// Request id, when it could be recovered
    pub request_id: Option<String>,
    /// Event family, when the `op` tag was recognizable
    pub family: Option<EventFamily>,
    /// Parse failure
    pub error: BridgeError,
}

impl BridgeRequest {
    /// Create a request
    pub fn new(request_id: impl Into<String>, operation: BridgeOperation) -> Self {
        Self {
            request_id: request_id.into(),
            operation,
        }
    }

    /// Parse a JSON bridge message
    pub fn from_json(json: &str) -> Result<Self, MalformedMessage> {
        let value: Value = serde_json::from_str(json).map_err(|e| MalformedMessage {
            request_id: None,
            family: None,
            error: BridgeError::InvalidRequest(format!("Malformed message: {}", e)),
        })?;

        let request_id = value
            .get("requestId")
            .and_then(Value::as_str)
            .map(str::to_string);
        let family = value
            .get("op")
            .and_then(Value::as_str)
            .and_then(EventFamily::from_op);

        serde_json::from_value(value).map_err(|e| MalformedMessage {
            request_id,
            family,
            error: BridgeError::InvalidRequest(format!("Malformed message: {}", e)),
        })
    }

    /// Reject blank ids and blank required fields
    pub fn validate(&self) -> Result<(), BridgeError> {
        if is_blank(&self.request_id) {
            return Err(BridgeError::InvalidRequest(
                "Request id is required".to_string(),
            ));
        }
        self.operation.validate()
    }
}

/// Successful service result
#[derive(Clone, PartialEq, Eq)]
pub enum ServicePayload {
    /// Created keystore JSON
    Keystore(String),
    /// Decrypted keystore; `secret` is hex and opaque to the bridge
    Decrypted {
        /// Account address
        address: String,
        /// Hex-encoded secret
        secret: Zeroizing<String>,
    },
    /// Scanned QR content
    Scanned(String),
}

impl std::fmt::Debug for ServicePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServicePayload::Keystore(keystore) => f
                .debug_struct("Keystore")
                .field("len", &keystore.len())
                .finish(),
            ServicePayload::Decrypted { address, secret } => f
                .debug_struct("Decrypted")
                .field("address", address)
                .field("secret_len", &secret.len())
                .finish(),
            ServicePayload::Scanned(data) => {
                f.debug_struct("Scanned").field("len", &data.len()).finish()
            }
        }
    }
}

impl ServicePayload {
    /// Event family this payload completes
    pub fn family(&self) -> EventFamily {
        match self {
            ServicePayload::Keystore(_) => EventFamily::KeystoreCreated,
            ServicePayload::Decrypted { .. } => EventFamily::KeystoreDecrypted,
            ServicePayload::Scanned(_) => EventFamily::QrScanned,
        }
    }
}

/// Exactly one per request
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeResponse {
    /// Id of the completed request
    pub request_id: String,
    /// Result or error
    pub outcome: Result<ServicePayload, BridgeError>,
}

impl BridgeResponse {
    /// Successful response
    pub fn success(request_id: impl Into<String>, payload: ServicePayload) -> Self {
        Self {
            request_id: request_id.into(),
            outcome: Ok(payload),
        }
    }

    /// Failed response
    pub fn failure(request_id: impl Into<String>, error: BridgeError) -> Self {
        Self {
            request_id: request_id.into(),
            outcome: Err(error),
        }
    }

    /// Whether the request succeeded
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Completion event injected into the sandbox
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    /// Event family
    pub family: EventFamily,
    /// Response carried in `detail`
    pub response: BridgeResponse,
}

impl CompletionEvent {
    /// Create an event
    pub fn new(family: EventFamily, response: BridgeResponse) -> Self {
        Self { family, response }
    }

    /// DOM event name
    pub fn name(&self) -> &'static str {
        self.family.event_name()
    }

    /// `detail` object of the event
    pub fn detail(&self) -> Value {
        let request_id = self.response.request_id.as_str();
        match &self.response.outcome {
            Ok(ServicePayload::Keystore(keystore)) => json!({
                "requestId": request_id,
                "success": true,
                "keystore": keystore,
            }),
            Ok(ServicePayload::Decrypted { address, secret }) => json!({
                "requestId": request_id,
                "success": true,
                "address": address,
                "secret": secret.as_str(),
            }),
            Ok(ServicePayload::Scanned(data)) => json!({
                "requestId": request_id,
                "success": true,
                "data": data,
            }),
            Err(error) => json!({
                "requestId": request_id,
                "success": false,
                "error": error.to_string(),
            }),
        }
    }

    /// Script dispatching this event on `window`
    ///
    /// Every value is a JSON literal, so mini-app supplied strings cannot
    /// terminate the surrounding expression.
    pub fn to_script(&self) -> String {
        let script = format!(
            "window.dispatchEvent(new CustomEvent({}, {{ detail: {} }}));",
            Value::from(self.name()),
            self.detail()
        );
        // line and paragraph separators are not escaped by JSON
        script
            .replace('\u{2028}', "\\u2028")
            .replace('\u{2029}', "\\u2029")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_zeroize_on_drop<T: ZeroizeOnDrop>() {}

    #[test]
    fn test_create_secret_is_wiped() {
        assert_zeroize_on_drop::<BridgeOperation>();

        let mut operation = BridgeOperation::CreateKeystore {
            secret: "abandon ability".to_string(),
            address: "0xabc".to_string(),
        };
        operation.zeroize();
        assert_eq!(
            operation,
            BridgeOperation::CreateKeystore {
                secret: String::new(),
                address: "0xabc".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_tagged_message() {
        let request = BridgeRequest::from_json(
            r#"{"requestId":"r1","op":"createKeystore","secret":"abandon","address":"0xabc"}"#,
        )
        .unwrap();
        assert_eq!(request.request_id, "r1");
        assert_eq!(
            request.operation,
            BridgeOperation::CreateKeystore {
                secret: "abandon".to_string(),
                address: "0xabc".to_string(),
            }
        );
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_parse_capture_without_options() {
        let request = BridgeRequest::from_json(r#"{"requestId":"r2","op":"captureSecret"}"#).unwrap();
        assert_eq!(
            request.operation,
            BridgeOperation::CaptureSecret {
                options: Value::Null
            }
        );
    }

    #[test]
    fn test_missing_field_becomes_blank() {
        let request =
            BridgeRequest::from_json(r#"{"requestId":"r3","op":"decryptKeystore"}"#).unwrap();
        assert_eq!(
            request.validate(),
            Err(BridgeError::InvalidRequest(
                "Keystore JSON is required".to_string()
            ))
        );
    }

    #[test]
    fn test_unknown_op_keeps_request_id() {
        let err = BridgeRequest::from_json(r#"{"requestId":"r4","op":"signTransaction"}"#)
            .unwrap_err();
        assert_eq!(err.request_id.as_deref(), Some("r4"));
        assert_eq!(err.family, None);
        assert!(matches!(err.error, BridgeError::InvalidRequest(_)));
    }

    #[test]
    fn test_not_json() {
        let err = BridgeRequest::from_json("createKeystore(").unwrap_err();
        assert_eq!(err.request_id, None);
    }

    #[test]
    fn test_blank_field_messages() {
        let cases = [
            (
                BridgeOperation::CreateKeystore {
                    secret: "  ".to_string(),
                    address: "0xabc".to_string(),
                },
                "Secret data is required",
            ),
            (
                BridgeOperation::CreateKeystore {
                    secret: "s".to_string(),
                    address: String::new(),
                },
                "Address is required",
            ),
            (
                BridgeOperation::DecryptKeystore {
                    keystore: "\n".to_string(),
                },
                "Keystore JSON is required",
            ),
        ];
        for (operation, message) in cases {
            assert_eq!(
                operation.validate(),
                Err(BridgeError::InvalidRequest(message.to_string()))
            );
        }
        assert!(BridgeOperation::CaptureSecret {
            options: Value::Null
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let operation = BridgeOperation::CreateKeystore {
            secret: "abandon ability able".to_string(),
            address: "0xabc".to_string(),
        };
        assert!(!format!("{:?}", operation).contains("abandon"));

        let payload = ServicePayload::Decrypted {
            address: "0xabc".to_string(),
            secret: Zeroizing::new("deadbeef".to_string()),
        };
        assert!(!format!("{:?}", payload).contains("deadbeef"));
    }

    #[test]
    fn test_script_escapes_values() {
        let event = CompletionEvent::new(
            EventFamily::QrScanned,
            BridgeResponse::success(
                "r1",
                ServicePayload::Scanned("\"}});alert(1);//\u{2028}".to_string()),
            ),
        );
        let script = event.to_script();
        assert!(script.starts_with("window.dispatchEvent(new CustomEvent(\"qrScanned\", { detail: {"));
        assert!(script.contains(r#"\"}});alert(1);//\u2028"#));
        assert!(!script.contains('\u{2028}'));
        assert!(script.ends_with("}));"));
    }

    #[test]
    fn test_failure_detail() {
        let event = CompletionEvent::new(
            EventFamily::KeystoreCreated,
            BridgeResponse::failure("r9", BridgeError::ServiceUnavailable),
        );
        assert_eq!(
            event.detail(),
            json!({"requestId": "r9", "success": false, "error": "Service not connected"})
        );
    }
}
