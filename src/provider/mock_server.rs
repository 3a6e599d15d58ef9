//! Mock KMS server speaking the AWS KMS JSON subset the harness needs.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::Rng;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::envelope::{DataKey, Sealed};
use crate::config::MockConfig;
use crate::error::{BenchError, Result};

const TARGET_HEADER: &str = "x-amz-target";

/// In-process stand-in for AWS KMS
pub struct MockKmsServer {
    config: MockConfig,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
    state: Arc<MockState>,
}

/// Shared between the handler and the owning server
struct MockState {
    config: MockConfig,
    /// Master key; wrapped data keys are sealed under it
    master_key: DataKey,
    key_arn: String,
    decrypt_count: AtomicUsize,
}

impl MockKmsServer {
    /// Create a new mock server with the given configuration
    pub fn new(config: MockConfig) -> Self {
        let state = Arc::new(MockState {
            config: config.clone(),
            master_key: DataKey::generate(),
            key_arn: format!(
                "arn:aws:kms:us-east-1:000000000000:key/{}",
                uuid::Uuid::new_v4()
            ),
            decrypt_count: AtomicUsize::new(0),
        });

        Self {
            config,
            shutdown_tx: None,
            port: 0,
            state,
        }
    }

    /// Start the mock server and return the actual port
    pub async fn start(&mut self) -> Result<u16> {
        let addr = format!("127.0.0.1:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        self.port = port;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = Router::new()
            .route("/", post(handle_kms))
            .with_state(self.state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(port)
    }

    /// Get the server's port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the server's URL
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Number of Decrypt requests served so far, failed ones included
    pub fn decrypt_count(&self) -> usize {
        self.state.decrypt_count.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockKmsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Dispatch on `X-Amz-Target` like the real service
async fn handle_kms(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_signed(&headers) {
        return kms_error_response(
            StatusCode::BAD_REQUEST,
            "MissingAuthenticationTokenException",
            "Request is missing Authentication Token",
        );
    }

    simulate_latency(&state.config).await;

    // Content type is application/x-amz-json-1.1, so no Json extractor
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();

    let target = headers
        .get(TARGET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let result = match target {
        "TrentService.GenerateDataKey" => generate_data_key(&state),
        "TrentService.Decrypt" => {
            let index = state.decrypt_count.fetch_add(1, Ordering::SeqCst);
            match state.config.fail_at {
                Some(fail_at) if index >= fail_at => {
                    return kms_error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "KMSInternalException",
                        "Simulated failure",
                    );
                }
                _ => decrypt(&state, &body),
            }
        }
        other => {
            return kms_error_response(
                StatusCode::BAD_REQUEST,
                "UnknownOperationException",
                &format!("Unsupported target: {}", other),
            );
        }
    };

    match result {
        Ok(value) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/x-amz-json-1.1")],
            Json(value),
        )
            .into_response(),
        Err(e) => kms_error_response(
            StatusCode::BAD_REQUEST,
            "InvalidCiphertextException",
            &e.to_string(),
        ),
    }
}

fn is_signed(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("AWS4-HMAC-SHA256 Credential="))
        .unwrap_or(false)
}

async fn simulate_latency(config: &MockConfig) {
    let jitter = if config.jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=config.jitter_ms)
    } else {
        0
    };
    let delay = config.latency_ms + jitter;
    if delay > 0 {
        tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
    }
}

fn generate_data_key(state: &MockState) -> Result<serde_json::Value> {
    let data_key = DataKey::generate();
    let wrapped = state.master_key.seal(data_key.as_bytes())?;

    Ok(json!({
        "CiphertextBlob": STANDARD.encode(wrapped.to_bytes()),
        "KeyId": state.key_arn,
        "Plaintext": STANDARD.encode(data_key.as_bytes()),
    }))
}

fn decrypt(state: &MockState, body: &serde_json::Value) -> Result<serde_json::Value> {
    let blob = body
        .get("CiphertextBlob")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BenchError::Crypto("CiphertextBlob is required".to_string()))?;
    let blob = STANDARD
        .decode(blob)
        .map_err(|e| BenchError::Crypto(format!("CiphertextBlob is not base64: {}", e)))?;

    let plaintext = state.master_key.open(&Sealed::from_bytes(&blob)?)?;

    Ok(json!({
        "KeyId": state.key_arn,
        "Plaintext": STANDARD.encode(plaintext),
        "EncryptionAlgorithm": "SYMMETRIC_DEFAULT",
    }))
}

fn kms_error_response(status: StatusCode, kind: &str, message: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/x-amz-json-1.1")],
        Json(json!({ "__type": kind, "message": message })),
    )
        .into_response()
}
