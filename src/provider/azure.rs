//! Azure Key Vault: client-credentials token, then wrapkey/unwrapkey.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::envelope::{DataKey, Sealed};
use super::{fresh_http_client, DataKeyRef, KmsClient, KmsProvider};
use crate::config::AzureConfig;
use crate::error::{BenchError, Result};

const API_VERSION: &str = "7.4";
const KEY_WRAP_ALGORITHM: &str = "RSA-OAEP-256";
const VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// Provider for Azure Key Vault
pub struct AzureKeyVaultProvider {
    config: Arc<AzureConfig>,
    timeout: Duration,
}

/// Single-use Key Vault client. Its access token is never shared with another client.
pub struct AzureKeyVaultClient {
    http: reqwest::Client,
    config: Arc<AzureConfig>,
    access_token: Option<String>,
    data_key: Option<DataKey>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct KeyOperationResponse {
    #[serde(default)]
    kid: Option<String>,
    value: String,
}

impl AzureKeyVaultProvider {
    pub fn new(config: AzureConfig, timeout: Duration) -> Self {
        Self {
            config: Arc::new(config),
            timeout,
        }
    }
}

impl KmsProvider for AzureKeyVaultProvider {
    type Client = AzureKeyVaultClient;

    async fn create_data_key(&self) -> Result<DataKeyRef> {
        tracing::info!(
            vault = %self.config.key_vault_endpoint,
            key_name = %self.config.key_name,
            "Creating data key via Azure Key Vault..."
        );

        let mut client = self.connect().await?;
        let result = client.wrap_key(&DataKey::generate()).await;
        client.close().await;

        let key = result?;
        tracing::info!(key_id = %key.key_id, "✅ Data key created");
        Ok(key)
    }

    async fn connect(&self) -> Result<AzureKeyVaultClient> {
        Ok(AzureKeyVaultClient {
            http: fresh_http_client(self.timeout)?,
            config: self.config.clone(),
            access_token: None,
            data_key: None,
        })
    }
}

impl AzureKeyVaultClient {
    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.identity_endpoint.trim_end_matches('/'),
            self.config.tenant_id
        )
    }

    fn key_operation_url(&self, operation: &str) -> String {
        format!(
            "{}/keys/{}/{}?api-version={}",
            self.config.key_vault_endpoint.trim_end_matches('/'),
            self.config.key_name,
            operation,
            API_VERSION
        )
    }

    /// Fetch (once per client) an access token for the vault scope
    async fn access_token(&mut self) -> Result<String> {
        if let Some(token) = &self.access_token {
            return Ok(token.clone());
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", VAULT_SCOPE),
        ];

        let response = self.http.post(self.token_url()).form(&form).send().await?;
        let data: TokenResponse = parse_response(response).await?;

        if data.access_token.is_empty() {
            return Err(BenchError::Kms {
                status: 200,
                message: "token response does not contain access_token".to_string(),
            });
        }

        tracing::trace!(expires_in = ?data.expires_in, "Azure access token acquired");
        self.access_token = Some(data.access_token.clone());
        Ok(data.access_token)
    }

    async fn key_operation(
        &mut self,
        operation: &str,
        value: &[u8],
    ) -> Result<KeyOperationResponse> {
        let token = self.access_token().await?;
        let body = serde_json::json!({
            "alg": KEY_WRAP_ALGORITHM,
            "value": URL_SAFE_NO_PAD.encode(value),
        });

        let response = self
            .http
            .post(self.key_operation_url(operation))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        parse_response(response).await
    }

    async fn wrap_key(&mut self, key: &DataKey) -> Result<DataKeyRef> {
        let response = self.key_operation("wrapkey", key.as_bytes()).await?;
        let wrapped = decode_base64url(&response.value)?;
        let key_id = response.kid.unwrap_or_else(|| {
            format!(
                "{}/keys/{}",
                self.config.key_vault_endpoint, self.config.key_name
            )
        });

        Ok(DataKeyRef { key_id, wrapped })
    }

    async fn unwrap_key(&mut self, key: &DataKeyRef) -> Result<DataKey> {
        let response = self.key_operation("unwrapkey", &key.wrapped).await?;
        DataKey::from_bytes(decode_base64url(&response.value)?)
    }
}

impl KmsClient for AzureKeyVaultClient {
    async fn encrypt(&mut self, payload: &[u8], key: &DataKeyRef) -> Result<Sealed> {
        if self.data_key.is_none() {
            self.data_key = Some(self.unwrap_key(key).await?);
        }

        match &self.data_key {
            Some(data_key) => data_key.seal(payload),
            None => Err(BenchError::Crypto("data key unavailable".to_string())),
        }
    }

    async fn close(mut self) {
        self.data_key.take();
        self.access_token.take();
        tracing::trace!(vault = %self.config.key_vault_endpoint, "Azure Key Vault client closed");
    }
}

/// Deserialize a success body, or turn the status and body into a KMS error
async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(BenchError::Kms {
            status: status.as_u16(),
            message: azure_error_message(&text),
        });
    }
    Ok(response.json::<T>().await?)
}

/// Key Vault errors: `{"error":{"code":..,"message":..}}`; identity errors: `{"error":..,"error_description":..}`
fn azure_error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };

    if let Some(err) = json.get("error").filter(|e| e.is_object()) {
        let code = err.get("code").and_then(|v| v.as_str()).unwrap_or("Error");
        let message = err.get("message").and_then(|v| v.as_str()).unwrap_or("");
        return format!("{}: {}", code, message);
    }

    match (
        json.get("error").and_then(|v| v.as_str()),
        json.get("error_description").and_then(|v| v.as_str()),
    ) {
        (Some(code), Some(description)) => format!("{}: {}", code, description),
        (Some(code), None) => code.to_string(),
        _ => body.to_string(),
    }
}

fn decode_base64url(value: &str) -> Result<Vec<u8>> {
    // Key Vault returns unpadded base64url; tolerate padding
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| BenchError::Crypto(format!("value is not valid base64url: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(server_url: &str) -> AzureConfig {
        AzureConfig {
            tenant_id: "tenant-1".to_string(),
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            key_vault_endpoint: server_url.to_string(),
            key_name: "bench-key".to_string(),
            identity_endpoint: server_url.to_string(),
        }
    }

    fn token_body() -> String {
        serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "test-access-token"
        })
        .to_string()
    }

    #[test]
    fn test_azure_error_message_formats() {
        assert_eq!(
            azure_error_message(r#"{"error":{"code":"Forbidden","message":"Access denied"}}"#),
            "Forbidden: Access denied"
        );
        assert_eq!(
            azure_error_message(r#"{"error":"invalid_client","error_description":"AADSTS7000215"}"#),
            "invalid_client: AADSTS7000215"
        );
        assert_eq!(azure_error_message("plain text"), "plain text");
    }

    #[test]
    fn test_decode_base64url_accepts_padding() {
        assert_eq!(decode_base64url("Zm9v").unwrap(), b"foo".to_vec());
        assert_eq!(decode_base64url("Zm8=").unwrap(), b"fo".to_vec());
        assert!(decode_base64url("***").is_err());
    }

    #[tokio::test]
    async fn test_encrypt_fetches_token_then_unwraps() {
        let mut server = mockito::Server::new_async().await;
        let plaintext_key = DataKey::generate();

        let token_mock = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "client-1".into()),
                Matcher::UrlEncoded("scope".into(), VAULT_SCOPE.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body())
            .expect(1)
            .create_async()
            .await;

        let unwrap_mock = server
            .mock("POST", Matcher::Regex(r"^/keys/bench-key/unwrapkey".to_string()))
            .match_header("authorization", "Bearer test-access-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "kid": "https://vault/keys/bench-key/v1",
                    "value": URL_SAFE_NO_PAD.encode(plaintext_key.as_bytes()),
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let provider = AzureKeyVaultProvider::new(config(&server.url()), Duration::from_secs(5));
        let key = DataKeyRef {
            key_id: "https://vault/keys/bench-key/v1".to_string(),
            wrapped: vec![1, 2, 3, 4],
        };

        let mut client = provider.connect().await.unwrap();
        let sealed = client.encrypt(b"foo", &key).await.unwrap();
        client.close().await;

        assert_eq!(plaintext_key.open(&sealed).unwrap(), b"foo".to_vec());
        token_mock.assert_async().await;
        unwrap_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_data_key_wraps_random_key() {
        let mut server = mockito::Server::new_async().await;

        let _token_mock = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body())
            .create_async()
            .await;

        let wrap_mock = server
            .mock("POST", Matcher::Regex(r"^/keys/bench-key/wrapkey".to_string()))
            .match_body(Matcher::PartialJson(
                serde_json::json!({ "alg": KEY_WRAP_ALGORITHM }),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"kid":"https://vault/keys/bench-key/v7","value":"AQIDBA"}"#)
            .create_async()
            .await;

        let provider = AzureKeyVaultProvider::new(config(&server.url()), Duration::from_secs(5));
        let key = provider.create_data_key().await.unwrap();

        assert_eq!(key.key_id, "https://vault/keys/bench-key/v7");
        assert_eq!(key.wrapped, vec![1, 2, 3, 4]);
        wrap_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_failure_surfaces_as_kms_error() {
        let mut server = mockito::Server::new_async().await;

        let _token_mock = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client","error_description":"bad secret"}"#)
            .create_async()
            .await;

        let provider = AzureKeyVaultProvider::new(config(&server.url()), Duration::from_secs(5));
        let mut client = provider.connect().await.unwrap();
        let key = DataKeyRef {
            key_id: "kid".to_string(),
            wrapped: vec![0; 4],
        };

        let err = client.encrypt(b"foo", &key).await.unwrap_err();
        client.close().await;

        match err {
            BenchError::Kms { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid_client: bad secret");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
