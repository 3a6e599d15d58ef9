//! AWS KMS over the JSON 1.1 protocol.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::envelope::{DataKey, Sealed};
use super::sigv4::{self, Credentials, SignableRequest};
use super::{fresh_http_client, DataKeyRef, KmsClient, KmsProvider};
use crate::config::AwsConfig;
use crate::error::{BenchError, Result};

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const SERVICE: &str = "kms";

/// Provider for AWS KMS (or anything speaking its protocol)
pub struct AwsKmsProvider {
    config: Arc<AwsConfig>,
    timeout: Duration,
}

/// Single-use AWS KMS client
pub struct AwsKmsClient {
    http: reqwest::Client,
    endpoint: Url,
    config: Arc<AwsConfig>,
    /// Unwrapped data key, only ever cached for this client's lifetime
    data_key: Option<DataKey>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GenerateDataKeyResponse {
    ciphertext_blob: String,
    key_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DecryptResponse {
    plaintext: String,
}

#[derive(Debug, Deserialize)]
struct KmsErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

impl AwsKmsProvider {
    pub fn new(config: AwsConfig, timeout: Duration) -> Self {
        Self {
            config: Arc::new(config),
            timeout,
        }
    }

    /// Configured endpoint, or the regional public one
    pub fn endpoint(&self) -> String {
        self.config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://kms.{}.amazonaws.com", self.config.region))
    }
}

impl KmsProvider for AwsKmsProvider {
    type Client = AwsKmsClient;

    async fn create_data_key(&self) -> Result<DataKeyRef> {
        tracing::info!(key_id = %self.config.key_id, "Creating data key via AWS KMS...");

        let client = self.connect().await?;
        let result = client.generate_data_key().await;
        client.close().await;

        let key = result?;
        tracing::info!(key_id = %key.key_id, wrapped_len = key.wrapped.len(), "✅ Data key created");
        Ok(key)
    }

    async fn connect(&self) -> Result<AwsKmsClient> {
        let endpoint = Url::parse(&self.endpoint())
            .map_err(|e| BenchError::Config(format!("invalid KMS endpoint: {}", e)))?;

        Ok(AwsKmsClient {
            http: fresh_http_client(self.timeout)?,
            endpoint,
            config: self.config.clone(),
            data_key: None,
        })
    }
}

impl AwsKmsClient {
    async fn generate_data_key(&self) -> Result<DataKeyRef> {
        let body = serde_json::json!({
            "KeyId": self.config.key_id,
            "KeySpec": "AES_256",
        });

        let response: GenerateDataKeyResponse = self.call("GenerateDataKey", &body).await?;
        let wrapped = decode_base64(&response.ciphertext_blob, "CiphertextBlob")?;

        Ok(DataKeyRef {
            key_id: response.key_id,
            wrapped,
        })
    }

    async fn decrypt(&self, key: &DataKeyRef) -> Result<DataKey> {
        let body = serde_json::json!({
            "CiphertextBlob": STANDARD.encode(&key.wrapped),
            "KeyId": key.key_id,
        });

        let response: DecryptResponse = self.call("Decrypt", &body).await?;
        DataKey::from_bytes(decode_base64(&response.plaintext, "Plaintext")?)
    }

    /// Send one signed `TrentService.<operation>` request
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let payload = serde_json::to_vec(body).map_err(|e| BenchError::Internal(e.into()))?;
        let now = Utc::now();

        let mut headers = vec![
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            ("host".to_string(), host_header(&self.endpoint)?),
            ("x-amz-date".to_string(), sigv4::amz_date(now)),
            (
                "x-amz-target".to_string(),
                format!("TrentService.{}", operation),
            ),
        ];
        if let Some(token) = &self.config.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        let credentials = Credentials {
            access_key_id: self.config.access_key_id.clone(),
            secret_access_key: self.config.secret_access_key.clone(),
            session_token: self.config.session_token.clone(),
        };
        let signable = SignableRequest {
            method: "POST",
            path: self.endpoint.path(),
            query: "",
            headers,
            payload: &payload,
        };
        let authorization =
            sigv4::authorization(&credentials, &self.config.region, SERVICE, now, &signable);

        // reqwest derives Host from the URL, identical to the signed value
        let mut request = self.http.post(self.endpoint.clone());
        for (name, value) in signable.headers.iter().filter(|(n, _)| n != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        request = request.header("authorization", authorization);

        tracing::trace!(operation, endpoint = %self.endpoint, "Sending KMS request");

        let response = request.body(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(kms_error(status.as_u16(), &text));
        }

        Ok(response.json::<T>().await?)
    }
}

impl KmsClient for AwsKmsClient {
    async fn encrypt(&mut self, payload: &[u8], key: &DataKeyRef) -> Result<Sealed> {
        if self.data_key.is_none() {
            self.data_key = Some(self.decrypt(key).await?);
        }

        match &self.data_key {
            Some(data_key) => data_key.seal(payload),
            None => Err(BenchError::Crypto("data key unavailable".to_string())),
        }
    }

    async fn close(mut self) {
        // Dropping the key zeroes it
        self.data_key.take();
        tracing::trace!(endpoint = %self.endpoint, "AWS KMS client closed");
    }
}

/// `host[:port]` exactly as reqwest will send it
fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| BenchError::Config(format!("KMS endpoint has no host: {}", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn decode_base64(value: &str, field: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| BenchError::Crypto(format!("{} is not valid base64: {}", field, e)))
}

/// Turn an AWS JSON error body into a KMS error
fn kms_error(status: u16, body: &str) -> BenchError {
    let message = match serde_json::from_str::<KmsErrorBody>(body) {
        Ok(err) if !err.kind.is_empty() => {
            // `__type` may be namespaced: "com.amazonaws.kms#NotFoundException"
            let kind = err.kind.rsplit('#').next().unwrap_or(&err.kind);
            if err.message.is_empty() {
                kind.to_string()
            } else {
                format!("{}: {}", kind, err.message)
            }
        }
        _ => body.to_string(),
    };

    BenchError::Kms { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> AwsConfig {
        AwsConfig {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
            key_id: "alias/bench".to_string(),
            region: "eu-west-1".to_string(),
            endpoint: endpoint.map(str::to_string),
        }
    }

    #[test]
    fn test_default_endpoint_is_regional() {
        let provider = AwsKmsProvider::new(config(None), Duration::from_secs(5));
        assert_eq!(provider.endpoint(), "https://kms.eu-west-1.amazonaws.com");

        let provider = AwsKmsProvider::new(
            config(Some("http://127.0.0.1:4566")),
            Duration::from_secs(5),
        );
        assert_eq!(provider.endpoint(), "http://127.0.0.1:4566");
    }

    #[test]
    fn test_host_header_includes_non_default_port() {
        let url = Url::parse("http://127.0.0.1:4566").unwrap();
        assert_eq!(host_header(&url).unwrap(), "127.0.0.1:4566");

        let url = Url::parse("https://kms.us-east-1.amazonaws.com").unwrap();
        assert_eq!(host_header(&url).unwrap(), "kms.us-east-1.amazonaws.com");
    }

    #[test]
    fn test_kms_error_parsing() {
        let err = kms_error(
            400,
            r#"{"__type":"com.amazonaws.kms#NotFoundException","message":"Alias not found"}"#,
        );
        assert_eq!(
            err.to_string(),
            "KMS error: 400 - NotFoundException: Alias not found"
        );

        let err = kms_error(400, r#"{"__type":"InvalidCiphertextException","Message":"bad"}"#);
        assert_eq!(err.to_string(), "KMS error: 400 - InvalidCiphertextException: bad");

        let err = kms_error(502, "Bad Gateway");
        assert_eq!(err.to_string(), "KMS error: 502 - Bad Gateway");
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_endpoint() {
        let provider = AwsKmsProvider::new(config(Some("::not-a-url")), Duration::from_secs(5));
        assert!(matches!(
            provider.connect().await,
            Err(BenchError::Config(_))
        ));
    }
}
