//! KMS providers driven by the harness.
//!
//! A provider knows how to reach one key-management service. The harness asks it
//! for a brand-new client on every iteration, so no connection or unwrapped key
//! survives from one request to the next:
//! - AWS KMS (Signature V4 over the JSON protocol)
//! - Azure Key Vault (client-credentials token + unwrapkey)
//! - An in-process mock KMS speaking the AWS subset

pub mod aws;
pub mod azure;
pub mod envelope;
pub mod mock_server;
pub mod sigv4;

use std::time::Duration;

use crate::config::{AwsConfig, ProviderConfig};
use crate::error::Result;

pub use aws::{AwsKmsClient, AwsKmsProvider};
pub use azure::{AzureKeyVaultClient, AzureKeyVaultProvider};
pub use envelope::{DataKey, Sealed};
pub use mock_server::MockKmsServer;

/// Opaque reference to a wrapped data-encryption key, created once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataKeyRef {
    /// Identifier of the master key that wrapped the data key
    pub key_id: String,
    /// Data key as returned by the KMS, still wrapped
    pub wrapped: Vec<u8>,
}

/// Source of fresh KMS clients
#[allow(async_fn_in_trait)]
pub trait KmsProvider {
    type Client: KmsClient;

    /// Provision the data key every iteration reuses. Not part of the timed loop.
    async fn create_data_key(&self) -> Result<DataKeyRef>;

    /// Build a new client with no cached connection or key material
    async fn connect(&self) -> Result<Self::Client>;
}

/// A single-use KMS client
#[allow(async_fn_in_trait)]
pub trait KmsClient {
    /// Encrypt `payload` under the data key, unwrapping it through the KMS
    async fn encrypt(&mut self, payload: &[u8], key: &DataKeyRef) -> Result<Sealed>;

    /// Release the client's connection and key material
    async fn close(self);
}

/// Provider selected by configuration
pub enum AnyProvider {
    Aws(AwsKmsProvider),
    Azure(AzureKeyVaultProvider),
    /// AWS client pointed at a mock KMS owned by the provider
    Mock {
        server: MockKmsServer,
        inner: AwsKmsProvider,
    },
}

impl AnyProvider {
    /// Build the provider, starting the mock KMS first when one is configured
    pub async fn start(config: &ProviderConfig, timeout: Duration) -> Result<Self> {
        match config {
            ProviderConfig::Aws(aws) => Ok(AnyProvider::Aws(AwsKmsProvider::new(
                aws.clone(),
                timeout,
            ))),
            ProviderConfig::Azure(azure) => Ok(AnyProvider::Azure(AzureKeyVaultProvider::new(
                azure.clone(),
                timeout,
            ))),
            ProviderConfig::Mock(mock) => {
                let mut server = MockKmsServer::new(mock.clone());
                server.start().await?;
                tracing::info!(url = %server.url(), "Mock KMS started");

                let inner = AwsKmsProvider::new(AwsConfig::for_mock(server.url()), timeout);
                Ok(AnyProvider::Mock { server, inner })
            }
        }
    }

    /// Stop the mock KMS, if any
    pub fn shutdown(&mut self) {
        if let AnyProvider::Mock { server, .. } = self {
            server.stop();
        }
    }
}

/// Client matching [`AnyProvider`]
pub enum AnyClient {
    Aws(AwsKmsClient),
    Azure(AzureKeyVaultClient),
}

impl KmsProvider for AnyProvider {
    type Client = AnyClient;

    async fn create_data_key(&self) -> Result<DataKeyRef> {
        match self {
            AnyProvider::Aws(p) | AnyProvider::Mock { inner: p, .. } => p.create_data_key().await,
            AnyProvider::Azure(p) => p.create_data_key().await,
        }
    }

    async fn connect(&self) -> Result<AnyClient> {
        match self {
            AnyProvider::Aws(p) | AnyProvider::Mock { inner: p, .. } => {
                p.connect().await.map(AnyClient::Aws)
            }
            AnyProvider::Azure(p) => p.connect().await.map(AnyClient::Azure),
        }
    }
}

impl KmsClient for AnyClient {
    async fn encrypt(&mut self, payload: &[u8], key: &DataKeyRef) -> Result<Sealed> {
        match self {
            AnyClient::Aws(c) => c.encrypt(payload, key).await,
            AnyClient::Azure(c) => c.encrypt(payload, key).await,
        }
    }

    async fn close(self) {
        match self {
            AnyClient::Aws(c) => c.close().await,
            AnyClient::Azure(c) => c.close().await,
        }
    }
}

/// Build a client that never reuses a pooled connection
pub(crate) fn fresh_http_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(timeout)
        .build()?;
    Ok(client)
}
