use clap::{Args, Parser, Subcommand};

use crate::error::{BenchError, Result};
use crate::harness::histogram::DEFAULT_BUCKETS;

/// KMS latency benchmark: repeatedly encrypts with a fresh client per request
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub provider: ProviderArgs,

    /// Number of encryption requests to send
    #[arg(short = 'n', long, env = "BENCH_REQUESTS", default_value = "1000", global = true)]
    pub requests: usize,

    /// Number of histogram buckets
    #[arg(short = 'b', long, env = "BENCH_BUCKETS", default_value_t = DEFAULT_BUCKETS, global = true)]
    pub buckets: usize,

    /// Plaintext encrypted on every request
    #[arg(long, env = "BENCH_PAYLOAD", default_value = "foo", global = true)]
    pub payload: String,

    /// Per-request KMS timeout in seconds
    #[arg(long, env = "KMS_REQUEST_TIMEOUT", default_value = "30", global = true)]
    pub timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Print the report as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ProviderArgs {
    /// Benchmark AWS KMS
    Aws(AwsArgs),
    /// Benchmark Azure Key Vault
    Azure(AzureArgs),
    /// Benchmark against an in-process mock KMS
    Mock(MockArgs),
}

#[derive(Args, Debug, Default)]
pub struct AwsArgs {
    /// AWS access key id
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    /// AWS secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// AWS session token for temporary credentials
    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub session_token: Option<String>,

    /// KMS key id or ARN wrapping the data key
    #[arg(long, env = "AWS_KEY_ID")]
    pub key_id: Option<String>,

    /// AWS region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Override the KMS endpoint URL
    #[arg(long, env = "AWS_KMS_ENDPOINT")]
    pub endpoint: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct AzureArgs {
    /// Azure AD tenant id
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Application (client) id
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Application client secret
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Key vault URL, e.g. https://my-vault.vault.azure.net
    #[arg(long, env = "AZURE_KEY_VAULT_ENDPOINT")]
    pub key_vault_endpoint: Option<String>,

    /// Name of the key wrapping the data key
    #[arg(long, env = "AZURE_KEY_NAME")]
    pub key_name: Option<String>,

    /// Identity platform host issuing access tokens
    #[arg(
        long,
        env = "AZURE_IDENTITY_ENDPOINT",
        default_value = "https://login.microsoftonline.com"
    )]
    pub identity_endpoint: String,
}

#[derive(Args, Debug, Default)]
pub struct MockArgs {
    /// Port for the mock KMS (0 for random)
    #[arg(long, env = "MOCK_KMS_PORT", default_value = "0")]
    pub port: u16,

    /// Simulated KMS round trip in milliseconds
    #[arg(long, env = "MOCK_KMS_LATENCY_MS", default_value = "20")]
    pub latency_ms: u64,

    /// Random extra latency in milliseconds
    #[arg(long, env = "MOCK_KMS_JITTER_MS", default_value = "10")]
    pub jitter_ms: u64,

    /// Zero-based request index from which the mock KMS fails
    #[arg(long, env = "MOCK_KMS_FAIL_AT")]
    pub fail_at: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Harness
    pub total_requests: usize,
    pub n_buckets: usize,
    pub payload: String,

    // KMS client
    pub request_timeout: u64,
    pub provider: ProviderConfig,

    // Output
    pub log_level: String,
    pub json_output: bool,
}

/// Which KMS the harness talks to, with everything needed to reach it
#[derive(Clone, Debug)]
pub enum ProviderConfig {
    Aws(AwsConfig),
    Azure(AzureConfig),
    Mock(MockConfig),
}

#[derive(Clone, Debug)]
pub struct AwsConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub key_id: String,
    pub region: String,
    pub endpoint: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AzureConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub key_vault_endpoint: String,
    pub key_name: String,
    pub identity_endpoint: String,
}

#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    pub port: u16,
    pub latency_ms: u64,
    pub jitter_ms: u64,
    pub fail_at: Option<usize>,
}

impl ProviderConfig {
    /// Short provider name for logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::Aws(_) => "aws",
            ProviderConfig::Azure(_) => "azure",
            ProviderConfig::Mock(_) => "mock",
        }
    }
}

impl std::fmt::Display for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Aws(aws) => write!(f, "aws ({}, key {})", aws.region, aws.key_id),
            ProviderConfig::Azure(azure) => write!(
                f,
                "azure ({}, key {})",
                azure.key_vault_endpoint, azure.key_name
            ),
            ProviderConfig::Mock(mock) => write!(
                f,
                "mock ({}ms +{}ms jitter)",
                mock.latency_ms, mock.jitter_ms
            ),
        }
    }
}

impl AwsConfig {
    /// Credentials accepted by the in-process mock KMS
    pub fn for_mock(endpoint: String) -> Self {
        Self {
            access_key_id: "AKIDMOCKKMS".to_string(),
            secret_access_key: "mock-secret".to_string(),
            session_token: None,
            key_id: "alias/mock-kms".to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some(endpoint),
        }
    }
}

impl Config {
    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args)
    }

    /// Resolve parsed arguments into a configuration, failing on missing credentials
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let provider = match args.provider {
            ProviderArgs::Aws(aws) => ProviderConfig::Aws(AwsConfig {
                access_key_id: required(aws.access_key_id, "AWS_ACCESS_KEY_ID")?,
                secret_access_key: required(aws.secret_access_key, "AWS_SECRET_ACCESS_KEY")?,
                session_token: aws.session_token.filter(|s| !s.is_empty()),
                key_id: required(aws.key_id, "AWS_KEY_ID")?,
                region: aws.region,
                endpoint: aws.endpoint.filter(|s| !s.is_empty()),
            }),
            ProviderArgs::Azure(azure) => ProviderConfig::Azure(AzureConfig {
                tenant_id: required(azure.tenant_id, "AZURE_TENANT_ID")?,
                client_id: required(azure.client_id, "AZURE_CLIENT_ID")?,
                client_secret: required(azure.client_secret, "AZURE_CLIENT_SECRET")?,
                key_vault_endpoint: required(
                    azure.key_vault_endpoint,
                    "AZURE_KEY_VAULT_ENDPOINT",
                )?,
                key_name: required(azure.key_name, "AZURE_KEY_NAME")?,
                identity_endpoint: azure.identity_endpoint,
            }),
            ProviderArgs::Mock(mock) => ProviderConfig::Mock(MockConfig {
                port: mock.port,
                latency_ms: mock.latency_ms,
                jitter_ms: mock.jitter_ms,
                fail_at: mock.fail_at,
            }),
        };

        Ok(Config {
            total_requests: args.requests,
            n_buckets: args.buckets,
            payload: args.payload,
            request_timeout: args.timeout,
            provider,
            log_level: args.log_level,
            json_output: args.json,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.total_requests == 0 {
            return Err(BenchError::Config(
                "BENCH_REQUESTS must be a positive integer".to_string(),
            ));
        }

        if self.n_buckets == 0 {
            return Err(BenchError::Config(
                "BENCH_BUCKETS must be a positive integer".to_string(),
            ));
        }

        if self.request_timeout == 0 {
            return Err(BenchError::Config(
                "KMS_REQUEST_TIMEOUT must be at least one second".to_string(),
            ));
        }

        match &self.provider {
            ProviderConfig::Aws(aws) => {
                if let Some(endpoint) = &aws.endpoint {
                    validate_url(endpoint, "AWS_KMS_ENDPOINT")?;
                }
            }
            ProviderConfig::Azure(azure) => {
                validate_url(&azure.key_vault_endpoint, "AZURE_KEY_VAULT_ENDPOINT")?;
                validate_url(&azure.identity_endpoint, "AZURE_IDENTITY_ENDPOINT")?;
            }
            ProviderConfig::Mock(_) => {}
        }

        Ok(())
    }
}

/// Treat unset and empty values alike
fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BenchError::missing(name))
}

fn validate_url(value: &str, name: &str) -> Result<()> {
    reqwest::Url::parse(value)
        .map(|_| ())
        .map_err(|e| BenchError::Config(format!("{} is not a valid URL ({}): {}", name, e, value)))
}
