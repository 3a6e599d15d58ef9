// KMS latency bench - library root for testing

pub mod config;
pub mod error;
pub mod harness;
pub mod provider;
