//! Environment-driven configuration for the API binary.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use solburn_core::Address;
use solburn_infra::indexer::HeliusConfig;
use solburn_infra::indexer::helius::DEFAULT_RPC_URL;
use solburn_infra::queue::{BackoffStrategy, QueueConfig, RetryPolicy};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Timeout for calls to the transfer-construction service.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub helius: HeliusConfig,
    /// Transfer-construction service; `None` selects the dry-run adapter.
    pub transfer_endpoint: Option<String>,
    pub transfer_timeout: Duration,
    pub queue: QueueConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let bind_addr: SocketAddr = parse_or(&get, "SOLBURN_BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?;

        let api_key = get("HELIUS_API_KEY");
        if api_key.is_none() {
            tracing::warn!("HELIUS_API_KEY not set; indexer requests are unauthenticated");
        }
        let helius = HeliusConfig {
            rpc_url: get("HELIUS_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            api_key,
            ..HeliusConfig::default()
        };

        let transfer_endpoint = get("SOLBURN_TRANSFER_ENDPOINT");
        if transfer_endpoint.is_none() {
            tracing::warn!(
                "SOLBURN_TRANSFER_ENDPOINT not set; transfers run in dry-run mode"
            );
        }

        let defaults = QueueConfig::default();
        let retry = RetryPolicy {
            max_retries: parse_or(&get, "QUEUE_MAX_RETRIES", Some(defaults.retry.max_retries))?,
            base_delay: millis_or(&get, "QUEUE_RETRY_DELAY_MS", defaults.retry.base_delay)?,
            max_delay: Duration::from_secs(300),
            strategy: parse_or(&get, "QUEUE_RETRY_BACKOFF", Some(BackoffStrategy::Fixed))?,
        };
        let retry = if retry.strategy == BackoffStrategy::Fixed {
            RetryPolicy::fixed(retry.max_retries, retry.base_delay)
        } else {
            retry
        };

        let mut queue = QueueConfig::default()
            .with_processing_delay(millis_or(
                &get,
                "QUEUE_PROCESSING_DELAY_MS",
                defaults.processing_delay,
            )?)
            .with_poll_interval(millis_or(&get, "QUEUE_POLL_INTERVAL_MS", defaults.poll_interval)?)
            .with_batch_concurrency(parse_or(
                &get,
                "QUEUE_BATCH_CONCURRENCY",
                Some(defaults.batch_concurrency),
            )?)
            .with_max_completed_jobs(parse_or(
                &get,
                "QUEUE_MAX_COMPLETED_JOBS",
                Some(defaults.max_completed_jobs),
            )?)
            .with_retry_policy(retry);

        if let Some(raw) = get("SOLBURN_DESTINATION_WALLET") {
            let wallet = Address::parse(&raw).map_err(|e| ConfigError::Invalid {
                var: "SOLBURN_DESTINATION_WALLET",
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            queue = queue.with_default_destination(wallet);
        }

        Ok(Self {
            bind_addr,
            helius,
            transfer_endpoint,
            transfer_timeout: TRANSFER_TIMEOUT,
            queue,
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Option<T>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match (get(var), default) {
        (Some(raw), _) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(ConfigError::Invalid {
            var,
            value: String::new(),
            reason: "missing".to_string(),
        }),
    }
}

fn millis_or(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let ms: u64 = parse_or(get, var, Some(default.as_millis() as u64))?;
    Ok(Duration::from_millis(ms))
}
