use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub actor_buffer: usize,
    pub cache_ttl: Duration,
    pub reservation_attempts: u32,
    pub aggregator_flush_interval: Duration,
    /// Also the staleness bound between the cache and the durable store.
    pub reconcile_interval: Duration,
    pub payment_poll_interval: Duration,
    pub event_redeliveries: u32,
    pub legacy_max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            actor_buffer: 100,
            cache_ttl: Duration::from_secs(30 * 60),
            reservation_attempts: 3,
            aggregator_flush_interval: Duration::from_millis(5_000),
            reconcile_interval: Duration::from_millis(60_000),
            payment_poll_interval: Duration::from_millis(3_000),
            event_redeliveries: 3,
            legacy_max_retries: 3,
        }
    }
}

impl Config {
    /// Reads `CHECKOUT_*` variables, loading a `.env` file first if present.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            actor_buffer: parse_or(&lookup, "CHECKOUT_ACTOR_BUFFER", defaults.actor_buffer),
            cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "CHECKOUT_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )),
            reservation_attempts: parse_or(&lookup, "CHECKOUT_RESERVATION_ATTEMPTS", defaults.reservation_attempts),
            aggregator_flush_interval: millis_or(&lookup, "CHECKOUT_AGGREGATOR_FLUSH_MS", defaults.aggregator_flush_interval),
            reconcile_interval: millis_or(&lookup, "CHECKOUT_RECONCILE_MS", defaults.reconcile_interval),
            payment_poll_interval: millis_or(&lookup, "CHECKOUT_PAYMENT_POLL_MS", defaults.payment_poll_interval),
            event_redeliveries: parse_or(&lookup, "CHECKOUT_EVENT_REDELIVERIES", defaults.event_redeliveries),
            legacy_max_retries: parse_or(&lookup, "CHECKOUT_LEGACY_MAX_RETRIES", defaults.legacy_max_retries),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            warn!(key, value = %raw, "Invalid setting, using default");
            default
        }
    }
}

fn millis_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    Duration::from_millis(parse_or(lookup, key, default.as_millis() as u64))
}
