use {
    crate::{
        adapters::{mangofy::MangofyConfig, utmify::UtmifyConfig},
        domain::money::FeePolicy,
        services::sweep::SweepConfig,
    },
    chrono::TimeDelta,
    std::{env, str::FromStr, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// How often, and for how long, a client keeps polling a charge.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    pub http_timeout: Duration,
    pub webhook_secret: String,
    pub mangofy: MangofyConfig,
    pub utmify: UtmifyConfig,
    pub poll: PollPolicy,
    pub sweep: SweepConfig,
}

impl Config {
    /// Read `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any name-to-value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let fee_bps: u32 = vars.parse_or("ATTRIBUTION_GATEWAY_FEE_BPS", 0)?;
        let fee_policy = FeePolicy::from_basis_points(fee_bps).map_err(|e| {
            ConfigError::Invalid {
                name: "ATTRIBUTION_GATEWAY_FEE_BPS",
                reason: e.to_string(),
            }
        })?;

        let batch_size: u32 = vars.parse_or("SWEEP_BATCH_SIZE", 50)?;
        if batch_size == 0 {
            return Err(invalid("SWEEP_BATCH_SIZE", "must be positive"));
        }

        let sweep_interval = vars.secs("SWEEP_INTERVAL_SECS", 300)?;
        if sweep_interval.is_zero() {
            return Err(invalid("SWEEP_INTERVAL_SECS", "must be positive"));
        }

        let stale_after = vars.time_delta_secs("SWEEP_STALE_AFTER_SECS", 3600)?;
        let max_age = vars.time_delta_secs("SWEEP_MAX_AGE_SECS", 172_800)?;
        if max_age <= stale_after {
            return Err(invalid(
                "SWEEP_MAX_AGE_SECS",
                "must exceed SWEEP_STALE_AFTER_SECS",
            ));
        }

        let retention_days: u32 = vars.parse_or("RETENTION_DAYS", 30)?;
        if retention_days == 0 {
            return Err(invalid("RETENTION_DAYS", "must be at least 1"));
        }
        let retention = TimeDelta::try_days(i64::from(retention_days))
            .ok_or_else(|| invalid("RETENTION_DAYS", "out of range"))?;

        Ok(Self {
            database_url: vars.required("DATABASE_URL")?,
            listen_addr: vars.optional("LISTEN_ADDR", "0.0.0.0:3000"),
            http_timeout: vars.secs("HTTP_TIMEOUT_SECS", 15)?,
            webhook_secret: vars.required("MANGOFY_WEBHOOK_SECRET")?,
            mangofy: MangofyConfig {
                api_url: vars
                    .optional("MANGOFY_API_URL", "https://checkout.mangofy.com.br/api/v1")
                    .trim_end_matches('/')
                    .to_string(),
                api_key: vars.required("MANGOFY_API_KEY")?,
                store_code: vars.required("MANGOFY_STORE_CODE")?,
                postback_url: vars.required("MANGOFY_POSTBACK_URL")?,
                pix_expires_in_days: vars.parse_or("PIX_EXPIRES_IN_DAYS", 1)?,
                charge_ttl: vars.time_delta_secs("CHARGE_TTL_SECS", 1800)?,
            },
            utmify: UtmifyConfig {
                api_url: vars.optional(
                    "UTMIFY_API_URL",
                    "https://api.utmify.com.br/api-credentials/orders",
                ),
                api_token: vars.required("UTMIFY_API_TOKEN")?,
                platform: vars.optional("ATTRIBUTION_PLATFORM", "Mangofy"),
                fee_policy,
            },
            poll: PollPolicy {
                interval: vars.secs("POLL_INTERVAL_SECS", 5)?,
                max_elapsed: vars.secs("POLL_MAX_ELAPSED_SECS", 1800)?,
            },
            sweep: SweepConfig {
                interval: sweep_interval,
                stale_after,
                max_age,
                batch_size: i64::from(batch_size),
                retention,
            },
        })
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn optional(&self, name: &'static str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn secs(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse_or(name, default).map(Duration::from_secs)
    }

    /// Non-negative seconds that fit a `TimeDelta`.
    fn time_delta_secs(&self, name: &'static str, default: u64) -> Result<TimeDelta, ConfigError> {
        let secs: u64 = self.parse_or(name, default)?;
        i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| invalid(name, "out of range"))
    }
}
