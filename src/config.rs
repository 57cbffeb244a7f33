use crate::error::{Error, Result};
use chrono::Duration as ChronoDuration;
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub telegram_bot_token: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` on inbound updates.
    pub telegram_webhook_secret: String,
    pub smtp: Option<SmtpConfig>,
    pub cron_secret: Option<String>,
    pub automation_cron: Option<String>,
    pub outreach_cron: Option<String>,
    pub automation: AutomationSettings,
}

/// Tunables of the automation engine. Handed to services explicitly so they
/// never reach for global configuration.
#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub job_batch_size: i64,
    pub outreach_batch_size: i64,
    pub send_delay: Duration,
    pub job_max_retries: i32,
    pub job_retry_backoff: ChronoDuration,
    pub external_call_timeout: Duration,
    pub test_task_days: i64,
    pub deadline_hour_utc: u32,
    pub outreach_review_delay: ChronoDuration,
    pub rejection_delay: ChronoDuration,
    pub max_extensions: i32,
    pub max_extension_days: i64,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            job_batch_size: 10,
            outreach_batch_size: 10,
            send_delay: Duration::from_millis(500),
            job_max_retries: 3,
            job_retry_backoff: ChronoDuration::seconds(300),
            external_call_timeout: Duration::from_secs(60),
            test_task_days: 3,
            deadline_hour_utc: 18,
            outreach_review_delay: ChronoDuration::minutes(60),
            rejection_delay: ChronoDuration::hours(24),
            max_extensions: 2,
            max_extension_days: 7,
        }
    }
}

impl AutomationSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let deadline_hour_utc: u32 = get_env_or("DEADLINE_HOUR_UTC", defaults.deadline_hour_utc)?;
        if deadline_hour_utc > 23 {
            return Err(Error::Config(format!(
                "Invalid value for DEADLINE_HOUR_UTC: {}",
                deadline_hour_utc
            )));
        }

        Ok(Self {
            job_batch_size: get_env_or("JOB_BATCH_SIZE", defaults.job_batch_size)?,
            outreach_batch_size: get_env_or("OUTREACH_BATCH_SIZE", defaults.outreach_batch_size)?,
            send_delay: Duration::from_millis(get_env_or("SEND_DELAY_MS", 500u64)?),
            job_max_retries: get_env_or("JOB_MAX_RETRIES", defaults.job_max_retries)?,
            job_retry_backoff: ChronoDuration::seconds(get_env_or("JOB_RETRY_BACKOFF_SECS", 300i64)?),
            external_call_timeout: Duration::from_secs(get_env_or(
                "EXTERNAL_CALL_TIMEOUT_SECS",
                60u64,
            )?),
            test_task_days: get_env_or("TEST_TASK_DAYS", defaults.test_task_days)?,
            deadline_hour_utc,
            outreach_review_delay: ChronoDuration::minutes(get_env_or(
                "OUTREACH_REVIEW_MINUTES",
                60i64,
            )?),
            rejection_delay: ChronoDuration::hours(get_env_or("REJECTION_DELAY_HOURS", 24i64)?),
            max_extensions: get_env_or("MAX_EXTENSIONS", defaults.max_extensions)?,
            max_extension_days: get_env_or("MAX_EXTENSION_DAYS", defaults.max_extension_days)?,
        })
    }
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let smtp = match env::var("SMTP_HOST").ok().filter(|h| !h.is_empty()) {
            Some(host) => Some(SmtpConfig {
                host,
                port: get_env_or("SMTP_PORT", 587u16)?,
                username: env::var("SMTP_USERNAME").ok(),
                password: env::var("SMTP_PASSWORD").ok(),
                from: get_env("SMTP_FROM")?,
            }),
            None => None,
        };

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            openai_api_key: get_env("OPENAI_API_KEY")?,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            telegram_bot_token: get_env("TELEGRAM_BOT_TOKEN")?,
            telegram_webhook_secret: get_env("TELEGRAM_WEBHOOK_SECRET")?,
            smtp,
            cron_secret: env::var("CRON_SECRET").ok().filter(|s| !s.is_empty()),
            automation_cron: env::var("AUTOMATION_CRON").ok().filter(|s| !s.is_empty()),
            outreach_cron: env::var("OUTREACH_CRON").ok().filter(|s| !s.is_empty()),
            automation: AutomationSettings::from_env()?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<&'static Config> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_read_overrides_and_reject_bad_hour() {
        env::set_var("MAX_EXTENSIONS", "4");
        env::set_var("REJECTION_DELAY_HOURS", "12");
        let settings = AutomationSettings::from_env().unwrap();
        assert_eq!(settings.max_extensions, 4);
        assert_eq!(settings.rejection_delay, ChronoDuration::hours(12));
        assert_eq!(settings.max_extension_days, 7);

        env::set_var("DEADLINE_HOUR_UTC", "25");
        assert!(matches!(AutomationSettings::from_env(), Err(Error::Config(_))));

        env::set_var("DEADLINE_HOUR_UTC", "soon");
        assert!(matches!(AutomationSettings::from_env(), Err(Error::Config(_))));

        for name in ["MAX_EXTENSIONS", "REJECTION_DELAY_HOURS", "DEADLINE_HOUR_UTC"] {
            env::remove_var(name);
        }
    }
}
