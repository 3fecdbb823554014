use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub static_dir: String,
    pub event_buffer_size: usize,
    pub completion_queue_size: usize,
    /// Refuse a second accepted negotiation on the same order.
    pub exclusive_acceptance: bool,
    /// Refuse consecutive proposals from the same party in one thread.
    pub alternate_turns: bool,
    pub require_carrier_kyc: bool,
    pub kyc_min_confidence: f64,
    pub loyalty_points_divisor: u64,
    pub gps_heartbeat_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            static_dir: "static".to_string(),
            event_buffer_size: 1024,
            completion_queue_size: 1024,
            exclusive_acceptance: true,
            alternate_turns: true,
            require_carrier_kyc: false,
            kyc_min_confidence: 0.8,
            loyalty_points_divisor: 1000,
            gps_heartbeat_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            static_dir: env::var("STATIC_DIR").unwrap_or(defaults.static_dir),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            completion_queue_size: parse_or_default(
                "COMPLETION_QUEUE_SIZE",
                defaults.completion_queue_size,
            )?,
            exclusive_acceptance: parse_or_default(
                "EXCLUSIVE_ACCEPTANCE",
                defaults.exclusive_acceptance,
            )?,
            alternate_turns: parse_or_default("ALTERNATE_TURNS", defaults.alternate_turns)?,
            require_carrier_kyc: parse_or_default(
                "REQUIRE_CARRIER_KYC",
                defaults.require_carrier_kyc,
            )?,
            kyc_min_confidence: parse_or_default("KYC_MIN_CONFIDENCE", defaults.kyc_min_confidence)?,
            loyalty_points_divisor: parse_or_default(
                "LOYALTY_POINTS_DIVISOR",
                defaults.loyalty_points_divisor,
            )?,
            gps_heartbeat_secs: parse_or_default("GPS_HEARTBEAT_SECS", defaults.gps_heartbeat_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.event_buffer_size == 0 || self.completion_queue_size == 0 {
            return Err(AppError::Internal("channel sizes must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.kyc_min_confidence) {
            return Err(AppError::Internal(
                "KYC_MIN_CONFIDENCE must be within [0, 1]".to_string(),
            ));
        }
        if self.loyalty_points_divisor == 0 {
            return Err(AppError::Internal(
                "LOYALTY_POINTS_DIVISOR must be > 0".to_string(),
            ));
        }
        if self.gps_heartbeat_secs == 0 {
            return Err(AppError::Internal("GPS_HEARTBEAT_SECS must be > 0".to_string()));
        }
        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_pass_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_divisor_is_rejected() {
        let config = Config {
            loyalty_points_divisor: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn confidence_outside_unit_interval_is_rejected() {
        let config = Config {
            kyc_min_confidence: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
