use serde::Deserialize;

use crate::admission::AdmissionConfig;
use crate::broker::{DEFAULT_FANOUT_CHUNK, DEFAULT_MAILBOX_CAPACITY, EngineConfig};

/// Top-level configuration settings for the application.
///
/// Includes settings for the broadcast engine, its admission gate and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub admission: AdmissionSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the broadcast engine.
///
/// `mailbox_capacity` bounds every subscriber's queue; `fanout_chunk` is the
/// number of mailboxes served by one delivery task.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub mailbox_capacity: usize,
    pub fanout_chunk: usize,
}

/// Publisher rate limiting. Disabled unless `enabled` is set.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AdmissionSettings {
    pub enabled: bool,
    pub rate_per_sec: f64,
    pub burst: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub admission: Option<PartialAdmissionSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub mailbox_capacity: Option<usize>,
    pub fanout_chunk: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialAdmissionSettings {
    pub enabled: Option<bool>,
    pub rate_per_sec: Option<f64>,
    pub burst: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
                fanout_chunk: DEFAULT_FANOUT_CHUNK,
            },
            admission: AdmissionSettings {
                enabled: false,
                rate_per_sec: 5.0,
                burst: 10,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fill every field missing from `partial` with the default.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let broker = partial.broker.as_ref();
        let admission = partial.admission.as_ref();
        let logging = partial.logging.as_ref();

        Settings {
            broker: BrokerSettings {
                mailbox_capacity: broker
                    .and_then(|b| b.mailbox_capacity)
                    .unwrap_or(default.broker.mailbox_capacity),
                fanout_chunk: broker
                    .and_then(|b| b.fanout_chunk)
                    .unwrap_or(default.broker.fanout_chunk),
            },
            admission: AdmissionSettings {
                enabled: admission
                    .and_then(|a| a.enabled)
                    .unwrap_or(default.admission.enabled),
                rate_per_sec: admission
                    .and_then(|a| a.rate_per_sec)
                    .unwrap_or(default.admission.rate_per_sec),
                burst: admission
                    .and_then(|a| a.burst)
                    .unwrap_or(default.admission.burst),
            },
            logging: LoggingSettings {
                level: logging
                    .and_then(|l| l.level.clone())
                    .unwrap_or(default.logging.level),
            },
        }
    }

    pub fn admission_config(&self) -> Option<AdmissionConfig> {
        self.admission
            .enabled
            .then(|| AdmissionConfig::new(self.admission.rate_per_sec, self.admission.burst))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            mailbox_capacity: self.broker.mailbox_capacity,
            fanout_chunk: self.broker.fanout_chunk,
            admission: self.admission_config(),
        }
    }
}
