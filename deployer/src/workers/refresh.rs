//! Recurring health refresh timer

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

/// Allowed auto-refresh intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshInterval {
    TenSeconds,
    ThirtySeconds,
    OneMinute,
    FiveMinutes,
}

impl RefreshInterval {
    pub fn as_duration(&self) -> Duration {
        match self {
            RefreshInterval::TenSeconds => Duration::from_secs(10),
            RefreshInterval::ThirtySeconds => Duration::from_secs(30),
            RefreshInterval::OneMinute => Duration::from_secs(60),
            RefreshInterval::FiveMinutes => Duration::from_secs(300),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshInterval::TenSeconds => "10s",
            RefreshInterval::ThirtySeconds => "30s",
            RefreshInterval::OneMinute => "1m",
            RefreshInterval::FiveMinutes => "5m",
        }
    }
}

impl fmt::Display for RefreshInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "10s" | "10" => Ok(RefreshInterval::TenSeconds),
            "30s" | "30" => Ok(RefreshInterval::ThirtySeconds),
            "1m" | "1min" | "60s" | "60" => Ok(RefreshInterval::OneMinute),
            "5m" | "5min" | "300s" | "300" => Ok(RefreshInterval::FiveMinutes),
            _ => Err(format!(
                "Invalid refresh interval '{}', expected one of 10s, 30s, 1m, 5m",
                s
            )),
        }
    }
}

impl Serialize for RefreshInterval {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RefreshInterval {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Refresh worker options
#[derive(Debug, Clone)]
pub struct Options {
    pub interval: RefreshInterval,
}

/// Call `trigger` every interval until shutdown, or until `trigger` returns
/// false. Stopping only prevents the next trigger.
pub async fn run<T, S, F>(
    options: &Options,
    trigger: T,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    T: Fn() -> bool,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Auto-refresh every {} starting...", options.interval);

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Auto-refresh shutting down...");
                return;
            }
            _ = sleep_fn(options.interval.as_duration()) => {}
        }

        debug!("Auto-refresh tick");
        if !trigger() {
            info!("Auto-refresh target is gone, stopping");
            return;
        }
    }
}
