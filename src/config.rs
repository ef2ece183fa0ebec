//! Environment-driven configuration, read once at startup.
//!
//! Mirrors the teacher's `LlmConfig::from_env` / `PHOENIX_DB_PATH` pattern:
//! every knob has a literal default matching the concurrency & resource
//! model, overridable by an env var of the same name uppercased.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,

    pub session_idle_timeout: Duration,
    pub heartbeat_timeout: Duration,
    pub live_stream_timeout: Duration,
    pub sweep_interval: Duration,
    pub command_timeout: Duration,
    pub screenshot_timeout: Duration,
    pub screenshot_retry_timeout: Duration,
    pub safety_check_timeout: Duration,
    pub script_eval_timeout: Duration,

    pub fingerprint_limit_per_tenant: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            session_idle_timeout: Duration::from_secs(1800),
            heartbeat_timeout: Duration::from_secs(60),
            live_stream_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(300),
            command_timeout: Duration::from_secs(30),
            screenshot_timeout: Duration::from_secs(60),
            screenshot_retry_timeout: Duration::from_secs(10),
            safety_check_timeout: Duration::from_secs(5),
            script_eval_timeout: Duration::from_secs(30),
            fingerprint_limit_per_tenant: 50,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            bind_addr: std::env::var("ORCH_BIND_ADDR").unwrap_or(default.bind_addr),
            port: env_u16("ORCH_PORT", default.port),
            session_idle_timeout: env_secs("ORCH_SESSION_IDLE_TIMEOUT", default.session_idle_timeout),
            heartbeat_timeout: env_secs("ORCH_HEARTBEAT_TIMEOUT", default.heartbeat_timeout),
            live_stream_timeout: env_secs("ORCH_LIVE_STREAM_TIMEOUT", default.live_stream_timeout),
            sweep_interval: env_secs("ORCH_SWEEP_INTERVAL", default.sweep_interval),
            command_timeout: env_secs("ORCH_COMMAND_TIMEOUT", default.command_timeout),
            screenshot_timeout: env_secs("ORCH_SCREENSHOT_TIMEOUT", default.screenshot_timeout),
            screenshot_retry_timeout: env_secs(
                "ORCH_SCREENSHOT_RETRY_TIMEOUT",
                default.screenshot_retry_timeout,
            ),
            safety_check_timeout: env_secs("ORCH_SAFETY_CHECK_TIMEOUT", default.safety_check_timeout),
            script_eval_timeout: env_secs("ORCH_SCRIPT_EVAL_TIMEOUT", default.script_eval_timeout),
            fingerprint_limit_per_tenant: std::env::var("ORCH_FINGERPRINT_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.fingerprint_limit_per_tenant),
        }
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_concurrency_model() {
        let c = Config::default();
        assert_eq!(c.session_idle_timeout, Duration::from_secs(1800));
        assert_eq!(c.heartbeat_timeout, Duration::from_secs(60));
        assert_eq!(c.sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn env_override_parses() {
        std::env::set_var("ORCH_PORT_TEST_UNUSED", "x");
        assert_eq!(env_u16("ORCH_PORT_TEST_UNUSED", 8080), 8080);
        std::env::set_var("ORCH_PORT_TEST_UNUSED2", "9090");
        assert_eq!(env_u16("ORCH_PORT_TEST_UNUSED2", 8080), 9090);
    }
}
