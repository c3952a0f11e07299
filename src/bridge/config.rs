//! Configuration resolution for the fleet relay server.
//!
//! Values follow a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided value (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PORT` | 8080 | HTTP listen port |
//! | `BRIDGE_COMMAND_TIMEOUT` | 30s | Command deadline when a request sets none |
//! | `BRIDGE_KEEPALIVE_SECS` | 15s | SSH keepalive interval on relay and target hops |
//! | `BRIDGE_COMPRESSION` | false | Enable zlib compression on relay and target hops |
//! | `BRIDGE_SEED_FILE` | unset | JSON file loaded into the in-memory store at start-up |

use std::env;
use std::time::Duration;

use crate::bridge::error::BridgeError;

/// Default HTTP port
pub(crate) const DEFAULT_PORT: u16 = 8080;

/// Default command deadline in seconds
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Default SSH keepalive interval in seconds
pub(crate) const DEFAULT_KEEPALIVE_SECS: u64 = 15;

/// Total attempts allowed when the target handshake ends in EOF
pub(crate) const MAX_EOF_ATTEMPTS: u32 = 3;

pub(crate) const PORT_ENV_VAR: &str = "PORT";
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "BRIDGE_COMMAND_TIMEOUT";
pub(crate) const KEEPALIVE_ENV_VAR: &str = "BRIDGE_KEEPALIVE_SECS";
pub(crate) const COMPRESSION_ENV_VAR: &str = "BRIDGE_COMPRESSION";
pub(crate) const SEED_FILE_ENV_VAR: &str = "BRIDGE_SEED_FILE";

/// Settings resolved once at start-up and shared with every handler.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub default_timeout: Duration,
    pub keepalive: Duration,
    pub compress: bool,
    pub seed_file: Option<String>,
}

impl Settings {
    /// Resolve every setting from the environment.
    pub fn from_env() -> Self {
        Self {
            port: resolve_port(None),
            default_timeout: Duration::from_secs(resolve_command_timeout(None)),
            keepalive: Duration::from_secs(resolve_keepalive(None)),
            compress: resolve_compression(None),
            seed_file: env::var(SEED_FILE_ENV_VAR).ok().filter(|p| !p.is_empty()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            default_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            keepalive: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            compress: false,
            seed_file: None,
        }
    }
}

/// Resolve the HTTP port with priority: parameter -> env var -> default
pub(crate) fn resolve_port(port_param: Option<u16>) -> u16 {
    if let Some(port) = port_param {
        return port;
    }

    if let Ok(env_port) = env::var(PORT_ENV_VAR)
        && let Ok(port) = env_port.parse::<u16>()
    {
        return port;
    }

    DEFAULT_PORT
}

/// Resolve the command deadline with priority: parameter -> env var -> default
///
/// A zero value from the environment is ignored.
pub(crate) fn resolve_command_timeout(timeout_param: Option<u64>) -> u64 {
    if let Some(timeout) = timeout_param {
        return timeout;
    }

    if let Ok(env_timeout) = env::var(COMMAND_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = env_timeout.parse::<u64>()
        && timeout > 0
    {
        return timeout;
    }

    DEFAULT_COMMAND_TIMEOUT_SECS
}

/// Resolve the keepalive interval with priority: parameter -> env var -> default
pub(crate) fn resolve_keepalive(keepalive_param: Option<u64>) -> u64 {
    if let Some(keepalive) = keepalive_param {
        return keepalive;
    }

    if let Ok(env_keepalive) = env::var(KEEPALIVE_ENV_VAR)
        && let Ok(keepalive) = env_keepalive.parse::<u64>()
        && keepalive > 0
    {
        return keepalive;
    }

    DEFAULT_KEEPALIVE_SECS
}

/// Resolve the compression setting with priority: parameter -> env var -> default (false)
pub(crate) fn resolve_compression(compress_param: Option<bool>) -> bool {
    if let Some(compress) = compress_param {
        return compress;
    }

    if let Ok(env_compress) = env::var(COMPRESSION_ENV_VAR) {
        return env_compress.eq_ignore_ascii_case("true") || env_compress == "1";
    }

    false
}

/// Parse the `timeout` request parameter.
///
/// Blank means "not supplied". Anything else must be a positive integer
/// count of seconds.
pub(crate) fn parse_timeout_param(raw: Option<&str>) -> Result<Option<Duration>, BridgeError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };
    match raw.parse::<i64>() {
        Ok(secs) if secs >= 1 => Ok(Some(Duration::from_secs(secs as u64))),
        _ => Err(BridgeError::InvalidTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Process environment is global; env-touching tests take this lock
    static ENV_LOCK: once_cell::sync::Lazy<Mutex<()>> = once_cell::sync::Lazy::new(|| Mutex::new(()));

    /// Run `check` with `key` set to `value` (or unset for `None`), then
    /// remove `key` again.
    fn with_env<T>(key: &str, value: Option<&str>, check: impl FnOnce() -> T) -> T {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // SAFETY: every test that touches the environment holds ENV_LOCK
        unsafe {
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
        let result = check();
        // SAFETY: as above
        unsafe { env::remove_var(key) };
        result
    }

    mod timeout_param {
        use super::*;

        #[test]
        fn test_absent_or_blank_is_none() {
            for raw in [None, Some(""), Some("   ")] {
                assert!(parse_timeout_param(raw).unwrap().is_none(), "{raw:?}");
            }
        }

        #[test]
        fn test_positive_seconds() {
            assert_eq!(
                parse_timeout_param(Some("5")).unwrap(),
                Some(Duration::from_secs(5))
            );
            assert_eq!(
                parse_timeout_param(Some(" 120 ")).unwrap(),
                Some(Duration::from_secs(120))
            );
        }

        #[test]
        fn test_malformed_values_rejected() {
            for raw in ["abc", "0", "-1", "-30", "1.5", "5s", "1e3"] {
                assert!(
                    matches!(parse_timeout_param(Some(raw)), Err(BridgeError::InvalidTimeout)),
                    "{raw} should be rejected"
                );
            }
        }
    }

    mod command_timeout {
        use super::*;

        #[test]
        fn test_param_wins() {
            let resolved = with_env(COMMAND_TIMEOUT_ENV_VAR, Some("90"), || {
                resolve_command_timeout(Some(60))
            });
            assert_eq!(resolved, 60);
        }

        #[test]
        fn test_env_used_without_param() {
            let resolved = with_env(COMMAND_TIMEOUT_ENV_VAR, Some("90"), || {
                resolve_command_timeout(None)
            });
            assert_eq!(resolved, 90);
        }

        #[test]
        fn test_unusable_env_falls_back_to_default() {
            for value in ["0", "soon", ""] {
                let resolved = with_env(COMMAND_TIMEOUT_ENV_VAR, Some(value), || {
                    resolve_command_timeout(None)
                });
                assert_eq!(resolved, DEFAULT_COMMAND_TIMEOUT_SECS, "{value:?}");
            }
        }
    }

    mod port {
        use super::*;

        #[test]
        fn test_env_port() {
            assert_eq!(with_env(PORT_ENV_VAR, Some("9090"), || resolve_port(None)), 9090);
        }

        #[test]
        fn test_default_port() {
            assert_eq!(with_env(PORT_ENV_VAR, None, || resolve_port(None)), DEFAULT_PORT);
            assert_eq!(
                with_env(PORT_ENV_VAR, Some("http"), || resolve_port(None)),
                DEFAULT_PORT
            );
        }
    }

    mod keepalive {
        use super::*;

        #[test]
        fn test_env_keepalive() {
            assert_eq!(with_env(KEEPALIVE_ENV_VAR, Some("45"), || resolve_keepalive(None)), 45);
            assert_eq!(
                with_env(KEEPALIVE_ENV_VAR, Some("0"), || resolve_keepalive(None)),
                DEFAULT_KEEPALIVE_SECS
            );
        }
    }

    mod compression {
        use super::*;

        #[test]
        fn test_env_values() {
            for (value, expected) in [("true", true), ("TRUE", true), ("1", true), ("no", false)] {
                let resolved = with_env(COMPRESSION_ENV_VAR, Some(value), || resolve_compression(None));
                assert_eq!(resolved, expected, "{value}");
            }
        }

        #[test]
        fn test_off_by_default() {
            assert!(!with_env(COMPRESSION_ENV_VAR, None, || resolve_compression(None)));
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.default_timeout, Duration::from_secs(30));
        assert_eq!(settings.keepalive, Duration::from_secs(15));
        assert!(!settings.compress);
        assert!(settings.seed_file.is_none());
    }
}
