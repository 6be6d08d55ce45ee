//! Environment Configuration Helpers
//!
//! Every knob of the gateway is an environment variable with a default.
//! A malformed value is logged and replaced by the default rather than
//! aborting startup.

use std::str::FromStr;
use std::time::Duration;

/// Read `key` and parse it, falling back to `default` when unset or malformed.
pub fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    parse_or(key, std::env::var(key).ok().as_deref(), default)
}

/// Seconds-valued variable as a [`Duration`]
pub fn env_secs_or(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_or(key, default_secs))
}

/// Boolean variable accepting `true/false/1/0/yes/no`
pub fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref().map(str::trim) {
        None | Some("") => default,
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("yes") => {
            true
        }
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" || v.eq_ignore_ascii_case("no") => {
            false
        }
        Some(v) => {
            tracing::warn!(key, value = v, "Unrecognized boolean, using default");
            default
        }
    }
}

/// Non-empty string variable
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(key: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr,
{
    match raw.map(str::trim) {
        None | Some("") => default,
        Some(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(key, value, "Malformed configuration value, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_uses_value() {
        assert_eq!(parse_or("X", Some(" 42 "), 7u32), 42);
    }

    #[test]
    fn test_parse_or_falls_back() {
        assert_eq!(parse_or("X", None, 7u32), 7);
        assert_eq!(parse_or("X", Some(""), 7u32), 7);
        assert_eq!(parse_or("X", Some("lots"), 7u32), 7);
    }

    #[test]
    fn test_unset_variables_use_defaults() {
        assert_eq!(env_or("GATEWAY_TEST_SURELY_UNSET_VAR", 3u8), 3);
        assert!(env_flag("GATEWAY_TEST_SURELY_UNSET_FLAG", true));
        assert_eq!(env_string("GATEWAY_TEST_SURELY_UNSET_STR"), None);
        assert_eq!(
            env_secs_or("GATEWAY_TEST_SURELY_UNSET_SECS", 90),
            Duration::from_secs(90)
        );
    }
}
