use std::env;
use std::str::FromStr;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Read an env var, falling back to `default` when unset.
pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an env var, treating unset and empty as absent.
pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read and parse an env var, falling back to `default` when unset.
/// A set but unparsable value is logged and ignored.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env_opt(key) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring unparsable env var {}={:?}", key, raw);
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_when_unset() {
        env::remove_var("SPINDLE_TEST_ENV_OR");
        assert_eq!(env_or("SPINDLE_TEST_ENV_OR", "fallback"), "fallback");

        env::set_var("SPINDLE_TEST_ENV_OR", "set");
        assert_eq!(env_or("SPINDLE_TEST_ENV_OR", "fallback"), "set");
        env::remove_var("SPINDLE_TEST_ENV_OR");
    }

    #[test]
    fn env_opt_treats_empty_as_absent() {
        env::set_var("SPINDLE_TEST_ENV_OPT", "");
        assert_eq!(env_opt("SPINDLE_TEST_ENV_OPT"), None);

        env::set_var("SPINDLE_TEST_ENV_OPT", "value");
        assert_eq!(env_opt("SPINDLE_TEST_ENV_OPT"), Some("value".to_string()));
        env::remove_var("SPINDLE_TEST_ENV_OPT");
    }

    #[test]
    fn env_parse_ignores_garbage() {
        env::set_var("SPINDLE_TEST_ENV_PARSE", "12");
        assert_eq!(env_parse("SPINDLE_TEST_ENV_PARSE", 0usize), 12);

        env::set_var("SPINDLE_TEST_ENV_PARSE", "twelve");
        assert_eq!(env_parse("SPINDLE_TEST_ENV_PARSE", 7usize), 7);

        env::remove_var("SPINDLE_TEST_ENV_PARSE");
        assert_eq!(env_parse("SPINDLE_TEST_ENV_PARSE", 3usize), 3);
    }
}
