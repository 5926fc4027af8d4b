use std::time::Duration;
use tracing::warn;

pub struct Config {
    pub port: u16,
    pub secret_key: String,
    pub access_token_ttl: Duration,
    pub auth_required: bool,
    pub app_user: String,
    pub app_pass: String,
    pub upstream_base_url: String,
    pub upstream_api_key: Option<String>,
    pub upstream_timeout: Duration,
    pub cors_allow: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            secret_key: "change-this-in-prod".to_string(),
            access_token_ttl: Duration::from_secs(7 * 24 * 3600),
            auth_required: false,
            app_user: "admin".to_string(),
            app_pass: "admin123".to_string(),
            upstream_base_url: "http://localhost:9000".to_string(),
            upstream_api_key: None,
            upstream_timeout: Duration::from_secs(30),
            cors_allow: vec!["*".to_string()],
        }
    }
}

fn parse_or_default<T: std::str::FromStr>(raw: Option<String>, name: &str, default: T) -> T {
    match raw {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("Ignoring malformed {}={:?}, using default", name, raw);
                default
            }
        },
        None => default,
    }
}

fn parse_flag(raw: Option<String>, default: bool) -> bool {
    raw.map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_origins(raw: Option<String>) -> Vec<String> {
    raw.unwrap_or_else(|| "*".into())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Reads settings from the process environment; call `dotenvy::dotenv()` first to
    /// pick up `.env`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Unset variables keep their defaults.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let port = parse_or_default(var("SERVER_PORT"), "SERVER_PORT", defaults.port);
        let secret_key = var("SECRET_KEY").unwrap_or(defaults.secret_key);
        let ttl_secs = parse_or_default(
            var("ACCESS_TOKEN_EXPIRE_SECONDS"),
            "ACCESS_TOKEN_EXPIRE_SECONDS",
            defaults.access_token_ttl.as_secs(),
        );
        let auth_required = parse_flag(var("AUTH_REQUIRED"), defaults.auth_required);
        let app_user = var("APP_USER").unwrap_or(defaults.app_user);
        let app_pass = var("APP_PASS").unwrap_or(defaults.app_pass);
        let upstream_base_url = var("UPSTREAM_BASE_URL").unwrap_or(defaults.upstream_base_url);
        let upstream_api_key = var("UPSTREAM_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let timeout_secs = parse_or_default(
            var("UPSTREAM_TIMEOUT_SECS"),
            "UPSTREAM_TIMEOUT_SECS",
            defaults.upstream_timeout.as_secs(),
        );
        let cors_allow = parse_origins(var("CORS_ALLOW_ORIGINS"));

        if secret_key == "change-this-in-prod" && auth_required {
            warn!("AUTH_REQUIRED is on but SECRET_KEY is the built-in default");
        }

        Self {
            port,
            secret_key,
            access_token_ttl: Duration::from_secs(ttl_secs),
            auth_required,
            app_user,
            app_pass,
            upstream_base_url,
            upstream_api_key,
            upstream_timeout: Duration::from_secs(timeout_secs),
            cors_allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn unset_variables_use_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.access_token_ttl, Duration::from_secs(604800));
        assert!(!config.auth_required);
        assert_eq!(config.app_user, "admin");
        assert!(config.upstream_api_key.is_none());
        assert_eq!(config.cors_allow, vec!["*"]);
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("ACCESS_TOKEN_EXPIRE_SECONDS", "one week"),
            ("SERVER_PORT", "99999"),
            ("UPSTREAM_TIMEOUT_SECS", " 5 "),
        ]);
        assert_eq!(config.access_token_ttl, Duration::from_secs(604800));
        assert_eq!(config.port, 8000);
        assert_eq!(config.upstream_timeout, Duration::from_secs(5));
    }

    #[test]
    fn auth_required_is_case_insensitive() {
        assert!(config_from(&[("AUTH_REQUIRED", " TRUE ")]).auth_required);
        assert!(config_from(&[("AUTH_REQUIRED", "True")]).auth_required);
        assert!(!config_from(&[("AUTH_REQUIRED", "yes")]).auth_required);
        assert!(!config_from(&[("AUTH_REQUIRED", "false")]).auth_required);
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = config_from(&[(
            "CORS_ALLOW_ORIGINS",
            "http://localhost:3000, https://app.example.com,,",
        )]);
        assert_eq!(
            config.cors_allow,
            vec!["http://localhost:3000", "https://app.example.com"]
        );
    }

    #[test]
    fn blank_upstream_key_is_treated_as_unset() {
        assert!(config_from(&[("UPSTREAM_API_KEY", "  ")]).upstream_api_key.is_none());
        assert_eq!(
            config_from(&[("UPSTREAM_API_KEY", "k1")]).upstream_api_key.as_deref(),
            Some("k1")
        );
    }
}
