use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::{net::SocketAddr, time::Duration};
use thiserror::Error;

use crate::gateway::{DEFAULT_API_VERSION, DispatchMode, ProxyOptions};

pub const DEFAULT_GROUP: &str = "default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.server.port == 0 {
            return invalid("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return invalid("server.body_limit_bytes must be > 0".into());
        }

        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return invalid(format!("logging.level must be one of {valid_levels:?}"));
        }

        if self.gateway.version.trim().is_empty() {
            return invalid("gateway.version must not be empty".into());
        }
        if self.gateway.request_timeout_ms == Some(0) {
            return invalid("gateway.request_timeout_ms must be > 0 when set".into());
        }

        let mut names = HashSet::new();
        for service in &self.gateway.services {
            if service.name.trim().is_empty() {
                return invalid("gateway.services[].name must not be empty".into());
            }
            if !names.insert(service.name.as_str()) {
                return invalid(format!("duplicate service name '{}'", service.name));
            }
            match url::Url::parse(&service.url) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                Ok(u) => {
                    return invalid(format!(
                        "service '{}' url must be http or https, got '{}'",
                        service.name,
                        u.scheme()
                    ));
                }
                Err(e) => {
                    return invalid(format!("service '{}' url is invalid: {e}", service.name));
                }
            }
        }

        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.gateway.request_timeout_ms.map(Duration::from_millis)
    }

    /// Options shared by every configured proxy.
    pub fn proxy_options(&self) -> ProxyOptions {
        let options = ProxyOptions::default().with_dispatch_mode(self.gateway.dispatch_mode);
        match self.request_timeout() {
            Some(timeout) => options.with_request_timeout(timeout),
            None => options,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Version reported by the serving layer.
    #[serde(default = "default_api_version")]
    pub version: String,
    #[serde(default)]
    pub dispatch_mode: DispatchMode,
    /// Per-call deadline for upstream requests. Unset means no deadline.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: default_api_version(),
            dispatch_mode: DispatchMode::default(),
            request_timeout_ms: None,
            services: Vec::new(),
        }
    }
}

/// One backend service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Base URL; the schema is fetched from `{url}/schema`.
    pub url: String,
    /// Route namespace; defaults to the service name.
    #[serde(default)]
    pub route_prefix: Option<String>,
    /// Services sharing a group are aggregated into one proxy API.
    #[serde(default = "default_group")]
    pub group: String,
}

fn default_group() -> String {
    DEFAULT_GROUP.into()
}

pub mod loader {
    use super::{AppConfig, ConfigError};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "gantry.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            tracing::warn!(path = %pathbuf.display(), "Config file not found; using defaults");
        }
        // Environment variable overrides, e.g., GANTRY__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("GANTRY")
                .try_parsing(true)
                .separator("__"),
        );
        let merged: AppConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, url: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.into(),
            url: url.into(),
            route_prefix: None,
            group: default_group(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.gateway.version, "1.0.0");
        assert_eq!(cfg.gateway.dispatch_mode, DispatchMode::Protocol);
        assert!(cfg.request_timeout().is_none());
    }

    #[test]
    fn test_rejects_duplicate_service_names() {
        let mut cfg = AppConfig::default();
        cfg.gateway.services = vec![
            service("users", "http://localhost:3001"),
            service("users", "http://localhost:3002"),
        ];
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_non_http_service_url() {
        let mut cfg = AppConfig::default();
        cfg.gateway.services = vec![service("users", "ws://localhost:3001")];
        assert!(cfg.validate().is_err());

        cfg.gateway.services = vec![service("users", "not a url")];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_proxy_options_from_gateway() {
        let mut cfg = AppConfig::default();
        cfg.gateway.dispatch_mode = DispatchMode::Invoke;
        cfg.gateway.request_timeout_ms = Some(2500);

        let options = cfg.proxy_options();
        assert_eq!(options.dispatch_mode, DispatchMode::Invoke);
        assert_eq!(options.request_timeout, Some(Duration::from_millis(2500)));
    }
}
