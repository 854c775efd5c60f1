use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::http_client::{HttpSettings, ProxyConfig};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TlsBackend {
    #[default]
    Rustls,
    NativeTls,
}

/// aws-grok application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Client name sent when registering the public OIDC client
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Region used for STS when the profile does not name one
    #[serde(default = "default_region")]
    pub default_region: String,

    #[serde(default)]
    pub tls_backend: TlsBackend,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// HTTP proxy URL (optional)
    /// Supported formats: http://host:port, https://host:port, socks5://host:port
    #[serde(default)]
    pub proxy_url: Option<String>,

    #[serde(default)]
    pub proxy_username: Option<String>,

    #[serde(default)]
    pub proxy_password: Option<String>,

    /// Try to open the verification URL in a browser
    #[serde(default = "default_true")]
    pub open_browser: bool,

    /// Call STS GetCallerIdentity after login
    #[serde(default = "default_true")]
    pub verify: bool,

    /// AWS CLI config file, defaults to ~/.aws/config
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_config_path: Option<PathBuf>,

    /// AWS shared credentials file, defaults to ~/.aws/credentials
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_credentials_path: Option<PathBuf>,

    /// Override for https://oidc.{region}.amazonaws.com
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc_endpoint: Option<String>,

    /// Override for https://portal.sso.{region}.amazonaws.com
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_endpoint: Option<String>,

    /// Override for https://sts.{region}.amazonaws.com
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sts_endpoint: Option<String>,
}

fn default_client_name() -> String {
    "aws-grok".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            default_region: default_region(),
            tls_backend: TlsBackend::default(),
            http_timeout_secs: default_http_timeout_secs(),
            proxy_url: None,
            proxy_username: None,
            proxy_password: None,
            open_browser: true,
            verify: true,
            aws_config_path: None,
            aws_credentials_path: None,
            oidc_endpoint: None,
            portal_endpoint: None,
            sts_endpoint: None,
        }
    }
}

impl Config {
    /// Get default config file path
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// Load configuration from file
    ///
    /// A missing file yields the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Build proxy configuration, if a proxy URL is set
    pub fn proxy(&self) -> Option<ProxyConfig> {
        self.proxy_url.as_ref().map(|url| {
            let mut proxy = ProxyConfig::new(url);
            if let (Some(username), Some(password)) = (&self.proxy_username, &self.proxy_password) {
                proxy = proxy.with_auth(username, password);
            }
            proxy
        })
    }

    /// HTTP settings for one login attempt
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            proxy: self.proxy(),
            timeout_secs: self.http_timeout_secs,
            tls_backend: self.tls_backend,
            user_agent: format!("{}/{}", self.client_name, env!("CARGO_PKG_VERSION")),
        }
    }

    /// Resolve the AWS CLI config file path
    pub fn aws_config_path(&self) -> PathBuf {
        self.aws_config_path
            .clone()
            .unwrap_or_else(|| aws_dir().join("config"))
    }

    /// Resolve the AWS shared credentials file path
    pub fn aws_credentials_path(&self) -> PathBuf {
        self.aws_credentials_path
            .clone()
            .unwrap_or_else(|| aws_dir().join("credentials"))
    }
}

fn aws_dir() -> PathBuf {
    home::home_dir().unwrap_or_default().join(".aws")
}
