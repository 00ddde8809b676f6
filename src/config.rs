//! Driver configuration

use crate::codec::Codec;
use crate::driver::{check_affix, RouteKind, RouteOptions};
use crate::name_budget::DEFAULT_MAX_SUBDOMAIN_LENGTH;
use crate::TunnelError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Name used in log targets, so several drivers can be told apart
    pub name: String,

    /// Address to bind
    pub host: String,

    /// UDP port to bind
    pub port: u16,

    /// Upstream resolver for queries that aren't ours (`host` or `host:port`)
    pub passthrough: Option<String>,

    /// How long to wait for the upstream resolver
    #[serde(with = "humantime_serde")]
    pub passthrough_timeout: Duration,

    /// Tags and domains to listen for
    pub routes: Vec<RouteConfig>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: "dns".to_string(),
            host: "0.0.0.0".to_string(),
            port: 53,
            passthrough: None,
            passthrough_timeout: Duration::from_secs(3),
            routes: Vec::new(),
        }
    }
}

/// One tag or domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub kind: RouteKind,

    /// The tag or the domain itself
    pub affix: String,

    #[serde(default)]
    pub codec: Codec,

    /// Longest run of encoded characters between dots (1-63)
    #[serde(default = "default_max_subdomain_length")]
    pub max_subdomain_length: usize,
}

fn default_max_subdomain_length() -> usize {
    DEFAULT_MAX_SUBDOMAIN_LENGTH
}

impl RouteConfig {
    pub fn new(kind: RouteKind, affix: &str, codec: Codec) -> Self {
        Self {
            kind,
            affix: affix.to_string(),
            codec,
            max_subdomain_length: DEFAULT_MAX_SUBDOMAIN_LENGTH,
        }
    }

    pub fn options(&self) -> RouteOptions {
        RouteOptions {
            codec: self.codec,
            max_subdomain_length: self.max_subdomain_length,
        }
    }

    fn validate(&self) -> Result<(), TunnelError> {
        check_affix(self.kind, self.affix.trim_end_matches('.'))?;
        self.options().validate()
    }
}

impl DriverConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), TunnelError> {
        if self.host.is_empty() {
            return Err(TunnelError::Config("Listen host must be set".to_string()));
        }

        if let Some(passthrough) = &self.passthrough {
            if crate::dns::Upstream::parse(passthrough).is_none() {
                return Err(TunnelError::Config(format!(
                    "Invalid passthrough server: '{}'",
                    passthrough
                )));
            }
        }

        for route in &self.routes {
            route.validate()?;
        }

        Ok(())
    }
}
