//! Strategy descriptors and the ordered catalog.

use serde::{Deserialize, Serialize};

/// How a strategy uses authentication material.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthUse {
    /// Never send cookies.
    #[default]
    None,
    /// Send cookies when the request or server has them.
    IfAvailable,
    /// Only attempt when cookies are available.
    Required,
}

/// Which format expression the strategy asks for.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FormatPolicy {
    /// Derived from request mode and quality.
    #[default]
    Requested,
    /// Low-quality fallback that most clients still serve.
    Reduced,
}

/// One way of attempting a download.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrategyDescriptor {
    pub name: String,
    /// Extraction client identities, in the order the extractor should try them.
    #[serde(default)]
    pub clients: Vec<String>,
    #[serde(default)]
    pub auth: AuthUse,
    #[serde(default)]
    pub format: FormatPolicy,
    /// Browser fingerprint to impersonate, e.g. `chrome`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonate: Option<String>,
}

impl StrategyDescriptor {
    pub fn new(name: &str, clients: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            clients: clients.iter().map(|c| c.to_string()).collect(),
            auth: AuthUse::None,
            format: FormatPolicy::Requested,
            impersonate: None,
        }
    }

    pub fn with_auth(mut self, auth: AuthUse) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_format(mut self, format: FormatPolicy) -> Self {
        self.format = format;
        self
    }

    pub fn with_impersonate(mut self, target: &str) -> Self {
        self.impersonate = Some(target.to_string());
        self
    }
}

/// Ordered, static list of strategies. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyCatalog {
    strategies: Vec<StrategyDescriptor>,
}

impl StrategyCatalog {
    pub fn new(strategies: Vec<StrategyDescriptor>) -> Self {
        Self { strategies }
    }

    /// Catalog from config, falling back to the built-in order.
    pub fn from_config(strategies: Option<&[StrategyDescriptor]>) -> Self {
        match strategies {
            Some(list) if !list.is_empty() => Self::new(list.to_vec()),
            _ => Self::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategies with their 1-based position.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &StrategyDescriptor)> {
        self.strategies
            .iter()
            .enumerate()
            .map(|(i, s)| (i as u32 + 1, s))
    }
}

impl Default for StrategyCatalog {
    /// Least restrictive first: plain web client with optional cookies, then
    /// alternate client identities, browser impersonation, and finally a
    /// reduced-quality fallback.
    fn default() -> Self {
        Self::new(vec![
            StrategyDescriptor::new("web", &["web"]).with_auth(AuthUse::IfAvailable),
            StrategyDescriptor::new("tv", &["tv"]),
            StrategyDescriptor::new("mobile", &["android", "ios"]),
            StrategyDescriptor::new("impersonate", &["web"])
                .with_auth(AuthUse::IfAvailable)
                .with_impersonate("chrome"),
            StrategyDescriptor::new("reduced", &["tv", "android", "web"])
                .with_format(FormatPolicy::Reduced),
        ])
    }
}
