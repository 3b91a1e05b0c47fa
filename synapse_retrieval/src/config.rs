use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use synapse_core::{ClientAddress, PieceCid};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid CDN url template {template:?}: {reason}")]
    CdnTemplate { template: String, reason: String },
}

/// Settings for the retrieval engine.
///
/// Every section has defaults, so an empty TOML document is a valid mainnet
/// configuration:
///
/// ```toml
/// network = "calibration"
///
/// [cdn]
/// enabled = true
///
/// [http]
/// connect_timeout_secs = 5
///
/// [subgraph]
/// endpoint = "https://api.example.com/subgraphs/pdp"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RetrievalConfig {
    pub network: Network,
    pub cdn: CdnConfig,
    pub http: HttpConfig,
    /// Off-chain piece index. Without it, discovery goes straight to chain.
    pub subgraph: Option<SubgraphConfig>,
}

impl RetrievalConfig {
    pub fn from_toml_str(toml_content: &str) -> Result<Self, ConfigError> {
        let config: RetrievalConfig = toml::from_str(toml_content)?;
        config.cdn.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&toml_content)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    #[default]
    Mainnet,
    Calibration,
}

impl Network {
    /// Host the edge cache serves this network's pieces from.
    pub fn cdn_host(&self) -> &'static str {
        match self {
            Network::Mainnet => "filcdn.io",
            Network::Calibration => "calibration.filcdn.io",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CdnConfig {
    /// Whether the engine wraps discovery in the CDN layer at all. Each call
    /// still opts in with `RetrievalOptions::with_cdn`.
    pub enabled: bool,
    /// Overrides the network's CDN url. `{client}` and `{piece}` are
    /// substituted with the client address and the piece CID.
    pub url_template: Option<String>,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url_template: None,
        }
    }
}

impl CdnConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(template) = &self.url_template {
            if !template.contains("{piece}") {
                return Err(ConfigError::CdnTemplate {
                    template: template.clone(),
                    reason: "missing {piece} placeholder".into(),
                });
            }
        }
        Ok(())
    }

    /// The CDN url for `piece` requested by `client`.
    pub fn url_for(
        &self,
        network: Network,
        client: &ClientAddress,
        piece: &PieceCid,
    ) -> Result<Url, url::ParseError> {
        let url = match &self.url_template {
            Some(template) => template
                .replace("{client}", &client.to_string())
                .replace("{piece}", &piece.to_string()),
            None => format!("https://{}.{}/{}", client, network.cdn_host(), piece),
        };
        Url::parse(&url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    /// Whole-request timeout, body included. Unset by default since piece
    /// downloads can be large.
    pub request_timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: None,
            user_agent: concat!("synapse-retrieval/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubgraphConfig {
    /// GraphQL endpoint of the piece index.
    pub endpoint: Url,
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: &str = "0x1234567890abcdef1234567890abcdef12345678";
    const PIECE: &str = "bafkzcibcm4bfhzedfvzmxiliqp6ycsy5z4rndt3fvsqis7bk3p2h2ren62qnubi";

    #[test]
    fn test_empty_config_is_mainnet_defaults() {
        let config = RetrievalConfig::from_toml_str("").unwrap();
        assert_eq!(config, RetrievalConfig::default());
        assert_eq!(config.network, Network::Mainnet);
        assert!(config.cdn.enabled);
        assert!(config.subgraph.is_none());
        assert_eq!(config.http.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_full_config() {
        let config = RetrievalConfig::from_toml_str(
            r#"
network = "calibration"

[cdn]
enabled = false

[http]
connect_timeout_secs = 3
request_timeout_secs = 60

[subgraph]
endpoint = "https://index.example/graphql"
"#,
        )
        .unwrap();
        assert_eq!(config.network, Network::Calibration);
        assert!(!config.cdn.enabled);
        assert_eq!(config.http.request_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(
            config.subgraph.unwrap().endpoint.as_str(),
            "https://index.example/graphql"
        );
    }

    #[test]
    fn test_unknown_network_rejected() {
        assert!(matches!(
            RetrievalConfig::from_toml_str("network = \"devnet\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_cdn_urls_per_network() {
        let client: ClientAddress = CLIENT.parse().unwrap();
        let piece: PieceCid = PIECE.parse().unwrap();
        let cdn = CdnConfig::default();

        assert_eq!(
            cdn.url_for(Network::Mainnet, &client, &piece).unwrap().as_str(),
            format!("https://{CLIENT}.filcdn.io/{PIECE}")
        );
        assert_eq!(
            cdn.url_for(Network::Calibration, &client, &piece)
                .unwrap()
                .as_str(),
            format!("https://{CLIENT}.calibration.filcdn.io/{PIECE}")
        );
    }

    #[test]
    fn test_cdn_template_override() {
        let client: ClientAddress = CLIENT.parse().unwrap();
        let piece: PieceCid = PIECE.parse().unwrap();
        let cdn = CdnConfig {
            enabled: true,
            url_template: Some("http://127.0.0.1:8080/cdn/{client}/{piece}".into()),
        };
        assert_eq!(
            cdn.url_for(Network::Mainnet, &client, &piece).unwrap().as_str(),
            format!("http://127.0.0.1:8080/cdn/{CLIENT}/{PIECE}")
        );
    }

    #[test]
    fn test_cdn_template_requires_piece() {
        let err = RetrievalConfig::from_toml_str(
            r#"
[cdn]
url_template = "https://cdn.example/{client}"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::CdnTemplate { .. }));
    }
}
