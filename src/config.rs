use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT_PRIMARY_COLOR: &str = "A80B00";
const DEFAULT_SECONDARY_COLOR: &str = "FFFFFF";

/// Requester defaults applied when building scope requests.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub partner: PartnerConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// The partner issuing requests and the keys it signs them with.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PartnerConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub signing_keys: SigningKeys,
}

/// Hex encoded secp256k1 key pair.
#[derive(Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SigningKeys {
    #[serde(default)]
    pub xpub: String,
    #[serde(default)]
    pub xprv: String,
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("xpub", &self.xpub)
            .field("xprv", &"<redacted>")
            .finish()
    }
}

/// Requesting application details shown to the holder.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_primary_color", alias = "primary_color")]
    pub primary_color: String,
    #[serde(default = "default_secondary_color", alias = "secondary_color")]
    pub secondary_color: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            logo: String::new(),
            description: String::new(),
            primary_color: default_primary_color(),
            secondary_color: default_secondary_color(),
        }
    }
}

fn default_primary_color() -> String {
    DEFAULT_PRIMARY_COLOR.to_owned()
}

fn default_secondary_color() -> String {
    DEFAULT_SECONDARY_COLOR.to_owned()
}

/// Bases the per-request channel URLs are derived from.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub base_events_url: Option<BaseUrl>,
    #[serde(default)]
    pub base_payload_url: Option<BaseUrl>,
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("invalid scope request configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read configuration at {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("in {}", path.display()))
    }

    /// Reads `PARTNER_*`, `APP_*` and `BASE_*_URL` variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// The user configuration file, then the system one, then the environment.
    pub fn discover() -> Result<Self> {
        for path in Self::search_paths() {
            if path.is_file() {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Self::load(path);
            }
        }
        tracing::debug!("no configuration file found, reading environment");
        Self::from_env()
    }

    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".civic").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/civic/config.toml"));
        paths
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).unwrap_or_default();
        let base = |key: &str| -> Result<Option<BaseUrl>> {
            lookup(key)
                .filter(|value| !value.is_empty())
                .map(|value| BaseUrl::try_from(value).with_context(|| format!("{key} is not a url")))
                .transpose()
        };

        Ok(Self {
            partner: PartnerConfig {
                id: var("PARTNER_ID"),
                signing_keys: SigningKeys {
                    xpub: var("PARTNER_XPUB"),
                    xprv: var("PARTNER_XPRV"),
                },
            },
            app: AppConfig {
                id: var("APP_ID"),
                name: var("APP_NAME"),
                logo: var("APP_LOGO_URL"),
                description: var("APP_DESCRIPTION"),
                primary_color: lookup("APP_PRIMARY_COLOR").unwrap_or_else(default_primary_color),
                secondary_color: lookup("APP_SECONDARY_COLOR")
                    .unwrap_or_else(default_secondary_color),
            },
            channels: ChannelsConfig {
                base_events_url: base("BASE_EVENT_URL")?,
                base_payload_url: base("BASE_PAYLOAD_URL")?,
            },
        })
    }
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl BaseUrl {
    /// The per-request channel, `<base>/<id>`.
    pub fn for_request(&self, id: &str) -> Result<Url, url::ParseError> {
        self.0.join(id)
    }
}

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn base_url_joins_request_id() {
        let base = BaseUrl::try_from("https://api.example.com/events".to_owned()).unwrap();
        assert_eq!(
            base.for_request("abcd").unwrap().as_str(),
            "https://api.example.com/events/abcd"
        );
    }

    #[test]
    fn parses_toml() {
        let config = Config::from_toml_str(
            r#"
            [partner]
            id = "partner-1"

            [partner.signing_keys]
            xpub = "04aa"
            xprv = "bb"

            [app]
            id = "app-1"
            name = "Demo"
            logo = "https://example.com/logo.png"
            description = "Demo app"
            primary_color = "000000"

            [channels]
            base_events_url = "https://api.example.com/events"
            "#,
        )
        .unwrap();

        assert_eq!(config.partner.id, "partner-1");
        assert_eq!(config.partner.signing_keys.xpub, "04aa");
        assert_eq!(config.app.primary_color, "000000");
        assert_eq!(config.app.secondary_color, DEFAULT_SECONDARY_COLOR);
        assert!(config.channels.base_payload_url.is_none());
        assert_eq!(
            config.channels.base_events_url.unwrap().as_str(),
            "https://api.example.com/events/"
        );
    }

    #[test]
    fn reads_environment_with_color_defaults() {
        let env: HashMap<&str, &str> = [
            ("PARTNER_ID", "partner-1"),
            ("APP_ID", "app-1"),
            ("BASE_PAYLOAD_URL", "http://localhost:8080/payload"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.partner.id, "partner-1");
        assert_eq!(config.app.id, "app-1");
        assert_eq!(config.app.primary_color, DEFAULT_PRIMARY_COLOR);
        assert!(config.channels.base_events_url.is_none());
        assert_eq!(
            config.channels.base_payload_url.unwrap().as_str(),
            "http://localhost:8080/payload/"
        );
    }

    #[test]
    fn rejects_malformed_base_url() {
        let result = Config::from_lookup(|key| {
            (key == "BASE_EVENT_URL").then(|| "not a url".to_owned())
        });
        assert!(result.is_err());
    }

    #[test]
    fn redacts_private_key() {
        let keys = SigningKeys {
            xpub: "04aa".into(),
            xprv: "secret".into(),
        };
        assert!(!format!("{keys:?}").contains("secret"));
    }
}
