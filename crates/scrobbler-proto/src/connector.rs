use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A site-specific connector: which pages it handles and how it is labelled
/// in menus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub matches: Vec<String>,
}

/// Ordered list of known connectors. The first one matching a URL wins.
///
/// Match patterns are compiled once, when the catalog is built.
#[derive(Debug, Clone, Default)]
pub struct ConnectorCatalog {
    connectors: Vec<Connector>,
    /// Compiled `matches` of the connector at the same index.
    patterns: Vec<Vec<Regex>>,
}

impl ConnectorCatalog {
    pub fn new(connectors: Vec<Connector>) -> Self {
        let patterns = connectors
            .iter()
            .map(|c| {
                c.matches
                    .iter()
                    .filter_map(|pattern| match Regex::new(&pattern_regex(pattern)) {
                        Ok(re) => Some(re),
                        Err(e) => {
                            warn!("Skipping bad match pattern {:?} of {}: {}", pattern, c.id, e);
                            None
                        }
                    })
                    .collect()
            })
            .collect();
        Self {
            connectors,
            patterns,
        }
    }

    pub fn builtin() -> Self {
        let c = |id: &str, label: &str, matches: &[&str]| Connector {
            id: id.to_string(),
            label: label.to_string(),
            matches: matches.iter().map(|m| m.to_string()).collect(),
        };
        Self::new(vec![
            c(
                "youtube",
                "YouTube",
                &["*://www.youtube.com/*", "*://m.youtube.com/*"],
            ),
            c("youtube-music", "YouTube Music", &["*://music.youtube.com/*"]),
            c("spotify", "Spotify", &["*://open.spotify.com/*"]),
            c("soundcloud", "SoundCloud", &["*://soundcloud.com/*"]),
            c("bandcamp", "Bandcamp", &["*://*.bandcamp.com/*"]),
            c("nts", "NTS Radio", &["*://www.nts.live/*"]),
        ])
    }

    pub fn find_by_url(&self, url: &str) -> Option<&Connector> {
        self.connectors
            .iter()
            .zip(&self.patterns)
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(url)))
            .map(|(c, _)| c)
    }

    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

// ── TOML catalog loader ───────────────────────────────────────────────────────

/// Matches the `[[connector]]` tables of `connectors.toml`.
#[derive(Debug, Deserialize)]
struct TomlConnectorFile {
    connector: Vec<TomlConnector>,
}

#[derive(Debug, Deserialize)]
struct TomlConnector {
    id: String,
    label: String,
    #[serde(default)]
    matches: Vec<String>,
}

pub fn load_catalog_from_toml(path: &std::path::Path) -> anyhow::Result<ConnectorCatalog> {
    let content = std::fs::read_to_string(path)?;
    parse_catalog_from_toml_str(&content)
}

pub fn parse_catalog_from_toml_str(content: &str) -> anyhow::Result<ConnectorCatalog> {
    let file: TomlConnectorFile = toml::from_str(content)?;
    let connectors = file
        .connector
        .into_iter()
        .map(|c| Connector {
            id: c.id,
            label: c.label,
            matches: c.matches,
        })
        .collect();
    Ok(ConnectorCatalog::new(connectors))
}

/// Translate a `scheme://host/path` match pattern into an anchored regex.
///
/// A `*` scheme means http or https. A `*` host matches any host and a
/// leading `*.` matches the domain and its subdomains. In the path, `*` matches
/// anything. Patterns without `://` treat `*` as "anything".
fn pattern_regex(pattern: &str) -> String {
    let Some((scheme, rest)) = pattern.split_once("://") else {
        return format!("^{}$", wildcard(pattern, ".*"));
    };
    let (host, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };

    let scheme = if scheme == "*" {
        "https?".to_string()
    } else {
        regex::escape(scheme)
    };
    let host = match host.strip_prefix("*.") {
        Some(domain) => format!(r"(?:[^/?#]+\.)?{}", regex::escape(domain)),
        None => wildcard(host, "[^/?#]*"),
    };
    format!("^{}://{}{}$", scheme, host, wildcard(path, ".*"))
}

fn wildcard(part: &str, any: &str) -> String {
    part.split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(any)
}
