use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain;
use crate::error::{HarborError, Result};

const DEFAULT_SUFFIX: &str = "test";
const DEFAULT_DNS_ADDRESS: &str = "127.0.0.1";

/// A site served from local files through php-fpm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkEntry {
    pub host: String,
    pub root: PathBuf,
    /// Installed PHP version with its own pool; `None` uses the shared pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub php_version: Option<String>,
}

/// A site reverse-proxied to `host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEntry {
    pub host: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SiteEntry {
    Link(LinkEntry),
    Proxy(ProxyEntry),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Link,
    Proxy,
}

impl fmt::Display for SiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link => f.write_str("link"),
            Self::Proxy => f.write_str("proxy"),
        }
    }
}

impl SiteEntry {
    pub fn host(&self) -> &str {
        match self {
            Self::Link(link) => &link.host,
            Self::Proxy(proxy) => &proxy.host,
        }
    }

    pub fn kind(&self) -> SiteKind {
        match self {
            Self::Link(_) => SiteKind::Link,
            Self::Proxy(_) => SiteKind::Proxy,
        }
    }

    pub fn php_version(&self) -> Option<&str> {
        match self {
            Self::Link(link) => link.php_version.as_deref(),
            Self::Proxy(_) => None,
        }
    }

    /// Same entry served under another host.
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        let host = host.into();
        match self {
            Self::Link(link) => Self::Link(LinkEntry {
                host,
                ..link.clone()
            }),
            Self::Proxy(proxy) => Self::Proxy(ProxyEntry {
                host,
                ..proxy.clone()
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhpSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsSettings {
    pub address: String,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            address: DEFAULT_DNS_ADDRESS.to_string(),
        }
    }
}

/// The persisted source of truth for every managed site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    #[serde(alias = "tld")]
    pub default_suffix: String,
    #[serde(alias = "links")]
    pub sites: BTreeMap<String, SiteEntry>,
    pub php: PhpSettings,
    #[serde(alias = "dnsmasq")]
    pub dns: DnsSettings,
    #[serde(alias = "installVersion", skip_serializing_if = "Option::is_none")]
    pub install_marker: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_suffix: DEFAULT_SUFFIX.to_string(),
            sites: BTreeMap::new(),
            php: PhpSettings::default(),
            dns: DnsSettings::default(),
            install_marker: None,
        }
    }
}

impl Config {
    pub fn is_installed(&self) -> bool {
        self.install_marker
            .as_deref()
            .is_some_and(|marker| !marker.trim().is_empty())
    }

    pub fn links(&self) -> impl Iterator<Item = &LinkEntry> {
        self.sites.values().filter_map(|entry| match entry {
            SiteEntry::Link(link) => Some(link),
            SiteEntry::Proxy(_) => None,
        })
    }

    pub fn proxies(&self) -> impl Iterator<Item = &ProxyEntry> {
        self.sites.values().filter_map(|entry| match entry {
            SiteEntry::Proxy(proxy) => Some(proxy),
            SiteEntry::Link(_) => None,
        })
    }

    /// Whether any link entry is isolated on `version`.
    pub fn uses_php_version(&self, version: &str) -> bool {
        self.links()
            .any(|link| link.php_version.as_deref() == Some(version))
    }

    /// Every version that currently backs at least one isolated pool.
    pub fn isolated_versions(&self) -> BTreeSet<String> {
        self.links()
            .filter_map(|link| link.php_version.clone())
            .collect()
    }

    pub fn hosts_with_suffix(&self, suffix: &str) -> Vec<String> {
        self.sites
            .keys()
            .filter(|host| domain::suffix_of(host) == suffix)
            .cloned()
            .collect()
    }

    /// Link entry served from `dir` or `dir/public`.
    pub fn find_link_by_root(&self, dir: &Path) -> Option<&LinkEntry> {
        let public = dir.join("public");
        self.links()
            .find(|link| link.root == dir || link.root == public)
    }

    /// Repairs what older or hand-edited files may contain.
    fn normalize(mut self) -> Self {
        let suffix = self.default_suffix.trim().trim_start_matches('.').to_string();
        self.default_suffix = if suffix.is_empty() {
            DEFAULT_SUFFIX.to_string()
        } else {
            suffix
        };

        let mut sites = BTreeMap::new();
        for (key, entry) in std::mem::take(&mut self.sites) {
            let host = entry.host().trim().to_ascii_lowercase();
            if !domain::is_valid_domain(&host) {
                tracing::warn!(host = %host, "Site host is not a valid domain");
            }
            let entry = if host == entry.host() {
                entry
            } else {
                entry.with_host(host.clone())
            };
            if key != host {
                tracing::warn!(key = %key, host = %host, "Re-keying site by host");
            }
            if let Some(dropped) = sites.insert(host.clone(), entry) {
                tracing::warn!(host = %host, dropped = ?dropped, "Duplicate site host, keeping the last entry");
            }
        }
        self.sites = sites;
        self
    }
}

/// File-backed config document. Every provisioning operation goes through
/// [`ConfigStore::mutate`]; there is no locking, so concurrent harbor
/// processes can lose each other's writes.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document, creating it with defaults if absent.
    pub fn load(&self) -> Result<Config> {
        tracing::trace!(path = %self.path.display(), "Loading config");

        if !self.path.exists() {
            tracing::debug!("Config file does not exist, writing defaults");
            let config = Config::default();
            self.save(&config)?;
            return Ok(config);
        }

        let content = fs::read_to_string(&self.path)?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            HarborError::Config(format!("Failed to parse {}: {e}", self.path.display()))
        })?;

        let config = config.normalize();
        tracing::trace!(
            sites = config.sites.len(),
            suffix = %config.default_suffix,
            "Config loaded"
        );
        Ok(config)
    }

    /// Replaces the whole file via a sibling temp file and rename.
    pub fn save(&self, config: &Config) -> Result<()> {
        tracing::trace!(path = %self.path.display(), "Saving config");

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut content = serde_json::to_string_pretty(config)?;
        content.push('\n');

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        tracing::trace!("Config saved");
        Ok(())
    }

    /// Load, apply `f`, save, return the new state. Nothing is written if
    /// `f` fails.
    pub fn mutate<F>(&self, f: F) -> Result<Config>
    where
        F: FnOnce(&mut Config) -> Result<()>,
    {
        let mut config = self.load()?;
        f(&mut config)?;
        self.save(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("harbor").join("config.json"));
        (dir, store)
    }

    fn link(host: &str, php: Option<&str>) -> SiteEntry {
        SiteEntry::Link(LinkEntry {
            host: host.to_string(),
            root: PathBuf::from(format!("/srv/{host}")),
            php_version: php.map(str::to_string),
        })
    }

    #[test]
    fn load_creates_defaults() {
        let (_dir, store) = store();
        let config = store.load().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.default_suffix, "test");
        assert_eq!(config.dns.address, "127.0.0.1");
        assert!(store.path().exists());
    }

    #[test]
    fn save_load_round_trip_is_byte_stable() {
        let (_dir, store) = store();
        store
            .mutate(|c| {
                c.sites.insert("b.test".into(), link("b.test", Some("8.2.5")));
                c.sites.insert(
                    "a.test".into(),
                    SiteEntry::Proxy(ProxyEntry {
                        host: "a.test".into(),
                        target: "localhost:3000".into(),
                    }),
                );
                c.php.version = Some("8.3.0".into());
                c.php.formula = Some("php".into());
                Ok(())
            })
            .unwrap();

        let first = fs::read_to_string(store.path()).unwrap();
        let loaded = store.load().unwrap();
        store.save(&loaded).unwrap();
        let second = fs::read_to_string(store.path()).unwrap();
        store.save(&store.load().unwrap()).unwrap();
        let third = fs::read_to_string(store.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(store.load().unwrap(), loaded);
    }

    #[test]
    fn missing_fields_are_back_filled() {
        let (_dir, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), r#"{"sites": {}, "dns": {}}"#).unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.default_suffix, "test");
        assert_eq!(config.dns.address, "127.0.0.1");
        assert!(config.php.version.is_none());
        assert!(!config.is_installed());
    }

    #[test]
    fn legacy_keys_are_accepted() {
        let (_dir, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"{
                "tld": ".dev",
                "links": {
                    "app.dev": {"type": "link", "host": "app.dev", "root": "/srv/app"},
                    "web.dev": {"type": "proxy", "host": "web.dev", "target": "localhost:3000"}
                },
                "php": {},
                "dnsmasq": {"address": "127.0.0.2"},
                "parks": [],
                "installVersion": "1.2.0"
            }"#,
        )
        .unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.default_suffix, "dev");
        assert_eq!(config.dns.address, "127.0.0.2");
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites["app.dev"].kind(), SiteKind::Link);
        assert_eq!(config.sites["web.dev"].kind(), SiteKind::Proxy);
        assert!(config.is_installed());
    }

    #[test]
    fn keys_are_rekeyed_by_host() {
        let (_dir, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"{"sites": {"wrong": {"type": "link", "host": "app.test", "root": "/srv/app"}}}"#,
        )
        .unwrap();

        let config = store.load().unwrap();
        assert!(config.sites.contains_key("app.test"));
        assert!(!config.sites.contains_key("wrong"));
    }

    #[test]
    fn hosts_are_lowercased_and_collisions_collapse() {
        let (_dir, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"{"sites": {
                "a": {"type": "link", "host": "App.Test", "root": "/srv/old"},
                "b": {"type": "link", "host": "app.test", "root": "/srv/new"}
            }}"#,
        )
        .unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.sites.len(), 1);
        assert_eq!(config.sites["app.test"].host(), "app.test");
        assert_eq!(
            config.links().next().map(|l| l.root.clone()),
            Some(PathBuf::from("/srv/new"))
        );
    }

    #[test]
    fn failed_mutation_writes_nothing() {
        let (_dir, store) = store();
        store.load().unwrap();
        let result = store.mutate(|c| {
            c.default_suffix = "dev".into();
            Err(HarborError::InvalidTld("x".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.load().unwrap().default_suffix, "test");
    }

    #[test]
    fn php_usage_queries() {
        let mut config = Config::default();
        config.sites.insert("a.test".into(), link("a.test", Some("8.2.5")));
        config.sites.insert("b.test".into(), link("b.test", Some("8.2.5")));
        config.sites.insert("c.dev".into(), link("c.dev", None));

        assert!(config.uses_php_version("8.2.5"));
        assert!(!config.uses_php_version("8.3.0"));
        assert_eq!(config.isolated_versions().len(), 1);
        assert_eq!(config.hosts_with_suffix("test"), vec!["a.test", "b.test"]);
        assert_eq!(
            config
                .find_link_by_root(Path::new("/srv/c.dev"))
                .map(|l| l.host.as_str()),
            Some("c.dev")
        );
    }

    #[test]
    fn with_host_keeps_payload() {
        let entry = link("app.test", Some("8.2.5")).with_host("app.dev");
        assert_eq!(entry.host(), "app.dev");
        assert_eq!(entry.php_version(), Some("8.2.5"));
    }
}
