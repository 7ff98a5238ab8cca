use std::path::{Path, PathBuf};

use crate::brew::Brew;
use crate::clienv;
use crate::error::Result;
use crate::executor::CommandExecutor;

const CONFIG_FILE: &str = "config.json";
const VHOST_SUBDIR: &str = "caddy";
const DNS_SUBDIR: &str = "dnsmasq";
const DEFAULT_SOCKET: &str = "harbor.sock";

/// Every filesystem location harbor reads or writes.
///
/// Resolved once at start-up and passed to each component, so tests can
/// point the whole tool at a temporary directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarborPaths {
    home: PathBuf,
    resolver_dir: PathBuf,
    brew_prefix: PathBuf,
}

impl HarborPaths {
    pub fn new(
        home: impl Into<PathBuf>,
        resolver_dir: impl Into<PathBuf>,
        brew_prefix: impl Into<PathBuf>,
    ) -> Self {
        Self {
            home: home.into(),
            resolver_dir: resolver_dir.into(),
            brew_prefix: brew_prefix.into(),
        }
    }

    /// Environment overrides first, then `brew --prefix`.
    pub async fn discover(executor: &dyn CommandExecutor) -> Result<Self> {
        let brew_prefix = match clienv::brew_prefix_override() {
            Some(prefix) => prefix,
            None => Brew::new(executor).prefix().await?,
        };
        Ok(Self::new(
            clienv::config_dir(),
            clienv::resolver_dir(),
            brew_prefix,
        ))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn resolver_dir(&self) -> &Path {
        &self.resolver_dir
    }

    pub fn brew_prefix(&self) -> &Path {
        &self.brew_prefix
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    pub fn vhost_dir(&self) -> PathBuf {
        self.home.join(VHOST_SUBDIR)
    }

    pub fn vhost_file(&self, host: &str) -> PathBuf {
        self.vhost_dir().join(format!("{host}.conf"))
    }

    pub fn dns_dir(&self) -> PathBuf {
        self.home.join(DNS_SUBDIR)
    }

    pub fn dns_file(&self, host: &str) -> PathBuf {
        self.dns_dir().join(format!("{host}.conf"))
    }

    pub fn resolver_file(&self, suffix: &str) -> PathBuf {
        self.resolver_dir.join(suffix)
    }

    /// Shared pool socket, or the version-qualified one for isolated pools.
    pub fn php_socket(&self, version: Option<&str>) -> PathBuf {
        match version {
            Some(v) => self.home.join(format!("harbor-php-{v}.sock")),
            None => self.home.join(DEFAULT_SOCKET),
        }
    }

    pub fn caddyfile(&self) -> PathBuf {
        self.brew_prefix.join("etc").join("Caddyfile")
    }

    pub fn dnsmasq_conf(&self) -> PathBuf {
        self.brew_prefix.join("etc").join("dnsmasq.conf")
    }

    pub fn caddy_data_dir(&self) -> PathBuf {
        self.brew_prefix.join("var").join("lib").join("caddy")
    }

    /// `<prefix>/etc/php/<major.minor>`; a bare major is used as-is.
    pub fn php_dir(&self, version: &str) -> PathBuf {
        let parts: Vec<&str> = version.split('.').collect();
        let series = if parts.len() >= 2 {
            format!("{}.{}", parts[0], parts[1])
        } else {
            parts[0].to_string()
        };
        self.brew_prefix.join("etc").join("php").join(series)
    }

    pub fn php_pool_dir(&self, version: &str) -> PathBuf {
        self.php_dir(version).join("php-fpm.d")
    }
}
