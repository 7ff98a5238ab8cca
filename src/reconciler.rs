//! Drives DNS, resolver stubs, php-fpm and Caddy towards the site set in
//! the config.
//!
//! Every operation persists the desired state first and then converges the
//! services step by step. There is no rollback: a failed step leaves the
//! config ahead of the system, and re-running the command finishes the job
//! because every step is idempotent.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigStore, LinkEntry, ProxyEntry, SiteEntry, SiteKind};
use crate::dns::DnsZoneGenerator;
use crate::domain;
use crate::error::{HarborError, Result};
use crate::executor::CommandExecutor;
use crate::paths::HarborPaths;
use crate::php::{PhpPoolManager, PhpSelection};
use crate::proxy::ProxyConfigGenerator;
use crate::resolver::ResolverStubManager;

/// Result of moving one site to a new suffix.
#[derive(Debug)]
pub struct SiteMigration {
    pub from: String,
    pub result: Result<String>,
}

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub old_suffix: String,
    pub new_suffix: String,
    pub sites: Vec<SiteMigration>,
}

impl MigrationReport {
    pub fn failed(&self) -> usize {
        self.sites.iter().filter(|s| s.result.is_err()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.sites.len() - self.failed()
    }
}

pub struct SiteReconciler {
    paths: HarborPaths,
    store: ConfigStore,
    executor: Arc<dyn CommandExecutor>,
}

impl SiteReconciler {
    pub fn new(paths: HarborPaths, store: ConfigStore, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            paths,
            store,
            executor,
        }
    }

    pub fn paths(&self) -> &HarborPaths {
        &self.paths
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn executor(&self) -> &dyn CommandExecutor {
        &*self.executor
    }

    pub fn dns(&self) -> DnsZoneGenerator<'_> {
        DnsZoneGenerator::new(&self.paths, &*self.executor)
    }

    pub fn stubs(&self) -> ResolverStubManager<'_> {
        ResolverStubManager::new(&self.paths, &*self.executor)
    }

    pub fn proxy(&self) -> ProxyConfigGenerator<'_> {
        ProxyConfigGenerator::new(&self.paths, &*self.executor)
    }

    pub fn php(&self) -> PhpPoolManager<'_> {
        PhpPoolManager::new(&self.paths, &self.store, &*self.executor)
    }

    /// Config of an installed harbor, or `NotInitialized`.
    pub fn installed_config(&self) -> Result<Config> {
        let config = self.store.load()?;
        if !config.is_installed() {
            return Err(HarborError::NotInitialized);
        }
        Ok(config)
    }

    /// Serves `root` under `input`, a bare label or a full domain.
    ///
    /// Re-linking an existing link keeps its pinned PHP version.
    pub async fn provision_link(&self, input: &str, root: PathBuf) -> Result<LinkEntry> {
        let mut entry = None;
        let config = self.store.mutate(|c| {
            let host = domain::normalize(input, &c.default_suffix)?;
            let php_version = c.sites.get(&host).and_then(|e| e.php_version().map(str::to_string));
            let link = LinkEntry {
                host: host.clone(),
                root,
                php_version,
            };
            c.sites.insert(host, SiteEntry::Link(link.clone()));
            entry = Some(link);
            Ok(())
        })?;
        let Some(link) = entry else {
            return Err(HarborError::Config("link entry was not recorded".to_string()));
        };

        info!(host = %link.host, root = %link.root.display(), "Provisioning link");
        self.converge(&config, &SiteEntry::Link(link.clone()), true)
            .await?;
        Ok(link)
    }

    /// Reverse-proxies `input` to `target` (`host[:port]`, scheme optional).
    pub async fn provision_proxy(&self, input: &str, target: &str) -> Result<ProxyEntry> {
        let target = domain::normalize_proxy_target(target)?;

        let mut replaced = None;
        let mut entry = None;
        let config = self.store.mutate(|c| {
            let host = domain::normalize(input, &c.default_suffix)?;
            let proxy = ProxyEntry {
                host: host.clone(),
                target,
            };
            replaced = c.sites.insert(host, SiteEntry::Proxy(proxy.clone()));
            entry = Some(proxy);
            Ok(())
        })?;
        let Some(proxy) = entry else {
            return Err(HarborError::Config("proxy entry was not recorded".to_string()));
        };

        info!(host = %proxy.host, target = %proxy.target, "Provisioning proxy");
        self.converge(&config, &SiteEntry::Proxy(proxy.clone()), true)
            .await?;

        if let Some(version) = replaced.as_ref().and_then(SiteEntry::php_version) {
            self.php().release_if_unused(&config, version).await?;
        }
        Ok(proxy)
    }

    /// Removes the `kind` site at `input` and everything serving it.
    pub async fn teardown(&self, input: &str, kind: SiteKind) -> Result<SiteEntry> {
        let mut removed = None;
        let config = self.store.mutate(|c| {
            let host = domain::normalize(input, &c.default_suffix)?;
            if !c.sites.get(&host).is_some_and(|e| e.kind() == kind) {
                return Err(HarborError::not_found(kind.to_string(), host));
            }
            removed = c.sites.remove(&host);
            Ok(())
        })?;
        let Some(entry) = removed else {
            return Err(HarborError::Config("site was not removed".to_string()));
        };

        info!(host = entry.host(), kind = %kind, "Tearing down site");
        self.dismantle(&config, entry.host(), true).await?;

        if let Some(version) = entry.php_version() {
            self.php().release_if_unused(&config, version).await?;
        }
        Ok(entry)
    }

    /// Pins the link at `input` to a PHP version, or back to the default.
    /// Returns whether anything changed.
    pub async fn isolate(&self, input: &str, selection: &PhpSelection) -> Result<bool> {
        let wanted = match selection {
            PhpSelection::Default => None,
            PhpSelection::Version(candidate) => Some(candidate.version.clone()),
        };
        if let Some(version) = &wanted {
            self.php().find_installed(version).await?;
        }

        let mut change = None;
        let config = self.store.mutate(|c| {
            let host = domain::normalize(input, &c.default_suffix)?;
            let Some(SiteEntry::Link(link)) = c.sites.get_mut(&host) else {
                return Err(HarborError::not_found(SiteKind::Link.to_string(), host));
            };
            if link.php_version == wanted {
                return Ok(());
            }
            let previous = std::mem::replace(&mut link.php_version, wanted.clone());
            change = Some((link.clone(), previous));
            Ok(())
        })?;

        let Some((link, previous)) = change else {
            debug!(input, "PHP isolation unchanged");
            return Ok(false);
        };

        let php = self.php();
        if let Some(version) = &link.php_version {
            php.ensure_isolated_pool(&config, version).await?;
        }
        let proxy = self.proxy();
        proxy.write_vhost(&SiteEntry::Link(link.clone())).await?;
        proxy.reload().await?;

        if let Some(old) = previous {
            php.release_if_unused(&config, &old).await?;
        }
        info!(host = %link.host, version = ?link.php_version, "Updated PHP isolation");
        Ok(true)
    }

    /// Validates and persists a new default suffix. Returns the old one.
    pub fn set_default_suffix(&self, tld: &str) -> Result<(String, String)> {
        let tld = tld.trim().trim_start_matches('.');
        if !domain::is_valid_tld(tld) {
            return Err(HarborError::InvalidTld(tld.to_string()));
        }
        let new_suffix = tld.to_ascii_lowercase();

        let mut old_suffix = String::new();
        self.store.mutate(|c| {
            old_suffix = std::mem::replace(&mut c.default_suffix, new_suffix.clone());
            Ok(())
        })?;
        info!(old = %old_suffix, new = %new_suffix, "Default suffix changed");
        Ok((old_suffix, new_suffix))
    }

    /// Moves every site under `old_suffix` to `new_suffix`. Each site is
    /// handled on its own; failures are collected, not propagated.
    pub async fn migrate_sites(&self, old_suffix: &str, new_suffix: &str) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            old_suffix: old_suffix.to_string(),
            new_suffix: new_suffix.to_string(),
            sites: Vec::new(),
        };
        if old_suffix == new_suffix {
            return Ok(report);
        }

        let hosts = self.store.load()?.hosts_with_suffix(old_suffix);
        for host in hosts {
            let result = self.migrate_site(&host, old_suffix, new_suffix).await;
            if let Err(e) = &result {
                warn!(host = %host, error = %e, "Site migration failed");
            }
            report.sites.push(SiteMigration { from: host, result });
        }
        Ok(report)
    }

    async fn migrate_site(&self, host: &str, old_suffix: &str, new_suffix: &str) -> Result<String> {
        let new_host = domain::replace_suffix(host, old_suffix, new_suffix)
            .filter(|h| domain::is_valid_domain(h))
            .ok_or_else(|| HarborError::InvalidDomain(host.to_string()))?;

        let mut moved = None;
        let config = self.store.mutate(|c| {
            if c.sites.contains_key(&new_host) {
                return Err(HarborError::SiteExists(new_host.clone()));
            }
            let entry = c
                .sites
                .remove(host)
                .ok_or_else(|| HarborError::not_found("site", host))?;
            let renamed = entry.with_host(new_host.clone());
            c.sites.insert(new_host.clone(), renamed.clone());
            moved = Some(renamed);
            Ok(())
        })?;
        let Some(entry) = moved else {
            return Err(HarborError::Config("site was not moved".to_string()));
        };

        self.dismantle(&config, host, false).await?;
        self.converge(&config, &entry, true).await?;
        info!(from = host, to = %new_host, "Migrated site");
        Ok(new_host)
    }

    /// Brings every service in line with `entry`, in a fixed order.
    async fn converge(&self, config: &Config, entry: &SiteEntry, reload: bool) -> Result<()> {
        let host = entry.host();
        let address = &config.dns.address;
        let dns = self.dns();

        dns.add_record(host, address).await?;
        self.stubs()
            .add_stub(domain::suffix_of(host), address)
            .await?;

        if let SiteEntry::Link(link) = entry {
            match &link.php_version {
                Some(version) => {
                    self.php().ensure_isolated_pool(config, version).await?;
                }
                None => debug!(host, "Using shared PHP pool"),
            }
        }

        let proxy = self.proxy();
        proxy.write_vhost(entry).await?;

        if reload {
            dns.reload().await?;
            proxy.reload().await?;
        }
        Ok(())
    }

    /// Removes everything serving `host`. `config` must no longer contain it.
    pub async fn dismantle(&self, config: &Config, host: &str, reload: bool) -> Result<()> {
        let dns = self.dns();
        dns.remove_record(host).await?;
        self.stubs()
            .remove_stub_if_unused(host, &config.sites)
            .await?;

        let proxy = self.proxy();
        proxy.remove_vhost(host).await?;

        if reload {
            dns.reload().await?;
            proxy.reload().await?;
        }
        Ok(())
    }
}
