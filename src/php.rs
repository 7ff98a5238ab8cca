//! php-fpm runtimes and the harbor pools installed into them.
//!
//! The default runtime serves every link without a pinned version through
//! one shared socket. A link pinned to a version gets an isolated pool in
//! that runtime with a version-qualified socket. Whether an isolated pool is
//! still needed is always derived from the current config.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::brew::{Brew, BrewServiceInfo};
use crate::clienv;
use crate::config::{Config, ConfigStore};
use crate::error::{HarborError, Result};
use crate::executor::CommandExecutor;
use crate::fsutil;
use crate::paths::HarborPaths;

const DEFAULT_POOL_FILE: &str = "harbor-php-fpm.conf";
const DEFAULT_POOL_NAME: &str = "harbor";
const DISTRIBUTION_POOL_FILE: &str = "www.conf";
const BACKUP_SUFFIX: &str = ".harbor-backup";
const POOL_GROUP: &str = "staff";

/// An installed PHP formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhpCandidate {
    pub formula: String,
    pub version: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PhpCandidate {
    pub fn new(formula: impl Into<String>, version: impl Into<String>) -> Self {
        let version = version.into();
        let (major, minor, patch) = parse_semver(&version);
        Self {
            formula: formula.into(),
            version,
            major,
            minor,
            patch,
        }
    }

    pub fn series(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    fn key(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }
}

impl Ord for PhpCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .cmp(&other.key())
            .then_with(|| self.formula.cmp(&other.formula))
    }
}

impl PartialOrd for PhpCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PhpCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PHP {} ({})", self.version, self.formula)
    }
}

/// `major.minor.patch`; a missing or non-numeric component counts as 0.
pub fn parse_semver(version: &str) -> (u32, u32, u32) {
    let clean = version.trim().trim_start_matches('v');
    let mut parts = clean.split('.').map(leading_number);
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

fn leading_number(part: &str) -> u32 {
    let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// What a user asked for when isolating a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhpSelection {
    /// Go back to the shared default pool.
    Default,
    Version(PhpCandidate),
}

impl PhpSelection {
    /// Matches `php@8.2`, `8.2`, `8.2.5` or `default`/`global` against the
    /// installed candidates.
    pub fn resolve(input: &str, installed: &[PhpCandidate]) -> Result<Self> {
        let trimmed = input.trim().to_ascii_lowercase();
        let wanted = trimmed
            .strip_prefix("php@")
            .or_else(|| trimmed.strip_prefix("php"))
            .unwrap_or(&trimmed)
            .trim();

        if matches!(wanted, "default" | "global") {
            return Ok(Self::Default);
        }

        installed
            .iter()
            .find(|c| !wanted.is_empty() && (c.version.starts_with(wanted) || c.series() == wanted))
            .cloned()
            .map(Self::Version)
            .ok_or_else(|| HarborError::NotInstalled(input.trim().to_string()))
    }
}

pub struct PhpPoolManager<'a> {
    paths: &'a HarborPaths,
    store: &'a ConfigStore,
    executor: &'a dyn CommandExecutor,
}

impl<'a> PhpPoolManager<'a> {
    pub fn new(
        paths: &'a HarborPaths,
        store: &'a ConfigStore,
        executor: &'a dyn CommandExecutor,
    ) -> Self {
        Self {
            paths,
            store,
            executor,
        }
    }

    fn brew(&self) -> Brew<'a> {
        Brew::new(self.executor)
    }

    /// Installed `php` / `php@X.Y` formulas, ascending by version.
    pub async fn list_installed(&self) -> Result<Vec<PhpCandidate>> {
        let brew = self.brew();
        let mut candidates = Vec::new();
        for formula in brew.list_formulas().await? {
            if formula != "php" && !formula.starts_with("php@") {
                continue;
            }
            let version = brew
                .installed_version(&formula)
                .await?
                .unwrap_or_else(|| "0.0.0".to_string());
            candidates.push(PhpCandidate::new(formula, version));
        }
        candidates.sort();
        debug!(count = candidates.len(), "Enumerated PHP runtimes");
        Ok(candidates)
    }

    pub async fn find_installed(&self, version: &str) -> Result<PhpCandidate> {
        self.list_installed()
            .await?
            .into_iter()
            .find(|c| c.version == version)
            .ok_or_else(|| HarborError::NotInstalled(version.to_string()))
    }

    /// The configured default runtime, choosing and persisting the latest
    /// installed one when none is configured yet. Other runtimes are
    /// stopped so they do not contend for the shared socket.
    pub async fn select_default(&self, config: &Config) -> Result<Option<PhpCandidate>> {
        if let (Some(formula), Some(version)) = (&config.php.formula, &config.php.version) {
            return Ok(Some(PhpCandidate::new(formula.clone(), version.clone())));
        }

        let candidates = self.list_installed().await?;
        let Some(latest) = candidates.last().cloned() else {
            info!("No PHP runtime installed");
            return Ok(None);
        };

        let services = self.brew().services().await?;
        for other in candidates.iter().filter(|c| c.formula != latest.formula) {
            self.brew().stop_service(&other.formula, &services).await?;
        }

        self.store.mutate(|c| {
            c.php.version = Some(latest.version.clone());
            c.php.formula = Some(latest.formula.clone());
            Ok(())
        })?;
        info!(version = %latest.version, formula = %latest.formula, "Selected default PHP");
        Ok(Some(latest))
    }

    pub fn default_pool_file(&self, version: &str) -> PathBuf {
        self.paths.php_pool_dir(version).join(DEFAULT_POOL_FILE)
    }

    pub fn isolated_pool_file(&self, version: &str) -> PathBuf {
        self.paths
            .php_pool_dir(version)
            .join(format!("harbor-php-{version}.conf"))
    }

    fn distribution_pool_file(&self, version: &str) -> PathBuf {
        self.paths.php_pool_dir(version).join(DISTRIBUTION_POOL_FILE)
    }

    fn backup_file(&self, version: &str) -> PathBuf {
        self.paths
            .php_pool_dir(version)
            .join(format!("{DISTRIBUTION_POOL_FILE}{BACKUP_SUFFIX}"))
    }

    pub fn render_pool(&self, name: &str, version: Option<&str>) -> String {
        let user = clienv::current_user();
        let socket = self.paths.php_socket(version);
        format!(
            "[{name}]\n\
             user = {user}\n\
             group = {POOL_GROUP}\n\
             listen = {socket}\n\
             listen.owner = {user}\n\
             listen.group = {POOL_GROUP}\n\
             listen.mode = 0777\n\
             \n\
             pm = dynamic\n\
             pm.max_children = 10\n\
             pm.start_servers = 2\n\
             pm.min_spare_servers = 1\n\
             pm.max_spare_servers = 4\n\
             \n\
             catch_workers_output = yes\n",
            socket = socket.display(),
        )
    }

    /// Writes the shared pool into the default runtime and restarts it.
    pub async fn ensure_default_pool(&self, config: &Config) -> Result<()> {
        let (Some(version), Some(formula)) = (&config.php.version, &config.php.formula) else {
            debug!("No default PHP configured, skipping shared pool");
            return Ok(());
        };

        tokio::fs::create_dir_all(self.paths.home()).await?;
        let path = self.default_pool_file(version);
        fsutil::write_if_changed(&path, &self.render_pool(DEFAULT_POOL_NAME, None)).await?;
        self.reconcile_backup(version, config).await?;

        self.brew().restart_service(formula, true).await?;
        info!(version = %version, "Shared PHP pool ready");
        Ok(())
    }

    /// Writes the isolated pool for `version`, restarting its runtime only
    /// when the pool definition changed.
    pub async fn ensure_isolated_pool(&self, config: &Config, version: &str) -> Result<bool> {
        let candidate = self.find_installed(version).await?;

        tokio::fs::create_dir_all(self.paths.home()).await?;
        let name = format!("{DEFAULT_POOL_NAME}-{version}");
        let mut changed = fsutil::write_if_changed(
            &self.isolated_pool_file(version),
            &self.render_pool(&name, Some(version)),
        )
        .await?;

        if config.php.version.as_deref() == Some(version) {
            changed |= self.backup_distribution_pool(version).await?;
        }

        if changed {
            self.brew().restart_service(&candidate.formula, true).await?;
            info!(version, formula = %candidate.formula, "Isolated PHP pool ready");
        } else {
            debug!(version, "Isolated PHP pool unchanged");
        }
        Ok(changed)
    }

    /// Removes the isolated pool for `version` once no link in `config`
    /// references it. Returns whether anything was released.
    pub async fn release_if_unused(&self, config: &Config, version: &str) -> Result<bool> {
        if config.uses_php_version(version) {
            debug!(version, "Isolated PHP pool still in use");
            return Ok(false);
        }

        let removed = fsutil::remove_if_exists(&self.isolated_pool_file(version)).await?;
        fsutil::remove_if_exists(&self.paths.php_socket(Some(version))).await?;
        let restored = self.restore_distribution_pool(version).await?;
        if !removed && !restored {
            return Ok(false);
        }
        info!(version, "Released isolated PHP pool");

        let formula = match self.find_installed(version).await {
            Ok(candidate) => candidate.formula,
            Err(HarborError::NotInstalled(_)) => {
                debug!(version, "Runtime no longer installed, nothing to stop");
                return Ok(true);
            }
            Err(e) => return Err(e),
        };

        if config.php.version.as_deref() == Some(version) {
            // The default runtime keeps serving the shared pool.
            self.brew().restart_service(&formula, true).await?;
        } else {
            let services = self.brew().services().await?;
            self.brew().stop_service(&formula, &services).await?;
        }
        Ok(true)
    }

    /// Moves the shared pool to `candidate` and persists the choice.
    pub async fn switch_default(&self, config: &Config, candidate: &PhpCandidate) -> Result<bool> {
        if config.php.formula.as_deref() == Some(candidate.formula.as_str())
            && config.php.version.as_deref() == Some(candidate.version.as_str())
        {
            debug!(version = %candidate.version, "Already the default PHP");
            return Ok(false);
        }

        let mut next = config.clone();
        next.php.version = Some(candidate.version.clone());
        next.php.formula = Some(candidate.formula.clone());

        let services: HashMap<String, BrewServiceInfo> = self.brew().services().await?;
        if let (Some(old_version), Some(old_formula)) = (&config.php.version, &config.php.formula) {
            fsutil::remove_if_exists(&self.default_pool_file(old_version)).await?;
            self.reconcile_backup(old_version, &next).await?;

            if config.uses_php_version(old_version) {
                self.brew().restart_service(old_formula, true).await?;
            } else {
                self.brew().stop_service(old_formula, &services).await?;
            }
        }

        tokio::fs::create_dir_all(self.paths.home()).await?;
        fsutil::write_if_changed(
            &self.default_pool_file(&candidate.version),
            &self.render_pool(DEFAULT_POOL_NAME, None),
        )
        .await?;
        self.reconcile_backup(&candidate.version, &next).await?;
        self.brew().restart_service(&candidate.formula, true).await?;

        self.store.mutate(|c| {
            c.php = next.php.clone();
            Ok(())
        })?;
        info!(version = %candidate.version, "Switched default PHP");
        Ok(true)
    }

    /// Removes every harbor pool file, restoring distribution pools.
    pub async fn remove_all_pools(&self, config: &Config) -> Result<()> {
        if let Some(version) = &config.php.version {
            fsutil::remove_if_exists(&self.default_pool_file(version)).await?;
            self.restore_distribution_pool(version).await?;
        }
        for version in config.isolated_versions() {
            fsutil::remove_if_exists(&self.isolated_pool_file(&version)).await?;
            self.restore_distribution_pool(&version).await?;
        }
        Ok(())
    }

    pub fn has_isolated_pool(&self, version: &str) -> bool {
        self.isolated_pool_file(version).exists()
    }

    pub fn has_backup(&self, version: &str) -> bool {
        self.backup_file(version).exists()
    }

    /// Keeps `www.conf` moved aside exactly while `version` is the default
    /// and also backs an isolated pool.
    async fn reconcile_backup(&self, version: &str, config: &Config) -> Result<bool> {
        let is_default = config.php.version.as_deref() == Some(version);
        if is_default && config.uses_php_version(version) {
            self.backup_distribution_pool(version).await
        } else {
            self.restore_distribution_pool(version).await
        }
    }

    async fn backup_distribution_pool(&self, version: &str) -> Result<bool> {
        let original = self.distribution_pool_file(version);
        if !original.exists() {
            return Ok(false);
        }
        tokio::fs::rename(&original, self.backup_file(version)).await?;
        debug!(version, "Moved distribution pool aside");
        Ok(true)
    }

    async fn restore_distribution_pool(&self, version: &str) -> Result<bool> {
        let backup = self.backup_file(version);
        if !backup.exists() {
            return Ok(false);
        }
        tokio::fs::rename(&backup, self.distribution_pool_file(version)).await?;
        debug!(version, "Restored distribution pool");
        Ok(true)
    }
}
