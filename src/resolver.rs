//! OS resolver stubs, one file per top-level suffix.
//!
//! A stub is shared by every site under its suffix. Whether it is still
//! needed is derived from the full site set on each removal rather than a
//! stored counter, so a drifted filesystem heals on the next unlink.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::SiteEntry;
use crate::domain;
use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::fsutil;
use crate::paths::HarborPaths;

const DNS_PORT: u16 = 53;

pub struct ResolverStubManager<'a> {
    paths: &'a HarborPaths,
    executor: &'a dyn CommandExecutor,
}

impl<'a> ResolverStubManager<'a> {
    pub fn new(paths: &'a HarborPaths, executor: &'a dyn CommandExecutor) -> Self {
        Self { paths, executor }
    }

    pub fn render(dns_address: &str) -> String {
        format!("nameserver {dns_address}\nport {DNS_PORT}\n")
    }

    pub fn has_stub(&self, suffix: &str) -> bool {
        self.paths.resolver_file(suffix).exists()
    }

    /// Creates or refreshes the stub for `suffix`.
    pub async fn add_stub(&self, suffix: &str, dns_address: &str) -> Result<()> {
        let path = self.paths.resolver_file(suffix);
        if fsutil::write_privileged(self.executor, &path, &Self::render(dns_address)).await? {
            info!(suffix, path = %path.display(), "Installed resolver stub");
        }
        Ok(())
    }

    /// Deletes the stub for `host`'s suffix unless another site in
    /// `all_sites` still lives under it.
    pub async fn remove_stub_if_unused(
        &self,
        host: &str,
        all_sites: &BTreeMap<String, SiteEntry>,
    ) -> Result<bool> {
        let suffix = domain::suffix_of(host);
        let shared = all_sites
            .keys()
            .any(|other| other != host && domain::suffix_of(other) == suffix);

        if shared {
            debug!(host, suffix, "Resolver stub still in use");
            return Ok(false);
        }
        self.remove_stub(suffix).await
    }

    pub async fn remove_stub(&self, suffix: &str) -> Result<bool> {
        let path = self.paths.resolver_file(suffix);
        let removed = fsutil::remove_privileged(self.executor, &path).await?;
        if removed {
            info!(suffix, "Removed resolver stub");
        }
        Ok(removed)
    }
}
