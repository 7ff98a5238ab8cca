use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{debug, info};

use crate::brew::Brew;
use crate::domain;
use crate::error::{HarborError, Result};
use crate::executor::Invocation;
use crate::pf::PfForwarding;
use crate::proxy::{HTTPS_PORT, HTTP_PORT};
use crate::reconciler::SiteReconciler;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DNS_PORT: u16 = 53;
/// Holders of harbor's ports that are harbor's own daemons.
const OWN_PROCESSES: &[&str] = &["caddy", "dnsmasq"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSummary {
    pub suffix: String,
    pub php: Option<String>,
}

/// Sets up and removes the system-wide pieces: packages, Caddyfile and
/// dnsmasq imports, pf forwarding and the shared PHP pool.
pub struct Installer<'a> {
    reconciler: &'a SiteReconciler,
}

impl<'a> Installer<'a> {
    pub fn new(reconciler: &'a SiteReconciler) -> Self {
        Self { reconciler }
    }

    pub async fn install(&self, tld: &str) -> Result<InstallSummary> {
        let suffix = tld.trim().trim_start_matches('.').to_ascii_lowercase();
        let suffix = if suffix.is_empty() {
            "test".to_string()
        } else {
            suffix
        };
        if !domain::is_valid_tld(&suffix) {
            return Err(HarborError::InvalidTld(suffix));
        }

        self.check_ports().await?;

        let executor = self.reconciler.executor();
        let brew = Brew::new(executor);
        let proxy = self.reconciler.proxy();
        let caddy_was_root = brew.list_formulas().await?.iter().any(|f| f == "caddy")
            && proxy.runs_as_root().await?;

        let pb = create_progress_bar("Installing caddy, dnsmasq... (this may take a while)");
        let result = brew.install(&["caddy", "dnsmasq"]).await;
        pb.finish_with_message(match &result {
            Ok(_) => "caddy and dnsmasq installed".to_string(),
            Err(e) => format!("Failed: {}", e),
        });
        result?;

        proxy.ensure_import().await?;
        proxy.ensure_port_config().await?;
        PfForwarding::new(executor).setup().await?;
        if caddy_was_root {
            info!("Caddy was already running as root, keeping it that way");
            proxy.reload_as_root().await?;
        } else {
            proxy.reload().await?;
        }

        let dns = self.reconciler.dns();
        dns.ensure_import().await?;
        dns.reload().await?;

        let store = self.reconciler.store();
        let config = store.mutate(|c| {
            c.default_suffix = suffix.clone();
            Ok(())
        })?;
        let php = self.reconciler.php();
        let selected = php.select_default(&config).await?;
        php.ensure_default_pool(&store.load()?).await?;

        store.mutate(|c| {
            c.install_marker = Some(VERSION.to_string());
            Ok(())
        })?;
        info!(suffix = %suffix, version = VERSION, "Harbor installed");

        Ok(InstallSummary {
            suffix,
            php: selected.map(|c| c.version),
        })
    }

    /// Removes everything harbor created. caddy and dnsmasq stay installed.
    pub async fn uninstall(&self) -> Result<()> {
        let store = self.reconciler.store();
        let config = store.load()?;
        let dns = self.reconciler.dns();
        let stubs = self.reconciler.stubs();
        let proxy = self.reconciler.proxy();

        let suffixes: BTreeSet<&str> = config.sites.keys().map(|h| domain::suffix_of(h)).collect();
        for host in config.sites.keys() {
            dns.remove_record(host).await?;
            proxy.remove_vhost(host).await?;
        }
        for suffix in suffixes {
            stubs.remove_stub(suffix).await?;
        }

        store.mutate(|c| {
            c.sites.clear();
            c.install_marker = None;
            Ok(())
        })?;

        self.reconciler.php().remove_all_pools(&config).await?;

        if proxy.remove_import().await? {
            proxy.reload().await?;
        }
        if dns.remove_import().await? {
            dns.reload().await?;
        }
        PfForwarding::new(self.reconciler.executor()).teardown().await?;

        match tokio::fs::remove_dir_all(self.reconciler.paths().home()).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!("Harbor uninstalled");
        Ok(())
    }

    /// Fails if a foreign process listens on one of harbor's ports.
    pub async fn check_ports(&self) -> Result<()> {
        for port in [HTTP_PORT, HTTPS_PORT, DNS_PORT] {
            self.check_port(&format!("-iTCP:{port}"), port, true).await?;
        }
        self.check_port(&format!("-iUDP:{DNS_PORT}"), DNS_PORT, false)
            .await
    }

    async fn check_port(&self, selector: &str, port: u16, tcp: bool) -> Result<()> {
        let mut args = vec!["-nP".to_string(), selector.to_string()];
        if tcp {
            args.push("-sTCP:LISTEN".to_string());
        }
        // lsof exits non-zero when nothing matches.
        let output = self
            .reconciler
            .executor()
            .execute(&Invocation::new("lsof", args).privileged(true))
            .await?;

        match foreign_listener(&output.stdout) {
            Some(process) => Err(HarborError::PortConflict { port, process }),
            None => {
                debug!(port, selector, "Port available");
                Ok(())
            }
        }
    }
}

/// First process in `lsof` output that is not one of harbor's daemons.
fn foreign_listener(lsof: &str) -> Option<String> {
    lsof.lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .find(|command| {
            let command = command.to_ascii_lowercase();
            !OWN_PROCESSES.iter().any(|own| command.starts_with(own))
        })
        .map(str::to_string)
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
