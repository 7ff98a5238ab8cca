//! macOS packet-filter redirects from 80/443 to Caddy's unprivileged ports.

use tracing::{debug, info};

use crate::error::Result;
use crate::executor::{CommandExecutor, Invocation};
use crate::proxy::{HTTPS_PORT, HTTP_PORT};

pub const ANCHOR_PATH: &str = "/etc/pf.anchors/harbor";
pub const PF_CONF_PATH: &str = "/etc/pf.conf";

const RDR_ANCHOR_LINE: &str = "rdr-anchor \"harbor\"";

fn anchor_lines() -> [String; 2] {
    [
        RDR_ANCHOR_LINE.to_string(),
        format!("load anchor \"harbor\" from \"{ANCHOR_PATH}\""),
    ]
}

pub fn anchor_rules() -> String {
    format!(
        "rdr pass inet proto tcp from any to any port 80 -> 127.0.0.1 port {HTTP_PORT}\n\
         rdr pass inet proto tcp from any to any port 443 -> 127.0.0.1 port {HTTPS_PORT}\n"
    )
}

/// Inserts the harbor anchor lines before the first filtering `anchor`
/// rule, since pf requires translation rules to precede filtering ones.
/// Returns `None` when pf.conf already references the anchor.
pub fn insert_anchor(pf_conf: &str) -> Option<String> {
    if pf_conf.contains(RDR_ANCHOR_LINE) {
        return None;
    }

    let harbor = anchor_lines();
    let mut out: Vec<&str> = Vec::new();
    let mut inserted = false;
    for line in pf_conf.lines() {
        if !inserted && is_filter_anchor(line) {
            out.extend(harbor.iter().map(String::as_str));
            inserted = true;
        }
        out.push(line);
    }
    if !inserted {
        out.extend(harbor.iter().map(String::as_str));
    }

    let mut updated = out.join("\n");
    updated.push('\n');
    Some(updated)
}

fn is_filter_anchor(line: &str) -> bool {
    line.strip_prefix("anchor")
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

pub fn remove_anchor(pf_conf: &str) -> String {
    let harbor = anchor_lines();
    let lines: Vec<&str> = harbor.iter().map(String::as_str).collect();
    crate::fsutil::remove_lines(pf_conf, &lines)
}

pub struct PfForwarding<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> PfForwarding<'a> {
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    pub async fn setup(&self) -> Result<()> {
        self.write_root_file(ANCHOR_PATH, &anchor_rules()).await?;

        let current = self.executor.capture("cat", &[PF_CONF_PATH], true).await?;
        match insert_anchor(&current) {
            Some(updated) => {
                self.write_root_file(PF_CONF_PATH, &updated).await?;
                info!("Added harbor anchor to pf.conf");
            }
            None => debug!("pf.conf already references the harbor anchor"),
        }

        self.reload().await?;
        self.enable_if_needed().await
    }

    /// Undoes [`PfForwarding::setup`]; nothing happens if the anchor file is gone.
    pub async fn teardown(&self) -> Result<()> {
        let exists = self
            .executor
            .execute(&Invocation::new("test", ["-f", ANCHOR_PATH]).privileged(true))
            .await?
            .success();
        if !exists {
            debug!("No pf anchor installed");
            return Ok(());
        }

        let current = self.executor.capture("cat", &[PF_CONF_PATH], true).await?;
        self.write_root_file(PF_CONF_PATH, &remove_anchor(&current))
            .await?;
        self.executor.sudo_run("rm", &["-f", ANCHOR_PATH]).await?;
        info!("Removed harbor pf configuration");
        self.reload().await
    }

    async fn reload(&self) -> Result<()> {
        self.executor
            .sudo_run("pfctl", &["-f", PF_CONF_PATH])
            .await?;
        Ok(())
    }

    async fn enable_if_needed(&self) -> Result<()> {
        let status = self
            .executor
            .execute(&Invocation::new("pfctl", ["-s", "info"]).privileged(true))
            .await?;
        if status.stdout.contains("Status: Enabled") {
            return Ok(());
        }
        info!("Enabling pf");
        self.executor.sudo_run("pfctl", &["-e"]).await?;
        Ok(())
    }

    async fn write_root_file(&self, path: &str, content: &str) -> Result<()> {
        self.executor
            .run_checked(Invocation::new("tee", [path]).privileged(true).stdin(content))
            .await?;
        Ok(())
    }
}
