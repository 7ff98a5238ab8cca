use tracing::{debug, info};

use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::fsutil;
use crate::paths::HarborPaths;

const DNSMASQ: &str = "dnsmasq";

/// Per-host address records for dnsmasq, plus the `conf-dir` directive that
/// makes dnsmasq read them.
pub struct DnsZoneGenerator<'a> {
    paths: &'a HarborPaths,
    executor: &'a dyn CommandExecutor,
}

impl<'a> DnsZoneGenerator<'a> {
    pub fn new(paths: &'a HarborPaths, executor: &'a dyn CommandExecutor) -> Self {
        Self { paths, executor }
    }

    pub fn render_record(host: &str, address: &str) -> String {
        format!("address=/{host}/{address}\n")
    }

    fn import_line(&self) -> String {
        format!("conf-dir={}/,*.conf", self.paths.dns_dir().display())
    }

    pub async fn add_record(&self, host: &str, address: &str) -> Result<bool> {
        let path = self.paths.dns_file(host);
        let changed = fsutil::write_if_changed(&path, &Self::render_record(host, address)).await?;
        debug!(host, changed, "DNS record written");
        Ok(changed)
    }

    pub async fn remove_record(&self, host: &str) -> Result<bool> {
        fsutil::remove_if_exists(&self.paths.dns_file(host)).await
    }

    pub fn has_record(&self, host: &str) -> bool {
        self.paths.dns_file(host).exists()
    }

    /// Appends the `conf-dir` directive to the main dnsmasq config once.
    pub async fn ensure_import(&self) -> Result<bool> {
        tokio::fs::create_dir_all(self.paths.dns_dir()).await?;

        let conf = self.paths.dnsmasq_conf();
        let current = fsutil::read_or_empty(&conf).await?;
        let line = self.import_line();
        if current.lines().any(|l| l.trim() == line) {
            return Ok(false);
        }

        let mut updated = current.trim_end().to_string();
        if !updated.is_empty() {
            updated.push_str("\n\n");
        }
        updated.push_str(&line);
        updated.push('\n');
        fsutil::write_privileged(self.executor, &conf, &updated).await?;
        info!(path = %conf.display(), "Added harbor import to dnsmasq config");
        Ok(true)
    }

    pub async fn remove_import(&self) -> Result<bool> {
        let conf = self.paths.dnsmasq_conf();
        let current = fsutil::read_or_empty(&conf).await?;
        let line = self.import_line();
        if !current.lines().any(|l| l.trim() == line) {
            return Ok(false);
        }
        let updated = fsutil::remove_lines(&current, &[line.as_str()]);
        fsutil::write_privileged(self.executor, &conf, &updated).await?;
        info!(path = %conf.display(), "Removed harbor import from dnsmasq config");
        Ok(true)
    }

    /// dnsmasq binds port 53 and therefore always runs as root.
    pub async fn reload(&self) -> Result<()> {
        debug!("Restarting dnsmasq");
        self.executor
            .sudo_run("brew", &["services", "restart", DNSMASQ])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn record_lifecycle() {
        let fx = Fixture::new();
        let dns = DnsZoneGenerator::new(&fx.paths, &*fx.executor);

        assert!(dns.add_record("app.test", "127.0.0.1").await.unwrap());
        assert!(!dns.add_record("app.test", "127.0.0.1").await.unwrap());
        assert_eq!(
            fx.read(&fx.paths.dns_file("app.test")),
            "address=/app.test/127.0.0.1\n"
        );

        assert!(dns.remove_record("app.test").await.unwrap());
        assert!(!dns.remove_record("app.test").await.unwrap());
        assert!(!dns.has_record("app.test"));
    }

    #[tokio::test]
    async fn import_is_added_once_and_removed_cleanly() {
        let fx = Fixture::new();
        let dns = DnsZoneGenerator::new(&fx.paths, &*fx.executor);
        let conf = fx.paths.dnsmasq_conf();
        std::fs::create_dir_all(conf.parent().unwrap()).unwrap();
        std::fs::write(&conf, "# upstream\nport=53\n").unwrap();

        assert!(dns.ensure_import().await.unwrap());
        assert!(!dns.ensure_import().await.unwrap());
        let content = fx.read(&conf);
        assert_eq!(content.matches("conf-dir=").count(), 1);
        assert!(content.starts_with("# upstream\nport=53\n\nconf-dir="));

        assert!(dns.remove_import().await.unwrap());
        assert_eq!(fx.read(&conf), "# upstream\nport=53\n");
    }

    #[tokio::test]
    async fn reload_restarts_privileged() {
        let fx = Fixture::new();
        DnsZoneGenerator::new(&fx.paths, &*fx.executor)
            .reload()
            .await
            .unwrap();
        assert_eq!(
            fx.executor.command_lines(),
            vec!["sudo brew services restart dnsmasq"]
        );
    }
}
