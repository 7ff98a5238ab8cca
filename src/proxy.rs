//! Caddy site blocks and the Caddyfile directives that load them.

use tracing::{debug, info};

use crate::brew::Brew;
use crate::clienv;
use crate::config::SiteEntry;
use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::fsutil;
use crate::paths::HarborPaths;

const CADDY: &str = "caddy";
pub const HTTP_PORT: u16 = 51880;
pub const HTTPS_PORT: u16 = 51443;

pub struct ProxyConfigGenerator<'a> {
    paths: &'a HarborPaths,
    executor: &'a dyn CommandExecutor,
}

impl<'a> ProxyConfigGenerator<'a> {
    pub fn new(paths: &'a HarborPaths, executor: &'a dyn CommandExecutor) -> Self {
        Self { paths, executor }
    }

    /// Site block for `entry`. Link entries go through the shared php-fpm
    /// socket unless they are isolated on a version.
    pub fn render_vhost(&self, entry: &SiteEntry) -> String {
        match entry {
            SiteEntry::Link(link) => {
                let socket = self.paths.php_socket(link.php_version.as_deref());
                format!(
                    "{host} {{\n    root * {root}\n    php_fastcgi unix/{socket}\n    file_server\n    tls internal\n}}\n",
                    host = link.host,
                    root = link.root.display(),
                    socket = socket.display(),
                )
            }
            SiteEntry::Proxy(proxy) => format!(
                "{host} {{\n    reverse_proxy {target}\n    tls internal\n}}\n",
                host = proxy.host,
                target = proxy.target,
            ),
        }
    }

    pub async fn write_vhost(&self, entry: &SiteEntry) -> Result<bool> {
        let path = self.paths.vhost_file(entry.host());
        let changed = fsutil::write_if_changed(&path, &self.render_vhost(entry)).await?;
        debug!(host = entry.host(), changed, "Vhost written");
        Ok(changed)
    }

    pub async fn remove_vhost(&self, host: &str) -> Result<bool> {
        fsutil::remove_if_exists(&self.paths.vhost_file(host)).await
    }

    pub fn has_vhost(&self, host: &str) -> bool {
        self.paths.vhost_file(host).exists()
    }

    fn import_line(&self) -> String {
        format!("import {}/*.conf", self.paths.vhost_dir().display())
    }

    /// Adds the import of the vhost directory to the main Caddyfile, right
    /// after the global options block if there is one.
    pub async fn ensure_import(&self) -> Result<bool> {
        tokio::fs::create_dir_all(self.paths.vhost_dir()).await?;

        let caddyfile = self.paths.caddyfile();
        let current = fsutil::read_or_empty(&caddyfile).await?;
        let line = self.import_line();
        if current.lines().any(|l| l.trim() == line) {
            return Ok(false);
        }

        let updated = insert_directive(&current, &line);
        fsutil::write_if_changed(&caddyfile, &updated).await?;
        info!(path = %caddyfile.display(), "Added harbor import to Caddyfile");
        Ok(true)
    }

    pub async fn remove_import(&self) -> Result<bool> {
        let caddyfile = self.paths.caddyfile();
        let current = fsutil::read_or_empty(&caddyfile).await?;
        let line = self.import_line();
        if !current.lines().any(|l| l.trim() == line) {
            return Ok(false);
        }

        let updated = fsutil::remove_lines(&current, &[line.as_str()]);
        tokio::fs::write(&caddyfile, updated).await?;
        info!(path = %caddyfile.display(), "Removed harbor import from Caddyfile");
        Ok(true)
    }

    /// Moves Caddy to unprivileged ports; PF forwards 80/443 to them.
    pub async fn ensure_port_config(&self) -> Result<bool> {
        let caddyfile = self.paths.caddyfile();
        let current = fsutil::read_or_empty(&caddyfile).await?;
        if current.contains(&format!("http_port {HTTP_PORT}"))
            && current.contains(&format!("https_port {HTTPS_PORT}"))
        {
            return Ok(false);
        }

        let block = format!("{{\n  http_port {HTTP_PORT}\n  https_port {HTTPS_PORT}\n}}\n\n");
        fsutil::write_if_changed(&caddyfile, &format!("{block}{current}")).await?;
        info!("Added port block to Caddyfile");
        Ok(true)
    }

    /// Whether brew reports the caddy service as owned by root.
    pub async fn runs_as_root(&self) -> Result<bool> {
        let services = Brew::new(self.executor).services().await?;
        Ok(services.get(CADDY).is_some_and(|info| info.runs_as_root()))
    }

    /// Restarts Caddy as the current user. A root-owned instance is stopped
    /// first and its data directory handed back to the user.
    pub async fn reload(&self) -> Result<()> {
        let brew = Brew::new(self.executor);

        if self.runs_as_root().await? {
            info!("Caddy is running as root, moving it to the current user");
            self.executor
                .sudo_run("brew", &["services", "stop", CADDY])
                .await?;
            self.fix_data_ownership().await?;
        }

        brew.restart_service(CADDY, false).await
    }

    /// Keeps an existing root-owned setup as it is.
    pub async fn reload_as_root(&self) -> Result<()> {
        Brew::new(self.executor).restart_service(CADDY, true).await
    }

    async fn fix_data_ownership(&self) -> Result<()> {
        let data_dir = self.paths.caddy_data_dir();
        if !data_dir.exists() {
            return Ok(());
        }
        let owner = format!("{}:staff", clienv::current_user());
        let data_dir = data_dir.display().to_string();
        self.executor
            .sudo_run("chown", &["-R", &owner, &data_dir])
            .await?;
        Ok(())
    }
}

/// Places `line` after a leading global options block, or at the top.
/// Caddy only accepts the global block as the first thing in the file.
fn insert_directive(content: &str, line: &str) -> String {
    if content.trim().is_empty() {
        return format!("{line}\n");
    }

    let lines: Vec<&str> = content.lines().collect();
    let first = lines.iter().position(|l| !l.trim().is_empty()).unwrap_or(0);
    if lines[first].trim() != "{" {
        return format!("{line}\n\n{content}");
    }

    let mut depth = 0i64;
    let mut block_end = None;
    for (i, l) in lines.iter().enumerate().skip(first) {
        depth += l.matches('{').count() as i64 - l.matches('}').count() as i64;
        if depth <= 0 {
            block_end = Some(i);
            break;
        }
    }
    let Some(end) = block_end else {
        return format!("{line}\n\n{content}");
    };

    let head = lines[..=end].join("\n");
    let rest = lines[end + 1..].join("\n");
    let rest = rest.trim_start_matches(['\n', '\r']);
    if rest.trim().is_empty() {
        format!("{head}\n\n{line}\n")
    } else {
        format!("{head}\n\n{line}\n\n{rest}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinkEntry, ProxyEntry};
    use crate::testing::Fixture;
    use std::path::PathBuf;

    fn link(php: Option<&str>) -> SiteEntry {
        SiteEntry::Link(LinkEntry {
            host: "app.test".into(),
            root: PathBuf::from("/srv/app/public"),
            php_version: php.map(str::to_string),
        })
    }

    #[test]
    fn renders_link_and_proxy_blocks() {
        let fx = Fixture::new();
        let gen = ProxyConfigGenerator::new(&fx.paths, &*fx.executor);

        let socket = fx.paths.php_socket(None);
        assert_eq!(
            gen.render_vhost(&link(None)),
            format!(
                "app.test {{\n    root * /srv/app/public\n    php_fastcgi unix/{}\n    file_server\n    tls internal\n}}\n",
                socket.display()
            )
        );
        assert!(gen
            .render_vhost(&link(Some("8.2.5")))
            .contains("harbor-php-8.2.5.sock"));

        let proxy = SiteEntry::Proxy(ProxyEntry {
            host: "web.test".into(),
            target: "localhost:3000".into(),
        });
        assert_eq!(
            gen.render_vhost(&proxy),
            "web.test {\n    reverse_proxy localhost:3000\n    tls internal\n}\n"
        );
    }

    #[tokio::test]
    async fn vhost_write_is_idempotent() {
        let fx = Fixture::new();
        let gen = ProxyConfigGenerator::new(&fx.paths, &*fx.executor);

        assert!(gen.write_vhost(&link(None)).await.unwrap());
        assert!(!gen.write_vhost(&link(None)).await.unwrap());
        assert!(gen.write_vhost(&link(Some("8.2.5"))).await.unwrap());
        assert!(gen.has_vhost("app.test"));

        assert!(gen.remove_vhost("app.test").await.unwrap());
        assert!(!gen.remove_vhost("app.test").await.unwrap());
    }

    #[tokio::test]
    async fn caddyfile_directives_round_trip() {
        let fx = Fixture::new();
        let gen = ProxyConfigGenerator::new(&fx.paths, &*fx.executor);
        let caddyfile = fx.paths.caddyfile();
        std::fs::create_dir_all(caddyfile.parent().unwrap()).unwrap();
        std::fs::write(&caddyfile, "example.com {\n  respond \"hi\"\n}\n").unwrap();

        assert!(gen.ensure_port_config().await.unwrap());
        assert!(!gen.ensure_port_config().await.unwrap());
        assert!(gen.ensure_import().await.unwrap());
        assert!(!gen.ensure_import().await.unwrap());

        let content = fx.read(&caddyfile);
        assert!(content.starts_with("{\n  http_port 51880"));
        assert!(content.contains("}\n\nimport "));
        assert!(content.find("import ") < content.find("example.com"));
        assert_eq!(content.matches("import ").count(), 1);
        assert_eq!(content.matches("http_port 51880").count(), 1);

        assert!(gen.remove_import().await.unwrap());
        assert_eq!(
            fx.read(&caddyfile),
            "{\n  http_port 51880\n  https_port 51443\n}\n\nexample.com {\n  respond \"hi\"\n}\n"
        );
    }

    #[test]
    fn directive_goes_below_global_block() {
        let line = "import /h/caddy/*.conf";
        assert_eq!(insert_directive("", line), "import /h/caddy/*.conf\n");
        assert_eq!(
            insert_directive("site.com {\n}\n", line),
            "import /h/caddy/*.conf\n\nsite.com {\n}\n"
        );
        assert_eq!(
            insert_directive("{\n  http_port 51880\n  log {\n    level INFO\n  }\n}\n", line),
            "{\n  http_port 51880\n  log {\n    level INFO\n  }\n}\n\nimport /h/caddy/*.conf\n"
        );
        assert_eq!(
            insert_directive("\n{\n  https_port 51443\n}\n\n\nsite.com {\n}\n", line),
            "\n{\n  https_port 51443\n}\n\nimport /h/caddy/*.conf\n\nsite.com {\n}\n"
        );
    }

    #[tokio::test]
    async fn reimport_after_uninstall_keeps_global_block_first() {
        let fx = Fixture::new();
        let gen = ProxyConfigGenerator::new(&fx.paths, &*fx.executor);
        let caddyfile = fx.paths.caddyfile();
        std::fs::create_dir_all(caddyfile.parent().unwrap()).unwrap();

        gen.ensure_import().await.unwrap();
        gen.ensure_port_config().await.unwrap();
        gen.remove_import().await.unwrap();
        gen.ensure_import().await.unwrap();

        let content = fx.read(&caddyfile);
        assert!(content.starts_with("{\n  http_port 51880"));
        assert!(content.ends_with(&format!("}}\n\n{}\n", gen.import_line())));
    }

    #[tokio::test]
    async fn reload_moves_root_caddy_to_user() {
        let fx = Fixture::new();
        fx.executor.respond(
            "brew services list",
            "Name Status User File\ncaddy started root /Library/LaunchDaemons/x.plist\n",
        );
        std::fs::create_dir_all(fx.paths.caddy_data_dir()).unwrap();

        ProxyConfigGenerator::new(&fx.paths, &*fx.executor)
            .reload()
            .await
            .unwrap();

        let lines = fx.executor.command_lines();
        assert_eq!(lines[0], "sudo brew services list");
        assert_eq!(lines[1], "sudo brew services stop caddy");
        assert!(lines[2].starts_with("sudo chown -R "));
        assert_eq!(lines[3], "brew services restart caddy");
    }

    #[tokio::test]
    async fn reload_user_caddy_just_restarts() {
        let fx = Fixture::new();
        ProxyConfigGenerator::new(&fx.paths, &*fx.executor)
            .reload()
            .await
            .unwrap();
        assert_eq!(
            fx.executor.command_lines(),
            vec!["sudo brew services list", "brew services restart caddy"]
        );
    }
}
