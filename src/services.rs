use dialoguer::console::style;
use std::collections::BTreeSet;

use crate::brew::Brew;
use crate::config::Config;
use crate::error::Result;
use crate::executor::{CommandExecutor, Invocation};
use crate::reconciler::SiteReconciler;

/// launchd view of one brew service. Queried on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    pub running: bool,
    pub loaded: bool,
    pub pid: Option<u32>,
}

impl ServiceStatus {
    fn unloaded(name: &str) -> Self {
        Self {
            name: name.to_string(),
            running: false,
            loaded: false,
            pid: None,
        }
    }

    /// Parses `launchctl print` output for a service that exists.
    pub fn from_launchctl(name: &str, output: &str) -> Self {
        let mut status = Self {
            name: name.to_string(),
            running: false,
            loaded: true,
            pid: None,
        };
        for line in output.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "state" => status.running = value.trim() == "running",
                "pid" if status.pid.is_none() => status.pid = value.trim().parse().ok(),
                _ => {}
            }
        }
        status
    }

    pub fn format(&self) -> String {
        let mark = |ok: bool| {
            if ok {
                style("✔").green().to_string()
            } else {
                style("✘").red().to_string()
            }
        };
        let mut line = format!(
            "{:<15} Running: {}  Loaded: {}",
            self.name,
            mark(self.running),
            mark(self.loaded)
        );
        if let Some(pid) = self.pid {
            line.push_str(&format!("  PID: {pid}"));
        }
        line
    }
}

/// Formulas harbor depends on: caddy, dnsmasq, the default PHP and every
/// runtime backing an isolated pool.
pub async fn harbor_services(
    config: &Config,
    executor: &dyn CommandExecutor,
) -> Result<Vec<String>> {
    let mut services = vec!["caddy".to_string(), "dnsmasq".to_string()];
    if let Some(formula) = &config.php.formula {
        services.push(formula.clone());
    }

    let isolated = config.isolated_versions();
    if !isolated.is_empty() {
        let brew = Brew::new(executor);
        let mut seen: BTreeSet<String> = services.iter().cloned().collect();
        for formula in brew.list_formulas().await? {
            if formula != "php" && !formula.starts_with("php@") {
                continue;
            }
            let Some(version) = brew.installed_version(&formula).await? else {
                continue;
            };
            if isolated.contains(&version) && seen.insert(formula.clone()) {
                services.push(formula);
            }
        }
    }
    Ok(services)
}

pub async fn service_status(executor: &dyn CommandExecutor, formula: &str) -> Result<ServiceStatus> {
    let target = format!("system/homebrew.mxcl.{formula}");
    let output = executor
        .execute(&Invocation::new("launchctl", ["print", target.as_str()]))
        .await?;
    if output.success() {
        Ok(ServiceStatus::from_launchctl(formula, &output.stdout))
    } else {
        Ok(ServiceStatus::unloaded(formula))
    }
}

/// Restarts the harbor services that are not running, or every one of them
/// with `restart`. Returns the services that were (re)started.
pub async fn start_services(
    reconciler: &SiteReconciler,
    config: &Config,
    restart: bool,
) -> Result<Vec<String>> {
    let executor = reconciler.executor();
    let mut started = Vec::new();
    for name in harbor_services(config, executor).await? {
        if !restart && service_status(executor, &name).await?.running {
            continue;
        }
        match name.as_str() {
            "caddy" => reconciler.proxy().reload().await?,
            "dnsmasq" => reconciler.dns().reload().await?,
            formula => Brew::new(executor).restart_service(formula, true).await?,
        }
        started.push(name);
    }
    Ok(started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinkEntry, SiteEntry};
    use crate::testing::Fixture;
    use std::path::PathBuf;

    const LAUNCHCTL: &str = "\
system/homebrew.mxcl.caddy = {
\tactive count = 1
\tpath = /Library/LaunchDaemons/homebrew.mxcl.caddy.plist
\tstate = running
\tprogram = /opt/homebrew/opt/caddy/bin/caddy
\tpid = 412
}
";

    #[test]
    fn parses_launchctl_print() {
        let status = ServiceStatus::from_launchctl("caddy", LAUNCHCTL);
        assert!(status.running);
        assert!(status.loaded);
        assert_eq!(status.pid, Some(412));

        let stopped = ServiceStatus::from_launchctl("dnsmasq", "\tstate = not running\n");
        assert!(!stopped.running);
        assert_eq!(stopped.pid, None);
    }

    #[tokio::test]
    async fn failed_print_means_not_loaded() {
        let fx = Fixture::new();
        fx.executor.fail("launchctl print", 113, "Could not find service");
        let status = service_status(&*fx.executor, "caddy").await.unwrap();
        assert!(!status.loaded);
        assert!(!status.running);
    }

    #[tokio::test]
    async fn isolated_runtimes_are_included_once() {
        let fx = Fixture::new()
            .with_php(&[("php@8.2", "8.2.5"), ("php", "8.3.0")])
            .installed(Some(("php", "8.3.0")));
        let mut config = fx.config();
        for (host, version) in [("a.test", "8.2.5"), ("b.test", "8.2.5"), ("c.test", "8.3.0")] {
            config.sites.insert(
                host.into(),
                SiteEntry::Link(LinkEntry {
                    host: host.into(),
                    root: PathBuf::from("/srv"),
                    php_version: Some(version.into()),
                }),
            );
        }

        let services = harbor_services(&config, &*fx.executor).await.unwrap();
        assert_eq!(services, vec!["caddy", "dnsmasq", "php", "php@8.2"]);
    }

    #[tokio::test]
    async fn start_skips_running_services() {
        let fx = Fixture::new()
            .with_php(&[("php", "8.3.0")])
            .installed(Some(("php", "8.3.0")));
        fx.executor
            .respond("launchctl print system/homebrew.mxcl.caddy", LAUNCHCTL);
        let reconciler = fx.reconciler();

        let started = start_services(&reconciler, &fx.config(), false).await.unwrap();
        assert_eq!(started, vec!["dnsmasq", "php"]);
        assert!(!fx.executor.ran("brew services restart caddy"));
        let lines = fx.executor.command_lines();
        assert!(lines.contains(&"sudo brew services restart dnsmasq".to_string()));
        assert!(lines.contains(&"sudo brew services restart php".to_string()));

        let restarted = start_services(&reconciler, &fx.config(), true).await.unwrap();
        assert_eq!(restarted, vec!["caddy", "dnsmasq", "php"]);
        assert!(fx.executor.ran("brew services restart caddy"));
    }

    #[test]
    fn format_shows_pid() {
        let status = ServiceStatus::from_launchctl("caddy", LAUNCHCTL);
        let line = status.format();
        assert!(line.starts_with("caddy"));
        assert!(line.ends_with("PID: 412"));
    }
}
