use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{HarborError, Result};
use crate::executor::{CommandExecutor, Invocation};

const BREW: &str = "brew";

/// One row of `brew services list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrewServiceInfo {
    pub status: String,
    pub user: String,
}

impl BrewServiceInfo {
    pub fn runs_as_root(&self) -> bool {
        self.user == "root"
    }

    /// States in which a stop actually has something to stop.
    fn is_stoppable(&self) -> bool {
        matches!(self.status.as_str(), "started" | "error" | "unknown")
    }
}

/// Thin wrapper over the Homebrew CLI.
pub struct Brew<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> Brew<'a> {
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    pub async fn prefix(&self) -> Result<PathBuf> {
        let prefix = self.executor.capture(BREW, &["--prefix"], false).await?;
        if prefix.is_empty() {
            return Err(HarborError::Config(
                "`brew --prefix` returned nothing; is Homebrew installed?".to_string(),
            ));
        }
        Ok(PathBuf::from(prefix))
    }

    pub async fn list_formulas(&self) -> Result<Vec<String>> {
        let raw = self
            .executor
            .capture(BREW, &["list", "--formula"], false)
            .await?;
        Ok(raw.split_whitespace().map(str::to_string).collect())
    }

    /// First version reported by `brew list --versions <formula>`.
    pub async fn installed_version(&self, formula: &str) -> Result<Option<String>> {
        let line = self
            .executor
            .capture(BREW, &["list", "--versions", formula], false)
            .await?;
        Ok(line.split_whitespace().nth(1).map(str::to_string))
    }

    /// Status and owning user per formula. Runs privileged so services
    /// started as root are visible too.
    pub async fn services(&self) -> Result<HashMap<String, BrewServiceInfo>> {
        let raw = self
            .executor
            .capture(BREW, &["services", "list"], true)
            .await?;
        Ok(parse_services_list(&raw))
    }

    /// Stops `formula` unless it is known to be stopped already. Uses sudo
    /// when the service runs as root.
    pub async fn stop_service(
        &self,
        formula: &str,
        services: &HashMap<String, BrewServiceInfo>,
    ) -> Result<()> {
        let info = services.get(formula);
        if info.is_some_and(|info| !info.is_stoppable()) {
            debug!(formula, "Service not running, skipping stop");
            return Ok(());
        }

        let privileged = info.is_some_and(BrewServiceInfo::runs_as_root);
        debug!(formula, privileged, "Stopping service");
        self.executor
            .run_checked(Invocation::new(BREW, ["services", "stop", formula]).privileged(privileged))
            .await?;
        Ok(())
    }

    pub async fn restart_service(&self, formula: &str, privileged: bool) -> Result<()> {
        debug!(formula, privileged, "Restarting service");
        self.executor
            .run_checked(
                Invocation::new(BREW, ["services", "restart", formula]).privileged(privileged),
            )
            .await?;
        Ok(())
    }

    pub async fn install(&self, formulas: &[&str]) -> Result<()> {
        let mut args = vec!["install"];
        args.extend_from_slice(formulas);
        self.executor.run(BREW, &args).await?;
        Ok(())
    }
}

/// Parses `brew services list`: a header row, then `name status user ...`.
pub fn parse_services_list(raw: &str) -> HashMap<String, BrewServiceInfo> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let info = BrewServiceInfo {
                status: parts.next().unwrap_or_default().to_string(),
                user: parts.next().unwrap_or_default().to_string(),
            };
            Some((name.to_string(), info))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;

    const SERVICES: &str = "\
Name    Status  User File
caddy   started root /Library/LaunchDaemons/homebrew.mxcl.caddy.plist
dnsmasq started root /Library/LaunchDaemons/homebrew.mxcl.dnsmasq.plist
php     none
php@8.2 started alice ~/Library/LaunchAgents/homebrew.mxcl.php@8.2.plist
";

    #[test]
    fn parses_services_table() {
        let services = parse_services_list(SERVICES);
        assert_eq!(services.len(), 4);
        assert!(services["caddy"].runs_as_root());
        assert_eq!(services["php"].status, "none");
        assert_eq!(services["php"].user, "");
        assert_eq!(services["php@8.2"].user, "alice");
    }

    #[tokio::test]
    async fn installed_version_takes_first_column() {
        let executor = RecordingExecutor::new();
        executor.respond("brew list --versions php@8.2", "php@8.2 8.2.5 8.2.4\n");
        let brew = Brew::new(&executor);
        assert_eq!(
            brew.installed_version("php@8.2").await.unwrap().as_deref(),
            Some("8.2.5")
        );
        assert_eq!(brew.installed_version("php@7.4").await.unwrap(), None);
    }

    #[tokio::test]
    async fn stop_skips_stopped_and_escalates_for_root() {
        let executor = RecordingExecutor::new();
        let brew = Brew::new(&executor);
        let services = parse_services_list(SERVICES);

        brew.stop_service("php", &services).await.unwrap();
        assert!(executor.calls().is_empty());

        brew.stop_service("caddy", &services).await.unwrap();
        brew.stop_service("php@8.2", &services).await.unwrap();
        brew.stop_service("php@8.1", &services).await.unwrap();
        assert_eq!(
            executor.command_lines(),
            vec![
                "sudo brew services stop caddy",
                "brew services stop php@8.2",
                "brew services stop php@8.1",
            ]
        );
    }

    #[tokio::test]
    async fn empty_prefix_is_a_config_error() {
        let executor = RecordingExecutor::new();
        let err = Brew::new(&executor).prefix().await.unwrap_err();
        assert!(matches!(err, HarborError::Config(_)));
    }
}
