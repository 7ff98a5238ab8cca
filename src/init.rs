use std::sync::Arc;

use anyhow::Context;
use harbor::{clienv, ConfigStore, HarborPaths, SiteReconciler, SystemExecutor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub(crate) fn init_logging() {
    let filter = EnvFilter::try_new(clienv::log_filter()).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Wires the real executor, discovered paths and the config store together.
pub(crate) async fn build_reconciler() -> anyhow::Result<SiteReconciler> {
    let executor = Arc::new(SystemExecutor::new());
    let paths = HarborPaths::discover(&*executor)
        .await
        .context("Failed to locate the Homebrew prefix")?;
    tracing::debug!(
        home = %paths.home().display(),
        brew = %paths.brew_prefix().display(),
        "Resolved harbor paths"
    );
    let store = ConfigStore::new(paths.config_file());
    Ok(SiteReconciler::new(paths, store, executor))
}

pub(crate) fn ensure_macos() -> anyhow::Result<()> {
    if !clienv::is_macos() {
        anyhow::bail!("{} only supports macOS", clienv::APP_NAME);
    }
    Ok(())
}
