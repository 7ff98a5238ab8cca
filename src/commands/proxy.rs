use dialoguer::console::style;
use harbor::{SiteKind, SiteReconciler};

pub(crate) async fn cmd_proxy(
    reconciler: &SiteReconciler,
    domain: &str,
    target: &str,
) -> anyhow::Result<()> {
    let entry = reconciler.provision_proxy(domain, target).await?;
    println!(
        "{} Proxying {} to {}",
        style("✔").green(),
        style(format!("https://{}", entry.host)).cyan(),
        entry.target
    );
    Ok(())
}

pub(crate) async fn cmd_unproxy(reconciler: &SiteReconciler, domain: &str) -> anyhow::Result<()> {
    let removed = reconciler.teardown(domain, SiteKind::Proxy).await?;
    println!("{} Removed proxy {}", style("✔").green(), removed.host());
    Ok(())
}
