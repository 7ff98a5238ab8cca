use dialoguer::console::style;
use harbor::services::{harbor_services, service_status, start_services};
use harbor::SiteReconciler;

pub(crate) async fn cmd_start(reconciler: &SiteReconciler, restart: bool) -> anyhow::Result<()> {
    let config = reconciler.installed_config()?;
    let started = start_services(reconciler, &config, restart).await?;
    if started.is_empty() {
        println!("{} All services are already running", style("✔").green());
    } else {
        for name in &started {
            println!("{} Started {}", style("✔").green(), name);
        }
    }
    Ok(())
}

pub(crate) async fn cmd_status(reconciler: &SiteReconciler) -> anyhow::Result<()> {
    let config = reconciler.installed_config()?;
    let executor = reconciler.executor();

    let mut healthy = true;
    for name in harbor_services(&config, executor).await? {
        let status = service_status(executor, &name).await?;
        healthy &= status.running;
        println!("{}", status.format());
    }

    println!();
    if healthy {
        println!("{}", style("All services are running").green());
    } else {
        println!("{}", style("Some services are not running. Run `harbor start`").yellow());
    }
    Ok(())
}
