use dialoguer::console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use harbor::SiteReconciler;

pub(crate) async fn cmd_tld(reconciler: &SiteReconciler, tld: &str) -> anyhow::Result<()> {
    let (old_suffix, new_suffix) = reconciler.set_default_suffix(tld)?;
    println!(
        "{} New sites will use {}",
        style("✔").green(),
        style(format!(".{new_suffix}")).cyan()
    );
    if old_suffix == new_suffix {
        return Ok(());
    }

    let hosts = reconciler.store().load()?.hosts_with_suffix(&old_suffix);
    if hosts.is_empty() {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Move {} existing .{old_suffix} site(s) to .{new_suffix}?",
            hosts.len()
        ))
        .default(true)
        .interact()?;
    if !confirmed {
        println!("Existing sites keep .{old_suffix}");
        return Ok(());
    }

    let report = reconciler.migrate_sites(&old_suffix, &new_suffix).await?;
    for site in &report.sites {
        match &site.result {
            Ok(host) => println!("  {} {} -> {}", style("✔").green(), site.from, host),
            Err(e) => println!("  {} {}: {}", style("✘").red(), site.from, e),
        }
    }
    println!(
        "{}",
        style(format!("{} migrated, {} failed", report.succeeded(), report.failed())).dim()
    );
    if report.failed() > 0 {
        anyhow::bail!("{} site(s) could not be migrated", report.failed());
    }
    Ok(())
}
