use dialoguer::console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use harbor::installer::Installer;
use harbor::SiteReconciler;

pub(crate) async fn cmd_install(reconciler: &SiteReconciler, tld: &str) -> anyhow::Result<()> {
    let summary = Installer::new(reconciler).install(tld).await?;

    println!("{} Harbor installed", style("✔").green());
    println!("  Sites will be served under {}", style(format!(".{}", summary.suffix)).cyan());
    match summary.php {
        Some(version) => println!("  Default PHP: {}", style(version).cyan()),
        None => println!(
            "  {}",
            style("No PHP found. Install one with `brew install php` and run `harbor php`").yellow()
        ),
    }
    Ok(())
}

pub(crate) async fn cmd_uninstall(reconciler: &SiteReconciler) -> anyhow::Result<()> {
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Remove every harbor site and all harbor configuration?")
        .default(false)
        .interact()?;
    if !confirmed {
        println!("Cancelled");
        return Ok(());
    }

    Installer::new(reconciler).uninstall().await?;
    println!("{} Harbor uninstalled", style("✔").green());
    println!(
        "  {}",
        style("caddy and dnsmasq are still installed. Remove them with `brew uninstall caddy dnsmasq`").dim()
    );
    Ok(())
}
