use dialoguer::console::style;
use harbor::SiteReconciler;

pub(crate) fn cmd_sites(reconciler: &SiteReconciler) -> anyhow::Result<()> {
    let config = reconciler.installed_config()?;
    if config.sites.is_empty() {
        println!("No sites yet. Run `harbor link` in a project directory or `harbor proxy <domain> <target>`");
        return Ok(());
    }

    let links: Vec<_> = config.links().collect();
    let proxies: Vec<_> = config.proxies().collect();

    if !links.is_empty() {
        println!("{}", style("Links").bold());
        for link in &links {
            let mut line = format!(
                "  {:<30} {}",
                style(&link.host).cyan(),
                link.root.display()
            );
            if let Some(version) = &link.php_version {
                line.push_str(&format!("  {}", style(format!("PHP {version}")).yellow()));
            }
            println!("{line}");
        }
    }

    if !proxies.is_empty() {
        if !links.is_empty() {
            println!();
        }
        println!("{}", style("Proxies").bold());
        for proxy in &proxies {
            println!("  {:<30} {}", style(&proxy.host).cyan(), proxy.target);
        }
    }

    println!();
    println!(
        "{}",
        style(format!(
            "{} sites ({} links, {} proxies)",
            config.sites.len(),
            links.len(),
            proxies.len()
        ))
        .dim()
    );
    Ok(())
}
