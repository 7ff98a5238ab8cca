use dialoguer::console::style;
use dialoguer::{theme::ColorfulTheme, Select};
use harbor::SiteReconciler;

pub(crate) async fn cmd_php(reconciler: &SiteReconciler) -> anyhow::Result<()> {
    let config = reconciler.installed_config()?;
    let php = reconciler.php();
    let installed = php.list_installed().await?;

    match installed.as_slice() {
        [] => {
            println!("No PHP versions installed. Install one with `brew install php`");
            return Ok(());
        }
        [only] => {
            println!("Only PHP {} ({}) is installed", only.version, only.formula);
            return Ok(());
        }
        _ => {}
    }

    let current = config.php.version.as_deref();
    let items: Vec<String> = installed
        .iter()
        .map(|c| {
            if Some(c.version.as_str()) == current {
                format!("PHP {} ({}) [current]", c.version, c.formula)
            } else {
                format!("PHP {} ({})", c.version, c.formula)
            }
        })
        .collect();
    let default_index = installed
        .iter()
        .position(|c| Some(c.version.as_str()) == current)
        .unwrap_or(0);

    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Default PHP version")
        .items(&items)
        .default(default_index)
        .interact()?;
    let selected = &installed[index];

    if php.switch_default(&config, selected).await? {
        println!(
            "{} Default PHP is now {}",
            style("✔").green(),
            style(&selected.version).cyan()
        );
    } else {
        println!("PHP {} is already the default", selected.version);
    }
    Ok(())
}
