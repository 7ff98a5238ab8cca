use dialoguer::console::style;
use dialoguer::{theme::ColorfulTheme, Select};
use harbor::php::{PhpCandidate, PhpSelection};
use harbor::{HarborError, SiteReconciler};

use super::current_dir;

pub(crate) async fn cmd_isolate(
    reconciler: &SiteReconciler,
    domain: Option<String>,
    version: Option<String>,
) -> anyhow::Result<()> {
    let config = reconciler.installed_config()?;
    let host = match domain {
        Some(domain) => domain,
        None => {
            let cwd = current_dir()?;
            config
                .find_link_by_root(&cwd)
                .map(|link| link.host.clone())
                .ok_or_else(|| HarborError::not_found("link", cwd.display().to_string()))?
        }
    };

    let installed = reconciler.php().list_installed().await?;
    let selection = match version {
        Some(version) => PhpSelection::resolve(&version, &installed)?,
        None => prompt_selection(&host, &installed)?,
    };

    let changed = reconciler.isolate(&host, &selection).await?;
    let label = match &selection {
        PhpSelection::Default => "the default PHP".to_string(),
        PhpSelection::Version(candidate) => format!("PHP {}", candidate.version),
    };
    if changed {
        println!("{} {} now uses {}", style("✔").green(), host, style(label).cyan());
    } else {
        println!("{} already uses {}", host, label);
    }
    Ok(())
}

fn prompt_selection(host: &str, installed: &[PhpCandidate]) -> anyhow::Result<PhpSelection> {
    if installed.is_empty() {
        anyhow::bail!("No PHP versions installed. Install one with `brew install php`");
    }

    let mut items = vec!["Default (shared pool)".to_string()];
    items.extend(installed.iter().map(|c| format!("PHP {} ({})", c.version, c.formula)));

    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("PHP version for {host}"))
        .items(&items)
        .default(0)
        .interact()?;

    Ok(match index {
        0 => PhpSelection::Default,
        i => PhpSelection::Version(installed[i - 1].clone()),
    })
}
