use harbor::{domain, HarborError, SiteReconciler};

use super::{current_dir, directory_label};

pub(crate) async fn cmd_open(reconciler: &SiteReconciler, domain: Option<String>) -> anyhow::Result<()> {
    let config = reconciler.installed_config()?;
    let name = match domain {
        Some(domain) => domain,
        None => directory_label(&current_dir()?)?,
    };
    let host = domain::normalize(&name, &config.default_suffix)?;

    if !config.sites.contains_key(&host) {
        if config.sites.is_empty() {
            eprintln!("No sites are configured yet");
        } else {
            eprintln!("Known sites:");
            for known in config.sites.keys() {
                eprintln!("  {known}");
            }
        }
        return Err(HarborError::not_found("site", host).into());
    }

    let url = format!("https://{host}");
    tracing::debug!(url = %url, "Opening site");
    reconciler.executor().run("open", &[url.as_str()]).await?;
    Ok(())
}
