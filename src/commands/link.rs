use std::path::{Path, PathBuf};

use dialoguer::console::style;
use harbor::{SiteKind, SiteReconciler};

use super::{current_dir, directory_label};

/// `<dir>/public` when it holds the front controller, otherwise `dir`.
fn site_root(dir: &Path) -> PathBuf {
    let public = dir.join("public");
    if public.join("index.php").is_file() {
        public
    } else {
        dir.to_path_buf()
    }
}

pub(crate) async fn cmd_link(reconciler: &SiteReconciler, domain: Option<String>) -> anyhow::Result<()> {
    let cwd = current_dir()?;
    let name = match domain {
        Some(domain) => domain,
        None => directory_label(&cwd)?,
    };

    let link = reconciler.provision_link(&name, site_root(&cwd)).await?;
    println!(
        "{} Linked {} to {}",
        style("✔").green(),
        style(format!("https://{}", link.host)).cyan(),
        link.root.display()
    );
    Ok(())
}

pub(crate) async fn cmd_unlink(reconciler: &SiteReconciler, domain: &str) -> anyhow::Result<()> {
    let removed = reconciler.teardown(domain, SiteKind::Link).await?;
    println!("{} Unlinked {}", style("✔").green(), removed.host());
    Ok(())
}
