pub(crate) mod completions;
pub(crate) mod install;
pub(crate) mod isolate;
pub(crate) mod link;
pub(crate) mod open;
pub(crate) mod php;
pub(crate) mod proxy;
pub(crate) mod services;
pub(crate) mod sites;
pub(crate) mod tld;

use std::path::Path;

use anyhow::Context;
use harbor::domain;

/// Site label derived from a directory name.
pub(crate) fn directory_label(dir: &Path) -> anyhow::Result<String> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Cannot derive a site name from the root directory")?;
    let label = domain::sanitize_label(&name);
    if label.is_empty() {
        anyhow::bail!("Cannot derive a site name from \"{name}\", pass a domain explicitly");
    }
    Ok(label)
}

pub(crate) fn current_dir() -> anyhow::Result<std::path::PathBuf> {
    std::env::current_dir().context("Failed to read the current directory")
}
