//! Idempotent file helpers shared by the generators.
//!
//! Every add/remove here is safe to repeat: writes are skipped when the
//! content is unchanged and removing a missing file is a no-op. Files under
//! root-owned directories fall back to `sudo install` / `sudo rm`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, trace};

use crate::error::{HarborError, Result};
use crate::executor::{CommandExecutor, Invocation};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// File content, or an empty string if the file does not exist.
pub async fn read_or_empty(path: &Path) -> Result<String> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

/// Writes `content` unless the file already holds it (ignoring surrounding
/// whitespace). Returns whether the file changed.
pub async fn write_if_changed(path: &Path, content: &str) -> Result<bool> {
    match fs::read_to_string(path).await {
        Ok(existing) if existing.trim() == content.trim() => {
            trace!(path = %path.display(), "File unchanged, skipping write");
            return Ok(false);
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, content).await?;
    debug!(path = %path.display(), "Wrote file");
    Ok(true)
}

/// Returns whether a file was actually removed.
pub async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed file");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Like [`write_if_changed`], but escalates through `sudo install -m 644`
/// when the destination is not writable by the current user.
pub async fn write_privileged(
    executor: &dyn CommandExecutor,
    path: &Path,
    content: &str,
) -> Result<bool> {
    match write_if_changed(path, content).await {
        Err(HarborError::Io(e)) if e.kind() == ErrorKind::PermissionDenied => {}
        other => return other,
    }

    debug!(path = %path.display(), "Destination not writable, installing with sudo");
    let tmp = temp_path(path);
    fs::write(&tmp, content).await?;

    let result = install_with_sudo(executor, &tmp, path).await;
    let _ = fs::remove_file(&tmp).await;
    result.map(|_| true)
}

async fn install_with_sudo(executor: &dyn CommandExecutor, tmp: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        executor
            .run_checked(
                Invocation::new("mkdir", ["-p".to_string(), parent.display().to_string()])
                    .privileged(true),
            )
            .await?;
    }
    executor
        .run_checked(
            Invocation::new(
                "install",
                [
                    "-m".to_string(),
                    "644".to_string(),
                    tmp.display().to_string(),
                    dest.display().to_string(),
                ],
            )
            .privileged(true),
        )
        .await?;
    Ok(())
}

/// Like [`remove_if_exists`], but escalates through `sudo rm -f` when the
/// parent directory is root-owned.
pub async fn remove_privileged(executor: &dyn CommandExecutor, path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed file");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            executor
                .run_checked(
                    Invocation::new("rm", ["-f".to_string(), path.display().to_string()])
                        .privileged(true),
                )
                .await?;
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}

/// Removes every line equal to one of `lines`, then collapses the blank
/// runs that leaves behind. Always ends with a single newline.
pub fn remove_lines(content: &str, lines: &[&str]) -> String {
    let kept: Vec<&str> = content
        .lines()
        .filter(|line| !lines.contains(&line.trim_end_matches('\r')))
        .collect();

    let mut out = String::new();
    let mut blank_run = 0;
    for line in kept {
        if line.trim().is_empty() {
            blank_run += 1;
            // Leading blank lines and anything past one blank line are dropped.
            if out.is_empty() || blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    let trimmed = out.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

fn temp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("harbor-{}-{n}-{name}", std::process::id()))
}
