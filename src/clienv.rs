use std::path::PathBuf;

#[derive(Debug, Clone, Copy)]
pub enum EnvVar {
    HarborConfigDir,
    HarborResolverDir,
    HarborBrewPrefix,
    HarborLog,
    RustLog,
}

impl EnvVar {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HarborConfigDir => "HARBOR_CONFIG_DIR",
            Self::HarborResolverDir => "HARBOR_RESOLVER_DIR",
            Self::HarborBrewPrefix => "HARBOR_BREW_PREFIX",
            Self::HarborLog => "HARBOR_LOG",
            Self::RustLog => "RUST_LOG",
        }
    }
}

pub const APP_NAME: &str = "harbor";
const FALLBACK_HOME_DIR: &str = "~";
const DEFAULT_RESOLVER_DIR: &str = "/etc/resolver";
const DEFAULT_LOG_FILTER: &str = "warn";

/// Non-empty value of an environment variable.
fn env_opt(var: EnvVar) -> Option<String> {
    std::env::var(var.as_str())
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Harbor home and config directory ($HARBOR_CONFIG_DIR or ~/.config/harbor)
pub fn config_dir() -> PathBuf {
    let dir = env_opt(EnvVar::HarborConfigDir)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from(FALLBACK_HOME_DIR))
                .join(".config")
                .join(APP_NAME)
        });
    tracing::trace!(dir = %dir.display(), "Resolved config directory");
    dir
}

/// OS resolver-stub directory ($HARBOR_RESOLVER_DIR or /etc/resolver)
pub fn resolver_dir() -> PathBuf {
    let dir = env_opt(EnvVar::HarborResolverDir)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RESOLVER_DIR));
    tracing::trace!(dir = %dir.display(), "Resolved resolver directory");
    dir
}

/// Homebrew prefix override ($HARBOR_BREW_PREFIX)
pub fn brew_prefix_override() -> Option<PathBuf> {
    let val = env_opt(EnvVar::HarborBrewPrefix).map(PathBuf::from);
    tracing::trace!(value = ?val, "HARBOR_BREW_PREFIX env var");
    val
}

/// Log filter directive ($HARBOR_LOG, then $RUST_LOG, then "warn")
pub fn log_filter() -> String {
    env_opt(EnvVar::HarborLog)
        .or_else(|| env_opt(EnvVar::RustLog))
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

pub fn is_macos() -> bool {
    cfg!(target_os = "macos")
}

/// Login name used as the php-fpm pool owner.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "nobody".to_string())
}

/// Whether the process already runs with root privileges.
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}
