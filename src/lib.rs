pub mod brew;
pub mod clienv;
pub mod completions;
pub mod config;
pub mod dns;
pub mod domain;
pub mod error;
pub mod executor;
pub mod fsutil;
pub mod installer;
pub mod paths;
pub mod pf;
pub mod php;
pub mod proxy;
pub mod reconciler;
pub mod resolver;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, ConfigStore, LinkEntry, ProxyEntry, SiteEntry, SiteKind};
pub use error::{HarborError, Result};
pub use executor::{CommandExecutor, SystemExecutor};
pub use paths::HarborPaths;
pub use reconciler::SiteReconciler;
