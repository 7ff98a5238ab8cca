use clap::{Parser, Subcommand};
use harbor::completions::CompletionShell;

#[derive(Parser)]
#[command(name = "harbor")]
#[command(version)]
#[command(about = "Local development domains for PHP sites and reverse proxies", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Install caddy and dnsmasq and wire them up for local domains
    Install {
        /// Default top-level domain for new sites
        #[arg(long, default_value = "test")]
        tld: String,
    },

    /// Remove every site and all harbor configuration
    Uninstall,

    /// Serve the current directory as a PHP site
    Link {
        /// Site name or full domain (defaults to the directory name)
        domain: Option<String>,
    },

    /// Remove a linked site
    Unlink {
        domain: String,
    },

    /// Reverse-proxy a domain to a local port
    Proxy {
        /// Site name or full domain
        domain: String,

        /// Upstream, e.g. localhost:3000 or http://localhost:3000
        target: String,
    },

    /// Remove a proxied site
    Unproxy {
        domain: String,
    },

    /// List linked and proxied sites
    Sites,

    /// Pin a linked site to a specific PHP version
    Isolate {
        /// Site name or full domain (defaults to the site linked from here)
        domain: Option<String>,

        /// PHP version, e.g. 8.2, php@8.2 or "default"
        version: Option<String>,
    },

    /// Choose the default PHP version
    Php,

    /// Change the default top-level domain and migrate existing sites
    Tld {
        tld: String,
    },

    /// Start harbor's services
    Start {
        /// Restart services that are already running
        #[arg(short, long)]
        restart: bool,
    },

    /// Show the state of harbor's services
    Status,

    /// Open a site in the browser
    Open {
        /// Site name or full domain (defaults to the directory name)
        domain: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

impl Commands {
    /// Commands that run before `harbor install` has completed.
    pub(crate) fn skips_install_gate(&self) -> bool {
        matches!(self, Self::Install { .. } | Self::Completions { .. })
    }
}
