//! Test doubles: a command recorder and a temp-dir backed harbor layout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::{Config, ConfigStore};
use crate::error::Result;
use crate::executor::{CommandExecutor, CommandOutput, Invocation};
use crate::paths::HarborPaths;
use crate::reconciler::SiteReconciler;

/// Records every invocation and answers from scripted rules.
///
/// A rule matches when the invocation's command line starts with its
/// prefix; the longest matching prefix wins. Unmatched commands succeed
/// with empty output.
#[derive(Default)]
pub(crate) struct RecordingExecutor {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<Invocation>>,
}

impl RecordingExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, prefix: &str, stdout: &str) {
        self.rule(prefix, CommandOutput::ok(stdout));
    }

    pub(crate) fn fail(&self, prefix: &str, exit_code: i32, stderr: &str) {
        self.rule(prefix, CommandOutput::failed(exit_code, stderr));
    }

    fn rule(&self, prefix: &str, output: CommandOutput) {
        let mut rules = self.rules.lock().unwrap();
        rules.retain(|(p, _)| p != prefix);
        rules.push((prefix.to_string(), output));
    }

    pub(crate) fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines in call order, `sudo ` prefixed when privileged.
    pub(crate) fn command_lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|inv| {
                if inv.privileged {
                    format!("sudo {}", inv.command_line())
                } else {
                    inv.command_line()
                }
            })
            .collect()
    }

    pub(crate) fn ran(&self, prefix: &str) -> bool {
        self.calls()
            .iter()
            .any(|inv| inv.command_line().starts_with(prefix))
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|inv| inv.command_line().starts_with(prefix))
            .count()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        let line = invocation.command_line();
        let rules = self.rules.lock().unwrap();
        let output = rules
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""));
        Ok(output)
    }
}

/// A complete harbor layout under one temp dir with a recording executor.
pub(crate) struct Fixture {
    pub(crate) dir: tempfile::TempDir,
    pub(crate) paths: HarborPaths,
    pub(crate) store: ConfigStore,
    pub(crate) executor: Arc<RecordingExecutor>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = HarborPaths::new(
            dir.path().join("home"),
            dir.path().join("resolver"),
            dir.path().join("brew"),
        );
        let store = ConfigStore::new(paths.config_file());
        Self {
            dir,
            paths,
            store,
            executor: Arc::new(RecordingExecutor::new()),
        }
    }

    /// Scripts brew so that `formulas` (name, version) are installed, and
    /// lays down the distribution `www.conf` for each.
    pub(crate) fn with_php(self, formulas: &[(&str, &str)]) -> Self {
        let names: Vec<&str> = formulas.iter().map(|(name, _)| *name).collect();
        let mut listing = vec!["caddy", "dnsmasq"];
        listing.extend(&names);
        self.executor
            .respond("brew list --formula", &listing.join("\n"));

        for (name, version) in formulas {
            self.executor.respond(
                &format!("brew list --versions {name}"),
                &format!("{name} {version}\n"),
            );
            let pool_dir = self.paths.php_pool_dir(version);
            std::fs::create_dir_all(&pool_dir).unwrap();
            std::fs::write(pool_dir.join("www.conf"), "[www]\nlisten = 127.0.0.1:9000\n").unwrap();
        }
        self
    }

    /// Marks harbor installed with `php` as the default runtime.
    pub(crate) fn installed(self, default_php: Option<(&str, &str)>) -> Self {
        self.store
            .mutate(|c| {
                c.install_marker = Some("0.0.0-test".into());
                if let Some((formula, version)) = default_php {
                    c.php.formula = Some(formula.into());
                    c.php.version = Some(version.into());
                }
                Ok(())
            })
            .unwrap();
        self
    }

    pub(crate) fn config(&self) -> Config {
        self.store.load().unwrap()
    }

    pub(crate) fn reconciler(&self) -> SiteReconciler {
        SiteReconciler::new(
            self.paths.clone(),
            self.store.clone(),
            self.executor.clone(),
        )
    }

    pub(crate) fn root(&self, name: &str) -> PathBuf {
        let root = self.dir.path().join("sites").join(name);
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    pub(crate) fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path).unwrap_or_default()
    }
}
