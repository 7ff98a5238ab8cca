use harbor::completions::{generate_completions, CompletionShell};

use crate::args::Cli;

pub(crate) fn cmd_completions(shell: CompletionShell) {
    generate_completions::<Cli>(shell, harbor::clienv::APP_NAME);
}
