use std::path::Path;

use subburn_core::guard::{DeletePrompt, PromptAnswer};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Asks on the terminal. A Ctrl-C while waiting for the reply answers
/// `PromptAnswer::Interrupted`; end of input answers `No`.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

#[async_trait::async_trait]
impl DeletePrompt for TerminalPrompt {
    async fn confirm_delete(&self, path: &Path) -> PromptAnswer {
        let question = format!("\nDelete {}? [y/N] ", path.display());
        let mut stdout = tokio::io::stdout();
        if stdout.write_all(question.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return PromptAnswer::No;
        }

        let mut reply = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            _ = tokio::signal::ctrl_c() => PromptAnswer::Interrupted,
            read = stdin.read_line(&mut reply) => match read {
                Ok(0) | Err(_) => PromptAnswer::No,
                Ok(_) => PromptAnswer::from_reply(&reply),
            },
        }
    }
}
