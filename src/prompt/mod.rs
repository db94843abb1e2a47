use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use crate::traits::Acknowledger;

/// Asks the person at the terminal. Reads happen on a blocking thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

#[async_trait]
impl Acknowledger for ConsolePrompt {
    async fn acknowledge(&self, prompt: &str) -> Result<()> {
        self.ask(prompt).await.map(|_| ())
    }

    async fn ask(&self, prompt: &str) -> Result<String> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            read_answer(&mut stdin.lock(), &mut stdout.lock(), &prompt)
        })
        .await
        .context("console prompt panicked")?
    }
}

/// Writes `prompt` and reads one line. End of input is an error: nobody is
/// left to answer.
fn read_answer(input: &mut impl BufRead, output: &mut impl Write, prompt: &str) -> Result<String> {
    write!(output, "{prompt} ")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("input closed while waiting for: {prompt}");
    }
    Ok(line.trim().to_string())
}

#[cfg(test)]
pub use scripted::ScriptedAcknowledger;
