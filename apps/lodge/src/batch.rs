//! Batch files: one submission per line.

use std::path::Path;

use anyhow::Context;
use clap::Parser;

use crate::app::Client;
use crate::cli::BatchLine;

/// Splits a line on whitespace, keeping `'…'` and `"…"` groups together.
///
/// Quotes do not nest and there are no escapes; a quote opened and never
/// closed is an error. Quoted pieces join adjacent text, so `a"b c"` is
/// the single word `ab c`.
pub fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("unmatched {q} in {line:?}"));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Summary of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub submitted: usize,
    pub failed: usize,
    /// Manual copy commands collected from every line.
    pub instructions: Vec<String>,
}

/// Submits every non-blank, non-comment line of `path`.
///
/// A line that cannot be parsed or submitted is logged and skipped.
pub async fn run(client: &Client, path: &Path) -> anyhow::Result<BatchReport> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut report = BatchReport::default();

    for (index, line) in content.lines().enumerate() {
        let number = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        tracing::debug!(line = number, "batch line: {line:?}");

        match submit_line(client, line).await {
            Ok(instructions) => {
                report.submitted += 1;
                report.instructions.extend(instructions);
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(line = number, "skipping batch line: {e:#}");
            }
        }
    }

    tracing::info!(
        submitted = report.submitted,
        failed = report.failed,
        "batch complete"
    );
    Ok(report)
}

async fn submit_line(client: &Client, line: &str) -> anyhow::Result<Vec<String>> {
    let tokens = tokenize(line).map_err(anyhow::Error::msg)?;
    let parsed = BatchLine::try_parse_from(tokens)?;
    let outcome = client.submit(&parsed.manifest).await?;
    Ok(outcome.instructions)
}
