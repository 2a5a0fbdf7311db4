//! Interactive channel selection on stdin.

use std::io::{self, BufRead, Write};

use super::delay::{normalize_channel, ChannelError};

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("prompt I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<String> {
    write!(output, "{}", question)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_lowercase())
}

/// Ask whether to filter and, if so, which channel.
///
/// Returns `None` for "no filter". A channel missing from `available` is an error.
pub fn prompt_channel<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    available: &[String],
) -> Result<Option<String>, PromptError> {
    let answer = ask(input, output, "Apply a channel filter? (yes/no): ")?;
    if !matches!(answer.as_str(), "yes" | "y") {
        return Ok(None);
    }

    let numbers: Vec<&str> = available
        .iter()
        .map(|c| c.strip_prefix("channel-").unwrap_or(c))
        .collect();
    writeln!(output, "Available channels: {}", numbers.join(", "))?;

    let answer = ask(input, output, "Channel number (e.g. 0, 122, 208): ")?;
    let channel = normalize_channel(&answer)?;
    if !available.contains(&channel) {
        return Err(ChannelError::Unknown(channel).into());
    }
    Ok(Some(channel))
}
