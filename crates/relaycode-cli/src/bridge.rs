use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::io::Write;
use std::process::{Command, Stdio};

/// A message pulled from the bridge, e.g. a chat message relayed from a
/// phone. `origin` names the transport ("signal", "telegram", ...).
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub text: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

pub trait MessageSource {
    fn poll(&mut self) -> Result<Vec<InboundMessage>>;
}

pub trait MessageSink {
    fn deliver(&mut self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Command(String),
    Prompt(String),
}

/// Leading slash marks a local command; everything else goes to the agent.
pub fn classify(line: &str) -> Dispatch {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix('/') {
        Dispatch::Command(rest.to_string())
    } else {
        Dispatch::Prompt(trimmed.to_string())
    }
}

/// Polls by running a configured shell command; stdout must be a JSON
/// array of messages. Empty output means nothing new.
pub struct CommandSource {
    command: String,
}

impl CommandSource {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

impl MessageSource for CommandSource {
    fn poll(&mut self) -> Result<Vec<InboundMessage>> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .with_context(|| format!("failed to run poll command '{}'", self.command))?;
        if !output.status.success() {
            return Err(anyhow!(
                "poll command '{}' exited with {}",
                self.command,
                output.status
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let body = stdout.trim();
        if body.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(body).context("poll command produced invalid JSON")
    }
}

/// Delivers by piping the reply text to a configured shell command's stdin.
pub struct CommandSink {
    command: String,
}

impl CommandSink {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

impl MessageSink for CommandSink {
    fn deliver(&mut self, text: &str) -> Result<()> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to run sink command '{}'", self.command))?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(text.as_bytes())?;
        }
        drop(child.stdin.take());
        let status = child.wait()?;
        if !status.success() {
            return Err(anyhow!(
                "sink command '{}' exited with {}",
                self.command,
                status
            ));
        }
        Ok(())
    }
}

pub struct NullSource;

impl MessageSource for NullSource {
    fn poll(&mut self) -> Result<Vec<InboundMessage>> {
        Ok(Vec::new())
    }
}

pub struct NullSink;

impl MessageSink for NullSink {
    fn deliver(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_lines_are_commands() {
        assert_eq!(classify("/quit"), Dispatch::Command("quit".to_string()));
        assert_eq!(classify("  /help  "), Dispatch::Command("help".to_string()));
    }

    #[test]
    fn other_lines_are_prompts() {
        assert_eq!(
            classify("fix the bug"),
            Dispatch::Prompt("fix the bug".to_string())
        );
    }

    #[test]
    fn inbound_messages_tolerate_missing_fields() {
        let msg: InboundMessage = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.origin, "");
        assert!(msg.sender.is_none());
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn command_source_parses_a_json_array() {
        let mut src = CommandSource::new(
            r#"printf '[{"text":"hello","origin":"signal","sender":"ana"}]'"#.to_string(),
        );
        let messages = src.poll().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hello");
        assert_eq!(messages[0].origin, "signal");
        assert_eq!(messages[0].sender.as_deref(), Some("ana"));
    }

    #[test]
    fn command_source_treats_empty_output_as_no_messages() {
        let mut src = CommandSource::new("true".to_string());
        assert!(src.poll().unwrap().is_empty());
    }

    #[test]
    fn command_source_surfaces_failures() {
        let mut src = CommandSource::new("false".to_string());
        assert!(src.poll().is_err());
    }

    #[test]
    fn command_sink_reports_exit_status() {
        let mut ok = CommandSink::new("cat > /dev/null".to_string());
        assert!(ok.deliver("reply").is_ok());
        let mut bad = CommandSink::new("false".to_string());
        assert!(bad.deliver("reply").is_err());
    }

    #[test]
    fn null_endpoints_are_inert() {
        assert!(NullSource.poll().unwrap().is_empty());
        NullSink.deliver("x").unwrap();
    }
}
