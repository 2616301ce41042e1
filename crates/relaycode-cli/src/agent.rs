use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

/// The full event protocol consumed from the agent subprocess, one JSON
/// object per stdout line. Unknown lines are dropped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Init {
        #[serde(default)]
        model: String,
        #[serde(default)]
        tools: Vec<String>,
    },
    ThinkingDelta {
        text: String,
    },
    TextDelta {
        text: String,
    },
    Text {
        text: String,
    },
    ToolCall {
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        content: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        is_image: bool,
    },
    Result {
        #[serde(default)]
        turns: u32,
        #[serde(default)]
        duration_ms: u64,
        #[serde(default)]
        cost_usd: Option<f64>,
        #[serde(default)]
        text: String,
    },
}

pub struct AgentClient {
    child: Child,
    stdin: ChildStdin,
}

impl AgentClient {
    pub fn spawn(agent_cmd: &str, args: &[String]) -> Result<(Self, Receiver<AgentEvent>)> {
        let mut cmd = Command::new(agent_cmd);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow!("Failed to start agent '{agent_cmd}': {e}"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Failed to open agent stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to open agent stdout"))?;

        let (event_tx, event_rx) = mpsc::channel();
        Self::start_reader_thread(stdout, event_tx);

        Ok((Self { child, stdin }, event_rx))
    }

    fn start_reader_thread(stdout: ChildStdout, event_tx: Sender<AgentEvent>) {
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines().flatten() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<AgentEvent>(trimmed) {
                    Ok(event) => {
                        if event_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("skipping unparseable agent line: {e}");
                    }
                }
            }
        });
    }

    pub fn send_prompt(&mut self, text: &str) -> Result<()> {
        let request = json!({ "type": "prompt", "text": text });
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.flush()?;
        Ok(())
    }

    pub fn shutdown(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
