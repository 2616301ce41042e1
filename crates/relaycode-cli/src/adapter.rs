use std::io::{self, Write};

use serde_json::Value;

use crate::agent::AgentEvent;
use crate::constants::style;
use crate::constants::{
    THINKING_DOT_EVERY, THINKING_PREVIEW_LINES, TOOL_RESULT_MAX_LINES, TOOL_SUMMARY_MAX,
    WRAP_INDENT,
};
use crate::display::Display;
use crate::markdown::MarkdownRenderer;
use crate::wrap::Wrapper;

pub enum TurnStatus {
    Continue,
    Finished { text: String },
}

/// Renders one agent turn onto the display. Owns the turn's incremental
/// markdown state and the running wrap column, plus the thinking-span
/// accumulator that is discarded once the span closes.
pub struct TurnRenderer {
    md: MarkdownRenderer,
    wrapper: Wrapper,
    width: usize,
    column: usize,
    thinking_open: bool,
    thinking_text: String,
    dots: usize,
}

impl TurnRenderer {
    pub fn new(width: usize) -> Self {
        Self {
            md: MarkdownRenderer::new(),
            wrapper: Wrapper::new(width, WRAP_INDENT),
            width,
            column: 0,
            thinking_open: false,
            thinking_text: String::new(),
            dots: 0,
        }
    }

    pub fn handle_event<W: Write>(
        &mut self,
        event: AgentEvent,
        display: &mut Display<W>,
    ) -> io::Result<TurnStatus> {
        match event {
            AgentEvent::Init { model, tools } => {
                let header = format!(
                    "{}{}{} {}({} tools){}",
                    style::BOLD,
                    model,
                    style::RESET,
                    style::DIM,
                    tools.len(),
                    style::RESET
                );
                display.write_permanent(&header)?;
                Ok(TurnStatus::Continue)
            }
            AgentEvent::ThinkingDelta { text } => {
                if !self.thinking_open {
                    self.thinking_open = true;
                    display.write_permanent(&format!(
                        "{}* thinking{}",
                        style::MAGENTA,
                        style::RESET
                    ))?;
                }
                self.thinking_text.push_str(&text);
                while self.thinking_text.chars().count() >= (self.dots + 1) * THINKING_DOT_EVERY {
                    self.dots += 1;
                    // Stop at the right edge; a wrapped dot line would break
                    // the cursor restore on the next streaming write.
                    if self.dots >= self.width {
                        continue;
                    }
                    let dot = format!("{}.{}", style::DIM, style::RESET);
                    display.write_streaming(&dot, self.dots)?;
                }
                Ok(TurnStatus::Continue)
            }
            AgentEvent::ToolCall { name, input } => {
                self.close_thinking(display)?;
                let summary = summarize_tool_input(&name, &input);
                display.write_permanent(&format!(
                    "{}» {}{} {}{}{}",
                    style::BOLD,
                    name,
                    style::RESET,
                    style::DIM,
                    summary,
                    style::RESET
                ))?;
                Ok(TurnStatus::Continue)
            }
            AgentEvent::ToolResult {
                content,
                is_error,
                is_image,
            } => {
                self.close_thinking(display)?;
                if is_image {
                    display.write_permanent(&format!(
                        "  {}[image result]{}",
                        style::DIM,
                        style::RESET
                    ))?;
                    return Ok(TurnStatus::Continue);
                }
                let color = if is_error { style::RED } else { style::DIM };
                let total = content.lines().count();
                for line in content.lines().take(TOOL_RESULT_MAX_LINES) {
                    display.write_permanent(&format!("  {}{}{}", color, line, style::RESET))?;
                }
                if total > TOOL_RESULT_MAX_LINES {
                    display.write_permanent(&format!(
                        "  {}… (+{} lines){}",
                        style::DIM,
                        total - TOOL_RESULT_MAX_LINES,
                        style::RESET
                    ))?;
                }
                Ok(TurnStatus::Continue)
            }
            AgentEvent::TextDelta { text } => {
                self.close_thinking(display)?;
                let styled = self.md.push(&text);
                if styled.is_empty() {
                    return Ok(TurnStatus::Continue);
                }
                if !display.stream_open() {
                    self.column = 0;
                }
                let (wrapped, col) = self.wrapper.wrap(&styled, self.column);
                self.column = col;
                display.write_streaming(&wrapped, col)?;
                Ok(TurnStatus::Continue)
            }
            AgentEvent::Text { text } => {
                self.close_thinking(display)?;
                let mut block = MarkdownRenderer::new();
                let mut styled = block.push(&text);
                styled.push_str(&block.flush());
                let (wrapped, _) = self.wrapper.wrap(&styled, 0);
                display.write_permanent(&wrapped)?;
                Ok(TurnStatus::Continue)
            }
            AgentEvent::Result {
                turns,
                duration_ms,
                cost_usd,
                text,
            } => {
                self.close_thinking(display)?;
                let tail = self.md.flush();
                if !tail.is_empty() {
                    if !display.stream_open() {
                        self.column = 0;
                    }
                    let (wrapped, col) = self.wrapper.wrap(&tail, self.column);
                    self.column = col;
                    display.write_streaming(&wrapped, col)?;
                }
                let mut summary = format!(
                    "{} turn{} · {:.1}s",
                    turns,
                    if turns == 1 { "" } else { "s" },
                    duration_ms as f64 / 1000.0
                );
                if let Some(cost) = cost_usd {
                    summary.push_str(&format!(" · ${:.4}", cost));
                }
                display.write_permanent(&format!(
                    "{}+{} {}{}{}",
                    style::GREEN,
                    style::RESET,
                    style::DIM,
                    summary,
                    style::RESET
                ))?;
                Ok(TurnStatus::Finished { text })
            }
        }
    }

    fn close_thinking<W: Write>(&mut self, display: &mut Display<W>) -> io::Result<()> {
        if !self.thinking_open {
            return Ok(());
        }
        let chars = self.thinking_text.chars().count();
        let lines = self.thinking_text.lines().count();
        display.write_permanent(&format!(
            "{}  thought for {} chars over {} line{}{}",
            style::DIM,
            chars,
            lines,
            if lines == 1 { "" } else { "s" },
            style::RESET
        ))?;
        for line in self
            .thinking_text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(THINKING_PREVIEW_LINES)
        {
            display.write_permanent(&format!("  {}{}{}", style::DIM, line, style::RESET))?;
        }
        self.thinking_text.clear();
        self.thinking_open = false;
        self.dots = 0;
        Ok(())
    }
}

fn summarize_tool_input(name: &str, input: &Value) -> String {
    let picked = match name.to_ascii_lowercase().as_str() {
        "bash" | "shell" | "run_command" => input.get("command").and_then(Value::as_str),
        "read" | "write" | "edit" | "multi_edit" => input
            .get("file_path")
            .or_else(|| input.get("path"))
            .and_then(Value::as_str),
        "grep" | "glob" => input.get("pattern").and_then(Value::as_str),
        "web_fetch" => input.get("url").and_then(Value::as_str),
        "web_search" => input.get("query").and_then(Value::as_str),
        _ => input.as_object().and_then(|map| {
            map.values()
                .filter_map(Value::as_str)
                .find(|s| !s.trim().is_empty())
        }),
    };
    let summary = match picked {
        Some(s) => s.to_string(),
        None => serde_json::to_string(input).unwrap_or_default(),
    };
    truncate_chars(&summary.replace('\n', " "), TOOL_SUMMARY_MAX)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn display() -> Display<Vec<u8>> {
        Display::new(Vec::new(), 80)
    }

    fn drain(d: &mut Display<Vec<u8>>) -> String {
        String::from_utf8(std::mem::take(d.out_mut())).unwrap()
    }

    #[test]
    fn shell_commands_summarize_to_the_command() {
        let s = summarize_tool_input("bash", &json!({ "command": "cargo build" }));
        assert_eq!(s, "cargo build");
    }

    #[test]
    fn file_tools_summarize_to_the_path() {
        let s = summarize_tool_input("read", &json!({ "file_path": "/tmp/x.rs" }));
        assert_eq!(s, "/tmp/x.rs");
    }

    #[test]
    fn pattern_tools_summarize_to_the_pattern() {
        let s = summarize_tool_input("grep", &json!({ "pattern": "fn main" }));
        assert_eq!(s, "fn main");
    }

    #[test]
    fn unknown_tools_pick_first_non_empty_string_field() {
        let s = summarize_tool_input("mcp__thing", &json!({ "a": "", "b": "value" }));
        assert_eq!(s, "value");
    }

    #[test]
    fn fallback_is_compact_json_truncated() {
        let s = summarize_tool_input("custom", &json!({ "n": 4 }));
        assert_eq!(s, "{\"n\":4}");
        let long = "x".repeat(400);
        let s = summarize_tool_input("bash", &json!({ "command": long }));
        assert_eq!(s.chars().count(), TOOL_SUMMARY_MAX + 1);
        assert!(s.ends_with('…'));
    }

    #[test]
    fn thinking_emits_marker_then_dots_then_summary() {
        let mut d = display();
        let mut turn = TurnRenderer::new(80);
        let chunk = "x".repeat(THINKING_DOT_EVERY);
        turn.handle_event(
            AgentEvent::ThinkingDelta {
                text: chunk.clone(),
            },
            &mut d,
        )
        .unwrap();
        let bytes = drain(&mut d);
        assert!(bytes.contains("* thinking"));
        assert_eq!(bytes.matches(&format!("{}.{}", style::DIM, style::RESET)).count(), 1);

        turn.handle_event(AgentEvent::ThinkingDelta { text: chunk }, &mut d)
            .unwrap();
        turn.handle_event(
            AgentEvent::ToolCall {
                name: "bash".into(),
                input: json!({ "command": "ls" }),
            },
            &mut d,
        )
        .unwrap();
        let bytes = drain(&mut d);
        assert!(bytes.contains("thought for 200 chars"));
        assert!(bytes.contains("» bash"));
        assert!(!turn.thinking_open);
    }

    #[test]
    fn thinking_dots_stop_at_the_right_edge() {
        let mut d = display();
        let width = 10;
        let mut turn = TurnRenderer::new(width);
        let chunk = "x".repeat(THINKING_DOT_EVERY * (width + 3));
        turn.handle_event(AgentEvent::ThinkingDelta { text: chunk }, &mut d)
            .unwrap();
        let bytes = drain(&mut d);
        let dot = format!("{}.{}", style::DIM, style::RESET);
        // Dot number `width` would land past the last column and wrap.
        assert_eq!(bytes.matches(&dot).count(), width - 1);
        assert_eq!(turn.dots, width + 3);
    }

    #[test]
    fn tool_results_cap_at_five_lines() {
        let mut d = display();
        let mut turn = TurnRenderer::new(80);
        let content = (1..=8).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n");
        turn.handle_event(
            AgentEvent::ToolResult {
                content,
                is_error: false,
                is_image: false,
            },
            &mut d,
        )
        .unwrap();
        let bytes = drain(&mut d);
        assert!(bytes.contains("l5"));
        assert!(!bytes.contains("l6"));
        assert!(bytes.contains("(+3 lines)"));
    }

    #[test]
    fn error_results_use_the_error_style() {
        let mut d = display();
        let mut turn = TurnRenderer::new(80);
        turn.handle_event(
            AgentEvent::ToolResult {
                content: "boom".into(),
                is_error: true,
                is_image: false,
            },
            &mut d,
        )
        .unwrap();
        let bytes = drain(&mut d);
        assert!(bytes.contains(&format!("{}boom", style::RED)));
    }

    #[test]
    fn image_results_show_a_marker() {
        let mut d = display();
        let mut turn = TurnRenderer::new(80);
        turn.handle_event(
            AgentEvent::ToolResult {
                content: String::new(),
                is_error: false,
                is_image: true,
            },
            &mut d,
        )
        .unwrap();
        assert!(drain(&mut d).contains("[image result]"));
    }

    #[test]
    fn result_flushes_buffered_markdown_and_finishes() {
        let mut d = display();
        let mut turn = TurnRenderer::new(80);
        turn.handle_event(
            AgentEvent::TextDelta {
                text: "**bo".into(),
            },
            &mut d,
        )
        .unwrap();
        drain(&mut d);
        let status = turn
            .handle_event(
                AgentEvent::Result {
                    turns: 1,
                    duration_ms: 2300,
                    cost_usd: Some(0.0123),
                    text: "final".into(),
                },
                &mut d,
            )
            .unwrap();
        let bytes = drain(&mut d);
        assert!(bytes.contains("1 turn · 2.3s · $0.0123"));
        assert!(matches!(status, TurnStatus::Finished { ref text } if text == "final"));
    }

    #[test]
    fn block_text_is_rendered_permanently_in_one_shot() {
        let mut d = display();
        let mut turn = TurnRenderer::new(80);
        turn.handle_event(
            AgentEvent::Text {
                text: "**bold**".into(),
            },
            &mut d,
        )
        .unwrap();
        let bytes = drain(&mut d);
        assert!(bytes.contains(&format!("{}bold{}", style::BOLD, style::RESET)));
    }
}
