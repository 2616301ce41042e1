use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::event::{self, Event};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

mod adapter;
mod agent;
mod bridge;
mod constants;
mod display;
mod input;
mod markdown;
mod wrap;

use adapter::{TurnRenderer, TurnStatus};
use agent::{AgentClient, AgentEvent};
use bridge::{classify, CommandSink, CommandSource, Dispatch, MessageSink, MessageSource, NullSink, NullSource};
use constants::style;
use constants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_WIDTH, INPUT_POLL_MS, SPINNER_INTERVAL_MS};
use display::Display;
use input::{Editor, InputAction};

#[derive(Parser, Debug)]
#[command(name = "relaycode", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Agent subprocess to drive.
    #[arg(short, long, default_value = "agent")]
    agent: String,

    /// Extra argument passed to the agent, repeatable.
    #[arg(long = "agent-arg")]
    agent_args: Vec<String>,

    /// Shell command polled for inbound messages (JSON array on stdout).
    #[arg(long)]
    source_cmd: Option<String>,

    /// Shell command replies are piped to.
    #[arg(long)]
    sink_cmd: Option<String>,

    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_interval_ms: u64,

    /// Override the detected terminal width.
    #[arg(long)]
    width: Option<usize>,

    /// Run a single prompt and exit instead of the interactive loop.
    #[arg(long)]
    prompt: Option<String>,

    #[arg(long)]
    log_file: Option<PathBuf>,
}

struct Pending {
    text: String,
    from_bridge: bool,
}

/// Turn in flight: renderer, whether the reply goes back over the bridge,
/// and whether any agent output has arrived yet.
type ActiveTurn = (TurnRenderer, bool, bool);

#[derive(Debug, PartialEq, Eq)]
enum AgentFeed {
    Open,
    Closed,
}

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

fn set_panic_hook() {
    let default = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        default(info);
    }));
}

fn init_logging(cli: &Cli) -> Result<()> {
    let Some(path) = &cli.log_file else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn terminal_width(cli: &Cli) -> usize {
    cli.width.unwrap_or_else(|| {
        crossterm::terminal::size()
            .map(|(cols, _)| cols as usize)
            .unwrap_or(DEFAULT_WIDTH)
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let (mut client, event_rx) = AgentClient::spawn(&cli.agent, &cli.agent_args)?;
    let result = if let Some(prompt) = cli.prompt.clone() {
        run_once(&cli, &mut client, &event_rx, &prompt)
    } else {
        run_interactive(&cli, &mut client, &event_rx)
    };
    client.shutdown();
    result
}

fn run_once(
    cli: &Cli,
    client: &mut AgentClient,
    event_rx: &Receiver<AgentEvent>,
    prompt: &str,
) -> Result<()> {
    let width = terminal_width(cli);
    let mut display = Display::new(io::stdout(), width);
    display.set_prompt(String::new());

    client.send_prompt(prompt)?;
    let mut turn = TurnRenderer::new(width);
    let mut finished = false;
    for ev in event_rx.iter() {
        if let TurnStatus::Finished { .. } = turn.handle_event(ev, &mut display)? {
            finished = true;
            break;
        }
    }
    display.clear_dynamic()?;
    if !finished {
        return Err(anyhow!("agent exited before finishing the turn"));
    }
    Ok(())
}

/// Drain everything the agent has produced. A disconnected channel means
/// the subprocess is gone: report it, release the turn, and tell the caller
/// the feed is dead.
fn pump_agent_events<W: io::Write>(
    event_rx: &Receiver<AgentEvent>,
    active: &mut Option<ActiveTurn>,
    display: &mut Display<W>,
    sink: &mut dyn MessageSink,
) -> Result<AgentFeed> {
    loop {
        match event_rx.try_recv() {
            Ok(ev) => {
                let Some((turn, from_bridge, started)) = active.as_mut() else {
                    tracing::debug!("dropping agent event outside a turn");
                    continue;
                };
                if !*started {
                    *started = true;
                    display.clear_spinner()?;
                }
                if let TurnStatus::Finished { text } = turn.handle_event(ev, display)? {
                    if *from_bridge && !text.is_empty() {
                        if let Err(e) = sink.deliver(&text) {
                            tracing::warn!("delivery failed: {e:#}");
                            display.write_permanent(&format!(
                                "{}reply delivery failed: {e:#}{}",
                                style::RED,
                                style::RESET
                            ))?;
                        }
                    }
                    *active = None;
                }
            }
            Err(TryRecvError::Empty) => return Ok(AgentFeed::Open),
            Err(TryRecvError::Disconnected) => {
                tracing::error!("agent event stream closed");
                display.clear_spinner()?;
                let message = if active.take().is_some() {
                    "agent exited before finishing the turn"
                } else {
                    "agent exited"
                };
                display.write_permanent(&format!(
                    "{}{}{}",
                    style::RED,
                    message,
                    style::RESET
                ))?;
                return Ok(AgentFeed::Closed);
            }
        }
    }
}

fn run_interactive(
    cli: &Cli,
    client: &mut AgentClient,
    event_rx: &Receiver<AgentEvent>,
) -> Result<()> {
    let mut source: Box<dyn MessageSource> = match &cli.source_cmd {
        Some(cmd) => Box::new(CommandSource::new(cmd.clone())),
        None => Box::new(NullSource),
    };
    let mut sink: Box<dyn MessageSink> = match &cli.sink_cmd {
        Some(cmd) => Box::new(CommandSink::new(cmd.clone())),
        None => Box::new(NullSink),
    };

    let term_flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, term_flag.clone())?;

    set_panic_hook();
    enable_raw_mode()?;
    let _guard = RawModeGuard;

    let width = terminal_width(cli);
    let mut display = Display::new(io::stdout(), width);
    let mut editor = Editor::new();

    display.write_permanent(&format!(
        "{}relaycode {}{} {}agent: {}{}",
        style::BOLD,
        env!("CARGO_PKG_VERSION"),
        style::RESET,
        style::DIM,
        cli.agent,
        style::RESET
    ))?;
    display.redraw_prompt()?;

    let mut queue: VecDeque<Pending> = VecDeque::new();
    let mut active: Option<ActiveTurn> = None;

    let spin_interval = Duration::from_millis(SPINNER_INTERVAL_MS);
    let poll_interval = Duration::from_millis(cli.poll_interval_ms);
    let mut next_spin = Instant::now() + spin_interval;
    let mut next_poll = Instant::now();

    'outer: loop {
        if term_flag.load(Ordering::Relaxed) {
            break;
        }

        let feed = pump_agent_events(event_rx, &mut active, &mut display, sink.as_mut())?;
        if feed == AgentFeed::Closed {
            break;
        }

        if active.is_none() {
            if let Some(pending) = queue.pop_front() {
                client.send_prompt(&pending.text)?;
                active = Some((TurnRenderer::new(width), pending.from_bridge, false));
                display.start_spinner()?;
            }
        }

        let now = Instant::now();
        if now >= next_spin {
            display.tick_spinner()?;
            next_spin = now + spin_interval;
        }

        if now >= next_poll {
            match source.poll() {
                Ok(messages) => {
                    for msg in messages {
                        let who = match &msg.sender {
                            Some(sender) => format!("{} via {}", sender, label(&msg.origin)),
                            None => label(&msg.origin).to_string(),
                        };
                        display.write_permanent(&format!(
                            "{}[{}]{} {}",
                            style::YELLOW,
                            who,
                            style::RESET,
                            msg.text
                        ))?;
                        queue.push_back(Pending {
                            text: msg.text,
                            from_bridge: true,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("poll failed: {e:#}");
                    display.write_permanent(&format!(
                        "{}poll failed: {e:#}{}",
                        style::RED,
                        style::RESET
                    ))?;
                }
            }
            next_poll = Instant::now() + poll_interval;
        }

        if event::poll(Duration::from_millis(INPUT_POLL_MS))? {
            if let Event::Key(key) = event::read()? {
                match editor.handle_key(key) {
                    InputAction::None => {}
                    InputAction::Edited => {
                        display.set_prompt(editor.prompt_line(display.width()));
                        display.redraw_prompt()?;
                    }
                    InputAction::Line(line) => {
                        display.set_prompt(editor.prompt_line(display.width()));
                        match classify(&line) {
                            Dispatch::Command(cmd) => {
                                if !run_command(&cmd, &mut display)? {
                                    break 'outer;
                                }
                            }
                            Dispatch::Prompt(text) => {
                                display.write_permanent(&format!(
                                    "{}> {}{}",
                                    style::DIM,
                                    text,
                                    style::RESET
                                ))?;
                                queue.push_back(Pending {
                                    text,
                                    from_bridge: false,
                                });
                                // Wake the bridge poll instead of waiting out
                                // the interval.
                                next_poll = Instant::now();
                            }
                        }
                        display.redraw_prompt()?;
                    }
                    InputAction::Interrupt | InputAction::Eof => break 'outer,
                }
            }
        }
    }

    display.clear_dynamic()?;
    Ok(())
}

/// Returns false when the command asks to quit.
fn run_command<W: io::Write>(cmd: &str, display: &mut Display<W>) -> Result<bool> {
    match cmd.split_whitespace().next().unwrap_or("") {
        "quit" | "exit" | "q" => Ok(false),
        "help" => {
            display.write_permanent(&format!(
                "{}/help  show this message\n/quit  exit{}",
                style::DIM,
                style::RESET
            ))?;
            Ok(true)
        }
        other => {
            display.write_permanent(&format!(
                "{}unknown command: /{}{}",
                style::RED,
                other,
                style::RESET
            ))?;
            Ok(true)
        }
    }
}

fn label(origin: &str) -> &str {
    if origin.is_empty() {
        "bridge"
    } else {
        origin
    }
}
