pub const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];
pub const SPINNER_INTERVAL_MS: u64 = 80;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const INPUT_POLL_MS: u64 = 10;

pub const DEFAULT_WIDTH: usize = 80;
pub const WRAP_INDENT: usize = 2;
pub const DIVIDER_WIDTH: usize = 40;

pub const PROMPT_PREFIX: &str = "> ";
pub const CONTINUATION_PREFIX: &str = ".. ";

pub const LINK_TEXT_LOOKAHEAD: usize = 200;
pub const LINK_URL_LOOKAHEAD: usize = 500;

pub const TOOL_SUMMARY_MAX: usize = 150;
pub const TOOL_RESULT_MAX_LINES: usize = 5;
pub const THINKING_DOT_EVERY: usize = 100;
pub const THINKING_PREVIEW_LINES: usize = 3;

pub mod style {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const ITALIC: &str = "\x1b[3m";
    pub const UNDERLINE: &str = "\x1b[4m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const MAGENTA: &str = "\x1b[35m";
    pub const CYAN: &str = "\x1b[36m";
}
