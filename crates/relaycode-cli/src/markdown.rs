use crate::constants::style;
use crate::constants::{DIVIDER_WIDTH, LINK_TEXT_LOOKAHEAD, LINK_URL_LOOKAHEAD};

/// Incremental markdown-to-ANSI renderer. Text arrives in arbitrary chunks;
/// any construct whose full extent is not yet decidable stays in `pending`
/// and is re-examined on the next push, so output never depends on where
/// chunk boundaries fall.
pub struct MarkdownRenderer {
    pending: String,
    bold: bool,
    italic: bool,
    in_header: bool,
    in_inline_code: bool,
    in_fenced_block: bool,
    fence_char: char,
    fence_width: usize,
    at_line_start: bool,
}

enum HrScan {
    Rule(usize),
    NotRule,
    NeedMore,
}

enum LinkScan {
    Link {
        text_end: usize,
        url_start: usize,
        url_end: usize,
    },
    Literal,
    Hold,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self {
            pending: String::new(),
            bold: false,
            italic: false,
            in_header: false,
            in_inline_code: false,
            in_fenced_block: false,
            fence_char: '`',
            fence_width: 0,
            at_line_start: true,
        }
    }

    pub fn push(&mut self, chunk: &str) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.push_str(chunk);
        let chars: Vec<char> = input.chars().collect();
        self.scan(&chars, false)
    }

    /// Force out whatever is buffered and close any open style. Leaves the
    /// renderer in its initial state.
    pub fn flush(&mut self) -> String {
        let input = std::mem::take(&mut self.pending);
        let chars: Vec<char> = input.chars().collect();
        let mut out = self.scan(&chars, true);
        if self.bold
            || self.italic
            || self.in_header
            || self.in_inline_code
            || self.in_fenced_block
        {
            out.push_str(style::RESET);
        }
        *self = Self::new();
        out
    }

    fn scan(&mut self, chars: &[char], finishing: bool) -> String {
        let len = chars.len();
        let mut out = String::with_capacity(len + 16);
        let mut i = 0;
        let mut held: Option<usize> = None;

        while i < len {
            let c = chars[i];

            if self.in_fenced_block {
                if self.at_line_start && c == self.fence_char {
                    let run = run_len(chars, i, c);
                    if i + run == len && !finishing {
                        held = Some(i);
                        break;
                    }
                    if run >= self.fence_width {
                        match newline_from(chars, i + run) {
                            None if !finishing => {
                                held = Some(i);
                                break;
                            }
                            None => {
                                if chars[i + run..].iter().all(|ch| *ch == ' ') {
                                    out.push_str(style::RESET);
                                    self.reassert_styles(&mut out);
                                    self.close_fence();
                                    i = len;
                                    continue;
                                }
                            }
                            Some(nl) => {
                                if chars[i + run..nl].iter().all(|ch| *ch == ' ') {
                                    out.push_str(style::RESET);
                                    self.reassert_styles(&mut out);
                                    self.close_fence();
                                    i = nl + 1;
                                    self.at_line_start = true;
                                    continue;
                                }
                            }
                        }
                    }
                    // Not a closing fence: the run is ordinary block content.
                    for _ in 0..run {
                        out.push(c);
                    }
                    i += run;
                    self.at_line_start = false;
                    continue;
                }
                out.push(c);
                self.at_line_start = c == '\n';
                i += 1;
                continue;
            }

            if self.in_inline_code {
                if c == '`' {
                    out.push_str(style::RESET);
                    self.in_inline_code = false;
                    self.reassert_styles(&mut out);
                    self.at_line_start = false;
                } else {
                    out.push(c);
                    self.at_line_start = c == '\n';
                }
                i += 1;
                continue;
            }

            if self.at_line_start {
                match c {
                    '`' | '~' => {
                        let run = run_len(chars, i, c);
                        if i + run == len && !finishing {
                            held = Some(i);
                            break;
                        }
                        if run >= 3 {
                            match newline_from(chars, i + run) {
                                None if !finishing => {
                                    held = Some(i);
                                    break;
                                }
                                end => {
                                    // Opening fence; the info string is dropped.
                                    self.in_fenced_block = true;
                                    self.fence_char = c;
                                    self.fence_width = run;
                                    out.push_str(style::DIM);
                                    i = end.map(|nl| nl + 1).unwrap_or(len);
                                    self.at_line_start = true;
                                    continue;
                                }
                            }
                        }
                        if c == '~' {
                            for _ in 0..run {
                                out.push('~');
                            }
                            i += run;
                            self.at_line_start = false;
                            continue;
                        }
                        // One or two backticks fall through to inline code.
                    }
                    '#' => {
                        let run = run_len(chars, i, '#');
                        if i + run == len && !finishing {
                            held = Some(i);
                            break;
                        }
                        if i + run < len && chars[i + run] == ' ' {
                            out.push_str(style::BOLD);
                            self.in_header = true;
                            i += run + 1;
                        } else {
                            for _ in 0..run {
                                out.push('#');
                            }
                            i += run;
                        }
                        self.at_line_start = false;
                        continue;
                    }
                    '-' | '*' | '_' => {
                        match hr_scan(chars, i, c, finishing) {
                            HrScan::NeedMore => {
                                held = Some(i);
                                break;
                            }
                            HrScan::Rule(next) => {
                                out.push_str(style::DIM);
                                for _ in 0..DIVIDER_WIDTH {
                                    out.push('─');
                                }
                                out.push_str(style::RESET);
                                self.reassert_styles(&mut out);
                                out.push('\n');
                                i = next;
                                self.at_line_start = true;
                                continue;
                            }
                            HrScan::NotRule => {}
                        }
                        if c == '_' {
                            out.push('_');
                            i += 1;
                            self.at_line_start = false;
                            continue;
                        }
                        if i + 1 == len && !finishing {
                            held = Some(i);
                            break;
                        }
                        if i + 1 < len && chars[i + 1] == ' ' {
                            out.push_str("• ");
                            i += 2;
                            self.at_line_start = false;
                            continue;
                        }
                        if c == '-' {
                            out.push('-');
                            i += 1;
                            self.at_line_start = false;
                            continue;
                        }
                        // A lone `*` at line start falls through to emphasis.
                    }
                    _ => {}
                }
            }

            match c {
                '`' => {
                    if self.at_line_start && i + 1 == len && !finishing {
                        // Could still grow into an opening fence.
                        held = Some(i);
                        break;
                    }
                    out.push_str(style::DIM);
                    self.in_inline_code = true;
                    i += 1;
                    self.at_line_start = false;
                }
                '*' => {
                    if i + 1 == len && !finishing {
                        held = Some(i);
                        break;
                    }
                    if i + 1 < len && chars[i + 1] == '*' {
                        if self.bold {
                            self.bold = false;
                            out.push_str(style::RESET);
                            self.reassert_styles(&mut out);
                        } else {
                            self.bold = true;
                            out.push_str(style::BOLD);
                        }
                        i += 2;
                    } else {
                        if self.italic {
                            self.italic = false;
                            out.push_str(style::RESET);
                            self.reassert_styles(&mut out);
                        } else {
                            self.italic = true;
                            out.push_str(style::ITALIC);
                        }
                        i += 1;
                    }
                    self.at_line_start = false;
                }
                '[' => match link_scan(chars, i, finishing) {
                    LinkScan::Hold => {
                        held = Some(i);
                        break;
                    }
                    LinkScan::Literal => {
                        out.push('[');
                        i += 1;
                        self.at_line_start = false;
                    }
                    LinkScan::Link {
                        text_end,
                        url_start,
                        url_end,
                    } => {
                        out.push_str(style::UNDERLINE);
                        out.extend(&chars[i + 1..text_end]);
                        out.push_str(style::RESET);
                        self.reassert_styles(&mut out);
                        out.push(' ');
                        out.push_str(style::DIM);
                        out.push('(');
                        out.extend(&chars[url_start..url_end]);
                        out.push(')');
                        out.push_str(style::RESET);
                        self.reassert_styles(&mut out);
                        i = url_end + 1;
                        self.at_line_start = false;
                    }
                },
                '\n' => {
                    if self.in_header {
                        self.in_header = false;
                        out.push_str(style::RESET);
                        self.reassert_styles(&mut out);
                    }
                    out.push('\n');
                    i += 1;
                    self.at_line_start = true;
                }
                _ => {
                    out.push(c);
                    i += 1;
                    self.at_line_start = false;
                }
            }
        }

        if let Some(h) = held {
            self.pending = chars[h..].iter().collect();
        }
        out
    }

    fn close_fence(&mut self) {
        self.in_fenced_block = false;
        self.fence_width = 0;
        self.fence_char = '`';
    }

    // SGR 0 is the shared closer for code, bold and link-url spans, so any
    // attribute that should survive a reset has to be re-emitted after it.
    fn reassert_styles(&self, out: &mut String) {
        if self.bold || self.in_header {
            out.push_str(style::BOLD);
        }
        if self.italic {
            out.push_str(style::ITALIC);
        }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn run_len(chars: &[char], start: usize, c: char) -> usize {
    let mut n = 0;
    while start + n < chars.len() && chars[start + n] == c {
        n += 1;
    }
    n
}

fn newline_from(chars: &[char], start: usize) -> Option<usize> {
    (start..chars.len()).find(|idx| chars[*idx] == '\n')
}

fn hr_scan(chars: &[char], start: usize, c: char, finishing: bool) -> HrScan {
    let mut j = start;
    let mut count = 0;
    while j < chars.len() {
        match chars[j] {
            ch if ch == c => count += 1,
            ' ' => {}
            '\n' => {
                return if count >= 3 {
                    HrScan::Rule(j + 1)
                } else {
                    HrScan::NotRule
                };
            }
            _ => return HrScan::NotRule,
        }
        j += 1;
    }
    if finishing {
        if count >= 3 {
            HrScan::Rule(chars.len())
        } else {
            HrScan::NotRule
        }
    } else {
        HrScan::NeedMore
    }
}

fn link_scan(chars: &[char], start: usize, finishing: bool) -> LinkScan {
    let len = chars.len();
    let text_limit = (start + 1 + LINK_TEXT_LOOKAHEAD).min(len);
    let text_end = match (start + 1..text_limit).find(|idx| chars[*idx] == ']') {
        Some(idx) => idx,
        None => {
            if len >= start + 1 + LINK_TEXT_LOOKAHEAD || finishing {
                return LinkScan::Literal;
            }
            return LinkScan::Hold;
        }
    };
    if text_end + 1 == len {
        return if finishing {
            LinkScan::Literal
        } else {
            LinkScan::Hold
        };
    }
    if chars[text_end + 1] != '(' {
        return LinkScan::Literal;
    }
    let url_start = text_end + 2;
    let url_limit = (url_start + LINK_URL_LOOKAHEAD).min(len);
    match (url_start..url_limit).find(|idx| chars[*idx] == ')') {
        Some(url_end) => LinkScan::Link {
            text_end,
            url_start,
            url_end,
        },
        None => {
            if len >= url_start + LINK_URL_LOOKAHEAD || finishing {
                LinkScan::Literal
            } else {
                LinkScan::Hold
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_whole(text: &str) -> String {
        let mut r = MarkdownRenderer::new();
        let mut out = r.push(text);
        out.push_str(&r.flush());
        out
    }

    #[test]
    fn bold_split_across_chunks() {
        let mut r = MarkdownRenderer::new();
        let mut split = r.push("**bo");
        split.push_str(&r.push("ld**"));
        split.push_str(&r.flush());
        assert_eq!(split, render_whole("**bold**"));
    }

    #[test]
    fn output_is_invariant_over_chunk_boundaries() {
        let doc = "# Title\n\nSome **bold**, *em*, and `code` here.\n\n\
                   ```rust\nlet x = 1;\n```\n\n- item one\n* item two\n\
                   1. first\n[docs](https://example.com/a)\n\n---\n\ndone\n";
        let whole = render_whole(doc);
        let boundaries: Vec<usize> = doc.char_indices().map(|(i, _)| i).collect();
        for &split in &boundaries {
            let mut r = MarkdownRenderer::new();
            let mut out = r.push(&doc[..split]);
            out.push_str(&r.push(&doc[split..]));
            out.push_str(&r.flush());
            assert_eq!(out, whole, "diverged at split {}", split);
        }
    }

    #[test]
    fn flush_closes_open_styles() {
        let mut r = MarkdownRenderer::new();
        r.push("**bo");
        let out = r.flush();
        assert!(out.ends_with(style::RESET));
        // State is back to initial: plain text renders with no codes.
        assert_eq!(r.push("plain "), "plain ");
    }

    #[test]
    fn fence_close_requires_matching_run_length() {
        let out = render_whole("````\ncode\n```\nmore\n````\nafter");
        let dim_end = out.find(style::RESET).unwrap();
        let block = &out[..dim_end];
        assert!(block.contains("```\nmore"), "inner shorter fence stays dim: {out:?}");
        assert!(out.ends_with("after"));
    }

    #[test]
    fn tilde_fence_opens_and_closes() {
        let out = render_whole("~~~\nraw\n~~~\nx");
        assert_eq!(out, format!("{}raw\n{}x", style::DIM, style::RESET));
    }

    #[test]
    fn unterminated_fence_is_closed_by_flush() {
        let mut r = MarkdownRenderer::new();
        let mut out = r.push("```\nabc");
        out.push_str(&r.flush());
        assert_eq!(out, format!("{}abc{}", style::DIM, style::RESET));
    }

    #[test]
    fn header_renders_bold_to_end_of_line() {
        let out = render_whole("## Hi\nrest");
        assert_eq!(out, format!("{}Hi{}\nrest", style::BOLD, style::RESET));
    }

    #[test]
    fn hash_without_space_is_literal() {
        assert_eq!(render_whole("#tag"), "#tag");
    }

    #[test]
    fn horizontal_rule_becomes_divider() {
        let out = render_whole("---\n");
        assert!(out.starts_with(style::DIM));
        assert_eq!(out.matches('─').count(), DIVIDER_WIDTH);
    }

    #[test]
    fn spaced_rule_is_still_a_rule() {
        let out = render_whole("- - -\n");
        assert!(out.contains('─'));
    }

    #[test]
    fn list_markers_become_bullets() {
        assert_eq!(render_whole("- item\n"), "• item\n");
        assert_eq!(render_whole("* item\n"), "• item\n");
    }

    #[test]
    fn star_marker_followed_by_star_is_bold_not_bullet() {
        let out = render_whole("**strong**\n");
        assert_eq!(out, format!("{}strong{}\n", style::BOLD, style::RESET));
    }

    #[test]
    fn ordered_markers_pass_through() {
        assert_eq!(render_whole("12. item\n"), "12. item\n");
    }

    #[test]
    fn link_renders_underlined_text_and_dim_url() {
        let out = render_whole("[site](https://a.b)");
        let expected = format!(
            "{}site{} {}(https://a.b){}",
            style::UNDERLINE,
            style::RESET,
            style::DIM,
            style::RESET
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn unmatched_bracket_beyond_window_is_literal() {
        let long = format!("[{}", "x".repeat(LINK_TEXT_LOOKAHEAD + 10));
        let out = render_whole(&long);
        assert!(out.starts_with('['));
        assert!(!out.contains(style::UNDERLINE));
    }

    #[test]
    fn bracket_without_url_is_literal() {
        assert_eq!(render_whole("[note] text"), "[note] text");
    }

    #[test]
    fn closing_inline_code_restores_bold() {
        let out = render_whole("**a `b` c**");
        let expected = format!(
            "{}a {}b{}{} c{}",
            style::BOLD,
            style::DIM,
            style::RESET,
            style::BOLD,
            style::RESET
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn lone_asterisks_toggle_emphasis() {
        // Known quirk: multiplication-style text flips italics on and off.
        let out = render_whole("a * b * c");
        let expected = format!("a {} b {} c", style::ITALIC, style::RESET);
        assert_eq!(out, expected);
    }

    #[test]
    fn inline_code_suppresses_markup() {
        let out = render_whole("`**x**`");
        assert_eq!(out, format!("{}**x**{}", style::DIM, style::RESET));
    }
}
