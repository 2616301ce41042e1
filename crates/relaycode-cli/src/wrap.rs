use unicode_width::UnicodeWidthChar;

/// Column-aware wrapper for text that carries embedded SGR/cursor escape
/// sequences. Escapes cost zero columns; continuation lines get a fixed
/// indent. The returned column lets callers carry cursor position across
/// consecutive wraps of the same logical line.
pub struct Wrapper {
    width: usize,
    indent: usize,
}

impl Wrapper {
    pub fn new(width: usize, indent: usize) -> Self {
        Self {
            width: width.max(indent + 1),
            indent,
        }
    }

    pub fn wrap(&self, text: &str, start_col: usize) -> (String, usize) {
        let mut out = String::with_capacity(text.len() + 8);
        let mut col = start_col;
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '\x1b' {
                out.push(c);
                if chars.peek() == Some(&'[') {
                    out.push('[');
                    chars.next();
                    // Parameter bytes run until a final byte in 0x40..=0x7e.
                    for p in chars.by_ref() {
                        out.push(p);
                        if ('\x40'..='\x7e').contains(&p) {
                            break;
                        }
                    }
                }
                continue;
            }
            if c == '\n' {
                out.push('\n');
                self.push_indent(&mut out);
                col = self.indent;
                continue;
            }
            let w = UnicodeWidthChar::width(c).unwrap_or(0);
            if w > 0 && col + w > self.width {
                out.push('\n');
                self.push_indent(&mut out);
                col = self.indent;
            }
            out.push(c);
            col += w;
        }
        (out, col)
    }

    fn push_indent(&self, out: &mut String) {
        for _ in 0..self.indent {
            out.push(' ');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_do_not_advance_the_column() {
        let w = Wrapper::new(20, 0);
        let (out, col) = w.wrap("hello\x1b[1mworld\x1b[0m!", 17);
        // 11 visible chars from column 17: exactly one forced break.
        assert_eq!(out.matches('\n').count(), 1);
        assert_eq!(col, 8);
        assert!(out.contains("\x1b[1m"));
        assert!(out.contains("\x1b[0m"));
    }

    #[test]
    fn break_lands_where_the_visible_column_fills() {
        let w = Wrapper::new(20, 0);
        let (out, _) = w.wrap("hello\x1b[1mworld\x1b[0m!", 17);
        assert_eq!(out, "hel\nlo\x1b[1mworld\x1b[0m!");
    }

    #[test]
    fn newline_resets_to_indent() {
        let w = Wrapper::new(10, 2);
        let (out, col) = w.wrap("ab\ncd", 0);
        assert_eq!(out, "ab\n  cd");
        assert_eq!(col, 4);
    }

    #[test]
    fn forced_wrap_inserts_indent() {
        let w = Wrapper::new(6, 2);
        let (out, col) = w.wrap("abcdefgh", 0);
        assert_eq!(out, "abcdef\n  gh");
        assert_eq!(col, 4);
    }

    #[test]
    fn column_carries_across_calls() {
        let w = Wrapper::new(8, 0);
        let (_, col) = w.wrap("abcde", 0);
        let (out, _) = w.wrap("fghij", col);
        assert_eq!(out, "fgh\nij");
    }

    #[test]
    fn wide_chars_count_double() {
        let w = Wrapper::new(4, 0);
        let (out, _) = w.wrap("字字字", 0);
        assert_eq!(out, "字字\n字");
    }
}
