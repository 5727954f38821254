#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Backtick,
    Bracketed,
    LineComment,
    BlockComment,
}

pub(super) fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

pub(super) fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

pub(super) fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

pub(super) fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Walks SQL text yielding only bytes that are live code: quoted literals,
/// quoted identifiers and comments are skipped. SQLite block comments do not nest.
pub(super) struct CodeBytes<'a> {
    bytes: &'a [u8],
    idx: usize,
    state: State,
}

impl<'a> CodeBytes<'a> {
    pub(super) fn new(sql: &'a str) -> Self {
        Self {
            bytes: sql.as_bytes(),
            idx: 0,
            state: State::Normal,
        }
    }
}

impl Iterator for CodeBytes<'_> {
    type Item = (usize, u8);

    fn next(&mut self) -> Option<Self::Item> {
        while self.idx < self.bytes.len() {
            let idx = self.idx;
            let b = self.bytes[idx];
            self.idx += 1;
            match self.state {
                State::Normal => match b {
                    b'\'' => self.state = State::SingleQuoted,
                    b'"' => self.state = State::DoubleQuoted,
                    b'`' => self.state = State::Backtick,
                    b'[' => self.state = State::Bracketed,
                    _ if is_line_comment_start(self.bytes, idx) => {
                        self.state = State::LineComment;
                        self.idx += 1;
                    }
                    _ if is_block_comment_start(self.bytes, idx) => {
                        self.state = State::BlockComment;
                        self.idx += 1;
                    }
                    _ => return Some((idx, b)),
                },
                // a doubled quote closes and immediately reopens, which skips it
                State::SingleQuoted if b == b'\'' => self.state = State::Normal,
                State::DoubleQuoted if b == b'"' => self.state = State::Normal,
                State::Backtick if b == b'`' => self.state = State::Normal,
                State::Bracketed if b == b']' => self.state = State::Normal,
                State::LineComment if b == b'\n' => {
                    self.state = State::Normal;
                    return Some((idx, b));
                }
                State::BlockComment if is_block_comment_end(self.bytes, idx) => {
                    self.state = State::Normal;
                    self.idx += 1;
                    return Some((idx, b' '));
                }
                _ => {}
            }
        }
        None
    }
}

/// Leading words of a statement, uppercased; quoted identifiers are returned
/// as their inner text. Stops after `limit` words.
pub(super) fn leading_words(sql: &str, limit: usize) -> Vec<String> {
    let bytes = sql.as_bytes();
    let mut words = Vec::with_capacity(limit);
    let mut idx = 0;
    while idx < bytes.len() && words.len() < limit {
        let b = bytes[idx];
        if b.is_ascii_whitespace() || b == b';' {
            idx += 1;
        } else if is_line_comment_start(bytes, idx) {
            while idx < bytes.len() && bytes[idx] != b'\n' {
                idx += 1;
            }
        } else if is_block_comment_start(bytes, idx) {
            idx += 2;
            while idx < bytes.len() && !is_block_comment_end(bytes, idx) {
                idx += 1;
            }
            idx += 2;
        } else if let Some(close) = closing_quote(b) {
            let start = idx + 1;
            let end = bytes[start..]
                .iter()
                .position(|&c| c == close)
                .map_or(bytes.len(), |p| start + p);
            words.push(sql[start..end].to_ascii_uppercase());
            idx = end + 1;
        } else if is_word_byte(b) {
            let start = idx;
            while idx < bytes.len() && is_word_byte(bytes[idx]) {
                idx += 1;
            }
            words.push(sql[start..idx].to_ascii_uppercase());
        } else {
            break;
        }
    }
    words
}

fn closing_quote(b: u8) -> Option<u8> {
    match b {
        b'"' => Some(b'"'),
        b'`' => Some(b'`'),
        b'[' => Some(b']'),
        b'\'' => Some(b'\''),
        _ => None,
    }
}
