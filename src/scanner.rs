// src/scanner.rs

//! Streaming tokenizer that locates the end of the `<head>` start tag.
//!
//! The scanner understands just enough HTML to avoid false positives before the
//! head element: comments, doctypes and other markup declarations, end tags,
//! quoted attribute values, and raw-text elements such as `<script>` whose
//! content must not be read as markup. Input may be split at any byte.

/// Byte offset, counted from the first byte ever fed, right after the `>`
/// that closes the `<head ...>` start tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionPoint {
    pub offset: usize,
}

/// Longest tag name worth remembering; anything longer is neither `head`
/// nor a raw-text element.
const MAX_TAG_NAME: usize = 10;

/// Elements whose content is not parsed as markup, with the sequence that ends them.
const RAW_TEXT_ELEMENTS: &[(&str, &str)] = &[
    ("script", "</script"),
    ("style", "</style"),
    ("title", "</title"),
    ("textarea", "</textarea"),
    ("xmp", "</xmp"),
    ("iframe", "</iframe"),
    ("noembed", "</noembed"),
    ("noframes", "</noframes"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Data,
    TagOpen,
    TagName,
    Attributes,
    BeforeValue,
    UnquotedValue,
    DoubleQuoted,
    SingleQuoted,
    MarkupDeclaration,
    MarkupDash,
    /// Right after `<!--`, where `>` or `->` already ends the comment.
    CommentStart,
    CommentStartDash,
    Comment { dashes: u8 },
    /// End tags, doctypes, processing instructions: skipped up to the next `>`.
    Bogus,
    RawText { closing: &'static str, matched: usize },
}

/// Incremental scanner, fed one chunk at a time.
#[derive(Debug)]
pub struct HeadScanner {
    state: State,
    tag_name: String,
    consumed: usize,
}

impl Default for HeadScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadScanner {
    pub fn new() -> Self {
        Self {
            state: State::Data,
            tag_name: String::with_capacity(MAX_TAG_NAME),
            consumed: 0,
        }
    }

    /// Feeds the next chunk. Returns the insertion point as soon as the head
    /// start tag is complete; bytes after it in the chunk are not examined.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<InsertionPoint> {
        let base = self.consumed;
        for (i, &byte) in chunk.iter().enumerate() {
            if self.step(byte) {
                self.consumed = base + i + 1;
                return Some(InsertionPoint {
                    offset: self.consumed,
                });
            }
        }
        self.consumed = base + chunk.len();
        None
    }

    /// Advances by one byte; returns true when this byte closed `<head ...>`.
    fn step(&mut self, byte: u8) -> bool {
        match &mut self.state {
            State::Data => {
                if byte == b'<' {
                    self.state = State::TagOpen;
                }
            }
            State::TagOpen => match byte {
                b'!' => self.state = State::MarkupDeclaration,
                b'/' | b'?' => self.state = State::Bogus,
                b'<' => {}
                b if b.is_ascii_alphabetic() => {
                    self.tag_name.clear();
                    self.tag_name.push(b.to_ascii_lowercase() as char);
                    self.state = State::TagName;
                }
                _ => self.state = State::Data,
            },
            State::TagName => match byte {
                b'>' => return self.finish_start_tag(),
                b if b.is_ascii_whitespace() || b == b'/' => self.state = State::Attributes,
                b => {
                    if self.tag_name.len() <= MAX_TAG_NAME {
                        self.tag_name.push(b.to_ascii_lowercase() as char);
                    }
                }
            },
            State::Attributes => match byte {
                b'>' => return self.finish_start_tag(),
                b'=' => self.state = State::BeforeValue,
                _ => {}
            },
            State::BeforeValue => match byte {
                b'>' => return self.finish_start_tag(),
                b'"' => self.state = State::DoubleQuoted,
                b'\'' => self.state = State::SingleQuoted,
                b if b.is_ascii_whitespace() => {}
                _ => self.state = State::UnquotedValue,
            },
            State::UnquotedValue => match byte {
                b'>' => return self.finish_start_tag(),
                b if b.is_ascii_whitespace() => self.state = State::Attributes,
                _ => {}
            },
            State::DoubleQuoted => {
                if byte == b'"' {
                    self.state = State::Attributes;
                }
            }
            State::SingleQuoted => {
                if byte == b'\'' {
                    self.state = State::Attributes;
                }
            }
            State::MarkupDeclaration => match byte {
                b'-' => self.state = State::MarkupDash,
                b'>' => self.state = State::Data,
                _ => self.state = State::Bogus,
            },
            State::MarkupDash => match byte {
                b'-' => self.state = State::CommentStart,
                b'>' => self.state = State::Data,
                _ => self.state = State::Bogus,
            },
            State::CommentStart => match byte {
                b'-' => self.state = State::CommentStartDash,
                b'>' => self.state = State::Data,
                _ => self.state = State::Comment { dashes: 0 },
            },
            State::CommentStartDash => match byte {
                b'-' => self.state = State::Comment { dashes: 2 },
                b'>' => self.state = State::Data,
                _ => self.state = State::Comment { dashes: 0 },
            },
            State::Comment { dashes } => match byte {
                b'-' => *dashes = dashes.saturating_add(1),
                b'>' if *dashes >= 2 => self.state = State::Data,
                _ => *dashes = 0,
            },
            State::Bogus => {
                if byte == b'>' {
                    self.state = State::Data;
                }
            }
            State::RawText { closing, matched } => {
                let expected = closing.as_bytes()[*matched];
                if byte.to_ascii_lowercase() == expected {
                    *matched += 1;
                    if *matched == closing.len() {
                        self.state = State::Bogus;
                    }
                } else {
                    *matched = usize::from(byte == b'<');
                }
            }
        }
        false
    }

    fn finish_start_tag(&mut self) -> bool {
        if self.tag_name == "head" {
            self.state = State::Data;
            return true;
        }
        self.state = match RAW_TEXT_ELEMENTS
            .iter()
            .find(|(name, _)| *name == self.tag_name)
        {
            Some(&(_, closing)) => State::RawText {
                closing,
                matched: 0,
            },
            None => State::Data,
        };
        false
    }
}
