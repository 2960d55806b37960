// src/signal.rs

//! Reload signal protocol shared by the server and the browser bootstrap.
//!
//! A signal travels as a single character inside one server-sent event:
//! `retry: 100\ndata: <code>\n\n`. Clients ignore any `data` payload that is
//! not exactly one character, which leaves room for longer messages later.

use std::fmt;

/// Reconnect delay (milliseconds) advertised to the browser with every signal.
pub const RETRY_MS: u64 = 100;

/// What the browser should do after a file change.
///
/// Wire codes are fixed: `0` is a full reload, `1` a stylesheet hot-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReloadSignal {
    /// Hard-reload the whole page.
    Full,
    /// Swap linked stylesheets in place.
    Style,
}

impl ReloadSignal {
    /// The single character sent on the wire.
    pub const fn code(self) -> char {
        match self {
            ReloadSignal::Full => '0',
            ReloadSignal::Style => '1',
        }
    }

    /// Maps a wire code back to a signal.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            '0' => Some(ReloadSignal::Full),
            '1' => Some(ReloadSignal::Style),
            _ => None,
        }
    }

    /// Interprets the `data` field of a received event the way the bootstrap does:
    /// anything other than exactly one known character is ignored.
    pub fn from_data(data: &str) -> Option<Self> {
        let mut chars = data.chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => Self::from_code(code),
            _ => None,
        }
    }

    /// Full event-stream message for this signal.
    pub fn to_message(self) -> String {
        format!("retry: {}\ndata: {}\n\n", RETRY_MS, self.code())
    }
}

impl fmt::Display for ReloadSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadSignal::Full => f.write_str("full-reload"),
            ReloadSignal::Style => f.write_str("style-reload"),
        }
    }
}
