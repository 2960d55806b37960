// src/interceptor.rs

//! Response interception and bootstrap injection.
//!
//! [`InterceptedResponse`] decorates any [`ResponseSink`] (anything that can set
//! a header, write a body chunk and end the body). HTML bodies are held back
//! only until the `<head>` start tag has been seen; the bootstrap tag is then
//! spliced in right after it and everything from there on streams straight
//! through. Non-HTML bodies are never buffered.
//!
//! A document without a head start tag is buffered whole and delivered
//! unmodified when the body ends. There is no cap on that buffer.

use crate::error::InterceptError;
use crate::scanner::HeadScanner;
use axum::body::Bytes;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue};
use tracing::{debug, warn};

/// The three response primitives the interceptor wraps.
pub trait ResponseSink {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Current value of a header already set on the response.
    fn header(&self, name: &HeaderName) -> Option<&HeaderValue>;

    fn write(&mut self, chunk: Bytes);

    /// Writes a final chunk (possibly empty) and finishes the body.
    fn end(&mut self, chunk: Bytes);
}

/// HTML captured while waiting for the injection point.
#[derive(Debug, Default)]
struct Capture {
    pending: Vec<Bytes>,
    buffered_len: usize,
    scanner: HeadScanner,
}

impl Capture {
    fn push(&mut self, chunk: Bytes) -> Option<usize> {
        let found = self.scanner.feed(&chunk);
        self.buffered_len += chunk.len();
        self.pending.push(chunk);
        found.map(|point| point.offset)
    }

    /// Pending chunks as one buffer, optionally with bytes spliced in at an offset.
    fn assemble(self, splice: Option<(usize, &[u8])>) -> Bytes {
        if splice.is_none() && self.pending.len() == 1 {
            return self.pending.into_iter().next().unwrap_or_default();
        }
        let extra = splice.map_or(0, |(_, insert)| insert.len());
        let mut joined = Vec::with_capacity(self.buffered_len + extra);
        for chunk in &self.pending {
            joined.extend_from_slice(chunk);
        }
        if let Some((offset, insert)) = splice {
            let tail = joined.split_off(offset);
            joined.extend_from_slice(insert);
            joined.extend_from_slice(&tail);
        }
        Bytes::from(joined)
    }
}

#[derive(Debug)]
enum Mode {
    /// No content type seen yet.
    Undetermined,
    Html(Capture),
    Passthrough,
    Closed,
}

/// A single response wrapped for bootstrap injection.
#[derive(Debug)]
pub struct InterceptedResponse<S> {
    inner: S,
    mode: Mode,
    snippet: Bytes,
    injection_performed: bool,
    end_requested: bool,
}

impl<S: ResponseSink> InterceptedResponse<S> {
    /// Wraps `inner`; `snippet` is the markup spliced after `<head ...>`.
    pub fn new(inner: S, snippet: impl Into<Bytes>) -> Self {
        Self {
            inner,
            mode: Mode::Undetermined,
            snippet: snippet.into(),
            injection_performed: false,
            end_requested: false,
        }
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if name == CONTENT_TYPE {
            let is_html = value
                .to_str()
                .map(|v| v.contains("text/html"))
                .unwrap_or(false);
            self.content_type_changed(is_html);
        }
        self.inner.set_header(name, value);
    }

    fn content_type_changed(&mut self, is_html: bool) {
        match self.mode {
            Mode::Undetermined if is_html => self.mode = Mode::Html(Capture::default()),
            Mode::Undetermined => self.mode = Mode::Passthrough,
            Mode::Html(_) if !is_html => {
                if let Mode::Html(capture) = std::mem::replace(&mut self.mode, Mode::Passthrough) {
                    if capture.buffered_len > 0 {
                        self.inner.write(capture.assemble(None));
                    }
                }
            }
            _ => {}
        }
    }

    /// Writes a body chunk. `encoding` is the text encoding the caller declares
    /// for this chunk, if any; HTML chunks must be UTF-8.
    pub fn write(&mut self, chunk: Bytes, encoding: Option<&str>) -> Result<(), InterceptError> {
        match &mut self.mode {
            Mode::Closed => Err(InterceptError::WriteAfterEnd),
            Mode::Passthrough => {
                self.inner.write(chunk);
                Ok(())
            }
            Mode::Undetermined => {
                // Body bytes before any content type commit the response as-is.
                self.mode = Mode::Passthrough;
                self.inner.write(chunk);
                Ok(())
            }
            Mode::Html(capture) => {
                check_encoding(encoding)?;
                if let Some(offset) = capture.push(chunk) {
                    let rewritten = self.inject(offset);
                    self.inner.write(rewritten);
                }
                Ok(())
            }
        }
    }

    /// Ends the body with an optional final chunk.
    pub fn end(&mut self, chunk: Option<Bytes>, encoding: Option<&str>) -> Result<(), InterceptError> {
        let chunk = chunk.unwrap_or_default();
        match &mut self.mode {
            Mode::Closed => return Err(InterceptError::WriteAfterEnd),
            Mode::Html(capture) => {
                check_encoding(encoding)?;
                self.end_requested = true;
                let last = match capture.push(chunk) {
                    Some(offset) => self.inject(offset),
                    None => match std::mem::replace(&mut self.mode, Mode::Closed) {
                        Mode::Html(capture) => {
                            debug!(
                                bytes = capture.buffered_len,
                                "HTML body ended without a head tag, served unmodified"
                            );
                            capture.assemble(None)
                        }
                        _ => Bytes::new(),
                    },
                };
                self.inner.end(last);
            }
            Mode::Undetermined | Mode::Passthrough => {
                self.end_requested = true;
                self.inner.end(chunk);
            }
        }
        self.mode = Mode::Closed;
        Ok(())
    }

    /// Splices the snippet into the captured bytes at `offset`, fixes up
    /// `content-length` and switches to passthrough.
    fn inject(&mut self, offset: usize) -> Bytes {
        let Mode::Html(capture) = std::mem::replace(&mut self.mode, Mode::Passthrough) else {
            warn!("injection requested outside of HTML capture");
            return Bytes::new();
        };

        let original_length = self
            .inner
            .header(&CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(length) = original_length {
            let adjusted = length + self.snippet.len() as u64;
            self.inner.set_header(CONTENT_LENGTH, HeaderValue::from(adjusted));
        }

        self.injection_performed = true;
        debug!(offset, buffered = capture.buffered_len, "Injected reload bootstrap");
        capture.assemble(Some((offset, &self.snippet[..])))
    }

    pub fn is_html(&self) -> bool {
        matches!(self.mode, Mode::Html(_))
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.mode, Mode::Passthrough)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.mode, Mode::Closed)
    }

    pub fn injection_performed(&self) -> bool {
        self.injection_performed
    }

    pub fn end_requested(&self) -> bool {
        self.end_requested
    }

    /// Bytes currently held back waiting for the injection point.
    pub fn buffered_len(&self) -> usize {
        match &self.mode {
            Mode::Html(capture) => capture.buffered_len,
            _ => 0,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

fn check_encoding(encoding: Option<&str>) -> Result<(), InterceptError> {
    match encoding {
        Some(label) if !is_utf8_label(label) => Err(InterceptError::NonUtf8Encoding {
            encoding: label.to_string(),
        }),
        _ => Ok(()),
    }
}

fn is_utf8_label(label: &str) -> bool {
    let label = label.trim().trim_matches('"').to_ascii_lowercase();
    label == "utf-8" || label == "utf8"
}
