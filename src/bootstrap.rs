// src/bootstrap.rs

//! The browser-side reload bootstrap.
//!
//! The script is rendered once per process from `static/reloader.js`, with the
//! push URL and the signal codes baked in, and served verbatim from
//! `<push url>/init.js`. Every intercepted HTML page gets a module script tag
//! pointing there.

use crate::error::BootstrapError;
use crate::signal::ReloadSignal;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

const TEMPLATE: &str = include_str!("../static/reloader.js");

/// Characters left alone when re-encoding a URL (same set as JavaScript's `encodeURI`).
const URI: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

/// Rendered bootstrap script plus the tag that loads it.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    push_url: String,
    script: String,
    script_tag: String,
}

impl Bootstrap {
    /// Builds the bootstrap for browsers subscribing at `push_url`.
    ///
    /// The URL is decoded and re-encoded so that both raw and already-escaped
    /// input end up escaped exactly once. Escaped reserved characters such as
    /// `%3F` stay escaped.
    pub fn new(push_url: &str) -> Result<Self, BootstrapError> {
        let push_url = normalize_url(push_url)?;
        let script = TEMPLATE
            .replace("__PUSH_URL__", &js_string(&push_url))
            .replace("__FULL_RELOAD__", &js_string(&ReloadSignal::Full.code().to_string()))
            .replace("__STYLE_RELOAD__", &js_string(&ReloadSignal::Style.code().to_string()));
        let script_tag = format!(r#"<script type="module" src="{}/init.js"></script>"#, push_url);

        Ok(Self {
            push_url,
            script,
            script_tag,
        })
    }

    pub fn push_url(&self) -> &str {
        &self.push_url
    }

    /// The JavaScript served at `/sse/init.js`.
    pub fn script(&self) -> &str {
        &self.script
    }

    /// `<script type="module" src="{push url}/init.js"></script>`
    pub fn script_tag(&self) -> &str {
        &self.script_tag
    }
}

/// Characters whose escapes survive decoding (same set as JavaScript's `decodeURI`).
const RESERVED: &[u8] = b";/?:@&=+$,#";

fn normalize_url(url: &str) -> Result<String, BootstrapError> {
    let mut normalized = String::with_capacity(url.len());
    let mut rest = url;
    while let Some((segment, escape, tail)) = split_reserved_escape(rest) {
        reencode_into(&mut normalized, segment, url)?;
        normalized.push_str(escape);
        rest = tail;
    }
    reencode_into(&mut normalized, rest, url)?;
    Ok(normalized)
}

/// Splits `s` around its first escape of a reserved character.
fn split_reserved_escape(s: &str) -> Option<(&str, &str, &str)> {
    (0..s.len()).find_map(|i| {
        let escape = s.get(i..i + 3)?;
        let hex = escape.strip_prefix('%')?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let byte = u8::from_str_radix(hex, 16).ok()?;
        RESERVED
            .contains(&byte)
            .then(|| (&s[..i], escape, &s[i + 3..]))
    })
}

fn reencode_into(out: &mut String, segment: &str, url: &str) -> Result<(), BootstrapError> {
    let decoded = percent_decode_str(segment)
        .decode_utf8()
        .map_err(|_| BootstrapError::InvalidUrl(url.to_string()))?;
    out.extend(utf8_percent_encode(&decoded, URI));
    Ok(())
}

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}
