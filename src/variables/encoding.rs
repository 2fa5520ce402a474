//! Value encodings for scope variables.
//!
//! A scope entry may ask for its value to be encoded before substitution, e.g.
//! to exercise input filters on the target:
//!
//! ```json
//! {"key": "payload", "value": "<script>", "encoding": "html", "encoding_iterations": 2}
//! ```
//!
//! Encodings are applied once when the scope document is loaded. The anchor
//! variable is never encoded (see [`super::scope`]).

use base64::{engine::general_purpose, Engine as _};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Characters left untouched by URL encoding: unreserved characters and `/`.
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Supported encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Percent-encoding.
    Url,
    /// Percent-encoding applied twice.
    DoubleUrl,
    /// HTML entity escaping.
    Html,
    /// XML entity escaping.
    Xml,
    /// `\uXXXX` escapes for non-ASCII characters.
    Unicode,
    /// `\xNN` escape for every character.
    Hex,
    /// `\NNN` octal escape for every character.
    Octal,
    /// Standard base64 of the UTF-8 bytes.
    Base64,
    /// `CHAR(n,n,...)` SQL expression.
    SqlChar,
    /// JavaScript string literal escaping.
    JsEscape,
    /// CSS escape sequences for control and non-ASCII characters.
    CssEscape,
}

impl Encoding {
    /// Parses an encoding name such as `"double_url"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "url" => Some(Encoding::Url),
            "double_url" => Some(Encoding::DoubleUrl),
            "html" => Some(Encoding::Html),
            "xml" => Some(Encoding::Xml),
            "unicode" => Some(Encoding::Unicode),
            "hex" => Some(Encoding::Hex),
            "octal" => Some(Encoding::Octal),
            "base64" => Some(Encoding::Base64),
            "sql_char" => Some(Encoding::SqlChar),
            "js_escape" => Some(Encoding::JsEscape),
            "css_escape" => Some(Encoding::CssEscape),
            _ => None,
        }
    }

    /// Encodes `value`, repeating the encoding `iterations` times.
    ///
    /// An iteration count below one is treated as one.
    pub fn encode(self, value: &str, iterations: u32) -> String {
        let mut result = value.to_string();
        for _ in 0..iterations.max(1) {
            result = self.encode_once(&result);
        }
        result
    }

    fn encode_once(self, value: &str) -> String {
        match self {
            Encoding::Url => url_encode(value),
            Encoding::DoubleUrl => url_encode(&url_encode(value)),
            Encoding::Html => escape_entities(value, "&#x27;"),
            Encoding::Xml => escape_entities(value, "&apos;"),
            Encoding::Unicode => {
                let mut out = String::with_capacity(value.len());
                for c in value.chars() {
                    if (c as u32) > 127 {
                        let _ = write!(out, "\\u{:04x}", c as u32);
                    } else {
                        out.push(c);
                    }
                }
                out
            }
            Encoding::Hex => value.chars().fold(String::new(), |mut out, c| {
                let _ = write!(out, "\\x{:02x}", c as u32);
                out
            }),
            Encoding::Octal => value.chars().fold(String::new(), |mut out, c| {
                let _ = write!(out, "\\{:03o}", c as u32);
                out
            }),
            Encoding::Base64 => general_purpose::STANDARD.encode(value.as_bytes()),
            Encoding::SqlChar => {
                let codes: Vec<String> = value.chars().map(|c| (c as u32).to_string()).collect();
                format!("CHAR({})", codes.join(","))
            }
            Encoding::JsEscape => js_escape(value),
            Encoding::CssEscape => {
                let mut out = String::with_capacity(value.len());
                for c in value.chars() {
                    let code = c as u32;
                    if !(32..=126).contains(&code) {
                        let _ = write!(out, "\\{:x} ", code);
                    } else {
                        out.push(c);
                    }
                }
                out
            }
        }
    }
}

fn url_encode(value: &str) -> String {
    utf8_percent_encode(value, URL_ENCODE_SET).to_string()
}

fn escape_entities(value: &str, apostrophe: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str(apostrophe),
            _ => out.push(c),
        }
    }
    out
}

fn js_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' | '"' | '\'' => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 32 || (c as u32) > 126 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
