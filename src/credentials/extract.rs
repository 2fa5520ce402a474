//! Credential value extraction from refresh responses.
//!
//! The value is located with a dotted path (`data.auth.token`, `items[0].key`)
//! walked into the parsed JSON document or into the XML element tree. Without
//! a path the whole trimmed body is the value.

use super::CredentialError;
use serde_json::Value as JsonValue;

/// Content type of a refresh response, for extraction purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Xml,
    Other,
}

impl ContentType {
    /// Determines the content type from a `Content-Type` header value.
    pub fn from_header(content_type_header: &str) -> Self {
        let lower = content_type_header.to_lowercase();
        let media_type = lower.split(';').next().unwrap_or("").trim();

        if media_type.contains("json") {
            ContentType::Json
        } else if media_type.contains("xml") {
            ContentType::Xml
        } else {
            ContentType::Other
        }
    }

    /// Falls back to sniffing the body when the header says nothing useful.
    fn detect(header: Option<&str>, body: &str) -> Self {
        match header.map(Self::from_header) {
            Some(ContentType::Other) | None => {
                let trimmed = body.trim_start();
                if trimmed.starts_with('{') || trimmed.starts_with('[') {
                    ContentType::Json
                } else if trimmed.starts_with('<') {
                    ContentType::Xml
                } else {
                    ContentType::Other
                }
            }
            Some(known) => known,
        }
    }
}

/// Extracts the credential value from a response body.
///
/// # Arguments
///
/// * `body` - Response body text
/// * `content_type` - `Content-Type` header of the response, if any
/// * `location` - Dotted path of the value; `None` or empty uses the whole body
///
/// # Returns
///
/// The value as a string, or `Err(CredentialError::ExtractionFailed)` when
/// the path does not resolve or the body cannot be parsed.
pub fn extract_value(
    body: &str,
    content_type: Option<&str>,
    location: Option<&str>,
) -> Result<String, CredentialError> {
    let location = location.map(str::trim).filter(|l| !l.is_empty());
    let Some(location) = location else {
        let value = body.trim();
        if value.is_empty() {
            return Err(CredentialError::ExtractionFailed(
                "response body is empty".to_string(),
            ));
        }
        return Ok(value.to_string());
    };

    match ContentType::detect(content_type, body) {
        ContentType::Json => {
            let json: JsonValue = serde_json::from_str(body).map_err(|e| {
                CredentialError::ExtractionFailed(format!("invalid JSON response: {}", e))
            })?;
            extract_json(&json, location)
        }
        ContentType::Xml => extract_xml(body, location),
        ContentType::Other => Err(CredentialError::ExtractionFailed(format!(
            "cannot walk '{}' into a non-JSON, non-XML response",
            location
        ))),
    }
}

/// Segment of a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Field(String),
    Index(usize),
}

/// Splits `a.b[0].c` (an optional leading `$.` is ignored) into segments.
fn parse_path(path: &str) -> Vec<PathSegment> {
    let path = path.strip_prefix('$').unwrap_or(path);
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '.' | '/' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Field(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Field(std::mem::take(&mut current)));
                }
                let mut index = String::new();
                for next in chars.by_ref() {
                    if next == ']' {
                        break;
                    }
                    index.push(next);
                }
                if let Ok(i) = index.trim().parse::<usize>() {
                    segments.push(PathSegment::Index(i));
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        segments.push(PathSegment::Field(current));
    }

    segments
}

fn extract_json(json: &JsonValue, location: &str) -> Result<String, CredentialError> {
    let mut current = json;
    for segment in parse_path(location) {
        let next = match &segment {
            PathSegment::Field(name) => current.get(name.as_str()),
            PathSegment::Index(i) => current.get(*i),
        };
        current = next.ok_or_else(|| {
            CredentialError::ExtractionFailed(format!("'{}' not found in JSON response", location))
        })?;
    }

    match current {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Null => Err(CredentialError::ExtractionFailed(format!(
            "'{}' is null in JSON response",
            location
        ))),
        other => Ok(other.to_string()),
    }
}

fn extract_xml(body: &str, location: &str) -> Result<String, CredentialError> {
    let root = xml::parse(body).map_err(|e| {
        CredentialError::ExtractionFailed(format!("invalid XML response: {}", e))
    })?;

    let segments = parse_path(location);
    let mut current = &root;
    let mut rest = segments.as_slice();

    // the root element itself may be named first
    if let Some(PathSegment::Field(first)) = rest.first() {
        if *first == current.name && current.child(first).is_none() {
            rest = &rest[1..];
        }
    }

    for segment in rest {
        let next = match segment {
            PathSegment::Field(name) => current.child(name),
            PathSegment::Index(i) => current.children.get(*i),
        };
        current = next.ok_or_else(|| {
            CredentialError::ExtractionFailed(format!("'{}' not found in XML response", location))
        })?;
    }

    Ok(current.text.trim().to_string())
}

/// Minimal XML element tree, enough to walk element paths.
mod xml {
    /// Element with its concatenated direct text content.
    #[derive(Debug, Default)]
    pub struct Element {
        pub name: String,
        pub text: String,
        pub children: Vec<Element>,
    }

    impl Element {
        /// First direct child named `name` (namespace prefixes ignored).
        pub fn child(&self, name: &str) -> Option<&Element> {
            self.children.iter().find(|c| local_name(&c.name) == name)
        }
    }

    fn local_name(name: &str) -> &str {
        name.rsplit(':').next().unwrap_or(name)
    }

    /// Parses a document into its root element.
    pub fn parse(input: &str) -> Result<Element, String> {
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut rest = input;

        while !rest.is_empty() {
            let Some(open) = rest.find('<') else {
                append_text(&mut stack, rest);
                break;
            };
            append_text(&mut stack, &rest[..open]);
            rest = &rest[open..];

            if let Some(after) = rest.strip_prefix("<!--") {
                rest = skip_past(after, "-->")?;
            } else if let Some(after) = rest.strip_prefix("<![CDATA[") {
                let end = after.find("]]>").ok_or("unterminated CDATA section")?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&after[..end]);
                }
                rest = &after[end + 3..];
            } else if let Some(after) = rest.strip_prefix("<?") {
                rest = skip_past(after, "?>")?;
            } else if let Some(after) = rest.strip_prefix("<!") {
                rest = skip_past(after, ">")?;
            } else if let Some(after) = rest.strip_prefix("</") {
                let end = after.find('>').ok_or("unterminated closing tag")?;
                let name = after[..end].trim();
                let element = stack.pop().ok_or("unexpected closing tag")?;
                if element.name != name {
                    return Err(format!("expected </{}>, found </{}>", element.name, name));
                }
                attach(&mut stack, &mut root, element)?;
                rest = &after[end + 1..];
            } else {
                let end = tag_end(rest).ok_or("unterminated tag")?;
                let tag = &rest[1..end];
                let self_closing = tag.ends_with('/');
                let tag = tag.trim_end_matches('/');
                let name = tag
                    .split(|c: char| c.is_whitespace())
                    .next()
                    .unwrap_or_default()
                    .to_string();
                if name.is_empty() {
                    return Err("empty tag name".to_string());
                }

                let element = Element {
                    name,
                    ..Element::default()
                };
                if self_closing {
                    attach(&mut stack, &mut root, element)?;
                } else {
                    stack.push(element);
                }
                rest = &rest[end + 1..];
            }
        }

        if !stack.is_empty() {
            return Err("unclosed element".to_string());
        }
        root.ok_or_else(|| "no root element".to_string())
    }

    /// Index of the `>` closing the tag at the start of `s`, skipping quoted attributes.
    fn tag_end(s: &str) -> Option<usize> {
        let mut quote: Option<char> = None;
        for (i, c) in s.char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"') | (None, '\'') => quote = Some(c),
                (None, '>') => return Some(i),
                _ => {}
            }
        }
        None
    }

    fn skip_past<'a>(s: &'a str, terminator: &str) -> Result<&'a str, String> {
        s.find(terminator)
            .map(|i| &s[i + terminator.len()..])
            .ok_or_else(|| format!("missing '{}'", terminator))
    }

    fn append_text(stack: &mut [Element], text: &str) {
        if let Some(top) = stack.last_mut() {
            top.text.push_str(&decode_entities(text));
        }
    }

    fn attach(
        stack: &mut [Element],
        root: &mut Option<Element>,
        element: Element,
    ) -> Result<(), String> {
        match stack.last_mut() {
            Some(parent) => {
                parent.children.push(element);
                Ok(())
            }
            None if root.is_none() => {
                *root = Some(element);
                Ok(())
            }
            None => Err("multiple root elements".to_string()),
        }
    }

    fn decode_entities(text: &str) -> String {
        if !text.contains('&') {
            return text.to_string();
        }
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }
}
