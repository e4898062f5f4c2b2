//! Document URLs.
//!
//! A small, lossless URL model covering what the medium needs: scheme
//! routing, conversion to and from local paths, parent/child navigation,
//! extensions and fragments (jump marks).

use std::fmt;
use std::path::{Path, PathBuf};

/// Pseudo-URL naming a caller-supplied output stream.
const PRIVATE_STREAM: &str = "private:stream";

/// An absolute document URL such as `file:///tmp/doc.odt` or `sftp://host/a.odt`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocUrl {
    raw: String,
    scheme_len: usize,
}

impl DocUrl {
    /// Parses an absolute URL. Absolute file-system paths are accepted and
    /// converted into `file:` URLs.
    ///
    /// Returns `None` for empty input or input without a valid scheme.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if input.starts_with('/') {
            return Some(Self::from_path(Path::new(input)));
        }
        let colon = input.find(':')?;
        let scheme = &input[..colon];
        // A single letter is a drive, not a scheme.
        if scheme.len() < 2 {
            #[cfg(windows)]
            return Some(Self::from_path(Path::new(input)));
            #[cfg(not(windows))]
            return None;
        }
        let mut chars = scheme.chars();
        let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
            return None;
        }
        Some(Self {
            raw: format!("{}{}", scheme.to_ascii_lowercase(), &input[colon..]),
            scheme_len: colon,
        })
    }

    /// Builds a `file:` URL from a local path, making it absolute first.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let text = absolute.to_string_lossy().replace('\\', "/");
        let mut raw = String::from("file://");
        if !text.starts_with('/') {
            raw.push('/');
        }
        raw.push_str(&encode(&text));
        Self { raw, scheme_len: 4 }
    }

    /// The `private:stream` pseudo-URL.
    #[must_use]
    pub fn private_stream() -> Self {
        Self {
            raw: PRIVATE_STREAM.to_string(),
            scheme_len: "private".len(),
        }
    }

    /// Returns the full URL text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the lower-case scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.raw[..self.scheme_len]
    }

    /// Returns true for `file:` URLs.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.scheme() == "file"
    }

    /// Returns true for the `private:stream` pseudo-URL.
    #[must_use]
    pub fn is_private_stream(&self) -> bool {
        self.raw == PRIVATE_STREAM
    }

    /// Returns the fragment (jump mark) after `#`, if any.
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        self.raw.find('#').map(|i| &self.raw[i + 1..])
    }

    /// Returns the URL without its fragment.
    #[must_use]
    pub fn without_fragment(&self) -> Self {
        match self.raw.find('#') {
            Some(i) => Self {
                raw: self.raw[..i].to_string(),
                scheme_len: self.scheme_len,
            },
            None => self.clone(),
        }
    }

    /// Byte range of the path component within `raw`.
    fn path_range(&self) -> (usize, usize) {
        let after_scheme = self.scheme_len + 1;
        let rest = &self.raw[after_scheme..];
        let start = if let Some(stripped) = rest.strip_prefix("//") {
            after_scheme + 2 + stripped.find('/').unwrap_or(stripped.len())
        } else {
            after_scheme
        };
        let tail = &self.raw[start..];
        let end = start + tail.find(['?', '#']).unwrap_or(tail.len());
        (start, end)
    }

    /// Returns the authority (`host[:port]`) for hierarchical URLs.
    #[must_use]
    pub fn authority(&self) -> Option<&str> {
        let rest = &self.raw[self.scheme_len + 1..];
        let stripped = rest.strip_prefix("//")?;
        Some(&stripped[..stripped.find('/').unwrap_or(stripped.len())])
    }

    /// Returns the still-encoded path component.
    #[must_use]
    pub fn path(&self) -> &str {
        let (start, end) = self.path_range();
        &self.raw[start..end]
    }

    /// Returns the number of non-empty path segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.path().split('/').filter(|s| !s.is_empty()).count()
    }

    /// Returns the decoded last path segment, or an empty string.
    #[must_use]
    pub fn last_segment(&self) -> String {
        self.path()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .map(decode)
            .unwrap_or_default()
    }

    /// Returns the containing folder URL (with trailing slash).
    ///
    /// Returns `None` when the URL has no hierarchical segment to remove.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (start, _) = self.path_range();
        let path = self.path().trim_end_matches('/');
        if path.is_empty() {
            return None;
        }
        let slash = path.rfind('/')?;
        Some(Self {
            raw: format!("{}{}", &self.raw[..start], &path[..=slash]),
            scheme_len: self.scheme_len,
        })
    }

    /// Appends a child segment, encoding it.
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        let (_, end) = self.path_range();
        let mut raw = self.raw[..end].to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        raw.push_str(&encode(name));
        Self {
            raw,
            scheme_len: self.scheme_len,
        }
    }

    /// Returns the extension of the last segment, without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let name = self.last_segment();
        let dot = name.rfind('.')?;
        (dot > 0 && dot + 1 < name.len()).then(|| name[dot + 1..].to_string())
    }

    /// Returns the last segment without its extension.
    #[must_use]
    pub fn base_name(&self) -> String {
        let name = self.last_segment();
        match name.rfind('.') {
            Some(dot) if dot > 0 => name[..dot].to_string(),
            _ => name,
        }
    }

    /// Replaces (or adds) the extension of the last segment.
    #[must_use]
    pub fn with_extension(&self, ext: &str) -> Self {
        let name = format!("{}.{ext}", self.base_name());
        match self.parent() {
            Some(parent) => parent.join(&name),
            None => self.clone(),
        }
    }

    /// Converts a `file:` URL into a local path.
    #[must_use]
    pub fn to_path(&self) -> Option<PathBuf> {
        if !self.is_local() {
            return None;
        }
        match self.authority() {
            None | Some("" | "localhost") => {}
            Some(_) => return None,
        }
        let decoded = decode(self.path());
        #[cfg(windows)]
        let decoded = decoded.trim_start_matches('/').to_string();
        Some(PathBuf::from(decoded))
    }
}

impl fmt::Display for DocUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for DocUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocUrl({})", self.raw)
    }
}

fn keeps(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"-._~!$&'()*+,;=:@/".contains(&byte)
}

fn encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for &byte in text.as_bytes() {
        if keeps(byte) {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(byte: u8) -> Option<u8> {
    char::from(byte).to_digit(16).and_then(|d| u8::try_from(d).ok())
}
