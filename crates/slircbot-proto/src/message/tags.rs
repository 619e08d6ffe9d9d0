//! IRCv3 message tag decoding.
//!
//! A tag token looks like `[+][vendor/]key[=value]`. The leading `+` marks a
//! client-only tag; the optional `vendor/` part names the tag's namespace.

/// One decoded tag token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagValue {
    raw_tag: String,
    vendor: String,
    key_name: String,
    client: bool,
    value: Option<String>,
}

impl TagValue {
    /// Decode a single tag token (without the leading `@` or `;` separator).
    pub fn parse(token: &str) -> Self {
        let (name, value) = match token.split_once('=') {
            Some((name, value)) => (name, Some(unescape_tag_value(value))),
            None => (token, None),
        };

        let client = name.starts_with('+');
        let bare = name.strip_prefix('+').unwrap_or(name);
        let (vendor, key_name) = bare.split_once('/').unwrap_or(("", bare));

        Self {
            raw_tag: name.to_owned(),
            vendor: vendor.to_owned(),
            key_name: key_name.to_owned(),
            client,
            value,
        }
    }

    /// The tag name as it appeared on the wire, client marker included.
    pub fn raw_tag(&self) -> &str {
        &self.raw_tag
    }

    /// Vendor namespace, empty for unnamespaced tags.
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// Key name without vendor or client marker.
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Whether the tag is client-only (`+` prefixed).
    pub fn is_client_tag(&self) -> bool {
        self.client
    }

    /// Unescaped tag value, if one was present.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Unescape a tag value from wire format.
///
/// `\:` is `;`, `\s` is a space, `\\` is a backslash, `\r` and `\n` are CR and
/// LF. Unknown escapes drop the backslash; a trailing lone backslash is
/// dropped.
pub fn unescape_tag_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let r = if c == '\\' {
            match iter.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(c) => c,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(r);
    }
    unescaped
}
