//! RFC 1459 case mapping for nicknames and channel names.
//!
//! Besides ASCII letters, `[`, `]`, `\` and `~` are the uppercase forms of
//! `{`, `}`, `|` and `^`.

#[inline]
const fn lower(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Fold a nickname or channel name to its canonical lowercase key.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(lower).collect()
}

/// Case-insensitive comparison under RFC 1459 rules.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.chars().zip(b.chars()).all(|(x, y)| lower(x) == lower(y))
}
