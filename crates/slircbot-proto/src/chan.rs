//! Channel name detection.
//!
//! # Reference
//! - RFC 2812 Section 1.3: Channel names

/// Extension trait telling channel targets apart from nickname targets.
pub trait ChannelExt {
    /// `true` when the text starts with a channel sigil (`#`, `&`, `+`, `!`)
    /// and contains no space, comma or control character.
    fn is_channel_name(&self) -> bool;
}

impl ChannelExt for str {
    fn is_channel_name(&self) -> bool {
        let mut chars = self.chars();
        if !matches!(chars.next(), Some('#' | '&' | '+' | '!')) {
            return false;
        }
        chars.all(|c| c != ' ' && c != ',' && !c.is_control())
    }
}

impl ChannelExt for String {
    fn is_channel_name(&self) -> bool {
        self.as_str().is_channel_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigils() {
        assert!("#channel".is_channel_name());
        assert!("&local".is_channel_name());
        assert!("!12345safe".is_channel_name());
    }

    #[test]
    fn nicknames_and_garbage() {
        assert!(!"slircbot".is_channel_name());
        assert!(!"#a b".is_channel_name());
        assert!(!"#a,b".is_channel_name());
        assert!(!"".is_channel_name());
    }
}
