//! Outbound line encoding.

use crate::error::EncodeError;

/// Encode a command and its parameters as one wire line (no CRLF).
///
/// The last parameter is sent as a trailing parameter (`:`-prefixed) when it
/// is empty, contains a space or starts with `:`. Every other parameter must
/// be a single non-empty token.
///
/// ```rust
/// use slircbot_proto::encode_command;
///
/// assert_eq!(encode_command("PONG", &["irc.example.net"]).unwrap(), "PONG irc.example.net");
/// assert_eq!(
///     encode_command("USER", &["bot", "*", "*", "The Bot"]).unwrap(),
///     "USER bot * * :The Bot"
/// );
/// ```
pub fn encode_command<S: AsRef<str>>(command: &str, params: &[S]) -> Result<String, EncodeError> {
    if command.is_empty() {
        return Err(EncodeError::EmptyCommand);
    }
    if command.starts_with(':') || command.contains([' ', '\r', '\n', '\0']) {
        return Err(EncodeError::InvalidCommand(command.to_owned()));
    }

    let mut line = String::with_capacity(command.len() + 64);
    line.push_str(command);

    let last = params.len().saturating_sub(1);
    for (index, param) in params.iter().enumerate() {
        let param = param.as_ref();
        if param.contains(['\r', '\n', '\0']) {
            return Err(EncodeError::ForbiddenCharacter { index });
        }

        let needs_trailing = param.is_empty() || param.contains(' ') || param.starts_with(':');
        line.push(' ');
        if needs_trailing {
            if index != last {
                return Err(EncodeError::InvalidMiddle { index });
            }
            line.push(':');
        }
        line.push_str(param);
    }

    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_command() {
        let params: [&str; 0] = [];
        assert_eq!(encode_command("QUIT", &params).unwrap(), "QUIT");
    }

    #[test]
    fn trailing_when_needed() {
        assert_eq!(encode_command("PRIVMSG", &["#a", "hi there"]).unwrap(), "PRIVMSG #a :hi there");
        assert_eq!(encode_command("PRIVMSG", &["#a", ":)"]).unwrap(), "PRIVMSG #a ::)");
        assert_eq!(encode_command("TOPIC", &["#a", ""]).unwrap(), "TOPIC #a :");
        assert_eq!(encode_command("PRIVMSG", &["#a", "hi"]).unwrap(), "PRIVMSG #a hi");
    }

    #[test]
    fn rejects_injection() {
        assert_eq!(
            encode_command("PRIVMSG", &["#a", "hi\r\nQUIT"]),
            Err(EncodeError::ForbiddenCharacter { index: 1 })
        );
        assert!(matches!(
            encode_command("PRIV MSG", &["#a"]),
            Err(EncodeError::InvalidCommand(_))
        ));
        assert_eq!(
            encode_command("PRIVMSG", &["#a b", "hi"]),
            Err(EncodeError::InvalidMiddle { index: 0 })
        );
        let params: [&str; 0] = [];
        assert_eq!(encode_command("", &params), Err(EncodeError::EmptyCommand));
    }
}
