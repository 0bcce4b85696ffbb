use mail_parser::MessageParser;

use crate::error::MailError;
use crate::traits::Uid;

/// A fully decoded message, produced once per UID and handed to the handler
/// by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub body: String,
}

/// Decodes raw RFC 822 bytes into a [`DecodedMessage`].
///
/// Header and body character sets are decoded by the parser with lossy
/// fallback, so a bad or unknown charset degrades to replacement characters
/// instead of failing. Only an empty or structurally unparseable payload is
/// an error.
pub fn decode_message(uid: Uid, raw: &[u8]) -> Result<DecodedMessage, MailError> {
    if raw.is_empty() {
        return Err(MailError::Decode {
            uid,
            reason: "empty payload".to_string(),
        });
    }

    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailError::Decode {
            uid,
            reason: "unparseable message structure".to_string(),
        })?;

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();

    let sender = parsed
        .from()
        .and_then(|addrs| addrs.first())
        .map(format_sender)
        .unwrap_or_else(|| "(unknown sender)".to_string());

    let date = parsed
        .date()
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| "(no date)".to_string());

    // First text part in part-tree order; a message with no text part yields
    // an empty body rather than an error.
    let body = parsed
        .body_text(0)
        .map(|text| text.into_owned())
        .unwrap_or_default();

    Ok(DecodedMessage {
        subject,
        sender,
        date,
        body,
    })
}

fn format_sender(addr: &mail_parser::Addr) -> String {
    match (addr.name.as_deref(), addr.address.as_deref()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => "(unknown sender)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple_message() {
        let raw = b"From: Alice <alice@example.com>\r\n\
            To: watcher@example.com\r\n\
            Subject: hello\r\n\
            Date: Tue, 1 Jul 2025 10:00:00 +0000\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            \r\n\
            ping\r\n";

        let message = decode_message(1, raw).unwrap();
        assert_eq!(message.subject, "hello");
        assert_eq!(message.sender, "Alice <alice@example.com>");
        assert!(message.date.contains("2025"));
        assert_eq!(message.body.trim(), "ping");
    }

    #[test]
    fn test_decode_encoded_headers_mixed_charsets() {
        // Two adjacent encoded words in different charsets
        let raw = b"From: =?ISO-8859-1?Q?Ren=E9?= <rene@example.com>\r\n\
            Subject: =?UTF-8?B?5L2g5aW9?= =?ISO-8859-1?Q?_caf=E9?=\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            \r\n\
            body\r\n";

        let message = decode_message(2, raw).unwrap();
        assert_eq!(message.subject, "\u{4f60}\u{597d} caf\u{e9}");
        assert_eq!(message.sender, "Ren\u{e9} <rene@example.com>");
    }

    #[test]
    fn test_decode_multipart_picks_text_plain() {
        let raw = b"From: bot@example.com\r\n\
            Subject: multipart\r\n\
            MIME-Version: 1.0\r\n\
            Content-Type: multipart/alternative; boundary=\"sep\"\r\n\
            \r\n\
            --sep\r\n\
            Content-Type: text/html; charset=utf-8\r\n\
            \r\n\
            <p>rich</p>\r\n\
            --sep\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            \r\n\
            plain text wins\r\n\
            --sep--\r\n";

        let message = decode_message(3, raw).unwrap();
        assert_eq!(message.body.trim(), "plain text wins");
    }

    #[test]
    fn test_decode_quoted_printable_body() {
        let raw = b"From: a@example.com\r\n\
            Subject: qp\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            Content-Transfer-Encoding: quoted-printable\r\n\
            \r\n\
            caf=C3=A9\r\n";

        let message = decode_message(4, raw).unwrap();
        assert_eq!(message.body.trim(), "caf\u{e9}");
    }

    #[test]
    fn test_decode_unknown_charset_degrades() {
        let raw = b"From: a@example.com\r\n\
            Subject: odd charset\r\n\
            Content-Type: text/plain; charset=\"x-no-such-charset\"\r\n\
            \r\n\
            code is 123456\r\n";

        // Must not fail; the ASCII payload survives whatever fallback applies
        let message = decode_message(5, raw).unwrap();
        assert!(message.body.contains("123456"));
    }

    #[test]
    fn test_decode_missing_headers_fall_back() {
        let raw = b"Content-Type: text/plain; charset=utf-8\r\n\
            \r\n\
            no headers to speak of\r\n";

        let message = decode_message(6, raw).unwrap();
        assert_eq!(message.subject, "(no subject)");
        assert_eq!(message.sender, "(unknown sender)");
        assert_eq!(message.date, "(no date)");
    }

    #[test]
    fn test_decode_empty_payload_is_error() {
        let err = decode_message(7, b"").unwrap_err();
        assert!(matches!(err, MailError::Decode { uid: 7, .. }));
    }
}
