//! The vacation message file: a small header block and a body.
//!
//! ```text
//! From: Jane Doe <jdoe@example.org>
//! Subject: Away from my mail
//!
//! I am away until Monday.
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Display name and address for the `From:` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub name: String,
    pub email: String,
}

impl Sender {
    /// `None` unless both parts are non-empty.
    pub fn new(name: &str, email: &str) -> Option<Self> {
        let (name, email) = (name.trim(), email.trim());
        (!name.is_empty() && !email.is_empty()).then(|| Self {
            name: name.to_string(),
            email: email.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VacationMessage {
    pub subject: String,
    pub body: String,
}

lazy_static! {
    static ref RX_HEADER: Regex = Regex::new(r"^(\S+):\s+(.*)").unwrap();
}

impl VacationMessage {
    /// Split `lines` into the `Subject` header and the body.
    ///
    /// Leading `Name: value` lines are headers; only `Subject` (any case) is
    /// kept. One blank line after the headers is dropped and the rest,
    /// joined with `\n`, is the body. A missing header leaves the subject
    /// empty.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut subject = String::new();
        let mut rest = lines;
        while let Some((first, tail)) = rest.split_first() {
            let Some(caps) = RX_HEADER.captures(first.as_ref()) else {
                break;
            };
            if caps[1].eq_ignore_ascii_case("subject") {
                subject = caps[2].to_string();
            }
            rest = tail;
        }
        if let Some((first, tail)) = rest.split_first() {
            if first.as_ref().trim_end_matches(['\r', '\n']).is_empty() {
                rest = tail;
            }
        }
        let body = rest
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join("\n");
        Self { subject, body }
    }

    /// File content: optional `From:`, `Subject:`, a blank line and the
    /// body, with CRLF turned into LF and a final newline.
    pub fn render(&self, from: Option<&Sender>) -> String {
        let mut text = String::new();
        if let Some(sender) = from {
            text.push_str(&format!("From: {} <{}>\n", sender.name, sender.email));
        }
        text.push_str(&format!("Subject: {}\n\n{}", self.subject, self.body));
        let mut text = text.replace("\r\n", "\n");
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text
    }

    /// Fill an empty subject or body from the given defaults.
    pub fn or_defaults(mut self, subject: &str, body: &str) -> Self {
        if self.subject.is_empty() {
            self.subject = subject.to_string();
        }
        if self.body.is_empty() {
            self.body = body.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn parses_headers_and_body() {
        let msg = VacationMessage::parse(&lines(
            "From: Jane <j@x.org>\nsubject: Away\n\nBack Monday.\n\nJane",
        ));
        assert_eq!(msg.subject, "Away");
        assert_eq!(msg.body, "Back Monday.\n\nJane");
    }

    #[test]
    fn only_one_blank_line_is_dropped() {
        let msg = VacationMessage::parse(&lines("Subject: x\n\n\nbody"));
        assert_eq!(msg.body, "\nbody");
    }

    #[test]
    fn header_needs_whitespace_after_colon() {
        let msg = VacationMessage::parse(&lines("Note:nospace\nbody"));
        assert_eq!(msg.subject, "");
        assert_eq!(msg.body, "Note:nospace\nbody");
    }

    #[test]
    fn empty_and_header_only_files() {
        let empty: [&str; 0] = [];
        assert_eq!(VacationMessage::parse(&empty), VacationMessage::default());
        let msg = VacationMessage::parse(&lines("Subject: only"));
        assert_eq!(msg.subject, "only");
        assert_eq!(msg.body, "");
    }

    #[test]
    fn renders_with_and_without_from() {
        let msg = VacationMessage {
            subject: "Away".into(),
            body: "Back soon\r\nJane".into(),
        };
        assert_eq!(msg.render(None), "Subject: Away\n\nBack soon\nJane\n");
        let sender = Sender::new("Jane Doe", "jdoe@example.org").unwrap();
        assert_eq!(
            msg.render(Some(&sender)),
            "From: Jane Doe <jdoe@example.org>\nSubject: Away\n\nBack soon\nJane\n"
        );
    }

    #[test]
    fn sender_needs_both_parts() {
        assert!(Sender::new("", "jdoe@example.org").is_none());
        assert!(Sender::new("Jane", " ").is_none());
    }

    #[test]
    fn render_then_parse_keeps_subject_and_body() {
        let msg = VacationMessage {
            subject: "Out of office".into(),
            body: "Line one\nLine two".into(),
        };
        let text = msg.render(Sender::new("J", "j@x.org").as_ref());
        assert_eq!(VacationMessage::parse(&lines(&text)), msg);
    }

    #[test]
    fn defaults_fill_gaps_only() {
        let msg = VacationMessage {
            subject: String::new(),
            body: "mine".into(),
        }
        .or_defaults("Away", "default body");
        assert_eq!(msg.subject, "Away");
        assert_eq!(msg.body, "mine");
    }
}
