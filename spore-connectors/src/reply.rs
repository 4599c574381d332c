//! Server reply parser
//!
//! A telemetry reply is a list of comma-separated tokens. Keywords start a
//! directive and may take the following token as their argument:
//!
//! | Token     | Argument                 | Meaning                                |
//! |-----------|--------------------------|----------------------------------------|
//! | `OK`      | optional integer         | acknowledge that many (or all) entries |
//! | `error`   | optional reason          | stop draining this wake                |
//! | `update`  | optional non-keyword     | firmware update available              |
//! | `config`  | optional non-keyword     | config files waiting                   |
//!
//! Arguments are consumed with their keyword, so `update,3,OK` does not
//! acknowledge three entries. When several `OK`s appear the first one wins.
//! An `OK` argument that is not a count acknowledges nothing.

/// How much of the batch the server acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Bare `OK`: the whole batch
    All,
    /// `OK,<n>`
    Count(usize),
}

/// Parsed telemetry reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Acknowledgement, if any
    pub ack: Option<Ack>,
    /// `error` reason; empty when none was given
    pub error: Option<String>,
    /// `update` argument; empty when none was given
    pub update: Option<String>,
    /// `config` argument; empty when none was given
    pub config: Option<String>,
    /// Tokens that matched nothing
    pub ignored: Vec<String>,
}

const KEYWORDS: [&str; 4] = ["OK", "error", "update", "config"];

fn is_keyword(token: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(token))
}

fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| c.is_whitespace() || c == '\0')
}

impl Reply {
    /// Parse a reply, tolerating a trailing NUL and stray whitespace
    pub fn parse(text: &str) -> Self {
        let tokens: Vec<&str> = text
            .split(',')
            .map(trim_token)
            .filter(|t| !t.is_empty())
            .collect();

        let mut reply = Reply::default();
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            let next = tokens.get(i + 1).copied();
            let arg = next.filter(|t| !is_keyword(t));

            if token.eq_ignore_ascii_case("OK") {
                let ack = match arg {
                    None => Ack::All,
                    Some(count) => {
                        i += 1;
                        Ack::Count(count.parse::<usize>().unwrap_or_else(|_| {
                            log::warn!("unreadable ack count {count:?}, acknowledging nothing");
                            0
                        }))
                    }
                };
                reply.ack.get_or_insert(ack);
            } else if token.eq_ignore_ascii_case("error") {
                if arg.is_some() {
                    i += 1;
                }
                reply
                    .error
                    .get_or_insert_with(|| arg.unwrap_or_default().to_string());
            } else if token.eq_ignore_ascii_case("update") {
                if arg.is_some() {
                    i += 1;
                }
                reply
                    .update
                    .get_or_insert_with(|| arg.unwrap_or_default().to_string());
            } else if token.eq_ignore_ascii_case("config") {
                if arg.is_some() {
                    i += 1;
                }
                reply
                    .config
                    .get_or_insert_with(|| arg.unwrap_or_default().to_string());
            } else {
                log::debug!("ignoring reply token {token:?}");
                reply.ignored.push(token.to_string());
            }
            i += 1;
        }
        reply
    }

    /// Entries to delete for a batch of `batch_len`
    pub fn ack_count(&self, batch_len: usize) -> usize {
        match self.ack {
            Some(Ack::All) => batch_len,
            Some(Ack::Count(n)) => n.min(batch_len),
            None => 0,
        }
    }

    /// True if the server reported an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_ack() {
        let reply = Reply::parse("OK,3\0");
        assert_eq!(reply.ack, Some(Ack::Count(3)));
        assert_eq!(reply.ack_count(5), 3);
        assert_eq!(reply.ack_count(2), 2);
    }

    #[test]
    fn bare_ok_acks_everything() {
        let reply = Reply::parse("OK");
        assert_eq!(reply.ack, Some(Ack::All));
        assert_eq!(reply.ack_count(7), 7);
    }

    #[test]
    fn garbled_count_acks_nothing() {
        for text in ["OK,-1", "OK,3x", "OK,two", "OK, 1.5 ,update"] {
            let reply = Reply::parse(text);
            assert_eq!(reply.ack, Some(Ack::Count(0)), "{text}");
            assert_eq!(reply.ack_count(5), 0, "{text}");
            assert!(reply.ignored.is_empty(), "{text}");
        }
        assert_eq!(Reply::parse("OK, 1.5 ,update").update.as_deref(), Some(""));
    }

    #[test]
    fn ok_before_keyword_is_bare() {
        let reply = Reply::parse("OK,config");
        assert_eq!(reply.ack, Some(Ack::All));
        assert_eq!(reply.config.as_deref(), Some(""));
    }

    #[test]
    fn directives_after_ack() {
        let reply = Reply::parse(" OK , 12 ,update,config\r\n\0");
        assert_eq!(reply.ack, Some(Ack::Count(12)));
        assert_eq!(reply.update.as_deref(), Some(""));
        assert_eq!(reply.config.as_deref(), Some(""));
        assert!(reply.ignored.is_empty());
    }

    #[test]
    fn directive_argument_is_not_an_ack() {
        let reply = Reply::parse("update,3,OK");
        assert_eq!(reply.update.as_deref(), Some("3"));
        assert_eq!(reply.ack, Some(Ack::All));

        let reply = Reply::parse("config,7");
        assert_eq!(reply.ack, None);
        assert_eq!(reply.ack_count(10), 0);
    }

    #[test]
    fn error_with_trailing_directive() {
        let reply = Reply::parse("error,bad node,update");
        assert!(reply.is_error());
        assert_eq!(reply.error.as_deref(), Some("bad node"));
        assert_eq!(reply.update.as_deref(), Some(""));
        assert_eq!(reply.ack_count(4), 0);
    }

    #[test]
    fn first_ok_wins() {
        let reply = Reply::parse("OK,2,OK,9");
        assert_eq!(reply.ack, Some(Ack::Count(2)));
        assert!(reply.ignored.is_empty());
    }

    #[test]
    fn junk_is_ignored() {
        let reply = Reply::parse("hello,,42");
        assert_eq!(reply.ack, None);
        assert_eq!(reply.ignored, ["hello", "42"]);
        assert_eq!(Reply::parse(""), Reply::default());
    }

    proptest! {
        #[test]
        fn ack_never_exceeds_batch(n in any::<usize>(), batch in 0usize..200) {
            let reply = Reply::parse(&format!("OK,{n}"));
            prop_assert!(reply.ack_count(batch) <= batch);
        }

        #[test]
        fn parse_never_panics(text in ".{0,64}") {
            let _ = Reply::parse(&text);
        }
    }
}
