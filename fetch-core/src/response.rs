/// Recognizers for the modem response markers the download engine waits on
/// The stream mixes free-form status text with these markers, so every matcher works on one line

use crate::command::CONNECT;

pub const HTTP_GET_MARKER: &str = "+QHTTPGET: ";

/// Typed result of a `+QHTTPGET:` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpGetOutcome {
    /// `0,200,<size>` with a positive size
    Success { size: u64 },
    /// `0,200` but the size field is missing, zero or not a number
    InvalidSize,
    /// Any other error/status pair reported on the marker
    Failure { err: i32, code: i32 },
}

/// Classify a response line; `None` means the line is not a GET result.
pub fn parse_http_get(line: &str) -> Option<HttpGetOutcome> {
    let body = line.trim().strip_prefix(HTTP_GET_MARKER)?;
    let mut fields = body.split(',').map(str::trim);

    let err = fields.next().and_then(|f| f.parse::<i32>().ok());
    let code = fields.next().and_then(|f| f.parse::<i32>().ok());

    match (err, code) {
        (Some(0), Some(200)) => {
            // Size is the last field
            let size = body.rsplit(',').next().map(str::trim).and_then(|f| f.parse::<i64>().ok());
            match size {
                Some(size) if body.matches(',').count() >= 2 && size > 0 => {
                    Some(HttpGetOutcome::Success { size: size as u64 })
                }
                _ => Some(HttpGetOutcome::InvalidSize),
            }
        }
        (err, code) => Some(HttpGetOutcome::Failure {
            err: err.unwrap_or(-1),
            code: code.unwrap_or(-1),
        }),
    }
}

pub fn is_connect(line: &str) -> bool {
    line.contains(CONNECT)
}

/// Accumulates raw response bytes and reports when an expected token shows up.
///
/// Bytes are appended as they arrive so a token split across reads still matches.
pub struct TokenWatcher<'a> {
    token: &'a str,
    seen: String,
}

impl<'a> TokenWatcher<'a> {
    pub fn new(token: &'a str) -> Self {
        Self { token, seen: String::new() }
    }

    /// Feed received bytes; returns true once the token has been seen
    pub fn feed(&mut self, bytes: &[u8]) -> bool {
        self.seen.push_str(&String::from_utf8_lossy(bytes));
        if self.seen.contains(self.token) {
            return true;
        }
        // Only a token-length tail can still contribute to a future match
        let keep = self.token.len().saturating_sub(1);
        if self.seen.len() > keep * 4 + 64 {
            let mut cut = self.seen.len() - keep;
            while !self.seen.is_char_boundary(cut) {
                cut -= 1;
            }
            self.seen.drain(..cut);
        }
        false
    }

    pub fn transcript(&self) -> &str {
        &self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_success_line() {
        assert_eq!(
            parse_http_get("+QHTTPGET: 0,200,51200"),
            Some(HttpGetOutcome::Success { size: 51200 })
        );
    }

    #[test]
    fn test_success_tolerates_whitespace() {
        assert_eq!(
            parse_http_get("  +QHTTPGET: 0,200,1024 \r"),
            Some(HttpGetOutcome::Success { size: 1024 })
        );
    }

    #[test]
    fn test_http_error_code() {
        assert_eq!(
            parse_http_get("+QHTTPGET: 0,404,0"),
            Some(HttpGetOutcome::Failure { err: 0, code: 404 })
        );
    }

    #[test]
    fn test_modem_error_without_code() {
        assert_eq!(
            parse_http_get("+QHTTPGET: 703"),
            Some(HttpGetOutcome::Failure { err: 703, code: -1 })
        );
    }

    #[test]
    fn test_zero_or_missing_size_is_invalid() {
        assert_eq!(parse_http_get("+QHTTPGET: 0,200,0"), Some(HttpGetOutcome::InvalidSize));
        assert_eq!(parse_http_get("+QHTTPGET: 0,200"), Some(HttpGetOutcome::InvalidSize));
        assert_eq!(parse_http_get("+QHTTPGET: 0,200,-5"), Some(HttpGetOutcome::InvalidSize));
    }

    #[test]
    fn test_unrelated_lines_ignored() {
        assert_eq!(parse_http_get("OK"), None);
        assert_eq!(parse_http_get("+QHTTPREAD: 0"), None);
        assert_eq!(parse_http_get(""), None);
    }

    #[test]
    fn test_token_split_across_reads() {
        let mut watcher = TokenWatcher::new("READY");
        assert!(!watcher.feed(b"+CPIN: RE"));
        assert!(watcher.feed(b"ADY\r\n"));
    }

    #[test]
    fn test_token_found_after_long_noise() {
        let mut watcher = TokenWatcher::new("OK");
        for _ in 0..100 {
            assert!(!watcher.feed(b"noise noise noise\r\n"));
        }
        assert!(watcher.transcript().len() < 200);
        assert!(!watcher.feed(b"O"));
        assert!(watcher.feed(b"K"));
    }

    proptest! {
        #[test]
        fn prop_non_success_pair_is_failure(
            err in any::<i32>(),
            code in any::<i32>(),
            size in any::<u32>(),
        ) {
            prop_assume!((err, code) != (0, 200));
            let line = format!("+QHTTPGET: {},{},{}", err, code, size);
            prop_assert_eq!(parse_http_get(&line), Some(HttpGetOutcome::Failure { err, code }));
        }

        #[test]
        fn prop_positive_size_is_success(size in 1u64..=(i64::MAX as u64)) {
            let line = format!("+QHTTPGET: 0,200,{}", size);
            prop_assert_eq!(parse_http_get(&line), Some(HttpGetOutcome::Success { size }));
        }
    }
}
