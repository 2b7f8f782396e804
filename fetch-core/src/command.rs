/// AT command set used for network attach and the modem HTTP client

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub text: String,
    pub expect: &'static str,
    pub timeout_ms: u64,
}

impl Command {
    pub fn new(text: impl Into<String>, expect: &'static str, timeout_ms: u64) -> Self {
        Self { text: text.into(), expect, timeout_ms }
    }

    /// Wait for `expect` without sending anything
    pub fn listen(expect: &'static str, timeout_ms: u64) -> Self {
        Self::new(String::new(), expect, timeout_ms)
    }
}

pub const OK: &str = "OK";
pub const READY: &str = "READY";
pub const CONNECT: &str = "CONNECT";

pub const ECHO_OFF: &str = "ATE0";
pub const SIM_STATUS: &str = "AT+CPIN?";
pub const CONTEXT_DEACTIVATE: &str = "AT+QIDEACT=1";
pub const CONTEXT_ACTIVATE: &str = "AT+QIACT=1";
pub const HTTP_STOP: &str = "AT+QHTTPSTOP";
pub const HTTP_NO_RESPONSE_HEADER: &str = "AT+QHTTPCFG=\"responseheader\",0";

/// Seconds the modem waits for the URL bytes after `CONNECT`
pub const URL_INPUT_SECS: u32 = 80;

pub fn configure_apn(apn: &str) -> String {
    format!("AT+QICSGP=1,1,\"{}\",\"\",\"\",1", apn)
}

pub fn http_url(url_len: usize) -> String {
    format!("AT+QHTTPURL={},{}", url_len, URL_INPUT_SECS)
}

pub fn http_get(response_secs: u32) -> String {
    format!("AT+QHTTPGET={}", response_secs)
}

pub fn http_read(total_secs: u32) -> String {
    format!("AT+QHTTPREAD={}", total_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apn_command_format() {
        assert_eq!(configure_apn("airtelgprs.com"), "AT+QICSGP=1,1,\"airtelgprs.com\",\"\",\"\",1");
    }

    #[test]
    fn test_http_commands() {
        assert_eq!(http_url(97), "AT+QHTTPURL=97,80");
        assert_eq!(http_get(80), "AT+QHTTPGET=80");
        assert_eq!(http_read(300), "AT+QHTTPREAD=300");
    }

    #[test]
    fn test_listen_has_no_text() {
        let cmd = Command::listen(OK, 500);
        assert!(cmd.text.is_empty());
        assert_eq!(cmd.expect, "OK");
    }
}
