/// Error types shared across the fetch pipeline
use core::fmt;

/// Failure categories used for reporting and for deciding what gets retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransportTimeout,
    ProtocolError,
    AttachFailure,
    StorageError,
    ResourceExhaustion,
    IncompleteTransfer,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransportTimeout => "TRANSPORT_TIMEOUT",
            ErrorKind::ProtocolError => "PROTOCOL_ERROR",
            ErrorKind::AttachFailure => "ATTACH_FAILURE",
            ErrorKind::StorageError => "STORAGE_ERROR",
            ErrorKind::ResourceExhaustion => "RESOURCE_EXHAUSTION",
            ErrorKind::IncompleteTransfer => "INCOMPLETE_TRANSFER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingUrl,
    UnsupportedScheme(String),
    InvalidApn(String),
    ZeroChunkSize,
    ZeroAttempts,
    RelativeArtifactPath(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingUrl => write!(f, "no download URL configured"),
            ConfigError::UnsupportedScheme(url) => write!(f, "URL must be http(s): {}", url),
            ConfigError::InvalidApn(apn) => write!(f, "invalid APN '{}'", apn),
            ConfigError::ZeroChunkSize => write!(f, "chunk size must be non-zero"),
            ConfigError::ZeroAttempts => write!(f, "attach attempts must be non-zero"),
            ConfigError::RelativeArtifactPath(path) => {
                write!(f, "artifact path must be absolute: {}", path)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    OpenWrite { path: String, reason: String },
    OpenRead { path: String, reason: String },
    Write { path: String, reason: String },
    Read { path: String, reason: String },
    Remove { path: String, reason: String },
    Unavailable(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::OpenWrite { path, reason } => {
                write!(f, "cannot open {} for write: {}", path, reason)
            }
            StorageError::OpenRead { path, reason } => {
                write!(f, "cannot open {} for read: {}", path, reason)
            }
            StorageError::Write { path, reason } => write!(f, "write to {} failed: {}", path, reason),
            StorageError::Read { path, reason } => write!(f, "read from {} failed: {}", path, reason),
            StorageError::Remove { path, reason } => write!(f, "cannot remove {}: {}", path, reason),
            StorageError::Unavailable(reason) => write!(f, "storage unavailable: {}", reason),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    Open(StorageError),
    Read(StorageError),
    OutOfMemory { requested: usize },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::Open(e) => write!(f, "verification could not open artifact: {}", e),
            VerifyError::Read(e) => write!(f, "verification read failed: {}", e),
            VerifyError::OutOfMemory { requested } => {
                write!(f, "verification buffer of {} bytes unavailable", requested)
            }
        }
    }
}

impl std::error::Error for VerifyError {}

/// Terminal outcome of one download attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// No `CONNECT` after announcing the URL length
    UrlHandshake,
    /// No `+QHTTPGET:` marker within the discovery bound
    SizeDiscoveryTimeout,
    /// The modem reported a non-success error/status pair
    HttpStatus { err: i32, code: i32 },
    /// `0,200` was reported without a usable size
    InvalidSize,
    /// No `CONNECT` after `AT+QHTTPREAD`
    StreamStartTimeout,
    Storage(StorageError),
    OutOfMemory { requested: usize },
    Incomplete { transferred: u64, declared: u64 },
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::UrlHandshake
            | DownloadError::SizeDiscoveryTimeout
            | DownloadError::StreamStartTimeout => ErrorKind::TransportTimeout,
            DownloadError::HttpStatus { .. } | DownloadError::InvalidSize => ErrorKind::ProtocolError,
            DownloadError::Storage(_) => ErrorKind::StorageError,
            DownloadError::OutOfMemory { .. } => ErrorKind::ResourceExhaustion,
            DownloadError::Incomplete { .. } => ErrorKind::IncompleteTransfer,
        }
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::UrlHandshake => write!(f, "URL CONNECT failed"),
            DownloadError::SizeDiscoveryTimeout => {
                write!(f, "failed to get file size, check URL or network")
            }
            DownloadError::HttpStatus { err, code } => {
                write!(f, "HTTP GET error: err={} status={}", err, code)
            }
            DownloadError::InvalidSize => write!(f, "server reported no usable file size"),
            DownloadError::StreamStartTimeout => {
                write!(f, "modem did not start data stream (no CONNECT)")
            }
            DownloadError::Storage(e) => write!(f, "{}", e),
            DownloadError::OutOfMemory { requested } => {
                write!(f, "chunk buffer of {} bytes unavailable", requested)
            }
            DownloadError::Incomplete { transferred, declared } => {
                write!(f, "download incomplete: {} / {} bytes", transferred, declared)
            }
        }
    }
}

impl std::error::Error for DownloadError {}

impl From<StorageError> for DownloadError {
    fn from(e: StorageError) -> Self {
        DownloadError::Storage(e)
    }
}

/// Top-level failure reported by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Config(ConfigError),
    Storage(StorageError),
    Attach { attempts: u32 },
    Download(DownloadError),
}

impl FetchError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            FetchError::Config(_) => None,
            FetchError::Storage(_) => Some(ErrorKind::StorageError),
            FetchError::Attach { .. } => Some(ErrorKind::AttachFailure),
            FetchError::Download(e) => Some(e.kind()),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Config(e) => write!(f, "configuration error: {}", e),
            FetchError::Storage(e) => write!(f, "{}", e),
            FetchError::Attach { attempts } => {
                write!(f, "modem did not attach after {} attempts", attempts)
            }
            FetchError::Download(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<DownloadError> for FetchError {
    fn from(e: DownloadError) -> Self {
        FetchError::Download(e)
    }
}

impl From<ConfigError> for FetchError {
    fn from(e: ConfigError) -> Self {
        FetchError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_kinds() {
        assert_eq!(DownloadError::UrlHandshake.kind(), ErrorKind::TransportTimeout);
        assert_eq!(
            DownloadError::HttpStatus { err: 0, code: 404 }.kind(),
            ErrorKind::ProtocolError
        );
        assert_eq!(
            DownloadError::Incomplete { transferred: 1, declared: 2 }.kind(),
            ErrorKind::IncompleteTransfer
        );
        assert_eq!(
            DownloadError::OutOfMemory { requested: 4096 }.kind(),
            ErrorKind::ResourceExhaustion
        );
    }

    #[test]
    fn test_incomplete_message_carries_counts() {
        let e = DownloadError::Incomplete { transferred: 40_000, declared: 100_000 };
        assert_eq!(e.to_string(), "download incomplete: 40000 / 100000 bytes");
    }

    #[test]
    fn test_attach_failure_kind() {
        assert_eq!(FetchError::Attach { attempts: 3 }.kind(), Some(ErrorKind::AttachFailure));
        assert_eq!(ErrorKind::AttachFailure.as_str(), "ATTACH_FAILURE");
    }
}
