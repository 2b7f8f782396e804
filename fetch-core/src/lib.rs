//! Fetch Core - Hardware-independent logic for the cellular firmware fetcher
//!
//! This crate contains the modem protocol session and the download/verify
//! pipeline. Platform pieces (UART, GPIO, clock, filesystem) are traits, so
//! everything here can be tested on the host platform without hardware.

pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod http;
pub mod modem;
pub mod orchestrator;
pub mod response;
pub mod storage;
pub mod transport;
pub mod verify;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{poll_until, Clock, Poll, StdClock};
pub use config::{FetchConfig, Timeouts};
pub use error::{ConfigError, DownloadError, ErrorKind, FetchError, StorageError, VerifyError};
pub use http::{DownloadReport, DownloadSession, HttpDownloadEngine};
pub use modem::{AttachPlan, AttachState, ControlLine, ControlLines, Level, ModemSession};
pub use orchestrator::{Orchestrator, Phase};
pub use storage::{ArtifactReader, ArtifactWriter, FsReader, FsStorage, FsWriter, StorageSink};
pub use transport::{Transport, TransportError};
pub use verify::{DigestResult, IntegrityVerifier};
