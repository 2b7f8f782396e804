/// Download through the modem's built-in HTTP client
///
/// One call to [`HttpDownloadEngine::download`] is one attempt: configure the
/// HTTP stack, hand over the URL, issue GET to learn the body size, then pull
/// exactly that many bytes into storage. Any failure ends the attempt and
/// leaves no partial artifact behind.
use log::{debug, error, info, warn};

use crate::clock::{poll_until, Clock, Poll};
use crate::command::{self, Command, CONNECT, OK};
use crate::config::FetchConfig;
use crate::error::{DownloadError, StorageError};
use crate::modem::{ControlLines, ModemSession};
use crate::response::{is_connect, parse_http_get, HttpGetOutcome};
use crate::storage::{ArtifactWriter, StorageSink};
use crate::transport::Transport;
use crate::verify::{DigestResult, IntegrityVerifier};

/// State of the attempt in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSession {
    pub url: String,
    /// Size announced by the modem; the stream loop stops here
    pub declared: u64,
    pub transferred: u64,
    pub last_activity_ms: u64,
}

impl DownloadSession {
    fn new(url: &str, declared: u64, now_ms: u64) -> Self {
        Self { url: url.to_string(), declared, transferred: 0, last_activity_ms: now_ms }
    }

    pub fn remaining(&self) -> u64 {
        self.declared.saturating_sub(self.transferred)
    }

    pub fn is_complete(&self) -> bool {
        self.transferred == self.declared
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub url: String,
    pub declared: u64,
    pub transferred: u64,
    /// `None` when the stored artifact could not be re-read
    pub digest: Option<DigestResult>,
}

/// Scratch buffer for one attempt, released when dropped
pub struct ChunkBuffer {
    buf: Vec<u8>,
}

impl ChunkBuffer {
    pub fn allocate(capacity: usize) -> Result<Self, DownloadError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| DownloadError::OutOfMemory { requested: capacity })?;
        buf.resize(capacity, 0);
        Ok(Self { buf })
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn filled(&self, n: usize) -> &[u8] {
        &self.buf[..n]
    }

    /// Largest slice that may be filled given what is queued and what the payload still owes
    pub fn window(&mut self, available: usize, remaining: u64) -> &mut [u8] {
        let len = self.buf.len().min(available).min(usize::try_from(remaining).unwrap_or(usize::MAX));
        &mut self.buf[..len]
    }
}

/// Logs a percentage line each time the byte count crosses an interval boundary
pub struct ProgressMeter {
    interval: u64,
    next_mark: u64,
}

impl ProgressMeter {
    pub fn new(interval: u64) -> Self {
        let interval = interval.max(1);
        Self { interval, next_mark: interval }
    }

    /// Returns the percentage when a boundary was crossed
    pub fn observe(&mut self, transferred: u64, total: u64) -> Option<u8> {
        if transferred < self.next_mark || total == 0 {
            return None;
        }
        while self.next_mark <= transferred {
            self.next_mark += self.interval;
        }
        let percent = ((transferred.min(total) * 100) / total) as u8;
        info!("Downloading: {}% ({} B)", percent, transferred);
        Some(percent)
    }
}

pub struct HttpDownloadEngine<'a, T, L, C, S> {
    modem: &'a mut ModemSession<T, L, C>,
    storage: &'a mut S,
    config: &'a FetchConfig,
}

impl<'a, T, L, C, S> HttpDownloadEngine<'a, T, L, C, S>
where
    T: Transport,
    L: ControlLines,
    C: Clock,
    S: StorageSink,
{
    pub fn new(modem: &'a mut ModemSession<T, L, C>, storage: &'a mut S, config: &'a FetchConfig) -> Self {
        Self { modem, storage, config }
    }

    pub fn download(&mut self, url: &str) -> Result<DownloadReport, DownloadError> {
        info!("----------------------------------------------");
        info!("STARTING DOWNLOAD");
        info!("----------------------------------------------");

        self.configure();
        self.set_url(url)?;
        let declared = self.discover_size()?;

        let mut chunk = ChunkBuffer::allocate(self.config.chunk_size).map_err(|e| {
            error!("✗ Memory allocation failed ({} bytes)", self.config.chunk_size);
            e
        })?;

        let mut writer = self.prepare_storage()?;

        if !self.begin_stream() {
            error!("✗ Modem did not start data stream (no CONNECT)");
            if let Err(e) = writer.close() {
                warn!("Close after failed stream start: {}", e);
            }
            self.discard_artifact();
            return Err(DownloadError::StreamStartTimeout);
        }

        let now = self.modem.clock().now_ms();
        let mut session = DownloadSession::new(url, declared, now);
        let streamed = self.stream(&mut session, &mut chunk, &mut writer);
        drop(chunk);
        let closed = writer.close();

        if let Err(e) = streamed.and(closed) {
            error!("✗ Storage failure after {} / {} bytes: {}", session.transferred, declared, e);
            self.discard_artifact();
            return Err(DownloadError::Storage(e));
        }

        if !session.is_complete() {
            error!("✗ Download INCOMPLETE: {} / {} bytes", session.transferred, declared);
            info!("  (Deleting incomplete file...)");
            self.discard_artifact();
            return Err(DownloadError::Incomplete { transferred: session.transferred, declared });
        }

        info!("✓ Download Success: {} / {} bytes", session.transferred, declared);
        let digest = self.verify();
        Ok(DownloadReport {
            url: session.url,
            declared,
            transferred: session.transferred,
            digest,
        })
    }

    fn configure(&mut self) {
        let t = &self.config.timeouts;
        self.modem.send_command(command::ECHO_OFF, OK, t.http_config_ms);
        self.modem.send_command(command::HTTP_STOP, OK, t.http_config_ms);
        if !self.modem.send_command(command::HTTP_NO_RESPONSE_HEADER, OK, t.http_config_ms) {
            warn!("Modem did not confirm response header setting");
        }
    }

    fn set_url(&mut self, url: &str) -> Result<(), DownloadError> {
        let config = self.config;
        let t = &config.timeouts;
        if !self.modem.send_command(&command::http_url(url.len()), CONNECT, t.url_connect_ms) {
            error!("✗ Error: URL CONNECT failed");
            return Err(DownloadError::UrlHandshake);
        }

        let (transport, _) = self.modem.channel();
        if let Err(e) = transport.write_raw(url.as_bytes()) {
            error!("✗ URL bytes not sent: {}", e);
            return Err(DownloadError::UrlHandshake);
        }

        if !self.modem.execute(&Command::listen(OK, t.url_ack_ms)) {
            warn!("No acknowledgment after URL, continuing");
        }
        Ok(())
    }

    fn discover_size(&mut self) -> Result<u64, DownloadError> {
        let config = self.config;
        let t = &config.timeouts;
        let get = command::http_get(t.get_response_secs);
        debug!(">> {}", get);
        if let Err(e) = self.modem.channel().0.write_line(&get) {
            error!("✗ {} not sent: {}", get, e);
            return Err(DownloadError::SizeDiscoveryTimeout);
        }

        match self.await_line(t.size_discovery_ms, parse_http_get) {
            Poll::Ready(HttpGetOutcome::Success { size }) => {
                info!("✓ Target File Size: {} bytes", size);
                Ok(size)
            }
            Poll::Ready(HttpGetOutcome::Failure { err, code }) => {
                error!("✗ HTTP GET Error: err={} status={}", err, code);
                Err(DownloadError::HttpStatus { err, code })
            }
            Poll::Ready(HttpGetOutcome::InvalidSize) => {
                error!("✗ Failed to get file size. Server reported none.");
                Err(DownloadError::InvalidSize)
            }
            Poll::TimedOut => {
                error!("✗ Failed to get file size. Check URL or Network.");
                Err(DownloadError::SizeDiscoveryTimeout)
            }
        }
    }

    fn prepare_storage(&mut self) -> Result<S::Writer, DownloadError> {
        let path = self.config.artifact_path.as_str();
        if self.storage.exists(path) {
            self.storage.remove(path).map_err(|e| {
                error!("✗ Could not remove previous artifact: {}", e);
                DownloadError::Storage(e)
            })?;
        }
        self.storage.open_write(path).map_err(|e| {
            error!("✗ Storage write error: {}", e);
            DownloadError::Storage(e)
        })
    }

    fn begin_stream(&mut self) -> bool {
        let config = self.config;
        let t = &config.timeouts;
        let read = command::http_read(t.read_total_secs);
        debug!(">> {}", read);
        if let Err(e) = self.modem.channel().0.write_line(&read) {
            error!("✗ {} not sent: {}", read, e);
            return false;
        }
        self.await_line(t.stream_start_ms, |line| is_connect(line).then_some(())).is_ready()
    }

    /// Pull body bytes until the declared size is reached or the stream stalls.
    ///
    /// Only a storage write failure is an error here; a stall simply ends the
    /// loop with `session.transferred` short of `session.declared`.
    fn stream<W: ArtifactWriter>(
        &mut self,
        session: &mut DownloadSession,
        chunk: &mut ChunkBuffer,
        writer: &mut W,
    ) -> Result<(), StorageError> {
        let inactivity_ms = self.config.timeouts.inactivity_ms;
        let mut progress = ProgressMeter::new(self.config.progress_interval);
        let (transport, clock) = self.modem.channel();

        while session.transferred < session.declared {
            clock.yield_now();

            let remaining = session.remaining();
            let received = poll_until(clock, inactivity_ms, || {
                let available = transport.available();
                if available == 0 {
                    return None;
                }
                let window = chunk.window(available, remaining);
                let n = transport.read_available(window);
                (n > 0).then_some(n)
            });

            let n = match received {
                Poll::Ready(n) => n,
                Poll::TimedOut => {
                    error!(
                        "✗ ERROR: Data stream timed out after {} ms idle ({} / {} bytes)",
                        inactivity_ms, session.transferred, session.declared
                    );
                    break;
                }
            };

            writer.write(chunk.filled(n))?;
            session.transferred += n as u64;
            session.last_activity_ms = clock.now_ms();
            progress.observe(session.transferred, session.declared);
        }
        Ok(())
    }

    fn verify(&mut self) -> Option<DigestResult> {
        info!("--- VERIFYING STORED FILE ---");
        let verifier = IntegrityVerifier::sha256(self.config.chunk_size);
        match verifier.digest(&*self.storage, &self.config.artifact_path) {
            Ok(digest) => {
                info!("SHA-256: {}", digest);
                info!("----------------------------------------------");
                Some(digest)
            }
            Err(e) => {
                error!("Failed to verify file: {}", e);
                None
            }
        }
    }

    fn discard_artifact(&mut self) {
        let path = self.config.artifact_path.as_str();
        if self.storage.exists(path) {
            if let Err(e) = self.storage.remove(path) {
                error!("Could not delete incomplete artifact: {}", e);
            }
        }
    }

    /// Read whole lines until `matcher` recognizes one or `timeout_ms` runs out
    fn await_line<R, F>(&mut self, timeout_ms: u64, mut matcher: F) -> Poll<R>
    where
        F: FnMut(&str) -> Option<R>,
    {
        let (transport, clock) = self.modem.channel();
        let start = clock.now_ms();
        loop {
            let elapsed = clock.elapsed_since(start);
            if elapsed >= timeout_ms {
                return Poll::TimedOut;
            }
            let line = transport.read_line_within(clock, timeout_ms - elapsed);
            if line.is_empty() {
                continue;
            }
            debug!("<< {}", line);
            if let Some(found) = matcher(line.as_str()) {
                return Poll::Ready(found);
            }
        }
    }
}
