//! In-memory doubles for host tests
//!
//! Every double shares its state through `Rc`, so a test can keep a clone
//! for inspection after handing the original to a session or orchestrator.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use crate::clock::Clock;
use crate::error::StorageError;
use crate::modem::{ControlLine, ControlLines, Level};
use crate::storage::{ArtifactReader, ArtifactWriter, StorageSink};
use crate::transport::{Transport, TransportError};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

struct ClockState {
    now: Cell<u64>,
    yields: Cell<u64>,
    tick_ms: u64,
}

/// Simulated clock: sleeping advances time, each yield advances one tick
#[derive(Clone)]
pub struct ManualClock {
    state: Rc<ClockState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::with_tick(1)
    }

    pub fn with_tick(tick_ms: u64) -> Self {
        Self {
            state: Rc::new(ClockState { now: Cell::new(0), yields: Cell::new(0), tick_ms: tick_ms.max(1) }),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.state.now.set(self.state.now.get() + ms);
    }

    pub fn yields(&self) -> u64 {
        self.state.yields.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.state.now.get()
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
    }

    fn yield_now(&self) {
        self.state.yields.set(self.state.yields.get() + 1);
        self.advance(self.state.tick_ms);
    }
}

// ---------------------------------------------------------------------------
// Modem
// ---------------------------------------------------------------------------

/// Body bytes released `delay_ms` after the stream-start `CONNECT`
#[derive(Debug, Clone)]
pub struct BodySegment {
    pub delay_ms: u64,
    pub bytes: Vec<u8>,
}

/// How the fake modem answers each command
#[derive(Debug, Clone)]
pub struct ModemScript {
    pub echo_ok: bool,
    pub sim_ready: bool,
    pub deactivate_ok: bool,
    pub apn_ok: bool,
    /// Number of `AT+QIACT=1` commands rejected before one succeeds
    pub activate_failures: u32,
    pub url_connect: bool,
    pub url_ack: bool,
    /// Line emitted after `AT+QHTTPGET`; `None` keeps the modem silent
    pub get_result: Option<String>,
    pub get_delay_ms: u64,
    pub read_connect: bool,
    pub body: Vec<BodySegment>,
    /// Latency of every direct command reply
    pub reply_delay_ms: u64,
}

impl Default for ModemScript {
    fn default() -> Self {
        Self {
            echo_ok: true,
            sim_ready: true,
            deactivate_ok: true,
            apn_ok: true,
            activate_failures: 0,
            url_connect: true,
            url_ack: true,
            get_result: None,
            get_delay_ms: 200,
            read_connect: true,
            body: Vec::new(),
            reply_delay_ms: 5,
        }
    }
}

impl ModemScript {
    /// Serve `payload` in one burst followed by the modem's closing `OK`
    pub fn serving(payload: &[u8]) -> Self {
        let mut bytes = payload.to_vec();
        bytes.extend_from_slice(b"\r\nOK\r\n");
        Self {
            get_result: Some(format!("+QHTTPGET: 0,200,{}", payload.len())),
            body: vec![BodySegment { delay_ms: 20, bytes }],
            ..Self::default()
        }
    }

    /// Announce `declared` bytes but deliver the given segments
    pub fn declaring(declared: u64, body: Vec<BodySegment>) -> Self {
        Self {
            get_result: Some(format!("+QHTTPGET: 0,200,{}", declared)),
            body,
            ..Self::default()
        }
    }
}

struct Pending {
    at_ms: u64,
    bytes: VecDeque<u8>,
}

struct ModemState {
    script: ModemScript,
    rx: Vec<Pending>,
    tx_line: Vec<u8>,
    commands: Vec<String>,
    raw_expected: Option<usize>,
    raw: Vec<u8>,
    urls: Vec<String>,
    sim_queries: u32,
    activations: u32,
    fail_writes: bool,
}

/// Scripted stand-in for the cellular modem's UART
#[derive(Clone)]
pub struct FakeModem {
    clock: ManualClock,
    state: Rc<RefCell<ModemState>>,
}

impl FakeModem {
    pub fn new(clock: ManualClock, script: ModemScript) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(ModemState {
                script,
                rx: Vec::new(),
                tx_line: Vec::new(),
                commands: Vec::new(),
                raw_expected: None,
                raw: Vec::new(),
                urls: Vec::new(),
                sim_queries: 0,
                activations: 0,
                fail_writes: false,
            })),
        }
    }

    /// Queue bytes that are readable immediately
    pub fn inject(&self, bytes: &[u8]) {
        let now = self.clock.now_ms();
        self.schedule(now, bytes);
    }

    /// Command lines written so far, without terminators
    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }

    pub fn sent(&self, prefix: &str) -> bool {
        self.state.borrow().commands.iter().any(|c| c.starts_with(prefix))
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.borrow().urls.clone()
    }

    pub fn sim_queries(&self) -> u32 {
        self.state.borrow().sim_queries
    }

    /// Bytes still queued, released or not
    pub fn unread(&self) -> usize {
        self.state.borrow().rx.iter().map(|p| p.bytes.len()).sum()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.borrow_mut().fail_writes = fail;
    }

    fn schedule(&self, at_ms: u64, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        let index = state.rx.iter().position(|p| p.at_ms > at_ms).unwrap_or(state.rx.len());
        state.rx.insert(index, Pending { at_ms, bytes: bytes.iter().copied().collect() });
    }

    fn reply(&self, text: &str) {
        let delay = self.state.borrow().script.reply_delay_ms;
        self.schedule(self.clock.now_ms() + delay, text.as_bytes());
    }

    fn on_command(&self, line: &str) {
        let script = self.state.borrow().script.clone();
        let now = self.clock.now_ms();

        match line {
            "ATE0" => self.reply(if script.echo_ok { "OK\r\n" } else { "ERROR\r\n" }),
            "AT+CPIN?" => {
                self.state.borrow_mut().sim_queries += 1;
                self.reply(if script.sim_ready { "+CPIN: READY\r\n\r\nOK\r\n" } else { "+CME ERROR: 10\r\n" });
            }
            "AT+QIDEACT=1" => self.reply(if script.deactivate_ok { "OK\r\n" } else { "ERROR\r\n" }),
            "AT+QIACT=1" => {
                let attempt = {
                    let mut state = self.state.borrow_mut();
                    state.activations += 1;
                    state.activations
                };
                self.reply(if attempt > script.activate_failures { "OK\r\n" } else { "ERROR\r\n" });
            }
            "AT+QHTTPSTOP" => self.reply("OK\r\n"),
            _ if line.starts_with("AT+QICSGP=") => {
                self.reply(if script.apn_ok { "OK\r\n" } else { "ERROR\r\n" })
            }
            _ if line.starts_with("AT+QHTTPCFG=") => self.reply("OK\r\n"),
            _ if line.starts_with("AT+QHTTPURL=") => {
                if script.url_connect {
                    let len = line["AT+QHTTPURL=".len()..]
                        .split(',')
                        .next()
                        .and_then(|n| n.parse::<usize>().ok())
                        .unwrap_or(0);
                    self.state.borrow_mut().raw_expected = Some(len);
                    self.reply("CONNECT\r\n");
                }
            }
            _ if line.starts_with("AT+QHTTPGET=") => {
                self.reply("OK\r\n");
                if let Some(result) = &script.get_result {
                    let at = now + script.reply_delay_ms + script.get_delay_ms;
                    self.schedule(at, format!("\r\n{}\r\n", result).as_bytes());
                }
            }
            _ if line.starts_with("AT+QHTTPREAD=") => {
                if script.read_connect {
                    let connect_at = now + script.reply_delay_ms;
                    self.schedule(connect_at, b"CONNECT\r\n");
                    for segment in &script.body {
                        self.schedule(connect_at + segment.delay_ms, &segment.bytes);
                    }
                }
            }
            _ => self.reply("ERROR\r\n"),
        }
    }

    fn on_url_complete(&self) {
        let url = {
            let mut state = self.state.borrow_mut();
            let raw = std::mem::take(&mut state.raw);
            String::from_utf8_lossy(&raw).into_owned()
        };
        self.state.borrow_mut().urls.push(url);
        if self.state.borrow().script.url_ack {
            self.reply("OK\r\n");
        }
    }
}

impl Transport for FakeModem {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.state.borrow().fail_writes {
            return Err(TransportError::WriteFailed("uart offline".into()));
        }

        for &byte in bytes {
            let expected = self.state.borrow().raw_expected;
            if let Some(remaining) = expected {
                let done = {
                    let mut state = self.state.borrow_mut();
                    state.raw.push(byte);
                    state.raw_expected = remaining.checked_sub(1).filter(|r| *r > 0);
                    state.raw_expected.is_none()
                };
                if done {
                    self.on_url_complete();
                }
                continue;
            }

            let line = {
                let mut state = self.state.borrow_mut();
                state.tx_line.push(byte);
                if state.tx_line.ends_with(b"\r\n") {
                    let len = state.tx_line.len() - 2;
                    let line = String::from_utf8_lossy(&state.tx_line[..len]).into_owned();
                    state.tx_line.clear();
                    state.commands.push(line.clone());
                    Some(line)
                } else {
                    None
                }
            };
            if let Some(line) = line {
                self.on_command(&line);
            }
        }
        Ok(())
    }

    fn available(&mut self) -> usize {
        let now = self.clock.now_ms();
        self.state
            .borrow()
            .rx
            .iter()
            .take_while(|p| p.at_ms <= now)
            .map(|p| p.bytes.len())
            .sum()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        let mut n = 0;
        while n < buf.len() {
            let Some(front) = state.rx.first_mut() else { break };
            if front.at_ms > now {
                break;
            }
            match front.bytes.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => {
                    state.rx.remove(0);
                }
            }
        }
        if state.rx.first().map_or(false, |p| p.bytes.is_empty()) {
            state.rx.remove(0);
        }
        n
    }
}

// ---------------------------------------------------------------------------
// Control lines
// ---------------------------------------------------------------------------

/// Records every line transition with the simulated time it happened
#[derive(Clone)]
pub struct FakeControlLines {
    clock: ManualClock,
    events: Rc<RefCell<Vec<(ControlLine, Level, u64)>>>,
}

impl FakeControlLines {
    pub fn new(clock: ManualClock) -> Self {
        Self { clock, events: Rc::new(RefCell::new(Vec::new())) }
    }

    pub fn events(&self) -> Vec<(ControlLine, Level, u64)> {
        self.events.borrow().clone()
    }

    /// Each cycle starts by asserting reset
    pub fn power_cycles(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|(line, level, _)| *line == ControlLine::Reset && *level == Level::High)
            .count()
    }
}

impl ControlLines for FakeControlLines {
    type Error = core::convert::Infallible;

    fn drive(&mut self, line: ControlLine, level: Level) -> Result<(), Self::Error> {
        self.events.borrow_mut().push((line, level, self.clock.now_ms()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// One storage call, in the order it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    Remove(String),
    OpenWrite(String),
    Write(usize),
    Close(String),
    OpenRead(String),
}

#[derive(Default)]
struct MemState {
    files: BTreeMap<String, Vec<u8>>,
    journal: Vec<StorageOp>,
    open_writers: usize,
    unmounted: bool,
    deny_open_write: bool,
    deny_open_read: bool,
    fail_write_after: Option<usize>,
}

/// Flat in-memory file store with an operation journal
#[derive(Clone, Default)]
pub struct MemStorage {
    state: Rc<RefCell<MemState>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, bytes: Vec<u8>) {
        self.state.borrow_mut().files.insert(path.to_string(), bytes);
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.state.borrow().files.get(path).cloned()
    }

    pub fn journal(&self) -> Vec<StorageOp> {
        self.state.borrow().journal.clone()
    }

    pub fn bytes_written(&self) -> usize {
        self.state
            .borrow()
            .journal
            .iter()
            .map(|op| if let StorageOp::Write(n) = op { *n } else { 0 })
            .sum()
    }

    pub fn open_writers(&self) -> usize {
        self.state.borrow().open_writers
    }

    pub fn unmount(&self) {
        self.state.borrow_mut().unmounted = true;
    }

    pub fn deny_open_write(&self) {
        self.state.borrow_mut().deny_open_write = true;
    }

    pub fn deny_open_read(&self) {
        self.state.borrow_mut().deny_open_read = true;
    }

    /// Fail the write that would push the artifact past `limit` bytes
    pub fn fail_write_after(&self, limit: usize) {
        self.state.borrow_mut().fail_write_after = Some(limit);
    }
}

impl StorageSink for MemStorage {
    type Writer = MemWriter;
    type Reader = MemReader;

    fn check(&self) -> Result<(), StorageError> {
        if self.state.borrow().unmounted {
            return Err(StorageError::Unavailable("not mounted".into()));
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.state.borrow().files.contains_key(path)
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        state.journal.push(StorageOp::Remove(path.to_string()));
        match state.files.remove(path) {
            Some(_) => Ok(()),
            None => Err(StorageError::Remove { path: path.to_string(), reason: "not found".into() }),
        }
    }

    fn open_write(&mut self, path: &str) -> Result<MemWriter, StorageError> {
        let mut state = self.state.borrow_mut();
        state.journal.push(StorageOp::OpenWrite(path.to_string()));
        if state.deny_open_write {
            return Err(StorageError::OpenWrite { path: path.to_string(), reason: "read-only".into() });
        }
        state.files.insert(path.to_string(), Vec::new());
        state.open_writers += 1;
        Ok(MemWriter { state: self.state.clone(), path: path.to_string(), open: true })
    }

    fn open_read(&self, path: &str) -> Result<MemReader, StorageError> {
        let mut state = self.state.borrow_mut();
        state.journal.push(StorageOp::OpenRead(path.to_string()));
        if state.deny_open_read {
            return Err(StorageError::OpenRead { path: path.to_string(), reason: "media error".into() });
        }
        if state.open_writers > 0 {
            return Err(StorageError::OpenRead { path: path.to_string(), reason: "write handle open".into() });
        }
        match state.files.get(path) {
            Some(bytes) => Ok(MemReader { bytes: bytes.clone(), pos: 0 }),
            None => Err(StorageError::OpenRead { path: path.to_string(), reason: "not found".into() }),
        }
    }
}

pub struct MemWriter {
    state: Rc<RefCell<MemState>>,
    path: String,
    open: bool,
}

impl MemWriter {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            let mut state = self.state.borrow_mut();
            state.open_writers -= 1;
            state.journal.push(StorageOp::Close(self.path.clone()));
        }
    }
}

impl ArtifactWriter for MemWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        let current = state.files.get(&self.path).map_or(0, Vec::len);
        if let Some(limit) = state.fail_write_after {
            if current + bytes.len() > limit {
                return Err(StorageError::Write { path: self.path.clone(), reason: "flash full".into() });
            }
        }
        state.journal.push(StorageOp::Write(bytes.len()));
        state.files.entry(self.path.clone()).or_default().extend_from_slice(bytes);
        Ok(())
    }

    fn close(mut self) -> Result<(), StorageError> {
        self.release();
        Ok(())
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct MemReader {
    bytes: Vec<u8>,
    pos: usize,
}

impl ArtifactReader for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let n = buf.len().min(self.bytes.len() - self.pos);
        buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn has_more(&self) -> bool {
        self.pos < self.bytes.len()
    }
}
