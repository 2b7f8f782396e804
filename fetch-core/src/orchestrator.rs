/// Top-level sequencing: storage check, modem setup, one download, report
use log::{error, info};

use crate::clock::Clock;
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::http::{DownloadReport, HttpDownloadEngine};
use crate::modem::{ControlLines, ModemSession};
use crate::storage::StorageSink;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CheckingStorage,
    Attaching,
    Downloading,
    Done,
    Failed,
}

impl Phase {
    pub fn description(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::CheckingStorage => "Checking storage",
            Phase::Attaching => "Attaching to network",
            Phase::Downloading => "Downloading",
            Phase::Done => "Complete",
            Phase::Failed => "Failed",
        }
    }
}

pub struct Orchestrator<T, L, C, S> {
    modem: ModemSession<T, L, C>,
    storage: S,
    config: FetchConfig,
    phase: Phase,
}

impl<T, L, C, S> Orchestrator<T, L, C, S>
where
    T: Transport,
    L: ControlLines,
    C: Clock,
    S: StorageSink,
{
    pub fn new(modem: ModemSession<T, L, C>, storage: S, config: FetchConfig) -> Self {
        Self { modem, storage, config, phase: Phase::Idle }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn modem(&self) -> &ModemSession<T, L, C> {
        &self.modem
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        info!("[{}]", phase.description());
    }

    /// Run the whole pipeline once; failures are logged and returned, never panicked
    pub fn run(&mut self) -> Result<DownloadReport, FetchError> {
        let result = self.run_inner();
        match &result {
            Ok(report) => {
                self.phase = Phase::Done;
                info!("==============================================");
                info!("DOWNLOAD PROCESS COMPLETED ({} bytes)", report.transferred);
                info!("==============================================");
            }
            Err(e) => {
                self.phase = Phase::Failed;
                error!("==============================================");
                error!("✗ DOWNLOAD PROCESS FAILED: {}", e);
                error!("==============================================");
            }
        }
        result
    }

    fn run_inner(&mut self) -> Result<DownloadReport, FetchError> {
        self.config.validate()?;

        self.enter(Phase::CheckingStorage);
        self.storage.check().map_err(FetchError::Storage)?;
        info!("✓ Storage ready");

        self.enter(Phase::Attaching);
        if !self.modem.setup() {
            error!("✗ GSM Setup Failed - Cannot download");
            return Err(FetchError::Attach { attempts: self.modem.max_attempts() });
        }
        info!("✓ GSM Setup Successful - Starting Download...");

        self.enter(Phase::Downloading);
        let url = self.config.target_url(self.modem.clock().now_ms());
        info!("Target: {}", url);
        let mut engine = HttpDownloadEngine::new(&mut self.modem, &mut self.storage, &self.config);
        Ok(engine.download(&url)?)
    }
}
