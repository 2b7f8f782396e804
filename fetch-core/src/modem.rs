/// Modem power sequencing, network attach and the command/response primitive
use core::fmt::Debug;

use log::{debug, info, warn};

use crate::clock::{poll_until, Clock};
use crate::command::{self, Command};
use crate::response::TokenWatcher;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Unpowered,
    Resetting,
    PoweringOn,
    Attached,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLine {
    Reset,
    PowerKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// The two digital outputs wired to the modem
pub trait ControlLines {
    type Error: Debug;

    fn drive(&mut self, line: ControlLine, level: Level) -> Result<(), Self::Error>;
}

/// (line, level, hold time in ms) applied in order by `power_cycle`
pub const POWER_SEQUENCE: [(ControlLine, Level, u64); 4] = [
    (ControlLine::Reset, Level::High, 200),
    (ControlLine::Reset, Level::Low, 3_000),
    (ControlLine::PowerKey, Level::High, 1_000),
    (ControlLine::PowerKey, Level::Low, 5_000),
];

/// Per-step bounds for the attach sequence
#[derive(Debug, Clone)]
pub struct AttachPlan {
    pub apn: String,
    pub echo_off_ms: u64,
    pub sim_ready_ms: u64,
    pub context_deactivate_ms: u64,
    pub apn_ms: u64,
    pub context_activate_ms: u64,
}

impl AttachPlan {
    pub fn from_config(config: &crate::config::FetchConfig) -> Self {
        let t = &config.timeouts;
        Self {
            apn: config.apn.clone(),
            echo_off_ms: t.echo_off_ms,
            sim_ready_ms: t.sim_ready_ms,
            context_deactivate_ms: t.context_deactivate_ms,
            apn_ms: t.apn_ms,
            context_activate_ms: t.context_activate_ms,
        }
    }

    /// Ordered steps; the flag marks steps whose failure aborts the attach
    fn steps(&self) -> [(Command, bool); 5] {
        [
            (Command::new(command::ECHO_OFF, command::OK, self.echo_off_ms), false),
            (Command::new(command::SIM_STATUS, command::READY, self.sim_ready_ms), true),
            (Command::new(command::CONTEXT_DEACTIVATE, command::OK, self.context_deactivate_ms), false),
            (Command::new(command::configure_apn(&self.apn), command::OK, self.apn_ms), true),
            (Command::new(command::CONTEXT_ACTIVATE, command::OK, self.context_activate_ms), true),
        ]
    }
}

pub struct ModemSession<T, L, C> {
    transport: T,
    lines: L,
    clock: C,
    state: AttachState,
    plan: AttachPlan,
    max_attempts: u32,
}

impl<T: Transport, L: ControlLines, C: Clock> ModemSession<T, L, C> {
    pub fn new(transport: T, lines: L, clock: C, plan: AttachPlan, max_attempts: u32) -> Self {
        Self {
            transport,
            lines,
            clock,
            state: AttachState::Unpowered,
            plan,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn state(&self) -> AttachState {
        self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Transport and clock together, for callers that stream raw bytes
    pub fn channel(&mut self) -> (&mut T, &C) {
        (&mut self.transport, &self.clock)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Reset pulse followed by a power-key pulse, each with fixed hold times
    pub fn power_cycle(&mut self) {
        info!("Power cycling modem...");
        for (line, level, hold_ms) in POWER_SEQUENCE {
            match (line, level) {
                (ControlLine::Reset, Level::High) => self.state = AttachState::Resetting,
                (ControlLine::PowerKey, Level::High) => self.state = AttachState::PoweringOn,
                _ => {}
            }
            if let Err(e) = self.lines.drive(line, level) {
                warn!("Failed to drive {:?} {:?}: {:?}", line, level, e);
            }
            self.clock.sleep_ms(hold_ms);
        }
    }

    /// Write `cmd` (unless empty) and wait for `expect` to appear in the response
    pub fn send_command(&mut self, cmd: &str, expect: &str, timeout_ms: u64) -> bool {
        if !cmd.is_empty() {
            debug!(">> {}", cmd);
            if let Err(e) = self.transport.write_line(cmd) {
                warn!("{} not sent: {}", cmd, e);
                return false;
            }
        }

        let transport = &mut self.transport;
        let mut watcher = TokenWatcher::new(expect);
        let mut buf = [0u8; 64];
        let found = poll_until(&self.clock, timeout_ms, || {
            while transport.available() > 0 {
                let n = transport.read_available(&mut buf);
                if n == 0 {
                    break;
                }
                if watcher.feed(&buf[..n]) {
                    return Some(());
                }
            }
            None
        })
        .is_ready();

        if !found {
            debug!("<< no '{}' for {} (saw {:?})", expect, cmd, watcher.transcript().trim());
        }
        found
    }

    pub fn execute(&mut self, cmd: &Command) -> bool {
        self.send_command(&cmd.text, cmd.expect, cmd.timeout_ms)
    }

    /// Bring up the data context; stops at the first required step that fails
    pub fn attach(&mut self) -> bool {
        for (cmd, required) in self.plan.steps() {
            if self.execute(&cmd) {
                continue;
            }
            if required {
                warn!("Attach step {} failed (no '{}')", cmd.text, cmd.expect);
                self.state = AttachState::Failed;
                return false;
            }
            debug!("Best-effort step {} ignored", cmd.text);
        }
        self.state = AttachState::Attached;
        info!("Modem attached (APN {})", self.plan.apn);
        true
    }

    /// Power-cycle then attach, repeating the pair up to `max_attempts` times
    pub fn setup(&mut self) -> bool {
        info!("Connecting to cellular network...");
        self.power_cycle();
        for attempt in 1..=self.max_attempts {
            if self.attach() {
                return true;
            }
            if attempt < self.max_attempts {
                warn!("Attach attempt {}/{} failed, retrying", attempt, self.max_attempts);
                self.power_cycle();
            }
        }
        warn!("Modem failed to attach after {} attempts", self.max_attempts);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::testing::{FakeControlLines, FakeModem, ManualClock, ModemScript};

    type Session = ModemSession<FakeModem, FakeControlLines, ManualClock>;

    fn session(script: ModemScript) -> (Session, FakeModem, FakeControlLines, ManualClock) {
        let clock = ManualClock::new();
        let modem = FakeModem::new(clock.clone(), script);
        let lines = FakeControlLines::new(clock.clone());
        let plan = AttachPlan::from_config(&FetchConfig::with_url("http://h/x"));
        let session = ModemSession::new(modem.clone(), lines.clone(), clock.clone(), plan, 3);
        (session, modem, lines, clock)
    }

    #[test]
    fn test_power_cycle_sequence_and_timing() {
        let (mut session, _, lines, clock) = session(ModemScript::default());
        assert_eq!(session.state(), AttachState::Unpowered);
        session.power_cycle();
        assert_eq!(session.state(), AttachState::PoweringOn);
        assert_eq!(
            lines.events(),
            vec![
                (ControlLine::Reset, Level::High, 0),
                (ControlLine::Reset, Level::Low, 200),
                (ControlLine::PowerKey, Level::High, 3_200),
                (ControlLine::PowerKey, Level::Low, 4_200),
            ]
        );
        assert_eq!(clock.now_ms(), 9_200);
    }

    #[test]
    fn test_send_command_finds_token() {
        let (mut session, modem, _, _) = session(ModemScript::default());
        assert!(session.send_command("AT+CPIN?", "READY", 2_000));
        assert_eq!(modem.commands(), vec!["AT+CPIN?".to_string()]);
    }

    #[test]
    fn test_send_command_times_out() {
        let script = ModemScript { sim_ready: false, ..ModemScript::default() };
        let (mut session, _, _, clock) = session(script);
        let start = clock.now_ms();
        assert!(!session.send_command("AT+CPIN?", "READY", 2_000));
        assert!(clock.now_ms() - start >= 2_000);
    }

    #[test]
    fn test_empty_command_only_listens() {
        let (mut session, modem, _, _) = session(ModemScript::default());
        modem.inject(b"RDY\r\n");
        assert!(session.send_command("", "RDY", 100));
        assert!(modem.commands().is_empty());
    }

    #[test]
    fn test_attach_sequence_order() {
        let (mut session, modem, _, _) = session(ModemScript::default());
        assert!(session.attach());
        assert_eq!(session.state(), AttachState::Attached);
        assert_eq!(
            modem.commands(),
            vec![
                "ATE0",
                "AT+CPIN?",
                "AT+QIDEACT=1",
                "AT+QICSGP=1,1,\"airtelgprs.com\",\"\",\"\",1",
                "AT+QIACT=1",
            ]
        );
    }

    #[test]
    fn test_attach_tolerates_best_effort_failures() {
        let script = ModemScript { echo_ok: false, deactivate_ok: false, ..ModemScript::default() };
        let (mut session, _, _, _) = session(script);
        assert!(session.attach());
    }

    #[test]
    fn test_attach_fails_fast_without_sim() {
        let script = ModemScript { sim_ready: false, ..ModemScript::default() };
        let (mut session, modem, _, _) = session(script);
        assert!(!session.attach());
        assert_eq!(session.state(), AttachState::Failed);
        assert_eq!(modem.commands(), vec!["ATE0", "AT+CPIN?"]);
    }

    #[test]
    fn test_setup_recovers_on_second_attempt() {
        let script = ModemScript { activate_failures: 1, ..ModemScript::default() };
        let (mut session, modem, lines, _) = session(script);
        assert!(session.setup());
        assert_eq!(modem.sim_queries(), 2);
        assert_eq!(lines.power_cycles(), 2);
    }

    #[test]
    fn test_setup_gives_up_after_bounded_attempts() {
        let script = ModemScript { activate_failures: u32::MAX, ..ModemScript::default() };
        let (mut session, modem, lines, _) = session(script);
        assert!(!session.setup());
        assert_eq!(modem.sim_queries(), 3);
        assert_eq!(lines.power_cycles(), 3);
        assert_eq!(session.state(), AttachState::Failed);
    }
}
