//! Indicator controller
//!
//! Drives the four signal channels through persistent, level-triggered
//! workers. Session code expresses intent through `IndicatorHandle` (signal
//! reset, template set, error, identity accepted); only the workers ever
//! touch the actuator, and each physical channel has exactly one driving
//! loop by construction, so a rapid silence-then-raise can never leave two
//! loops fighting over the same pin.
//!
//! Workers:
//! - ready lamp: boot blink (5 fast pulses) -> slow blink while waiting ->
//!   solid once the template is set; reset re-enters the boot blink.
//! - error lamp + alert tone: idle vs active, in the configured blink or
//!   solid pattern; also plays one-shot confirmation chirps.
//! - connectivity lamp: probes a known address on a fixed timer, steady on
//!   when reachable, one short pulse when not. Independent of session state.

pub mod actuator;

pub use actuator::{Actuator, Channel, TraceActuator};

use packline_common::config::{AlertMode, IndicatorConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::supervise::spawn_supervised;

const BOOT_BLINK_COUNT: u32 = 5;
const BOOT_BLINK_ON: Duration = Duration::from_millis(200);
const BOOT_BLINK_OFF: Duration = Duration::from_millis(100);
const WAITING_HALF_PERIOD: Duration = Duration::from_millis(500);
const ACK_PULSE: Duration = Duration::from_millis(150);
const RED_HALF_PERIOD: Duration = Duration::from_millis(500);
const BUZZER_ON: Duration = Duration::from_millis(150);
const BUZZER_OFF: Duration = Duration::from_millis(500);
const PROBE_PULSE: Duration = Duration::from_millis(500);

/// Level state of the ready lamp plus one-shot counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadyCmd {
    /// Bumped on every session reset; re-runs the boot blink
    epoch: u64,
    /// Template set: hold solid instead of blinking
    confirmed: bool,
    /// Bumped per identity acceptance: one feedback pulse
    ack: u64,
}

/// Level state of the error/alert pair plus one-shot chirp counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AlertCmd {
    active: bool,
    chirp: u64,
}

/// Intent-level interface handed to the session and dispatcher
#[derive(Clone)]
pub struct IndicatorHandle {
    ready: Arc<watch::Sender<ReadyCmd>>,
    alert: Arc<watch::Sender<AlertCmd>>,
}

impl IndicatorHandle {
    /// Handle with no workers attached. Intents are recorded on the
    /// channels but drive nothing; for headless use and tests.
    pub fn detached() -> IndicatorHandle {
        let (ready, _) = watch::channel(ReadyCmd {
            epoch: 1,
            confirmed: false,
            ack: 0,
        });
        let (alert, _) = watch::channel(AlertCmd {
            active: false,
            chirp: 0,
        });
        IndicatorHandle {
            ready: Arc::new(ready),
            alert: Arc::new(alert),
        }
    }

    /// Session reset: clear the confirmed hold and re-run the boot blink.
    pub fn session_reset(&self) {
        self.ready.send_modify(|c| {
            c.epoch += 1;
            c.confirmed = false;
        });
    }

    /// Template accepted: hold the ready lamp solid.
    pub fn template_set(&self) {
        self.ready.send_modify(|c| c.confirmed = true);
    }

    /// Rejection: raise the error/alert pattern until silenced.
    pub fn raise_alert(&self) {
        self.alert.send_modify(|c| c.active = true);
    }

    /// Every admitted scan silences prior alerts before being evaluated.
    pub fn silence_alerts(&self) {
        self.alert.send_modify(|c| c.active = false);
    }

    /// Identity accepted: one ready-lamp pulse and one short chirp.
    pub fn identity_ok(&self) {
        self.ready.send_modify(|c| c.ack += 1);
        self.alert.send_modify(|c| c.chirp += 1);
    }

    pub fn alert_active(&self) -> bool {
        self.alert.borrow().active
    }
}

/// Spawns the channel workers and hands out the intent interface
pub struct IndicatorController;

impl IndicatorController {
    pub fn start(actuator: Arc<dyn Actuator>, cfg: IndicatorConfig) -> IndicatorHandle {
        // epoch starts ahead of the workers' seen value so the ready lamp
        // boot-blinks at startup, matching a fresh session
        let (ready_tx, ready_rx) = watch::channel(ReadyCmd {
            epoch: 1,
            confirmed: false,
            ack: 0,
        });
        let (alert_tx, alert_rx) = watch::channel(AlertCmd {
            active: false,
            chirp: 0,
        });

        {
            let actuator = actuator.clone();
            let rx = ready_rx.clone();
            spawn_supervised("ready-lamp", move || {
                ready_worker(actuator.clone(), rx.clone())
            });
        }
        {
            let actuator = actuator.clone();
            let rx = alert_rx.clone();
            let mode = cfg.alert_mode;
            spawn_supervised("error-lamp", move || {
                red_worker(actuator.clone(), rx.clone(), mode)
            });
        }
        {
            let actuator = actuator.clone();
            let rx = alert_rx.clone();
            let mode = cfg.alert_mode;
            spawn_supervised("alert-tone", move || {
                buzzer_worker(actuator.clone(), rx.clone(), mode)
            });
        }
        {
            let actuator = actuator.clone();
            let cfg = cfg.clone();
            spawn_supervised("connectivity-probe", move || {
                probe_worker(actuator.clone(), cfg.clone())
            });
        }

        IndicatorHandle {
            ready: Arc::new(ready_tx),
            alert: Arc::new(alert_tx),
        }
    }
}

enum Wake {
    Elapsed,
    Changed,
    Closed,
}

/// Sleep that wakes early when a new command arrives.
async fn pace<T>(rx: &mut watch::Receiver<T>, dur: Duration) -> Wake {
    tokio::select! {
        _ = tokio::time::sleep(dur) => Wake::Elapsed,
        changed = rx.changed() => match changed {
            Ok(()) => Wake::Changed,
            Err(_) => Wake::Closed,
        },
    }
}

async fn ready_worker(actuator: Arc<dyn Actuator>, mut rx: watch::Receiver<ReadyCmd>) {
    let mut seen_epoch = 0u64;
    let mut seen_ack = 0u64;
    'level: loop {
        let cmd = *rx.borrow_and_update();

        if cmd.epoch != seen_epoch {
            seen_epoch = cmd.epoch;
            debug!("ready lamp: boot blink");
            for _ in 0..BOOT_BLINK_COUNT {
                actuator.set(Channel::Green, true);
                match pace(&mut rx, BOOT_BLINK_ON).await {
                    Wake::Elapsed => {}
                    Wake::Changed => continue 'level,
                    Wake::Closed => break 'level,
                }
                actuator.set(Channel::Green, false);
                match pace(&mut rx, BOOT_BLINK_OFF).await {
                    Wake::Elapsed => {}
                    Wake::Changed => continue 'level,
                    Wake::Closed => break 'level,
                }
            }
        }

        if cmd.ack != seen_ack {
            seen_ack = cmd.ack;
            // one feedback pulse, then fall back to the level state
            actuator.set(Channel::Green, false);
            tokio::time::sleep(ACK_PULSE).await;
            actuator.set(Channel::Green, true);
            tokio::time::sleep(ACK_PULSE).await;
        }

        if cmd.confirmed {
            actuator.set(Channel::Green, true);
            if rx.changed().await.is_err() {
                break 'level;
            }
        } else {
            actuator.set(Channel::Green, true);
            match pace(&mut rx, WAITING_HALF_PERIOD).await {
                Wake::Elapsed => {}
                Wake::Changed => continue 'level,
                Wake::Closed => break 'level,
            }
            actuator.set(Channel::Green, false);
            match pace(&mut rx, WAITING_HALF_PERIOD).await {
                Wake::Elapsed => {}
                Wake::Changed => continue 'level,
                Wake::Closed => break 'level,
            }
        }
    }
    actuator.set(Channel::Green, false);
}

async fn red_worker(actuator: Arc<dyn Actuator>, mut rx: watch::Receiver<AlertCmd>, mode: AlertMode) {
    loop {
        let cmd = *rx.borrow_and_update();
        if cmd.active {
            match mode {
                AlertMode::Solid => {
                    actuator.set(Channel::Red, true);
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
                AlertMode::Blink => {
                    actuator.set(Channel::Red, true);
                    match pace(&mut rx, RED_HALF_PERIOD).await {
                        Wake::Elapsed => {}
                        Wake::Changed => continue,
                        Wake::Closed => break,
                    }
                    actuator.set(Channel::Red, false);
                    match pace(&mut rx, RED_HALF_PERIOD).await {
                        Wake::Elapsed => {}
                        Wake::Changed => continue,
                        Wake::Closed => break,
                    }
                }
            }
        } else {
            actuator.set(Channel::Red, false);
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
    actuator.set(Channel::Red, false);
}

async fn buzzer_worker(
    actuator: Arc<dyn Actuator>,
    mut rx: watch::Receiver<AlertCmd>,
    mode: AlertMode,
) {
    let mut seen_chirp = 0u64;
    loop {
        let cmd = *rx.borrow_and_update();

        if cmd.chirp != seen_chirp {
            seen_chirp = cmd.chirp;
            actuator.set(Channel::Buzzer, true);
            tokio::time::sleep(BUZZER_ON).await;
            actuator.set(Channel::Buzzer, false);
        }

        if cmd.active {
            match mode {
                AlertMode::Solid => {
                    actuator.set(Channel::Buzzer, true);
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
                AlertMode::Blink => {
                    actuator.set(Channel::Buzzer, true);
                    match pace(&mut rx, BUZZER_ON).await {
                        Wake::Elapsed => {}
                        Wake::Changed => continue,
                        Wake::Closed => break,
                    }
                    actuator.set(Channel::Buzzer, false);
                    match pace(&mut rx, BUZZER_OFF).await {
                        Wake::Elapsed => {}
                        Wake::Changed => continue,
                        Wake::Closed => break,
                    }
                }
            }
        } else {
            actuator.set(Channel::Buzzer, false);
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
    actuator.set(Channel::Buzzer, false);
}

/// Connectivity prober: steady yellow when the probe address is reachable,
/// one short pulse when it is not. Runs forever, independent of session state.
async fn probe_worker(actuator: Arc<dyn Actuator>, cfg: IndicatorConfig) {
    let mut ticker = tokio::time::interval(cfg.probe_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let reachable = matches!(
            tokio::time::timeout(cfg.probe_timeout(), TcpStream::connect(&cfg.probe_addr)).await,
            Ok(Ok(_))
        );
        if reachable {
            actuator.set(Channel::Yellow, true);
        } else {
            actuator.set(Channel::Yellow, true);
            tokio::time::sleep(PROBE_PULSE).await;
            actuator.set(Channel::Yellow, false);
        }
    }
}
