//! Actuator abstraction over the physical signal channels
//!
//! Everything above this layer speaks logical on/off; electrical polarity
//! (relay-driven channels are wired active-low) is resolved once inside the
//! GPIO implementation. The default actuator just traces transitions so the
//! station runs on any host without the `gpio` feature.

use std::fmt;
use tracing::trace;

/// One independently controllable lamp or buzzer output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Error lamp
    Red,
    /// Ready lamp
    Green,
    /// Connectivity lamp
    Yellow,
    /// Alert tone
    Buzzer,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Yellow => "yellow",
            Channel::Buzzer => "buzzer",
        };
        f.write_str(name)
    }
}

/// Drive one channel to a logical state
pub trait Actuator: Send + Sync {
    fn set(&self, channel: Channel, on: bool);
}

/// No-hardware actuator: logs every transition
pub struct TraceActuator;

impl Actuator for TraceActuator {
    fn set(&self, channel: Channel, on: bool) {
        trace!(%channel, on, "actuator");
    }
}

#[cfg(feature = "gpio")]
pub use gpio::GpioActuator;

#[cfg(feature = "gpio")]
mod gpio {
    use super::{Actuator, Channel};
    use packline_common::config::IndicatorConfig;
    use packline_common::{Error, Result};
    use rppal::gpio::{Gpio, OutputPin};
    use std::sync::Mutex;

    // BCM pin assignment of the indicator stack
    const RED_PIN: u8 = 5;
    const GREEN_PIN: u8 = 6;
    const YELLOW_PIN: u8 = 13;
    const BUZZER_PIN: u8 = 19;

    struct Line {
        pin: Mutex<OutputPin>,
        active_low: bool,
    }

    impl Line {
        fn write(&self, on: bool) {
            let mut pin = self.pin.lock().unwrap();
            if on != self.active_low {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
    }

    /// Raspberry Pi GPIO actuator
    pub struct GpioActuator {
        red: Line,
        green: Line,
        yellow: Line,
        buzzer: Line,
    }

    impl GpioActuator {
        pub fn new(cfg: &IndicatorConfig) -> Result<GpioActuator> {
            let gpio = Gpio::new().map_err(|e| Error::Internal(format!("gpio init: {}", e)))?;
            let mut line = |pin: u8, active_low: bool| -> Result<Line> {
                let out = gpio
                    .get(pin)
                    .map_err(|e| Error::Internal(format!("gpio pin {}: {}", pin, e)))?
                    .into_output();
                let line = Line {
                    pin: Mutex::new(out),
                    active_low,
                };
                line.write(false);
                Ok(line)
            };
            Ok(GpioActuator {
                red: line(RED_PIN, cfg.red_active_low)?,
                green: line(GREEN_PIN, cfg.green_active_low)?,
                yellow: line(YELLOW_PIN, cfg.yellow_active_low)?,
                buzzer: line(BUZZER_PIN, cfg.buzzer_active_low)?,
            })
        }
    }

    impl Actuator for GpioActuator {
        fn set(&self, channel: Channel, on: bool) {
            match channel {
                Channel::Red => self.red.write(on),
                Channel::Green => self.green.write(on),
                Channel::Yellow => self.yellow.write(on),
                Channel::Buzzer => self.buzzer.write(on),
            }
        }
    }
}
