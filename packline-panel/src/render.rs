//! Summary frame rendering
//!
//! The panel shows six figures. `Frame` is the device-independent shape;
//! the stdout sink below is what runs on a desk, and the LED matrix driver
//! is a drop-in replacement writing the same frames.

use serde::Deserialize;
use std::fmt;

/// Summary payload from the statistics service
#[derive(Debug, Clone, Deserialize)]
pub struct Summary {
    pub muf_no: String,
    pub total_carton_needed: i64,
    pub target_hour: i64,
    pub avg_hourly_output: i64,
    pub balance_carton: i64,
    pub balance_hours: f64,
}

/// Visual emphasis of one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Normal,
    /// Output meeting the target
    Good,
    /// Output behind the target
    Behind,
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub label: &'static str,
    pub value: String,
    pub tone: Tone,
}

/// One full display refresh
#[derive(Debug, Clone)]
pub struct Frame {
    pub cells: Vec<Cell>,
}

impl Frame {
    /// Frame for a successful summary fetch.
    pub fn from_summary(s: &Summary) -> Frame {
        let output_tone = if s.target_hour > 0 && s.avg_hourly_output < s.target_hour {
            Tone::Behind
        } else {
            Tone::Good
        };
        Frame {
            cells: vec![
                Cell {
                    label: "MUF",
                    value: muf_tail(&s.muf_no),
                    tone: Tone::Normal,
                },
                Cell {
                    label: "TOTAL",
                    value: s.total_carton_needed.to_string(),
                    tone: Tone::Normal,
                },
                Cell {
                    label: "TGT/HR",
                    value: s.target_hour.to_string(),
                    tone: Tone::Normal,
                },
                Cell {
                    label: "OUT/HR",
                    value: s.avg_hourly_output.to_string(),
                    tone: output_tone,
                },
                Cell {
                    label: "BAL",
                    value: s.balance_carton.to_string(),
                    tone: Tone::Normal,
                },
                Cell {
                    label: "BAL HR",
                    value: format!("{:.1}", s.balance_hours),
                    tone: Tone::Normal,
                },
            ],
        }
    }

    /// Single-message frame for a degraded state.
    pub fn status(message: &str) -> Frame {
        Frame {
            cells: vec![Cell {
                label: "STATUS",
                value: message.to_string(),
                tone: Tone::Behind,
            }],
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cell in &self.cells {
            let mark = match cell.tone {
                Tone::Normal => ' ',
                Tone::Good => '+',
                Tone::Behind => '!',
            };
            writeln!(f, "{:>7}{} {}", cell.label, mark, cell.value)?;
        }
        Ok(())
    }
}

/// The matrix has room for six characters of batch code; keep the tail,
/// which is the discriminating part.
pub fn muf_tail(muf_no: &str) -> String {
    let chars: Vec<char> = muf_no.chars().collect();
    if chars.len() <= 6 {
        muf_no.to_string()
    } else {
        chars[chars.len() - 6..].iter().collect()
    }
}
