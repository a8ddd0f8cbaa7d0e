//! Rendering of sizes, rates and durations for the result table.
use crate::op::OpKind;
use crate::sample::MetricSample;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Unit used to display rates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum RateUnit {
    /// Gigabits per second.
    #[default]
    #[value(name = "Gbps")]
    #[serde(rename = "Gbps")]
    Gbps,

    /// Gigabytes per second.
    #[value(name = "GBps")]
    #[serde(rename = "GBps")]
    GBps,
}

impl RateUnit {
    /// Convert bytes per second into this unit.
    pub fn scale(self, bytes_per_sec: f64) -> f64 {
        match self {
            RateUnit::Gbps => bytes_per_sec * 8.0 / 1.0e9,
            RateUnit::GBps => bytes_per_sec / 1.0e9,
        }
    }
}

impl fmt::Display for RateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateUnit::Gbps => f.write_str("Gbps"),
            RateUnit::GBps => f.write_str("GBps"),
        }
    }
}

/// Render a byte count with a 1024-based suffix, e.g. `1.50 MB`.
pub fn human_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, BYTE_UNITS[unit])
}

/// Inverse of [`human_bytes`], returns `None` for unknown input.
pub fn parse_human_bytes(s: &str) -> Option<f64> {
    let mut parts = s.split_whitespace();
    let value: f64 = parts.next()?.parse().ok()?;
    let unit = parts.next().unwrap_or("B");
    if parts.next().is_some() {
        return None;
    }
    let exponent = BYTE_UNITS.iter().position(|u| u.eq_ignore_ascii_case(unit))?;
    Some(value * 1024f64.powi(exponent as i32))
}

/// Presentation of metric values, either human-readable or raw numbers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MetricFormatter {
    pub raw: bool,
    pub unit: RateUnit,
}

impl MetricFormatter {
    pub fn new(raw: bool, unit: RateUnit) -> MetricFormatter {
        MetricFormatter { raw, unit }
    }

    pub fn size(&self, bytes: usize) -> String {
        if self.raw {
            bytes.to_string()
        } else {
            human_bytes(bytes as u64)
        }
    }

    /// Render a rate given in bytes per second.
    pub fn rate(&self, bytes_per_sec: f64) -> String {
        let value = self.unit.scale(bytes_per_sec);
        if self.raw {
            format!("{:.3}", value)
        } else {
            format!("{:.3} {}", value, self.unit)
        }
    }

    /// Render a duration given in seconds as milliseconds.
    pub fn duration(&self, seconds: f64) -> String {
        let ms = seconds * 1.0e3;
        if self.raw {
            format!("{:.3}", ms)
        } else {
            format!("{:.3} ms", ms)
        }
    }

    /// Table header printed before the rows of one operation.
    pub fn header(&self, op: OpKind) -> String {
        let tput = format!("Throughput ({})", self.unit);
        let busbw = format!("BusBW ({})", self.unit);
        let columns = format!(
            "{:<20} {:<25} {:<20} {:<20} {:<20}",
            "Size (Bytes)", "Description", "Duration", tput, busbw
        );
        format!(
            "\n---- Performing {} benchmark ----\n{}\n{}",
            op,
            columns.trim_end(),
            "-".repeat(100)
        )
    }

    /// One table row.
    pub fn row(&self, sample: &MetricSample) -> String {
        let line = format!(
            "{:<20} {:<25} {:<20} {:<20} {:<20}",
            self.size(sample.bytes),
            format!("{}x{}", sample.elements, sample.element_size),
            self.duration(sample.duration),
            self.rate(sample.throughput),
            self.rate(sample.bus_bandwidth),
        );
        line.trim_end().to_string()
    }
}
