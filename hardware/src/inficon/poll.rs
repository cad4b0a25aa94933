//! Periodic pressure logging.
//!
//! [`poll_channels`] runs one pass over the configured channels. A failed
//! channel is recorded in its sample instead of aborting the pass, so one
//! faulty gauge does not hide the others.

use std::borrow::Cow;
use std::io::Write;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::config::ChannelConfig;
use super::link::VgcResult;
use super::vgc502::Vgc502;

/// One logged reading.
#[derive(Debug)]
pub struct PressureSample {
    /// Time the exchange completed
    pub timestamp: DateTime<Utc>,
    /// 1-based gauge index
    pub gauge: u8,
    /// Field name, e.g. `chamber2`
    pub field: String,
    /// Unit label from the channel configuration
    pub units: String,
    /// Pressure, or the error that prevented reading it
    pub pressure: VgcResult<f64>,
}

impl PressureSample {
    /// CSV header matching [`write_csv`](Self::write_csv).
    pub const CSV_HEADER: &'static str = "timestamp,gauge,field,units,pressure";

    /// Write this sample as one CSV row. Failed readings leave the
    /// pressure column empty. Text columns are quoted when needed.
    pub fn write_csv<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let pressure = match &self.pressure {
            Ok(p) => format!("{p:e}"),
            Err(_) => String::new(),
        };
        writeln!(
            out,
            "{},{},{},{},{}",
            self.timestamp.to_rfc3339(),
            self.gauge,
            csv_field(&self.field),
            csv_field(&self.units),
            pressure
        )
    }
}

/// Quote a text column if it contains a separator, quote or line break.
fn csv_field(text: &str) -> Cow<'_, str> {
    if text.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", text.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(text)
    }
}

/// Read each channel once.
///
/// Stops early only when the connection is lost, since every further
/// exchange would fail with [`VgcError::NotConnected`](super::VgcError::NotConnected).
pub fn poll_channels(vgc: &mut Vgc502, channels: &[(u8, &ChannelConfig)]) -> Vec<PressureSample> {
    let mut samples = Vec::with_capacity(channels.len());

    for &(gauge, channel) in channels {
        let pressure = vgc.get_pressure(gauge);
        let sample = PressureSample {
            timestamp: Utc::now(),
            gauge,
            field: format!("{}{}", channel.field, gauge),
            units: channel.units.clone(),
            pressure,
        };

        match &sample.pressure {
            Ok(p) => debug!("{} = {:e} {}", sample.field, p, sample.units),
            Err(e) => warn!("Gauge {} read failed: {}", gauge, e),
        }

        let fatal = matches!(&sample.pressure, Err(e) if e.is_fatal());
        samples.push(sample);
        if fatal {
            info!("Connection lost, ending polling pass early");
            break;
        }
    }

    samples
}
