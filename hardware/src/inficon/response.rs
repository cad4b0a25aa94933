//! Payload types for the VGC50x command set.
//!
//! Every parser here is strict: a payload with the wrong number of fields,
//! a non-numeric field or an unknown code is a [`VgcError::Parse`]. Nothing
//! falls back to zero or NaN.

use bitflags::bitflags;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::link::{VgcError, VgcResult};

/// Pressure unit selectable with the `UNI` command.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ValueEnum,
    strum::EnumIter,
    strum::Display,
)]
#[repr(u8)]
pub enum PressureUnit {
    /// Millibar (code 0)
    #[strum(serialize = "mbar")]
    Mbar = 0,
    /// Torr (code 1)
    #[strum(serialize = "Torr")]
    Torr = 1,
    /// Pascal (code 2)
    #[strum(serialize = "Pa")]
    Pascal = 2,
    /// Micron, i.e. mTorr (code 3)
    #[strum(serialize = "Micron")]
    Micron = 3,
    /// Hectopascal (code 4)
    #[strum(serialize = "hPa")]
    Hectopascal = 4,
    /// Raw gauge voltage (code 5)
    #[strum(serialize = "V")]
    Volt = 5,
}

impl PressureUnit {
    /// Numeric code used on the wire.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a unit by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PressureUnit::Mbar),
            1 => Some(PressureUnit::Torr),
            2 => Some(PressureUnit::Pascal),
            3 => Some(PressureUnit::Micron),
            4 => Some(PressureUnit::Hectopascal),
            5 => Some(PressureUnit::Volt),
            _ => None,
        }
    }

    /// Parse a `UNI` payload (a single digit).
    pub fn parse(payload: &str) -> VgcResult<Self> {
        let code: u8 = payload
            .trim()
            .parse()
            .map_err(|_| VgcError::Parse(format!("Invalid unit payload: {payload:?}")))?;
        Self::from_code(code).ok_or_else(|| VgcError::Parse(format!("Unknown unit code: {code}")))
    }
}

/// Measurement status reported with each pressure value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[repr(u8)]
pub enum GaugeStatus {
    /// Measurement data okay
    #[strum(serialize = "ok")]
    Ok = 0,
    /// Below the sensor's measuring range
    #[strum(serialize = "underrange")]
    Underrange = 1,
    /// Above the sensor's measuring range
    #[strum(serialize = "overrange")]
    Overrange = 2,
    /// Sensor error
    #[strum(serialize = "sensor error")]
    SensorError = 3,
    /// Sensor switched off
    #[strum(serialize = "sensor off")]
    SensorOff = 4,
    /// No sensor connected
    #[strum(serialize = "no sensor")]
    NoSensor = 5,
    /// Sensor identification error
    #[strum(serialize = "identification error")]
    IdentificationError = 6,
}

impl GaugeStatus {
    /// Look up a status by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(GaugeStatus::Ok),
            1 => Some(GaugeStatus::Underrange),
            2 => Some(GaugeStatus::Overrange),
            3 => Some(GaugeStatus::SensorError),
            4 => Some(GaugeStatus::SensorOff),
            5 => Some(GaugeStatus::NoSensor),
            6 => Some(GaugeStatus::IdentificationError),
            _ => None,
        }
    }

    /// Whether the accompanying value is a usable measurement (possibly a range limit).
    pub fn has_measurement(self) -> bool {
        matches!(
            self,
            GaugeStatus::Ok | GaugeStatus::Underrange | GaugeStatus::Overrange
        )
    }

    fn parse(field: &str) -> VgcResult<Self> {
        let code: u8 = field
            .trim()
            .parse()
            .map_err(|_| VgcError::Parse(format!("Invalid status code: {field:?}")))?;
        Self::from_code(code).ok_or_else(|| VgcError::Parse(format!("Unknown status code: {code}")))
    }
}

/// One pressure reading of one gauge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaugeReading {
    /// 1-based gauge index
    pub gauge: u8,
    /// Status reported by the controller
    pub status: GaugeStatus,
    /// Pressure in the controller's current unit
    pub value: f64,
}

impl GaugeReading {
    /// Parse a `PRn` payload of the form `<status>,<value>`.
    ///
    /// # Example
    ///
    /// ```
    /// use gauge_hardware::inficon::{GaugeReading, GaugeStatus};
    ///
    /// let reading = GaugeReading::parse(1, "0,+1.0000E-03").unwrap();
    /// assert_eq!(reading.status, GaugeStatus::Ok);
    /// assert_eq!(reading.value, 1.0e-3);
    /// ```
    pub fn parse(gauge: u8, payload: &str) -> VgcResult<Self> {
        let fields: Vec<&str> = payload.trim().split(',').collect();
        if fields.len() != 2 {
            return Err(VgcError::Parse(format!(
                "Expected <status>,<value> but got {payload:?}"
            )));
        }
        Self::from_fields(gauge, fields[0], fields[1])
    }

    /// Parse a `PRX` payload: one `<status>,<value>` pair per gauge.
    pub fn parse_all(payload: &str) -> VgcResult<Vec<Self>> {
        let fields: Vec<&str> = payload.trim().split(',').collect();
        if fields.is_empty() || fields.len() % 2 != 0 {
            return Err(VgcError::Parse(format!(
                "Expected status/value pairs but got {payload:?}"
            )));
        }

        fields
            .chunks(2)
            .enumerate()
            .map(|(i, pair)| {
                let gauge = u8::try_from(i + 1)
                    .map_err(|_| VgcError::Parse("Too many gauges in response".to_string()))?;
                Self::from_fields(gauge, pair[0], pair[1])
            })
            .collect()
    }

    fn from_fields(gauge: u8, status: &str, value: &str) -> VgcResult<Self> {
        let status = GaugeStatus::parse(status)?;
        let value = parse_pressure(value)?;
        Ok(Self {
            gauge,
            status,
            value,
        })
    }
}

/// Parse a pressure field in the controller's `+1.0000E-03` notation.
fn parse_pressure(field: &str) -> VgcResult<f64> {
    let field = field.trim();
    // f64::from_str also accepts "inf" and "NaN", which the controller never sends.
    if field.is_empty()
        || !field
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return Err(VgcError::Parse(format!("Invalid pressure value: {field:?}")));
    }

    let value: f64 = field
        .parse()
        .map_err(|_| VgcError::Parse(format!("Invalid pressure value: {field:?}")))?;

    if !value.is_finite() || value < 0.0 {
        return Err(VgcError::Parse(format!(
            "Pressure out of physical range: {field:?}"
        )));
    }
    Ok(value)
}

/// Identity reported by the `AYT` command.
///
/// Fetched once when the controller is initialized and cached for the
/// lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Model name, e.g. `VGC502`
    pub model: String,
    /// Inficon part number
    pub part_number: String,
    /// Serial number
    pub serial_number: String,
    /// Firmware version
    pub firmware_version: String,
    /// Hardware version
    pub hardware_version: String,
}

impl DeviceIdentity {
    /// Parse an `AYT` payload:
    /// `<model>,<part-number>,<serial>,<firmware>,<hardware>`.
    pub fn parse(payload: &str) -> VgcResult<Self> {
        let fields: Vec<&str> = payload.trim().split(',').map(str::trim).collect();
        if fields.len() != 5 {
            return Err(VgcError::Parse(format!(
                "Expected 5 identity fields but got {}: {payload:?}",
                fields.len()
            )));
        }
        if fields.iter().any(|f| f.is_empty()) {
            return Err(VgcError::Parse(format!(
                "Empty identity field in {payload:?}"
            )));
        }

        Ok(Self {
            model: fields[0].to_string(),
            part_number: fields[1].to_string(),
            serial_number: fields[2].to_string(),
            firmware_version: fields[3].to_string(),
            hardware_version: fields[4].to_string(),
        })
    }

    /// Number of gauge channels implied by the model name.
    ///
    /// `VGC501` has one channel, `VGC502` two and `VGC503` three.
    pub fn gauge_count(&self) -> Option<u8> {
        match self.model.to_ascii_uppercase().as_str() {
            "VGC501" => Some(1),
            "VGC502" => Some(2),
            "VGC503" => Some(3),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (part {}, serial {}, firmware {}, hardware {})",
            self.model,
            self.part_number,
            self.serial_number,
            self.firmware_version,
            self.hardware_version
        )
    }
}

bitflags! {
    /// Error status reported by the `ERR` command.
    ///
    /// The payload is four binary digits; the leftmost is the most
    /// significant flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ErrorStatus: u8 {
        /// Controller error (see front panel display)
        const CONTROLLER_ERROR = 0b1000;
        /// No hardware
        const NO_HARDWARE = 0b0100;
        /// Inadmissible parameter
        const INADMISSIBLE_PARAMETER = 0b0010;
        /// Syntax error
        const SYNTAX_ERROR = 0b0001;
    }
}

impl ErrorStatus {
    /// Parse an `ERR` payload such as `0000` or `0010`.
    pub fn parse(payload: &str) -> VgcResult<Self> {
        let digits = payload.trim();
        if digits.len() != 4 || !digits.chars().all(|c| c == '0' || c == '1') {
            return Err(VgcError::Parse(format!(
                "Expected four binary digits but got {payload:?}"
            )));
        }
        let bits = u8::from_str_radix(digits, 2)
            .map_err(|_| VgcError::Parse(format!("Invalid error status: {payload:?}")))?;
        Ok(Self::from_bits_truncate(bits))
    }
}

/// Parse a `TID` payload into one sensor type name per gauge.
pub fn parse_sensor_types(payload: &str) -> VgcResult<Vec<String>> {
    let types: Vec<String> = payload
        .trim()
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();
    if types.iter().any(String::is_empty) {
        return Err(VgcError::Parse(format!(
            "Empty sensor type in {payload:?}"
        )));
    }
    Ok(types)
}
