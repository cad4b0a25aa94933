//! Inficon VGC50x Vacuum Gauge Controller Driver
//!
//! High-level interface to the Inficon VGC501, VGC502 and VGC503 controllers,
//! which read one to three active vacuum gauges and report pressures over
//! Ethernet.
//!
//! # Overview
//!
//! - **Pressure**: [`get_pressure`](Vgc502::get_pressure),
//!   [`read_gauge`](Vgc502::read_gauge), [`read_all`](Vgc502::read_all)
//! - **Units**: [`get_unit`](Vgc502::get_unit), [`set_unit`](Vgc502::set_unit)
//! - **Identity**: [`read_identity`](Vgc502::read_identity),
//!   [`sensor_types`](Vgc502::sensor_types)
//! - **Diagnostics**: [`error_status`](Vgc502::error_status)
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --connect()--> Connected --initialize()--> Ready
//!      ^                                                    |
//!      +------------- shutdown() or socket failure ---------+
//! ```
//!
//! Pressure and unit queries are only allowed in [`ControllerState::Ready`];
//! in any other state they fail with [`VgcError::NotConnected`] without
//! touching the socket. A socket failure drops the connection, and
//! reconnecting is left to the caller.
//!
//! # Example
//!
//! ```no_run
//! use gauge_hardware::inficon::{ControllerConfig, PressureUnit, Vgc502};
//!
//! let mut vgc = Vgc502::open(ControllerConfig::new("192.168.1.60"))?;
//! println!("Connected to: {}", vgc.identity().unwrap());
//!
//! vgc.set_unit(PressureUnit::Torr)?;
//! for gauge in 1..=vgc.gauge_count().unwrap_or(0) {
//!     println!("Gauge {gauge}: {:e} Torr", vgc.get_pressure(gauge)?);
//! }
//!
//! vgc.shutdown();
//! # Ok::<(), gauge_hardware::inficon::VgcError>(())
//! ```

use tracing::{debug, info, warn};

use super::config::ControllerConfig;
use super::link::{Connection, VgcError, VgcResult};
use super::response::{
    parse_sensor_types, DeviceIdentity, ErrorStatus, GaugeReading, PressureUnit,
};
use crate::device::{AtomicValue, Device};

/// Connection state of a [`Vgc502`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ControllerState {
    /// No socket open
    Disconnected,
    /// Socket open, identity not yet read
    Connected,
    /// Identity cached, all queries allowed
    Ready,
}

/// Driver for an Inficon VGC50x gauge controller.
///
/// Owns at most one [`Connection`]. Not internally synchronized: callers
/// sharing an instance across threads must serialize access themselves.
pub struct Vgc502 {
    config: ControllerConfig,
    link: Option<Connection>,
    identity: Option<DeviceIdentity>,
    gauge_count: Option<u8>,
    unit: Option<PressureUnit>,
}

impl Vgc502 {
    /// Create a driver in the `Disconnected` state. Nothing is opened yet.
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            link: None,
            identity: None,
            gauge_count: None,
            unit: None,
        }
    }

    /// Create a driver and bring it to `Ready`.
    pub fn open(config: ControllerConfig) -> VgcResult<Self> {
        let mut vgc = Self::new(config);
        vgc.initialize()?;
        Ok(vgc)
    }

    /// Connection settings.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        match (&self.link, &self.identity) {
            (None, _) => ControllerState::Disconnected,
            (Some(_), None) => ControllerState::Connected,
            (Some(_), Some(_)) => ControllerState::Ready,
        }
    }

    /// Cached identity, available once `Ready`.
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Number of gauge channels, available once `Ready`.
    pub fn gauge_count(&self) -> Option<u8> {
        self.gauge_count
    }

    /// Unit from the last successful `get_unit` or `set_unit`.
    pub fn cached_unit(&self) -> Option<PressureUnit> {
        self.unit
    }

    /// Open the TCP connection. Does nothing if already connected.
    ///
    /// # Errors
    ///
    /// Returns [`VgcError::Connection`] if the controller cannot be reached.
    pub fn connect(&mut self) -> VgcResult<()> {
        if self.link.is_some() {
            return Ok(());
        }

        self.config.validate()?;
        let link = Connection::connect(
            &self.config.host,
            self.config.port,
            self.config.timeout(),
        )?;
        info!("Connected to VGC controller at {}", link.peer());
        self.link = Some(link);
        Ok(())
    }

    /// Connect if needed, then read and cache identity and unit.
    ///
    /// The driver is `Ready` only if both reads succeed. If the unit query
    /// fails on a live socket, the cached identity is dropped again and the
    /// driver stays `Connected`.
    pub fn initialize(&mut self) -> VgcResult<()> {
        self.connect()?;
        let identity = self.read_identity()?;
        info!("Connected to: {}", identity);

        match self.query_unit() {
            Ok(unit) => {
                debug!("Gauge count: {:?}, unit: {}", self.gauge_count, unit);
                Ok(())
            }
            Err(e) => {
                self.clear_cache();
                Err(e)
            }
        }
    }

    /// Close the connection and forget cached device information.
    pub fn shutdown(&mut self) {
        if let Some(link) = self.link.take() {
            info!("Closing connection to {}", link.peer());
        }
        self.clear_cache();
    }

    fn clear_cache(&mut self) {
        self.identity = None;
        self.gauge_count = None;
        self.unit = None;
    }

    /// Run one exchange, dropping the connection if the socket failed.
    fn exchange(&mut self, code: &str, args: &[&str]) -> VgcResult<String> {
        let link = self.link.as_mut().ok_or(VgcError::NotConnected)?;
        match link.query(code, args) {
            Ok(payload) => Ok(payload),
            Err(e) if e.is_fatal() => {
                warn!("Connection lost during {}: {}", code, e);
                self.link = None;
                self.clear_cache();
                Err(e)
            }
            Err(e) => {
                warn!("{} failed: {}", code, e);
                Err(e)
            }
        }
    }

    fn require_ready(&self) -> VgcResult<()> {
        match self.state() {
            ControllerState::Ready => Ok(()),
            _ => Err(VgcError::NotConnected),
        }
    }

    fn check_gauge(&self, gauge: u8) -> VgcResult<()> {
        let count = self.gauge_count.ok_or(VgcError::NotConnected)?;
        if gauge == 0 || gauge > count {
            return Err(VgcError::InvalidArgument(format!(
                "Gauge index {gauge} outside 1..={count}"
            )));
        }
        Ok(())
    }

    // ==================== Identity ====================

    /// Query the `AYT` identity and cache it, making the driver `Ready`.
    ///
    /// The gauge count comes from the config if set, otherwise from the model.
    pub fn read_identity(&mut self) -> VgcResult<DeviceIdentity> {
        let payload = self.exchange("AYT", &[])?;
        let identity = DeviceIdentity::parse(&payload)?;

        let count = self
            .config
            .gauge_count
            .or_else(|| identity.gauge_count())
            .ok_or_else(|| {
                VgcError::Parse(format!(
                    "Cannot derive gauge count from model {:?}",
                    identity.model
                ))
            })?;

        self.gauge_count = Some(count);
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    /// Sensor type connected to each gauge channel (`TID`).
    pub fn sensor_types(&mut self) -> VgcResult<Vec<String>> {
        self.require_ready()?;
        let payload = self.exchange("TID", &[])?;
        parse_sensor_types(&payload)
    }

    // ==================== Pressure ====================

    /// Read gauge `gauge` (1-based) including its status.
    pub fn read_gauge(&mut self, gauge: u8) -> VgcResult<GaugeReading> {
        self.require_ready()?;
        self.check_gauge(gauge)?;
        let payload = self.exchange(&format!("PR{gauge}"), &[])?;
        GaugeReading::parse(gauge, &payload)
    }

    /// Pressure of gauge `gauge` (1-based) in the current unit.
    ///
    /// # Errors
    ///
    /// - [`VgcError::InvalidArgument`] if `gauge` is outside `1..=gauge_count`
    /// - [`VgcError::Parse`] if the payload is malformed
    /// - [`VgcError::SensorStatus`] if the gauge has no measurement (sensor
    ///   off, missing or faulty)
    pub fn get_pressure(&mut self, gauge: u8) -> VgcResult<f64> {
        let reading = self.read_gauge(gauge)?;
        if !reading.status.has_measurement() {
            return Err(VgcError::SensorStatus {
                gauge,
                status: reading.status,
            });
        }
        Ok(reading.value)
    }

    /// Read every gauge in one `PRX` exchange.
    pub fn read_all(&mut self) -> VgcResult<Vec<GaugeReading>> {
        self.require_ready()?;
        let payload = self.exchange("PRX", &[])?;
        let readings = GaugeReading::parse_all(&payload)?;

        let expected = usize::from(self.gauge_count.unwrap_or(0));
        if readings.len() != expected {
            return Err(VgcError::Parse(format!(
                "Expected {expected} readings but got {}",
                readings.len()
            )));
        }
        Ok(readings)
    }

    // ==================== Units ====================

    fn query_unit(&mut self) -> VgcResult<PressureUnit> {
        let payload = self.exchange("UNI", &[])?;
        let unit = PressureUnit::parse(&payload)?;
        self.unit = Some(unit);
        Ok(unit)
    }

    /// Read the pressure unit currently configured on the controller.
    pub fn get_unit(&mut self) -> VgcResult<PressureUnit> {
        self.require_ready()?;
        self.query_unit()
    }

    /// Select a pressure unit.
    ///
    /// Returns `true` only if the controller echoes the requested unit back.
    /// On a mismatched echo the cached unit is left unchanged.
    pub fn set_unit(&mut self, unit: PressureUnit) -> VgcResult<bool> {
        self.require_ready()?;
        let code = unit.code().to_string();
        let payload = self.exchange("UNI", &[&code])?;
        let echoed = PressureUnit::parse(&payload)?;

        if echoed != unit {
            warn!("Requested unit {} but controller reports {}", unit, echoed);
            return Ok(false);
        }
        self.unit = Some(unit);
        Ok(true)
    }

    /// Select a pressure unit by its numeric code (0-5).
    ///
    /// # Errors
    ///
    /// Returns [`VgcError::InvalidArgument`] for an unknown code, before
    /// anything is sent.
    pub fn set_unit_code(&mut self, code: u8) -> VgcResult<bool> {
        let unit = PressureUnit::from_code(code).ok_or_else(|| {
            VgcError::InvalidArgument(format!("Unknown unit code {code}, expected 0-5"))
        })?;
        self.set_unit(unit)
    }

    // ==================== Diagnostics ====================

    /// Controller error flags (`ERR`).
    pub fn error_status(&mut self) -> VgcResult<ErrorStatus> {
        self.require_ready()?;
        let payload = self.exchange("ERR", &[])?;
        ErrorStatus::parse(&payload)
    }

    /// Send an arbitrary mnemonic and return the raw payload.
    ///
    /// Needs an open connection but not a cached identity.
    pub fn query_raw(&mut self, code: &str, args: &[&str]) -> VgcResult<String> {
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(VgcError::InvalidArgument(format!(
                "Invalid mnemonic: {code:?}"
            )));
        }
        // Arguments end up inside the same frame, so no separators or control bytes.
        if let Some(arg) = args
            .iter()
            .find(|a| !a.chars().all(|c| c.is_ascii_graphic() && c != ','))
        {
            return Err(VgcError::InvalidArgument(format!(
                "Invalid argument: {arg:?}"
            )));
        }
        self.exchange(code, args)
    }
}

impl Device for Vgc502 {
    type Error = VgcError;

    fn initialize(&mut self) -> VgcResult<()> {
        Vgc502::initialize(self)
    }

    /// Supported names: `pressure<N>`, `unit`, `gauge_count`, `model`,
    /// `part_number`, `serial_number`, `firmware_version`, `hardware_version`.
    fn get_atomic_value(&mut self, name: &str) -> VgcResult<AtomicValue> {
        if let Some(index) = name.strip_prefix("pressure") {
            let gauge: u8 = index
                .parse()
                .map_err(|_| VgcError::InvalidArgument(format!("Invalid gauge in {name:?}")))?;
            return self.get_pressure(gauge).map(AtomicValue::Float);
        }

        if name == "unit" {
            return self.get_unit().map(|u| AtomicValue::Text(u.to_string()));
        }

        self.require_ready()?;
        if name == "gauge_count" {
            return Ok(AtomicValue::Integer(i64::from(self.gauge_count.unwrap_or(0))));
        }

        let identity = self.identity.as_ref().ok_or(VgcError::NotConnected)?;
        let text = match name {
            "model" => &identity.model,
            "part_number" => &identity.part_number,
            "serial_number" => &identity.serial_number,
            "firmware_version" => &identity.firmware_version,
            "hardware_version" => &identity.hardware_version,
            _ => {
                return Err(VgcError::InvalidArgument(format!(
                    "Unknown value name: {name:?}"
                )))
            }
        };
        Ok(AtomicValue::Text(text.clone()))
    }

    fn shutdown(&mut self) -> VgcResult<()> {
        Vgc502::shutdown(self);
        Ok(())
    }
}
