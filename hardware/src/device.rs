//! Generic device lifecycle trait for acquisition hosts.

/// A single named value read from a device.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    /// Floating point measurement
    Float(f64),
    /// Integer quantity
    Integer(i64),
    /// Free-form text such as identity fields
    Text(String),
}

impl AtomicValue {
    /// The value as a float, if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AtomicValue::Float(v) => Some(*v),
            AtomicValue::Integer(v) => Some(*v as f64),
            AtomicValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomicValue::Float(v) => write!(f, "{v:e}"),
            AtomicValue::Integer(v) => write!(f, "{v}"),
            AtomicValue::Text(s) => f.write_str(s),
        }
    }
}

/// Interface for instruments driven by a host process.
///
/// The host calls [`initialize`](Device::initialize) once, reads values by
/// name, and calls [`shutdown`](Device::shutdown) when done.
pub trait Device {
    /// Error type reported by the driver
    type Error: std::error::Error;

    /// Open the connection and cache static device information.
    fn initialize(&mut self) -> Result<(), Self::Error>;

    /// Read a single named value, e.g. `"pressure1"`.
    fn get_atomic_value(&mut self, name: &str) -> Result<AtomicValue, Self::Error>;

    /// Close the connection.
    fn shutdown(&mut self) -> Result<(), Self::Error>;
}
