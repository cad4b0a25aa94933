mod config;
mod link;
pub mod poll;
mod response;
mod vgc502;

pub use config::{ChannelConfig, ControllerConfig, PollConfig};
pub use link::{
    Connection, VgcError, VgcResult, ACK, DEFAULT_PORT, DEFAULT_TIMEOUT, ENQ, NAK, TERMINATOR,
};
pub use response::{
    parse_sensor_types, DeviceIdentity, ErrorStatus, GaugeReading, GaugeStatus, PressureUnit,
};
pub use vgc502::{ControllerState, Vgc502};
