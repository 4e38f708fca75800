//! Upstream notifications and the records carried in device reports.

use serde::{Deserialize, Serialize};

use super::print_state::{PrintStage, PrintState};

/// Decoded inbound payload. Decoding happens once per event, in the dispatcher.
pub type Payload = serde_json::Value;

/// Typed notification from the device's telemetry callbacks.
///
/// Each variant feeds exactly one mirror cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryEvent {
    /// Current layer changed
    LayerChanged(i32),
    /// Total layer count of the running task changed
    TotalLayersChanged(i32),
    /// Speed percentage reported by the speed query
    SpeedReported(f64),
    /// Task stage changed
    StageChanged(PrintStage),
    /// Device entered or left sleep
    SleepChanged(bool),
    /// Device is about to sleep
    AboutToSleepChanged(bool),
    /// Homing status bitmask
    HomingStatus(u32),
    /// Print task state changed
    PrintStateChanged(PrintState),
    /// Print idle flag changed
    PrintIdleChanged(bool),
    /// Filament runout sensor changed
    FilamentRunout(bool),
}

impl std::fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryEvent::LayerChanged(layer) => write!(f, "Layer: {}", layer),
            TelemetryEvent::TotalLayersChanged(total) => write!(f, "Total layers: {}", total),
            TelemetryEvent::SpeedReported(speed) => write!(f, "Speed: {}%", speed),
            TelemetryEvent::StageChanged(stage) => write!(f, "Stage: {}", stage.0),
            TelemetryEvent::SleepChanged(sleeping) => write!(f, "Sleeping: {}", sleeping),
            TelemetryEvent::AboutToSleepChanged(v) => write!(f, "About to sleep: {}", v),
            TelemetryEvent::HomingStatus(mask) => write!(f, "Homed mask: {:#b}", mask),
            TelemetryEvent::PrintStateChanged(state) => write!(f, "Print state: {}", state),
            TelemetryEvent::PrintIdleChanged(idle) => write!(f, "Print idle: {}", idle),
            TelemetryEvent::FilamentRunout(runout) => write!(f, "Filament runout: {}", runout),
        }
    }
}

/// Firmware module version record from a `get_version` report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModuleVersion {
    /// Module name, e.g. `ota`, `mc`, `ams/0`
    pub name: String,
    /// Hardware revision
    #[serde(default)]
    pub hw_ver: String,
    /// Serial number
    #[serde(default)]
    pub sn: String,
    /// Software version
    #[serde(default)]
    pub sw_ver: String,
}

/// Physical button event relayed by the GPIO key daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonEvent {
    /// Button name, e.g. `power`, `estop`
    pub button: String,
    /// Press kind, e.g. `shortPress`, `longPress`
    pub event: String,
}
