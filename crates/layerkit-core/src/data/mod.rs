//! Data models for printer telemetry and speed ramps.
//!
//! - [`mirror`]: the Device State Mirror, a catalogue of observable cells
//! - [`print_state`]: print task states and timestamped transitions
//! - [`ramp`]: ramp requests, plans, and the interpolation math
//! - [`telemetry`]: typed upstream notifications and payload records

pub mod mirror;
pub mod print_state;
pub mod ramp;
pub mod telemetry;

pub use mirror::{DeviceStateMirror, DEFAULT_ALL_AXES_MASK, EMULATED_LAYER, EMULATED_SPEED};
pub use print_state::{PrintStage, PrintState, StateTransition};
pub use ramp::{interpolate, ramp_speed_levels, GateMode, RampPlan, RampRequest};
pub use telemetry::{ButtonEvent, ModuleVersion, Payload, TelemetryEvent};
