//! # Layerkit Core
//!
//! Core types, traits, and utilities for layerkit.
//! Provides the reactive building blocks (observable cells), the device
//! state mirror, ramp math, and the error taxonomy shared by every crate.

pub mod cell;
pub mod data;
pub mod error;
pub mod types;

pub use cell::{CellView, ObservableCell, SubscriptionToken};

pub use data::{
    interpolate, ramp_speed_levels, ButtonEvent, DeviceStateMirror, GateMode, ModuleVersion,
    Payload, PrintState, RampPlan, RampRequest, StateTransition, TelemetryEvent, PrintStage,
    DEFAULT_ALL_AXES_MASK, EMULATED_LAYER, EMULATED_SPEED,
};

pub use error::{DecodeError, Error, HandlerError, HandlerResult, RampError, Result, SinkError};

pub use types::{thread_safe_rw_map, ThreadSafeRwMap};
