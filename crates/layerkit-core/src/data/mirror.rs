//! Device State Mirror.
//!
//! Last-known printer telemetry held in [`ObservableCell`]s. Every cell has
//! exactly one writer method on [`DeviceStateMirror`]; readers get
//! [`CellView`]s and cannot write. The mirror never rejects what the device
//! reports, it only records and logs it.

use chrono::Utc;
use std::collections::BTreeMap;

use super::print_state::{PrintState, StateTransition};
use super::ramp::RampPlan;
use super::telemetry::{ButtonEvent, ModuleVersion, Payload, TelemetryEvent};
use crate::cell::{CellView, ObservableCell};

/// Homing bitmask with X, Y and Z homed
pub const DEFAULT_ALL_AXES_MASK: u32 = 0b111;

/// Layer number reported for every layer change while emulating
pub const EMULATED_LAYER: i32 = 100;

/// Print speed assumed while emulating
pub const EMULATED_SPEED: f64 = 100.0;

/// Observable mirror of the printer's state
#[derive(Debug)]
pub struct DeviceStateMirror {
    all_axes_mask: u32,
    emulating: bool,

    layer_number: ObservableCell<i32>,
    total_layer_number: ObservableCell<i32>,
    print_speed_percent: ObservableCell<f64>,
    printing: ObservableCell<bool>,
    sleeping: ObservableCell<bool>,
    about_to_sleep: ObservableCell<bool>,
    homed: ObservableCell<bool>,
    print_idle: ObservableCell<bool>,
    filament_runout: ObservableCell<bool>,
    print_state: ObservableCell<Option<PrintState>>,
    last_transition: ObservableCell<Option<StateTransition>>,

    print_gcode_action: ObservableCell<i64>,
    firmware_versions: ObservableCell<Vec<ModuleVersion>>,
    last_button_event: ObservableCell<Option<ButtonEvent>>,
    settings: ObservableCell<BTreeMap<String, Payload>>,
    ramp: ObservableCell<Option<RampPlan>>,
}

impl DeviceStateMirror {
    /// Create a mirror with the default axes mask, not emulating
    pub fn new() -> Self {
        Self::with_options(DEFAULT_ALL_AXES_MASK, false)
    }

    /// Create a mirror with an explicit homing mask and emulation flag
    pub fn with_options(all_axes_mask: u32, emulating: bool) -> Self {
        Self {
            all_axes_mask,
            emulating,
            layer_number: ObservableCell::new("layer_number", -1),
            total_layer_number: ObservableCell::new("total_layer_number", -1),
            print_speed_percent: ObservableCell::new("print_speed_percent", -1.0),
            printing: ObservableCell::new("printing", false),
            sleeping: ObservableCell::new("sleeping", false),
            about_to_sleep: ObservableCell::new("about_to_sleep", false),
            homed: ObservableCell::new("homed", false),
            print_idle: ObservableCell::new("print_idle", false),
            filament_runout: ObservableCell::new("filament_runout", false),
            print_state: ObservableCell::new("print_state", None),
            last_transition: ObservableCell::new("last_transition", None),
            print_gcode_action: ObservableCell::new("print_gcode_action", -1),
            firmware_versions: ObservableCell::new("firmware_versions", Vec::new()),
            last_button_event: ObservableCell::new("last_button_event", None),
            settings: ObservableCell::new("settings", BTreeMap::new()),
            ramp: ObservableCell::new("ramp", None),
        }
    }

    /// Whether the mirror substitutes fixed test values for layer and speed
    pub fn is_emulating(&self) -> bool {
        self.emulating
    }

    /// Mask that must be fully set for the printer to count as homed
    pub fn all_axes_mask(&self) -> u32 {
        self.all_axes_mask
    }

    /// Route one telemetry notification to its cell
    pub fn apply(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::LayerChanged(layer) => {
                let layer = if self.emulating { EMULATED_LAYER } else { layer };
                tracing::debug!("Layer number changed: {}", layer);
                self.layer_number.set(layer);
            }
            TelemetryEvent::TotalLayersChanged(total) => self.total_layer_number.set(total),
            TelemetryEvent::SpeedReported(speed) => self.print_speed_percent.set(speed),
            TelemetryEvent::StageChanged(stage) => {
                let printing = stage.is_printing();
                tracing::debug!("Print status changed: {}", printing);
                self.printing.set(printing);
            }
            TelemetryEvent::SleepChanged(sleeping) => {
                tracing::debug!("Sleep state changed: {}", sleeping);
                self.sleeping.set(sleeping);
            }
            TelemetryEvent::AboutToSleepChanged(v) => self.about_to_sleep.set(v),
            TelemetryEvent::HomingStatus(mask) => {
                let all = self.all_axes_mask;
                self.homed.set((mask & all) == all);
            }
            TelemetryEvent::PrintStateChanged(state) => self.record_print_state(state),
            TelemetryEvent::PrintIdleChanged(idle) => self.print_idle.set(idle),
            TelemetryEvent::FilamentRunout(runout) => self.filament_runout.set(runout),
        }
    }

    fn record_print_state(&self, state: PrintState) {
        let previous = self.print_state.get();
        tracing::info!(
            "Print task: {} (was {})",
            state,
            previous.map_or_else(|| "unreported".to_string(), |s| s.to_string())
        );
        self.print_state.set(Some(state));
        self.last_transition.set(Some(StateTransition {
            from: previous,
            to: state,
            at: Utc::now(),
        }));
    }

    /// Record the gcode claim action from a push_status report.
    ///
    /// Returns true if the value changed.
    pub fn record_gcode_action(&self, action: i64) -> bool {
        self.print_gcode_action.set_if_changed(action)
    }

    /// Record the module list from a get_version report
    pub fn record_versions(&self, versions: Vec<ModuleVersion>) {
        tracing::debug!("Firmware versions reported for {} modules", versions.len());
        self.firmware_versions.set(versions);
    }

    /// Record a GPIO button event
    pub fn record_button_event(&self, event: ButtonEvent) {
        tracing::debug!("Button {} {}", event.button, event.event);
        self.last_button_event.set(Some(event));
    }

    /// Store one setting in the in-memory settings map
    pub fn put_setting(&self, key: impl Into<String>, value: Payload) {
        let mut settings = self.settings.get();
        settings.insert(key.into(), value);
        self.settings.set(settings);
    }

    /// Look up one setting, if present
    pub fn setting(&self, key: &str) -> Option<Payload> {
        self.settings.get().get(key).cloned()
    }

    /// Publish the ramp currently configured on the controller
    pub fn publish_ramp(&self, plan: Option<RampPlan>) {
        self.ramp.set(plan);
    }

    /// Speed the ramp controller should assume the printer is running at
    pub fn current_speed(&self) -> f64 {
        if self.emulating {
            EMULATED_SPEED
        } else {
            self.print_speed_percent.get()
        }
    }

    /// Current layer
    pub fn layer_number(&self) -> CellView<'_, i32> {
        self.layer_number.view()
    }

    /// Total layers of the running task
    pub fn total_layer_number(&self) -> CellView<'_, i32> {
        self.total_layer_number.view()
    }

    /// Last reported speed percentage, -1 until reported
    pub fn print_speed_percent(&self) -> CellView<'_, f64> {
        self.print_speed_percent.view()
    }

    /// Whether a print is under way
    pub fn printing(&self) -> CellView<'_, bool> {
        self.printing.view()
    }

    /// Whether the device sleeps
    pub fn sleeping(&self) -> CellView<'_, bool> {
        self.sleeping.view()
    }

    /// Whether the device is about to sleep
    pub fn about_to_sleep(&self) -> CellView<'_, bool> {
        self.about_to_sleep.view()
    }

    /// Whether every axis in the configured mask is homed
    pub fn homed(&self) -> CellView<'_, bool> {
        self.homed.view()
    }

    /// Print idle flag
    pub fn print_idle(&self) -> CellView<'_, bool> {
        self.print_idle.view()
    }

    /// Filament runout flag
    pub fn filament_runout(&self) -> CellView<'_, bool> {
        self.filament_runout.view()
    }

    /// Print task state, `None` until reported
    pub fn print_state(&self) -> CellView<'_, Option<PrintState>> {
        self.print_state.view()
    }

    /// Most recent print state transition
    pub fn last_transition(&self) -> CellView<'_, Option<StateTransition>> {
        self.last_transition.view()
    }

    /// Gcode claim action, -1 until reported
    pub fn print_gcode_action(&self) -> CellView<'_, i64> {
        self.print_gcode_action.view()
    }

    /// Firmware module versions
    pub fn firmware_versions(&self) -> CellView<'_, Vec<ModuleVersion>> {
        self.firmware_versions.view()
    }

    /// Most recent GPIO button event
    pub fn last_button_event(&self) -> CellView<'_, Option<ButtonEvent>> {
        self.last_button_event.view()
    }

    /// In-memory settings map
    pub fn settings(&self) -> CellView<'_, BTreeMap<String, Payload>> {
        self.settings.view()
    }

    /// Ramp currently configured on the controller
    pub fn ramp(&self) -> CellView<'_, Option<RampPlan>> {
        self.ramp.view()
    }
}

impl Default for DeviceStateMirror {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::print_state::PrintStage;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_homed_requires_full_mask() {
        let mirror = DeviceStateMirror::new();
        for (mask, expected) in [
            (0, false),
            (0b001, false),
            (0b011, false),
            (0b110, false),
            (0b111, true),
            (0b1111, true),
        ] {
            mirror.apply(TelemetryEvent::HomingStatus(mask));
            assert_eq!(mirror.homed().get(), expected, "mask {:#b}", mask);
        }
    }

    #[test]
    fn test_homed_with_custom_mask() {
        let mirror = DeviceStateMirror::with_options(0b1000_0111, false);
        mirror.apply(TelemetryEvent::HomingStatus(0b111));
        assert!(!mirror.homed().get());
        mirror.apply(TelemetryEvent::HomingStatus(0b1000_0111));
        assert!(mirror.homed().get());
    }

    #[test]
    fn test_layer_passthrough_and_emulation() {
        let mirror = DeviceStateMirror::new();
        mirror.apply(TelemetryEvent::LayerChanged(42));
        assert_eq!(mirror.layer_number().get(), 42);

        let emulated = DeviceStateMirror::with_options(DEFAULT_ALL_AXES_MASK, true);
        emulated.apply(TelemetryEvent::LayerChanged(42));
        assert_eq!(emulated.layer_number().get(), EMULATED_LAYER);
        assert_eq!(emulated.current_speed(), EMULATED_SPEED);
    }

    #[test]
    fn test_stage_drives_printing() {
        let mirror = DeviceStateMirror::new();
        mirror.apply(TelemetryEvent::StageChanged(PrintStage::WORKING));
        assert!(mirror.printing().get());
        mirror.apply(TelemetryEvent::StageChanged(PrintStage(0)));
        assert!(!mirror.printing().get());
    }

    #[test]
    fn test_print_state_transitions_are_never_rejected() {
        let mirror = DeviceStateMirror::new();
        mirror.apply(TelemetryEvent::PrintStateChanged(PrintState::Finished));
        mirror.apply(TelemetryEvent::PrintStateChanged(PrintState::Working));

        assert_eq!(mirror.print_state().get(), Some(PrintState::Working));
        let transition = mirror.last_transition().get().expect("transition recorded");
        assert_eq!(transition.from, Some(PrintState::Finished));
        assert_eq!(transition.to, PrintState::Working);
    }

    #[test]
    fn test_cells_notify_on_each_write() {
        let mirror = DeviceStateMirror::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        mirror.sleeping().subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        mirror.apply(TelemetryEvent::SleepChanged(true));
        mirror.apply(TelemetryEvent::SleepChanged(true));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(mirror.sleeping().version(), 2);
    }

    #[test]
    fn test_gcode_action_set_only_on_change() {
        let mirror = DeviceStateMirror::new();
        assert!(mirror.record_gcode_action(3));
        assert!(!mirror.record_gcode_action(3));
        assert_eq!(mirror.print_gcode_action().version(), 1);
    }

    #[test]
    fn test_put_setting() {
        let mirror = DeviceStateMirror::new();
        mirror.put_setting("cfw_brightness", json!(80));
        assert_eq!(mirror.setting("cfw_brightness"), Some(json!(80)));
        assert_eq!(mirror.setting("missing"), None);
    }
}
