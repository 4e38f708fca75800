//! Topic handlers that feed device reports into the state mirror.

use serde_json::Value;
use std::sync::Arc;

use crate::dispatch::{topics, RegistrationId, TopicDispatcher};
use layerkit_core::{
    ButtonEvent, DeviceStateMirror, HandlerError, HandlerResult, ModuleVersion, Payload,
    PrintStage, PrintState, TelemetryEvent,
};

/// Register the report handlers for `mirror` on `dispatcher`.
///
/// Returns the registrations so the caller can remove them again.
pub fn register_report_handlers(
    dispatcher: &TopicDispatcher,
    mirror: Arc<DeviceStateMirror>,
) -> Vec<RegistrationId> {
    let info = mirror.clone();
    let print = mirror.clone();
    let x1plus = mirror;
    vec![
        dispatcher.register(topics::INFO_REPORT, move |p| handle_info_report(&info, p)),
        dispatcher.register(topics::PRINT_REPORT, move |p| handle_print_report(&print, p)),
        dispatcher.register(topics::X1PLUS, move |p| handle_x1plus(&x1plus, p)),
    ]
}

fn command(payload: &Payload) -> Result<&str, HandlerError> {
    match payload.get("command") {
        Some(Value::String(command)) => Ok(command.as_str()),
        Some(_) => Err(HandlerError::invalid("command", "expected a string")),
        None => Err(HandlerError::missing("command")),
    }
}

fn optional_i64(payload: &Payload, field: &str) -> Result<Option<i64>, HandlerError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerError::invalid(field, "expected an integer")),
    }
}

fn optional_i32(payload: &Payload, field: &str) -> Result<Option<i32>, HandlerError> {
    optional_i64(payload, field)?
        .map(|v| i32::try_from(v).map_err(|_| HandlerError::invalid(field, "out of range")))
        .transpose()
}

/// A malformed optional field is logged and dropped; the rest of the report
/// still applies.
fn skip_invalid<T>(field: Result<Option<T>, HandlerError>) -> Option<T> {
    field.unwrap_or_else(|e| {
        tracing::warn!("Skipping print report field: {}", e);
        None
    })
}

/// `device/report/info`: firmware module versions
pub fn handle_info_report(mirror: &DeviceStateMirror, payload: &Payload) -> HandlerResult {
    if command(payload)? != "get_version" {
        return Ok(());
    }
    let modules = payload
        .get("module")
        .ok_or_else(|| HandlerError::missing("module"))?;
    let versions: Vec<ModuleVersion> = serde_json::from_value(modules.clone())
        .map_err(|e| HandlerError::invalid("module", e.to_string()))?;
    mirror.record_versions(versions);
    Ok(())
}

/// `device/report/print`: push_status progress and state.
///
/// Layer, total layer and print state are forwarded only when they differ
/// from the mirror; status pushes repeat them every second. A field with the
/// wrong type is skipped without dropping the others.
pub fn handle_print_report(mirror: &DeviceStateMirror, payload: &Payload) -> HandlerResult {
    if command(payload)? != "push_status" {
        return Ok(());
    }

    if let Some(action) = skip_invalid(optional_i64(payload, "print_gcode_action")) {
        mirror.record_gcode_action(action);
    }

    if let Some(total) = skip_invalid(optional_i32(payload, "total_layer_num")) {
        if mirror.total_layer_number().get() != total {
            mirror.apply(TelemetryEvent::TotalLayersChanged(total));
        }
    }

    if let Some(speed) = skip_invalid(optional_i64(payload, "spd_mag")) {
        mirror.apply(TelemetryEvent::SpeedReported(speed as f64));
    }

    if let Some(stage) = skip_invalid(optional_i32(payload, "stg_cur")) {
        mirror.apply(TelemetryEvent::StageChanged(PrintStage(stage)));
    }

    if let Some(state) = payload.get("gcode_state").and_then(Value::as_str) {
        match parse_gcode_state(state) {
            Some(state) if mirror.print_state().get() != Some(state) => {
                mirror.apply(TelemetryEvent::PrintStateChanged(state));
            }
            Some(_) => {}
            None => tracing::debug!("Ignoring unknown gcode_state '{}'", state),
        }
    }

    // Layer last: its subscribers (the ramp) see the speed reported above
    if let Some(layer) = skip_invalid(optional_i32(payload, "layer_num")) {
        if mirror.layer_number().get() != layer {
            mirror.apply(TelemetryEvent::LayerChanged(layer));
        }
    }

    Ok(())
}

fn parse_gcode_state(state: &str) -> Option<PrintState> {
    match state {
        "IDLE" => Some(PrintState::Idle),
        "RUNNING" | "PREPARE" | "SLICING" => Some(PrintState::Working),
        "PAUSE" => Some(PrintState::Paused),
        "FINISH" => Some(PrintState::Finished),
        "FAILED" => Some(PrintState::Failed),
        _ => None,
    }
}

/// `device/x1plus`: GPIO key events and settings messages
pub fn handle_x1plus(mirror: &DeviceStateMirror, payload: &Payload) -> HandlerResult {
    if let Some(gpio) = payload.get("gpio") {
        let event: ButtonEvent = serde_json::from_value(gpio.clone())
            .map_err(|e| HandlerError::invalid("gpio", e.to_string()))?;
        mirror.record_button_event(event);
        return Ok(());
    }

    let (Some(settings), Some(key)) = (payload.get("settings"), payload.get("key")) else {
        return Ok(());
    };
    let key = key
        .as_str()
        .ok_or_else(|| HandlerError::invalid("key", "expected a string"))?;

    match settings.as_str() {
        Some("putSetting") => {
            let value = payload.get("value").cloned().unwrap_or(Value::Null);
            mirror.put_setting(key, value);
        }
        Some("getSetting") => tracing::debug!("Setting '{}' requested", key),
        _ => tracing::debug!("Ignoring settings message for '{}'", key),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_info_report_records_versions() {
        let mirror = DeviceStateMirror::new();
        handle_info_report(
            &mirror,
            &json!({
                "command": "get_version",
                "module": [
                    {"hw_ver": "", "name": "ota", "sn": "", "sw_ver": "01.05.01.00"},
                    {"hw_ver": "AMS08", "name": "ams/0", "sn": "00600A999999998", "sw_ver": "00.00.06.15"}
                ]
            }),
        )
        .unwrap();

        let versions = mirror.firmware_versions().get();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].name, "ams/0");
    }

    #[test]
    fn test_info_report_rejects_bad_module_list() {
        let mirror = DeviceStateMirror::new();
        let err = handle_info_report(&mirror, &json!({"command": "get_version", "module": 3}))
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidField { ref field, .. } if field == "module"));

        let err = handle_info_report(&mirror, &json!({"module": []})).unwrap_err();
        assert_eq!(err, HandlerError::missing("command"));
    }

    #[test]
    fn test_print_report_updates_mirror() {
        let mirror = DeviceStateMirror::new();
        handle_print_report(
            &mirror,
            &json!({
                "command": "push_status",
                "print_gcode_action": 2,
                "layer_num": 12,
                "total_layer_num": 240,
                "spd_mag": 125,
                "stg_cur": 1,
                "gcode_state": "RUNNING"
            }),
        )
        .unwrap();

        assert_eq!(mirror.print_gcode_action().get(), 2);
        assert_eq!(mirror.layer_number().get(), 12);
        assert_eq!(mirror.total_layer_number().get(), 240);
        assert_eq!(mirror.print_speed_percent().get(), 125.0);
        assert!(mirror.printing().get());
        assert_eq!(mirror.print_state().get(), Some(PrintState::Working));
    }

    #[test]
    fn test_print_report_repeats_do_not_rewrite_layer() {
        let mirror = DeviceStateMirror::new();
        let report = json!({"command": "push_status", "layer_num": 12, "gcode_state": "RUNNING"});
        handle_print_report(&mirror, &report).unwrap();
        handle_print_report(&mirror, &report).unwrap();

        assert_eq!(mirror.layer_number().version(), 1);
        assert_eq!(mirror.print_state().version(), 1);
    }

    #[test]
    fn test_print_report_ignores_other_commands() {
        let mirror = DeviceStateMirror::new();
        handle_print_report(&mirror, &json!({"command": "gcode_line", "layer_num": 3})).unwrap();
        assert_eq!(mirror.layer_number().get(), -1);
    }

    #[test]
    fn test_print_report_skips_bad_field_types() {
        let mirror = DeviceStateMirror::new();
        handle_print_report(
            &mirror,
            &json!({"command": "push_status", "layer_num": "twelve", "total_layer_num": 40}),
        )
        .unwrap();
        assert_eq!(mirror.layer_number().get(), -1);
        assert_eq!(mirror.total_layer_number().get(), 40);
    }

    #[test]
    fn test_bad_speed_does_not_drop_layer() {
        let mirror = DeviceStateMirror::new();
        handle_print_report(
            &mirror,
            &json!({"command": "push_status", "spd_mag": "fast", "stg_cur": 1, "layer_num": 7}),
        )
        .unwrap();
        assert_eq!(mirror.layer_number().get(), 7);
        assert!(mirror.printing().get());
    }

    #[test]
    fn test_out_of_range_layer_is_skipped() {
        let mirror = DeviceStateMirror::new();
        handle_print_report(
            &mirror,
            &json!({"command": "push_status", "layer_num": 1_i64 << 40, "spd_mag": 80}),
        )
        .unwrap();
        assert_eq!(mirror.layer_number().get(), -1);
        assert_eq!(mirror.print_speed_percent().get(), 80.0);
    }

    #[test]
    fn test_x1plus_button_and_settings() {
        let mirror = DeviceStateMirror::new();
        handle_x1plus(
            &mirror,
            &json!({"gpio": {"button": "power", "event": "shortPress"}}),
        )
        .unwrap();
        assert_eq!(
            mirror.last_button_event().get(),
            Some(ButtonEvent {
                button: "power".to_string(),
                event: "shortPress".to_string()
            })
        );

        handle_x1plus(
            &mirror,
            &json!({"settings": "putSetting", "key": "cfw_sshd", "value": true}),
        )
        .unwrap();
        assert_eq!(mirror.setting("cfw_sshd"), Some(json!(true)));

        // getSetting is only logged
        handle_x1plus(&mirror, &json!({"settings": "getSetting", "key": "cfw_vc"})).unwrap();
        assert_eq!(mirror.settings().version(), 1);
    }

    #[test]
    fn test_register_report_handlers() {
        let dispatcher = TopicDispatcher::new();
        let mirror = Arc::new(DeviceStateMirror::new());
        let ids = register_report_handlers(&dispatcher, mirror.clone());
        assert_eq!(ids.len(), 3);

        dispatcher
            .on_event(
                topics::PRINT_REPORT,
                br#"{"command":"push_status","layer_num":7}"#,
            )
            .unwrap();
        assert_eq!(mirror.layer_number().get(), 7);
    }
}
