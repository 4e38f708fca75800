//! Outbound DDS requests.
//!
//! [`DdsPublisher`] renders the JSON request documents the printer
//! understands and hands them to an external [`Transport`]. It also acts as
//! the [`CommandSink`] the ramp controller sends gcode through.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dispatch::topics;
use layerkit_core::{Payload, SinkError};

/// Delivers rendered JSON documents to a topic.
///
/// Implemented by the host's DDS/MQTT binding; delivery is fire-and-forget.
pub trait Transport: Send + Sync {
    /// Publish one JSON document on `topic`
    fn publish_json(&self, topic: &str, json: &str) -> Result<(), SinkError>;
}

/// Accepts pre-rendered command text for the device.
pub trait CommandSink: Send + Sync {
    /// Send `command`; without a sequence id the sink picks one
    fn send_command(&self, command: &str, sequence_id: Option<u64>) -> Result<(), SinkError>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum PrintRequest<'a> {
    GcodeLine {
        param: &'a str,
        sequence_id: u64,
    },
    GcodeFile {
        param: &'a str,
        sequence_id: u64,
    },
    PushStatus {
        gcode_claim_action: i64,
        sequence_id: u64,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum InfoRequest {
    GetVersion { sequence_id: u64 },
}

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum UpgradeRequest<'a> {
    ConsistencyConfirm {
        sequence_id: u64,
    },
    Start {
        sequence_id: u64,
        module: &'a str,
        version: &'a str,
        url: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "settings", rename_all = "camelCase")]
enum SettingsRequest<'a> {
    GetSetting {
        key: &'a str,
        sequence_id: u64,
    },
    PutSetting {
        key: &'a str,
        value: &'a Payload,
        sequence_id: u64,
    },
}

/// Base URL of the local file server that serves upgrade images
const UPGRADE_FILE_BASE: &str = "http://127.0.0.1:8888";

/// Renders and publishes printer requests
#[derive(Debug)]
pub struct DdsPublisher<T: Transport> {
    transport: T,
    next_sequence: AtomicU64,
}

impl<T: Transport> DdsPublisher<T> {
    /// Create a publisher on top of `transport`
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Access the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Ask the settings daemon for a setting
    pub fn get_setting(&self, key: &str, sequence_id: u64) -> Result<(), SinkError> {
        self.publish(
            topics::X1PLUS,
            &SettingsRequest::GetSetting { key, sequence_id },
        )
    }

    /// Store a setting through the settings daemon
    pub fn put_setting(&self, key: &str, value: &Payload, sequence_id: u64) -> Result<(), SinkError> {
        self.publish(
            topics::X1PLUS,
            &SettingsRequest::PutSetting {
                key,
                value,
                sequence_id,
            },
        )
    }

    /// Request the firmware module version list
    pub fn version_request(&self, sequence_id: u64) -> Result<(), SinkError> {
        self.publish(topics::INFO_REQUEST, &InfoRequest::GetVersion { sequence_id })
    }

    /// Run one block of gcode
    pub fn publish_gcode(&self, gcode: &str, sequence_id: u64) -> Result<(), SinkError> {
        self.publish(
            topics::PRINT_REQUEST,
            &PrintRequest::GcodeLine {
                param: gcode,
                sequence_id,
            },
        )
    }

    /// Run a gcode file stored on the printer
    pub fn print_gcode_file(&self, path: &str, sequence_id: u64) -> Result<(), SinkError> {
        self.publish(
            topics::PRINT_REQUEST,
            &PrintRequest::GcodeFile {
                param: path,
                sequence_id,
            },
        )
    }

    /// Push a gcode claim action to the screen
    pub fn push_status(&self, action: i64, sequence_id: u64) -> Result<(), SinkError> {
        self.publish(
            topics::PRINT_REQUEST,
            &PrintRequest::PushStatus {
                gcode_claim_action: action,
                sequence_id,
            },
        )
    }

    /// Confirm firmware consistency before an upgrade
    pub fn upgrade_consistency(&self, sequence_id: u64) -> Result<(), SinkError> {
        self.publish(
            topics::UPGRADE_REQUEST,
            &UpgradeRequest::ConsistencyConfirm { sequence_id },
        )
    }

    /// Start a module upgrade from a file served by the local file server.
    ///
    /// Sub-module names such as `ams/0` are reduced to their family (`ams`).
    pub fn upgrade_start(
        &self,
        module: &str,
        version: &str,
        file_name: &str,
        sequence_id: u64,
    ) -> Result<(), SinkError> {
        let module = module.split('/').next().unwrap_or(module);
        self.publish(
            topics::UPGRADE_REQUEST,
            &UpgradeRequest::Start {
                sequence_id,
                module,
                version,
                url: format!("{}/{}", UPGRADE_FILE_BASE, file_name),
            },
        )
    }

    fn publish<R: Serialize>(&self, topic: &str, request: &R) -> Result<(), SinkError> {
        let json = serde_json::to_string(request).map_err(|e| SinkError::Serialization {
            reason: e.to_string(),
        })?;
        tracing::debug!("Publishing to {}: {}", topic, json);
        self.transport.publish_json(topic, &json)
    }
}

impl<T: Transport> CommandSink for DdsPublisher<T> {
    fn send_command(&self, command: &str, sequence_id: Option<u64>) -> Result<(), SinkError> {
        let sequence_id =
            sequence_id.unwrap_or_else(|| self.next_sequence.fetch_add(1, Ordering::Relaxed));
        self.publish_gcode(command, sequence_id)
    }
}
