//! # Layerkit Communication
//!
//! Everything between the DDS transport and the device state mirror:
//! topic dispatch of inbound reports, rendering of outbound requests,
//! speed command generation, the layer-driven speed ramp controller, and
//! the firmware download pipeline.

pub mod dispatch;
pub mod firmware;
pub mod ota;
pub mod publisher;

pub use dispatch::{topics, DispatcherConfig, RegistrationId, TopicDispatcher, TopicEvent};

pub use firmware::{
    register_report_handlers, RampController, RampControllerConfig, RampOutcome,
    SpeedCommandTranslator, SpeedLevelTranslator, SpeedProfile,
};

pub use ota::{
    ArtifactCache, DownloadItem, DownloadPipeline, DownloadSummary, Fetcher, ItemState,
    ItemStatus, OtaError,
};

pub use publisher::{CommandSink, DdsPublisher, Transport};
