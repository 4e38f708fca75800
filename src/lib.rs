//! # Layerkit
//!
//! Reactive telemetry mirror and layer-driven speed ramp controller for
//! DDS-connected 3D printers.
//!
//! ## Architecture
//!
//! Layerkit is organized as a workspace with multiple crates:
//!
//! 1. **layerkit-core** - Observable cells, device state mirror, ramp math, errors
//! 2. **layerkit-communication** - Topic dispatch, report handlers, request
//!    publishing, speed commands, ramp controller, firmware downloads
//! 3. **layerkit-settings** - Configuration loading and validation
//! 4. **layerkit** - [`PrinterContext`], logging setup and the daemon binary
//!
//! Control flow for an inbound message:
//! transport → [`TopicDispatcher`] → report handler → mirror cell →
//! (layer changes) [`RampController`] → [`CommandSink`].

use std::sync::{Arc, Weak};

pub use layerkit_communication::{
    dispatch::topics, register_report_handlers, ArtifactCache, CommandSink, DdsPublisher,
    DownloadItem, DownloadPipeline, Fetcher, RampController, RampControllerConfig, RampOutcome,
    RegistrationId, SpeedCommandTranslator, SpeedLevelTranslator, TopicDispatcher, TopicEvent,
    Transport,
};
pub use layerkit_core::{
    DecodeError, DeviceStateMirror, Error, GateMode, Payload, PrintState, RampError, RampPlan,
    RampRequest, Result, SinkError, TelemetryEvent,
};
pub use layerkit_settings::{Config, LoggingSettings};

use layerkit_core::SubscriptionToken;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging from the configuration
///
/// `RUST_LOG` overrides the configured level. Output goes to stderr so that
/// stdout stays free for rendered requests.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))?;

    if settings.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// Everything one printer connection needs, wired together.
///
/// Owns the state mirror, the dispatcher with the report handlers
/// registered, and the ramp controller subscribed to layer changes. There is
/// no global instance; create one context per printer and pass it around.
pub struct PrinterContext {
    config: Config,
    mirror: Arc<DeviceStateMirror>,
    dispatcher: TopicDispatcher,
    controller: Arc<RampController>,
    registrations: Vec<RegistrationId>,
    layer_subscription: SubscriptionToken,
}

impl PrinterContext {
    /// Build a context with the stock speed translator
    pub fn new(config: Config, sink: Arc<dyn CommandSink>) -> Self {
        let ramp = &config.ramp;
        let translator = SpeedLevelTranslator::with_limits(
            ramp.min_speed,
            ramp.max_speed,
            ramp.fallback_speed,
        );
        Self::with_translator(config, sink, Arc::new(translator))
    }

    /// Build a context with a custom speed translator
    pub fn with_translator(
        config: Config,
        sink: Arc<dyn CommandSink>,
        translator: Arc<dyn SpeedCommandTranslator>,
    ) -> Self {
        let mirror = Arc::new(DeviceStateMirror::with_options(
            config.device.all_axes_mask,
            config.device.emulating,
        ));

        let controller = Arc::new(RampController::new(
            sink,
            translator,
            RampControllerConfig {
                gate: config.ramp.gate,
                settle_on_completion: config.ramp.settle_on_completion,
            },
        ));

        let dispatcher = TopicDispatcher::new();
        let registrations = register_report_handlers(&dispatcher, mirror.clone());

        let layer_subscription = {
            let controller = controller.clone();
            let mirror_ref: Weak<DeviceStateMirror> = Arc::downgrade(&mirror);
            mirror.layer_number().subscribe(move |layer| {
                let outcome = controller.on_layer_changed(*layer);
                if let RampOutcome::Completed { .. } = outcome {
                    if let Some(mirror) = mirror_ref.upgrade() {
                        mirror.publish_ramp(None);
                    }
                }
                Ok(())
            })
        };

        tracing::info!(
            "Printer context ready: {} handlers, ramp gate {}, emulating {}",
            registrations.len(),
            config.ramp.gate,
            config.device.emulating
        );

        Self {
            config,
            mirror,
            dispatcher,
            controller,
            registrations,
            layer_subscription,
        }
    }

    /// Configuration the context was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read access to the state mirror
    pub fn mirror(&self) -> &DeviceStateMirror {
        &self.mirror
    }

    /// The dispatcher, for registering additional handlers
    pub fn dispatcher(&self) -> &TopicDispatcher {
        &self.dispatcher
    }

    /// Registrations made for the built-in report handlers
    pub fn registrations(&self) -> &[RegistrationId] {
        &self.registrations
    }

    /// Feed one raw message from the transport
    pub fn on_event(&self, topic: &str, raw: &[u8]) -> std::result::Result<usize, DecodeError> {
        self.dispatcher.on_event(topic, raw)
    }

    /// Feed one already decoded message
    pub fn dispatch(&self, topic: &str, payload: &Payload) -> usize {
        self.dispatcher.dispatch(topic, payload)
    }

    /// Apply a telemetry notification from the host (layer, sleep, homing...)
    pub fn notify(&self, event: TelemetryEvent) {
        self.mirror.apply(event);
    }

    /// Configure a new speed ramp, replacing any active one
    pub fn start_ramp(&self, request: RampRequest) -> std::result::Result<RampPlan, RampError> {
        let current_speed = self.mirror.current_speed();
        let plan = self.controller.start(request, current_speed)?;
        self.mirror.publish_ramp(Some(plan));
        Ok(plan)
    }

    /// Cancel the active ramp
    pub fn cancel_ramp(&self) -> Option<RampPlan> {
        let plan = self.controller.cancel();
        if plan.is_some() {
            self.mirror.publish_ramp(None);
        }
        plan
    }

    /// The configured ramp, if any
    pub fn active_ramp(&self) -> Option<RampPlan> {
        self.controller.active()
    }

    /// Last speed handed to the command sink
    pub fn last_commanded_speed(&self) -> f64 {
        self.controller.last_commanded_speed()
    }
}

impl Drop for PrinterContext {
    fn drop(&mut self) {
        self.mirror.layer_number().unsubscribe(self.layer_subscription);
        for id in self.registrations.drain(..) {
            self.dispatcher.unregister(id);
        }
    }
}

impl std::fmt::Debug for PrinterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterContext")
            .field("config", &self.config)
            .field("mirror", &self.mirror)
            .field("active_ramp", &self.active_ramp())
            .finish()
    }
}
