//! Layer-driven speed ramp controller.
//!
//! On every layer change the controller computes the speed the active ramp
//! asks for and, when the gate lets it through, sends the matching speed
//! command. Completion is decided by layer number alone, so a lost
//! intermediate command never keeps a ramp alive.
//!
//! The controller state lock is never held while the sink runs. A sink may
//! therefore feed a new layer back into the controller synchronously.

use std::sync::Arc;

use parking_lot::Mutex;

use super::speed::SpeedCommandTranslator;
use crate::publisher::CommandSink;
use layerkit_core::{GateMode, RampError, RampPlan, RampRequest};

/// Controller behaviour switches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampControllerConfig {
    /// Gate applied to intermediate steps
    pub gate: GateMode,
    /// On completion, send the target speed if it was not the last one sent
    pub settle_on_completion: bool,
}

impl Default for RampControllerConfig {
    fn default() -> Self {
        Self {
            gate: GateMode::Literal,
            settle_on_completion: true,
        }
    }
}

/// What one layer change did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RampOutcome {
    /// No active ramp
    Inactive,
    /// The ramp reached its target layer and was cleared
    Completed {
        /// Whether the target speed was sent on completion
        settled: bool,
    },
    /// A speed command was sent
    Emitted(f64),
    /// The gate let the speed through but the sink rejected it; the ramp
    /// stays active and the next layer retries
    SendFailed(f64),
    /// The gate held back the computed speed
    Held(f64),
}

#[derive(Debug)]
struct RampState {
    plan: Option<RampPlan>,
    last_commanded: f64,
}

/// Drives the print speed along a [`RampPlan`]
pub struct RampController {
    config: RampControllerConfig,
    sink: Arc<dyn CommandSink>,
    translator: Arc<dyn SpeedCommandTranslator>,
    state: Mutex<RampState>,
}

impl RampController {
    /// Create an idle controller
    pub fn new(
        sink: Arc<dyn CommandSink>,
        translator: Arc<dyn SpeedCommandTranslator>,
        config: RampControllerConfig,
    ) -> Self {
        Self {
            config,
            sink,
            translator,
            state: Mutex::new(RampState {
                plan: None,
                last_commanded: -1.0,
            }),
        }
    }

    /// Start (or replace) a ramp.
    ///
    /// `current_speed` seeds the last commanded speed; an unreported speed
    /// (zero or negative) is replaced by the ramp's start speed.
    pub fn start(&self, request: RampRequest, current_speed: f64) -> Result<RampPlan, RampError> {
        let plan = request.plan()?;
        {
            let mut state = self.state.lock();
            state.last_commanded = if current_speed > 0.0 {
                current_speed
            } else {
                plan.start_speed
            };
            state.plan = Some(plan);
        }
        tracing::info!("Speed ramp started: {}", plan);
        if !plan.is_active() {
            tracing::info!("Ramp layers at or below 1, ramp stays idle");
        }
        Ok(plan)
    }

    /// Drop the active ramp, if any
    pub fn cancel(&self) -> Option<RampPlan> {
        let plan = self.state.lock().plan.take();
        if let Some(plan) = &plan {
            tracing::info!("Speed ramp cancelled: {}", plan);
        }
        plan
    }

    /// The configured ramp
    pub fn active(&self) -> Option<RampPlan> {
        self.state.lock().plan
    }

    /// Last speed successfully handed to the sink (or the seeded speed)
    pub fn last_commanded_speed(&self) -> f64 {
        self.state.lock().last_commanded
    }

    /// Controller configuration
    pub fn config(&self) -> &RampControllerConfig {
        &self.config
    }

    /// Evaluate the ramp for a newly reported layer
    pub fn on_layer_changed(&self, layer: i32) -> RampOutcome {
        let (plan, last_commanded) = {
            let mut state = self.state.lock();
            let plan = match state.plan {
                Some(plan) if plan.is_active() => plan,
                _ => return RampOutcome::Inactive,
            };
            if plan.is_complete_at(layer) {
                state.plan = None;
            }
            (plan, state.last_commanded)
        };

        if plan.is_complete_at(layer) {
            let settled = self.config.settle_on_completion
                && last_commanded != plan.target_speed
                && self.emit(plan.target_speed);
            tracing::info!("Speed ramp finished at layer {}: {}", layer, plan);
            return RampOutcome::Completed { settled };
        }

        let desired = plan.desired_speed(layer);
        if !self
            .config
            .gate
            .should_emit(last_commanded, desired, plan.step)
        {
            tracing::debug!(
                "Speed {}% held at layer {}, last commanded {}%",
                desired,
                layer,
                last_commanded
            );
            return RampOutcome::Held(desired);
        }

        if self.emit(desired) {
            tracing::info!(
                "Speed level ramped to {}% at layer {} ({})",
                desired,
                layer,
                plan
            );
            RampOutcome::Emitted(desired)
        } else {
            RampOutcome::SendFailed(desired)
        }
    }

    /// Send `speed` through the translator and sink.
    ///
    /// Returns true if every command was accepted. Failures are logged and
    /// leave the last commanded speed untouched.
    fn emit(&self, speed: f64) -> bool {
        let percent = speed.round() as i32;
        let mut delivered = true;
        for command in self.translator.commands(percent) {
            if let Err(e) = self.sink.send_command(&command, None) {
                tracing::warn!("Failed to send speed {}%: {}", percent, e);
                delivered = false;
            }
        }
        if delivered {
            self.state.lock().last_commanded = speed;
        }
        delivered
    }
}

impl std::fmt::Debug for RampController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RampController")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish()
    }
}
