//! Layer-indexed speed ramps.
//!
//! A ramp moves the print speed linearly from a start speed to a target
//! speed while the layer number advances from a start layer to a target
//! layer. This module holds the request/plan types and the pure math; the
//! stateful controller that emits commands lives in the communication crate.

use serde::{Deserialize, Serialize};

use crate::error::RampError;

/// How the controller decides whether a computed speed is worth sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Send when `|last - desired| < |step|`.
    ///
    /// This is the gate deployed printers have always used. It reads
    /// backwards (it fires when the change is *smaller* than a step) but is
    /// kept as the default so existing ramps behave the same.
    #[default]
    Literal,
    /// Send when `|last - desired| >= |step|`, i.e. suppress commands that
    /// would move the speed by less than one step.
    Hysteresis,
}

impl GateMode {
    /// Whether a command should be emitted for this layer
    pub fn should_emit(self, last_commanded: f64, desired: f64, step: f64) -> bool {
        let distance = (last_commanded - desired).abs();
        match self {
            GateMode::Literal => distance < step.abs(),
            GateMode::Hysteresis => distance >= step.abs(),
        }
    }
}

impl std::fmt::Display for GateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal => write!(f, "literal"),
            Self::Hysteresis => write!(f, "hysteresis"),
        }
    }
}

/// Ramp configuration as supplied by the user or a macro
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RampRequest {
    /// Layer at which the ramp starts
    pub start_layer: i32,
    /// Layer at which the ramp completes
    pub target_layer: i32,
    /// Speed percentage at `start_layer`
    pub start_speed: f64,
    /// Speed percentage at `target_layer`
    pub target_speed: f64,
    /// Speed change per layer; its sign is corrected to the ramp direction
    pub step: f64,
}

impl RampRequest {
    /// Validate the request and turn it into a plan with a sign-corrected step
    pub fn plan(&self) -> Result<RampPlan, RampError> {
        if !self.start_speed.is_finite() {
            return Err(RampError::NonFiniteSpeed {
                name: "start_speed",
                value: self.start_speed,
            });
        }
        if !self.target_speed.is_finite() {
            return Err(RampError::NonFiniteSpeed {
                name: "target_speed",
                value: self.target_speed,
            });
        }
        if !self.step.is_finite() {
            return Err(RampError::NonFiniteStep(self.step));
        }
        if self.target_layer <= self.start_layer {
            return Err(RampError::EmptyLayerRange {
                start: self.start_layer,
                target: self.target_layer,
            });
        }

        Ok(RampPlan {
            start_layer: self.start_layer,
            target_layer: self.target_layer,
            start_speed: self.start_speed,
            target_speed: self.target_speed,
            step: directed_step(self.start_speed, self.target_speed, self.step),
        })
    }
}

/// A validated ramp in progress
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RampPlan {
    /// Layer at which the ramp starts
    pub start_layer: i32,
    /// Layer at which the ramp completes
    pub target_layer: i32,
    /// Speed percentage at `start_layer`
    pub start_speed: f64,
    /// Speed percentage at `target_layer`
    pub target_speed: f64,
    /// Per-layer speed change, signed toward `target_speed`
    pub step: f64,
}

impl RampPlan {
    /// Plans whose layers sit at or below 1 are treated as "not configured"
    pub fn is_active(&self) -> bool {
        self.start_layer > 1 && self.target_layer > 1
    }

    /// Whether `layer` has reached the end of the ramp
    pub fn is_complete_at(&self, layer: i32) -> bool {
        layer >= self.target_layer
    }

    /// Speed this plan asks for at `layer`
    pub fn desired_speed(&self, layer: i32) -> f64 {
        interpolate(
            layer,
            self.start_layer,
            self.target_layer,
            self.start_speed,
            self.target_speed,
            self.step,
        )
    }
}

impl std::fmt::Display for RampPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "layers {}..{}, speed {}% -> {}% (step {})",
            self.start_layer, self.target_layer, self.start_speed, self.target_speed, self.step
        )
    }
}

fn directed_step(start_speed: f64, target_speed: f64, step: f64) -> f64 {
    if target_speed >= start_speed {
        step.abs()
    } else {
        -step.abs()
    }
}

/// Bounded linear interpolation of speed over layers.
///
/// Layers below the range yield `start_speed`, layers above it yield
/// `target_speed`. Inside the range the speed advances by `step` per layer
/// from `start_speed` and is clamped so it never passes `target_speed`.
/// `step` may carry either sign; it is always applied toward the target.
pub fn interpolate(
    layer: i32,
    start_layer: i32,
    target_layer: i32,
    start_speed: f64,
    target_speed: f64,
    step: f64,
) -> f64 {
    if layer < start_layer {
        return start_speed;
    }
    if layer > target_layer {
        return target_speed;
    }

    let step = directed_step(start_speed, target_speed, step);
    let progress = f64::from(layer) - f64::from(start_layer);
    let speed = start_speed + progress * step;

    if target_speed >= start_speed {
        speed.min(target_speed)
    } else {
        speed.max(target_speed)
    }
}

/// Evenly spaced, rounded speed levels from `start_speed` to `end_speed`.
///
/// `steps` must be a positive even number; anything else yields an empty
/// list.
pub fn ramp_speed_levels(start_speed: f64, end_speed: f64, steps: i32) -> Vec<i32> {
    if steps <= 0 || steps % 2 != 0 {
        tracing::warn!("Ramp level count must be a positive even number, got {}", steps);
        return Vec::new();
    }

    let increment = (end_speed - start_speed) / f64::from(steps - 1);
    (0..steps)
        .map(|i| (start_speed + increment * f64::from(i)).round() as i32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RampRequest {
        RampRequest {
            start_layer: 10,
            target_layer: 20,
            start_speed: 100.0,
            target_speed: 150.0,
            step: 10.0,
        }
    }

    #[test]
    fn test_interpolate_clamps_outside_range() {
        assert_eq!(interpolate(5, 10, 20, 100.0, 150.0, 10.0), 100.0);
        assert_eq!(interpolate(30, 10, 20, 100.0, 150.0, 10.0), 150.0);
    }

    #[test]
    fn test_interpolate_inside_range() {
        assert_eq!(interpolate(10, 10, 20, 100.0, 150.0, 10.0), 100.0);
        assert_eq!(interpolate(13, 10, 20, 100.0, 150.0, 10.0), 130.0);
        // Never overshoots the target
        assert_eq!(interpolate(16, 10, 20, 100.0, 150.0, 10.0), 150.0);
    }

    #[test]
    fn test_interpolate_descending_corrects_step_sign() {
        for layer in 0..25 {
            assert_eq!(
                interpolate(layer, 10, 20, 150.0, 100.0, 10.0),
                interpolate(layer, 10, 20, 150.0, 100.0, -10.0)
            );
        }
        assert_eq!(interpolate(12, 10, 20, 150.0, 100.0, 10.0), 130.0);
        assert_eq!(interpolate(19, 10, 20, 150.0, 100.0, 10.0), 100.0);
    }

    #[test]
    fn test_interpolate_zero_step_holds_start() {
        assert_eq!(interpolate(15, 10, 20, 100.0, 150.0, 0.0), 100.0);
    }

    #[test]
    fn test_plan_corrects_step() {
        let plan = RampRequest {
            start_speed: 150.0,
            target_speed: 100.0,
            ..request()
        }
        .plan()
        .unwrap();
        assert_eq!(plan.step, -10.0);

        let plan = RampRequest {
            step: -10.0,
            ..request()
        }
        .plan()
        .unwrap();
        assert_eq!(plan.step, 10.0);
    }

    #[test]
    fn test_plan_rejects_bad_requests() {
        let err = RampRequest {
            target_layer: 10,
            ..request()
        }
        .plan()
        .unwrap_err();
        assert!(matches!(err, RampError::EmptyLayerRange { .. }));

        let err = RampRequest {
            target_speed: f64::NAN,
            ..request()
        }
        .plan()
        .unwrap_err();
        assert!(matches!(
            err,
            RampError::NonFiniteSpeed {
                name: "target_speed",
                ..
            }
        ));

        let err = RampRequest {
            step: f64::INFINITY,
            ..request()
        }
        .plan()
        .unwrap_err();
        assert!(matches!(err, RampError::NonFiniteStep(_)));
    }

    #[test]
    fn test_plan_active_sentinel() {
        assert!(request().plan().unwrap().is_active());
        let plan = RampRequest {
            start_layer: 1,
            ..request()
        }
        .plan()
        .unwrap();
        assert!(!plan.is_active());
    }

    #[test]
    fn test_gate_modes() {
        // Literal gate fires only when the move is smaller than a step
        assert!(GateMode::Literal.should_emit(100.0, 105.0, 10.0));
        assert!(!GateMode::Literal.should_emit(100.0, 110.0, 10.0));
        assert!(!GateMode::Hysteresis.should_emit(100.0, 105.0, 10.0));
        assert!(GateMode::Hysteresis.should_emit(100.0, 110.0, -10.0));
    }

    #[test]
    fn test_ramp_speed_levels() {
        assert_eq!(ramp_speed_levels(100.0, 160.0, 4), vec![100, 120, 140, 160]);
        assert_eq!(ramp_speed_levels(150.0, 100.0, 2), vec![150, 100]);
        assert!(ramp_speed_levels(100.0, 160.0, 3).is_empty());
        assert!(ramp_speed_levels(100.0, 160.0, 0).is_empty());
    }
}
