//! Printer-facing logic built on the dispatcher and publisher.
//!
//! - [`handlers`]: report topics → device state mirror
//! - [`ramp`]: layer-driven speed ramp controller
//! - [`speed`]: speed percentage → gcode translation

pub mod handlers;
pub mod ramp;
pub mod speed;

pub use handlers::register_report_handlers;
pub use ramp::{RampController, RampControllerConfig, RampOutcome};
pub use speed::{SpeedCommandTranslator, SpeedLevelTranslator, SpeedProfile};
