//! # Topic Dispatch
//!
//! Routes inbound `(topic, payload)` events from the DDS transport to the
//! handlers registered for that exact topic.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use layerkit_communication::{topics, TopicDispatcher};
//!
//! let dispatcher = TopicDispatcher::new();
//! let id = dispatcher.register(topics::INFO_REPORT, |payload| {
//!     println!("version report: {}", payload);
//!     Ok(())
//! });
//!
//! // Called by the transport once per inbound message
//! dispatcher.on_event(topics::INFO_REPORT, br#"{"command":"get_version","module":[]}"#)?;
//!
//! dispatcher.unregister(id);
//! ```

mod dispatcher;
pub mod topics;

pub use dispatcher::*;
