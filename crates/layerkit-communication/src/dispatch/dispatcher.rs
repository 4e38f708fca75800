//! Topic dispatcher implementation.
//!
//! Handlers are kept per exact topic string, in registration order. An
//! inbound payload is decoded at most once, and only when the topic has at
//! least one handler.

use parking_lot::ReentrantMutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use layerkit_core::{
    thread_safe_rw_map, DecodeError, HandlerError, HandlerResult, Payload, ThreadSafeRwMap,
};

/// Registration handle for removing a topic handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(Uuid);

impl RegistrationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reg({})", &self.0.to_string()[..8])
    }
}

/// Type alias for topic handler functions
type TopicHandler = Arc<dyn Fn(&Payload) -> HandlerResult + Send + Sync>;

/// A decoded event, as seen by async receivers
#[derive(Debug, Clone)]
pub struct TopicEvent {
    /// Topic the event arrived on
    pub topic: String,
    /// Decoded payload, shared between receivers
    pub payload: Arc<Payload>,
}

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Capacity of the broadcast channel feeding async receivers.
    pub channel_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Routes inbound topic events to registered handlers
pub struct TopicDispatcher {
    /// Handlers per topic, in registration order
    handlers: ThreadSafeRwMap<String, Vec<(RegistrationId, TopicHandler)>>,
    /// Broadcast channel for async receivers
    sender: broadcast::Sender<TopicEvent>,
    /// One event is fully dispatched before the next starts; re-entrant so a
    /// handler may dispatch a follow-up event itself
    dispatch_lock: ReentrantMutex<()>,
    config: DispatcherConfig,
}

impl TopicDispatcher {
    /// Create a new dispatcher with default configuration
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Create a new dispatcher with custom configuration
    pub fn with_config(config: DispatcherConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            handlers: thread_safe_rw_map(),
            sender,
            dispatch_lock: ReentrantMutex::new(()),
            config,
        }
    }

    /// Register a handler for an exact topic.
    ///
    /// Handlers of one topic run in the order they were registered.
    pub fn register<F>(&self, topic: impl Into<String>, handler: F) -> RegistrationId
    where
        F: Fn(&Payload) -> HandlerResult + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = RegistrationId::new();
        tracing::debug!("Handler {} registered for '{}'", id, topic);
        self.handlers
            .write()
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler
    ///
    /// Returns true if the registration was found and removed.
    pub fn unregister(&self, id: RegistrationId) -> bool {
        let mut handlers = self.handlers.write();
        let mut removed = false;
        handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(reg, _)| *reg != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        if removed {
            tracing::debug!("Handler {} unregistered", id);
        }
        removed
    }

    /// Deliver one raw inbound message.
    ///
    /// Returns the number of handlers invoked. Topics without handlers are
    /// not decoded at all. A malformed payload yields a [`DecodeError`] and
    /// no handler runs; the dispatcher itself stays usable.
    pub fn on_event(&self, topic: &str, raw: &[u8]) -> Result<usize, DecodeError> {
        let _guard = self.dispatch_lock.lock();

        let handlers = self.handlers_for(topic);
        if handlers.is_empty() {
            tracing::trace!("No handlers for '{}', payload not decoded", topic);
            return Ok(0);
        }

        let text = std::str::from_utf8(raw).map_err(|_| {
            let err = DecodeError::NotUtf8 {
                topic: topic.to_string(),
            };
            tracing::warn!("{}", err);
            err
        })?;

        let payload: Payload = serde_json::from_str(text).map_err(|e| {
            let err = DecodeError::Malformed {
                topic: topic.to_string(),
                reason: e.to_string(),
            };
            tracing::warn!("{}", err);
            err
        })?;

        Ok(self.run(topic, &handlers, payload))
    }

    /// Deliver an already decoded payload.
    ///
    /// Every call is an independent delivery; nothing is deduplicated.
    pub fn dispatch(&self, topic: &str, payload: &Payload) -> usize {
        let _guard = self.dispatch_lock.lock();

        let handlers = self.handlers_for(topic);
        if handlers.is_empty() {
            return 0;
        }
        self.run(topic, &handlers, payload.clone())
    }

    /// Get a receiver of decoded events for async consumers.
    ///
    /// Only events that were decoded (i.e. had at least one handler) are
    /// broadcast.
    pub fn receiver(&self) -> broadcast::Receiver<TopicEvent> {
        self.sender.subscribe()
    }

    /// Number of handlers registered for `topic`
    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers.read().get(topic).map_or(0, Vec::len)
    }

    /// Number of topics with at least one handler
    pub fn topic_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Get the current configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Snapshot so handlers can register or unregister while running
    fn handlers_for(&self, topic: &str) -> Vec<(RegistrationId, TopicHandler)> {
        self.handlers
            .read()
            .get(topic)
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    fn run(
        &self,
        topic: &str,
        handlers: &[(RegistrationId, TopicHandler)],
        payload: Payload,
    ) -> usize {
        for (id, handler) in handlers {
            if let Err(e) = HandlerError::catch(|| handler(&payload)) {
                tracing::warn!("Handler {} for '{}' failed: {}", id, topic, e);
            }
        }

        if self.sender.receiver_count() > 0 {
            let event = TopicEvent {
                topic: topic.to_string(),
                payload: Arc::new(payload),
            };
            if self.sender.send(event).is_err() {
                tracing::trace!("Async receivers for '{}' went away", topic);
            }
        }

        handlers.len()
    }
}

impl Default for TopicDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TopicDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicDispatcher")
            .field("topics", &self.topic_count())
            .field("config", &self.config)
            .finish()
    }
}
