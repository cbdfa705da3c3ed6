//! Channel-keyed event bus connecting transports to in-process consumers.
//!
//! Listeners are invoked synchronously on the emitting thread, in
//! registration order. They must not block; consumers that need to do work
//! should enqueue into their own channel. A listener that panics is caught
//! and logged so one bad consumer cannot kill a transport's receive loop.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::error;

/// A token identifying one registration, returned by [`Emitter::on`] and
/// consumed by [`Emitter::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    type_id: TypeId,
    callback: Arc<dyn Fn(&dyn Any) + Send + Sync>,
}

/// The event bus: a map from channel name to an ordered set of type-tagged
/// listeners.
#[derive(Default)]
pub struct Emitter {
    channels: RwLock<HashMap<String, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl Emitter {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `channel`. The listener only fires for events
    /// whose payload type is `T`.
    pub fn on<T, F>(&self, channel: &str, listener: F) -> ListenerId
    where
        T: Any,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let callback = Arc::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<T>() {
                listener(event);
            }
        });
        let registration = Registration {
            id,
            type_id: TypeId::of::<T>(),
            callback,
        };
        self.channels
            .write()
            .expect("emitter lock poisoned")
            .entry(channel.to_owned())
            .or_default()
            .push(registration);
        id
    }

    /// Removes the registration `id` from `channel`. Removing an unknown id is
    /// a no-op. An emit already in progress still sees the listener; the next
    /// emit does not.
    pub fn off(&self, channel: &str, id: ListenerId) {
        let mut channels = self.channels.write().expect("emitter lock poisoned");
        if let Some(listeners) = channels.get_mut(channel) {
            listeners.retain(|registration| registration.id != id);
            if listeners.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Invokes every listener registered for `channel` at call time with
    /// `event`, synchronously and in registration order. Emits to channels
    /// with no listeners are dropped silently.
    pub fn emit<T: Any>(&self, channel: &str, event: &T) {
        let listeners: Vec<Arc<dyn Fn(&dyn Any) + Send + Sync>> = {
            let channels = self.channels.read().expect("emitter lock poisoned");
            match channels.get(channel) {
                Some(listeners) => listeners
                    .iter()
                    .filter(|registration| registration.type_id == TypeId::of::<T>())
                    .map(|registration| Arc::clone(&registration.callback))
                    .collect(),
                None => return,
            }
        };
        for callback in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(channel, "listener panicked; unregister it or fix the consumer");
            }
        }
    }

    /// The number of listeners currently registered for `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .expect("emitter lock poisoned")
            .get(channel)
            .map_or(0, Vec::len)
    }
}
