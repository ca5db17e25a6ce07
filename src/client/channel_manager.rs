//! Registry of live channels keyed by id.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::{channel::ChannelInner, channel_ids::ChannelIds, error::ConnectionError};

#[derive(Debug)]
struct Registry {
    channels: HashMap<u16, Arc<ChannelInner>>,
    ids: ChannelIds,
}

/// Owns every channel of a connection, including the control channel 0.
#[derive(Debug)]
pub(crate) struct ChannelManager {
    zero: Arc<ChannelInner>,
    registry: Mutex<Registry>,
}

impl ChannelManager {
    pub(crate) fn new(channel_max: u16) -> Self {
        Self {
            zero: Arc::new(ChannelInner::new(0, true)),
            registry: Mutex::new(Registry {
                channels: HashMap::new(),
                ids: ChannelIds::new(channel_max),
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Control channel used for connection-level methods.
    pub(crate) fn zero(&self) -> &Arc<ChannelInner> { &self.zero }

    /// Reserve the next id and register a closed channel under it.
    pub(crate) fn allocate(&self) -> Result<Arc<ChannelInner>, ConnectionError> {
        let mut registry = self.registry();
        let id = registry.ids.next()?;
        let inner = Arc::new(ChannelInner::new(id, false));
        registry.channels.insert(id, Arc::clone(&inner));
        Ok(inner)
    }

    pub(crate) fn get(&self, id: u16) -> Option<Arc<ChannelInner>> {
        if id == 0 {
            return Some(Arc::clone(&self.zero));
        }
        self.registry().channels.get(&id).cloned()
    }

    /// Forget channel `id` and release its id.
    pub(crate) fn remove(&self, id: u16) {
        let mut registry = self.registry();
        if registry.channels.remove(&id).is_some() {
            registry.ids.remove(id);
        }
    }

    /// Fail every channel, channel 0 included, with `error`.
    pub(crate) fn fail_all(&self, error: &ConnectionError) {
        // Snapshot first so no channel lock is taken under the registry lock.
        let channels: Vec<_> = self.registry().channels.values().cloned().collect();
        for channel in channels {
            channel.shut(Some(error.clone()));
        }
        self.zero.shut(Some(error.clone()));
    }

    /// Number of registered channels, excluding channel 0.
    pub(crate) fn len(&self) -> usize { self.registry().channels.len() }
}

#[cfg(test)]
mod tests;
