// src/registry.rs - per-streamer notifier and upload queue lookup

use std::collections::HashMap;
use std::sync::Arc;

use crate::notify::Notifier;
use crate::upload::UploadQueue;

#[derive(Clone)]
pub struct ServiceEntry {
    pub notifier: Arc<dyn Notifier>,
    pub uploads: UploadQueue,
}

/// Streamer rooms mapped to their services; unknown rooms use the default.
#[derive(Clone)]
pub struct ServiceRegistry {
    default: ServiceEntry,
    rooms: HashMap<u64, ServiceEntry>,
}

impl ServiceRegistry {
    pub fn new(default: ServiceEntry) -> Self {
        Self {
            default,
            rooms: HashMap::new(),
        }
    }

    pub fn with_room(mut self, room_id: u64, entry: ServiceEntry) -> Self {
        self.rooms.insert(room_id, entry);
        self
    }

    pub fn entry(&self, room_id: u64) -> &ServiceEntry {
        self.rooms.get(&room_id).unwrap_or(&self.default)
    }

    pub fn notifier(&self, room_id: u64) -> &Arc<dyn Notifier> {
        &self.entry(room_id).notifier
    }

    pub fn uploads(&self, room_id: u64) -> &UploadQueue {
        &self.entry(room_id).uploads
    }
}
