//! Thumbnail loading

use super::{Browser, Completion};
use crate::constants::*;
use crate::service::ServiceResult;
use crate::types::*;
use crate::utils::decode_thumbnail;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Pending thumbnail loads. The newest request is serviced first, and only
/// the newest [`THUMBNAIL_QUEUE_CAP`] are kept, so rows scrolled past
/// quickly never cost a fetch.
#[derive(Default)]
pub(crate) struct ThumbnailQueue {
    queue: Vec<WorldId>,
    callbacks: HashMap<WorldId, ThumbnailCallback>,
    in_flight: usize,
}

impl ThumbnailQueue {
    /// Move `id` to the back of the queue (most recent) with a new callback,
    /// then evict from the front down to the cap.
    fn push(&mut self, id: WorldId, callback: ThumbnailCallback) {
        self.queue.retain(|w| *w != id);
        self.queue.push(id);
        self.callbacks.insert(id, callback);
        self.trim();
    }

    fn trim(&mut self) {
        while self.queue.len() > THUMBNAIL_QUEUE_CAP {
            let evicted = self.queue.remove(0);
            // Evicted requests are dropped quietly; their callback never runs.
            self.callbacks.remove(&evicted);
            trace!(world = %evicted, "Thumbnail request evicted");
        }
    }

    fn pop_newest(&mut self) -> Option<WorldId> {
        self.queue.pop()
    }

    pub(crate) fn forget(&mut self, id: &WorldId) {
        self.queue.retain(|w| w != id);
        self.callbacks.remove(id);
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.callbacks.clear();
        self.in_flight = 0;
    }
}

impl Browser {
    /// Queue a thumbnail load for a cached level. Ignored when the thumbnail
    /// is already loaded or loading. `low_priority` does not change the order.
    pub fn start_downloading_thumbnail(
        &mut self,
        id: WorldId,
        callback: ThumbnailCallback,
        low_priority: bool,
    ) -> bool {
        let wanted = self
            .cache
            .get(&id)
            .is_some_and(|l| !l.thumbnail.is_loaded() && !l.thumbnail.is_loading());
        if wanted {
            trace!(world = %id, low_priority, "Thumbnail queued");
            self.downloads.thumbnails.push(id, callback);
        } else {
            self.downloads.thumbnails.trim();
        }
        wanted
    }

    /// Pending thumbnail requests, oldest first
    pub fn thumbnail_queue(&self) -> &[WorldId] {
        &self.downloads.thumbnails.queue
    }

    /// Start the newest queued thumbnail fetch if none is running
    pub(crate) fn pump_thumbnails(&mut self) {
        if self.shut_down || self.downloads.thumbnails.in_flight >= MAX_THUMBNAIL_LOADS {
            return;
        }

        while let Some(id) = self.downloads.thumbnails.pop_newest() {
            let Some(level) = self.cache.get_mut(&id) else {
                self.downloads.thumbnails.callbacks.remove(&id);
                continue;
            };
            level.thumbnail = ThumbnailState::Loading;
            self.downloads.thumbnails.in_flight += 1;

            debug!(world = %id, "Fetching thumbnail");
            let generation = self.generation;
            let fetch = self.service.get_thumbnail(id);
            self.spawn_request(self.browse_token.clone(), fetch, move |result| {
                Completion::Thumbnail {
                    generation,
                    world_id: id,
                    result,
                }
            });
            return;
        }
    }

    pub(crate) fn thumbnail_complete(&mut self, id: WorldId, result: ServiceResult<Vec<u8>>) {
        let queue = &mut self.downloads.thumbnails;
        queue.in_flight = queue.in_flight.saturating_sub(1);
        let callback = queue.callbacks.remove(&id);

        let Some(level) = self.cache.get_mut(&id) else {
            return;
        };
        level.thumbnail = match result {
            Ok(bytes) => match decode_thumbnail(&bytes) {
                Some(thumbnail) => ThumbnailState::Loaded(thumbnail),
                None => {
                    warn!(world = %id, bytes = bytes.len(), "Thumbnail could not be decoded");
                    ThumbnailState::Missing
                }
            },
            Err(e) => {
                warn!(world = %id, error = %e, "Thumbnail fetch failed");
                ThumbnailState::Missing
            }
        };

        if let Some(callback) = callback {
            callback(level);
        }
    }
}
