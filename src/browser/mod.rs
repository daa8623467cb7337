//! Browser module - owns the cache, queries, pager and download manager and
//! exposes the operations consumers call

mod downloads;
mod paging;
mod thumbnails;

pub use paging::PagerState;

use crate::cache::MetadataCache;
use crate::constants::*;
use crate::cursor::Cursor;
use crate::db::LocalLibrary;
use crate::query::{LevelFilter, LevelSorter, Query};
use crate::service::{CatalogService, ServiceError, ServiceResult, WorldData};
use crate::types::*;
use downloads::DownloadManager;
use futures::future::BoxFuture;
use paging::Pager;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// COMPLETIONS
// ============================================================================

/// Typed result of a remote request, sent back to the browser and applied in
/// [`Browser::update`]. Page and thumbnail results carry the generation they
/// were issued under so that results from before a reset are dropped.
pub(crate) enum Completion {
    Page {
        generation: u64,
        result: ServiceResult<String>,
    },
    Thumbnail {
        generation: u64,
        world_id: WorldId,
        result: ServiceResult<Vec<u8>>,
    },
    World {
        request: u64,
        world_id: WorldId,
        result: ServiceResult<WorldData>,
    },
    OffPageWorld {
        request: u64,
        world_id: WorldId,
        result: ServiceResult<WorldData>,
    },
    Deleted {
        world_id: WorldId,
        result: ServiceResult<()>,
    },
}

// ============================================================================
// BROWSER STATE
// ============================================================================

pub struct Browser {
    pub(crate) service: Arc<dyn CatalogService>,
    pub(crate) library: LocalLibrary,
    runtime: Handle,
    pub(crate) cache: MetadataCache,
    pub(crate) queries: Vec<Query>,
    pub(crate) pager: Pager,
    pub(crate) downloads: DownloadManager,
    pub(crate) creator_name: Option<String>,
    pub(crate) generation: u64,
    root_token: CancellationToken,
    pub(crate) browse_token: CancellationToken,
    completions_tx: UnboundedSender<Completion>,
    completions_rx: UnboundedReceiver<Completion>,
    next_query: u64,
    next_cursor: u64,
    pub(crate) shut_down: bool,
}

// ============================================================================
// LIFECYCLE
// ============================================================================

impl Browser {
    /// Remote requests are spawned on `runtime`; their results are applied on
    /// the caller's thread during [`Browser::update`].
    pub fn new(service: Arc<dyn CatalogService>, library: LocalLibrary, runtime: Handle) -> Self {
        let (completions_tx, completions_rx) = unbounded_channel();
        let root_token = CancellationToken::new();
        let browse_token = root_token.child_token();
        Self {
            service,
            library,
            runtime,
            cache: MetadataCache::new(),
            queries: Vec::new(),
            pager: Pager::default(),
            downloads: DownloadManager::default(),
            creator_name: None,
            generation: 0,
            root_token,
            browse_token,
            completions_tx,
            completions_rx,
            next_query: 0,
            next_cursor: 0,
            shut_down: false,
        }
    }

    pub fn with_creator_name(mut self, creator_name: Option<String>) -> Self {
        self.creator_name = creator_name;
        self
    }

    /// Per-frame tick: apply finished requests, let queries ask for more
    /// rows, start at most one queued thumbnail fetch.
    pub fn update(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.apply(completion);
        }

        let working = self.working();
        let end_reached = self.pager.end_reached();
        let wanting = self
            .queries
            .iter()
            .find(|q| q.update(working, end_reached, PREFETCH_MARGIN))
            .map(|q| q.id);
        if let Some(query) = wanting {
            self.start_fetching_more(query);
        }

        self.pump_thumbnails();
    }

    /// Forget everything fetched so far and start paging from the top.
    /// In-flight page and thumbnail requests are aborted; anything they still
    /// deliver is discarded.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.browse_token.cancel();
        self.browse_token = self.root_token.child_token();

        self.pager.reset();
        self.downloads.thumbnails.clear();
        self.cache.clear();
        for query in &mut self.queries {
            query.clear();
        }
        info!(generation = self.generation, "Browser reset");
    }

    /// Abort every transport operation. Pending callbacks are dropped.
    pub fn shutdown(&mut self) {
        self.root_token.cancel();
        self.shut_down = true;
        self.generation += 1;
        self.pager.reset();
        self.downloads.clear();
        info!("Browser shut down");
    }

    /// A page fetch is outstanding
    pub fn working(&self) -> bool {
        self.pager.state() == PagerState::FetchInFlight
    }

    pub(crate) fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Page { generation, result } => {
                if generation != self.generation {
                    debug!(generation, current = self.generation, "Dropping stale page");
                    return;
                }
                self.fetch_complete(result);
            }
            Completion::Thumbnail {
                generation,
                world_id,
                result,
            } => {
                if generation != self.generation {
                    debug!(world = %world_id, "Dropping stale thumbnail");
                    return;
                }
                self.thumbnail_complete(world_id, result);
            }
            Completion::World {
                request,
                world_id,
                result,
            } => self.world_complete(request, world_id, result),
            Completion::OffPageWorld {
                request,
                world_id,
                result,
            } => self.off_page_complete(request, world_id, result),
            Completion::Deleted { world_id, result } => match result {
                Ok(()) => debug!(world = %world_id, "Remote delete finished"),
                Err(e) => warn!(world = %world_id, error = %e, "Remote delete failed"),
            },
        }
    }

    /// Run `request` on the runtime and send its result back as a completion
    pub(crate) fn spawn_request<T, F>(
        &self,
        token: CancellationToken,
        request: BoxFuture<'static, ServiceResult<T>>,
        wrap: F,
    ) where
        T: Send + 'static,
        F: FnOnce(ServiceResult<T>) -> Completion + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        self.runtime.spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => Err(ServiceError::Cancelled),
                result = request => result,
            };
            // The browser may be gone; nothing left to tell.
            let _ = tx.send(wrap(result));
        });
    }
}

// ============================================================================
// CACHE
// ============================================================================

impl Browser {
    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn level(&self, id: &WorldId) -> Option<&LevelMetadata> {
        self.cache.get(id)
    }

    pub fn index_of(&self, id: &WorldId) -> Option<usize> {
        self.cache.index_of(id)
    }

    pub fn library(&self) -> &LocalLibrary {
        &self.library
    }

    /// Merge a level into the cache and fan it out to every query.
    /// Returns `false` if the id was already cached.
    pub(crate) fn add_level(&mut self, level: LevelMetadata) -> bool {
        let id = level.world_id;
        if !self.cache.insert(level) {
            return false;
        }
        let Self { cache, queries, .. } = self;
        if let Some(level) = cache.get(&id) {
            for query in queries.iter_mut() {
                query.level_added(level, cache);
            }
        }
        true
    }

    fn level_removed(&mut self, id: &WorldId) {
        for query in &mut self.queries {
            query.level_removed(id);
        }
    }

    /// Re-evaluate a level against every query after it changed in place
    pub fn metadata_updated(&mut self, id: WorldId) {
        let Self { cache, queries, .. } = self;
        let Some(level) = cache.get(&id) else {
            return;
        };
        for query in queries.iter_mut() {
            let matches = query.filter().matches(level);
            if query.contains(&id) && !matches {
                query.level_removed(&id);
            } else if !query.contains(&id) && matches {
                query.level_added(level, cache);
            }
        }
    }

    /// Replay every cached level into a query
    pub fn load_query(&mut self, query: QueryId) {
        let Self { cache, queries, .. } = self;
        let Some(query) = queries.iter_mut().find(|q| q.id == query) else {
            return;
        };
        for level in cache.iter() {
            query.level_added(level, cache);
        }
    }

    /// Remove a level locally, then ask the service to delete it. The callback
    /// fires right away with `None` so the consumer can resume fetching; the
    /// remote outcome is only logged. Refused after [`Browser::shutdown`].
    pub fn start_deleting_level(
        &mut self,
        id: WorldId,
        bucket: Genres,
        callback: DeleteCallback,
    ) -> bool {
        if self.shut_down {
            warn!(world = %id, "Delete refused after shutdown");
            return false;
        }
        if self.cache.remove(&id).is_some() {
            self.level_removed(&id);
        }
        self.downloads.forget(&id);
        debug!(world = %id, bucket = bucket.bits(), "Deleting world");

        let delete = self.service.delete_world(id);
        self.spawn_request(self.root_token.clone(), delete, move |result| {
            Completion::Deleted {
                world_id: id,
                result,
            }
        });

        callback(None);
        true
    }
}

// ============================================================================
// CURSORS
// ============================================================================

impl Browser {
    /// Open a cursor over a new query. Events for the cursor arrive on the
    /// returned receiver.
    pub fn open_cursor(
        &mut self,
        desired_selection: Option<WorldId>,
        sorter: LevelSorter,
        filter: LevelFilter,
        size: usize,
    ) -> (CursorId, UnboundedReceiver<CursorEvent>) {
        self.next_query += 1;
        let query_id = QueryId(self.next_query);
        self.queries.push(Query::new(query_id, sorter, filter));
        self.load_query(query_id);

        let (tx, rx) = unbounded_channel();
        let cursor_id = self.new_cursor_id();
        let cursor = Cursor::new(cursor_id, desired_selection, size, tx);
        if let Some(query) = self.query_mut(query_id) {
            query.add_cursor(cursor);
        }
        debug!(query = query_id.0, cursor = cursor_id.0, size, "Cursor opened");
        (cursor_id, rx)
    }

    /// Open another cursor on the query behind `existing`
    pub fn open_sibling_cursor(
        &mut self,
        existing: CursorId,
        desired_selection: Option<WorldId>,
        size: usize,
    ) -> Option<(CursorId, UnboundedReceiver<CursorEvent>)> {
        let query_id = self.cursor_query(existing)?;
        let (tx, rx) = unbounded_channel();
        let cursor_id = self.new_cursor_id();
        let cursor = Cursor::new(cursor_id, desired_selection, size, tx);
        self.query_mut(query_id)?.add_cursor(cursor);
        Some((cursor_id, rx))
    }

    /// Close a cursor; its query goes away with its last cursor
    pub fn close_cursor(&mut self, cursor: CursorId) -> bool {
        let Some(index) = self.queries.iter().position(|q| q.has_cursor(cursor)) else {
            return false;
        };
        if self.queries[index].remove_cursor(cursor) == 0 {
            let query = self.queries.remove(index);
            if self.pager.requester() == Some(query.id) {
                self.pager.clear_requester();
            }
            debug!(query = query.id.0, "Query closed");
        }
        true
    }

    pub fn cursor_query(&self, cursor: CursorId) -> Option<QueryId> {
        self.queries
            .iter()
            .find(|q| q.has_cursor(cursor))
            .map(|q| q.id)
    }

    pub fn query(&self, id: QueryId) -> Option<&Query> {
        self.queries.iter().find(|q| q.id == id)
    }

    pub(crate) fn query_mut(&mut self, id: QueryId) -> Option<&mut Query> {
        self.queries.iter_mut().find(|q| q.id == id)
    }

    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    /// Levels currently visible through a cursor
    pub fn cursor_window(&self, cursor: CursorId) -> Option<Vec<&LevelMetadata>> {
        let query = self.queries.iter().find(|q| q.has_cursor(cursor))?;
        let window = query.cursor(cursor)?.window(query.len());
        Some(
            query.ids()[window]
                .iter()
                .filter_map(|id| self.cache.get(id))
                .collect(),
        )
    }

    /// Scroll a cursor; returns the applied delta
    pub fn shift_cursor(&mut self, cursor: CursorId, delta: isize) -> Option<isize> {
        let query = self.queries.iter_mut().find(|q| q.has_cursor(cursor))?;
        let len = query.len();
        Some(query.cursor_mut(cursor)?.shift(delta, len))
    }

    /// Bring a level into a cursor's window
    pub fn jump_cursor(&mut self, cursor: CursorId, target: WorldId) -> bool {
        let Some(query) = self.queries.iter_mut().find(|q| q.has_cursor(cursor)) else {
            return false;
        };
        let Some(index) = query.ids().iter().position(|id| *id == target) else {
            return false;
        };
        let len = query.len();
        match query.cursor_mut(cursor) {
            Some(c) => {
                c.jump_to_index(index, len);
                true
            }
            None => false,
        }
    }

    /// Change the sort/filter of the query behind `cursor`. Every cursor on
    /// that query jumps to a valid window.
    pub fn change_cursor_criteria(
        &mut self,
        cursor: CursorId,
        sorter: LevelSorter,
        filter: LevelFilter,
    ) -> bool {
        let Self { cache, queries, .. } = self;
        match queries.iter_mut().find(|q| q.has_cursor(cursor)) {
            Some(query) => {
                query.set_criteria(sorter, filter, cache);
                true
            }
            None => false,
        }
    }

    fn new_cursor_id(&mut self) -> CursorId {
        self.next_cursor += 1;
        CursorId(self.next_cursor)
    }
}
