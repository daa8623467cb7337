//! Paging - grows the cache one page of worlds at a time

use super::{Browser, Completion};
use crate::constants::*;
use crate::query::LevelFilter;
use crate::service::{parse_page, ServiceResult, WorldsRequest};
use crate::types::*;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagerState {
    #[default]
    Idle,
    FetchInFlight,
    /// No more pages until the next reset
    EndReached,
}

#[derive(Default)]
pub(crate) struct Pager {
    state: PagerState,
    first: usize,
    requester: Option<QueryId>,
}

impl Pager {
    pub(crate) fn state(&self) -> PagerState {
        self.state
    }

    /// Offset of the next page request
    pub(crate) fn first(&self) -> usize {
        self.first
    }

    pub(crate) fn end_reached(&self) -> bool {
        self.state == PagerState::EndReached
    }

    pub(crate) fn requester(&self) -> Option<QueryId> {
        self.requester
    }

    pub(crate) fn clear_requester(&mut self) {
        self.requester = None;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Browser {
    pub fn pager_state(&self) -> PagerState {
        self.pager.state()
    }

    pub fn end_reached(&self) -> bool {
        self.pager.end_reached()
    }

    /// Offset the next page request will start at
    pub fn paging_offset(&self) -> usize {
        self.pager.first()
    }

    /// Ask the service for the next page using `query`'s criteria.
    /// Returns `false` if a page is already in flight or the end was reached.
    pub fn start_fetching_more(&mut self, query: QueryId) -> bool {
        if self.shut_down || self.pager.state != PagerState::Idle {
            return false;
        }
        let Some(q) = self.query(query) else {
            return false;
        };

        let request = WorldsRequest {
            first: self.pager.first,
            count: PAGE_SIZE,
            sort_by: q.sorter().service_sort_by().to_string(),
            sort_dir: q.sorter().service_sort_dir().to_string(),
            date_range: DATE_RANGE_ALL.to_string(),
            keywords: q.filter().search.clone(),
            creator: self.creator_for(q.filter()),
        };
        q.notify_all(CursorEvent::Fetching);

        debug!(
            first = request.first,
            sort_by = %request.sort_by,
            sort_dir = %request.sort_dir,
            keywords = %request.keywords,
            "Fetching page"
        );

        self.pager.state = PagerState::FetchInFlight;
        self.pager.requester = Some(query);

        let generation = self.generation;
        let fetch = self.service.get_worlds(request);
        self.spawn_request(self.browse_token.clone(), fetch, move |result| {
            Completion::Page { generation, result }
        });
        true
    }

    fn creator_for(&self, filter: &LevelFilter) -> Option<String> {
        if !CREATOR_FILTER_ENABLED || !filter.genres.contains(Genres::MY_WORLDS) {
            return None;
        }
        self.creator_name.clone()
    }

    /// Merge a finished page. Paging ends once a page adds fewer than a
    /// page's worth of new levels, or on a transport failure or an
    /// unreadable payload.
    pub(crate) fn fetch_complete(&mut self, result: ServiceResult<String>) {
        let requester = self.pager.requester.take();

        match result.and_then(|payload| parse_page(&payload)) {
            Ok(worlds) => {
                let received = worlds.len();
                let mut added = 0;
                for remote in worlds {
                    if self.cache.contains(&remote.world_id) {
                        continue;
                    }
                    let mut level = remote.into_level();
                    self.mark_if_downloaded(&mut level);
                    if self.add_level(level) {
                        added += 1;
                    }
                }

                self.pager.first += added;
                self.pager.state = if added < PAGE_SIZE {
                    PagerState::EndReached
                } else {
                    PagerState::Idle
                };
                info!(
                    received,
                    added,
                    next = self.pager.first,
                    end = self.pager.end_reached(),
                    "Page merged"
                );
            }
            Err(e) => {
                warn!(error = %e, "Page fetch failed, paging stopped");
                self.pager.state = PagerState::EndReached;
            }
        }

        if let Some(query) = requester.and_then(|id| self.query(id)) {
            query.notify_all(CursorEvent::FetchComplete);
        }
    }

    /// Flag levels the local library already holds a current copy of
    fn mark_if_downloaded(&self, level: &mut LevelMetadata) {
        match self.library.is_current(level) {
            Ok(true) => {
                level.download_state = DownloadState::Complete;
                level.genres |= Genres::DOWNLOADS;
            }
            Ok(false) => {}
            Err(e) => warn!(world = %level.world_id, error = %e, "Library lookup failed"),
        }
    }
}
