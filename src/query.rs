//! Sort + filter projections over the metadata cache

use crate::cache::MetadataCache;
use crate::cursor::Cursor;
use crate::types::*;
use std::cmp::Ordering;
use tracing::debug;

/// Orders levels the same way the service orders its pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSorter {
    pub sort_by: SortBy,
    pub direction: SortDirection,
}

impl LevelSorter {
    pub fn new(sort_by: SortBy, direction: SortDirection) -> Self {
        Self { sort_by, direction }
    }

    pub fn compare(&self, a: &LevelMetadata, b: &LevelMetadata) -> Ordering {
        let cmp = match self.sort_by {
            SortBy::Date => a.sort_time.cmp(&b.sort_time),
            SortBy::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortBy::Creator => a.creator.to_lowercase().cmp(&b.creator.to_lowercase()),
            // The service ranks by download count.
            SortBy::Rank => a.downloads.cmp(&b.downloads),
        };
        if self.direction == SortDirection::Descending {
            cmp.reverse()
        } else {
            cmp
        }
    }

    /// Sort key in the service's vocabulary
    pub fn service_sort_by(&self) -> &'static str {
        match self.sort_by {
            SortBy::Date => "date",
            SortBy::Name => "name",
            SortBy::Creator => "creator",
            SortBy::Rank => "downloads",
        }
    }

    pub fn service_sort_dir(&self) -> &'static str {
        match self.direction {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

impl Default for LevelSorter {
    fn default() -> Self {
        Self::new(SortBy::Date, SortDirection::Descending)
    }
}

/// Genre + keyword filter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LevelFilter {
    /// Genres a level must carry. `MY_WORLDS` is a service-side concept and
    /// is ignored locally.
    pub genres: Genres,
    pub search: String,
}

impl LevelFilter {
    pub fn new(genres: Genres, search: impl Into<String>) -> Self {
        Self {
            genres,
            search: search.into(),
        }
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.search.split_whitespace()
    }

    pub fn matches(&self, level: &LevelMetadata) -> bool {
        let required = self.genres.without(Genres::MY_WORLDS);
        if !level.genres.contains(required) {
            return false;
        }

        let name = level.name.to_lowercase();
        let description = level.description.to_lowercase();
        let creator = level.creator.to_lowercase();
        self.keywords().all(|word| {
            let word = word.to_lowercase();
            name.contains(&word) || description.contains(&word) || creator.contains(&word)
        })
    }
}

/// Ordered ids of the cached levels that pass a filter, plus the cursors
/// watching them.
pub struct Query {
    pub(crate) id: QueryId,
    sorter: LevelSorter,
    filter: LevelFilter,
    ids: Vec<WorldId>,
    cursors: Vec<Cursor>,
}

impl Query {
    pub(crate) fn new(id: QueryId, sorter: LevelSorter, filter: LevelFilter) -> Self {
        Self {
            id,
            sorter,
            filter,
            ids: Vec::new(),
            cursors: Vec::new(),
        }
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn sorter(&self) -> &LevelSorter {
        &self.sorter
    }

    pub fn filter(&self) -> &LevelFilter {
        &self.filter
    }

    pub fn ids(&self) -> &[WorldId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &WorldId) -> bool {
        self.ids.contains(id)
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub(crate) fn cursor(&self, id: CursorId) -> Option<&Cursor> {
        self.cursors.iter().find(|c| c.id == id)
    }

    pub(crate) fn cursor_mut(&mut self, id: CursorId) -> Option<&mut Cursor> {
        self.cursors.iter_mut().find(|c| c.id == id)
    }

    pub(crate) fn has_cursor(&self, id: CursorId) -> bool {
        self.cursor(id).is_some()
    }

    /// Attach a cursor and anchor it on the current sequence
    pub(crate) fn add_cursor(&mut self, mut cursor: Cursor) {
        cursor.anchor(&self.ids);
        self.cursors.push(cursor);
    }

    /// Detach a cursor, returning how many remain
    pub(crate) fn remove_cursor(&mut self, id: CursorId) -> usize {
        self.cursors.retain(|c| c.id != id);
        self.cursors.len()
    }

    pub(crate) fn notify_all(&self, event: CursorEvent) {
        for cursor in &self.cursors {
            cursor.notify(event.clone());
        }
    }

    /// Insert `level` at its sorted position if it matches the filter.
    /// Equal elements keep cache arrival order, so the result matches a rebuild
    /// even when `level` joins late.
    pub(crate) fn level_added(&mut self, level: &LevelMetadata, cache: &MetadataCache) {
        if !self.filter.matches(level) || self.contains(&level.world_id) {
            return;
        }

        let sorter = self.sorter;
        let arrival = cache.sequence(&level.world_id).unwrap_or(u64::MAX);
        let index = self.ids.partition_point(|id| {
            let Some(existing) = cache.get(id) else {
                return true;
            };
            match sorter.compare(existing, level) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => cache.sequence(id).unwrap_or(0) < arrival,
            }
        });
        self.ids.insert(index, level.world_id);

        let len = self.ids.len();
        for cursor in &mut self.cursors {
            cursor.on_addition(level.world_id, index, len);
        }
    }

    pub(crate) fn level_removed(&mut self, id: &WorldId) {
        let Some(index) = self.ids.iter().position(|w| w == id) else {
            return;
        };
        self.ids.remove(index);

        let len = self.ids.len();
        for cursor in &mut self.cursors {
            cursor.on_removal(index, len);
        }
    }

    /// Whether some cursor wants more rows than are materialized
    pub(crate) fn update(&self, working: bool, end_reached: bool, margin: usize) -> bool {
        if working || end_reached {
            return false;
        }
        let len = self.ids.len();
        self.cursors.iter().any(|c| c.near_end(len, margin))
    }

    /// Drop every row; cursors snap back to the start
    pub(crate) fn clear(&mut self) {
        self.ids.clear();
        for cursor in &mut self.cursors {
            cursor.jump_to_start();
        }
    }

    /// Replace the criteria and rebuild from `cache`. Cursors re-anchor on
    /// their desired selection or the start.
    pub(crate) fn set_criteria(
        &mut self,
        sorter: LevelSorter,
        filter: LevelFilter,
        cache: &MetadataCache,
    ) {
        debug!(query = self.id.0, ?sorter, ?filter, "Query criteria changed");
        self.sorter = sorter;
        self.filter = filter;
        self.rebuild(cache);
    }

    /// Recompute the sequence from the cache without per-row notifications
    pub(crate) fn rebuild(&mut self, cache: &MetadataCache) {
        let filter = &self.filter;
        let sorter = self.sorter;
        let mut levels: Vec<&LevelMetadata> = cache.iter().filter(|l| filter.matches(l)).collect();
        levels.sort_by(|a, b| sorter.compare(a, b));
        self.ids = levels.into_iter().map(|l| l.world_id).collect();

        let ids = &self.ids;
        for cursor in &mut self.cursors {
            cursor.anchor(ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc::unbounded_channel;

    fn level(n: u128, name: &str, downloads: i32) -> LevelMetadata {
        let mut l = LevelMetadata::new(WorldId::from_u128(n), name);
        l.downloads = downloads;
        l.sort_time = Utc.timestamp_opt(1_600_000_000 + n as i64, 0).unwrap();
        l
    }

    fn feed(query: &mut Query, cache: &mut MetadataCache, levels: Vec<LevelMetadata>) {
        for l in levels {
            let id = l.world_id;
            cache.insert(l);
            let stored = cache.get(&id).unwrap().clone();
            query.level_added(&stored, cache);
        }
    }

    #[test]
    fn sequence_follows_comparator_with_stable_ties() {
        let mut cache = MetadataCache::new();
        let mut q = Query::new(
            QueryId(1),
            LevelSorter::new(SortBy::Rank, SortDirection::Descending),
            LevelFilter::default(),
        );
        feed(
            &mut q,
            &mut cache,
            vec![
                level(1, "a", 5),
                level(2, "b", 9),
                level(3, "c", 5),
                level(4, "d", 1),
                level(5, "e", 9),
            ],
        );
        let order: Vec<u128> = q.ids().iter().map(|id| id.0.as_u128()).collect();
        assert_eq!(order, [2, 5, 1, 3, 4]);
    }

    #[test]
    fn filter_excludes_non_matching_levels() {
        let mut cache = MetadataCache::new();
        let mut q = Query::new(
            QueryId(1),
            LevelSorter::new(SortBy::Name, SortDirection::Ascending),
            LevelFilter::new(Genres::MY_WORLDS, "castle"),
        );
        let mut tagged = level(3, "Sky", 0);
        tagged.description = "A floating CASTLE".into();
        feed(
            &mut q,
            &mut cache,
            vec![level(1, "Castle Run", 0), level(2, "Racer", 0), tagged],
        );
        assert_eq!(q.len(), 2);
        for id in q.ids() {
            assert!(q.filter().matches(cache.get(id).unwrap()));
        }
    }

    #[test]
    fn genre_filter_requires_bits() {
        let filter = LevelFilter::new(Genres::DOWNLOADS, "");
        let mut l = level(1, "x", 0);
        assert!(!filter.matches(&l));
        l.genres |= Genres::DOWNLOADS;
        assert!(filter.matches(&l));
    }

    #[test]
    fn rank_is_sent_as_downloads() {
        let sorter = LevelSorter::new(SortBy::Rank, SortDirection::Ascending);
        assert_eq!(sorter.service_sort_by(), "downloads");
        assert_eq!(sorter.service_sort_dir(), "asc");
        assert_eq!(LevelSorter::default().service_sort_by(), "date");
    }

    #[test]
    fn update_requests_more_only_when_idle_and_near_end() {
        let mut cache = MetadataCache::new();
        let mut q = Query::new(QueryId(1), LevelSorter::default(), LevelFilter::default());
        let (tx, _rx) = unbounded_channel();
        q.add_cursor(Cursor::new(CursorId(1), None, 5, tx));
        assert!(q.update(false, false, 2));
        assert!(!q.update(true, false, 2));
        assert!(!q.update(false, true, 2));
        feed(&mut q, &mut cache, (1..=20).map(|n| level(n, "w", 0)).collect());
        assert!(!q.update(false, false, 2));
    }

    #[test]
    fn set_criteria_rebuilds_and_jumps() {
        let mut cache = MetadataCache::new();
        let mut q = Query::new(QueryId(1), LevelSorter::default(), LevelFilter::default());
        let (tx, mut rx) = unbounded_channel();
        q.add_cursor(Cursor::new(CursorId(1), None, 3, tx));
        feed(
            &mut q,
            &mut cache,
            vec![level(1, "alpha", 0), level(2, "beta", 0), level(3, "gamma", 0)],
        );
        while rx.try_recv().is_ok() {}

        q.set_criteria(
            LevelSorter::new(SortBy::Name, SortDirection::Ascending),
            LevelFilter::new(Genres::NONE, "a"),
            &cache,
        );
        let names: Vec<_> = q
            .ids()
            .iter()
            .map(|id| cache.get(id).unwrap().name.clone())
            .collect();
        assert_eq!(names, ["alpha", "beta", "gamma"]);
        assert_eq!(rx.try_recv().unwrap(), CursorEvent::Jumped { first: 0 });
    }
}
