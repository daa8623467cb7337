//! Download logic - full world content for cached and off-page worlds

use super::thumbnails::ThumbnailQueue;
use super::{Browser, Completion};
use crate::service::{ServiceResult, WorldData};
use crate::types::*;
use crate::utils::format_bytes;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Callback side tables for in-flight requests, keyed by request serial so
/// repeated requests for one world each get their answer. Level records never
/// hold callbacks themselves.
#[derive(Default)]
pub(crate) struct DownloadManager {
    pub(crate) worlds: HashMap<u64, WorldCallback>,
    pub(crate) off_page: HashMap<u64, OffPageCallback>,
    pub(crate) thumbnails: ThumbnailQueue,
    next_request: u64,
}

impl DownloadManager {
    fn next_request(&mut self) -> u64 {
        self.next_request += 1;
        self.next_request
    }

    /// Drop anything pending for a level that left the cache
    pub(crate) fn forget(&mut self, id: &WorldId) {
        self.thumbnails.forget(id);
    }

    pub(crate) fn clear(&mut self) {
        self.worlds.clear();
        self.off_page.clear();
        self.thumbnails.clear();
    }
}

impl Browser {
    /// Download the full content of a cached level. The level is marked
    /// in progress until the service answers; there is no retry.
    pub fn start_downloading_world(&mut self, id: WorldId, callback: WorldCallback) -> bool {
        if self.shut_down {
            return false;
        }
        let Some(level) = self.cache.get_mut(&id) else {
            return false;
        };
        level.download_state = DownloadState::InProgress;
        let request = self.downloads.next_request();
        self.downloads.worlds.insert(request, callback);

        info!(world = %id, request, "Downloading world");
        let fetch = self.service.get_world_data(id);
        self.spawn_request(self.root_token.clone(), fetch, move |result| {
            Completion::World {
                request,
                world_id: id,
                result,
            }
        });
        true
    }

    /// Download a world that may not be in any current page. Only the id
    /// travels with the request.
    pub fn start_downloading_off_page_world(
        &mut self,
        id: WorldId,
        callback: OffPageCallback,
    ) -> bool {
        if self.shut_down {
            return false;
        }
        let request = self.downloads.next_request();
        self.downloads.off_page.insert(request, callback);

        info!(world = %id, request, "Downloading off-page world");
        let fetch = self.service.get_world_data(id);
        self.spawn_request(self.root_token.clone(), fetch, move |result| {
            Completion::OffPageWorld {
                request,
                world_id: id,
                result,
            }
        });
        true
    }

    pub fn downloads_in_flight(&self) -> usize {
        self.downloads.worlds.len() + self.downloads.off_page.len()
    }

    pub(crate) fn world_complete(
        &mut self,
        request: u64,
        id: WorldId,
        result: ServiceResult<WorldData>,
    ) {
        let callback = self.downloads.worlds.remove(&request);
        let download = to_download(id, result);

        if let Some(level) = self.cache.get_mut(&id) {
            if let (Some(content), Some(thumbnail)) = (&download.content, &download.thumbnail) {
                level.download_state = DownloadState::Complete;
                level.genres |= Genres::DOWNLOADS;
                let thumbnail = (!thumbnail.is_empty()).then_some(thumbnail.as_slice());
                if let Err(e) = self.library.record_download(level, content, thumbnail) {
                    warn!(world = %id, error = %e, "Failed to record download");
                }
            } else {
                level.download_state = DownloadState::Failed;
            }
        }
        if download.succeeded() {
            self.metadata_updated(id);
        }

        match callback {
            Some(callback) => callback(&download, self.cache.get(&id)),
            None => debug!(world = %id, request, "World download finished with nobody waiting"),
        }
    }

    pub(crate) fn off_page_complete(
        &mut self,
        request: u64,
        id: WorldId,
        result: ServiceResult<WorldData>,
    ) {
        let download = to_download(id, result);
        if let Some(callback) = self.downloads.off_page.remove(&request) {
            callback(&download);
        }
    }
}

fn to_download(id: WorldId, result: ServiceResult<WorldData>) -> WorldDownload {
    match result {
        Ok(data) => {
            info!(
                world = %id,
                size = %format_bytes(data.content.len() as u64),
                "World downloaded"
            );
            WorldDownload {
                world_id: id,
                content: Some(data.content),
                thumbnail: Some(data.thumbnail),
            }
        }
        Err(e) => {
            warn!(world = %id, error = %e, "World download failed");
            WorldDownload::failed(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::query::{LevelFilter, LevelSorter};
    use crate::service::ServiceError;
    use std::sync::{Arc, Mutex};

    fn with_levels(ids: std::ops::RangeInclusive<u128>) -> (Browser, Arc<RecordingService>, tokio::runtime::Runtime) {
        let (mut browser, svc, rt) = browser();
        let (cursor, _rx) =
            browser.open_cursor(None, LevelSorter::default(), LevelFilter::default(), 10);
        let q = browser.cursor_query(cursor).unwrap();
        browser.start_fetching_more(q);
        let generation = browser.generation;
        browser.apply(Completion::Page {
            generation,
            result: Ok(page_json(ids)),
        });
        (browser, svc, rt)
    }

    #[test]
    fn successful_download_completes_and_records() {
        let (mut browser, svc, _rt) = with_levels(1..=3);
        let id = WorldId::from_u128(2);
        let got = Arc::new(Mutex::new(None));
        let sink = got.clone();
        assert!(browser.start_downloading_world(
            id,
            Box::new(move |download, level| {
                *sink.lock().unwrap() = Some((
                    download.content.clone(),
                    level.map(|l| l.download_state),
                ));
            }),
        ));
        assert_eq!(
            browser.level(&id).unwrap().download_state,
            DownloadState::InProgress
        );
        assert_eq!(*svc.worlds.lock().unwrap(), vec![id]);

        browser.apply(Completion::World {
            request: 1,
            world_id: id,
            result: Ok(WorldData {
                content: b"<world/>".to_vec(),
                thumbnail: Vec::new(),
            }),
        });
        let level = browser.level(&id).unwrap();
        assert_eq!(level.download_state, DownloadState::Complete);
        assert!(level.genres.contains(Genres::DOWNLOADS));
        assert!(browser.library().is_current(level).unwrap());
        assert_eq!(
            *got.lock().unwrap(),
            Some((Some(b"<world/>".to_vec()), Some(DownloadState::Complete)))
        );
        assert_eq!(browser.downloads_in_flight(), 0);
    }

    #[test]
    fn failed_download_is_terminal_and_reported() {
        let (mut browser, _svc, _rt) = with_levels(1..=3);
        let id = WorldId::from_u128(1);
        let failed = Arc::new(Mutex::new(false));
        let flag = failed.clone();
        browser.start_downloading_world(
            id,
            Box::new(move |download, _| *flag.lock().unwrap() = !download.succeeded()),
        );
        browser.apply(Completion::World {
            request: 1,
            world_id: id,
            result: Err(ServiceError::Status(404)),
        });
        assert_eq!(browser.level(&id).unwrap().download_state, DownloadState::Failed);
        assert!(*failed.lock().unwrap());
        assert!(browser.library().get(id).unwrap().is_none());
    }

    #[test]
    fn repeated_download_of_one_world_answers_every_caller() {
        let (mut browser, svc, _rt) = with_levels(1..=3);
        let id = WorldId::from_u128(3);
        let answers = Arc::new(Mutex::new(Vec::new()));
        for caller in ["first", "second"] {
            let answers = answers.clone();
            assert!(browser.start_downloading_world(
                id,
                Box::new(move |download, _| {
                    answers.lock().unwrap().push((caller, download.succeeded()))
                }),
            ));
        }
        assert_eq!(svc.worlds.lock().unwrap().len(), 2);
        assert_eq!(browser.downloads_in_flight(), 2);

        browser.apply(Completion::World {
            request: 2,
            world_id: id,
            result: Err(ServiceError::Status(503)),
        });
        browser.apply(Completion::World {
            request: 1,
            world_id: id,
            result: Ok(WorldData {
                content: b"<world/>".to_vec(),
                thumbnail: Vec::new(),
            }),
        });
        assert_eq!(
            *answers.lock().unwrap(),
            vec![("second", false), ("first", true)]
        );
        assert_eq!(browser.downloads_in_flight(), 0);
        assert_eq!(
            browser.level(&id).unwrap().download_state,
            DownloadState::Complete
        );
    }

    #[test]
    fn unknown_world_is_refused_but_off_page_is_not() {
        let (mut browser, _svc, _rt) = with_levels(1..=3);
        let missing = WorldId::from_u128(77);
        assert!(!browser.start_downloading_world(missing, Box::new(|_, _| {})));

        let got = Arc::new(Mutex::new(None));
        let sink = got.clone();
        assert!(browser.start_downloading_off_page_world(
            missing,
            Box::new(move |download| *sink.lock().unwrap() = Some(download.clone())),
        ));
        browser.apply(Completion::OffPageWorld {
            request: 1,
            world_id: missing,
            result: Ok(WorldData {
                content: b"linked".to_vec(),
                thumbnail: b"png".to_vec(),
            }),
        });
        let download = got.lock().unwrap().take().unwrap();
        assert_eq!(download.world_id, missing);
        assert_eq!(download.content.as_deref(), Some(&b"linked"[..]));
        assert!(browser.level(&missing).is_none());
    }

    #[test]
    fn shutdown_refuses_new_downloads() {
        let (mut browser, _svc, _rt) = with_levels(1..=3);
        browser.shutdown();
        assert!(!browser.start_downloading_world(WorldId::from_u128(1), Box::new(|_, _| {})));
        assert!(!browser.start_downloading_off_page_world(WorldId::from_u128(1), Box::new(|_| {})));
        assert!(!browser.start_fetching_more(QueryId(1)));
    }
}
