use community_browser::service::ServiceResult;
use community_browser::*;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Catalog answering from a script. Pages are served in order; an optional
/// gate holds the next page back until the test releases it.
#[derive(Default)]
struct ScriptedService {
    pages: Mutex<VecDeque<ServiceResult<String>>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    requests: Mutex<Vec<WorldsRequest>>,
    thumbnail: Vec<u8>,
}

impl ScriptedService {
    fn with_pages(pages: Vec<String>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().map(Ok).collect()),
            thumbnail: png(),
            ..Default::default()
        }
    }
}

impl CatalogService for ScriptedService {
    fn get_worlds(&self, request: WorldsRequest) -> BoxFuture<'static, ServiceResult<String>> {
        self.requests.lock().unwrap().push(request);
        let page = self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("[]".to_string()));
        let gate = self.gate.lock().unwrap().take();
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            page
        }
        .boxed()
    }

    fn get_world_data(&self, _id: WorldId) -> BoxFuture<'static, ServiceResult<WorldData>> {
        let thumbnail = self.thumbnail.clone();
        futures::future::ready(Ok(WorldData {
            content: b"<world/>".to_vec(),
            thumbnail,
        }))
        .boxed()
    }

    fn get_thumbnail(&self, _id: WorldId) -> BoxFuture<'static, ServiceResult<Vec<u8>>> {
        futures::future::ready(Ok(self.thumbnail.clone())).boxed()
    }

    fn delete_world(&self, _id: WorldId) -> BoxFuture<'static, ServiceResult<()>> {
        futures::future::ready(Ok(())).boxed()
    }
}

fn png() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbaImage::from_pixel(8, 6, image::Rgba([200, 10, 10, 255]))
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn page(ids: impl IntoIterator<Item = u128>) -> String {
    let entries: Vec<serde_json::Value> = ids
        .into_iter()
        .map(|n| {
            serde_json::json!({
                "WorldId": WorldId::from_u128(n).to_string(),
                "Name": format!("World {n}"),
                "Description": "shared world",
                "Checksum": format!("{n:08x}"),
                "Creator": "kodu",
                "Downloads": 100 - n as i32,
                "Modified": format!("2016-03-01T12:{:02}:00", n % 60),
                "LastWriteTime": "2016-02-01T08:00:00"
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}

fn browser_for(service: Arc<ScriptedService>) -> Browser {
    Browser::new(
        service,
        LocalLibrary::open_in_memory().unwrap(),
        tokio::runtime::Handle::current(),
    )
}

/// Run frames until `done` holds or we give up
async fn pump_until(browser: &mut Browser, mut done: impl FnMut(&Browser) -> bool) -> bool {
    for _ in 0..400 {
        browser.update();
        if done(browser) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn two_pages_with_overlap_end_paging() {
    let service = Arc::new(ScriptedService::with_pages(vec![
        page(1..=30),
        page((26..=30).chain(31..=40)),
    ]));
    let mut browser = browser_for(service.clone());
    let (cursor, mut events) =
        browser.open_cursor(None, LevelSorter::default(), LevelFilter::default(), 8);

    // The empty cursor asks for the first page on its own.
    assert!(pump_until(&mut browser, |b| b.cache().len() == 30 && !b.working()).await);
    assert_eq!(browser.paging_offset(), 30);
    assert_eq!(browser.pager_state(), PagerState::Idle);

    let query = browser.cursor_query(cursor).unwrap();
    assert!(browser.start_fetching_more(query));
    assert!(!browser.start_fetching_more(query));
    assert!(pump_until(&mut browser, |b| b.end_reached()).await);

    assert_eq!(browser.cache().len(), 40);
    assert_eq!(browser.paging_offset(), 40);
    assert!(!browser.start_fetching_more(query));

    let requests = service.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].first, 30);

    // Default sort is newest first.
    let window = browser.cursor_window(cursor).unwrap();
    assert_eq!(window.len(), 8);
    for pair in window.windows(2) {
        assert!(pair[0].sort_time >= pair[1].sort_time);
    }

    let mut fetch_events = 0;
    while let Ok(event) = events.try_recv() {
        if event == CursorEvent::FetchComplete {
            fetch_events += 1;
        }
    }
    assert_eq!(fetch_events, 2);
}

#[tokio::test]
async fn page_arriving_after_reset_is_ignored() {
    let service = Arc::new(ScriptedService::with_pages(vec![page(1..=30), page(50..=52)]));
    let (release, gate) = oneshot::channel();
    *service.gate.lock().unwrap() = Some(gate);

    let mut browser = browser_for(service.clone());
    let (cursor, _events) =
        browser.open_cursor(None, LevelSorter::default(), LevelFilter::default(), 5);
    let query = browser.cursor_query(cursor).unwrap();
    assert!(browser.start_fetching_more(query));

    browser.reset();
    let _ = release.send(());
    tokio::time::sleep(Duration::from_millis(20)).await;
    browser.update();
    // Reset left the pager idle, so this frame already asked for a fresh page.
    assert!(browser.cache().is_empty() || browser.index_of(&WorldId::from_u128(1)).is_none());

    assert!(pump_until(&mut browser, |b| b.end_reached()).await);
    assert_eq!(browser.cache().len(), 3);
    assert!(browser.level(&WorldId::from_u128(1)).is_none());
    assert!(browser.level(&WorldId::from_u128(50)).is_some());
}

#[tokio::test]
async fn thumbnails_and_worlds_download_through_the_runtime() {
    let service = Arc::new(ScriptedService::with_pages(vec![page(1..=4)]));
    let mut browser = browser_for(service);
    let (cursor, _events) = browser.open_cursor(
        None,
        LevelSorter::new(SortBy::Rank, SortDirection::Descending),
        LevelFilter::default(),
        4,
    );
    assert!(pump_until(&mut browser, |b| b.end_reached()).await);

    let ids: Vec<WorldId> = browser
        .cursor_window(cursor)
        .unwrap()
        .iter()
        .map(|l| l.world_id)
        .collect();
    assert_eq!(ids[0], WorldId::from_u128(1));

    let loaded = Arc::new(Mutex::new(Vec::new()));
    for id in &ids {
        let loaded = loaded.clone();
        browser.start_downloading_thumbnail(
            *id,
            Box::new(move |level| loaded.lock().unwrap().push(level.world_id)),
            false,
        );
    }
    assert!(pump_until(&mut browser, |_| loaded.lock().unwrap().len() == 4).await);
    let order = loaded.lock().unwrap().clone();
    let mut newest_first = ids.clone();
    newest_first.reverse();
    assert_eq!(order, newest_first);
    match &browser.level(&ids[0]).unwrap().thumbnail {
        ThumbnailState::Loaded(thumb) => assert_eq!((thumb.width, thumb.height), (8, 6)),
        other => panic!("thumbnail not loaded: {other:?}"),
    }

    let done = Arc::new(Mutex::new(None));
    let sink = done.clone();
    assert!(browser.start_downloading_world(
        ids[1],
        Box::new(move |download, _| *sink.lock().unwrap() = Some(download.succeeded())),
    ));
    assert!(pump_until(&mut browser, |_| done.lock().unwrap().is_some()).await);
    assert_eq!(*done.lock().unwrap(), Some(true));
    let level = browser.level(&ids[1]).unwrap();
    assert_eq!(level.download_state, DownloadState::Complete);
    assert!(browser.library().is_current(level).unwrap());
}
