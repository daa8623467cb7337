//! Community Browser - headless browse loop against the community service

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use anyhow::Context;
use community_browser::constants::APP_VERSION;
use community_browser::utils::get_data_dir;
use community_browser::{
    Browser, CursorEvent, HttpCatalogService, LevelFilter, LevelSorter, LocalLibrary, Settings,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Initialize file logging. Returns a guard that must be held for the app lifetime.
fn init_logging(data_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let logs_dir = data_dir.join("logs");
    std::fs::create_dir_all(&logs_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&logs_dir, "community-browser.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,community_browser=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    guard
}

fn main() -> anyhow::Result<()> {
    let data_dir = get_data_dir();
    std::fs::create_dir_all(&data_dir).ok();

    // Initialize logging - guard must live for entire app lifetime
    let _log_guard = init_logging(&data_dir);

    info!(version = APP_VERSION, "Community browser starting");

    let settings = Settings::load(&data_dir);
    // Writes the file back so new fields show up with their defaults
    settings.save(&data_dir);
    let library_path = settings.library_path(&data_dir);
    let library = LocalLibrary::open(&library_path)
        .with_context(|| format!("Failed to open library at {}", library_path.display()))?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let service = Arc::new(HttpCatalogService::new(settings.service_url.clone()));
    let mut browser = Browser::new(service, library, runtime.handle().clone())
        .with_creator_name(settings.creator_name.clone());

    let keywords = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    info!(url = %settings.service_url, keywords = %keywords, "Opening cursor");
    let (cursor, mut events) = browser.open_cursor(
        None,
        LevelSorter::default(),
        LevelFilter::new(Default::default(), keywords),
        settings.page_rows,
    );

    let frame = Duration::from_millis(settings.frame_ms.max(1));
    let deadline = Instant::now() + Duration::from_secs(settings.run_seconds);
    while Instant::now() < deadline {
        browser.update();

        let mut dirty = false;
        while let Ok(event) = events.try_recv() {
            debug!(?event, "Cursor event");
            dirty |= !matches!(event, CursorEvent::Fetching);
        }
        if dirty {
            print_window(&browser, cursor);
        }
        if browser.end_reached() && !browser.working() {
            break;
        }
        std::thread::sleep(frame);
    }

    info!(cached = browser.cache().len(), "Browse loop finished");
    browser.close_cursor(cursor);
    browser.shutdown();
    Ok(())
}

fn print_window(browser: &Browser, cursor: community_browser::CursorId) {
    let Some(window) = browser.cursor_window(cursor) else {
        return;
    };
    println!("--- {} cached, showing {} ---", browser.cache().len(), window.len());
    for level in window {
        println!(
            "{:<40} {:<20} {:>6} dl  {}",
            level.name,
            level.creator,
            level.downloads,
            level.sort_time.format("%Y-%m-%d")
        );
    }
}
