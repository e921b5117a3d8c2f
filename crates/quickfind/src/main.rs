//! Interactive fuzzy path search.
//!
//! Indexes every path under a root directory (or reloads the cached index)
//! and answers queries typed on stdin, re-querying on a short poll interval
//! whenever the input changes.
//!
//! Usage: `quickfind [ROOT [CACHE_DIR]]`. ROOT defaults to the home
//! directory, CACHE_DIR to the platform-local data directory.

mod orchestrator;

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use fuzzy_index::{IndexConfig, IndexManager};

use crate::orchestrator::QueryOrchestrator;

/// How often the input line is polled for changes.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Poll ticks between progress lines while the index builds.
const PROGRESS_EVERY_TICKS: u32 = 20;

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let root = args
        .next()
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("/"));
    let cache_dir = args
        .next()
        .map(PathBuf::from)
        .or_else(|| dirs::data_local_dir().map(|dir| dir.join("quickfind")))
        .unwrap_or_else(|| PathBuf::from(".quickfind"));

    log::info!(
        "indexing {} (cache at {})",
        root.display(),
        cache_dir.display()
    );
    let manager = match IndexManager::start(IndexConfig { root, cache_dir }) {
        Ok(manager) => manager,
        Err(error) => {
            eprintln!("quickfind: {error}");
            std::process::exit(1);
        }
    };

    // Dedicated reader: each stdin line replaces the current query text.
    let (input_tx, mut input_rx) = tokio::sync::watch::channel(String::new());
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let _ = input_tx.send(line.trim().to_string());
                }
            }
        }
    });

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    let mut orchestrator = QueryOrchestrator::new();
    let mut announced_ready = false;
    let mut ticks = 0u32;

    loop {
        poll.tick().await;

        if !manager.is_ready() {
            ticks += 1;
            if ticks % PROGRESS_EVERY_TICKS == 0 {
                let (done, total) = manager.progress();
                println!("{} {done}/{total}", manager.state().as_str());
            }
            if let Some(error) = manager.last_error() {
                eprintln!("quickfind: {error}");
                std::process::exit(1);
            }
            continue;
        }

        if !announced_ready {
            let (_, total) = manager.progress();
            let skipped = manager.crawl_errors();
            if skipped > 0 {
                println!(
                    "ready: {total} entries indexed ({skipped} unreadable subtrees skipped), type a query:"
                );
            } else {
                println!("ready: {total} entries indexed, type a query:");
            }
            announced_ready = true;
        }

        // Sender gone means stdin closed; drain the last input and exit.
        let input_gone = input_rx.has_changed().is_err();
        let input = input_rx.borrow_and_update().clone();
        if let Some(pane) = orchestrator.poll(&input, &manager) {
            if pane.is_empty() {
                println!("(no matches)");
            } else {
                println!("{pane}");
            }
        }
        if input_gone {
            break;
        }
    }
}
