use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use url::Url;

use stockdex::{
    fetcher_fn, row, Directory, DirectoryConfig, EnrichmentError, EnrichmentScheduler, EnrichmentStatus,
    FetchError, RecordConfig, SchedulerConfig,
};

const WAIT: Duration = Duration::from_secs(5);

/// Single-worker directory whose fetches block until released.
fn gated_directory(record: RecordConfig) -> (Directory, Sender<()>, Receiver<String>) {
    let (release_tx, release_rx) = bounded::<()>(16);
    let (started_tx, started_rx) = bounded::<String>(16);
    let fetcher = fetcher_fn(move |url: &Url| {
        let _ = started_tx.send(url.to_string());
        release_rx
            .recv()
            .map_err(|_| FetchError::Transport { message: "gate closed".to_string() })?;
        Ok(format!("content of {url}"))
    });
    let config = DirectoryConfig {
        record,
        scheduler: SchedulerConfig { workers: 1 },
        ..DirectoryConfig::default()
    };
    (Directory::new(config, fetcher), release_tx, started_rx)
}

#[test]
fn last_scheduled_enrichment_wins() {
    let (directory, release, started) = gated_directory(RecordConfig::default());
    directory.load(vec![row([("Name", "Infosys"), ("URL", "https://example.com/v1")])]);
    let record = directory.get("infosys").unwrap();
    assert_eq!(started.recv_timeout(WAIT).unwrap(), "https://example.com/v1");

    // Two more attempts while the first is still fetching.
    assert!(record.set_enrichment_url("https://example.com/v2"));
    assert!(record.set_enrichment_url("https://example.com/v3"));
    assert_eq!(record.generation(), 3);

    release.send(()).unwrap();
    // v2 was superseded before it started, so v3 is the next fetch.
    assert_eq!(started.recv_timeout(WAIT).unwrap(), "https://example.com/v3");
    release.send(()).unwrap();

    assert!(record.wait_ready(WAIT));
    assert_eq!(record.state().payload(), Some("content of https://example.com/v3"));
    assert!(started.try_recv().is_err());

    let stats = directory.scheduler().stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.cancelled, 2);
}

#[test]
fn forced_refresh_replaces_payload() {
    let counter = Arc::new(AtomicUsize::new(0));
    let fetch_counter = Arc::clone(&counter);
    let fetcher = fetcher_fn(move |_: &Url| {
        let n = fetch_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("revision {n}"))
    });
    let directory = Directory::new(DirectoryConfig::default(), fetcher);
    directory.load(vec![row([("Name", "TCS"), ("Url", "https://example.com/tcs")])]);

    let record = directory.get("tcs").unwrap();
    assert!(record.wait_ready(WAIT));
    assert_eq!(record.get("content", ""), "revision 1");

    assert_eq!(record.schedule_enrichment(), Some(2));
    assert!(record.wait_ready(WAIT));
    assert_eq!(record.get("content", ""), "revision 2");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn failed_enrichment_is_not_retried_on_lookup() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch_calls = Arc::clone(&calls);
    let fetcher = fetcher_fn(move |url: &Url| {
        fetch_calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Http {
            status: 502,
            url: url.to_string(),
        })
    });
    let directory = Directory::new(DirectoryConfig::default(), fetcher);
    directory.load(vec![row([("Name", "Wipro"), ("URL", "https://example.com/w")])]);

    for _ in 0..3 {
        let record = directory.find_matches("wipro", 1).pop().unwrap();
        assert!(record.wait_ready(WAIT));
        assert_eq!(record.state().status(), EnrichmentStatus::Failed);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn snapshot_is_bounded_when_fetch_hangs() {
    let record_config = RecordConfig {
        snapshot_timeout: Duration::from_millis(100),
        ..RecordConfig::default()
    };
    let (directory, release, started) = gated_directory(record_config);
    directory.load(vec![row([("Name", "Infosys"), ("URL", "https://example.com/a")])]);
    started.recv_timeout(WAIT).unwrap();

    let record = directory.get("infosys").unwrap();
    let begin = Instant::now();
    let text = record.render();
    assert!(begin.elapsed() < WAIT);
    assert_eq!(text, "Name: Infosys\nURL: https://example.com/a");

    release.send(()).unwrap();
}

#[test]
fn shutdown_without_drain_releases_waiters() {
    let (directory, release, started) = gated_directory(RecordConfig::default());
    directory.load(vec![
        row([("Name", "Infosys"), ("URL", "https://example.com/a")]),
        row([("Name", "Infotech"), ("URL", "https://example.com/b")]),
    ]);
    started.recv_timeout(WAIT).unwrap();

    directory.shutdown(false);
    release.send(()).unwrap();

    for record in directory.find_matches("info", 5) {
        assert!(record.wait_ready(WAIT));
        assert_eq!(record.state().error(), Some(&EnrichmentError::Cancelled));
    }

    // New attempts after shutdown fail fast instead of hanging.
    let record = directory.get("infosys").unwrap();
    assert_eq!(record.schedule_enrichment(), Some(2));
    assert!(record.wait_ready(Duration::ZERO));
    assert!(matches!(
        record.state().error(),
        Some(EnrichmentError::Rejected { .. })
    ));
}

#[test]
fn panicking_fetcher_fails_record_and_pool_survives() {
    let fetcher = fetcher_fn(|url: &Url| {
        if url.path() == "/panic" {
            panic!("headless browser crashed");
        }
        Ok("ok".to_string())
    });
    let config = DirectoryConfig {
        scheduler: SchedulerConfig { workers: 1 },
        ..DirectoryConfig::default()
    };
    let directory = Directory::new(config, fetcher);
    directory.load(vec![
        row([("Name", "Alpha"), ("URL", "https://example.com/panic")]),
        row([("Name", "Beta"), ("URL", "https://example.com/fine")]),
    ]);

    let alpha = directory.get("alpha").unwrap();
    let beta = directory.get("beta").unwrap();
    assert!(alpha.wait_ready(WAIT));
    assert!(beta.wait_ready(WAIT));

    let state = alpha.state();
    let Some(EnrichmentError::Panicked { message }) = state.error() else {
        panic!("expected Panicked, got {state:?}");
    };
    assert!(message.contains("headless browser crashed"));
    assert_eq!(beta.get("content", ""), "ok");
}

#[test]
fn directories_can_share_one_scheduler() {
    let scheduler = Arc::new(EnrichmentScheduler::new(
        SchedulerConfig::default(),
        fetcher_fn(|url: &Url| Ok(url.path().to_string())),
    ));
    let nse = Directory::with_scheduler(DirectoryConfig::default(), Arc::clone(&scheduler));
    let bse = Directory::with_scheduler(DirectoryConfig::default(), Arc::clone(&scheduler));

    nse.load(vec![row([("Name", "Infosys"), ("URL", "https://nse.example.com/infy")])]);
    bse.load(vec![row([("Name", "Infosys"), ("URL", "https://bse.example.com/500209")])]);

    let a = nse.get("infosys").unwrap();
    let b = bse.get("infosys").unwrap();
    assert!(a.wait_ready(WAIT));
    assert!(b.wait_ready(WAIT));
    assert_eq!(a.get("content", ""), "/infy");
    assert_eq!(b.get("content", ""), "/500209");

    scheduler.shutdown(true);
    assert_eq!(scheduler.stats().completed, 2);
}

#[test]
fn many_records_enrich_concurrently() {
    let fetcher = fetcher_fn(|url: &Url| {
        std::thread::sleep(Duration::from_millis(5));
        Ok(url.path().trim_start_matches('/').to_string())
    });
    let directory = Directory::new(DirectoryConfig::default(), fetcher);
    let rows = (0..64).map(|i| row([("Name", format!("stock{i:02}")), ("URL", format!("https://example.com/{i}"))]));
    assert_eq!(directory.load(rows), 64);

    let records = directory.find_matches("stock", 100);
    assert_eq!(records.len(), 64);
    for record in &records {
        assert!(record.wait_ready(WAIT));
        let name = record.get("Name", "");
        let expected = name.trim_start_matches("stock").trim_start_matches('0');
        let expected = if expected.is_empty() { "0" } else { expected };
        assert_eq!(record.get("content", ""), expected);
    }

    directory.shutdown(true);
    let stats = directory.scheduler().stats();
    assert_eq!(stats.completed, 64);
    assert_eq!(stats.failed, 0);
}

#[test]
fn large_load_queues_every_record_for_enrichment() {
    let fetcher = fetcher_fn(|url: &Url| {
        std::thread::sleep(Duration::from_millis(1));
        Ok(url.path().to_string())
    });
    let directory = Directory::new(DirectoryConfig::default(), fetcher);
    let rows = (0..3000).map(|i| row([("Name", format!("listing{i:04}")), ("URL", format!("https://example.com/{i}"))]));
    assert_eq!(directory.load(rows), 3000);

    let records = directory.find_matches("listing", 3000);
    assert_eq!(records.len(), 3000);
    for record in &records {
        assert!(record.wait_ready(Duration::from_secs(30)));
        let state = record.state();
        assert!(state.error().is_none(), "{} ended {state:?}", record.get("Name", ""));
        assert_eq!(state.status(), EnrichmentStatus::Ready);
    }
    assert_eq!(directory.scheduler().stats().rejected, 0);
}

#[test]
fn dropping_directory_does_not_wait_for_hung_fetch() {
    let (directory, release, started) = gated_directory(RecordConfig::default());
    directory.load(vec![row([("Name", "Infosys"), ("URL", "https://example.com/a")])]);
    started.recv_timeout(WAIT).unwrap();

    let begin = Instant::now();
    drop(directory);
    assert!(begin.elapsed() < Duration::from_secs(1), "drop took {:?}", begin.elapsed());

    // Unblock the detached worker so it can exit.
    release.send(()).unwrap();
}
