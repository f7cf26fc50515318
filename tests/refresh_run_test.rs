mod common;

use anyhow::Result;
use chrono::NaiveDate;
use common::*;
use duende_scraper::app::services::Services;
use duende_scraper::domain::ArtistStatus;
use duende_scraper::infra::memory_store::InMemoryStore;
use duende_scraper::pipeline::dedup::EventDeduplicator;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()
}

#[tokio::test]
async fn same_event_on_two_pages_is_stored_once() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["Antonio Reyes"]).await;

    let event = candidate("Antonio Reyes", "2030-05-01", "Teatro Villamarta");
    let services = services(
        store.clone(),
        FakeSearch::default().with("Antonio Reyes", &["https://a.example/1", "https://b.example/2"]),
        FakeFetcher::default()
            .with("https://a.example/1", page("Antonio Reyes en Jerez"))
            .with("https://b.example/2", page("Antonio Reyes, gira 2030")),
        FakeExtractor::default()
            .events("https://a.example/1", vec![event.clone()])
            .events("https://b.example/2", vec![event]),
    );

    let summary = services.refresh.run_as_of(today()).await?;
    assert_eq!(summary.artists_processed, 1);
    assert_eq!(summary.urls_found, 2);
    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.ingest.folded, 1);
    assert_eq!(summary.ingest.inserted, 1);

    let events = store.all_events()?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source_url.as_deref(), Some("https://a.example/1"));
    assert_eq!(events[0].event_key.as_str(), "antonio reyes|2030-05-01|teatro villamarta");

    let again = services.refresh.run_as_of(today()).await?;
    assert_eq!(again.ingest.inserted, 0);
    assert_eq!(again.ingest.already_present, 1);
    assert_eq!(store.all_events()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_urls_and_searches_do_not_stop_the_run() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let artists = seed(store.as_ref(), &["Farruquito", "Rocío Márquez"]).await;

    let services = services(
        store.clone(),
        FakeSearch::default()
            .with(
                "Farruquito",
                &["https://ok.example/agenda", "https://slow.example/agenda", "https://bad.example/agenda"],
            )
            .failing_for("Rocío Márquez"),
        FakeFetcher::default()
            .with("https://ok.example/agenda", page("Farruquito agenda"))
            .with("https://bad.example/agenda", page("Farruquito tour")),
        FakeExtractor::default()
            .events("https://ok.example/agenda", vec![candidate("Farruquito", "2030-03-14", "Teatro Real")])
            .malformed("https://bad.example/agenda"),
    );

    let summary = services.refresh.run_as_of(today()).await?;
    assert_eq!(summary.search_errors, 1);
    assert_eq!(summary.urls_found, 3);
    assert_eq!(summary.urls_failed, 2);
    assert_eq!(summary.ingest.inserted, 1);
    assert_eq!(summary.artists_marked, 2);

    let stored = store.all_artists()?;
    for artist in &artists {
        let after = stored.iter().find(|a| a.id == artist.id).unwrap();
        assert!(after.last_processed_at.is_some(), "{} not stamped", artist.name);
    }
    Ok(())
}

#[tokio::test]
async fn past_and_malformed_candidates_are_rejected() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["Estrella Morente"]).await;

    let mut no_venue = candidate("Estrella Morente", "2030-06-01", "x");
    no_venue.venue = None;
    let services = services(
        store.clone(),
        FakeSearch::default().with("Estrella Morente", &["https://e.example/"]),
        FakeFetcher::default().with("https://e.example/", page("Estrella Morente")),
        FakeExtractor::default().events(
            "https://e.example/",
            vec![
                candidate("Estrella Morente", "2029-12-31", "Palau de la Música"),
                candidate("Estrella Morente", "June 1st", "Palau de la Música"),
                no_venue,
                candidate("Estrella Morente", "2030-01-01", "Palau de la Música"),
            ],
        ),
    );

    let summary = services.refresh.run_as_of(today()).await?;
    assert_eq!(summary.ingest.invalid, 3);
    assert_eq!(summary.ingest.inserted, 1);
    assert_eq!(store.all_events()?[0].date, today());
    Ok(())
}

#[tokio::test]
async fn store_failure_fails_the_run_but_artists_are_still_stamped() -> Result<()> {
    let store = Arc::new(FlakyStore::default());
    let artists = seed(&store.inner, &["Tomatito"]).await;
    store.fail_event_writes.store(true, Ordering::SeqCst);

    let services = services(
        store.clone(),
        FakeSearch::default().with("Tomatito", &["https://t.example/"]),
        FakeFetcher::default().with("https://t.example/", page("Tomatito")),
        FakeExtractor::default().events("https://t.example/", vec![candidate("Tomatito", "2030-02-02", "Sala Galileo")]),
    );

    let err = services.refresh.run_as_of(today()).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(*store.stamped.lock().unwrap(), vec![artists[0].id]);
    assert!(store.inner.all_events()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_store_gives_empty_summary() -> Result<()> {
    let search = FakeSearch::default();
    let services = services(
        Arc::new(InMemoryStore::new()),
        search,
        FakeFetcher::default(),
        FakeExtractor::default(),
    );

    let summary = services.refresh.run_as_of(today()).await?;
    assert_eq!(summary.artists_processed, 0);
    assert_eq!(summary.urls_found, 0);
    assert_eq!(summary.ingest.inserted, 0);
    Ok(())
}

#[tokio::test]
async fn rotation_moves_through_the_roster_across_runs() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["A", "B", "C", "D"]).await;
    let services = services(store.clone(), FakeSearch::default(), FakeFetcher::default(), FakeExtractor::default());

    assert_eq!(services.refresh.run_as_of(today()).await?.artists_marked, 3);
    let never = store.all_artists()?.into_iter().filter(|a| a.last_processed_at.is_none()).count();
    assert_eq!(never, 1);

    services.refresh.run_as_of(today()).await?;
    let never = store.all_artists()?.into_iter().filter(|a| a.last_processed_at.is_none()).count();
    assert_eq!(never, 0);
    Ok(())
}

#[tokio::test]
async fn existing_events_are_skipped_and_never_rewritten() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let dedup = EventDeduplicator::new(store.clone());

    let first = dedup
        .ingest_as_of(&[candidate("Miguel Poveda", "2030-04-04", "Liceu")], today())
        .await?;
    assert_eq!(first.inserted, 1);
    let original = store.all_events()?[0].clone();

    let mut updated = candidate("Miguel Poveda", "2030-04-04", "Liceu");
    updated.description = Some("new text".to_string());
    let second = dedup
        .ingest_as_of(&[updated, candidate("Miguel Poveda", "2030-04-05", "Liceu")], today())
        .await?;
    assert_eq!(second.already_present, 1);
    assert_eq!(second.inserted, 1);

    let events = store.all_events()?;
    assert_eq!(events.len(), 2);
    assert_eq!(events.iter().find(|e| e.event_key == original.event_key), Some(&original));
    Ok(())
}

#[tokio::test]
async fn artist_case_differences_collapse_to_one_event() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let dedup = EventDeduplicator::new(store.clone());

    let report = dedup
        .ingest_as_of(
            &[
                candidate("Antonio Reyes", "2030-05-01", "Teatro Villamarta"),
                candidate("ANTONIO  REYES", "2030-05-01", "teatro villamarta"),
            ],
            today(),
        )
        .await?;
    assert_eq!(report.folded, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(store.all_events()?[0].artist_name, "Antonio Reyes");
    Ok(())
}

#[tokio::test]
async fn empty_candidate_list_touches_nothing() -> Result<()> {
    let store = Arc::new(FlakyStore::default());
    store.fail_event_writes.store(true, Ordering::SeqCst);
    let dedup = EventDeduplicator::new(store.clone());

    // Any store call would fail, so Ok means none was made.
    let report = dedup.ingest_as_of(&[], today()).await?;
    assert_eq!(report.received, 0);
    assert_eq!(report.inserted, 0);
    Ok(())
}

#[tokio::test]
async fn dropped_run_stamps_its_batch_and_leaves_no_tasks_behind() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let artists = seed(store.as_ref(), &["Antonio Reyes"]).await;

    let urls = ["https://a.example/", "https://b.example/", "https://c.example/"];
    let event = candidate("Antonio Reyes", "2030-05-01", "Teatro Villamarta");
    let mut fetcher = FakeFetcher::default();
    let mut extractor = FakeExtractor::default();
    for url in urls {
        fetcher = fetcher.with(url, page("Antonio Reyes"));
        extractor = extractor.events(url, vec![event.clone()]);
    }
    let extractor = Arc::new(extractor.slow(2_000));
    let services = Services::with_adapters(
        &test_config(),
        adapters(
            store.clone(),
            FakeSearch::default().with("Antonio Reyes", &urls),
            fetcher,
            extractor.clone(),
        ),
    );

    let first = tokio::time::timeout(Duration::from_millis(200), services.refresh.run_as_of(today())).await;
    assert!(first.is_err(), "run should still be waiting on the extractor");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stamped = store.all_artists()?;
    assert_eq!(stamped[0].id, artists[0].id);
    assert!(stamped[0].last_processed_at.is_some());
    assert!(store.all_events()?.is_empty());

    extractor.set_delay(0);
    let second = services.refresh.run_as_of(today()).await?;
    assert_eq!(second.urls_found, 3);
    assert_eq!(second.candidates, 3);
    assert_eq!(second.ingest.folded, 2);
    assert_eq!(second.ingest.inserted, 1);
    assert_eq!(store.all_events()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn workers_stop_once_the_queue_is_drained() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["Tomatito"]).await;

    let mut config = test_config();
    config.queue_idle_timeout = Duration::from_secs(30);
    let services = Services::with_adapters(
        &config,
        adapters(
            store.clone(),
            FakeSearch::default().with("Tomatito", &["https://t.example/"]),
            FakeFetcher::default().with("https://t.example/", page("Tomatito")),
            Arc::new(FakeExtractor::default().events(
                "https://t.example/",
                vec![candidate("Tomatito", "2030-02-02", "Sala Galileo")],
            )),
        ),
    );

    let summary = tokio::time::timeout(Duration::from_secs(5), services.refresh.run_as_of(today()))
        .await
        .expect("run should end when the queue is drained, not after the idle timeout")?;
    assert_eq!(summary.ingest.inserted, 1);
    Ok(())
}

#[tokio::test]
async fn other_credited_artists_join_the_roster_for_review() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["Farruquito"]).await;

    let services = services(
        store.clone(),
        FakeSearch::default().with("Farruquito", &["https://f.example/"]),
        FakeFetcher::default().with("https://f.example/", page("Farruquito y familia")),
        FakeExtractor::default().events(
            "https://f.example/",
            vec![
                candidate("FARRUQUITO", "2030-03-01", "Teatro Real"),
                candidate("Pastora Galván", "2030-03-02", "Teatro Real"),
                candidate("pastora galván", "2030-03-03", "Teatro Real"),
            ],
        ),
    );

    let summary = services.refresh.run_as_of(today()).await?;
    assert_eq!(summary.ingest.inserted, 3);
    assert_eq!(summary.artists_added, 1);

    for event in store.all_events()? {
        assert_eq!(event.artist_name, "Farruquito");
    }
    let artists = store.all_artists()?;
    assert_eq!(artists.len(), 2);
    assert_eq!(artists[1].name, "Pastora Galván");
    assert_eq!(artists[1].status, Some(ArtistStatus::PendingReview));
    assert!(artists[1].last_processed_at.is_none());
    Ok(())
}
