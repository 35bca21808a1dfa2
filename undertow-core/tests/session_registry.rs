//! Integration tests for the session registry.
//!
//! Every test drives the public registry API against the in-memory engine and
//! checks both the registry's view and what the engine was asked to do.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use undertow_core::config::{SessionConfig, UndertowConfig};
use undertow_core::engine::{FilePriority, InfoHash, MemoryEngine, MemoryTransfer};
use undertow_core::magnet::magnet_uri;
use undertow_core::session::{SessionError, SessionRegistry};
use undertow_core::subtitle::SubtitleSource;

const SRT: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello\n";
const MIB: u64 = 1024 * 1024;

fn registry_for(engine: &MemoryEngine, data_dir: &Path) -> Arc<SessionRegistry> {
    let config = SessionConfig {
        data_dir: data_dir.to_path_buf(),
        ..UndertowConfig::for_testing().session
    };
    Arc::new(SessionRegistry::new(Arc::new(engine.clone()), config))
}

fn movie_transfer() -> MemoryTransfer {
    MemoryTransfer::new("Movie")
        .with_file("Movie/Movie.mkv", vec![7u8; 4096])
        .with_file("Movie/Movie.en.srt", SRT)
        .with_file("Movie/extras/trailer.mp4", vec![1u8; 64])
        .with_file("Subs/other.srt", SRT)
}

fn subtitle_names(subtitles: &[undertow_core::subtitle::Subtitle]) -> Vec<&str> {
    subtitles.iter().map(|subtitle| subtitle.name.as_str()).collect()
}

#[tokio::test]
async fn test_add_classifies_files_without_selection() {
    let engine = MemoryEngine::new();
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());

    let session = registry.add_descriptor(&transfer.magnet()).await.unwrap();

    assert_eq!(session.info_hash(), info_hash);
    assert_eq!(session.name(), "Movie");
    let flags: Vec<(bool, bool)> = session
        .files()
        .iter()
        .map(|file| (file.is_video, file.is_subtitle))
        .collect();
    assert_eq!(
        flags,
        vec![(true, false), (false, true), (true, false), (false, true)]
    );
    assert!(session.selected().await.is_none());
    assert_eq!(session.snapshot().await.selected_file, -1);
    assert_eq!(registry.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_converge_on_one_session() {
    let engine = MemoryEngine::new();
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let magnet = transfer.magnet();
            tokio::spawn(async move { registry.add_descriptor(&magnet).await })
        })
        .collect();

    let sessions: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(registry.len(), 1);
    assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));

    // Every handle except the adopted one was given back.
    let stats = engine.stats();
    assert_eq!(stats.adds(info_hash), 8);
    assert_eq!(stats.releases(info_hash), 7);
}

#[tokio::test(start_paused = true)]
async fn test_metadata_timeout_releases_handle() {
    let engine = MemoryEngine::new();
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    let ghost = InfoHash::new([7; 20]);

    let err = registry
        .add_descriptor(&magnet_uri(ghost, "ghost"))
        .await
        .unwrap_err();

    match err {
        SessionError::MetadataTimeout { info_hash, waited } => {
            assert_eq!(info_hash, ghost);
            assert_eq!(waited, Duration::from_secs(5));
        }
        other => panic!("expected MetadataTimeout, got {other:?}"),
    }
    assert!(registry.is_empty());
    assert_eq!(engine.stats().releases(ghost), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_add_releases_handle() {
    let engine = MemoryEngine::new();
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    let ghost = InfoHash::new([9; 20]);
    let magnet = magnet_uri(ghost, "ghost");

    let outcome =
        tokio::time::timeout(Duration::from_secs(1), registry.add_descriptor(&magnet)).await;

    assert!(outcome.is_err());
    assert!(registry.is_empty());
    assert_eq!(engine.stats().releases(ghost), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_metadata_within_timeout_succeeds() {
    let engine = MemoryEngine::with_options(Duration::from_secs(3), None);
    let transfer = movie_transfer();
    engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());

    let session = registry.add_descriptor(&transfer.magnet()).await.unwrap();
    assert_eq!(session.files().len(), 4);
    assert_eq!(engine.stats().releases(session.info_hash()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_add_that_loses_insert_race_adopts_winner() {
    let engine = MemoryEngine::with_options(Duration::from_secs(3), None);
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    let magnet = transfer.magnet();

    // Both calls pass the existence check before either has metadata.
    let (first, second) = tokio::join!(
        registry.add_descriptor(&magnet),
        registry.add_descriptor(&magnet)
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);
    let stats = engine.stats();
    assert_eq!(stats.adds(info_hash), 2);
    assert_eq!(stats.releases(info_hash), 1);
}

#[tokio::test]
async fn test_invalid_descriptor_is_engine_error() {
    let engine = MemoryEngine::new();
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());

    let err = registry.add_descriptor("http://example.com").await.unwrap_err();
    assert!(matches!(err, SessionError::Engine(_)));
}

#[tokio::test]
async fn test_select_file_sets_priorities_and_subtitles() {
    let engine = MemoryEngine::new();
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();

    let session = registry.select_file(info_hash, 0).await.unwrap();

    assert_eq!(engine.priority(info_hash, 0), Some(FilePriority::Normal));
    assert_eq!(engine.priority(info_hash, 2), Some(FilePriority::None));
    assert_eq!(engine.priority(info_hash, 1), Some(FilePriority::Immediate));
    assert_eq!(engine.priority(info_hash, 3), Some(FilePriority::Immediate));

    let subtitles = session.subtitles().await;
    assert_eq!(subtitle_names(&subtitles), vec!["Movie.en.srt", "other.srt"]);
    assert_eq!(
        subtitles[0].source,
        SubtitleSource::Native { file_index: 1 }
    );
    assert_eq!(
        &subtitles[0].content[..],
        b"WEBVTT\n\n00:00:01.000 --> 00:00:02.500\nHello\n"
    );
    assert_eq!(session.snapshot().await.selected_file, 0);
}

#[tokio::test]
async fn test_matched_subtitles_come_first() {
    let engine = MemoryEngine::new();
    let transfer = MemoryTransfer::new("Order")
        .with_file("Elsewhere/zz.srt", SRT)
        .with_file("Show/Episode.mkv", vec![0u8; 16])
        .with_file("Show/Episode.vtt", "WEBVTT\n\n")
        .with_file("Misc/aa.srt", SRT);
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();

    let session = registry.select_file(info_hash, 1).await.unwrap();

    let order: Vec<i64> = session
        .subtitles()
        .await
        .iter()
        .map(|subtitle| subtitle.source.wire_index())
        .collect();
    assert_eq!(order, vec![2, 0, 3]);
}

#[tokio::test]
async fn test_out_of_range_selection_keeps_state() {
    let engine = MemoryEngine::new();
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();
    registry.select_file(info_hash, 0).await.unwrap();

    for index in [-1, 4, 100] {
        let err = registry.select_file(info_hash, index).await.unwrap_err();
        assert!(
            matches!(err, SessionError::OutOfRange { index: i, file_count: 4 } if i == index),
            "unexpected error for {index}: {err:?}"
        );
    }

    let session = registry.lookup(info_hash).unwrap();
    assert_eq!(session.selected().await.map(|file| file.index), Some(0));
    assert_eq!(session.subtitles().await.len(), 2);
}

#[tokio::test]
async fn test_reselection_rebuilds_subtitles() {
    let engine = MemoryEngine::new();
    let transfer = MemoryTransfer::new("Pair")
        .with_file("A/a.mkv", vec![0u8; 16])
        .with_file("A/a.srt", SRT)
        .with_file("B/b.mkv", vec![0u8; 16])
        .with_file("B/b.srt", SRT);
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();

    let session = registry.select_file(info_hash, 0).await.unwrap();
    assert_eq!(subtitle_names(&session.subtitles().await), vec!["a.srt", "b.srt"]);
    registry
        .attach_subtitle(info_hash, "upload.vtt", b"WEBVTT\n\n")
        .await
        .unwrap();
    assert_eq!(session.subtitles().await.len(), 3);

    registry.select_file(info_hash, 2).await.unwrap();
    assert_eq!(subtitle_names(&session.subtitles().await), vec!["b.srt", "a.srt"]);
    assert_eq!(engine.priority(info_hash, 0), Some(FilePriority::None));
    assert_eq!(engine.priority(info_hash, 2), Some(FilePriority::Normal));
}

#[tokio::test]
async fn test_unreadable_subtitle_is_skipped() {
    let engine = MemoryEngine::new();
    let transfer = MemoryTransfer::new("Broken")
        .with_file("Show/ep.mkv", vec![0u8; 16])
        .with_file("Show/bad.srt", SRT)
        .with_file("Show/ep.srt", SRT);
    let info_hash = engine.register(transfer.clone());
    engine.fail_reads(info_hash, "Show/bad.srt");
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();

    let session = registry.select_file(info_hash, 0).await.unwrap();

    assert_eq!(subtitle_names(&session.subtitles().await), vec!["ep.srt"]);
}

#[tokio::test]
async fn test_stream_reader_requires_selection() {
    let engine = MemoryEngine::new();
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();

    let err = registry.stream_reader(info_hash).await.err().unwrap();
    assert!(matches!(err, SessionError::NoSelection { .. }));

    let err = registry
        .stream_reader(InfoHash::new([1; 20]))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::NotFound { .. }));
}

#[tokio::test]
async fn test_stream_reader_is_configured_for_playback() {
    let engine = MemoryEngine::new();
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();
    registry.select_file(info_hash, 0).await.unwrap();

    let mut stream = registry.stream_reader(info_hash).await.unwrap();
    assert_eq!(stream.file.path, "Movie/Movie.mkv");
    assert_eq!(stream.readahead, 16 * MIB);

    let mut content = Vec::new();
    stream.reader.read_to_end(&mut content).await.unwrap();
    assert_eq!(content, vec![7u8; 4096]);

    let record = engine
        .readers()
        .into_iter()
        .find(|record| record.path == "Movie/Movie.mkv")
        .unwrap();
    assert_eq!(record.readahead, Some(16 * MIB));
    assert!(record.responsive);
}

#[tokio::test]
async fn test_large_file_gets_wide_readahead() {
    let engine = MemoryEngine::new();
    let transfer = MemoryTransfer::new("Huge").with_sized_file("Huge/huge.mkv", 3 * 1024 * MIB);
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();
    registry.select_file(info_hash, 0).await.unwrap();

    let stream = registry.stream_reader(info_hash).await.unwrap();
    assert_eq!(stream.readahead, 64 * MIB);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let engine = MemoryEngine::new();
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    let missing = InfoHash::new([3; 20]);

    assert!(matches!(
        registry.lookup(missing),
        Err(SessionError::NotFound { info_hash }) if info_hash == missing
    ));
    assert!(matches!(
        registry.select_file(missing, 0).await,
        Err(SessionError::NotFound { .. })
    ));
    assert!(matches!(
        registry.attach_subtitle(missing, "x.srt", b"").await,
        Err(SessionError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_attached_subtitles_get_negative_indices() {
    let engine = MemoryEngine::new();
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();

    let first = registry
        .attach_subtitle(info_hash, "Movie.de.srt", SRT.as_bytes())
        .await
        .unwrap();
    let second = registry
        .attach_subtitle(info_hash, "Movie.fr.vtt", b"WEBVTT\n\nfr\n")
        .await
        .unwrap();

    assert_eq!(first.source.wire_index(), -1);
    assert_eq!(first.name, "Movie.de.vtt");
    assert!(first.content.starts_with(b"WEBVTT\n\n"));
    assert_eq!(second.source.wire_index(), -2);
    assert_eq!(second.name, "Movie.fr.vtt");

    let content = registry.subtitle_content(info_hash, -2).await.unwrap();
    assert_eq!(&content[..], b"WEBVTT\n\nfr\n");
    assert!(matches!(
        registry.subtitle_content(info_hash, -3).await,
        Err(SessionError::SubtitleNotFound { index: -3, .. })
    ));
}

#[tokio::test]
async fn test_external_sequence_survives_reselection() {
    let engine = MemoryEngine::new();
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();

    registry.attach_subtitle(info_hash, "one.vtt", b"WEBVTT\n\n").await.unwrap();
    registry.select_file(info_hash, 0).await.unwrap();
    let next = registry.attach_subtitle(info_hash, "two.vtt", b"WEBVTT\n\n").await.unwrap();

    assert_eq!(next.source, SubtitleSource::External { sequence: 2 });
    assert!(registry.subtitle_content(info_hash, -1).await.is_err());
    assert!(registry.subtitle_content(info_hash, 1).await.is_ok());
}

#[tokio::test]
async fn test_remove_deletes_session_directory() {
    let dir = tempfile::tempdir().unwrap();
    let engine = MemoryEngine::with_options(Duration::ZERO, Some(dir.path().to_path_buf()));
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();

    let session_dir = dir.path().join(info_hash.to_string());
    assert!(session_dir.join("Movie/Movie.mkv").exists());

    assert!(registry.remove(info_hash).await.unwrap());
    assert!(!session_dir.exists());
    assert!(registry.is_empty());
    assert_eq!(engine.stats().releases(info_hash), 1);

    assert!(!registry.remove(info_hash).await.unwrap());
    assert_eq!(engine.stats().releases(info_hash), 1);
}

#[tokio::test]
async fn test_readd_during_remove_keeps_new_session_data() {
    let dir = tempfile::tempdir().unwrap();
    let engine = MemoryEngine::with_options(Duration::ZERO, Some(dir.path().to_path_buf()));
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();

    let magnet = transfer.magnet();
    let (removed, readded) = tokio::join!(
        registry.remove(info_hash),
        registry.add_descriptor(&magnet)
    );

    assert!(removed.unwrap());
    assert_eq!(readded.unwrap().info_hash(), info_hash);
    assert_eq!(registry.len(), 1);
    let movie = dir.path().join(info_hash.to_string()).join("Movie/Movie.mkv");
    assert_eq!(std::fs::read(movie).unwrap().len(), 4096);
}

#[tokio::test]
async fn test_remove_tolerates_missing_directory() {
    let engine = MemoryEngine::new();
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, &dir.path().join("never-created"));
    registry.add_descriptor(&transfer.magnet()).await.unwrap();

    assert!(registry.remove(info_hash).await.unwrap());
}

#[tokio::test]
async fn test_remove_all_empties_data_directory() {
    let dir = tempfile::tempdir().unwrap();
    let engine = MemoryEngine::with_options(Duration::ZERO, Some(dir.path().to_path_buf()));
    let first = movie_transfer();
    let second = MemoryTransfer::new("Other").with_file("clip.mp4", vec![2u8; 32]);
    let first_hash = engine.register(first.clone());
    let second_hash = engine.register(second.clone());
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&first.magnet()).await.unwrap();
    registry.add_descriptor(&second.magnet()).await.unwrap();
    std::fs::write(dir.path().join("stray.part"), b"leftover").unwrap();

    registry.remove_all().await.unwrap();

    assert!(registry.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    let stats = engine.stats();
    assert_eq!(stats.releases(first_hash), 1);
    assert_eq!(stats.releases(second_hash), 1);
}

#[tokio::test]
async fn test_remove_all_without_data_directory() {
    let engine = MemoryEngine::new();
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, &dir.path().join("missing"));

    registry.remove_all().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sweep_removes_only_idle_sessions() {
    let engine = MemoryEngine::new();
    let idle = movie_transfer();
    let busy = MemoryTransfer::new("Busy").with_file("busy.mkv", vec![0u8; 8]);
    let idle_hash = engine.register(idle.clone());
    let busy_hash = engine.register(busy.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&idle.magnet()).await.unwrap();
    registry.add_descriptor(&busy.magnet()).await.unwrap();

    tokio::time::advance(Duration::from_secs(30 * 60)).await;
    registry.lookup(busy_hash).unwrap();
    tokio::time::advance(Duration::from_secs(31 * 60)).await;

    let removed = registry.sweep(Duration::from_secs(60 * 60)).await;

    assert_eq!(removed, vec![idle_hash]);
    assert!(registry.lookup(busy_hash).is_ok());
    assert_eq!(engine.stats().releases(idle_hash), 1);
    assert_eq!(engine.stats().releases(busy_hash), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_loop_runs_until_cancelled() {
    let engine = MemoryEngine::new();
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    registry.add_descriptor(&transfer.magnet()).await.unwrap();

    let cancel = CancellationToken::new();
    let sweeper = registry.spawn_sweeper(cancel.clone());

    // Sweeps every minute with a one hour max age.
    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    assert_eq!(registry.len(), 1);

    tokio::time::sleep(Duration::from_secs(40 * 60)).await;
    assert!(registry.is_empty());

    cancel.cancel();
    sweeper.await.unwrap();
    assert_eq!(engine.stats().releases(info_hash), 1);
}

#[tokio::test]
async fn test_snapshot_and_search_query() {
    let engine = MemoryEngine::new();
    let transfer = movie_transfer();
    let info_hash = engine.register(transfer.clone());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_for(&engine, dir.path());
    let session = registry.add_descriptor(&transfer.magnet()).await.unwrap();

    assert_eq!(session.search_query().await, "Movie");
    registry.select_file(info_hash, 2).await.unwrap();
    assert_eq!(session.search_query().await, "trailer");

    let json = serde_json::to_value(session.snapshot().await).unwrap();
    assert_eq!(json["id"], info_hash.to_string());
    assert_eq!(json["selectedFile"], 2);
    assert_eq!(json["files"][1]["isSubtitle"], true);
    assert_eq!(json["subtitles"][0]["name"], "Movie.en.srt");
    assert_eq!(json["subtitles"][0]["index"], 1);
    assert!(json["subtitles"][0].get("content").is_none());
}
