//! End-to-end playback: package load, serving, runtime completion,
//! navigation and recording working together.

mod common;

use common::{two_item_course, CourseSurface, TestHarness};
use scormcast::capture::{CaptureSettings, Recorder};
use scormcast::events::PlayerEvent;
use scormcast::player::{run_interactive, run_recording, RecordOptions};
use scormcast::runtime::CompletionStatus;
use scormcast::surface::RenderSurface;
use scormcast_av::{EncodeSettings, Transcoder};
use scormcast_package::ContentPackage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

fn recorder(harness: &TestHarness) -> Recorder {
    Recorder::new(
        CaptureSettings::from(&harness.ctx.config.capture),
        Arc::new(Transcoder::new(None, EncodeSettings::default())),
    )
}

fn options(harness: &TestHarness, dir: &tempfile::TempDir, raw_only: bool) -> RecordOptions {
    RecordOptions {
        base_url: harness.base_url(),
        output_dir: dir.path().to_path_buf(),
        trim_start: None,
        trim_end: None,
        raw_only,
    }
}

fn drain(rx: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn count(events: &[PlayerEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

#[tokio::test]
async fn launcher_entry_resolves_to_sibling_index() {
    let harness = TestHarness::start().await;
    let mut player = harness.player();

    let package = ContentPackage::from_zip(&two_item_course()).unwrap();
    assert_eq!(package.items.len(), 2);
    assert_eq!(package.items[0].id, "ITEM-1");
    assert_eq!(package.items[1].id, "ITEM-2");

    let first = player.load(package).await.unwrap().unwrap();
    assert_eq!(first.index, 0);
    assert_eq!(first.src, "/scorm-content/module1/index.html");

    let resolved = player.package().unwrap().resolve_item(1).unwrap();
    assert_eq!(resolved.path, "module2/lesson.html");
    assert!(!resolved.substituted);

    let state = player.state();
    assert_eq!(state.title.as_deref(), Some("Safety Basics"));
    assert_eq!(state.item_count, 2);
    assert_eq!(state.active_item_title.as_deref(), Some("Welcome"));
    assert_eq!(state.progress_percent, 0);
}

#[tokio::test]
async fn records_whole_course_and_falls_back_to_raw_clip() {
    let harness = TestHarness::start().await;
    let mut events = harness.ctx.events.subscribe();
    let mut player = harness.player();
    let first = player
        .load(ContentPackage::from_zip(&two_item_course()).unwrap())
        .await
        .unwrap()
        .unwrap();

    let course = CourseSurface::new(&harness.base_url());
    let surface: Arc<dyn RenderSurface> = course.clone();
    let mut recorder = recorder(&harness);
    let dir = tempfile::tempdir().unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(15),
        run_recording(
            &mut player,
            first,
            surface,
            &mut recorder,
            &options(&harness, &dir, false),
            CancellationToken::new(),
        ),
    )
    .await
    .expect("recording did not finish")
    .unwrap();

    assert!(report.finished);
    assert_eq!(report.title, "Safety Basics");
    assert_eq!(report.item_count, 2);
    assert_eq!(report.items_completed, 2);
    assert_eq!(report.completion_status, CompletionStatus::Completed);
    assert!(report.raw);
    assert!(report.frames >= 1);
    assert!(report.navigation.activated >= 2);
    assert!(report.artifact.starts_with(dir.path()));
    assert!(std::fs::metadata(&report.artifact).unwrap().len() > 0);

    let log = course.log();
    assert_eq!(
        log.loaded,
        vec![
            ("/scorm-content/module1/index.html".to_string(), 200),
            ("/scorm-content/module2/lesson.html".to_string(), 200),
        ]
    );
    assert!(log.media_started >= 2);

    let events = drain(&mut events);
    assert_eq!(count(&events, "package_loaded"), 1);
    assert_eq!(count(&events, "item_started"), 2);
    assert_eq!(count(&events, "item_completed"), 2);
    assert_eq!(count(&events, "recording_started"), 1);
    assert_eq!(count(&events, "recording_stopped"), 1);
    assert_eq!(count(&events, "raw_fallback"), 1);
    assert_eq!(count(&events, "recording_saved"), 1);
    assert_eq!(count(&events, "playback_completed"), 1);
    assert_eq!(count(&events, "preview_ready"), 0);

    let state = player.state();
    assert!(state.finished);
    assert!(!state.recording_active);
    assert_eq!(state.progress_percent, 100);

    // The runtime is gone once playback finished.
    assert!(!harness.ctx.shims.is_installed());
}

#[tokio::test]
async fn stuck_course_stops_at_maximum_duration() {
    let mut config = common::test_config();
    config.player.max_duration_secs = 1;
    let harness = TestHarness::with_config(config).await;
    let mut player = harness.player();
    let first = player
        .load(ContentPackage::from_zip(&two_item_course()).unwrap())
        .await
        .unwrap()
        .unwrap();

    let course = CourseSurface::stuck(&harness.base_url());
    let mut recorder = recorder(&harness);
    let dir = tempfile::tempdir().unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        run_recording(
            &mut player,
            first,
            course.clone(),
            &mut recorder,
            &options(&harness, &dir, true),
            CancellationToken::new(),
        ),
    )
    .await
    .expect("recording did not stop")
    .unwrap();

    assert!(!report.finished);
    assert_eq!(report.items_completed, 0);
    assert_eq!(report.completion_status, CompletionStatus::Incomplete);
    assert!(report.raw);
    assert!(report.artifact.to_string_lossy().ends_with(".mjpeg"));
    assert!(course.log().clicks >= 1);
    assert_eq!(course.log().loaded.len(), 1);
}

#[tokio::test]
async fn cancelled_recording_is_still_saved() {
    let harness = TestHarness::start().await;
    let mut player = harness.player();
    let first = player
        .load(ContentPackage::from_zip(&two_item_course()).unwrap())
        .await
        .unwrap()
        .unwrap();

    let course = CourseSurface::stuck(&harness.base_url());
    let mut recorder = recorder(&harness);
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let stop = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stop.cancel();
    });

    let report = run_recording(
        &mut player,
        first,
        course,
        &mut recorder,
        &options(&harness, &dir, true),
        cancel,
    )
    .await
    .unwrap();

    assert!(!report.finished);
    assert!(report.artifact.exists());
}

#[tokio::test]
async fn interactive_playback_follows_runtime_reports() {
    let harness = TestHarness::start().await;
    let base = harness.base_url();
    let mut player = harness.player();
    player
        .load(ContentPackage::from_zip(&two_item_course()).unwrap())
        .await
        .unwrap()
        .unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let task = tokio::spawn(async move {
        run_interactive(&mut player, stop).await.unwrap();
        player
    });

    let client = reqwest::Client::new();
    let complete = |generation: &'static str| {
        let client = client.clone();
        let base = base.clone();
        async move {
            client
                .post(format!("{base}/runtime/{generation}/LMSSetValue"))
                .json(&serde_json::json!({ "args": ["cmi.core.lesson_status", "completed"] }))
                .send()
                .await
                .unwrap()
                .status()
        }
    };
    let state = || {
        let client = client.clone();
        let base = base.clone();
        async move {
            client
                .get(format!("{base}/player/state"))
                .send()
                .await
                .unwrap()
                .json::<serde_json::Value>()
                .await
                .unwrap()
        }
    };

    assert_eq!(complete("12").await, 200);
    let mut advanced = false;
    for _ in 0..50 {
        if state().await["active_item_index"] == 1 {
            advanced = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(advanced, "player did not advance to the second item");

    let current = state().await;
    assert_eq!(current["current_entry"], "/scorm-content/module2/lesson.html");
    assert_eq!(current["progress_percent"], 50);

    assert_eq!(complete("12").await, 200);
    let mut finished = false;
    for _ in 0..50 {
        if state().await["finished"] == true {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(finished, "player did not finish");

    // Finishing uninstalls the runtime.
    assert_eq!(complete("12").await, 410);

    cancel.cancel();
    let mut player = task.await.unwrap();
    player.unload().await;
    assert_eq!(player.state().item_count, 0);
}
