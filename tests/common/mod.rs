//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which builds a full [`AppContext`] with fast
//! timings and starts Axum on a random port, a zip builder for test
//! packages, and [`CourseSurface`], a scripted rendering context that plays
//! the role of a browser running a course against the server.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use zip::write::SimpleFileOptions;

use scormcast::config::Config;
use scormcast::events::EventBus;
use scormcast::navigation::{DocumentSnapshot, ElementRef, ElementSnapshot, Key};
use scormcast::navigation::model::{MediaSnapshot, Rect};
use scormcast::player::{Player, SharedPlayback};
use scormcast::runtime::ShimRegistry;
use scormcast::server::{spawn_server, AppContext, ServerHandle};
use scormcast::surface::{RenderSurface, SurfaceEvent, SurfaceFrame, SurfaceResult};
use scormcast::vfs::VfsHandle;
use scormcast_av::Viewport;

/// Node id of the forward button in every [`CourseSurface`] page.
pub const NEXT_BUTTON: u32 = 7;

/// Node id of the paused video in every [`CourseSurface`] page.
pub const VIDEO: u32 = 9;

/// Build a zip archive from `(path, contents)` pairs.
pub fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (path, contents) in files {
        writer.start_file(*path, options).expect("start zip entry");
        writer.write_all(contents.as_bytes()).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Manifest of the two-item course built by [`two_item_course`].
pub const TWO_ITEM_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest identifier="COURSE" version="1.0"
          xmlns="http://www.imsproject.org/xsd/imscp_rootv1p1p2"
          xmlns:adlcp="http://www.adlnet.org/xsd/adlcp_rootv1p2">
  <metadata>
    <schema>ADL SCORM</schema>
    <schemaversion>1.2</schemaversion>
  </metadata>
  <organizations default="ORG">
    <organization identifier="ORG">
      <title>Safety Basics</title>
      <item identifier="ITEM-1" identifierref="RES-1">
        <title>Welcome</title>
      </item>
      <item identifier="ITEM-2" identifierref="RES-2">
        <title>Lesson</title>
      </item>
    </organization>
  </organizations>
  <resources>
    <resource identifier="RES-1" type="webcontent" adlcp:scormtype="sco" href="module1/launcher.html">
      <file href="module1/launcher.html"/>
    </resource>
    <resource identifier="RES-2" type="webcontent" adlcp:scormtype="sco" href="module2/lesson.html">
      <file href="module2/lesson.html"/>
    </resource>
  </resources>
</manifest>
"#;

/// Two items: the first declares a launcher page next to the real
/// `index.html`, the second points straight at `lesson.html`.
pub fn two_item_course() -> Vec<u8> {
    build_zip(&[
        ("imsmanifest.xml", TWO_ITEM_MANIFEST),
        (
            "module1/launcher.html",
            "<html><body>Launching...</body></html>",
        ),
        (
            "module1/index.html",
            r#"<html><head><link rel="stylesheet" href="style.css"></head><body><button>Next</button></body></html>"#,
        ),
        ("module1/style.css", "button { color: teal; }"),
        ("module1/img/logo.png", "not really a png"),
        (
            "module2/lesson.html",
            "<html><body><video src=\"clip.mp4\"></video><button>Next</button></body></html>",
        ),
    ])
}

/// Config with timings short enough for tests.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.port = 0;
    config.vfs.grace_delay_ms = 0;
    config.navigation.interval_ms = 40;
    config.navigation.load_delay_ms = 10;
    config.navigation.mutation_debounce_ms = 10;
    config.navigation.cooldown_ms = 1;
    config.capture.fps = 20;
    config.capture.chunk_interval_ms = 100;
    config.player.max_duration_secs = 20;
    config
}

/// Application context plus a server bound to a random local port.
pub struct TestHarness {
    pub ctx: AppContext,
    pub server: ServerHandle,
}

impl TestHarness {
    /// Start a harness with [`test_config`].
    pub async fn start() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let ctx = AppContext {
            config: Arc::new(config),
            vfs: VfsHandle::spawn(),
            shims: ShimRegistry::new(),
            events: EventBus::new(),
            playback: SharedPlayback::default(),
        };
        let server = spawn_server(ctx.clone(), "127.0.0.1", 0)
            .await
            .expect("failed to start server");

        Self { ctx, server }
    }

    pub fn base_url(&self) -> String {
        self.server.base_url()
    }

    /// A player sharing this harness's context.
    pub fn player(&self) -> Player {
        Player::new(
            Arc::clone(&self.ctx.config),
            self.ctx.vfs.clone(),
            Arc::clone(&self.ctx.shims),
            self.ctx.events.clone(),
            Arc::clone(&self.ctx.playback),
        )
    }
}

/// Counters of what the scripted surface was asked to do.
#[derive(Debug, Default, Clone)]
pub struct CourseLog {
    /// Content URLs the surface loaded, with the status the server answered.
    pub loaded: Vec<(String, u16)>,
    pub clicks: u32,
    pub media_started: u32,
    pub key_presses: u32,
}

/// A rendering context running a scripted course.
///
/// Navigating to the player page fetches the entry document from the server.
/// Each page shows a "Next" button and a paused video inside the content
/// frame; clicking the button reports the item complete through the runtime
/// endpoint, the way content talks to the bridge.
pub struct CourseSurface {
    client: reqwest::Client,
    base_url: String,
    current: Mutex<Option<String>>,
    log: Mutex<CourseLog>,
    captures: AtomicU32,
    events: broadcast::Sender<SurfaceEvent>,
    /// Whether clicking "Next" reports completion.
    completes: bool,
}

impl CourseSurface {
    pub fn new(base_url: &str) -> Arc<Self> {
        Self::build(base_url, true)
    }

    /// A course whose button never reports completion.
    pub fn stuck(base_url: &str) -> Arc<Self> {
        Self::build(base_url, false)
    }

    fn build(base_url: &str, completes: bool) -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            current: Mutex::new(None),
            log: Mutex::new(CourseLog::default()),
            captures: AtomicU32::new(0),
            events: broadcast::channel(64).0,
            completes,
        })
    }

    pub fn log(&self) -> CourseLog {
        self.log.lock().clone()
    }

    pub fn captures(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn emit(&self, event: SurfaceEvent) {
        let _ = self.events.send(event);
    }

    async fn runtime(&self, method: &str, args: &[&str]) {
        let url = format!("{}/runtime/12/{}", self.base_url, method);
        let body = serde_json::json!({ "args": args });
        let _ = self.client.post(url).json(&body).send().await;
    }
}

/// Value of the `src` query parameter of a player page URL.
pub fn src_param(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("src="))
        .and_then(|v| urlencoding::decode(v).ok())
        .map(|v| v.into_owned())
}

#[async_trait]
impl RenderSurface for CourseSurface {
    async fn navigate(&self, url: &str) -> SurfaceResult<()> {
        if let Some(src) = src_param(url) {
            let status = match self
                .client
                .get(format!("{}{}", self.base_url, src))
                .send()
                .await
            {
                Ok(resp) => resp.status().as_u16(),
                Err(_) => 0,
            };
            self.log.lock().loaded.push((src.clone(), status));
            *self.current.lock() = Some(src);
        }
        self.emit(SurfaceEvent::Loaded {
            frame_id: "root".to_string(),
            root: true,
        });
        Ok(())
    }

    async fn documents(&self) -> SurfaceResult<Vec<DocumentSnapshot>> {
        let Some(src) = self.current.lock().clone() else {
            return Ok(Vec::new());
        };

        let root = DocumentSnapshot {
            doc_id: "0".to_string(),
            url: format!("{}/player/", self.base_url),
            viewport_width: 1280.0,
            viewport_height: 720.0,
            ..Default::default()
        };
        let content = DocumentSnapshot {
            doc_id: "0.0".to_string(),
            url: format!("{}{}", self.base_url, src),
            viewport_width: 1280.0,
            viewport_height: 690.0,
            elements: vec![ElementSnapshot {
                node_id: NEXT_BUTTON,
                tag: "button".to_string(),
                text: "Next".to_string(),
                rect: Rect {
                    x: 1100.0,
                    y: 620.0,
                    width: 120.0,
                    height: 40.0,
                },
                ..Default::default()
            }],
            media: vec![MediaSnapshot {
                node_id: VIDEO,
                paused: true,
                ended: false,
            }],
            ..Default::default()
        };
        Ok(vec![root, content])
    }

    async fn activate(&self, target: &ElementRef) -> SurfaceResult<bool> {
        if target.node_id != NEXT_BUTTON {
            return Ok(false);
        }
        self.log.lock().clicks += 1;
        if self.completes {
            self.runtime("LMSInitialize", &[""]).await;
            self.runtime("LMSSetValue", &["cmi.core.lesson_status", "completed"])
                .await;
            self.runtime("LMSCommit", &[""]).await;
        }
        Ok(true)
    }

    async fn play_media(&self, target: &ElementRef) -> SurfaceResult<bool> {
        if target.node_id != VIDEO {
            return Ok(false);
        }
        self.log.lock().media_started += 1;
        Ok(true)
    }

    async fn press_keys(&self, keys: &[Key]) -> SurfaceResult<()> {
        self.log.lock().key_presses += keys.len() as u32;
        Ok(())
    }

    async fn capture_frame(&self) -> SurfaceResult<SurfaceFrame> {
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        let shade = (n % 200) as u8;
        Ok(SurfaceFrame {
            image: RgbaImage::from_pixel(64, 36, Rgba([shade, 90, 160, 255])),
            viewport: Viewport::new(64, 36),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }
}
