use scormcast_av::{EncodeSettings, ToolPaths};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub vfs: VfsConfig,

    #[serde(default)]
    pub navigation: NavigationConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub encode: EncodeSettings,

    #[serde(default)]
    pub tools: ToolPaths,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub player: PlayerConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port; 0 picks a free port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8787
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VfsConfig {
    /// Time the player waits after (re)initializing the file server before
    /// pointing the browser at it.
    #[serde(default = "default_grace_delay")]
    pub grace_delay_ms: u64,
}

fn default_grace_delay() -> u64 {
    50
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            grace_delay_ms: default_grace_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NavigationConfig {
    /// Fixed interval between attempts while recording.
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Delay of the extra attempt after each document load.
    #[serde(default = "default_load_delay")]
    pub load_delay_ms: u64,

    /// Debounce applied to mutation-triggered attempts.
    #[serde(default = "default_mutation_debounce")]
    pub mutation_debounce_ms: u64,

    /// Window in which the same element is not activated twice.
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,

    /// Additional forward-navigation keywords, matched like the built-in ones.
    #[serde(default)]
    pub extra_keywords: Vec<String>,

    #[serde(default)]
    pub weights: ScoreWeights,
}

fn default_interval() -> u64 {
    2500
}
fn default_load_delay() -> u64 {
    800
}
fn default_mutation_debounce() -> u64 {
    400
}
fn default_cooldown() -> u64 {
    4000
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            load_delay_ms: default_load_delay(),
            mutation_debounce_ms: default_mutation_debounce(),
            cooldown_ms: default_cooldown(),
            extra_keywords: Vec::new(),
            weights: ScoreWeights::default(),
        }
    }
}

/// Weights of the candidate scoring rules.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Added per matched keyword.
    pub keyword: i32,
    /// Added when the visible text is exactly a short keyword.
    pub exact_text: i32,
    /// Added for native buttons and links.
    pub native_control: i32,
    /// Added when the class list looks navigation-related.
    pub nav_class: i32,
    /// Added when the element sits right of the viewport center.
    pub right_of_center: i32,
    /// Added (negative) for disabled elements.
    pub disabled: i32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            keyword: 10,
            exact_text: 15,
            native_control: 3,
            nav_class: 5,
            right_of_center: 2,
            disabled: -100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Snapshot rate.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Interval at which encoded frames are flushed into a chunk.
    #[serde(default = "default_chunk_interval")]
    pub chunk_interval_ms: u64,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_fps() -> u32 {
    scormcast_av::DEFAULT_FRAME_RATE
}
fn default_chunk_interval() -> u64 {
    scormcast_av::DEFAULT_CHUNK_INTERVAL.as_millis() as u64
}
fn default_jpeg_quality() -> u8 {
    scormcast_av::DEFAULT_JPEG_QUALITY
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            chunk_interval_ms: default_chunk_interval(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    /// DevTools endpoint of an already running browser, either the
    /// `ws://` URL of a page target or the `http://host:port` of the browser.
    /// When unset a headless browser is launched.
    #[serde(default)]
    pub devtools_url: Option<String>,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// Bound on browser startup and the initial DevTools handshake.
    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,

    /// Extra command-line switches for a launched browser.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    720
}
fn default_launch_timeout() -> u64 {
    20
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            devtools_url: None,
            headless: true,
            window_width: default_window_width(),
            window_height: default_window_height(),
            launch_timeout_secs: default_launch_timeout(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Upper bound on one recorded session; recording stops when reached.
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
}

fn default_max_duration() -> u64 {
    3600
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: default_max_duration(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Directory recordings are saved to.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}
