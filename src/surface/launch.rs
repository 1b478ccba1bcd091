//! Browser discovery and launch.

use super::cdp::CdpSurface;
use super::{SurfaceError, SurfaceResult};
use crate::config::BrowserConfig;
use parking_lot::Mutex;
use scormcast_av::{ToolRegistry, CHROME};
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

const DEVTOOLS_BANNER: &str = "DevTools listening on ";

/// A browser started for one session. Killed on drop.
pub struct BrowserProcess {
    child: Mutex<Child>,
    devtools_url: String,
    _profile: TempDir,
}

impl BrowserProcess {
    /// Start `chrome` with remote debugging on a free port and wait for its
    /// DevTools endpoint.
    pub async fn launch(chrome: &Path, config: &BrowserConfig) -> SurfaceResult<Self> {
        let profile = tempfile::Builder::new()
            .prefix("scormcast-browser-")
            .tempdir()
            .map_err(|e| SurfaceError::Launch(format!("profile dir: {e}")))?;

        let mut command = Command::new(chrome);
        command.args(launch_args(config, profile.path()));
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Launching {:?}", chrome);
        let mut child = command
            .spawn()
            .map_err(|e| SurfaceError::Launch(format!("{}: {e}", chrome.display())))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SurfaceError::Launch("browser stderr unavailable".to_string()))?;

        let limit = Duration::from_secs(config.launch_timeout_secs);
        let devtools_url = match tokio::time::timeout(limit, read_devtools_url(stderr)).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(e);
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(SurfaceError::Timeout("browser DevTools endpoint".to_string()));
            }
        };

        tracing::info!("Browser started (pid {:?}) at {}", child.id(), devtools_url);
        Ok(Self {
            child: Mutex::new(child),
            devtools_url,
            _profile: profile,
        })
    }

    pub fn devtools_url(&self) -> &str {
        &self.devtools_url
    }

    pub fn kill(&self) {
        let mut child = self.child.lock();
        if let Err(e) = child.start_kill() {
            tracing::debug!("Browser already gone: {}", e);
        }
    }
}

impl Drop for BrowserProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Command line for a launched browser.
pub fn launch_args(config: &BrowserConfig, profile: &Path) -> Vec<String> {
    let mut args = Vec::new();
    if config.headless {
        args.push("--headless=new".to_string());
    }
    args.extend([
        "--remote-debugging-port=0".to_string(),
        format!("--user-data-dir={}", profile.display()),
        format!(
            "--window-size={},{}",
            config.window_width, config.window_height
        ),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--mute-audio".to_string(),
        "--autoplay-policy=no-user-gesture-required".to_string(),
    ]);
    args.extend(config.extra_args.iter().cloned());
    args.push("about:blank".to_string());
    args
}

/// Read browser stderr until the DevTools banner, then keep draining it.
async fn read_devtools_url(stderr: ChildStderr) -> SurfaceResult<String> {
    let mut lines = BufReader::new(stderr).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| SurfaceError::Launch(e.to_string()))?
    {
        if let Some(url) = parse_devtools_banner(&line) {
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::trace!("browser: {}", line);
                }
            });
            return Ok(url);
        }
        tracing::trace!("browser: {}", line);
    }
    Err(SurfaceError::Launch(
        "browser exited before announcing its DevTools endpoint".to_string(),
    ))
}

fn parse_devtools_banner(line: &str) -> Option<String> {
    let rest = line.split_once(DEVTOOLS_BANNER)?.1.trim();
    rest.starts_with("ws://").then(|| rest.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetInfo {
    #[serde(rename = "type")]
    kind: String,
    web_socket_debugger_url: Option<String>,
}

/// `http://host:port` for a DevTools URL.
fn http_base(url: &str) -> SurfaceResult<String> {
    let rest = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| SurfaceError::Connection(format!("unsupported DevTools URL: {url}")))?;
    let host = rest.split('/').next().unwrap_or(rest);
    Ok(format!("http://{host}"))
}

/// Find (or open) a page target and return its websocket URL.
pub async fn resolve_page_target(url: &str, timeout: Duration) -> SurfaceResult<String> {
    if url.starts_with("ws://") && url.contains("/devtools/page/") {
        return Ok(url.to_string());
    }

    let base = http_base(url)?;
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SurfaceError::Connection(e.to_string()))?;

    let targets: Vec<TargetInfo> = client
        .get(format!("{base}/json/list"))
        .send()
        .await
        .map_err(|e| SurfaceError::Connection(e.to_string()))?
        .json()
        .await
        .map_err(|e| SurfaceError::Protocol(e.to_string()))?;

    if let Some(ws) = targets
        .into_iter()
        .filter(|t| t.kind == "page")
        .find_map(|t| t.web_socket_debugger_url)
    {
        return Ok(ws);
    }

    tracing::debug!("No page target at {}, opening one", base);
    let target: TargetInfo = client
        .put(format!("{base}/json/new?about:blank"))
        .send()
        .await
        .map_err(|e| SurfaceError::Connection(e.to_string()))?
        .json()
        .await
        .map_err(|e| SurfaceError::Protocol(e.to_string()))?;
    target
        .web_socket_debugger_url
        .ok_or_else(|| SurfaceError::Protocol("new target has no websocket URL".to_string()))
}

/// Connect to the configured browser, launching one if none is configured.
pub async fn connect(config: &BrowserConfig, tools: &ToolRegistry) -> SurfaceResult<CdpSurface> {
    let timeout = Duration::from_secs(config.launch_timeout_secs);

    if let Some(url) = &config.devtools_url {
        let ws = resolve_page_target(url, timeout).await?;
        return CdpSurface::attach(&ws).await;
    }

    let chrome = tools
        .require(CHROME)
        .map_err(|e| SurfaceError::Launch(e.to_string()))?;
    let browser = BrowserProcess::launch(chrome, config).await?;
    let ws = resolve_page_target(browser.devtools_url(), timeout).await?;
    let surface = CdpSurface::attach(&ws).await?;
    Ok(surface.with_browser(browser))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_parsing() {
        assert_eq!(
            parse_devtools_banner(
                "DevTools listening on ws://127.0.0.1:41234/devtools/browser/ab-cd"
            )
            .as_deref(),
            Some("ws://127.0.0.1:41234/devtools/browser/ab-cd")
        );
        assert!(parse_devtools_banner("[1016/120000.0:ERROR:gpu] whatever").is_none());
    }

    #[test]
    fn http_base_from_devtools_urls() {
        assert_eq!(
            http_base("ws://127.0.0.1:9222/devtools/browser/x").unwrap(),
            "http://127.0.0.1:9222"
        );
        assert_eq!(http_base("http://localhost:9222").unwrap(), "http://localhost:9222");
        assert!(http_base("ftp://x").is_err());
    }

    #[test]
    fn launch_args_follow_config() {
        let config = BrowserConfig {
            headless: false,
            extra_args: vec!["--lang=fr".to_string()],
            ..Default::default()
        };
        let args = launch_args(&config, Path::new("/tmp/p"));
        assert!(!args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
        assert!(args.contains(&"--window-size=1280,720".to_string()));
        assert!(args.contains(&"--lang=fr".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[tokio::test]
    async fn page_url_passes_through() {
        let ws = "ws://127.0.0.1:9222/devtools/page/ABC";
        assert_eq!(
            resolve_page_target(ws, Duration::from_secs(1)).await.unwrap(),
            ws
        );
    }
}
