//! Chrome DevTools Protocol implementation of [`RenderSurface`].

use super::launch::BrowserProcess;
use super::scripts::{self, MUTATION_BINDING};
use super::{RenderSurface, SurfaceError, SurfaceEvent, SurfaceFrame, SurfaceResult};
use crate::navigation::model::{DocumentSnapshot, ElementRef, Key};
use async_trait::async_trait;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use scormcast_av::{decode_frame, Viewport};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Default bound on one protocol call.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// JPEG quality requested for screenshots.
const SCREENSHOT_QUALITY: u8 = 90;

/// Event pushed by the browser.
#[derive(Debug, Clone)]
pub enum CdpEvent {
    Message { method: String, params: Value },
    Disconnected,
}

struct CdpRequest {
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, String>>,
}

/// A DevTools websocket connection.
///
/// The socket is owned by a background task. Calls are sent over an mpsc
/// channel and answered through a oneshot keyed by the request id.
#[derive(Clone)]
pub struct CdpConnection {
    tx: mpsc::Sender<CdpRequest>,
    events: broadcast::Sender<CdpEvent>,
    timeout: Duration,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str) -> SurfaceResult<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| SurfaceError::Connection(format!("{ws_url}: {e}")))?;
        let (sink, stream) = ws.split();

        let (tx, rx) = mpsc::channel::<CdpRequest>(64);
        let (events, _) = broadcast::channel(256);

        let events_for_loop = events.clone();
        tokio::spawn(async move {
            connection_loop(sink, stream, rx, events_for_loop).await;
        });

        tracing::debug!("Connected to DevTools at {}", ws_url);
        Ok(Self {
            tx,
            events,
            timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Send one command and wait for its result.
    pub async fn call(&self, method: &str, params: Value) -> SurfaceResult<Value> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(CdpRequest {
                method: method.to_string(),
                params,
                reply,
            })
            .await
            .map_err(|_| SurfaceError::Closed)?;

        match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(SurfaceError::Protocol(format!("{method}: {message}"))),
            Ok(Err(_)) => Err(SurfaceError::Closed),
            Err(_) => Err(SurfaceError::Timeout(method.to_string())),
        }
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connection_loop(
    mut sink: futures::stream::SplitSink<WsStream, Message>,
    mut stream: futures::stream::SplitStream<WsStream>,
    mut rx: mpsc::Receiver<CdpRequest>,
    events: broadcast::Sender<CdpEvent>,
) {
    let mut next_id: u64 = 1;
    let mut pending: HashMap<u64, oneshot::Sender<Result<Value, String>>> = HashMap::new();

    loop {
        tokio::select! {
            request = rx.recv() => {
                let Some(request) = request else {
                    tracing::debug!("All DevTools handles dropped");
                    break;
                };
                let id = next_id;
                next_id += 1;
                let frame = json!({"id": id, "method": request.method, "params": request.params});
                tracing::trace!("CDP -> {} #{}", request.method, id);
                if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                    let _ = request.reply.send(Err(e.to_string()));
                    tracing::warn!("DevTools send failed: {}", e);
                    break;
                }
                pending.insert(id, request.reply);
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => dispatch(&text, &mut pending, &events),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!("DevTools closed connection: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("DevTools websocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err("connection closed".to_string()));
    }
    let _ = events.send(CdpEvent::Disconnected);
}

fn dispatch(
    text: &str,
    pending: &mut HashMap<u64, oneshot::Sender<Result<Value, String>>>,
    events: &broadcast::Sender<CdpEvent>,
) {
    let message: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Ignoring malformed DevTools message: {}", e);
            return;
        }
    };

    if let Some(id) = message.get("id").and_then(Value::as_u64) {
        let Some(reply) = pending.remove(&id) else {
            tracing::debug!("DevTools response #{} with no pending request", id);
            return;
        };
        let result = match message.get("error") {
            Some(error) => Err(error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string()),
            None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = reply.send(result);
        return;
    }

    if let Some(method) = message.get("method").and_then(Value::as_str) {
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let _ = events.send(CdpEvent::Message {
            method: method.to_string(),
            params,
        });
    }
}

/// A browser page driven over DevTools.
pub struct CdpSurface {
    conn: CdpConnection,
    events: broadcast::Sender<SurfaceEvent>,
    forwarder: JoinHandle<()>,
    browser: Option<BrowserProcess>,
}

impl CdpSurface {
    /// Attach to the page target at `ws_url`.
    pub async fn attach(ws_url: &str) -> SurfaceResult<Self> {
        let conn = CdpConnection::connect(ws_url).await?;
        let cdp_events = conn.subscribe();

        conn.call("Page.enable", json!({})).await?;
        conn.call("Runtime.enable", json!({})).await?;
        conn.call("Runtime.addBinding", json!({ "name": MUTATION_BINDING }))
            .await?;

        let tree = conn.call("Page.getFrameTree", json!({})).await?;
        let main_frame = tree
            .pointer("/frameTree/frame/id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let (events, _) = broadcast::channel(128);
        let forwarder = tokio::spawn(forward_events(
            conn.clone(),
            cdp_events,
            events.clone(),
            main_frame,
        ));

        Ok(Self {
            conn,
            events,
            forwarder,
            browser: None,
        })
    }

    /// Keep a launched browser alive as long as the surface.
    pub fn with_browser(mut self, browser: BrowserProcess) -> Self {
        self.browser = Some(browser);
        self
    }

    async fn evaluate(&self, expression: String) -> SurfaceResult<Value> {
        let result = self
            .conn
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": false,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("exception")
                .to_string();
            return Err(SurfaceError::Script(message));
        }

        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn dispatch_key(&self, event_type: &str, key: Key) -> SurfaceResult<()> {
        let mut params = json!({
            "type": event_type,
            "key": key.key(),
            "code": key.code(),
            "windowsVirtualKeyCode": key.key_code(),
            "nativeVirtualKeyCode": key.key_code(),
        });
        if event_type == "keyDown" {
            if let Some(text) = key.text() {
                params["text"] = json!(text);
            }
        }
        self.conn.call("Input.dispatchKeyEvent", params).await?;
        Ok(())
    }
}

impl Drop for CdpSurface {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Page region of the content frame, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ContentClip {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl ContentClip {
    /// Parse the bounds reported by [`scripts::content_rect`]; `None` when the
    /// frame is missing or collapsed.
    fn from_rect(rect: &Value) -> Option<Self> {
        let field = |name: &str| rect.get(name).and_then(Value::as_f64);
        let clip = Self {
            x: field("x")?.max(0.0),
            y: field("y")?.max(0.0),
            width: field("width")?.floor(),
            height: field("height")?.floor(),
        };
        (clip.width >= 1.0 && clip.height >= 1.0).then_some(clip)
    }

    fn to_params(self) -> Value {
        json!({
            "x": self.x,
            "y": self.y,
            "width": self.width,
            "height": self.height,
            "scale": 1,
        })
    }

    fn viewport(&self) -> Viewport {
        Viewport::new(self.width as u32, self.height as u32)
    }
}

async fn forward_events(
    conn: CdpConnection,
    mut cdp_events: broadcast::Receiver<CdpEvent>,
    events: broadcast::Sender<SurfaceEvent>,
    main_frame: String,
) {
    loop {
        let event = match cdp_events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("Surface lagged {} DevTools events", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => CdpEvent::Disconnected,
        };

        match event {
            CdpEvent::Message { method, params } => match method.as_str() {
                "Page.frameStoppedLoading" => {
                    let frame_id = params
                        .get("frameId")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let root = frame_id == main_frame;
                    tracing::debug!("Frame {} loaded (root: {})", frame_id, root);

                    let conn = conn.clone();
                    tokio::spawn(async move {
                        let params = json!({
                            "expression": scripts::observe_mutations(),
                            "returnByValue": true,
                        });
                        if let Err(e) = conn.call("Runtime.evaluate", params).await {
                            tracing::debug!("Could not install mutation observers: {}", e);
                        }
                    });

                    let _ = events.send(SurfaceEvent::Loaded { frame_id, root });
                }
                "Runtime.bindingCalled" => {
                    if params.get("name").and_then(Value::as_str) == Some(MUTATION_BINDING) {
                        let _ = events.send(SurfaceEvent::Mutated);
                    }
                }
                "Page.javascriptDialogOpening" => {
                    let message = params.get("message").and_then(Value::as_str).unwrap_or("");
                    tracing::debug!("Accepting dialog: {}", message);
                    let conn = conn.clone();
                    tokio::spawn(async move {
                        let _ = conn
                            .call("Page.handleJavaScriptDialog", json!({ "accept": true }))
                            .await;
                    });
                }
                _ => {}
            },
            CdpEvent::Disconnected => {
                let _ = events.send(SurfaceEvent::Closed);
                break;
            }
        }
    }
}

#[async_trait]
impl RenderSurface for CdpSurface {
    async fn navigate(&self, url: &str) -> SurfaceResult<()> {
        let result = self
            .conn
            .call("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            return Err(SurfaceError::Protocol(format!("navigate {url}: {error}")));
        }
        tracing::debug!("Navigated to {}", url);
        Ok(())
    }

    async fn documents(&self) -> SurfaceResult<Vec<DocumentSnapshot>> {
        let value = self.evaluate(scripts::collect_documents()).await?;
        let json = value
            .as_str()
            .ok_or_else(|| SurfaceError::Script("collector returned no data".to_string()))?;
        serde_json::from_str(json).map_err(|e| SurfaceError::Script(e.to_string()))
    }

    async fn activate(&self, target: &ElementRef) -> SurfaceResult<bool> {
        let value = self.evaluate(scripts::activate(target)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn play_media(&self, target: &ElementRef) -> SurfaceResult<bool> {
        let value = self.evaluate(scripts::play_media(target)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn press_keys(&self, keys: &[Key]) -> SurfaceResult<()> {
        for key in keys {
            let down = if key.text().is_some() {
                "keyDown"
            } else {
                "rawKeyDown"
            };
            self.dispatch_key(down, *key).await?;
            self.dispatch_key("keyUp", *key).await?;
        }
        Ok(())
    }

    async fn capture_frame(&self) -> SurfaceResult<SurfaceFrame> {
        let clip = match self.evaluate(scripts::content_rect()).await {
            Ok(rect) => ContentClip::from_rect(&rect),
            Err(e) => {
                tracing::debug!("Content frame bounds unavailable: {}", e);
                None
            }
        };

        let mut params = json!({
            "format": "jpeg",
            "quality": SCREENSHOT_QUALITY,
            "fromSurface": true,
            "captureBeyondViewport": false,
        });
        if let Some(clip) = &clip {
            params["clip"] = clip.to_params();
        }

        let shot = self.conn.call("Page.captureScreenshot", params).await?;
        let data = shot
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| SurfaceError::Frame("screenshot without data".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| SurfaceError::Frame(e.to_string()))?;
        let image = decode_frame(&bytes).map_err(|e| SurfaceError::Frame(e.to_string()))?;

        match clip {
            Some(clip) => {
                let viewport = clip.viewport();
                // High-DPI screenshots come back scaled; bring them to CSS pixels.
                let image = if image.dimensions() != (viewport.width, viewport.height) {
                    image::imageops::resize(
                        &image,
                        viewport.width,
                        viewport.height,
                        image::imageops::FilterType::Triangle,
                    )
                } else {
                    image
                };
                Ok(SurfaceFrame { image, viewport })
            }
            None => {
                let metrics = self.conn.call("Page.getLayoutMetrics", json!({})).await?;
                let scroll_x = metrics
                    .pointer("/cssVisualViewport/pageX")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                let scroll_y = metrics
                    .pointer("/cssVisualViewport/pageY")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);

                let viewport = Viewport {
                    width: image.width(),
                    height: image.height(),
                    scroll_x: scroll_x.max(0.0) as u32,
                    scroll_y: scroll_y.max(0.0) as u32,
                };
                Ok(SurfaceFrame { image, viewport })
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> SurfaceResult<()> {
        if let Err(e) = self.conn.call("Page.close", json!({})).await {
            tracing::debug!("Page.close failed: {}", e);
        }
        if let Some(browser) = &self.browser {
            browser.kill();
        }
        Ok(())
    }
}
