//! Player page, its state, and the runtime bridge script.

use crate::player::PlaybackState;
use crate::runtime::{BRIDGE_JS, BRIDGE_PATH};
use crate::server::AppContext;
use crate::vfs::VfsStats;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};

/// Player page. The content plays in `#content`, a child frame, so the
/// runtime objects defined here are found on its parent.
///
/// `?src=<url>` loads that entry once; `?follow=1` tracks the active item
/// through `/player/state` and the event stream.
const PLAYER_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>scormcast</title>
<script src="/player/runtime-bridge.js"></script>
<style>
  html, body { margin: 0; height: 100%; background: #fff; font-family: sans-serif; }
  body { display: flex; flex-direction: column; }
  #bar { display: flex; gap: 1em; align-items: center; padding: 4px 10px; font-size: 13px;
         background: #1f2937; color: #f9fafb; }
  #bar progress { flex: 0 0 160px; }
  #content { flex: 1; border: 0; width: 100%; }
</style>
</head>
<body>
<div id="bar"><strong id="title"></strong><span id="item"></span><progress id="progress" max="100" value="0"></progress></div>
<iframe id="content" allow="autoplay; fullscreen"></iframe>
<script>
(function () {
  "use strict";
  var frame = document.getElementById("content");
  var params = new URLSearchParams(window.location.search);

  function show(state) {
    document.getElementById("title").textContent = state.title || "";
    document.getElementById("item").textContent = state.active_item_title || "";
    document.getElementById("progress").value = state.progress_percent || 0;
  }

  function load(src) {
    if (src && frame.getAttribute("src") !== src) {
      frame.setAttribute("src", src);
    }
  }

  function refresh(follow) {
    fetch("/player/state").then(function (r) { return r.json(); }).then(function (state) {
      show(state);
      if (follow) load(state.current_entry);
    }).catch(function () {});
  }

  var follow = params.get("follow") === "1";
  if (!follow) load(params.get("src"));
  refresh(follow);

  if (window.EventSource) {
    var events = new EventSource("/events");
    events.onmessage = function (msg) {
      var event;
      try { event = JSON.parse(msg.data); } catch (e) { return; }
      if (event.event_type === "item_started" && follow) load(event.src);
      if (event.event_type === "item_started" || event.event_type === "progress"
          || event.event_type === "playback_completed") {
        refresh(false);
      }
    };
  }
})();
</script>
</body>
</html>
"#;

pub fn player_routes() -> Router<AppContext> {
    Router::new()
        .route("/", get(redirect_to_player))
        .route("/player", get(player_page))
        .route("/player/", get(player_page))
        .route("/player/state", get(player_state))
        .route("/player/vfs", get(vfs_stats))
        .route(BRIDGE_PATH, get(bridge_script))
}

async fn redirect_to_player() -> impl IntoResponse {
    axum::response::Redirect::temporary("/player/?follow=1")
}

pub async fn player_page() -> impl IntoResponse {
    ([(header::CACHE_CONTROL, "no-store")], Html(PLAYER_HTML))
}

pub async fn player_state(State(ctx): State<AppContext>) -> Json<PlaybackState> {
    Json(ctx.playback.read().clone())
}

pub async fn vfs_stats(State(ctx): State<AppContext>) -> Response {
    match ctx.vfs.stats().await {
        Ok(stats) => Json::<VfsStats>(stats).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn bridge_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        BRIDGE_JS,
    )
}
