//! LMS runtime API shim.
//!
//! Content looks for `window.API` (SCORM 1.2) or `window.API_1484_11`
//! (SCORM 2004) on an ancestor frame. The player page defines both with
//! [`BRIDGE_JS`], which forwards every call synchronously to the server where
//! the installed [`RuntimeShim`] answers it.

mod registry;
mod shim;

pub use registry::{RuntimeCallError, ShimGuard, ShimRegistry};
pub use shim::{
    completion_for, ApiGeneration, CompletionSignal, CompletionStatus, RuntimeMethod, RuntimeShim,
    WriteRecord,
};

/// URL of the bridge script.
pub const BRIDGE_PATH: &str = "/player/runtime-bridge.js";

/// Browser-side bridge, served at [`BRIDGE_PATH`].
pub const BRIDGE_JS: &str = r#"(function () {
  "use strict";

  function call(generation, method, args) {
    var values = [];
    for (var i = 0; i < args.length; i++) {
      values.push(args[i] === undefined || args[i] === null ? "" : String(args[i]));
    }
    var xhr = new XMLHttpRequest();
    try {
      xhr.open("POST", "/runtime/" + generation + "/" + method, false);
      xhr.setRequestHeader("Content-Type", "application/json");
      xhr.send(JSON.stringify({ args: values }));
    } catch (e) {
      return "false";
    }
    return xhr.status === 200 ? xhr.responseText : "false";
  }

  function expose(generation, names) {
    var api = {};
    names.forEach(function (name) {
      api[name] = function () {
        return call(generation, name, arguments);
      };
    });
    return api;
  }

  window.API = expose("12", [
    "LMSInitialize", "LMSFinish", "LMSGetValue", "LMSSetValue", "LMSCommit",
    "LMSGetLastError", "LMSGetErrorString", "LMSGetDiagnostic"
  ]);

  window.API_1484_11 = expose("2004", [
    "Initialize", "Terminate", "GetValue", "SetValue", "Commit",
    "GetLastError", "GetErrorString", "GetDiagnostic"
  ]);
})();
"#;
