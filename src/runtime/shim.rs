use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Writes kept per shim for diagnostics.
const WRITE_LOG_CAPACITY: usize = 200;

/// Completion state reported by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    #[default]
    Incomplete,
    Completed,
    Passed,
    Failed,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompletionStatus::Incomplete => "incomplete",
            CompletionStatus::Completed => "completed",
            CompletionStatus::Passed => "passed",
            CompletionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Runtime API generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiGeneration {
    /// SCORM 1.2, exposed as `window.API`.
    Scorm12,
    /// SCORM 2004, exposed as `window.API_1484_11`.
    Scorm2004,
}

impl ApiGeneration {
    /// Parse the generation segment of a bridge URL.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "12" | "1.2" => Some(ApiGeneration::Scorm12),
            "2004" => Some(ApiGeneration::Scorm2004),
            _ => None,
        }
    }

    pub fn segment(&self) -> &'static str {
        match self {
            ApiGeneration::Scorm12 => "12",
            ApiGeneration::Scorm2004 => "2004",
        }
    }
}

/// Runtime API entry point, independent of generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMethod {
    Initialize,
    Terminate,
    GetValue,
    SetValue,
    Commit,
    GetLastError,
    GetErrorString,
    GetDiagnostic,
}

impl RuntimeMethod {
    /// Resolve a method name as exposed by the given generation.
    pub fn parse(generation: ApiGeneration, name: &str) -> Option<Self> {
        let method = match generation {
            ApiGeneration::Scorm12 => match name {
                "LMSInitialize" => RuntimeMethod::Initialize,
                "LMSFinish" => RuntimeMethod::Terminate,
                "LMSGetValue" => RuntimeMethod::GetValue,
                "LMSSetValue" => RuntimeMethod::SetValue,
                "LMSCommit" => RuntimeMethod::Commit,
                "LMSGetLastError" => RuntimeMethod::GetLastError,
                "LMSGetErrorString" => RuntimeMethod::GetErrorString,
                "LMSGetDiagnostic" => RuntimeMethod::GetDiagnostic,
                _ => return None,
            },
            ApiGeneration::Scorm2004 => match name {
                "Initialize" => RuntimeMethod::Initialize,
                "Terminate" => RuntimeMethod::Terminate,
                "GetValue" => RuntimeMethod::GetValue,
                "SetValue" => RuntimeMethod::SetValue,
                "Commit" => RuntimeMethod::Commit,
                "GetLastError" => RuntimeMethod::GetLastError,
                "GetErrorString" => RuntimeMethod::GetErrorString,
                "GetDiagnostic" => RuntimeMethod::GetDiagnostic,
                _ => return None,
            },
        };
        Some(method)
    }
}

/// Raised when content reports that an item is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSignal {
    /// Index of the item the reporting shim was installed for.
    pub item_index: usize,
    pub generation: ApiGeneration,
    pub element: String,
    pub status: CompletionStatus,
}

/// One set-value call, kept for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct WriteRecord {
    pub generation: ApiGeneration,
    pub element: String,
    pub value: String,
    pub at: DateTime<Utc>,
}

/// Whether writing `value` to `element` reports completion.
pub fn completion_for(
    generation: ApiGeneration,
    element: &str,
    value: &str,
) -> Option<CompletionStatus> {
    let value = value.trim().to_ascii_lowercase();
    match (generation, element) {
        (ApiGeneration::Scorm12, "cmi.core.lesson_status") => match value.as_str() {
            "completed" => Some(CompletionStatus::Completed),
            "passed" => Some(CompletionStatus::Passed),
            _ => None,
        },
        (ApiGeneration::Scorm2004, "cmi.completion_status") => match value.as_str() {
            "completed" => Some(CompletionStatus::Completed),
            _ => None,
        },
        (ApiGeneration::Scorm2004, "cmi.success_status") => match value.as_str() {
            "passed" => Some(CompletionStatus::Passed),
            "failed" => Some(CompletionStatus::Failed),
            _ => None,
        },
        _ => None,
    }
}

/// Minimal LMS runtime for one playing item.
///
/// Lifecycle calls always succeed and reads return an empty string. Writes
/// are only inspected for completion; they are logged but never read back.
#[derive(Debug)]
pub struct RuntimeShim {
    item_index: usize,
    completion_tx: mpsc::UnboundedSender<CompletionSignal>,
    write_log: Mutex<VecDeque<WriteRecord>>,
    calls: AtomicU64,
}

impl RuntimeShim {
    pub fn new(item_index: usize, completion_tx: mpsc::UnboundedSender<CompletionSignal>) -> Self {
        Self {
            item_index,
            completion_tx,
            write_log: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    pub fn item_index(&self) -> usize {
        self.item_index
    }

    /// Number of calls answered so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Answer one runtime API call.
    pub fn call(&self, generation: ApiGeneration, method: RuntimeMethod, args: &[String]) -> String {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("");
        tracing::trace!("{:?} {:?}({:?})", generation, method, args);

        match method {
            RuntimeMethod::Initialize | RuntimeMethod::Terminate | RuntimeMethod::Commit => {
                "true".to_string()
            }
            RuntimeMethod::GetValue => String::new(),
            RuntimeMethod::SetValue => self.set_value(generation, arg(0), arg(1)),
            RuntimeMethod::GetLastError => "0".to_string(),
            RuntimeMethod::GetErrorString => match arg(0) {
                "" | "0" => "No error".to_string(),
                _ => "General error".to_string(),
            },
            RuntimeMethod::GetDiagnostic => String::new(),
        }
    }

    /// Record a write and raise completion when it reports one.
    pub fn set_value(&self, generation: ApiGeneration, element: &str, value: &str) -> String {
        {
            let mut log = self.write_log.lock();
            if log.len() == WRITE_LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(WriteRecord {
                generation,
                element: element.to_string(),
                value: value.to_string(),
                at: Utc::now(),
            });
        }

        if let Some(status) = completion_for(generation, element, value) {
            tracing::debug!(
                "Item {} reported {} via {}",
                self.item_index,
                status,
                element
            );
            let signal = CompletionSignal {
                item_index: self.item_index,
                generation,
                element: element.to_string(),
                status,
            };
            if self.completion_tx.send(signal).is_err() {
                tracing::debug!("No listener for completion signal");
            }
        }

        "true".to_string()
    }

    /// Logged writes, oldest first.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.write_log.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shim() -> (RuntimeShim, mpsc::UnboundedReceiver<CompletionSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RuntimeShim::new(3, tx), rx)
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_method_names() {
        assert_eq!(
            RuntimeMethod::parse(ApiGeneration::Scorm12, "LMSFinish"),
            Some(RuntimeMethod::Terminate)
        );
        assert_eq!(
            RuntimeMethod::parse(ApiGeneration::Scorm2004, "Terminate"),
            Some(RuntimeMethod::Terminate)
        );
        assert_eq!(RuntimeMethod::parse(ApiGeneration::Scorm2004, "LMSFinish"), None);
        assert_eq!(RuntimeMethod::parse(ApiGeneration::Scorm12, "Initialize"), None);
    }

    #[test]
    fn test_lifecycle_calls() {
        let (shim, _rx) = shim();
        let g = ApiGeneration::Scorm12;
        assert_eq!(shim.call(g, RuntimeMethod::Initialize, &args(&[""])), "true");
        assert_eq!(shim.call(g, RuntimeMethod::Commit, &args(&[""])), "true");
        assert_eq!(shim.call(g, RuntimeMethod::Terminate, &args(&[""])), "true");
        assert_eq!(shim.call(g, RuntimeMethod::GetLastError, &[]), "0");
        assert_eq!(
            shim.call(g, RuntimeMethod::GetValue, &args(&["cmi.core.student_name"])),
            ""
        );
        assert_eq!(shim.call_count(), 5);
    }

    #[test]
    fn test_scorm12_completion() {
        let (shim, mut rx) = shim();
        let g = ApiGeneration::Scorm12;
        shim.call(
            g,
            RuntimeMethod::SetValue,
            &args(&["cmi.core.lesson_location", "page3"]),
        );
        assert!(rx.try_recv().is_err());

        shim.call(
            g,
            RuntimeMethod::SetValue,
            &args(&["cmi.core.lesson_status", "Passed"]),
        );
        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.item_index, 3);
        assert_eq!(signal.status, CompletionStatus::Passed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_scorm12_terminal_statuses() {
        let g = ApiGeneration::Scorm12;
        let e = "cmi.core.lesson_status";
        assert_eq!(completion_for(g, e, "completed"), Some(CompletionStatus::Completed));
        assert_eq!(completion_for(g, e, "passed"), Some(CompletionStatus::Passed));
        assert_eq!(completion_for(g, e, "failed"), None);
        assert_eq!(completion_for(g, e, "incomplete"), None);
        assert_eq!(completion_for(g, e, "browsed"), None);
    }

    #[test]
    fn test_scorm2004_completion() {
        assert_eq!(
            completion_for(ApiGeneration::Scorm2004, "cmi.completion_status", "COMPLETED"),
            Some(CompletionStatus::Completed)
        );
        assert_eq!(
            completion_for(ApiGeneration::Scorm2004, "cmi.success_status", "failed"),
            Some(CompletionStatus::Failed)
        );
        assert_eq!(
            completion_for(ApiGeneration::Scorm2004, "cmi.completion_status", "incomplete"),
            None
        );
        assert_eq!(
            completion_for(ApiGeneration::Scorm2004, "cmi.core.lesson_status", "completed"),
            None
        );
        assert_eq!(
            completion_for(ApiGeneration::Scorm12, "cmi.core.lesson_status", "failed"),
            None
        );
        assert_eq!(
            completion_for(ApiGeneration::Scorm12, "cmi.core.lesson_status", "incomplete"),
            None
        );
    }

    #[test]
    fn test_write_log_is_bounded() {
        let (shim, _rx) = shim();
        for i in 0..(WRITE_LOG_CAPACITY + 10) {
            shim.set_value(ApiGeneration::Scorm2004, "cmi.location", &i.to_string());
        }
        let writes = shim.writes();
        assert_eq!(writes.len(), WRITE_LOG_CAPACITY);
        assert_eq!(writes[0].value, "10");
        // Writes are never read back.
        assert_eq!(
            shim.call(
                ApiGeneration::Scorm2004,
                RuntimeMethod::GetValue,
                &args(&["cmi.location"])
            ),
            ""
        );
    }
}
