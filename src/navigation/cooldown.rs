use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Longest text kept in a signature.
const SIGNATURE_TEXT_CHARS: usize = 64;

/// Identity of an activation: document, element and label.
pub fn signature(doc_id: &str, node_id: u32, text: &str) -> String {
    let text: String = text.trim().chars().take(SIGNATURE_TEXT_CHARS).collect();
    format!("{doc_id}#{node_id}:{text}")
}

/// Suppresses repeated activation of the same signature within a window.
#[derive(Debug)]
pub struct Cooldown {
    window: Duration,
    last: HashMap<String, Instant>,
}

impl Cooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    /// Record an activation of `signature` at `now`.
    ///
    /// Returns `false`, recording nothing, if the signature was activated
    /// less than the window ago.
    pub fn try_acquire(&mut self, signature: &str, now: Instant) -> bool {
        let window = self.window;
        self.last
            .retain(|_, at| now.saturating_duration_since(*at) < window);

        if self.last.contains_key(signature) {
            return false;
        }
        self.last.insert(signature.to_string(), now);
        true
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature() {
        assert_eq!(signature("0.1", 4, "  Next  "), "0.1#4:Next");
        let long = "x".repeat(200);
        assert_eq!(signature("0", 1, &long).len(), "0#1:".len() + 64);
    }

    #[test]
    fn test_same_signature_suppressed_within_window() {
        let mut cooldown = Cooldown::new(Duration::from_secs(4));
        let t0 = Instant::now();
        assert!(cooldown.try_acquire("0#1:Next", t0));
        assert!(!cooldown.try_acquire("0#1:Next", t0 + Duration::from_secs(1)));
        assert!(cooldown.try_acquire("0#2:Next", t0 + Duration::from_secs(1)));
        assert!(cooldown.try_acquire("0#1:Next", t0 + Duration::from_secs(4)));
    }

    #[test]
    fn test_suppressed_attempt_does_not_extend_window() {
        let mut cooldown = Cooldown::new(Duration::from_secs(4));
        let t0 = Instant::now();
        assert!(cooldown.try_acquire("a", t0));
        assert!(!cooldown.try_acquire("a", t0 + Duration::from_secs(3)));
        assert!(cooldown.try_acquire("a", t0 + Duration::from_millis(4001)));
        assert_eq!(cooldown.len(), 1);
    }
}
