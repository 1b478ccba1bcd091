//! Snapshot of the rendered document tree, as collected by the surface.

use serde::{Deserialize, Serialize};

/// Client rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }
}

/// Address of an element inside one collected document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRef {
    /// Frame path of the document, `"0"` for the root.
    pub doc_id: String,
    /// Id assigned to the element by the collector; stable across passes.
    pub node_id: u32,
}

impl ElementRef {
    pub fn new(doc_id: impl Into<String>, node_id: u32) -> Self {
        Self {
            doc_id: doc_id.into(),
            node_id,
        }
    }
}

/// An interactive element candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementSnapshot {
    pub node_id: u32,
    /// Lowercase tag name.
    pub tag: String,
    pub role: String,
    pub text: String,
    pub class_name: String,
    pub id: String,
    pub aria_label: String,
    pub title: String,
    /// Tooltip-style attributes (`data-tooltip`, `data-title`, ...), joined.
    pub tooltip: String,
    pub rect: Rect,
    /// Computed `display`.
    pub display: String,
    /// Computed `visibility`.
    pub visibility: String,
    /// Computed `opacity`.
    pub opacity: f64,
    pub disabled: bool,
    pub aria_disabled: bool,
}

impl Default for ElementSnapshot {
    fn default() -> Self {
        Self {
            node_id: 0,
            tag: String::new(),
            role: String::new(),
            text: String::new(),
            class_name: String::new(),
            id: String::new(),
            aria_label: String::new(),
            title: String::new(),
            tooltip: String::new(),
            rect: Rect::default(),
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
            disabled: false,
            aria_disabled: false,
        }
    }
}

impl ElementSnapshot {
    /// Non-zero size, displayed, not hidden and not fully transparent.
    pub fn is_visible(&self) -> bool {
        self.rect.width > 0.0
            && self.rect.height > 0.0
            && self.display != "none"
            && self.visibility != "hidden"
            && self.visibility != "collapse"
            && self.opacity > 0.0
    }
}

/// An entry of a table-of-contents style menu.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MenuItemSnapshot {
    /// Clickable element of the entry.
    pub node_id: u32,
    pub text: String,
    pub active: bool,
    pub completed: bool,
    pub locked: bool,
    pub visible: bool,
}

/// A `<video>` or `<audio>` element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaSnapshot {
    pub node_id: u32,
    pub paused: bool,
    pub ended: bool,
}

/// One accessible document: the root or a same-origin nested frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentSnapshot {
    pub doc_id: String,
    pub url: String,
    pub viewport_width: f64,
    pub viewport_height: f64,
    /// Candidates in document order.
    pub elements: Vec<ElementSnapshot>,
    /// Menu entries in menu order.
    pub menu: Vec<MenuItemSnapshot>,
    pub media: Vec<MediaSnapshot>,
}

impl DocumentSnapshot {
    pub fn is_root(&self) -> bool {
        self.doc_id == "0"
    }

    pub fn element_ref(&self, node_id: u32) -> ElementRef {
        ElementRef::new(self.doc_id.clone(), node_id)
    }
}

/// Keys of the keyboard fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    ArrowRight,
    Enter,
    Space,
}

impl Key {
    /// Sequence sent when nothing clickable was found.
    pub const FALLBACK_SEQUENCE: [Key; 3] = [Key::ArrowRight, Key::Enter, Key::Space];

    /// DOM `KeyboardEvent.key`.
    pub fn key(&self) -> &'static str {
        match self {
            Key::ArrowRight => "ArrowRight",
            Key::Enter => "Enter",
            Key::Space => " ",
        }
    }

    /// DOM `KeyboardEvent.code`.
    pub fn code(&self) -> &'static str {
        match self {
            Key::ArrowRight => "ArrowRight",
            Key::Enter => "Enter",
            Key::Space => "Space",
        }
    }

    /// Windows virtual key code.
    pub fn key_code(&self) -> u32 {
        match self {
            Key::ArrowRight => 39,
            Key::Enter => 13,
            Key::Space => 32,
        }
    }

    /// Text inserted by the key, if any.
    pub fn text(&self) -> Option<&'static str> {
        match self {
            Key::ArrowRight => None,
            Key::Enter => Some("\r"),
            Key::Space => Some(" "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(width: f64, height: f64) -> ElementSnapshot {
        ElementSnapshot {
            rect: Rect {
                x: 0.0,
                y: 0.0,
                width,
                height,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_visibility() {
        assert!(element(10.0, 10.0).is_visible());
        assert!(!element(0.0, 10.0).is_visible());
        assert!(!element(10.0, 0.0).is_visible());

        let mut hidden = element(10.0, 10.0);
        hidden.display = "none".to_string();
        assert!(!hidden.is_visible());

        let mut hidden = element(10.0, 10.0);
        hidden.visibility = "hidden".to_string();
        assert!(!hidden.is_visible());

        let mut transparent = element(10.0, 10.0);
        transparent.opacity = 0.0;
        assert!(!transparent.is_visible());
    }

    #[test]
    fn test_snapshot_from_collector_json() {
        let doc: DocumentSnapshot = serde_json::from_value(serde_json::json!({
            "docId": "0.1",
            "url": "http://127.0.0.1/scorm-content/index.html",
            "viewportWidth": 1280.0,
            "elements": [{
                "nodeId": 7,
                "tag": "button",
                "text": "Next",
                "className": "btn nav-next",
                "rect": {"x": 1000.0, "y": 600.0, "width": 80.0, "height": 30.0},
                "ariaDisabled": true
            }],
            "menu": [{"nodeId": 9, "text": "Intro", "active": true, "visible": true}],
            "media": [{"nodeId": 11, "paused": true}]
        }))
        .unwrap();

        assert!(!doc.is_root());
        let el = &doc.elements[0];
        assert_eq!(el.node_id, 7);
        assert_eq!(el.opacity, 1.0);
        assert!(el.aria_disabled);
        assert!(el.is_visible());
        assert!(doc.menu[0].active);
        assert!(doc.media[0].paused);
        assert_eq!(doc.element_ref(7), ElementRef::new("0.1", 7));
    }
}
