//! Table-of-contents sequencing, used when no control scores.

use super::model::{DocumentSnapshot, ElementRef, MenuItemSnapshot};

/// Menu entry to open next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuTarget {
    pub target: ElementRef,
    pub text: String,
}

/// Pick the next menu entry across `documents`.
///
/// With an active entry, its next sibling is chosen unless that one is
/// locked. Without an active entry, the first entry that is neither completed
/// nor locked is chosen. The first document with a visible menu decides.
pub fn next_menu_target(documents: &[DocumentSnapshot]) -> Option<MenuTarget> {
    for doc in documents {
        let items: Vec<&MenuItemSnapshot> = doc.menu.iter().filter(|m| m.visible).collect();
        if items.is_empty() {
            continue;
        }

        let pick = match items.iter().position(|m| m.active) {
            Some(active) => items.get(active + 1).filter(|m| !m.locked).copied(),
            None => items.iter().find(|m| !m.completed && !m.locked).copied(),
        };

        return pick.map(|m| MenuTarget {
            target: doc.element_ref(m.node_id),
            text: m.text.trim().to_string(),
        });
    }

    None
}
