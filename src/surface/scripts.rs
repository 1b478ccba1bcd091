//! Page-side scripts evaluated through `Runtime.evaluate`.
//!
//! Every script walks `window.frames` recursively from the root document.
//! Frames whose document cannot be read are skipped. Document ids are frame
//! index paths (`"0"`, `"0.1"`, `"0.1.0"`), element ids live in a
//! `data-scormcast-id` attribute.

use crate::navigation::model::ElementRef;

/// Name of the binding mutation observers report through.
pub const MUTATION_BINDING: &str = "__scormcastMutation";

/// Shared helpers, prepended to every script.
const PRELUDE: &str = r#"
const ATTR = 'data-scormcast-id';
const readDoc = (win) => {
  try {
    const doc = win.document;
    return doc && doc.documentElement ? doc : null;
  } catch (e) {
    return null;
  }
};
const walk = (win, docId, visit) => {
  const doc = readDoc(win);
  if (!doc) return;
  visit(win, doc, docId);
  for (let i = 0; i < win.frames.length; i++) {
    walk(win.frames[i], docId + '.' + i, visit);
  }
};
const findDoc = (docId) => {
  let win = window;
  for (const part of docId.split('.').slice(1)) {
    try {
      win = win.frames[Number(part)];
    } catch (e) {
      return null;
    }
    if (!win) return null;
  }
  const doc = readDoc(win);
  return doc ? { win, doc } : null;
};
const findElement = (docId, nodeId) => {
  const found = findDoc(docId);
  if (!found) return null;
  const el = found.doc.querySelector('[' + ATTR + '="' + nodeId + '"]');
  return el ? { win: found.win, el } : null;
};
const counter = () => {
  const top = window;
  top.__scormcastNext = top.__scormcastNext || 1;
  return top;
};
const idOf = (el) => {
  let v = el.getAttribute(ATTR);
  if (!v) {
    const top = counter();
    v = String(top.__scormcastNext++);
    el.setAttribute(ATTR, v);
  }
  return Number(v);
};
"#;

const COLLECT_BODY: &str = r#"
const CANDIDATES = [
  'a', 'button', 'input[type=button]', 'input[type=submit]', 'input[type=image]',
  '[role=button]', '[role=link]', '[onclick]', '[tabindex]',
  '[class*=next]', '[class*=Next]', '[class*=nav]', '[class*=arrow]', '[class*=continue]',
  '[aria-label]', '[data-tooltip]', '[data-title]'
].join(',');
const MENU = [
  '[role=menuitem]', '[role=treeitem]', 'nav li', '.menu li', '.toc li', '.outline li',
  '[class*=menu-item]', '[class*=toc-item]', '[class*=lesson-link]'
].join(',');
const TOOLTIP_ATTRS = ['data-tooltip', 'data-title', 'data-original-title', 'data-tip'];
const cls = (el) => (typeof el.className === 'string' ? el.className : (el.getAttribute('class') || ''));
const has = (el, re) => re.test(cls(el));
const docs = [];
walk(window, '0', (win, doc, docId) => {
  const elements = [];
  for (const el of doc.querySelectorAll(CANDIDATES)) {
    const r = el.getBoundingClientRect();
    const style = win.getComputedStyle(el);
    elements.push({
      nodeId: idOf(el),
      tag: el.tagName.toLowerCase(),
      role: el.getAttribute('role') || '',
      text: (el.innerText || el.value || el.alt || '').trim().slice(0, 200),
      className: cls(el),
      id: el.id || '',
      ariaLabel: el.getAttribute('aria-label') || '',
      title: el.getAttribute('title') || '',
      tooltip: TOOLTIP_ATTRS.map((a) => el.getAttribute(a) || '').filter(Boolean).join(' '),
      rect: { x: r.left, y: r.top, width: r.width, height: r.height },
      display: style.display,
      visibility: style.visibility,
      opacity: Number(style.opacity),
      disabled: !!el.disabled || el.hasAttribute('disabled'),
      ariaDisabled: el.getAttribute('aria-disabled') === 'true'
    });
  }
  const menu = [];
  for (const item of doc.querySelectorAll(MENU)) {
    const link = item.querySelector('a, button, [role=button], [role=link]') || item;
    const r = item.getBoundingClientRect();
    const style = win.getComputedStyle(item);
    menu.push({
      nodeId: idOf(link),
      text: (item.innerText || '').trim().slice(0, 120),
      active: has(item, /\b(active|current|selected)\b/i)
        || item.getAttribute('aria-current') !== null && item.getAttribute('aria-current') !== 'false'
        || item.getAttribute('aria-selected') === 'true',
      completed: has(item, /(complete|visited|viewed|done)/i),
      locked: has(item, /(lock|disabled)/i) || item.getAttribute('aria-disabled') === 'true',
      visible: r.width > 0 && r.height > 0 && style.display !== 'none' && style.visibility !== 'hidden'
    });
  }
  const media = [];
  for (const m of doc.querySelectorAll('video, audio')) {
    media.push({ nodeId: idOf(m), paused: m.paused, ended: m.ended });
  }
  docs.push({
    docId,
    url: String(win.location.href),
    viewportWidth: win.innerWidth,
    viewportHeight: win.innerHeight,
    elements,
    menu,
    media
  });
});
return JSON.stringify(docs);
"#;

const ACTIVATE_BODY: &str = r#"
const found = findElement(docId, nodeId);
if (!found) return false;
const { win, el } = found;
try { el.scrollIntoView({ block: 'center', inline: 'center' }); } catch (e) {}
const r = el.getBoundingClientRect();
const init = {
  bubbles: true, cancelable: true, view: win, button: 0,
  clientX: r.left + r.width / 2, clientY: r.top + r.height / 2
};
const Pointer = win.PointerEvent || win.MouseEvent;
el.dispatchEvent(new Pointer('pointerdown', init));
el.dispatchEvent(new win.MouseEvent('mousedown', init));
el.dispatchEvent(new Pointer('pointerup', init));
el.dispatchEvent(new win.MouseEvent('mouseup', init));
el.dispatchEvent(new win.MouseEvent('click', init));
if (typeof el.click === 'function') el.click();
return true;
"#;

const PLAY_MEDIA_BODY: &str = r#"
const found = findElement(docId, nodeId);
if (!found || typeof found.el.play !== 'function') return false;
try {
  const p = found.el.play();
  if (p && typeof p.catch === 'function') p.catch(() => {});
  return true;
} catch (e) {
  return false;
}
"#;

const OBSERVE_BODY: &str = r#"
let installed = 0;
walk(window, '0', (win, doc) => {
  if (win.__scormcastObserved || !doc.body) return;
  const notify = win[BINDING] || window[BINDING];
  if (typeof notify !== 'function') return;
  let pending = false;
  const observer = new win.MutationObserver(() => {
    if (pending) return;
    pending = true;
    win.setTimeout(() => {
      pending = false;
      try { notify(''); } catch (e) {}
    }, 100);
  });
  observer.observe(doc.body, { childList: true, subtree: true, attributes: true, characterData: true });
  win.__scormcastObserved = true;
  installed++;
});
return installed;
"#;

const CONTENT_RECT_BODY: &str = r#"
const frame = document.getElementById('content');
if (!frame) return null;
const r = frame.getBoundingClientRect();
return { x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height };
"#;

fn wrap(params: &str, body: &str, args: &[String]) -> String {
    format!(
        "(({params}) => {{{PRELUDE}{body}}})({})",
        args.join(", ")
    )
}

fn element_args(target: &ElementRef) -> Vec<String> {
    vec![
        serde_json::Value::String(target.doc_id.clone()).to_string(),
        target.node_id.to_string(),
    ]
}

/// Returns the accessible documents as a JSON string.
pub fn collect_documents() -> String {
    wrap("", COLLECT_BODY, &[])
}

/// Dispatches the activation sequence; evaluates to a boolean.
pub fn activate(target: &ElementRef) -> String {
    wrap("docId, nodeId", ACTIVATE_BODY, &element_args(target))
}

/// Calls `play()` on a media element; evaluates to a boolean.
pub fn play_media(target: &ElementRef) -> String {
    wrap("docId, nodeId", PLAY_MEDIA_BODY, &element_args(target))
}

/// Page bounds of the player's content frame, or `null` without one.
pub fn content_rect() -> String {
    wrap("", CONTENT_RECT_BODY, &[])
}

/// Installs mutation observers on documents that have none yet.
pub fn observe_mutations() -> String {
    wrap(
        "BINDING",
        OBSERVE_BODY,
        &[serde_json::Value::String(MUTATION_BINDING.to_string()).to_string()],
    )
}
