//! Page-script library.
//!
//! Every probe the controller relies on is one self-contained expression
//! built here: `(function (S, A) { PRELUDE; BODY })(selectors, args)`.
//! `S` is the serialized [`CommentSelectors`], `A` the per-call arguments.
//! Scripts only return raw observations; normalisation happens in
//! [`super::snapshot`] so it can be tested without a browser.
//!
//! Probe scripts never mutate the page, with two exceptions that are
//! diagnostic or idempotent: the optional root outline drawn by
//! [`locate_comments_focus_point`] and the processed-marker attribute set by
//! [`reply_expanders`]. [`highlight_point`] is diagnostics only.
use serde_json::{json, Value};

use super::selectors::CommentSelectors;

/// Bumped whenever a script's returned shape changes.
pub const PROBE_SCRIPT_VERSION: u32 = 3;

/// Attribute used to mark "show more" affordances already handed out.
pub const EXPANDED_MARK_ATTR: &str = "data-comb-expanded";

const PRELUDE: &str = r#"
  const qAll = (scope, list) => {
    const out = [];
    for (const s of list || []) {
      try { scope.querySelectorAll(s).forEach((el) => out.push(el)); } catch (_) {}
    }
    return Array.from(new Set(out));
  };
  const qFirst = (scope, list) => {
    for (const s of list || []) {
      try { const el = scope.querySelector(s); if (el) return el; } catch (_) {}
    }
    return null;
  };
  const vw = () => window.innerWidth || document.documentElement.clientWidth || 0;
  const vh = () => window.innerHeight || document.documentElement.clientHeight || 0;
  const isShown = (el) => {
    if (!el || !el.getBoundingClientRect) return false;
    const r = el.getBoundingClientRect();
    if (r.width <= 0 || r.height <= 0) return false;
    const cs = window.getComputedStyle(el);
    if (cs.display === 'none' || cs.visibility === 'hidden' || Number(cs.opacity) === 0) return false;
    return true;
  };
  const inViewport = (el) => {
    const r = el.getBoundingClientRect();
    return r.bottom > 0 && r.right > 0 && r.top < vh() && r.left < vw();
  };
  const findRoot = () => qFirst(document, S.root);
  const unsafeAt = (x, y, scope) => {
    const el = document.elementFromPoint(x, y);
    if (!el) return true;
    if (scope && !scope.contains(el)) return true;
    if (el.closest('a[href]')) return true;
    if (el.closest('img,video,picture,canvas,[class*="avatar"]')) return true;
    return false;
  };
  const textOf = (el) => (el ? (el.innerText || el.textContent || '').trim() : '');
"#;

fn invoke(body: &str, selectors: &CommentSelectors, args: Value) -> String {
    let sel = serde_json::to_string(selectors).unwrap_or_else(|_| "{}".to_string());
    format!("(function (S, A) {{\n{PRELUDE}\n{body}\n}})({sel}, {args})")
}

/// `{innerWidth, innerHeight}`
pub fn viewport(selectors: &CommentSelectors) -> String {
    invoke(
        "return { innerWidth: vw(), innerHeight: vh() };",
        selectors,
        json!({}),
    )
}

/// `true` when the active element accepts text.
pub fn input_focused(selectors: &CommentSelectors) -> String {
    invoke(
        r#"
  const el = document.activeElement;
  if (!el || el === document.body) return false;
  const tag = (el.tagName || '').toLowerCase();
  if (tag === 'textarea') return true;
  if (tag === 'input') {
    const t = (el.getAttribute('type') || 'text').toLowerCase();
    return !['button', 'checkbox', 'radio', 'submit', 'reset', 'image', 'file', 'range', 'color'].includes(t);
  }
  return !!el.isContentEditable;
"#,
        selectors,
        json!({}),
    )
}

/// `{x, y}` inside the comment root and off links/media, or `null`.
pub fn locate_comments_focus_point(
    selectors: &CommentSelectors,
    band_top: f64,
    band_bottom: f64,
    highlight: bool,
) -> String {
    invoke(
        r#"
  const root = findRoot();
  if (!root) return null;
  if (A.highlight) {
    try { root.style.outline = '2px dashed rgba(255, 96, 0, 0.55)'; } catch (_) {}
  }
  const r = root.getBoundingClientRect();
  const top = Math.max(r.top, A.bandTop);
  const bottom = Math.min(r.bottom, vh() - A.bandBottom);
  const left = Math.max(r.left, 0);
  const right = Math.min(r.right, vw());
  if (bottom <= top || right <= left) return null;
  const xs = [0.85, 0.75, 0.65, 0.5, 0.35];
  const ys = [0.5, 0.35, 0.65, 0.25, 0.8];
  for (const fx of xs) {
    for (const fy of ys) {
      const x = left + (right - left) * fx;
      const y = top + (bottom - top) * fy;
      if (!unsafeAt(x, y, root)) return { x: Math.round(x), y: Math.round(y) };
    }
  }
  return null;
"#,
        selectors,
        json!({ "bandTop": band_top, "bandBottom": band_bottom, "highlight": highlight }),
    )
}

/// Raw comment statistics; see `RawCommentStats`.
pub fn comment_stats(selectors: &CommentSelectors) -> String {
    invoke(
        r#"
  const root = findRoot();
  const scope = root || document;
  const items = qAll(scope, S.item);
  const emptyEl = qFirst(scope, S.emptyState) || qFirst(document, S.emptyState);
  let emptyHint = !!(emptyEl && isShown(emptyEl));
  if (!emptyHint && items.length === 0 && root) {
    const txt = textOf(root).slice(0, 600);
    emptyHint = (S.emptyKeywords || []).some((k) => k && txt.includes(k));
  }
  const headerParts = qAll(document, S.headerTotal).map(textOf).filter(Boolean);
  if (root) headerParts.push(textOf(root).slice(0, 400));
  const badge = qFirst(document, S.countBadge);
  return {
    hasRoot: !!root,
    count: items.length,
    hasMoreHint: qAll(scope, S.showMore).length > 0 || !qFirst(scope, S.endMarker),
    headerText: headerParts.join(' ').slice(0, 800),
    badgeText: badge ? textOf(badge).slice(0, 40) : null,
    emptyHint,
  };
"#,
        selectors,
        json!({}),
    )
}

/// `{endMarkerVisible, emptyStateVisible}` scoped to the root, then the document.
pub fn comment_end_state(selectors: &CommentSelectors) -> String {
    invoke(
        r#"
  const root = findRoot();
  const visibleIn = (scope, list) => qAll(scope, list).some((el) => isShown(el) && inViewport(el));
  const check = (list) => (root && visibleIn(root, list)) || visibleIn(document, list);
  return {
    endMarkerVisible: check(S.endMarker),
    emptyStateVisible: check(S.emptyState),
  };
"#,
        selectors,
        json!({}),
    )
}

/// First comment item intersecting `[0, viewportBottom]`, or `null`.
pub fn viewport_first_comment(selectors: &CommentSelectors) -> String {
    invoke(
        r#"
  const root = findRoot();
  const items = qAll(root || document, S.item);
  const bottom = vh();
  let best = null;
  let bestTop = Infinity;
  for (const el of items) {
    const r = el.getBoundingClientRect();
    if (r.height <= 0 || r.bottom <= 0 || r.top >= bottom) continue;
    if (r.top < bestTop) { best = el; bestTop = r.top; }
  }
  if (!best) return null;
  const r = best.getBoundingClientRect();
  const id = best.getAttribute('id') || best.getAttribute('data-comment-id') || (best.dataset && best.dataset.id) || '';
  const userEl = best.querySelector('.name, .author, [class*="user-name"], [class*="author"]');
  const textEl = best.querySelector('.content, .note-text, [class*="content"]');
  return {
    id,
    user: textOf(userEl).slice(0, 64),
    text: (textEl ? textOf(textEl) : textOf(best)).slice(0, 200),
    top: r.top,
    bottom: r.bottom,
  };
"#,
        selectors,
        json!({}),
    )
}

/// Nearest scrollable ancestor of the comment root, with an optional safe
/// interaction point inside it.
pub fn scroll_container(
    selectors: &CommentSelectors,
    min_scrollable: f64,
    with_point: bool,
) -> String {
    invoke(
        r#"
  const root = findRoot();
  if (!root) return null;
  let el = root;
  let found = null;
  while (el && el !== document.documentElement) {
    const cs = window.getComputedStyle(el);
    if (['auto', 'scroll', 'overlay'].includes(cs.overflowY) && el.scrollHeight - el.clientHeight > A.minScrollable) {
      found = el;
      break;
    }
    el = el.parentElement;
  }
  if (!found) return null;
  const out = {
    scrollTop: found.scrollTop,
    scrollHeight: found.scrollHeight,
    clientHeight: found.clientHeight,
    x: null,
    y: null,
  };
  if (!A.withPoint) return out;
  const r = found.getBoundingClientRect();
  const top = Math.max(r.top, 0);
  const bottom = Math.min(r.bottom, vh());
  const left = Math.max(r.left, 0);
  const right = Math.min(r.right, vw());
  if (bottom <= top || right <= left) return out;
  for (const fx of [0.8, 0.7, 0.6, 0.5]) {
    for (const fy of [0.5, 0.4, 0.6, 0.3, 0.7]) {
      const x = left + (right - left) * fx;
      const y = top + (bottom - top) * fy;
      if (!unsafeAt(x, y, found)) { out.x = Math.round(x); out.y = Math.round(y); return out; }
    }
  }
  return out;
"#,
        selectors,
        json!({ "minScrollable": min_scrollable, "withPoint": with_point }),
    )
}

/// Defensive scroll geometry that works without a resolved comment root:
/// root ancestors, then a bounded tree walk, then the document itself.
pub fn scroll_stats(selectors: &CommentSelectors, root_selectors: &[String], min_scrollable: f64) -> String {
    invoke(
        r#"
  const scrollable = (el) => {
    const cs = window.getComputedStyle(el);
    return ['auto', 'scroll', 'overlay'].includes(cs.overflowY) && el.scrollHeight - el.clientHeight > A.minScrollable;
  };
  const pack = (el, source) => ({
    scrollTop: el.scrollTop || 0,
    scrollHeight: el.scrollHeight || 0,
    clientHeight: el.clientHeight || vh(),
    source,
  });
  const roots = (A.roots && A.roots.length) ? A.roots : S.root;
  let el = qFirst(document, roots);
  while (el && el !== document.documentElement) {
    if (scrollable(el)) return pack(el, 'root');
    el = el.parentElement;
  }
  let best = null;
  const all = document.body ? document.body.getElementsByTagName('*') : [];
  const limit = Math.min(all.length, 5000);
  for (let i = 0; i < limit; i++) {
    const cand = all[i];
    if (!scrollable(cand)) continue;
    if (!best || cand.clientHeight > best.clientHeight) best = cand;
  }
  if (best) return pack(best, 'walk');
  return pack(document.scrollingElement || document.documentElement || document.body, 'document');
"#,
        selectors,
        json!({ "roots": root_selectors, "minScrollable": min_scrollable }),
    )
}

/// Visible, unprocessed "show more replies" affordances, capped at `max`.
pub fn reply_expanders(selectors: &CommentSelectors, max: usize, min_size: f64) -> String {
    invoke(
        r#"
  const root = findRoot();
  if (!root) return { targets: [], visible: 0, candidates: 0, all: 0 };
  const all = qAll(root, S.showMore);
  const visible = all.filter((el) => {
    const r = el.getBoundingClientRect();
    return r.width >= A.minSize && r.height >= A.minSize && inViewport(el) && isShown(el);
  });
  const fresh = visible.filter((el) => el.getAttribute(A.markAttr) !== '1');
  const targets = [];
  for (const el of fresh.slice(0, A.max)) {
    const r = el.getBoundingClientRect();
    const x = Math.min(Math.max(r.left + r.width / 2, 1), vw() - 1);
    const y = Math.min(Math.max(r.top + r.height / 2, 1), vh() - 1);
    el.setAttribute(A.markAttr, '1');
    targets.push({ x: Math.round(x), y: Math.round(y), text: textOf(el).slice(0, 40) });
  }
  return { targets, visible: visible.length, candidates: fresh.length, all: all.length };
"#,
        selectors,
        json!({ "max": max, "minSize": min_size, "markAttr": EXPANDED_MARK_ATTR }),
    )
}

/// Anti-bot and hit-test state used before input actions.
pub fn page_guard(selectors: &CommentSelectors, point: Option<(f64, f64)>) -> String {
    let (x, y) = match point {
        Some((x, y)) => (json!(x), json!(y)),
        None => (Value::Null, Value::Null),
    };
    invoke(
        r#"
  const anyShown = (list) => qAll(document, list).some(isShown);
  const out = {
    captcha: anyShown(S.captcha),
    mediaViewer: anyShown(S.mediaViewer),
    host: location.host || '',
    hit: null,
  };
  if (A.x === null || A.y === null) return out;
  const el = document.elementFromPoint(A.x, A.y);
  if (!el) return out;
  const link = el.closest('a[href]');
  const media = el.closest('img,video,picture,canvas');
  out.hit = {
    tag: (el.tagName || '').toLowerCase(),
    href: link ? link.getAttribute('href') : null,
    mediaLike: !!media || /(^|\s)(cover|image|video|img)(\s|$|-)/.test(String(el.className || '')),
    role: el.getAttribute('role'),
  };
  return out;
"#,
        selectors,
        json!({ "x": x, "y": y }),
    )
}

/// Diagnostic dot at `(x, y)` removed after `ttl_ms`.
pub fn highlight_point(selectors: &CommentSelectors, x: f64, y: f64, ttl_ms: u64) -> String {
    invoke(
        r#"
  const dot = document.createElement('div');
  dot.setAttribute('data-comb-highlight', '1');
  dot.style.cssText = 'position:fixed;pointer-events:none;z-index:2147483647;width:14px;height:14px;'
    + 'border-radius:50%;border:2px solid #ff3b30;background:rgba(255,59,48,.25);'
    + 'left:' + (A.x - 7) + 'px;top:' + (A.y - 7) + 'px;';
  (document.body || document.documentElement).appendChild(dot);
  setTimeout(() => dot.remove(), A.ttl);
  return true;
"#,
        selectors,
        json!({ "x": x, "y": y, "ttl": ttl_ms }),
    )
}

/// Centre of the visible comment-entry affordance, or `null`.
pub fn locate_comment_entry(selectors: &CommentSelectors) -> String {
    invoke(
        r#"
  for (const el of qAll(document, S.commentEntry)) {
    if (!isShown(el) || !inViewport(el)) continue;
    const r = el.getBoundingClientRect();
    return { x: Math.round(r.left + r.width / 2), y: Math.round(r.top + r.height / 2) };
  }
  return null;
"#,
        selectors,
        json!({}),
    )
}
