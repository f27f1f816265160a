//! Typed page snapshots and the normalisation of raw script output into them.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::geometry::FocusPoint;

/// Rendered comment counters. `count` is what is mounted right now, not a
/// running total, and `has_more` is advisory only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentStats {
    pub has_root: bool,
    pub count: u64,
    pub has_more: bool,
    pub total: Option<u64>,
}

impl CommentStats {
    /// `total` is null or zero.
    pub fn total_unknown_or_zero(&self) -> bool {
        matches!(self.total, None | Some(0))
    }

    pub fn total_positive(&self) -> Option<u64> {
        self.total.filter(|t| *t > 0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCommentStats {
    pub has_root: bool,
    pub count: u64,
    pub has_more_hint: bool,
    pub header_text: Option<String>,
    pub badge_text: Option<String>,
    pub empty_hint: bool,
}

impl From<RawCommentStats> for CommentStats {
    fn from(raw: RawCommentStats) -> Self {
        if raw.empty_hint {
            return CommentStats {
                has_root: raw.has_root,
                count: 0,
                has_more: false,
                total: Some(0),
            };
        }
        let total = raw
            .header_text
            .as_deref()
            .and_then(parse_header_total)
            .or_else(|| raw.badge_text.as_deref().and_then(parse_count_badge));
        CommentStats {
            has_root: raw.has_root,
            count: raw.count,
            has_more: raw.has_more_hint,
            total,
        }
    }
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:共|全部)\s*([0-9][0-9.,]*)\s*([万wW千kK亿]?)\s*条\s*评论")
            .expect("static header regex")
    })
}

fn badge_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([0-9][0-9.,]*)\s*([万wW千kK亿]?)\+?\s*$").expect("static badge regex")
    })
}

/// Parse "共 1.2万 条评论" / "全部 356 条评论" style headers.
///
/// ```
/// use comb_drivers::page::snapshot::parse_header_total;
///
/// assert_eq!(parse_header_total("共 1.2万 条评论"), Some(12_000));
/// assert_eq!(parse_header_total("全部 356 条评论"), Some(356));
/// assert_eq!(parse_header_total("说点什么..."), None);
/// ```
pub fn parse_header_total(text: &str) -> Option<u64> {
    let caps = header_re().captures(text)?;
    normalize_count(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str()).unwrap_or(""))
}

/// Parse a bare count badge such as "1.2万", "3k" or "999+".
pub fn parse_count_badge(text: &str) -> Option<u64> {
    let caps = badge_re().captures(text)?;
    normalize_count(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str()).unwrap_or(""))
}

/// Apply a unit suffix to a numeric string.
pub fn normalize_count(number: &str, unit: &str) -> Option<u64> {
    let cleaned: String = number.chars().filter(|c| *c != ',').collect();
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let multiplier = match unit {
        "" => 1.0,
        "千" | "k" | "K" => 1_000.0,
        "万" | "w" | "W" => 10_000.0,
        "亿" => 100_000_000.0,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

/// The only signals allowed to declare completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentEndState {
    pub end_marker_visible: bool,
    pub empty_state_visible: bool,
}

impl CommentEndState {
    pub fn any(&self) -> bool {
        self.end_marker_visible || self.empty_state_visible
    }
}

/// Identity of the first comment intersecting the viewport.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportFirstComment {
    pub key: String,
    pub top: f64,
    pub bottom: f64,
    pub user: String,
    pub text_sample: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFirstComment {
    pub id: Option<String>,
    pub user: String,
    pub text: String,
    pub top: f64,
    pub bottom: f64,
}

const KEY_USER_PREFIX: usize = 24;
const KEY_TEXT_PREFIX: usize = 48;
const TEXT_SAMPLE_LEN: usize = 80;

fn prefix(s: &str, n: usize) -> String {
    s.trim().chars().take(n).collect()
}

impl From<RawFirstComment> for ViewportFirstComment {
    fn from(raw: RawFirstComment) -> Self {
        let id = raw.id.as_deref().map(str::trim).unwrap_or("");
        let user = prefix(&raw.user, KEY_USER_PREFIX);
        let text = prefix(&raw.text, KEY_TEXT_PREFIX);
        let key = if !id.is_empty() {
            id.to_string()
        } else if user.is_empty() && text.is_empty() {
            String::new()
        } else {
            format!("{user}|{text}")
        };
        ViewportFirstComment {
            key,
            top: raw.top,
            bottom: raw.bottom,
            user: raw.user.trim().to_string(),
            text_sample: prefix(&raw.text, TEXT_SAMPLE_LEN),
        }
    }
}

/// True iff both keys are known and differ.
pub fn first_comment_changed(
    before: Option<&ViewportFirstComment>,
    after: Option<&ViewportFirstComment>,
) -> bool {
    match (before, after) {
        (Some(b), Some(a)) => !b.key.is_empty() && !a.key.is_empty() && b.key != a.key,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollContainerState {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollContainerState {
    pub fn scrollable_range(&self) -> f64 {
        self.scroll_height - self.client_height
    }

    pub fn is_scrollable(&self, min_range: f64) -> bool {
        self.scrollable_range() > min_range
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollContainerInfo {
    #[serde(flatten)]
    pub state: ScrollContainerState,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl ScrollContainerInfo {
    pub fn point(&self) -> Option<FocusPoint> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(FocusPoint::new(x, y)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollSource {
    Root,
    Walk,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollStats {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
    pub at_top: bool,
    pub at_bottom: bool,
    pub source: ScrollSource,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScrollStats {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
    pub source: ScrollSource,
}

impl From<RawScrollStats> for ScrollStats {
    fn from(raw: RawScrollStats) -> Self {
        let range = raw.scroll_height - raw.client_height;
        let at_top = raw.scroll_top <= 2.0;
        let at_bottom = range <= 24.0 || raw.scroll_top + raw.client_height >= raw.scroll_height - 8.0;
        ScrollStats {
            scroll_top: raw.scroll_top,
            scroll_height: raw.scroll_height,
            client_height: raw.client_height,
            at_top,
            at_bottom,
            source: raw.source,
        }
    }
}

impl ScrollStats {
    pub fn as_container_state(&self) -> ScrollContainerState {
        ScrollContainerState {
            scroll_top: self.scroll_top,
            scroll_height: self.scroll_height,
            client_height: self.client_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stats(v: serde_json::Value) -> CommentStats {
        serde_json::from_value::<RawCommentStats>(v).unwrap().into()
    }

    #[test]
    fn header_wins_over_badge() {
        let s = stats(json!({
            "hasRoot": true, "count": 10, "hasMoreHint": true,
            "headerText": "共 356 条评论", "badgeText": "1.2万", "emptyHint": false
        }));
        assert_eq!(s.total, Some(356));
        assert!(s.has_more);
    }

    #[test]
    fn badge_units_are_normalized() {
        let s = stats(json!({"hasRoot": true, "count": 3, "headerText": "", "badgeText": "1.2万"}));
        assert_eq!(s.total, Some(12_000));
        assert_eq!(parse_count_badge("3k"), Some(3_000));
        assert_eq!(parse_count_badge("999+"), Some(999));
        assert_eq!(parse_count_badge("1,024"), Some(1_024));
        assert_eq!(parse_count_badge("评论"), None);
    }

    #[test]
    fn empty_hint_short_circuits() {
        let s = stats(json!({
            "hasRoot": true, "count": 0, "hasMoreHint": true,
            "headerText": "共 12 条评论", "emptyHint": true
        }));
        assert_eq!(s, CommentStats { has_root: true, count: 0, has_more: false, total: Some(0) });
        assert!(s.total_unknown_or_zero());
    }

    #[test]
    fn empty_hint_wins_over_mounted_items() {
        let s = stats(json!({
            "hasRoot": true, "count": 4, "hasMoreHint": true,
            "badgeText": "4", "emptyHint": true
        }));
        assert_eq!(s, CommentStats { has_root: true, count: 0, has_more: false, total: Some(0) });
    }

    #[test]
    fn missing_fields_default() {
        let s = stats(json!({}));
        assert_eq!(s, CommentStats::default());
        assert_eq!(s.total_positive(), None);
    }

    #[test]
    fn first_comment_key_prefers_id() {
        let c: ViewportFirstComment = RawFirstComment {
            id: Some(" c-42 ".into()),
            user: "alice".into(),
            text: "hello".into(),
            top: 10.0,
            bottom: 90.0,
        }
        .into();
        assert_eq!(c.key, "c-42");
    }

    #[test]
    fn first_comment_key_falls_back_to_prefixes() {
        let long_user = "u".repeat(40);
        let long_text = "评".repeat(100);
        let c: ViewportFirstComment = RawFirstComment {
            id: None,
            user: long_user,
            text: long_text,
            top: 0.0,
            bottom: 1.0,
        }
        .into();
        let (user, text) = c.key.split_once('|').unwrap();
        assert_eq!(user.chars().count(), KEY_USER_PREFIX);
        assert_eq!(text.chars().count(), KEY_TEXT_PREFIX);
        assert_eq!(c.text_sample.chars().count(), TEXT_SAMPLE_LEN);
    }

    #[test]
    fn blank_identity_never_counts_as_change() {
        let blank = ViewportFirstComment::default();
        let a = ViewportFirstComment { key: "a".into(), ..Default::default() };
        let b = ViewportFirstComment { key: "b".into(), ..Default::default() };
        assert!(!first_comment_changed(Some(&blank), Some(&a)));
        assert!(!first_comment_changed(Some(&a), None));
        assert!(!first_comment_changed(Some(&a), Some(&a.clone())));
        assert!(first_comment_changed(Some(&a), Some(&b)));
    }

    #[test]
    fn container_info_decodes_flattened_geometry() {
        let info: ScrollContainerInfo = serde_json::from_value(json!({
            "scrollTop": 120.0, "scrollHeight": 4000.0, "clientHeight": 700.0, "x": 900, "y": 400
        }))
        .unwrap();
        assert!(info.state.is_scrollable(12.0));
        assert_eq!(info.point(), Some(FocusPoint::new(900.0, 400.0)));

        let no_point: ScrollContainerInfo = serde_json::from_value(json!({
            "scrollTop": 0, "scrollHeight": 700, "clientHeight": 700, "x": null, "y": null
        }))
        .unwrap();
        assert!(!no_point.state.is_scrollable(12.0));
        assert!(no_point.point().is_none());
    }

    #[test]
    fn scroll_stats_edges() {
        let top: ScrollStats = RawScrollStats {
            scroll_top: 1.0,
            scroll_height: 3000.0,
            client_height: 800.0,
            source: ScrollSource::Walk,
        }
        .into();
        assert!(top.at_top && !top.at_bottom);

        let near_bottom: ScrollStats = RawScrollStats {
            scroll_top: 2195.0,
            scroll_height: 3000.0,
            client_height: 800.0,
            source: ScrollSource::Root,
        }
        .into();
        assert!(!near_bottom.at_top && near_bottom.at_bottom);

        let short: ScrollStats = RawScrollStats {
            scroll_top: 0.0,
            scroll_height: 820.0,
            client_height: 800.0,
            source: ScrollSource::Document,
        }
        .into();
        assert!(short.at_top && short.at_bottom);
    }
}
