use serde::{Deserialize, Serialize};

/// CSS selector lists (tried in order) and keyword hints the probe scripts
/// use to find things on a comment page.
///
/// The defaults target the common "note detail" layout of image/short-video
/// sites; per-site overrides come from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSelectors {
    pub root: Vec<String>,
    /// Top-level and nested reply item patterns.
    pub item: Vec<String>,
    pub end_marker: Vec<String>,
    pub empty_state: Vec<String>,
    pub show_more: Vec<String>,
    pub header_total: Vec<String>,
    pub count_badge: Vec<String>,
    pub captcha: Vec<String>,
    pub media_viewer: Vec<String>,
    pub comment_entry: Vec<String>,
    /// Text that means "this list has no comments" when no empty-state element matches.
    pub empty_keywords: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for CommentSelectors {
    fn default() -> Self {
        Self {
            root: owned(&[
                ".comments-container",
                ".comments-el",
                "[class*='comment-list']",
                "#comments",
            ]),
            item: owned(&[
                ".parent-comment",
                ".comment-item",
                ".comment-item-sub",
                ".reply-item",
                "[class*='comment-item']",
                "[data-comment-id]",
            ]),
            end_marker: owned(&[
                ".end-container",
                ".comments-end",
                "[class*='no-more']",
                "[class*='list-end']",
            ]),
            empty_state: owned(&[
                ".no-comments",
                ".comment-empty",
                "[class*='comments-empty']",
            ]),
            show_more: owned(&[
                ".show-more",
                "[class*='show-more']",
                "[class*='reply-expand']",
                "[class*='load-more-reply']",
            ]),
            header_total: owned(&[".comments-container .total", ".comment-count", "[class*='comments-total']"]),
            count_badge: owned(&[
                ".chat-wrapper .count",
                ".interact-container .chat-wrapper .count",
                "[class*='comment-btn'] .count",
            ]),
            captcha: owned(&[
                "#captcha",
                "[class*='captcha']",
                "[class*='verify-modal']",
                "[class*='red-captcha']",
                "iframe[src*='captcha']",
            ]),
            media_viewer: owned(&[
                "[class*='image-viewer']",
                "[class*='media-viewer']",
                "[class*='lightbox']",
                "[class*='preview-mask']",
            ]),
            comment_entry: owned(&[
                ".chat-wrapper",
                "[class*='comment-btn']",
                "[class*='comment-entry']",
            ]),
            empty_keywords: owned(&["暂无评论", "还没有评论", "快来抢沙发", "No comments yet"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_script_field_names() {
        let json = serde_json::to_value(CommentSelectors::default()).unwrap();
        assert!(json.get("endMarker").is_some());
        assert!(json.get("emptyKeywords").is_some());
        assert!(json.get("end_marker").is_none());
    }

    #[test]
    fn item_patterns_cover_nested_replies() {
        let sel = CommentSelectors::default();
        assert!(sel.item.iter().any(|s| s.contains("sub") || s.contains("reply")));
    }
}
