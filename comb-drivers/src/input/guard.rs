//! Pre-action safety assessment. The page is observed by the
//! [`page_guard`](crate::page::scripts::page_guard) script; the decision is
//! made here so it can be tested without a browser.
use comb_common::{CombError, PolicyKind, Result};
use serde::Deserialize;
use url::Url;

use super::InteractionContext;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageGuard {
    pub captcha: bool,
    pub media_viewer: bool,
    pub host: String,
    pub hit: Option<HitTarget>,
}

/// Element under the pointer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HitTarget {
    pub tag: String,
    pub href: Option<String>,
    pub media_like: bool,
    pub role: Option<String>,
}

/// Path fragments of pages that navigate away from the comment thread.
const UNSAFE_PATH_PATTERNS: &[&str] = &[
    "/user/profile",
    "/profile/",
    "/search",
    "search_result",
    "/people/",
    "/u/",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkClass {
    /// In-page anchor or script pseudo-link.
    InPage,
    SameSite,
    Profile,
    Search,
    External,
}

impl LinkClass {
    pub fn is_unsafe(&self) -> bool {
        matches!(self, LinkClass::Profile | LinkClass::Search | LinkClass::External)
    }
}

fn base_host(host: &str) -> &str {
    let host = host.split(':').next().unwrap_or(host);
    host.strip_prefix("www.").unwrap_or(host)
}

fn same_site(a: &str, b: &str) -> bool {
    let (a, b) = (base_host(a), base_host(b));
    a == b || a.ends_with(&format!(".{b}")) || b.ends_with(&format!(".{a}"))
}

/// Classify `href` relative to the page host.
pub fn classify_link(href: &str, page_host: &str) -> LinkClass {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:") {
        return LinkClass::InPage;
    }
    let origin = if page_host.is_empty() { "page.invalid" } else { page_host };
    let resolved = Url::parse(&format!("https://{origin}/"))
        .ok()
        .and_then(|base| base.join(href).ok());
    let Some(url) = resolved else {
        // Unparseable targets are treated as navigation away.
        return LinkClass::External;
    };
    if let Some(host) = url.host_str() {
        if !page_host.is_empty() && !same_site(host, page_host) {
            return LinkClass::External;
        }
    }
    let path = url.path().to_ascii_lowercase();
    let query = url.query().unwrap_or("").to_ascii_lowercase();
    if path.contains("/search") || path.contains("search_result") || query.contains("search_result") {
        return LinkClass::Search;
    }
    if UNSAFE_PATH_PATTERNS.iter().any(|p| path.contains(p)) {
        return LinkClass::Profile;
    }
    LinkClass::SameSite
}

/// Decide whether a click in `context` may proceed on the observed page.
pub fn assess_click(guard: &PageGuard, context: InteractionContext) -> Result<()> {
    if guard.captcha {
        return Err(CombError::policy(
            PolicyKind::Captcha,
            format!("verification overlay present before {} click", context.label()),
        ));
    }
    if !context.is_risk_sensitive() {
        return Ok(());
    }
    if guard.media_viewer {
        return Err(CombError::policy(
            PolicyKind::MediaViewerOpen,
            format!("media viewer open during {} click", context.label()),
        ));
    }
    let Some(hit) = &guard.hit else {
        return Ok(());
    };
    if let Some(href) = hit.href.as_deref() {
        let class = classify_link(href, &guard.host);
        if class.is_unsafe() {
            return Err(CombError::policy(
                PolicyKind::UnsafeLink,
                format!("{} click would follow {class:?} link {href}", context.label()),
            ));
        }
    }
    let media_tag = matches!(hit.tag.as_str(), "img" | "video" | "picture" | "canvas");
    if hit.media_like || media_tag {
        return Err(CombError::policy(
            PolicyKind::UnsafeMedia,
            format!("{} click would land on <{}>", context.label(), hit.tag),
        ));
    }
    Ok(())
}

/// Wheel events only need the captcha check.
pub fn assess_wheel(guard: &PageGuard, context: InteractionContext) -> Result<()> {
    if guard.captcha {
        return Err(CombError::policy(
            PolicyKind::Captcha,
            format!("verification overlay present before {} wheel", context.label()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard_with_hit(hit: HitTarget) -> PageGuard {
        PageGuard {
            host: "www.example.com".into(),
            hit: Some(hit),
            ..Default::default()
        }
    }

    #[test]
    fn captcha_blocks_every_context() {
        let guard = PageGuard { captcha: true, ..Default::default() };
        for ctx in [InteractionContext::Generic, InteractionContext::Scroll] {
            let err = assess_click(&guard, ctx).unwrap_err();
            assert_eq!(err.policy_kind(), Some(PolicyKind::Captcha));
        }
        assert!(assess_wheel(&guard, InteractionContext::Scroll).is_err());
    }

    #[test]
    fn media_viewer_only_blocks_sensitive_contexts() {
        let guard = PageGuard { media_viewer: true, ..Default::default() };
        assert!(assess_click(&guard, InteractionContext::Generic).is_ok());
        let err = assess_click(&guard, InteractionContext::ReplyExpand).unwrap_err();
        assert_eq!(err.policy_kind(), Some(PolicyKind::MediaViewerOpen));
        assert!(assess_wheel(&guard, InteractionContext::Scroll).is_ok());
    }

    #[test]
    fn profile_and_external_links_are_unsafe() {
        for href in [
            "/user/profile/5f1a",
            "https://other.example.net/post/1",
            "/search_result?keyword=cats",
        ] {
            let guard = guard_with_hit(HitTarget {
                tag: "span".into(),
                href: Some(href.into()),
                ..Default::default()
            });
            let err = assess_click(&guard, InteractionContext::CommentFocus).unwrap_err();
            assert_eq!(err.policy_kind(), Some(PolicyKind::UnsafeLink), "{href}");
        }
    }

    #[test]
    fn in_page_and_same_site_links_pass() {
        for href in ["#comments", "javascript:void(0)", "/explore/abc?xsec=1", "https://m.example.com/x"] {
            let guard = guard_with_hit(HitTarget {
                tag: "span".into(),
                href: Some(href.into()),
                ..Default::default()
            });
            assert!(assess_click(&guard, InteractionContext::ReplyExpand).is_ok(), "{href}");
        }
    }

    #[test]
    fn media_hits_are_unsafe_in_sensitive_contexts() {
        let guard = guard_with_hit(HitTarget { tag: "img".into(), ..Default::default() });
        let err = assess_click(&guard, InteractionContext::Scroll).unwrap_err();
        assert_eq!(err.policy_kind(), Some(PolicyKind::UnsafeMedia));
        assert!(assess_click(&guard, InteractionContext::Generic).is_ok());

        let cover = guard_with_hit(HitTarget { tag: "div".into(), media_like: true, ..Default::default() });
        assert!(assess_click(&cover, InteractionContext::ReplyExpand).is_err());
    }

    #[test]
    fn link_classes() {
        assert_eq!(classify_link("/search?q=x", "example.com"), LinkClass::Search);
        assert_eq!(classify_link("/people/abc", "example.com"), LinkClass::Profile);
        assert_eq!(classify_link("https://cdn.example.com/a", "www.example.com"), LinkClass::SameSite);
        assert_eq!(classify_link("https://evil.test/", "example.com"), LinkClass::External);
        assert_eq!(classify_link("", "example.com"), LinkClass::InPage);
    }
}
