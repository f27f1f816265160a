use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use super::exec::{run_script, ScriptExecutor};
use super::geometry::{FocusPoint, SafeBand, Viewport};
use super::scripts;
use super::selectors::CommentSelectors;
use super::snapshot::{
    CommentEndState, CommentStats, RawCommentStats, RawFirstComment, RawScrollStats,
    ScrollContainerInfo, ScrollContainerState, ScrollStats, ViewportFirstComment,
};

/// Minimum `scrollHeight - clientHeight` for an element to count as scrollable.
pub const MIN_SCROLLABLE_RANGE: f64 = 12.0;

/// Read-only observations of the comment page.
///
/// Every method is infallible: a failed probe is logged and replaced by the
/// default named on the method, so one bad round never stops a harvest.
#[async_trait]
pub trait DomProbe: Send + Sync {
    /// `None` on failure.
    async fn viewport(&self) -> Option<Viewport>;
    /// `false` on failure.
    async fn is_input_focused(&self) -> bool;
    /// A point inside the comment root that is not on a link or media; `None`
    /// when no root is mounted, no safe point exists, or the probe fails.
    async fn locate_comments_focus_point(&self) -> Option<FocusPoint>;
    /// All-zero stats with unknown total on failure.
    async fn comment_stats(&self) -> CommentStats;
    /// Both markers `false` on failure.
    async fn comment_end_state(&self) -> CommentEndState;
    /// `None` on failure or when nothing intersects the viewport.
    async fn viewport_first_comment(&self) -> Option<ViewportFirstComment>;
    /// Scrollable ancestor of the root plus a safe point inside it; `None` on failure.
    async fn scroll_container_info(&self) -> Option<ScrollContainerInfo>;
    /// Geometry only; `None` on failure.
    async fn scroll_container_state(&self) -> Option<ScrollContainerState>;
    /// Geometry from the first matching root, a tree walk, or the document; `None` on failure.
    async fn scroll_stats(&self, root_selectors: &[String]) -> Option<ScrollStats>;
}

/// [`DomProbe`] over a [`ScriptExecutor`].
pub struct PageProbe {
    exec: Arc<dyn ScriptExecutor>,
    selectors: CommentSelectors,
    band: SafeBand,
    highlight: bool,
}

impl PageProbe {
    pub fn new(exec: Arc<dyn ScriptExecutor>, selectors: CommentSelectors) -> Self {
        Self {
            exec,
            selectors,
            band: SafeBand::default(),
            highlight: false,
        }
    }

    /// Outline the comment root whenever a focus point is located.
    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    /// Vertical margins the located focus point must stay inside.
    pub fn with_band(mut self, band: SafeBand) -> Self {
        self.band = band;
        self
    }

    async fn probe<T: DeserializeOwned>(&self, name: &'static str, script: String) -> Option<T> {
        match run_script::<T>(self.exec.as_ref(), &script).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(
                    target: "probe.script",
                    probe = name,
                    version = scripts::PROBE_SCRIPT_VERSION,
                    error = %e,
                    "probe failed; using default"
                );
                None
            }
        }
    }
}

#[async_trait]
impl DomProbe for PageProbe {
    async fn viewport(&self) -> Option<Viewport> {
        self.probe::<Option<Viewport>>("viewport", scripts::viewport(&self.selectors))
            .await
            .flatten()
            .filter(|v| v.inner_width > 0.0 && v.inner_height > 0.0)
    }

    async fn is_input_focused(&self) -> bool {
        self.probe::<Option<bool>>("input_focused", scripts::input_focused(&self.selectors))
            .await
            .flatten()
            .unwrap_or(false)
    }

    async fn locate_comments_focus_point(&self) -> Option<FocusPoint> {
        let script = scripts::locate_comments_focus_point(
            &self.selectors,
            self.band.top,
            self.band.bottom,
            self.highlight,
        );
        let point = self
            .probe::<Option<FocusPoint>>("locate_comments_focus_point", script)
            .await
            .flatten();
        debug!(target: "probe.script", ?point, "comment focus point");
        point
    }

    async fn comment_stats(&self) -> CommentStats {
        self.probe::<Option<RawCommentStats>>("comment_stats", scripts::comment_stats(&self.selectors))
            .await
            .flatten()
            .map(CommentStats::from)
            .unwrap_or_default()
    }

    async fn comment_end_state(&self) -> CommentEndState {
        self.probe::<Option<CommentEndState>>(
            "comment_end_state",
            scripts::comment_end_state(&self.selectors),
        )
        .await
        .flatten()
        .unwrap_or_default()
    }

    async fn viewport_first_comment(&self) -> Option<ViewportFirstComment> {
        self.probe::<Option<RawFirstComment>>(
            "viewport_first_comment",
            scripts::viewport_first_comment(&self.selectors),
        )
        .await
        .flatten()
        .map(ViewportFirstComment::from)
    }

    async fn scroll_container_info(&self) -> Option<ScrollContainerInfo> {
        self.probe::<Option<ScrollContainerInfo>>(
            "scroll_container_info",
            scripts::scroll_container(&self.selectors, MIN_SCROLLABLE_RANGE, true),
        )
        .await
        .flatten()
    }

    async fn scroll_container_state(&self) -> Option<ScrollContainerState> {
        self.probe::<Option<ScrollContainerInfo>>(
            "scroll_container_state",
            scripts::scroll_container(&self.selectors, MIN_SCROLLABLE_RANGE, false),
        )
        .await
        .flatten()
        .map(|info| info.state)
    }

    async fn scroll_stats(&self, root_selectors: &[String]) -> Option<ScrollStats> {
        self.probe::<Option<RawScrollStats>>(
            "scroll_stats",
            scripts::scroll_stats(&self.selectors, root_selectors, MIN_SCROLLABLE_RANGE),
        )
        .await
        .flatten()
        .map(ScrollStats::from)
    }
}
