//! The exhaustive-scroll control loop.
//!
//! Each round snapshots the page, re-anchors the pointer, optionally expands
//! replies, wheels once, waits, and compares before/after observations. Only
//! a visible end or empty marker may declare the list finished; the mounted
//! item count is never trusted on its own because the list recycles nodes.
//! When rounds stop having any effect, an up-then-down bounce is tried, and
//! three consecutive failed bounces end the run as stuck.
use comb_common::observability::OpsJournal;
use comb_common::Result;
use comb_drivers::behavioral::{BehavioralEngine, Span};
use comb_drivers::input::{InputGateway, InteractionContext};
use comb_drivers::page::geometry::{
    clamp_to_safe_band, compute_visible_focus_point, FocusPoint, Rect, SafeBand, Viewport,
};
use comb_drivers::page::probe::DomProbe;
use comb_drivers::page::snapshot::{
    first_comment_changed, CommentStats, ScrollContainerState, ScrollSource,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::hooks::{ActivateComments, ActivationReason, ExpandContext, ScrollHooks};

pub const MIN_ROUNDS: u32 = 36;
pub const MAX_ROUNDS: u32 = 900;
pub const DEFAULT_ROUNDS: u32 = 96;

/// Used only when the viewport probe fails before anything else is known.
const FALLBACK_VIEWPORT: Viewport = Viewport {
    inner_width: 1280.0,
    inner_height: 800.0,
};

/// Round budget for a run.
///
/// An explicit positive bound wins. Otherwise a positive total gives
/// `clamp(ceil(total * 3 / 6), 36, 900)`, and an unknown total gives 96.
///
/// ```
/// use comb_harvest::dynamic_max_rounds;
///
/// assert_eq!(dynamic_max_rounds(None, Some(60)), 36);
/// assert_eq!(dynamic_max_rounds(None, Some(1000)), 500);
/// assert_eq!(dynamic_max_rounds(None, None), 96);
/// assert_eq!(dynamic_max_rounds(Some(5), Some(1000)), 5);
/// ```
pub fn dynamic_max_rounds(max_rounds: Option<u32>, total: Option<u64>) -> u32 {
    if let Some(n) = max_rounds.filter(|n| *n > 0) {
        return n;
    }
    match total.filter(|t| *t > 0) {
        Some(t) => {
            let scaled = t.saturating_mul(3).div_ceil(6);
            scaled.clamp(MIN_ROUNDS as u64, MAX_ROUNDS as u64) as u32
        }
        None => DEFAULT_ROUNDS,
    }
}

/// Magnitudes (px), pauses (ms) and thresholds of the loop.
#[derive(Debug, Clone)]
pub struct ScrollTuning {
    pub wheel: Span,
    pub settle: Span,
    pub bounce_up: Span,
    pub bounce_up_wait: Span,
    pub bounce_up_times: u32,
    pub bounce_down: Span,
    pub bounce_down_wait: Span,
    pub bounce_down_times: u32,
    pub no_effect_threshold: u32,
    pub max_bounce_failures: u32,
    /// Minimum `scrollTop` change that counts as movement.
    pub scroll_epsilon: f64,
    /// Containers with less scrollable range than this are ignored.
    pub min_scrollable: f64,
    pub band: SafeBand,
}

impl Default for ScrollTuning {
    fn default() -> Self {
        Self {
            wheel: Span::new(520, 780),
            settle: Span::new(650, 1300),
            bounce_up: Span::new(320, 480),
            bounce_up_wait: Span::new(500, 900),
            bounce_up_times: 2,
            bounce_down: Span::new(540, 760),
            bounce_down_wait: Span::new(600, 1050),
            bounce_down_times: 3,
            no_effect_threshold: 2,
            max_bounce_failures: 3,
            scroll_epsilon: 2.0,
            min_scrollable: 12.0,
            band: SafeBand::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestTarget {
    pub profile: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScrollOptions {
    pub target: HarvestTarget,
    pub max_rounds: Option<u32>,
    /// Region to aim at when the comment root cannot be located yet.
    pub seed_rect: Option<Rect>,
    /// Extra roots for the fallback geometry probe; empty uses the configured roots.
    pub root_selectors: Vec<String>,
}

impl ScrollOptions {
    pub fn new(target: HarvestTarget) -> Self {
        Self {
            target,
            max_rounds: None,
            seed_rect: None,
            root_selectors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollResult {
    pub reached_end: bool,
    pub ended_by_stuck: bool,
    pub total_from_header: Option<u64>,
    pub final_count: u64,
    pub rounds: u32,
    pub focus_point: FocusPoint,
}

pub struct ExhaustiveScroller {
    probe: Arc<dyn DomProbe>,
    input: Arc<dyn InputGateway>,
    pacing: Arc<BehavioralEngine>,
    journal: Arc<OpsJournal>,
    tuning: ScrollTuning,
}

/// Which element a geometry reading measured. Readings from different
/// sources are never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Measured {
    Container,
    Fallback(ScrollSource),
}

type Geometry = Option<(Measured, ScrollContainerState)>;

/// Result of one stuck-recovery bounce.
struct Bounce {
    moved: bool,
    anchor: FocusPoint,
}

impl ExhaustiveScroller {
    pub fn new(
        probe: Arc<dyn DomProbe>,
        input: Arc<dyn InputGateway>,
        pacing: Arc<BehavioralEngine>,
        journal: Arc<OpsJournal>,
    ) -> Self {
        Self {
            probe,
            input,
            pacing,
            journal,
            tuning: ScrollTuning::default(),
        }
    }

    pub fn with_tuning(mut self, tuning: ScrollTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn journal(&self) -> &Arc<OpsJournal> {
        &self.journal
    }

    /// Scroll the comment list until an end marker shows, recovery gives up,
    /// or the round budget runs out.
    ///
    /// The only error is a policy violation, returned as soon as it is seen
    /// with the page left exactly as it was.
    pub async fn run(&self, options: &ScrollOptions, hooks: ScrollHooks<'_>) -> Result<ScrollResult> {
        let run_id = self.journal.next_seq();
        info!(
            target: "harvest.start",
            run_id,
            profile = %options.target.profile,
            url = options.target.url.as_deref().unwrap_or(""),
            "harvest starting"
        );

        // Initial focus.
        let mut viewport = self.probe.viewport().await.unwrap_or(FALLBACK_VIEWPORT);
        let mut focus = self.initial_focus(options, &viewport).await;
        self.tolerate("hover", self.input.hover(focus).await)?;
        if self.probe.is_input_focused().await {
            debug!(target: "harvest.start", "input focused; clicking to defocus");
            self.tolerate("defocus", self.input.click(focus, InteractionContext::Scroll).await)?;
        }

        // Initial probe and activation of a collapsed section.
        let mut stats = self.probe.comment_stats().await;
        let mut total = stats.total;
        if stats.count == 0 {
            if stats.total_positive().is_some() {
                if let Some(hook) = hooks.activate {
                    self.activate(hook, ActivationReason::CountZeroButTotalPositive).await;
                    stats = self.probe.comment_stats().await;
                    total = stats.total.or(total);
                }
            } else if !stats.has_more && !self.probe.comment_end_state().await.any() {
                if let Some(hook) = hooks.activate {
                    self.activate(hook, ActivationReason::CountZeroTotalNullOrZero).await;
                    stats = self.probe.comment_stats().await;
                    total = stats.total.or(total);
                    if stats.count == 0 && self.probe.comment_end_state().await.any() {
                        return Ok(self.finish(run_id, "activated_empty", true, false, total, 0, 0, focus));
                    }
                }
            }
        }

        // Nothing mounted and nothing announced: only a marker may end it here.
        if stats.count == 0
            && stats.total_unknown_or_zero()
            && !stats.has_more
            && self.probe.comment_end_state().await.any()
        {
            return Ok(self.finish(run_id, "empty_before_loop", true, false, total, stats.count, 0, focus));
        }

        let budget = dynamic_max_rounds(options.max_rounds, total);
        info!(target: "harvest.start", run_id, budget, count = stats.count, total = ?total, "entering round loop");

        let mut last_count = stats.count;
        let mut no_effect_streak = 0u32;
        let mut bounce_failures = 0u32;
        let mut rounds = 0u32;

        for i in 0..budget {
            rounds = i + 1;
            let first_before = self.probe.viewport_first_comment().await;

            if let Some(v) = self.probe.viewport().await {
                viewport = v;
            }
            let info = self.probe.scroll_container_info().await;
            focus = self.round_focus(info.as_ref().and_then(|c| c.point()), &viewport, focus).await;
            self.tolerate("hover", self.input.hover(focus).await)?;
            let geometry_before = match info {
                Some(info) => Some((Measured::Container, info.state)),
                None => self.geometry(options).await,
            };

            if let Some(hook) = hooks.expand {
                let ctx = ExpandContext { round: i, focus_point: focus };
                if let Err(e) = hook.expand(ctx).await {
                    if e.is_policy_violation() {
                        self.journal.record("harvest.abort", e.to_string());
                        return Err(e);
                    }
                    warn!(target: "harvest.round", round = i, error = %e, "expand hook failed");
                }
            }

            let delta = self.pacing.sample(self.tuning.wheel) as i64;
            let wheeled = self.wheel(delta, focus).await?;
            self.pacing.random_delay(self.tuning.settle).await;

            let after = self.probe.comment_stats().await;
            total = after.total.or(total);
            let first_after = self.probe.viewport_first_comment().await;
            let geometry_after = self.geometry(options).await;

            let scrolled = wheeled && self.top_moved(geometry_before, geometry_after, true);
            let first_changed = first_comment_changed(first_before.as_ref(), first_after.as_ref());
            if !scrolled && !first_changed && after.count <= last_count {
                no_effect_streak += 1;
            } else {
                no_effect_streak = 0;
            }
            debug!(
                target: "harvest.round",
                round = i,
                delta,
                scrolled,
                first_changed,
                count = after.count,
                has_more = after.has_more,
                no_effect_streak,
                "round"
            );
            self.journal.record(
                "harvest.round",
                format!("round={i} scrolled={scrolled} first_changed={first_changed} count={}", after.count),
            );

            if no_effect_streak >= self.tuning.no_effect_threshold {
                no_effect_streak = 0;
                let bounce = self.bounce(options, focus).await?;
                focus = bounce.anchor;
                if bounce.moved {
                    bounce_failures = 0;
                } else {
                    bounce_failures += 1;
                    warn!(target: "harvest.stuck", round = i, failures = bounce_failures, "bounce had no effect");
                    if bounce_failures >= self.tuning.max_bounce_failures {
                        return Ok(self.finish(run_id, "stuck", true, true, total, after.count, i + 1, focus));
                    }
                }
            }

            last_count = after.count;

            if self.probe.comment_end_state().await.any() {
                info!(target: "harvest.round", round = i, "end marker visible");
                break;
            }
        }

        let final_stats: CommentStats = self.probe.comment_stats().await;
        let end = self.probe.comment_end_state().await;
        let total = final_stats.total.or(total);
        let reason = if end.any() { "marker" } else { "budget" };
        Ok(self.finish(run_id, reason, end.any(), false, total, final_stats.count, rounds, focus))
    }

    async fn initial_focus(&self, options: &ScrollOptions, viewport: &Viewport) -> FocusPoint {
        if let Some(p) = self.probe.locate_comments_focus_point().await {
            return p;
        }
        options
            .seed_rect
            .as_ref()
            .and_then(|rect| compute_visible_focus_point(rect, viewport))
            .unwrap_or_else(|| viewport.center())
    }

    /// Container point, else the comment root, else the previous point; always clamped.
    async fn round_focus(
        &self,
        container_point: Option<FocusPoint>,
        viewport: &Viewport,
        previous: FocusPoint,
    ) -> FocusPoint {
        let point = match container_point {
            Some(p) => p,
            None => self
                .probe
                .locate_comments_focus_point()
                .await
                .unwrap_or(previous),
        };
        clamp_to_safe_band(point, viewport, self.tuning.band)
    }

    /// Container geometry, falling back to the defensive scroll-stats probe.
    async fn geometry(&self, options: &ScrollOptions) -> Geometry {
        match self.probe.scroll_container_state().await {
            Some(state) => Some((Measured::Container, state)),
            None => self
                .probe
                .scroll_stats(&options.root_selectors)
                .await
                .map(|s| (Measured::Fallback(s.source), s.as_container_state())),
        }
    }

    fn top_moved(&self, before: Geometry, after: Geometry, require_scrollable: bool) -> bool {
        match (before, after) {
            (Some((from, b)), Some((to, a))) if from == to => {
                if require_scrollable && !a.is_scrollable(self.tuning.min_scrollable) {
                    return false;
                }
                (a.scroll_top - b.scroll_top).abs() > self.tuning.scroll_epsilon
            }
            _ => false,
        }
    }

    /// `Ok(true)` if the wheel was delivered; non-policy failures are logged.
    async fn wheel(&self, delta: i64, focus: FocusPoint) -> Result<bool> {
        let outcome = self
            .input
            .wheel(delta, Some(focus), InteractionContext::Scroll)
            .await;
        self.tolerate("wheel", outcome)
    }

    fn tolerate(&self, step: &'static str, outcome: Result<()>) -> Result<bool> {
        match outcome {
            Ok(()) => Ok(true),
            Err(e) if e.is_policy_violation() => {
                self.journal.record("harvest.abort", e.to_string());
                Err(e)
            }
            Err(e) => {
                warn!(target: "harvest.round", step, error = %e, "action failed; continuing");
                Ok(false)
            }
        }
    }

    async fn activate(&self, hook: &dyn ActivateComments, reason: ActivationReason) {
        info!(target: "harvest.start", reason = reason.tag(), "activating comment section");
        self.journal.record("harvest.activate", reason.tag());
        if let Err(e) = hook.activate(reason).await {
            warn!(target: "harvest.start", reason = reason.tag(), error = %e, "activation failed");
        }
    }

    async fn bounce(&self, options: &ScrollOptions, last_focus: FocusPoint) -> Result<Bounce> {
        let top_before = self.geometry(options).await;
        let first_before = self.probe.viewport_first_comment().await;

        let anchor = self
            .probe
            .locate_comments_focus_point()
            .await
            .unwrap_or(last_focus);
        self.tolerate("hover", self.input.hover(anchor).await)?;
        self.tolerate("click", self.input.click(anchor, InteractionContext::Scroll).await)?;

        for _ in 0..self.tuning.bounce_up_times {
            let delta = self.pacing.sample(self.tuning.bounce_up) as i64;
            self.wheel(-delta, anchor).await?;
            self.pacing.random_delay(self.tuning.bounce_up_wait).await;
        }
        for _ in 0..self.tuning.bounce_down_times {
            let delta = self.pacing.sample(self.tuning.bounce_down) as i64;
            self.wheel(delta, anchor).await?;
            self.pacing.random_delay(self.tuning.bounce_down_wait).await;
        }

        let top_after = self.geometry(options).await;
        let first_after = self.probe.viewport_first_comment().await;
        let top_moved = self.top_moved(top_before, top_after, false);
        let first_moved = first_comment_changed(first_before.as_ref(), first_after.as_ref());
        debug!(target: "harvest.stuck", top_moved, first_moved, "bounce finished");
        self.journal.record(
            "harvest.bounce",
            format!("top_moved={top_moved} first_moved={first_moved}"),
        );
        Ok(Bounce {
            moved: top_moved || first_moved,
            anchor,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        run_id: u64,
        reason: &'static str,
        reached_end: bool,
        ended_by_stuck: bool,
        total_from_header: Option<u64>,
        final_count: u64,
        rounds: u32,
        focus_point: FocusPoint,
    ) -> ScrollResult {
        info!(
            target: "harvest.end",
            run_id,
            reason,
            reached_end,
            ended_by_stuck,
            final_count,
            rounds,
            "harvest finished"
        );
        self.journal.record(
            "harvest.end",
            format!("run={run_id} reason={reason} reached_end={reached_end} rounds={rounds} count={final_count}"),
        );
        ScrollResult {
            reached_end,
            ended_by_stuck,
            total_from_header,
            final_count,
            rounds,
            focus_point,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_prefers_explicit_positive_bound() {
        assert_eq!(dynamic_max_rounds(Some(12), None), 12);
        assert_eq!(dynamic_max_rounds(Some(0), None), DEFAULT_ROUNDS);
    }

    #[test]
    fn budget_scales_with_total_within_limits() {
        assert_eq!(dynamic_max_rounds(None, Some(60)), 36);
        assert_eq!(dynamic_max_rounds(None, Some(1000)), 500);
        assert_eq!(dynamic_max_rounds(None, Some(1001)), 501);
        assert_eq!(dynamic_max_rounds(None, Some(5_000_000)), MAX_ROUNDS);
        assert_eq!(dynamic_max_rounds(None, Some(0)), DEFAULT_ROUNDS);
        assert_eq!(dynamic_max_rounds(None, None), DEFAULT_ROUNDS);
    }

    #[test]
    fn result_serialises_camel_case() {
        let r = ScrollResult {
            reached_end: true,
            ended_by_stuck: false,
            total_from_header: Some(3),
            final_count: 3,
            rounds: 1,
            focus_point: FocusPoint::new(1.0, 2.0),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["reachedEnd"], true);
        assert_eq!(v["endedByStuck"], false);
        assert_eq!(v["totalFromHeader"], 3);
        assert_eq!(v["focusPoint"]["x"], 1.0);
    }
}
