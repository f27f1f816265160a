use async_trait::async_trait;
use comb_common::Result;
use comb_drivers::behavioral::{BehavioralEngine, Span};
use comb_drivers::input::{InputGateway, InteractionContext};
use comb_drivers::page::exec::{run_script, ScriptExecutor};
use comb_drivers::page::geometry::FocusPoint;
use comb_drivers::page::scripts;
use comb_drivers::page::selectors::CommentSelectors;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::hooks::{ExpandContext, ExpandHook};

pub const DEFAULT_MAX_TARGETS: usize = 2;
/// Smallest width and height, in px, of a clickable affordance.
pub const MIN_TARGET_SIZE: f64 = 8.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpandTarget {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub text: String,
}

impl ExpandTarget {
    pub fn point(&self) -> FocusPoint {
        FocusPoint::new(self.x, self.y)
    }
}

/// One scan. The counters are for logs: `all` matches, `visible` ones in the
/// viewport, and `candidates` among those not handed out before.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExpanderScan {
    pub targets: Vec<ExpandTarget>,
    pub visible: u32,
    pub candidates: u32,
    pub all: u32,
}

/// Finds "show more replies" affordances. Each affordance is marked on the
/// page when returned, so it is handed out at most once.
pub struct ReplyExpander {
    exec: Arc<dyn ScriptExecutor>,
    selectors: CommentSelectors,
    min_size: f64,
}

impl ReplyExpander {
    pub fn new(exec: Arc<dyn ScriptExecutor>, selectors: CommentSelectors) -> Self {
        Self {
            exec,
            selectors,
            min_size: MIN_TARGET_SIZE,
        }
    }

    /// Up to `max` targets; an empty scan if the probe fails.
    pub async fn scan(&self, max: usize) -> ExpanderScan {
        let script = scripts::reply_expanders(&self.selectors, max, self.min_size);
        match run_script::<Option<ExpanderScan>>(self.exec.as_ref(), &script).await {
            Ok(scan) => scan.unwrap_or_default(),
            Err(e) => {
                warn!(target: "probe.script", probe = "reply_expanders", error = %e, "probe failed; using default");
                ExpanderScan::default()
            }
        }
    }
}

/// [`ExpandHook`] that clicks the affordances found by a [`ReplyExpander`]
/// and then puts the pointer back on the scroll focus point.
pub struct ReplyExpansionHook {
    expander: ReplyExpander,
    input: Arc<dyn InputGateway>,
    pacing: Arc<BehavioralEngine>,
    max_clicks: usize,
    pause: Span,
}

impl ReplyExpansionHook {
    pub fn new(expander: ReplyExpander, input: Arc<dyn InputGateway>, pacing: Arc<BehavioralEngine>) -> Self {
        Self {
            expander,
            input,
            pacing,
            max_clicks: DEFAULT_MAX_TARGETS,
            pause: Span::new(350, 800),
        }
    }

    pub fn with_max_clicks(mut self, max_clicks: usize) -> Self {
        self.max_clicks = max_clicks;
        self
    }
}

#[async_trait]
impl ExpandHook for ReplyExpansionHook {
    async fn expand(&self, ctx: ExpandContext) -> Result<()> {
        if self.max_clicks == 0 {
            return Ok(());
        }
        let scan = self.expander.scan(self.max_clicks).await;
        debug!(
            target: "harvest.expand",
            round = ctx.round,
            targets = scan.targets.len(),
            visible = scan.visible,
            candidates = scan.candidates,
            all = scan.all,
            "reply expander scan"
        );
        if scan.targets.is_empty() {
            return Ok(());
        }
        for target in &scan.targets {
            self.input
                .click(target.point(), InteractionContext::ReplyExpand)
                .await?;
            self.pacing.random_delay(self.pause).await;
        }
        self.input.hover(ctx.focus_point).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scan_decodes_with_missing_counters() {
        let scan: ExpanderScan = serde_json::from_value(json!({
            "targets": [{"x": 10, "y": 20, "text": "展开 3 条回复"}],
            "visible": 1
        }))
        .unwrap();
        assert_eq!(scan.targets[0].point(), FocusPoint::new(10.0, 20.0));
        assert_eq!(scan.candidates, 0);
        assert_eq!(scan.visible, 1);
    }
}
