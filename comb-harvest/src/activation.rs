use async_trait::async_trait;
use comb_common::{CombError, Result};
use comb_drivers::behavioral::{BehavioralEngine, Span};
use comb_drivers::input::{InputGateway, InteractionContext};
use comb_drivers::page::exec::{run_script, ScriptExecutor};
use comb_drivers::page::geometry::FocusPoint;
use comb_drivers::page::scripts;
use comb_drivers::page::selectors::CommentSelectors;
use std::sync::Arc;
use tracing::info;

use crate::hooks::{ActivateComments, ActivationReason};

/// Opens the comment panel by clicking its entry affordance (the comment
/// button or counter), then waits for the list to mount.
pub struct CommentEntryActivator {
    exec: Arc<dyn ScriptExecutor>,
    selectors: CommentSelectors,
    input: Arc<dyn InputGateway>,
    pacing: Arc<BehavioralEngine>,
    settle: Span,
}

impl CommentEntryActivator {
    pub fn new(
        exec: Arc<dyn ScriptExecutor>,
        selectors: CommentSelectors,
        input: Arc<dyn InputGateway>,
        pacing: Arc<BehavioralEngine>,
    ) -> Self {
        Self {
            exec,
            selectors,
            input,
            pacing,
            settle: Span::new(900, 1600),
        }
    }
}

#[async_trait]
impl ActivateComments for CommentEntryActivator {
    async fn activate(&self, reason: ActivationReason) -> Result<()> {
        let script = scripts::locate_comment_entry(&self.selectors);
        let entry: Option<FocusPoint> = run_script(self.exec.as_ref(), &script).await?;
        let Some(point) = entry else {
            return Err(CombError::Hook(format!("no comment entry visible ({reason})")));
        };
        info!(target: "harvest.activate", %reason, x = point.x, y = point.y, "clicking comment entry");
        self.input.click(point, InteractionContext::CommentFocus).await?;
        self.pacing.random_delay(self.settle).await;
        Ok(())
    }
}
