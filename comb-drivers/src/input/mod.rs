//! OS-level pointer input with pre-click safety checks.
use async_trait::async_trait;
use comb_common::Result;
use serde::{Deserialize, Serialize};

use crate::page::geometry::FocusPoint;

pub mod gateway;
pub mod guard;
pub mod socket;

/// Why an action is being performed. Everything except [`Generic`](Self::Generic)
/// is risk-sensitive: it happens over the comment list, where a misplaced
/// click opens a profile, a search page or a media viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionContext {
    Scroll,
    CommentFocus,
    ReplyExpand,
    Generic,
}

impl InteractionContext {
    pub fn label(&self) -> &'static str {
        match self {
            InteractionContext::Scroll => "scroll",
            InteractionContext::CommentFocus => "comment_focus",
            InteractionContext::ReplyExpand => "reply_expand",
            InteractionContext::Generic => "generic",
        }
    }

    pub fn is_risk_sensitive(&self) -> bool {
        !matches!(self, InteractionContext::Generic)
    }
}

/// Real pointer events delivered by an input-injection service.
///
/// Implementations return [`comb_common::CombError::PolicyViolation`] when an
/// action would be unsafe; callers must let that error through.
#[async_trait]
pub trait InputGateway: Send + Sync {
    async fn hover(&self, point: FocusPoint) -> Result<()>;
    async fn click(&self, point: FocusPoint, context: InteractionContext) -> Result<()>;
    /// Positive `delta_y` scrolls down. The pointer is moved to `focus` first
    /// when given, since the wheel targets whatever is under the cursor.
    async fn wheel(
        &self,
        delta_y: i64,
        focus: Option<FocusPoint>,
        context: InteractionContext,
    ) -> Result<()>;
}
