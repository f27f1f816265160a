use async_trait::async_trait;
use comb_common::Result;
use comb_drivers::page::geometry::FocusPoint;
use serde::Serialize;
use std::fmt;

/// Why the comment section looked collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationReason {
    /// No items are mounted although the header announces comments.
    CountZeroButTotalPositive,
    /// No items, no usable total, and no end or empty marker either.
    CountZeroTotalNullOrZero,
}

impl ActivationReason {
    pub fn tag(&self) -> &'static str {
        match self {
            ActivationReason::CountZeroButTotalPositive => "count_zero_but_total_positive",
            ActivationReason::CountZeroTotalNullOrZero => "count_zero_total_null_or_zero",
        }
    }
}

impl fmt::Display for ActivationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Opens a collapsed comment section. Errors are logged by the controller and
/// never end the run.
#[async_trait]
pub trait ActivateComments: Send + Sync {
    async fn activate(&self, reason: ActivationReason) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpandContext {
    /// Zero-based round index.
    pub round: u32,
    /// Where the scroll pointer rests this round; restore it after clicking.
    pub focus_point: FocusPoint,
}

/// Called once per round before the wheel event. Policy violations abort
/// the run; other errors are logged.
#[async_trait]
pub trait ExpandHook: Send + Sync {
    async fn expand(&self, ctx: ExpandContext) -> Result<()>;
}

#[derive(Clone, Copy, Default)]
pub struct ScrollHooks<'a> {
    pub activate: Option<&'a dyn ActivateComments>,
    pub expand: Option<&'a dyn ExpandHook>,
}

impl<'a> ScrollHooks<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_activate(mut self, hook: &'a dyn ActivateComments) -> Self {
        self.activate = Some(hook);
        self
    }

    pub fn with_expand(mut self, hook: &'a dyn ExpandHook) -> Self {
        self.expand = Some(hook);
        self
    }
}
