//! Exhaustive comment harvesting.
//!
//! [`controller::ExhaustiveScroller`] drives a virtualized comment list to its
//! end using only the probes and pointer actions exposed by `comb-drivers`.
//! Callers customise a run through the hook traits in [`hooks`]; the stock
//! implementations are [`expander::ReplyExpansionHook`] and
//! [`activation::CommentEntryActivator`].
pub mod activation;
pub mod controller;
pub mod expander;
pub mod hooks;

pub use controller::{dynamic_max_rounds, ExhaustiveScroller, HarvestTarget, ScrollOptions, ScrollResult};
pub use hooks::{ActivateComments, ActivationReason, ExpandContext, ExpandHook, ScrollHooks};
