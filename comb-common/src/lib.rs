//! Common types and utilities shared across Comb crates.
//!
//! This crate defines the shared error type, the policy-violation taxonomy,
//! and observability helpers used throughout the Comb workspace. It is kept
//! lightweight so that every crate can depend on it without pulling in the
//! HTTP or browser stacks.
//!
//! # Overview
//!
//! - [`CombError`] and [`Result`]: shared error handling
//! - [`PolicyKind`]: the anti-bot / unsafe-click conditions that abort a run
//! - [`observability`]: tracing initialisation and the [`observability::OpsJournal`]
//!
//! # Examples
//!
//! ```rust
//! use comb_common::{CombError, PolicyKind};
//!
//! let err = CombError::policy(PolicyKind::Captcha, "verification overlay present");
//! assert!(err.is_policy_violation());
//! assert_eq!(err.policy_kind(), Some(PolicyKind::Captcha));
//! assert!(err.to_string().contains("captcha_visible"));
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod observability;

/// Conditions that must abort a harvest immediately.
///
/// The string tags (see [`PolicyKind::tag`]) are what operators grep for in
/// logs, so they are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// A captcha / verification overlay is present on the page.
    Captcha,
    /// A media viewer or lightbox is open while acting in a risk-sensitive context.
    MediaViewerOpen,
    /// The click target resolves to a profile, external or search-result link.
    UnsafeLink,
    /// The click target is an image or video element.
    UnsafeMedia,
}

impl PolicyKind {
    pub fn tag(&self) -> &'static str {
        match self {
            PolicyKind::Captcha => "captcha_visible",
            PolicyKind::MediaViewerOpen => "media_viewer_open",
            PolicyKind::UnsafeLink => "unsafe_click_link",
            PolicyKind::UnsafeMedia => "unsafe_click_media",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Error types used across the Comb system.
#[derive(thiserror::Error, Debug)]
pub enum CombError {
    /// Anti-bot defence detected or unsafe click target. Never swallowed.
    #[error("policy violation [{kind}]: {detail}")]
    PolicyViolation { kind: PolicyKind, detail: String },

    /// The command endpoint or socket could not be reached or refused the request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The page script ran but reported a failure.
    #[error("Script error: {0}")]
    Script(String),

    /// A response could not be decoded into the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A caller-supplied hook failed.
    #[error("Hook error: {0}")]
    Hook(String),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation exceeded its timeout.
    #[error("Timeout occurred: {0}")]
    Timeout(String),

    /// Anything else a driver reported.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),
}

impl CombError {
    pub fn policy(kind: PolicyKind, detail: impl Into<String>) -> Self {
        CombError::PolicyViolation {
            kind,
            detail: detail.into(),
        }
    }

    /// Whether this error must cancel the whole run.
    ///
    /// Errors smuggled through `anyhow` (for example from a caller hook) are
    /// inspected as well, so the tag survives one level of wrapping.
    pub fn is_policy_violation(&self) -> bool {
        self.policy_kind().is_some()
    }

    pub fn policy_kind(&self) -> Option<PolicyKind> {
        match self {
            CombError::PolicyViolation { kind, .. } => Some(*kind),
            CombError::Driver(inner) => inner
                .downcast_ref::<CombError>()
                .and_then(CombError::policy_kind),
            _ => None,
        }
    }
}

/// Convenient alias for results that use [`CombError`].
pub type Result<T> = std::result::Result<T, CombError>;
