//! System sleep lifecycle events

use serde::{Deserialize, Serialize};
use std::fmt;

/// A sleep lifecycle notification delivered by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepEvent {
    SuspendPrepare,
    HibernationPrepare,
    PostSuspend,
    PostHibernation,
    PostRestore,
    RestorePrepare,
    #[serde(other)]
    Unknown,
}

/// The event classes the suspend coordinator acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepPhase {
    /// Suspend-to-RAM or hibernation is about to start
    PrepareSleep,
    /// The system came back from suspend, hibernation or an image restore
    PostResume,
    /// A saved hibernation image is about to be restored
    RestorePrepare,
    Other,
}

impl SleepEvent {
    pub fn phase(&self) -> SleepPhase {
        match self {
            SleepEvent::SuspendPrepare | SleepEvent::HibernationPrepare => SleepPhase::PrepareSleep,
            SleepEvent::PostSuspend | SleepEvent::PostHibernation | SleepEvent::PostRestore => {
                SleepPhase::PostResume
            }
            SleepEvent::RestorePrepare => SleepPhase::RestorePrepare,
            SleepEvent::Unknown => SleepPhase::Other,
        }
    }

    /// Map the arguments systemd-sleep passes to its hooks
    ///
    /// `phase` is `pre` or `post`; `kind` is the sleep verb such as
    /// `suspend` or `hibernate`. Returns `None` for anything unrecognized.
    pub fn from_systemd(phase: &str, kind: &str) -> Option<Self> {
        let hibernating = match kind {
            "suspend" => false,
            "hibernate" | "hybrid-sleep" | "suspend-then-hibernate" => true,
            _ => return None,
        };

        match (phase, hibernating) {
            ("pre", false) => Some(SleepEvent::SuspendPrepare),
            ("pre", true) => Some(SleepEvent::HibernationPrepare),
            ("post", false) => Some(SleepEvent::PostSuspend),
            ("post", true) => Some(SleepEvent::PostHibernation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SleepEvent::SuspendPrepare => "suspend_prepare",
            SleepEvent::HibernationPrepare => "hibernation_prepare",
            SleepEvent::PostSuspend => "post_suspend",
            SleepEvent::PostHibernation => "post_hibernation",
            SleepEvent::PostRestore => "post_restore",
            SleepEvent::RestorePrepare => "restore_prepare",
            SleepEvent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SleepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
