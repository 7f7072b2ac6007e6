//! Per-direction copy policy of a reference.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PolicySetting;

/// Controls whether a reference is followed during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyPolicy {
    /// Follow the reference on the first run, fetching the target if needed.
    Always,

    /// Never follow; a linked value is reported as unsatisfied unless the
    /// target is present anyway.
    Never,

    /// Deferred: resolved on the second run, only against objects that are
    /// already part of the copy. Never fetches.
    Ask,
}

impl CopyPolicy {
    /// Map a configured setting: `false` is NEVER, `ask` is ASK, anything
    /// else (including an absent setting) is ALWAYS.
    pub fn from_setting(setting: Option<&PolicySetting>) -> Self {
        match setting {
            Some(PolicySetting::Flag(false)) => CopyPolicy::Never,
            Some(PolicySetting::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "false" | "never" => CopyPolicy::Never,
                "ask" => CopyPolicy::Ask,
                _ => CopyPolicy::Always,
            },
            _ => CopyPolicy::Always,
        }
    }

    pub fn is_always(self) -> bool {
        self == CopyPolicy::Always
    }
}

impl fmt::Display for CopyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyPolicy::Always => write!(f, "ALWAYS"),
            CopyPolicy::Never => write!(f, "NEVER"),
            CopyPolicy::Ask => write!(f, "ASK"),
        }
    }
}
