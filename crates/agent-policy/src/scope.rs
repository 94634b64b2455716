use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::CapabilityClass;

/// How much the companion may do without asking. Ordinal 0-3; the gate only
/// ever compares levels, it never writes them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Level 0: every action is confirmed, even safe ones.
    #[default]
    Supervised,
    /// Level 1: safe actions run unprompted.
    Guided,
    /// Level 2: cautious actions run unprompted inside an active scope.
    Trusted,
    /// Level 3: reserved headroom above Trusted; dangerous still confirms.
    Autonomous,
}

impl AutonomyLevel {
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Supervised => 0,
            Self::Guided => 1,
            Self::Trusted => 2,
            Self::Autonomous => 3,
        }
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Supervised),
            1 => Some(Self::Guided),
            2 => Some(Self::Trusted),
            3 => Some(Self::Autonomous),
            _ => None,
        }
    }

    pub fn all() -> [AutonomyLevel; 4] {
        [
            Self::Supervised,
            Self::Guided,
            Self::Trusted,
            Self::Autonomous,
        ]
    }
}

/// A user-pre-approved (capability, path) pair, e.g. "manage files under
/// ~/Downloads". Scopes are additive and never implicitly widened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub capability: CapabilityClass,
    pub root: PathBuf,
}

impl Scope {
    pub fn new(capability: CapabilityClass, root: impl Into<PathBuf>) -> Self {
        Self {
            capability,
            root: normalize_path(&root.into()),
        }
    }

    /// Exact-prefix match on normalized paths, component-wise so that
    /// `/a/bar` never covers `/a/barbecue`. No wildcards, no fuzz.
    pub fn covers(&self, capability: CapabilityClass, target: &Path) -> bool {
        capability == self.capability && normalize_path(target).starts_with(&self.root)
    }
}

/// Lexically normalize a path: drop `.` components and collapse `..` against
/// the preceding component. A `..` that would escape the path root is kept,
/// which leaves the traversal visible to sanitation instead of hiding it.
/// Symlinks are resolved by the settings layer before paths reach the gate,
/// keeping this function free of I/O.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(AutonomyLevel::Supervised < AutonomyLevel::Guided);
        assert!(AutonomyLevel::Guided < AutonomyLevel::Trusted);
        assert!(AutonomyLevel::Trusted < AutonomyLevel::Autonomous);
        assert_eq!(AutonomyLevel::from_ordinal(2), Some(AutonomyLevel::Trusted));
        assert_eq!(AutonomyLevel::from_ordinal(4), None);
    }

    #[test]
    fn scope_matches_exact_prefix_only() {
        let scope = Scope::new(CapabilityClass::FileManagement, "/home/sam/Downloads");
        assert!(scope.covers(
            CapabilityClass::FileManagement,
            Path::new("/home/sam/Downloads/report.pdf"),
        ));
        assert!(scope.covers(
            CapabilityClass::FileManagement,
            Path::new("/home/sam/Downloads/sub/./archive.zip"),
        ));
        assert!(!scope.covers(
            CapabilityClass::FileManagement,
            Path::new("/home/sam/Downloads-old/report.pdf"),
        ));
        assert!(!scope.covers(
            CapabilityClass::FileManagement,
            Path::new("/home/sam/Documents/report.pdf"),
        ));
    }

    #[test]
    fn scope_never_widens_across_capabilities() {
        let scope = Scope::new(CapabilityClass::FileManagement, "/home/sam");
        assert!(!scope.covers(CapabilityClass::ScreenCapture, Path::new("/home/sam/x")));
    }

    #[test]
    fn normalization_collapses_dots_but_keeps_escapes() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
    }
}
