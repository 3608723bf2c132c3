use std::fmt;
use std::path::PathBuf;

use crate::hierarchy::HierarchyError;
use crate::relations::RelationError;
use crate::store::StoreError;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    UnitNotFound,
    CategoryNotFound,
    RelationshipNotFound,
    CycleDetected,
    DuplicateEdge,
    SelfReference,
    WouldEmptyParentSet,
    UnitHasChildren,
    TenantMismatch,
    StaleEdgeSet,
    CorruptDatabase,
    DatabaseWriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::UnitNotFound => "E2001",
            Self::CategoryNotFound => "E2002",
            Self::RelationshipNotFound => "E2003",
            Self::CycleDetected => "E2004",
            Self::DuplicateEdge => "E2005",
            Self::SelfReference => "E2006",
            Self::WouldEmptyParentSet => "E2007",
            Self::UnitHasChildren => "E2008",
            Self::TenantMismatch => "E2009",
            Self::StaleEdgeSet => "E3001",
            Self::CorruptDatabase => "E3002",
            Self::DatabaseWriteFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::UnitNotFound => "Org unit not found",
            Self::CategoryNotFound => "Category not found",
            Self::RelationshipNotFound => "Relationship no longer exists",
            Self::CycleDetected => "Cycle would be created",
            Self::DuplicateEdge => "Relationship already exists",
            Self::SelfReference => "Category cannot be its own parent",
            Self::WouldEmptyParentSet => "Cannot remove the only parent",
            Self::UnitHasChildren => "Org unit still has children",
            Self::TenantMismatch => "Parent belongs to another tenant",
            Self::StaleEdgeSet => "Parent set changed since it was read",
            Self::CorruptDatabase => "Corrupt SQLite database",
            Self::DatabaseWriteFailed => "Database write failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `strata init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .strata/config.toml and retry."),
            Self::UnitNotFound | Self::CategoryNotFound => None,
            Self::RelationshipNotFound | Self::StaleEdgeSet => Some(
                "Re-read the current parents with `strata category parents <child>` and retry.",
            ),
            Self::CycleDetected => Some("Pick a parent that is not a descendant of the child."),
            Self::DuplicateEdge => {
                Some("The relationship already exists; promote it instead of adding it again.")
            }
            Self::SelfReference => Some("Choose a different parent category."),
            Self::WouldEmptyParentSet => {
                Some("Attach another parent first, or detach the category explicitly.")
            }
            Self::UnitHasChildren => Some("Move or delete the child units first."),
            Self::TenantMismatch => {
                Some("Parent a tenant unit under a shared template or a unit of the same tenant.")
            }
            Self::CorruptDatabase => Some("Restore .strata/strata.db from a backup."),
            Self::DatabaseWriteFailed => Some("Check disk space and write permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Top-level error for callers that drive the whole engine (the CLI).
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    #[error("project not initialized: {} does not exist", path.display())]
    NotInitialized { path: PathBuf },

    #[error("config error: {0:#}")]
    Config(anyhow::Error),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Relation(#[from] RelationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StrataError {
    /// Machine-readable code for this error.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::Config(_) => ErrorCode::ConfigParseError,
            Self::Hierarchy(e) => e.code(),
            Self::Relation(e) => e.code(),
            Self::Store(e) => e.code(),
        }
    }

    /// Remediation text, falling back to the generic code message.
    #[must_use]
    pub fn suggestion(&self) -> String {
        let code = self.error_code();
        code.hint().unwrap_or_else(|| code.message()).to_string()
    }
}
