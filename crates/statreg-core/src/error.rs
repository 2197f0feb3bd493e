use std::fmt;

use crate::model::{ClassificationTree, UnitRef, UnitType};

/// Machine-readable error codes for scripts and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    UnitNotFound,
    InvalidLinkType,
    LinkAlreadyExists,
    LinkNotExists,
    FieldAccessDenied,
    InvalidEnumValue,
    ExclusiveParents,
    ConcurrentModification,
    GraphTooDeep,
    ClassificationNodeNotFound,
    LevelOutOfRange,
    ClassificationCycle,
    ClassificationTooDeep,
    DatabaseError,
    InternalUnexpected,
}

impl ErrorCode {
    pub const ALL: [Self; 17] = [
        Self::NotInitialized,
        Self::ConfigParseError,
        Self::UnitNotFound,
        Self::InvalidLinkType,
        Self::LinkAlreadyExists,
        Self::LinkNotExists,
        Self::FieldAccessDenied,
        Self::InvalidEnumValue,
        Self::ExclusiveParents,
        Self::ConcurrentModification,
        Self::GraphTooDeep,
        Self::ClassificationNodeNotFound,
        Self::LevelOutOfRange,
        Self::ClassificationCycle,
        Self::ClassificationTooDeep,
        Self::DatabaseError,
        Self::InternalUnexpected,
    ];

    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::UnitNotFound => "E2001",
            Self::InvalidLinkType => "E2002",
            Self::LinkAlreadyExists => "E2003",
            Self::LinkNotExists => "E2004",
            Self::FieldAccessDenied => "E2005",
            Self::InvalidEnumValue => "E2006",
            Self::ExclusiveParents => "E2007",
            Self::ConcurrentModification => "E3001",
            Self::GraphTooDeep => "E3002",
            Self::ClassificationNodeNotFound => "E4001",
            Self::LevelOutOfRange => "E4002",
            Self::ClassificationCycle => "E4003",
            Self::ClassificationTooDeep => "E4004",
            Self::DatabaseError => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Register not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::UnitNotFound => "Unit not found",
            Self::InvalidLinkType => "No hierarchy edge between these unit types",
            Self::LinkAlreadyExists => "Link already exists",
            Self::LinkNotExists => "Link does not exist",
            Self::FieldAccessDenied => "Field is not writable by this user",
            Self::InvalidEnumValue => "Invalid unit type/tree/field value",
            Self::ExclusiveParents => "Unit may have only one of these parents",
            Self::ConcurrentModification => "Unit was modified concurrently",
            Self::GraphTooDeep => "Hierarchy exceeds the hop limit",
            Self::ClassificationNodeNotFound => "Classification node not found",
            Self::LevelOutOfRange => "Requested level is deeper than the node",
            Self::ClassificationCycle => "Classification tree contains a cycle",
            Self::ClassificationTooDeep => "Classification tree exceeds the depth bound",
            Self::DatabaseError => "Database error",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `sreg init` to create the register database."),
            Self::ConfigParseError => Some("Fix syntax in config.toml next to the database and retry."),
            Self::UnitNotFound | Self::ClassificationNodeNotFound => None,
            Self::InvalidLinkType => Some(
                "Valid links: local->legal, local->enterprise, legal->enterprise, legal->group, enterprise->group.",
            ),
            Self::LinkAlreadyExists => Some("Nothing to do; the child already points at this parent."),
            Self::LinkNotExists => Some("Check `sreg link list` for the child's current parents."),
            Self::FieldAccessDenied => Some("Ask an administrator to grant write access to the field."),
            Self::InvalidEnumValue => {
                Some("Use one of the documented unit types, trees or node fields.")
            }
            Self::ExclusiveParents => Some(
                "Give a legal unit either an enterprise or an enterprise group; `sreg link create` swaps one for the other.",
            ),
            Self::ConcurrentModification => Some("Reload the unit and retry the change."),
            Self::GraphTooDeep => Some("Raise [graph] max_hops or repair the unit's parent pointers."),
            Self::LevelOutOfRange => Some("Use `sreg class path` to see the node's depth."),
            Self::ClassificationCycle => Some("Repair the parent_id chain of the classification tree."),
            Self::ClassificationTooDeep => {
                Some("Check the parent_id chain; real classification trees are a few levels deep.")
            }
            Self::DatabaseError => Some("Check disk space, permissions and the database file."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Domain errors raised by the register services.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("no hierarchy edge between {first} and {second}")]
    InvalidLinkType { first: UnitType, second: UnitType },

    #[error("{child} is already linked to {parent}")]
    LinkAlreadyExists { child: UnitRef, parent: UnitRef },

    #[error("{child} is not linked to {parent}")]
    LinkNotExists { child: UnitRef, parent: UnitRef },

    #[error("{unit_type} may point at {first} or {second}, not both")]
    ExclusiveParents {
        unit_type: UnitType,
        first: UnitType,
        second: UnitType,
    },

    #[error("{unit} was modified by another writer")]
    ConcurrentModification { unit: UnitRef },

    #[error("write access to field '{field}' denied")]
    FieldAccessDenied { field: String },

    #[error("hierarchy above {unit} exceeds {max_hops} hops")]
    GraphTooDeep { unit: UnitRef, max_hops: usize },

    #[error("level {level} out of range for {tree} node {node_id} (depth {depth})")]
    LevelOutOfRange {
        tree: ClassificationTree,
        node_id: i64,
        level: usize,
        depth: usize,
    },

    #[error("unit not found: {0}")]
    UnitNotFound(UnitRef),

    #[error("{tree} node not found: {node_id}")]
    ClassificationNodeNotFound { tree: ClassificationTree, node_id: i64 },

    #[error("{tree} node {node_id} is its own ancestor")]
    ClassificationCycle { tree: ClassificationTree, node_id: i64 },

    #[error("{tree} node {node_id} is deeper than {max_depth} levels")]
    ClassificationTooDeep {
        tree: ClassificationTree,
        node_id: i64,
        max_depth: usize,
    },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl RegisterError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidLinkType { .. } => ErrorCode::InvalidLinkType,
            Self::LinkAlreadyExists { .. } => ErrorCode::LinkAlreadyExists,
            Self::LinkNotExists { .. } => ErrorCode::LinkNotExists,
            Self::ConcurrentModification { .. } => ErrorCode::ConcurrentModification,
            Self::ExclusiveParents { .. } => ErrorCode::ExclusiveParents,
            Self::FieldAccessDenied { .. } => ErrorCode::FieldAccessDenied,
            Self::GraphTooDeep { .. } => ErrorCode::GraphTooDeep,
            Self::LevelOutOfRange { .. } => ErrorCode::LevelOutOfRange,
            Self::UnitNotFound(_) => ErrorCode::UnitNotFound,
            Self::ClassificationNodeNotFound { .. } => ErrorCode::ClassificationNodeNotFound,
            Self::ClassificationCycle { .. } => ErrorCode::ClassificationCycle,
            Self::ClassificationTooDeep { .. } => ErrorCode::ClassificationTooDeep,
            Self::Db(_) => ErrorCode::DatabaseError,
        }
    }

    /// Whether re-running the whole operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}
