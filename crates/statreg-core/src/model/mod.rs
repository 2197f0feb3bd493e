//! Register data model: statistical units, actors and classification nodes.

pub mod actor;
pub mod classification;
pub mod unit;

pub use actor::{Actor, WritableFields};
pub use classification::{ClassificationNode, ClassificationTree, FieldValue, NodeField};
pub use unit::{
    ChangeReason, NewUnit, ParentLinks, StatUnit, UnitEdit, UnitRef, UnitType, VALID_TO_OPEN,
};

/// Error returned when a textual tag does not name a known enum value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
