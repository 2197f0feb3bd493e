use std::collections::BTreeSet;

use super::UnitType;

/// Which unit fields an actor may write.
///
/// Field names have the form `"<unit_type>.<column>"`, for example
/// `"legal_unit.enterprise_unit_id"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WritableFields {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl WritableFields {
    pub fn only<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(fields.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, unit_type: UnitType, column: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(fields) => fields.contains(&field_name(unit_type, column)),
        }
    }
}

/// Qualified field name used by the allow-list.
pub fn field_name(unit_type: UnitType, column: &str) -> String {
    format!("{unit_type}.{column}")
}

/// The user on whose behalf a service mutates the register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub writable: WritableFields,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            writable: WritableFields::All,
        }
    }

    #[must_use]
    pub fn with_writable(mut self, writable: WritableFields) -> Self {
        self.writable = writable;
        self
    }
}
