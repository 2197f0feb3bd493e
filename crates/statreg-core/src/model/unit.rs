use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ParseEnumError;

/// Upper bound of a live row's validity window ("open until further notice").
pub const VALID_TO_OPEN: i64 = i64::MAX;

/// The four statistical unit types, ordered from leaf to root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    LocalUnit,
    LegalUnit,
    EnterpriseUnit,
    EnterpriseGroup,
}

impl UnitType {
    pub const ALL: [Self; 4] = [
        Self::LocalUnit,
        Self::LegalUnit,
        Self::EnterpriseUnit,
        Self::EnterpriseGroup,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalUnit => "local_unit",
            Self::LegalUnit => "legal_unit",
            Self::EnterpriseUnit => "enterprise_unit",
            Self::EnterpriseGroup => "enterprise_group",
        }
    }

    /// Table holding both live and historical rows of this type.
    pub const fn table(self) -> &'static str {
        match self {
            Self::LocalUnit => "local_units",
            Self::LegalUnit => "legal_units",
            Self::EnterpriseUnit => "enterprise_units",
            Self::EnterpriseGroup => "enterprise_groups",
        }
    }

    /// Parent-pointer columns in storage order.
    pub const fn link_columns(self) -> &'static [&'static str] {
        match self {
            Self::LocalUnit => &["legal_unit_id", "enterprise_unit_id"],
            Self::LegalUnit => &["enterprise_unit_id", "ent_group_id"],
            Self::EnterpriseUnit => &["ent_group_id"],
            Self::EnterpriseGroup => &[],
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local_unit" | "local" | "lu" => Ok(Self::LocalUnit),
            "legal_unit" | "legal" | "le" => Ok(Self::LegalUnit),
            "enterprise_unit" | "enterprise" | "eu" => Ok(Self::EnterpriseUnit),
            "enterprise_group" | "group" | "eg" => Ok(Self::EnterpriseGroup),
            _ => Err(ParseEnumError::new("unit type", s)),
        }
    }
}

/// Why a version of a unit was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeReason {
    Create,
    Edit,
    Delete,
    Undelete,
    Correction,
}

impl ChangeReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Undelete => "undelete",
            Self::Correction => "correction",
        }
    }
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeReason {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "edit" => Ok(Self::Edit),
            "delete" => Ok(Self::Delete),
            "undelete" => Ok(Self::Undelete),
            "correction" => Ok(Self::Correction),
            _ => Err(ParseEnumError::new("change reason", s)),
        }
    }
}

/// Identity of a conceptual unit: its type plus the id of its live row.
///
/// Ordering is by type first, then id, which is the order graph output uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitRef {
    pub unit_type: UnitType,
    pub id: i64,
}

impl UnitRef {
    pub const fn new(unit_type: UnitType, id: i64) -> Self {
        Self { unit_type, id }
    }
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit_type, self.id)
    }
}

impl FromStr for UnitRef {
    type Err = ParseEnumError;

    /// Parses `"<type>:<id>"`, e.g. `legal_unit:12` or `lu:3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| ParseEnumError::new("unit reference", s))?;
        let unit_type = kind.parse()?;
        let id = id
            .trim()
            .parse::<i64>()
            .map_err(|_| ParseEnumError::new("unit reference", s))?;
        Ok(Self { unit_type, id })
    }
}

/// Type-specific parent pointers. The variant is the unit's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit_type", rename_all = "snake_case")]
pub enum ParentLinks {
    LocalUnit {
        legal_unit_id: Option<i64>,
        enterprise_unit_id: Option<i64>,
    },
    LegalUnit {
        enterprise_unit_id: Option<i64>,
        ent_group_id: Option<i64>,
    },
    EnterpriseUnit {
        ent_group_id: Option<i64>,
    },
    EnterpriseGroup,
}

impl ParentLinks {
    /// Links of a unit that has no parents yet.
    pub const fn empty(unit_type: UnitType) -> Self {
        match unit_type {
            UnitType::LocalUnit => Self::LocalUnit {
                legal_unit_id: None,
                enterprise_unit_id: None,
            },
            UnitType::LegalUnit => Self::LegalUnit {
                enterprise_unit_id: None,
                ent_group_id: None,
            },
            UnitType::EnterpriseUnit => Self::EnterpriseUnit { ent_group_id: None },
            UnitType::EnterpriseGroup => Self::EnterpriseGroup,
        }
    }

    pub const fn unit_type(&self) -> UnitType {
        match self {
            Self::LocalUnit { .. } => UnitType::LocalUnit,
            Self::LegalUnit { .. } => UnitType::LegalUnit,
            Self::EnterpriseUnit { .. } => UnitType::EnterpriseUnit,
            Self::EnterpriseGroup => UnitType::EnterpriseGroup,
        }
    }

    /// Pointer values in the order of [`UnitType::link_columns`].
    pub fn column_values(&self) -> Vec<Option<i64>> {
        match *self {
            Self::LocalUnit {
                legal_unit_id,
                enterprise_unit_id,
            } => vec![legal_unit_id, enterprise_unit_id],
            Self::LegalUnit {
                enterprise_unit_id,
                ent_group_id,
            } => vec![enterprise_unit_id, ent_group_id],
            Self::EnterpriseUnit { ent_group_id } => vec![ent_group_id],
            Self::EnterpriseGroup => Vec::new(),
        }
    }
}

/// One row of a unit table: either the live row or a historical snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatUnit {
    pub id: i64,
    pub stat_id: Option<String>,
    pub name: String,
    pub region_id: Option<i64>,
    pub activity_category_id: Option<i64>,
    pub sector_code_id: Option<i64>,
    pub valid_from_us: i64,
    pub valid_to_us: i64,
    pub history_parent_id: Option<i64>,
    pub is_deleted: bool,
    pub change_reason: ChangeReason,
    pub edit_comment: Option<String>,
    pub user_id: String,
    #[serde(flatten)]
    pub links: ParentLinks,
}

impl StatUnit {
    pub const fn unit_type(&self) -> UnitType {
        self.links.unit_type()
    }

    /// The conceptual unit this row belongs to.
    pub fn unit_ref(&self) -> UnitRef {
        UnitRef::new(self.unit_type(), self.history_parent_id.unwrap_or(self.id))
    }

    pub const fn is_live(&self) -> bool {
        self.history_parent_id.is_none()
    }
}

/// Values for a unit about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUnit {
    pub name: String,
    pub stat_id: Option<String>,
    pub region_id: Option<i64>,
    pub activity_category_id: Option<i64>,
    pub sector_code_id: Option<i64>,
    pub links: ParentLinks,
    pub comment: Option<String>,
}

impl NewUnit {
    pub fn new(unit_type: UnitType, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stat_id: None,
            region_id: None,
            activity_category_id: None,
            sector_code_id: None,
            links: ParentLinks::empty(unit_type),
            comment: None,
        }
    }

    pub const fn unit_type(&self) -> UnitType {
        self.links.unit_type()
    }
}

/// Field-level edit of a unit's own attributes.
///
/// `None` leaves a field untouched; `Some(None)` clears a nullable field.
/// Parent pointers change only through the link service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitEdit {
    pub name: Option<String>,
    pub stat_id: Option<Option<String>>,
    pub region_id: Option<Option<i64>>,
    pub activity_category_id: Option<Option<i64>>,
    pub sector_code_id: Option<Option<i64>>,
}

impl UnitEdit {
    /// Column names this edit writes.
    pub fn touched_columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::new();
        if self.name.is_some() {
            columns.push("name");
        }
        if self.stat_id.is_some() {
            columns.push("stat_id");
        }
        if self.region_id.is_some() {
            columns.push("region_id");
        }
        if self.activity_category_id.is_some() {
            columns.push("activity_category_id");
        }
        if self.sector_code_id.is_some() {
            columns.push("sector_code_id");
        }
        columns
    }

    pub fn is_empty(&self) -> bool {
        self.touched_columns().is_empty()
    }

    pub fn apply(&self, unit: &mut StatUnit) {
        if let Some(name) = &self.name {
            unit.name.clone_from(name);
        }
        if let Some(stat_id) = &self.stat_id {
            unit.stat_id.clone_from(stat_id);
        }
        if let Some(region_id) = self.region_id {
            unit.region_id = region_id;
        }
        if let Some(activity_category_id) = self.activity_category_id {
            unit.activity_category_id = activity_category_id;
        }
        if let Some(sector_code_id) = self.sector_code_id {
            unit.sector_code_id = sector_code_id;
        }
    }
}
