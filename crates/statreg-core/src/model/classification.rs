use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ParseEnumError;

/// The three classification hierarchies a unit can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationTree {
    Region,
    ActivityCategory,
    SectorCode,
}

impl ClassificationTree {
    pub const ALL: [Self; 3] = [Self::Region, Self::ActivityCategory, Self::SectorCode];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::ActivityCategory => "activity_category",
            Self::SectorCode => "sector_code",
        }
    }

    pub const fn table(self) -> &'static str {
        match self {
            Self::Region => "regions",
            Self::ActivityCategory => "activity_categories",
            Self::SectorCode => "sector_codes",
        }
    }
}

impl fmt::Display for ClassificationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassificationTree {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "region" | "regions" => Ok(Self::Region),
            "activity_category" | "activity" | "activities" => Ok(Self::ActivityCategory),
            "sector_code" | "sector" | "sectors" => Ok(Self::SectorCode),
            _ => Err(ParseEnumError::new("classification tree", s)),
        }
    }
}

/// One node of a classification tree.
///
/// `level` is the stored depth hint from reference data; resolution always
/// derives depth by walking `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationNode {
    pub id: i64,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub level: i64,
}

/// Attribute of a node selectable by `field_of_ancestor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeField {
    Id,
    Code,
    Name,
    Level,
}

impl FromStr for NodeField {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "code" => Ok(Self::Code),
            "name" => Ok(Self::Name),
            "level" => Ok(Self::Level),
            _ => Err(ParseEnumError::new("node field", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl ClassificationNode {
    pub fn field(&self, field: NodeField) -> FieldValue {
        match field {
            NodeField::Id => FieldValue::Int(self.id),
            NodeField::Code => FieldValue::Text(self.code.clone()),
            NodeField::Name => FieldValue::Text(self.name.clone()),
            NodeField::Level => FieldValue::Int(self.level),
        }
    }
}
