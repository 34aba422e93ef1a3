//! Generated metadata records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exposure risk of a column's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Sensitivity {
    Pii,
    Phi,
    #[default]
    NotSensitive,
}

impl Sensitivity {
    pub const ALL: [Sensitivity; 3] = [Sensitivity::Pii, Sensitivity::Phi, Sensitivity::NotSensitive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Pii => "PII",
            Sensitivity::Phi => "PHI",
            Sensitivity::NotSensitive => "not sensitive",
        }
    }
}

impl FromStr for Sensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "pii" => Ok(Sensitivity::Pii),
            "phi" => Ok(Sensitivity::Phi),
            "not sensitive" | "none" | "" => Ok(Sensitivity::NotSensitive),
            _ => Err(format!(
                "unknown sensitivity '{}', expected one of: PII, PHI, not sensitive",
                s
            )),
        }
    }
}

impl TryFrom<String> for Sensitivity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Sensitivity> for String {
    fn from(value: Sensitivity) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic category attached to a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Tag {
    Pii,
    Phi,
    Financial,
    Geospatial,
    Temporal,
    Categorical,
    Behavioral,
    Demographic,
    Metadata,
    Other,
}

impl Tag {
    pub const ALL: [Tag; 10] = [
        Tag::Pii,
        Tag::Phi,
        Tag::Financial,
        Tag::Geospatial,
        Tag::Temporal,
        Tag::Categorical,
        Tag::Behavioral,
        Tag::Demographic,
        Tag::Metadata,
        Tag::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Pii => "PII",
            Tag::Phi => "PHI",
            Tag::Financial => "Financial",
            Tag::Geospatial => "Geospatial",
            Tag::Temporal => "Temporal",
            Tag::Categorical => "Categorical",
            Tag::Behavioral => "Behavioral",
            Tag::Demographic => "Demographic",
            Tag::Metadata => "Metadata",
            Tag::Other => "Other",
        }
    }

    /// Guidance shown to the model for each tag
    pub fn guidance(&self) -> &'static str {
        match self {
            Tag::Pii => "personally identifiable information",
            Tag::Phi => "health information as defined by HIPAA",
            Tag::Financial => "account numbers, transaction amounts, card details",
            Tag::Geospatial => "addresses, coordinates, postal codes",
            Tag::Temporal => "timestamps, durations, intervals",
            Tag::Categorical => "values from a fixed set of categories",
            Tag::Behavioral => "actions or behaviour of a subject",
            Tag::Demographic => "age, gender, income, education level",
            Tag::Metadata => "information about other data (types, sources, owners)",
            Tag::Other => "none of the above",
        }
    }
}

impl FromStr for Tag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Tag::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown tag '{}'", s))
    }
}

impl TryFrom<String> for Tag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tag> for String {
    fn from(value: Tag) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: String,
    pub description: String,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// The model's justification for the fields above
    pub analysis: String,
}

/// Descriptive metadata for a dataset and its columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnMetadata>,
}

impl DatasetMetadata {
    /// Metadata with no description and no columns yet
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            columns: Vec::new(),
        }
    }

    /// Find a column entry by name
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in list order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitivity_parse_variants() {
        assert_eq!("PII".parse::<Sensitivity>().unwrap(), Sensitivity::Pii);
        assert_eq!("phi".parse::<Sensitivity>().unwrap(), Sensitivity::Phi);
        assert_eq!(
            "Not Sensitive".parse::<Sensitivity>().unwrap(),
            Sensitivity::NotSensitive
        );
        assert_eq!(
            "not_sensitive".parse::<Sensitivity>().unwrap(),
            Sensitivity::NotSensitive
        );
        assert!("secret".parse::<Sensitivity>().is_err());
    }

    #[test]
    fn test_tag_parse_case_insensitive() {
        assert_eq!("geospatial".parse::<Tag>().unwrap(), Tag::Geospatial);
        assert_eq!("PII".parse::<Tag>().unwrap(), Tag::Pii);
        assert!("Astrological".parse::<Tag>().is_err());
    }

    #[test]
    fn test_column_defaults() {
        let column: ColumnMetadata = serde_json::from_value(serde_json::json!({
            "name": "id",
            "data_type": "int",
            "description": "Order identifier",
            "analysis": "monotonic integers"
        }))
        .unwrap();
        assert_eq!(column.sensitivity, Sensitivity::NotSensitive);
        assert!(column.tags.is_empty());
    }

    #[test]
    fn test_serialize_uses_vocabulary_strings() {
        let column = ColumnMetadata {
            name: "email".into(),
            data_type: "string".into(),
            description: "Customer email".into(),
            sensitivity: Sensitivity::Pii,
            tags: vec![Tag::Pii, Tag::Demographic],
            analysis: "looks like addresses".into(),
        };
        let value = serde_json::to_value(&column).unwrap();
        assert_eq!(value["sensitivity"], "PII");
        assert_eq!(value["tags"], serde_json::json!(["PII", "Demographic"]));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let result: Result<ColumnMetadata, _> = serde_json::from_value(serde_json::json!({
            "name": "id",
            "data_type": "int",
            "description": "d",
            "tags": ["Nonsense"],
            "analysis": "a"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_dataset_lookup() {
        let mut ds = DatasetMetadata::empty("orders");
        ds.columns.push(ColumnMetadata {
            name: "id".into(),
            data_type: "int".into(),
            description: "d".into(),
            sensitivity: Sensitivity::default(),
            tags: vec![],
            analysis: "a".into(),
        });
        assert!(ds.column("id").is_some());
        assert!(ds.column("total").is_none());
        assert_eq!(ds.column_names(), vec!["id"]);
    }
}
