//! Customer record data structures for cross-sell scoring

use crate::error::{ScoreError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the label column carried by labeled (training/validation) records.
pub const LABEL_FIELD: &str = "response";

/// Customer record as received from API clients or offline files.
///
/// Keys are not yet normalized and values are not yet validated; see
/// [`crate::feature_extractor::FeatureExtractor::extract`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawCustomerRecord(pub Map<String, Value>);

impl RawCustomerRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style field insertion.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Remove a field by raw key.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Iterate over raw key/value pairs.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A typical customer, used for smoke tests and the generator tool.
    pub fn sample() -> Self {
        Self::new()
            .with("gender", "Male")
            .with("age", 35)
            .with("driving_license", 1)
            .with("region_code", 28.0)
            .with("previously_insured", 0)
            .with("vehicle_age", "1-2 Year")
            .with("vehicle_damage", "Yes")
            .with("annual_premium", 35000.0)
            .with("policy_sales_channel", 152.0)
            .with("vintage", 90)
    }
}

impl From<Map<String, Value>> for RawCustomerRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for RawCustomerRecord {
    type Error = ScoreError;

    /// Only JSON objects are records.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ScoreError::Malformed(format!(
                "row must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A raw record paired with its observed outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRecord {
    pub record: RawCustomerRecord,
    pub label: bool,
}

impl LabeledRecord {
    /// Split the `response` label out of a raw record.
    ///
    /// The label key is matched after name normalization, so `Response`
    /// and `response` are both accepted.
    pub fn from_raw(mut record: RawCustomerRecord) -> Result<Self, ValidationError> {
        let key = record
            .0
            .keys()
            .find(|k| crate::feature_extractor::normalize_field_name(k) == LABEL_FIELD)
            .cloned()
            .ok_or_else(|| ValidationError::new(LABEL_FIELD, "missing label"))?;

        let value = record.0.remove(&key).unwrap_or(Value::Null);
        let label = match &value {
            Value::Bool(b) => *b,
            Value::Number(n) if n.as_f64() == Some(1.0) => true,
            Value::Number(n) if n.as_f64() == Some(0.0) => false,
            Value::String(s) if s.trim() == "1" => true,
            Value::String(s) if s.trim() == "0" => false,
            _ => return Err(ValidationError::new(LABEL_FIELD, "must be 0 or 1")),
        };

        Ok(Self { record, label })
    }
}

/// A categorical customer attribute with a fixed integer encoding.
///
/// The encodings must match the ones the model was trained with.
pub trait Categorical: Sized + Copy + 'static {
    /// Normalized field name this category is read from.
    const FIELD: &'static str;
    /// All variants, in encoding order.
    const VARIANTS: &'static [Self];

    /// Wire label, e.g. `"< 1 Year"`.
    fn label(self) -> &'static str;

    /// Integer code fed to the model.
    fn encode(self) -> u8;

    /// Parse a wire label.
    fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::VARIANTS.iter().copied().find(|v| v.label() == label)
    }

    /// Inverse of [`Categorical::encode`].
    fn decode(code: u8) -> Option<Self> {
        Self::VARIANTS.iter().copied().find(|v| v.encode() == code)
    }

    /// Human-readable domain, used in validation messages.
    fn domain() -> String {
        Self::VARIANTS
            .iter()
            .map(|v| format!("'{}'", v.label()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Customer gender (Male = 0, Female = 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Categorical for Gender {
    const FIELD: &'static str = "gender";
    const VARIANTS: &'static [Self] = &[Gender::Male, Gender::Female];

    fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }

    fn encode(self) -> u8 {
        match self {
            Gender::Male => 0,
            Gender::Female => 1,
        }
    }
}

/// Age of the customer's vehicle (< 1 Year = 0, 1-2 Year = 1, > 2 Years = 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleAge {
    #[serde(rename = "< 1 Year")]
    UnderOneYear,
    #[serde(rename = "1-2 Year")]
    OneToTwoYears,
    #[serde(rename = "> 2 Years")]
    OverTwoYears,
}

impl Categorical for VehicleAge {
    const FIELD: &'static str = "vehicle_age";
    const VARIANTS: &'static [Self] = &[
        VehicleAge::UnderOneYear,
        VehicleAge::OneToTwoYears,
        VehicleAge::OverTwoYears,
    ];

    fn label(self) -> &'static str {
        match self {
            VehicleAge::UnderOneYear => "< 1 Year",
            VehicleAge::OneToTwoYears => "1-2 Year",
            VehicleAge::OverTwoYears => "> 2 Years",
        }
    }

    fn encode(self) -> u8 {
        match self {
            VehicleAge::UnderOneYear => 0,
            VehicleAge::OneToTwoYears => 1,
            VehicleAge::OverTwoYears => 2,
        }
    }
}

/// Whether the vehicle was damaged in the past (No = 0, Yes = 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleDamage {
    No,
    Yes,
}

impl Categorical for VehicleDamage {
    const FIELD: &'static str = "vehicle_damage";
    const VARIANTS: &'static [Self] = &[VehicleDamage::No, VehicleDamage::Yes];

    fn label(self) -> &'static str {
        match self {
            VehicleDamage::No => "No",
            VehicleDamage::Yes => "Yes",
        }
    }

    fn encode(self) -> u8 {
        match self {
            VehicleDamage::No => 0,
            VehicleDamage::Yes => 1,
        }
    }
}
