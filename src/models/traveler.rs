use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::AppError;

/// Profile fields that may be edited through the field and bulk endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TravelerField {
    Title,
    FirstName,
    LastName,
    Gender,
    DateOfBirth,
    PlaceOfBirth,
    Nationality,
    PassportNo,
    PassportIssueDate,
    PassportExpiryDate,
    Email,
    Phone,
    AddressLine1,
    AddressLine2,
    City,
    StateProvince,
    ZipCode,
    Country,
    TravelCountry,
    VisaCenter,
    VisaType,
    Package,
    Price,
    TravelDate,
    Status,
    Priority,
    Notes,
}

impl TravelerField {
    pub const ALL: [TravelerField; 27] = [
        TravelerField::Title,
        TravelerField::FirstName,
        TravelerField::LastName,
        TravelerField::Gender,
        TravelerField::DateOfBirth,
        TravelerField::PlaceOfBirth,
        TravelerField::Nationality,
        TravelerField::PassportNo,
        TravelerField::PassportIssueDate,
        TravelerField::PassportExpiryDate,
        TravelerField::Email,
        TravelerField::Phone,
        TravelerField::AddressLine1,
        TravelerField::AddressLine2,
        TravelerField::City,
        TravelerField::StateProvince,
        TravelerField::ZipCode,
        TravelerField::Country,
        TravelerField::TravelCountry,
        TravelerField::VisaCenter,
        TravelerField::VisaType,
        TravelerField::Package,
        TravelerField::Price,
        TravelerField::TravelDate,
        TravelerField::Status,
        TravelerField::Priority,
        TravelerField::Notes,
    ];

    /// Fields kept when a listing is requested in summary form.
    pub const SUMMARY: [TravelerField; 4] = [
        TravelerField::FirstName,
        TravelerField::LastName,
        TravelerField::PassportNo,
        TravelerField::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TravelerField::Title => "title",
            TravelerField::FirstName => "first_name",
            TravelerField::LastName => "last_name",
            TravelerField::Gender => "gender",
            TravelerField::DateOfBirth => "date_of_birth",
            TravelerField::PlaceOfBirth => "place_of_birth",
            TravelerField::Nationality => "nationality",
            TravelerField::PassportNo => "passport_no",
            TravelerField::PassportIssueDate => "passport_issue_date",
            TravelerField::PassportExpiryDate => "passport_expiry_date",
            TravelerField::Email => "email",
            TravelerField::Phone => "phone",
            TravelerField::AddressLine1 => "address_line_1",
            TravelerField::AddressLine2 => "address_line_2",
            TravelerField::City => "city",
            TravelerField::StateProvince => "state_province",
            TravelerField::ZipCode => "zip_code",
            TravelerField::Country => "country",
            TravelerField::TravelCountry => "travel_country",
            TravelerField::VisaCenter => "visa_center",
            TravelerField::VisaType => "visa_type",
            TravelerField::Package => "package",
            TravelerField::Price => "price",
            TravelerField::TravelDate => "travel_date",
            TravelerField::Status => "status",
            TravelerField::Priority => "priority",
            TravelerField::Notes => "notes",
        }
    }
}

impl fmt::Display for TravelerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelerField {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        TravelerField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == raw)
            .ok_or_else(|| AppError::UnknownField(raw.to_string()))
    }
}

impl Serialize for TravelerField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(number) => number.as_f64(),
            FieldValue::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

impl TryFrom<Value> for FieldValue {
    type Error = AppError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(FieldValue::Null),
            Value::Bool(flag) => Ok(FieldValue::Bool(flag)),
            Value::Number(number) => Ok(FieldValue::Number(number)),
            Value::String(text) => Ok(FieldValue::Text(text)),
            Value::Array(_) | Value::Object(_) => Err(AppError::BadRequest(
                "field values must be scalars".to_string(),
            )),
        }
    }
}

/// A validated set of field updates, applied in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdates(Vec<(TravelerField, FieldValue)>);

impl FieldUpdates {
    /// Validates every entry before returning, so an unknown name rejects
    /// the whole batch.
    pub fn from_json(updates: serde_json::Map<String, Value>) -> Result<Self, AppError> {
        updates
            .into_iter()
            .map(|(name, value)| {
                let field = name.parse::<TravelerField>()?;
                Ok((field, FieldValue::try_from(value)?))
            })
            .collect::<Result<Vec<_>, AppError>>()
            .map(FieldUpdates)
    }
}

impl IntoIterator for FieldUpdates {
    type Item = (TravelerField, FieldValue);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Name of a question slot or file category.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct QuestionKey(String);

impl QuestionKey {
    pub const MAX_LEN: usize = 64;
}

impl TryFrom<String> for QuestionKey {
    type Error = AppError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let valid = !raw.is_empty()
            && raw.len() <= Self::MAX_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if valid {
            Ok(QuestionKey(raw))
        } else {
            Err(AppError::BadRequest(format!("invalid question key: {raw:?}")))
        }
    }
}

impl fmt::Display for QuestionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Traveler {
    pub id: u64,
    pub locked: bool,
    #[serde(flatten)]
    pub fields: BTreeMap<TravelerField, FieldValue>,
    pub questions: BTreeMap<QuestionKey, String>,
    pub files: BTreeMap<QuestionKey, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Traveler {
    pub fn new(id: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            locked: false,
            fields: BTreeMap::new(),
            questions: BTreeMap::new(),
            files: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn field(&self, field: TravelerField) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn summary(&self) -> TravelerSummary {
        TravelerSummary {
            id: self.id,
            locked: self.locked,
            fields: self
                .fields
                .iter()
                .filter(|(field, _)| TravelerField::SUMMARY.contains(field))
                .map(|(field, value)| (*field, value.clone()))
                .collect(),
        }
    }
}

/// Listing projection: id, lock flag and the [`TravelerField::SUMMARY`] fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TravelerSummary {
    pub id: u64,
    pub locked: bool,
    #[serde(flatten)]
    pub fields: BTreeMap<TravelerField, FieldValue>,
}

impl TravelerSummary {
    pub fn field(&self, field: TravelerField) -> Option<&FieldValue> {
        self.fields.get(&field)
    }
}

/// One entry of a traveler listing, full or summarized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TravelerListItem {
    Full(Traveler),
    Summary(TravelerSummary),
}

impl TravelerListItem {
    pub fn id(&self) -> u64 {
        match self {
            TravelerListItem::Full(traveler) => traveler.id,
            TravelerListItem::Summary(summary) => summary.id,
        }
    }
}
