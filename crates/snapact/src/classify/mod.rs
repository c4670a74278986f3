//! Classification result model.
//!
//! Providers answer with a JSON object carrying a `type` discriminant, a
//! generic `fields` bag, and optionally a sub-object named after the type
//! (legacy/alternate field location). This module folds that shape into a
//! tagged union with one typed variant per category; per attribute the
//! type-named sub-object wins over the generic bag when both carry a
//! non-empty value.

pub mod projector;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The fixed category set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Event,
    Contact,
    Expense,
    Address,
    Note,
    Document,
}

pub const CATEGORIES: [Category; 6] = [
    Category::Event,
    Category::Contact,
    Category::Expense,
    Category::Address,
    Category::Note,
    Category::Document,
];

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Event => "event",
            Category::Contact => "contact",
            Category::Expense => "expense",
            Category::Address => "address",
            Category::Note => "note",
            Category::Document => "document",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "event" => Some(Category::Event),
            "contact" => Some(Category::Contact),
            "expense" => Some(Category::Expense),
            "address" => Some(Category::Address),
            "note" => Some(Category::Note),
            "document" => Some(Category::Document),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation failure on the provider's classification result.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("unrecognized item type: '{0}'")]
    UnrecognizedType(String),

    #[error("classification result has no title")]
    MissingTitle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDetails {
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDetails {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseDetails {
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub date: Option<String>,
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressDetails {
    pub street: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDetails {
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentDetails {
    pub doc_type: Option<String>,
    pub date: Option<String>,
}

/// Typed per-category attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryDetails {
    Event(EventDetails),
    Contact(ContactDetails),
    Expense(ExpenseDetails),
    Address(AddressDetails),
    Note(NoteDetails),
    Document(DocumentDetails),
}

/// A validated classification result.
#[derive(Debug, Clone)]
pub struct Classification {
    pub category: Category,
    pub title: String,
    pub summary: Option<String>,
    pub details: CategoryDetails,
    /// The provider's original payload, persisted opaquely on the job.
    pub raw: Value,
}

impl Classification {
    /// Folds a provider payload into the tagged union, validating that the
    /// type is recognized and a non-empty title exists (top-level or
    /// nested).
    pub fn from_provider_json(raw: Value) -> Result<Self, ClassificationError> {
        let type_str = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let category = Category::from_str(&type_str)
            .ok_or_else(|| ClassificationError::UnrecognizedType(type_str.clone()))?;

        let typed = raw.get(category.as_str());
        let bag = raw.get("fields");
        let attr = |key: &str| pick(typed, key).or_else(|| pick(bag, key));

        let title = nonempty(raw.get("title"))
            .or_else(|| attr("title"))
            .ok_or(ClassificationError::MissingTitle)?;
        let summary = nonempty(raw.get("summary"));

        let details = match category {
            Category::Event => CategoryDetails::Event(EventDetails {
                date: attr("date"),
                time: attr("time"),
                location: attr("location"),
            }),
            Category::Contact => CategoryDetails::Contact(ContactDetails {
                name: attr("name"),
                phone: attr("phone"),
                email: attr("email"),
                organization: attr("organization"),
            }),
            Category::Expense => CategoryDetails::Expense(ExpenseDetails {
                amount: attr("amount"),
                currency: attr("currency"),
                date: attr("date"),
                vendor: attr("vendor"),
            }),
            Category::Address => CategoryDetails::Address(AddressDetails {
                street: attr("street"),
                city: attr("city"),
                postal_code: attr("postal_code"),
                country: attr("country"),
            }),
            Category::Note => CategoryDetails::Note(NoteDetails { body: attr("body") }),
            Category::Document => CategoryDetails::Document(DocumentDetails {
                doc_type: attr("doc_type"),
                date: attr("date"),
            }),
        };

        Ok(Self {
            category,
            title,
            summary,
            details,
            raw,
        })
    }
}

/// Looks up `key` on an optional JSON object, coercing strings and numbers
/// to a non-empty string.
fn pick(obj: Option<&Value>, key: &str) -> Option<String> {
    obj.and_then(|o| o.get(key)).and_then(coerce)
}

fn nonempty(value: Option<&Value>) -> Option<String> {
    value.and_then(coerce)
}

fn coerce(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
