//! Field projection: flattens a classification result into the fixed,
//! named attribute set clients display and edit.
//!
//! `project_fields` is pure and total: every branch emits the same keys
//! for a given category, absent attributes become JSON null, and nothing
//! here can fail.

use serde_json::{Map, Value};

use crate::classify::{Category, CategoryDetails, Classification};

/// Projects the typed classification details into a flat field record.
/// Deterministic: the same input always yields the same record.
pub fn project_fields(classification: &Classification) -> Value {
    let mut record = Map::new();
    record.insert("title".to_string(), Value::String(classification.title.clone()));

    match &classification.details {
        CategoryDetails::Event(event) => {
            set(&mut record, "date", &event.date);
            set(&mut record, "time", &event.time);
            set(&mut record, "location", &event.location);
        }
        CategoryDetails::Contact(contact) => {
            set(&mut record, "name", &contact.name);
            set(&mut record, "phone", &contact.phone);
            set(&mut record, "email", &contact.email);
            set(&mut record, "organization", &contact.organization);
        }
        CategoryDetails::Expense(expense) => {
            set(&mut record, "amount", &expense.amount);
            set(&mut record, "currency", &expense.currency);
            set(&mut record, "date", &expense.date);
            set(&mut record, "vendor", &expense.vendor);
        }
        CategoryDetails::Address(address) => {
            set(&mut record, "street", &address.street);
            set(&mut record, "city", &address.city);
            set(&mut record, "postalCode", &address.postal_code);
            set(&mut record, "country", &address.country);
        }
        CategoryDetails::Note(note) => {
            set(&mut record, "body", &note.body);
        }
        CategoryDetails::Document(document) => {
            set(&mut record, "docType", &document.doc_type);
            set(&mut record, "date", &document.date);
        }
    }

    Value::Object(record)
}

/// Short human-readable label when the provider supplies no summary.
/// Composed from the category and key fields only.
pub fn summary_fallback(classification: &Classification) -> String {
    let title = &classification.title;
    match &classification.details {
        CategoryDetails::Event(event) => match &event.date {
            Some(date) => format!("Event: {} on {}", title, date),
            None => format!("Event: {}", title),
        },
        CategoryDetails::Contact(contact) => {
            format!("Contact: {}", contact.name.as_deref().unwrap_or(title))
        }
        CategoryDetails::Expense(expense) => match (&expense.amount, &expense.currency) {
            (Some(amount), Some(currency)) => {
                format!("Expense: {} ({} {})", title, amount, currency)
            }
            (Some(amount), None) => format!("Expense: {} ({})", title, amount),
            _ => format!("Expense: {}", title),
        },
        CategoryDetails::Address(address) => match &address.city {
            Some(city) => format!("Address: {} in {}", title, city),
            None => format!("Address: {}", title),
        },
        CategoryDetails::Note(_) => format!("Note: {}", title),
        CategoryDetails::Document(document) => match &document.doc_type {
            Some(doc_type) => format!("Document: {} ({})", title, doc_type),
            None => format!("Document: {}", title),
        },
    }
}

fn set(record: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    let json = match value {
        Some(v) => Value::String(v.clone()),
        None => Value::Null,
    };
    record.insert(key.to_string(), json);
}
