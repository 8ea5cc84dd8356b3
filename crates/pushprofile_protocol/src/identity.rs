//! Personalization payloads.

use crate::model::{CustomAttributes, Gender};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Identity a device is personalized with.
///
/// At least one of phones, emails or external user id is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// Phone numbers.
    pub phones: Option<Vec<String>>,
    /// Email addresses.
    pub emails: Option<Vec<String>>,
    /// External user id.
    pub external_user_id: Option<String>,
}

impl UserIdentity {
    /// Creates an identity, or `None` if every component is empty.
    pub fn new(
        phones: Option<Vec<String>>,
        emails: Option<Vec<String>>,
        external_user_id: Option<String>,
    ) -> Option<Self> {
        let has_phones = phones.as_ref().is_some_and(|p| !p.is_empty());
        let has_emails = emails.as_ref().is_some_and(|e| !e.is_empty());
        let has_external = external_user_id.as_ref().is_some_and(|e| !e.is_empty());

        if !(has_phones || has_emails || has_external) {
            return None;
        }

        Some(Self {
            phones,
            emails,
            external_user_id,
        })
    }

    /// Creates an identity from an external user id alone.
    pub fn external(external_user_id: impl Into<String>) -> Option<Self> {
        Self::new(None, None, Some(external_user_id.into()))
    }

    /// Encodes the identity as the remote service expects it.
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        if let Some(phones) = &self.phones {
            let list: Vec<Value> = phones.iter().map(|n| json!({ "number": n })).collect();
            body.insert("phones".into(), Value::Array(list));
        }
        if let Some(emails) = &self.emails {
            let list: Vec<Value> = emails.iter().map(|a| json!({ "address": a })).collect();
            body.insert("emails".into(), Value::Array(list));
        }
        if let Some(external) = &self.external_user_id {
            body.insert("externalUserId".into(), Value::String(external.clone()));
        }
        Value::Object(body)
    }
}

/// Descriptive attributes sent along with a personalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserAttributes {
    /// First name.
    pub first_name: Option<String>,
    /// Middle name.
    pub middle_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Tags.
    pub tags: Option<BTreeSet<String>>,
    /// Gender.
    pub gender: Option<Gender>,
    /// Birthday as `YYYY-MM-DD`.
    pub birthday: Option<String>,
    /// Custom attributes.
    pub custom_attributes: Option<CustomAttributes>,
}

impl UserAttributes {
    /// Encodes the attributes, leaving out unset fields.
    pub fn to_body(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Value::Object(
                map.into_iter()
                    .filter(|(_, value)| !value.is_null())
                    .collect(),
            ),
            _ => Value::Object(Map::new()),
        }
    }
}
