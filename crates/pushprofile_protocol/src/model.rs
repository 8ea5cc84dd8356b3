//! User and installation snapshots.

use crate::identity::{UserAttributes, UserIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Open key-value attributes attached to a user or an installation.
pub type CustomAttributes = BTreeMap<String, AttributeValue>;

/// A custom attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// Text value (dates travel as `YYYY-MM-DD` text).
    Text(String),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Gender of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    /// Male.
    Male,
    /// Female.
    Female,
}

/// A phone contact channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phone {
    /// MSISDN.
    pub number: String,
    /// Whether this is the preferred phone.
    #[serde(default)]
    pub preferred: bool,
}

impl Phone {
    /// Creates a non-preferred phone.
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            preferred: false,
        }
    }
}

/// An email contact channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Email address.
    pub address: String,
    /// Whether this is the preferred email.
    #[serde(default)]
    pub preferred: bool,
}

impl Email {
    /// Creates a non-preferred email.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            preferred: false,
        }
    }
}

/// Person-level profile.
///
/// `installations` is a denormalized cache of the user's devices maintained by
/// the server; it never takes part in a dirty delta.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    /// External (customer-side) user id.
    pub external_user_id: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Middle name.
    pub middle_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Birthday as `YYYY-MM-DD`.
    pub birthday: Option<String>,
    /// Gender.
    pub gender: Option<Gender>,
    /// Phones in server order.
    pub phones: Option<Vec<Phone>>,
    /// Emails in server order.
    pub emails: Option<Vec<Email>>,
    /// Custom attributes.
    pub custom_attributes: Option<CustomAttributes>,
    /// Tags.
    pub tags: Option<BTreeSet<String>>,
    /// Installations registered to this user.
    pub installations: Option<Vec<Installation>>,
}

impl User {
    /// JSON fields excluded from the dirty delta.
    pub const LOCAL_ONLY_FIELDS: &'static [&'static str] = &["installations"];

    /// Finds an installation of this user by push registration id.
    pub fn installation(&self, push_registration_id: &str) -> Option<&Installation> {
        self.installations.as_ref().and_then(|list| {
            list.iter()
                .find(|i| i.push_registration_id.as_deref() == Some(push_registration_id))
        })
    }

    /// Returns the installation currently flagged primary, if any.
    pub fn primary_installation(&self) -> Option<&Installation> {
        self.installations
            .as_ref()
            .and_then(|list| list.iter().find(|i| i.is_primary_device))
    }

    /// Overwrites the identity fields with `identity`.
    pub fn apply_identity(&mut self, identity: &UserIdentity) {
        self.phones = identity
            .phones
            .as_ref()
            .map(|numbers| numbers.iter().map(Phone::new).collect());
        self.emails = identity
            .emails
            .as_ref()
            .map(|addresses| addresses.iter().map(Email::new).collect());
        self.external_user_id = identity.external_user_id.clone();
    }

    /// Overwrites the descriptive attributes with `attributes`.
    pub fn apply_attributes(&mut self, attributes: &UserAttributes) {
        self.first_name = attributes.first_name.clone();
        self.middle_name = attributes.middle_name.clone();
        self.last_name = attributes.last_name.clone();
        self.gender = attributes.gender;
        self.birthday = attributes.birthday.clone();
        self.tags = attributes.tags.clone();
        self.custom_attributes = attributes.custom_attributes.clone();
    }
}

/// Device-level registration for push delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Installation {
    /// Server-assigned push registration id, unique per installation.
    #[serde(rename = "pushRegId")]
    pub push_registration_id: Option<String>,
    /// Platform push token; may rotate.
    pub push_service_token: Option<String>,
    /// Platform push service name.
    pub push_service_type: Option<String>,
    /// Primary-device flag; at most one installation of a user carries it.
    #[serde(rename = "isPrimary")]
    pub is_primary_device: bool,
    /// Whether push registration is enabled.
    #[serde(rename = "regEnabled")]
    pub is_push_registration_enabled: bool,
    /// Application-level user id.
    pub application_user_id: Option<String>,
    /// Whether the OS allows notifications.
    pub notifications_enabled: bool,
    /// Whether geofencing is enabled.
    pub geo_enabled: bool,
    /// SDK version.
    pub sdk_version: Option<String>,
    /// Host application version.
    pub app_version: Option<String>,
    /// Operating system name.
    pub os: Option<String>,
    /// Operating system version.
    pub os_version: Option<String>,
    /// Device manufacturer.
    pub device_manufacturer: Option<String>,
    /// Device model.
    pub device_model: Option<String>,
    /// User-visible device name.
    pub device_name: Option<String>,
    /// Whether the device has a passcode.
    pub device_secure: bool,
    /// Device language.
    pub language: Option<String>,
    /// Device time zone identifier.
    pub device_timezone_id: Option<String>,
    /// Custom attributes.
    pub custom_attributes: Option<CustomAttributes>,
}

impl Default for Installation {
    fn default() -> Self {
        Self {
            push_registration_id: None,
            push_service_token: None,
            push_service_type: None,
            is_primary_device: false,
            is_push_registration_enabled: true,
            application_user_id: None,
            notifications_enabled: true,
            geo_enabled: false,
            sdk_version: None,
            app_version: None,
            os: None,
            os_version: None,
            device_manufacturer: None,
            device_model: None,
            device_name: None,
            device_secure: false,
            language: None,
            device_timezone_id: None,
            custom_attributes: None,
        }
    }
}

impl Installation {
    /// JSON fields excluded from the dirty delta.
    pub const LOCAL_ONLY_FIELDS: &'static [&'static str] = &["pushRegId"];

    /// JSON fields describing the device and host application.
    pub const SYSTEM_DATA_FIELDS: &'static [&'static str] = &[
        "appVersion",
        "deviceManufacturer",
        "deviceModel",
        "deviceName",
        "deviceSecure",
        "deviceTimezoneId",
        "geoEnabled",
        "language",
        "notificationsEnabled",
        "os",
        "osVersion",
        "pushServiceType",
        "sdkVersion",
    ];

    /// Creates an installation with the given registration id.
    pub fn with_registration(push_registration_id: impl Into<String>) -> Self {
        Self {
            push_registration_id: Some(push_registration_id.into()),
            ..Self::default()
        }
    }

    /// Returns true if this installation carries `push_registration_id`.
    pub fn has_registration(&self, push_registration_id: &str) -> bool {
        self.push_registration_id.as_deref() == Some(push_registration_id)
    }

    /// Returns the device/app metadata fields as a JSON object.
    pub fn system_data(&self) -> Map<String, Value> {
        let mut out = Map::new();
        if let Ok(Value::Object(all)) = serde_json::to_value(self) {
            for field in Self::SYSTEM_DATA_FIELDS {
                if let Some(value) = all.get(*field) {
                    out.insert((*field).to_string(), value.clone());
                }
            }
        }
        out
    }

    /// Change-detection fingerprint of [`Self::system_data`].
    pub fn system_data_fingerprint(&self) -> i64 {
        let encoded = Value::Object(self.system_data()).to_string();
        let digest = Sha256::digest(encoded.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        i64::from_le_bytes(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn installation_wire_names() {
        let mut installation = Installation::with_registration("A");
        installation.is_primary_device = true;

        let value = serde_json::to_value(&installation).unwrap();
        assert_eq!(value["pushRegId"], json!("A"));
        assert_eq!(value["isPrimary"], json!(true));
        assert_eq!(value["regEnabled"], json!(true));
        assert!(value.get("pushServiceToken").is_some());
    }

    #[test]
    fn installation_decodes_partial_payload() {
        let installation: Installation =
            serde_json::from_value(json!({"pushRegId": "B", "isPrimary": true})).unwrap();

        assert!(installation.has_registration("B"));
        assert!(installation.is_primary_device);
        assert!(installation.is_push_registration_enabled);
        assert!(installation.notifications_enabled);
    }

    #[test]
    fn user_decodes_server_payload() {
        let user: User = serde_json::from_value(json!({
            "externalUserId": "ext-1",
            "firstName": "Darth",
            "gender": "Male",
            "phones": [{"number": "79214444444"}],
            "emails": [{"address": "darth@vader.com", "preferred": true}],
            "customAttributes": {"home": "tatooine", "level": 9, "sith": true},
            "tags": ["dark", "side"],
            "installations": [{"pushRegId": "A", "isPrimary": true}, {"pushRegId": "B"}]
        }))
        .unwrap();

        assert_eq!(user.external_user_id.as_deref(), Some("ext-1"));
        assert_eq!(user.gender, Some(Gender::Male));
        assert_eq!(user.phones, Some(vec![Phone::new("79214444444")]));
        assert!(user.emails.as_ref().unwrap()[0].preferred);

        let attrs = user.custom_attributes.as_ref().unwrap();
        assert_eq!(attrs["home"], AttributeValue::from("tatooine"));
        assert_eq!(attrs["level"], AttributeValue::Number(9.0));
        assert_eq!(attrs["sith"], AttributeValue::Bool(true));

        assert_eq!(user.primary_installation().unwrap().push_registration_id.as_deref(), Some("A"));
        assert!(user.installation("B").is_some());
        assert!(user.installation("C").is_none());
    }

    #[test]
    fn apply_identity_overwrites_channels() {
        let mut user = User {
            phones: Some(vec![Phone::new("1")]),
            ..User::default()
        };
        let identity = UserIdentity::new(None, Some(vec!["a@b.c".into()]), Some("ext".into())).unwrap();

        user.apply_identity(&identity);

        assert_eq!(user.phones, None);
        assert_eq!(user.emails, Some(vec![Email::new("a@b.c")]));
        assert_eq!(user.external_user_id.as_deref(), Some("ext"));
    }

    #[test]
    fn apply_attributes_overwrites_profile() {
        let mut user = User::default();
        let attributes = UserAttributes {
            first_name: Some("Luke".into()),
            gender: Some(Gender::Male),
            tags: Some(["jedi".to_string()].into_iter().collect()),
            ..UserAttributes::default()
        };

        user.apply_attributes(&attributes);

        assert_eq!(user.first_name.as_deref(), Some("Luke"));
        assert_eq!(user.gender, Some(Gender::Male));
        assert!(user.tags.as_ref().unwrap().contains("jedi"));
    }

    #[test]
    fn fingerprint_tracks_system_data_only() {
        let mut a = Installation::with_registration("A");
        a.os_version = Some("17.0".into());
        let mut b = a.clone();
        b.is_primary_device = true;
        b.push_service_token = Some("token".into());

        assert_eq!(a.system_data_fingerprint(), b.system_data_fingerprint());

        b.os_version = Some("17.1".into());
        assert_ne!(a.system_data_fingerprint(), b.system_data_fingerprint());
    }

    #[test]
    fn system_data_contains_metadata_fields() {
        let installation = Installation::default();
        let data = installation.system_data();

        assert_eq!(data.len(), Installation::SYSTEM_DATA_FIELDS.len());
        assert!(data.contains_key("sdkVersion"));
        assert!(!data.contains_key("pushRegId"));
    }
}
