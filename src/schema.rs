use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

lazy_static::lazy_static! {
    static ref EMAIL_RE: regex::Regex =
        regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// Value held in a client's custom-field bag. Source data is arbitrary, so
/// this is a tagged union rather than raw JSON: anything that is not a
/// string, number or boolean gets stringified on the way in.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum CustomValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CustomValue {
    pub fn from_json(value: &serde_json::Value) -> Option<CustomValue> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(CustomValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(CustomValue::Number),
            serde_json::Value::String(s) => Some(CustomValue::Text(s.clone())),
            other => Some(CustomValue::Text(other.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CustomValue::Text(s) if s.is_empty())
    }
}

impl fmt::Display for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomValue::Bool(b) => write!(f, "{}", b),
            CustomValue::Number(n) => {
                // Whole numbers print without a trailing ".0" so they read
                // like the source cell did.
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CustomValue::Text(s) => write!(f, "{}", s),
        }
    }
}

// Tolerant deserialization: model responses and spreadsheets put anything in
// here, and a single odd value must not sink the whole record.
impl<'de> Deserialize<'de> for CustomValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(CustomValue::from_json(&value).unwrap_or_else(|| CustomValue::Text(String::new())))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetadata {
    /// Provenance tag: "file" for batch imports, "documents" for AI
    /// extraction.
    pub source: String,
    pub last_updated: DateTime<Utc>,
}

/// Canonical person record. Every instance held in memory has passed
/// [`Client::validate`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, CustomValue>,
    pub metadata: ClientMetadata,
}

impl Client {
    /// Schema check: collects every violation instead of stopping at the
    /// first one.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.id.is_empty() {
            errors.push("id is required".to_string());
        }
        if self.first_name.trim().is_empty() {
            errors.push("First name is required".to_string());
        }
        if self.last_name.trim().is_empty() {
            errors.push("Last name is required".to_string());
        }
        if let Some(email) = &self.email {
            if !email.is_empty() && !EMAIL_RE.is_match(email) {
                errors.push(format!("Invalid email address: {}", email));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Flattens the record into dotted leaf paths, e.g. `address.city` or
    /// `customFields.Insurance ID`. Optional fields that are absent produce
    /// no path. This is the address space field mappings resolve against.
    pub fn flatten_paths(&self) -> Vec<(String, String)> {
        let mut paths: Vec<(String, String)> = Vec::new();

        paths.push(("id".to_string(), self.id.clone()));
        paths.push(("firstName".to_string(), self.first_name.clone()));
        paths.push(("lastName".to_string(), self.last_name.clone()));

        let optionals = [
            ("dateOfBirth", &self.date_of_birth),
            ("email", &self.email),
            ("phone", &self.phone),
        ];
        for (name, value) in optionals {
            if let Some(v) = value {
                paths.push((name.to_string(), v.clone()));
            }
        }

        if let Some(addr) = &self.address {
            let sub = [
                ("address.street", &addr.street),
                ("address.city", &addr.city),
                ("address.state", &addr.state),
                ("address.zipCode", &addr.zip_code),
                ("address.country", &addr.country),
            ];
            for (name, value) in sub {
                if let Some(v) = value {
                    paths.push((name.to_string(), v.clone()));
                }
            }
        }

        for (key, value) in &self.custom_fields {
            paths.push((format!("customFields.{}", key), value.to_string()));
        }

        paths.push(("metadata.source".to_string(), self.metadata.source.clone()));
        paths.push((
            "metadata.lastUpdated".to_string(),
            self.metadata.last_updated.to_rfc3339(),
        ));

        paths
    }

    /// Path names only, for handing to the mapping suggester.
    pub fn field_paths(&self) -> Vec<String> {
        self.flatten_paths().into_iter().map(|(p, _)| p).collect()
    }

    /// Resolves a dotted path to its leaf value. Unknown or empty paths
    /// resolve to `None`.
    pub fn value_at_path(&self, path: &str) -> Option<String> {
        if path.is_empty() {
            return None;
        }
        self.flatten_paths()
            .into_iter()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v)
    }
}

/// Partial client accumulated by the AI extraction path. Becomes a real
/// [`Client`] once it has both names and passes validation.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub custom_fields: BTreeMap<String, CustomValue>,
}

impl ClientDraft {
    /// Promotes the draft to a canonical record, tagging its provenance.
    pub fn into_client(self, source: &str) -> crate::error::Result<Client> {
        let client = Client {
            id: generate_id("client"),
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            date_of_birth: self.date_of_birth,
            email: self.email,
            phone: self.phone,
            address: self.address,
            custom_fields: self.custom_fields,
            metadata: ClientMetadata {
                source: source.to_string(),
                last_updated: Utc::now(),
            },
        };
        client
            .validate()
            .map_err(|errors| crate::error::PipelineError::Validation { errors })?;
        Ok(client)
    }
}

/// Widget kind of a fillable PDF field. Runtime kinds that cannot be
/// determined default to `Text`; that default can mis-fill exotic widgets
/// but is kept deliberately.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Checkbox,
    Radio,
    Dropdown,
    Signature,
    Date,
}

/// Page placement of a widget. Not reliably populated: all-zero means the
/// position was not determined during introspection.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FieldPosition {
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    /// Sequential per template, e.g. `field_0`.
    pub id: String,
    /// Name as declared in the PDF; the join key back to the live form.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub position: FieldPosition,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_mapping: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    pub page_count: usize,
    pub file_size: usize,
    pub added_date: DateTime<Utc>,
}

/// Canonical form-template record. Field order matches discovery order in
/// the underlying document.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PdfTemplate {
    pub id: String,
    pub name: String,
    pub category: String,
    pub file_path: PathBuf,
    pub fields: Vec<FormField>,
    pub metadata: TemplateMetadata,
}

impl PdfTemplate {
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.id.is_empty() {
            errors.push("id is required".to_string());
        }
        if self.name.trim().is_empty() {
            errors.push("Template name is required".to_string());
        }
        for field in &self.fields {
            if field.name.is_empty() {
                errors.push(format!("Field {} has an empty name", field.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// One resolved binding from a fill operation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub field_id: String,
    pub field_name: String,
    pub client_data_path: String,
    pub value: Option<String>,
    /// [0,1] trust score; not a probability, used to flag bindings for
    /// human review.
    pub confidence: f64,
    pub manually_mapped: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct MappingAlternative {
    pub field: String,
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MappingSuggestion {
    pub suggested_field: String,
    pub confidence: f64,
    pub reasoning: String,
    pub alternatives: Vec<MappingAlternative>,
}

/// Generates a unique record id with a readable prefix.
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}
