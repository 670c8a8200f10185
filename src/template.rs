use crate::error::{PipelineError, Result};
use crate::schema::{
    generate_id, FieldKind, FieldPosition, FormField, PdfTemplate, TemplateMetadata,
};
use crate::store::TemplateStore;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use lopdf::{Document, Object, ObjectId};
use std::path::Path;

/// Field-name substring rules for heuristic mapping. Ordered: the first
/// matching rule wins.
const MAPPING_RULES: &[(&str, &str)] = &[
    ("first", "firstName"),
    ("firstname", "firstName"),
    ("first_name", "firstName"),
    ("fname", "firstName"),
    ("last", "lastName"),
    ("lastname", "lastName"),
    ("last_name", "lastName"),
    ("lname", "lastName"),
    ("email", "email"),
    ("mail", "email"),
    ("phone", "phone"),
    ("telephone", "phone"),
    ("tel", "phone"),
    ("mobile", "phone"),
    ("address", "address.street"),
    ("street", "address.street"),
    ("city", "address.city"),
    ("state", "address.state"),
    ("zip", "address.zipCode"),
    ("zipcode", "address.zipCode"),
    ("postal", "address.zipCode"),
    ("dob", "dateOfBirth"),
    ("birthdate", "dateOfBirth"),
    ("birth_date", "dateOfBirth"),
    ("date_of_birth", "dateOfBirth"),
];

const CATEGORY_RULES: &[(&str, &str)] = &[
    ("consent", "Consent Forms"),
    ("authorization", "Authorization Forms"),
    ("plan", "Plans"),
    ("agreement", "Agreements"),
    ("application", "Applications"),
];

/// Parse leniency options, tried in order. Mirrors the fallback chain used
/// when opening PDFs of unknown provenance: most tolerant first, strict
/// last.
#[derive(Clone, Copy, Debug)]
pub struct PdfLoadOptions {
    pub ignore_encryption: bool,
    pub tolerate_invalid: bool,
}

pub const LOAD_OPTION_CHAIN: [PdfLoadOptions; 3] = [
    PdfLoadOptions {
        ignore_encryption: true,
        tolerate_invalid: true,
    },
    PdfLoadOptions {
        ignore_encryption: true,
        tolerate_invalid: false,
    },
    PdfLoadOptions {
        ignore_encryption: false,
        tolerate_invalid: false,
    },
];

/// Tries each attempt in order, returning the first success. On total
/// failure the last error is kept for diagnostics.
pub fn try_each<I, T, E>(
    attempts: impl IntoIterator<Item = I>,
    mut attempt: impl FnMut(I) -> std::result::Result<T, E>,
) -> std::result::Result<T, Option<E>> {
    let mut last_error = None;
    for item in attempts {
        match attempt(item) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error)
}

/// Opens a PDF, enumerates its form fields and produces a validated
/// template record. The template is inserted into the store on success.
pub async fn load_template(path: &Path, store: &mut TemplateStore) -> Result<PdfTemplate> {
    let raw = tokio::fs::read(path).await?;
    let bytes = coerce_pdf_bytes(raw);

    let doc = parse_pdf(&bytes).map_err(|detail| PipelineError::UnparsablePdf {
        file: path.to_string_lossy().to_string(),
        detail,
    })?;

    let fields = collect_form_fields(&doc);
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let template = PdfTemplate {
        id: generate_id("template"),
        name,
        category: "Uncategorized".to_string(),
        file_path: path.to_path_buf(),
        fields,
        metadata: TemplateMetadata {
            page_count: doc.get_pages().len(),
            file_size: bytes.len(),
            added_date: Utc::now(),
        },
    };

    template
        .validate()
        .map_err(|errors| PipelineError::TemplateValidation { errors })?;

    tracing::info!(
        "Loaded template '{}' with {} fields",
        template.name,
        template.fields.len()
    );
    store.insert(template.clone());
    Ok(template)
}

/// Classifies a template into a display category from its name. Pure and
/// idempotent: applying it twice yields the same category.
pub fn categorize_template(template: &PdfTemplate) -> String {
    let name = template.name.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(keyword, _)| name.contains(keyword))
        .map(|(_, category)| category.to_string())
        .unwrap_or_else(|| "Other".to_string())
}

/// Heuristic field-name inference: lower-case the name and take the first
/// substring rule that matches. No match leaves the suggestion unset.
pub fn suggest_heuristic_mapping(field_name: &str) -> Option<String> {
    let name = field_name.to_lowercase();
    MAPPING_RULES
        .iter()
        .find(|(keyword, _)| name.contains(keyword))
        .map(|(_, path)| path.to_string())
}

/// Accepts raw or base64-encoded PDF bytes (with or without a data-URI
/// prefix) and returns the binary form.
pub fn coerce_pdf_bytes(raw: Vec<u8>) -> Vec<u8> {
    if raw.starts_with(b"%PDF") {
        return raw;
    }
    let Ok(text) = std::str::from_utf8(&raw) else {
        return raw;
    };
    let payload = text.rsplit("base64,").next().unwrap_or(text).trim();
    match BASE64.decode(payload) {
        Ok(decoded) if decoded.starts_with(b"%PDF") => decoded,
        _ => raw,
    }
}

/// Runs the leniency chain over the byte buffer. The first option set that
/// parses wins; if all fail, the last error message is surfaced.
pub fn parse_pdf(bytes: &[u8]) -> std::result::Result<Document, String> {
    try_each(LOAD_OPTION_CHAIN, |options| load_with_options(bytes, options))
        .map_err(|last| last.unwrap_or_else(|| "no parse attempts ran".to_string()))
}

fn load_with_options(
    bytes: &[u8],
    options: PdfLoadOptions,
) -> std::result::Result<Document, String> {
    let doc = Document::load_mem(bytes).map_err(|e| e.to_string())?;

    if doc.is_encrypted() && !options.ignore_encryption {
        return Err("document is encrypted".to_string());
    }
    if !options.tolerate_invalid {
        doc.catalog().map_err(|e| format!("invalid catalog: {}", e))?;
        if doc.get_pages().is_empty() {
            return Err("document has no pages".to_string());
        }
    }
    Ok(doc)
}

/// Enumerates the document's interactive form fields in discovery order,
/// assigning sequential ids and heuristic mapping suggestions.
pub fn collect_form_fields(doc: &Document) -> Vec<FormField> {
    acroform_fields(doc)
        .into_iter()
        .enumerate()
        .map(|(index, (name, object_id))| FormField {
            id: format!("field_{}", index),
            name: name.clone(),
            kind: classify_field_kind(doc, object_id),
            // Position extraction is approximate at best; all-zero marks it
            // as undetermined.
            position: FieldPosition::default(),
            required: false,
            suggested_mapping: suggest_heuristic_mapping(&name),
        })
        .collect()
}

/// Walks the AcroForm field tree and returns (fully-qualified name, object
/// id) for every terminal field, in document order. Malformed entries are
/// skipped.
pub(crate) fn acroform_fields(doc: &Document) -> Vec<(String, ObjectId)> {
    let mut out = Vec::new();

    let Ok(catalog) = doc.catalog() else {
        return out;
    };
    let Ok(acro_obj) = catalog.get(b"AcroForm") else {
        return out;
    };
    let Ok(acro) = resolve(doc, acro_obj).as_dict() else {
        return out;
    };
    let Ok(fields_obj) = acro.get(b"Fields") else {
        return out;
    };
    let Ok(fields) = resolve(doc, fields_obj).as_array() else {
        return out;
    };

    for entry in fields {
        walk_field(doc, entry, None, &mut out);
    }
    out
}

fn walk_field(
    doc: &Document,
    entry: &Object,
    parent_name: Option<&str>,
    out: &mut Vec<(String, ObjectId)>,
) {
    let Ok(object_id) = entry.as_reference() else {
        return;
    };
    let Ok(dict) = doc.get_object(object_id).and_then(|o| o.as_dict()) else {
        return;
    };

    let partial = dict
        .get(b"T")
        .ok()
        .and_then(|t| resolve(doc, t).as_str().ok())
        .map(|bytes| String::from_utf8_lossy(bytes).to_string());

    let full_name = match (parent_name, &partial) {
        (Some(parent), Some(name)) => Some(format!("{}.{}", parent, name)),
        (Some(parent), None) => Some(parent.to_string()),
        (None, name) => name.clone(),
    };

    if dict.has(b"FT") {
        // Terminal field; any kids are widget annotations, not sub-fields.
        if let Some(name) = full_name {
            out.push((name, object_id));
        }
        return;
    }

    if let Ok(kids_obj) = dict.get(b"Kids") {
        if let Ok(kids) = resolve(doc, kids_obj).as_array() {
            for kid in kids {
                walk_field(doc, kid, full_name.as_deref(), out);
            }
        }
    }
}

/// Maps the field's declared FT (and button flags) onto a widget kind.
/// Unrecognized kinds default to text.
pub(crate) fn classify_field_kind(doc: &Document, object_id: ObjectId) -> FieldKind {
    let Ok(dict) = doc.get_object(object_id).and_then(|o| o.as_dict()) else {
        return FieldKind::Text;
    };
    let Some(ft) = dict
        .get(b"FT")
        .ok()
        .and_then(|o| resolve(doc, o).as_name().ok())
    else {
        return FieldKind::Text;
    };
    let flags = dict
        .get(b"Ff")
        .ok()
        .and_then(|o| resolve(doc, o).as_i64().ok())
        .unwrap_or(0);

    if ft == b"Tx" {
        FieldKind::Text
    } else if ft == b"Ch" {
        FieldKind::Dropdown
    } else if ft == b"Sig" {
        FieldKind::Signature
    } else if ft == b"Btn" {
        const PUSHBUTTON: i64 = 1 << 16;
        const RADIO: i64 = 1 << 15;
        if flags & PUSHBUTTON != 0 {
            FieldKind::Text
        } else if flags & RADIO != 0 {
            FieldKind::Radio
        } else {
            FieldKind::Checkbox
        }
    } else {
        FieldKind::Text
    }
}

pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_form_pdf, TestField};
    use std::io::Write;

    fn sample_fields() -> Vec<TestField> {
        vec![
            TestField::text("First Name"),
            TestField::text("DOB"),
            TestField::checkbox("Consent Given"),
            TestField::dropdown("State"),
            TestField::signature("Client Signature"),
        ]
    }

    async fn load_sample() -> (PdfTemplate, tempfile::NamedTempFile) {
        let bytes = build_form_pdf(&sample_fields());
        let mut file = tempfile::Builder::new()
            .prefix("intake_application")
            .suffix(".pdf")
            .tempfile()
            .unwrap();
        file.write_all(&bytes).unwrap();

        let mut store = TemplateStore::new();
        let template = load_template(file.path(), &mut store).await.unwrap();
        assert!(store.contains(&template.id));
        (template, file)
    }

    #[tokio::test]
    async fn template_fields_keep_discovery_order_and_sequential_ids() {
        let (template, _file) = load_sample().await;

        let names: Vec<&str> = template.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "First Name",
                "DOB",
                "Consent Given",
                "State",
                "Client Signature"
            ]
        );
        for (i, field) in template.fields.iter().enumerate() {
            assert_eq!(field.id, format!("field_{}", i));
            assert!(!field.required);
        }
        assert_eq!(template.category, "Uncategorized");
        assert_eq!(template.metadata.page_count, 1);
    }

    #[tokio::test]
    async fn widget_kinds_are_classified_from_runtime_type() {
        let (template, _file) = load_sample().await;

        let kinds: Vec<FieldKind> = template.fields.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            [
                FieldKind::Text,
                FieldKind::Text,
                FieldKind::Checkbox,
                FieldKind::Dropdown,
                FieldKind::Signature
            ]
        );
    }

    #[tokio::test]
    async fn suggested_mappings_come_from_field_names() {
        let (template, _file) = load_sample().await;

        let by_name = |name: &str| {
            template
                .fields
                .iter()
                .find(|f| f.name == name)
                .unwrap()
                .suggested_mapping
                .clone()
        };
        assert_eq!(by_name("First Name").as_deref(), Some("firstName"));
        assert_eq!(by_name("DOB").as_deref(), Some("dateOfBirth"));
        assert_eq!(by_name("State").as_deref(), Some("address.state"));
        assert_eq!(by_name("Consent Given"), None);
    }

    #[test]
    fn radio_button_flag_wins_over_checkbox_default() {
        let bytes = build_form_pdf(&[
            TestField::radio("Gender"),
            TestField::checkbox("Consent"),
        ]);
        let doc = Document::load_mem(&bytes).unwrap();
        let fields = collect_form_fields(&doc);
        assert_eq!(fields[0].kind, FieldKind::Radio);
        assert_eq!(fields[1].kind, FieldKind::Checkbox);
    }

    #[tokio::test]
    async fn garbage_bytes_fail_with_unparsable_pdf() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"definitely not a pdf").unwrap();

        let mut store = TemplateStore::new();
        let err = load_template(file.path(), &mut store).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnparsablePdf { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn heuristic_mapping_is_idempotent_and_ordered() {
        for name in ["First Name", "ZIP Code", "emailAddress", "Telephone"] {
            assert_eq!(
                suggest_heuristic_mapping(name),
                suggest_heuristic_mapping(name)
            );
        }
        // "first" outranks "last" in a name containing both.
        assert_eq!(
            suggest_heuristic_mapping("first_and_last").as_deref(),
            Some("firstName")
        );
        assert_eq!(suggest_heuristic_mapping("Unrelated Field"), None);
    }

    #[test]
    fn categorization_is_idempotent_with_other_fallback() {
        let mut template = PdfTemplate {
            id: "template_1".to_string(),
            name: "Medical Consent 2024".to_string(),
            category: "Uncategorized".to_string(),
            file_path: "consent.pdf".into(),
            fields: Vec::new(),
            metadata: TemplateMetadata {
                page_count: 1,
                file_size: 0,
                added_date: Utc::now(),
            },
        };

        let first = categorize_template(&template);
        template.category = first.clone();
        assert_eq!(categorize_template(&template), first);
        assert_eq!(first, "Consent Forms");

        template.name = "Weekly Newsletter".to_string();
        assert_eq!(categorize_template(&template), "Other");
    }

    #[test]
    fn base64_encoded_input_is_coerced_to_binary() {
        let bytes = build_form_pdf(&[TestField::text("x")]);
        let encoded = BASE64.encode(&bytes);

        assert_eq!(coerce_pdf_bytes(encoded.clone().into_bytes()), bytes);
        assert_eq!(
            coerce_pdf_bytes(format!("data:application/pdf;base64,{}", encoded).into_bytes()),
            bytes
        );
        assert_eq!(coerce_pdf_bytes(bytes.clone()), bytes);
    }

    #[test]
    fn try_each_returns_first_success_and_keeps_last_error() {
        let result: std::result::Result<i32, Option<&str>> =
            try_each([1, 2, 3], |n| if n == 2 { Ok(n * 10) } else { Err("nope") });
        assert_eq!(result.unwrap(), 20);

        let result: std::result::Result<i32, Option<String>> =
            try_each([1, 2, 3], |n| Err(format!("failed on {}", n)));
        assert_eq!(result.unwrap_err(), Some("failed on 3".to_string()));
    }
}
