use crate::error::{PipelineError, Result};
use crate::llm::{mapping::suggest_mapping, LlmClient};
use crate::schema::{Client, FieldKind, FieldMapping, FormField, PdfTemplate};
use crate::template::{acroform_fields, classify_field_kind, resolve};
use chrono::{NaiveDate, Utc};
use lopdf::{Document, Object, ObjectId};
use std::path::PathBuf;

/// Confidence attached to a heuristic suggestion from the field name.
const CONFIDENCE_HEURISTIC: f64 = 0.7;
/// Confidence when no mapping could be determined. Deliberately low so a
/// human reviews the binding.
const CONFIDENCE_UNMAPPED: f64 = 0.3;

/// Resolves a client-data path and transformed value for every template
/// field, in field order.
///
/// Heuristic suggestions win outright; fields without one consult the AI
/// suggester when enabled and configured. An AI failure for one field
/// degrades that field only, never the rest of the batch.
pub async fn map_fields(
    fields: &[FormField],
    client: &Client,
    llm: Option<&LlmClient>,
    use_ai: bool,
) -> Vec<FieldMapping> {
    let available_paths = client.field_paths();
    let mut mappings = Vec::with_capacity(fields.len());

    for field in fields {
        let (mut path, mut confidence) = match &field.suggested_mapping {
            Some(suggested) => (suggested.clone(), CONFIDENCE_HEURISTIC),
            None => (String::new(), CONFIDENCE_UNMAPPED),
        };

        if path.is_empty() && use_ai {
            if let Some(llm) = llm.filter(|l| l.is_configured()) {
                let suggestion = suggest_mapping(llm, &field.name, "", &available_paths).await;
                path = suggestion.suggested_field;
                confidence = suggestion.confidence;
            }
        }

        let raw = client.value_at_path(&path);
        let value = transform_value(raw.as_deref(), field.kind);

        mappings.push(FieldMapping {
            field_id: field.id.clone(),
            field_name: field.name.clone(),
            client_data_path: path,
            value: Some(value),
            confidence,
            manually_mapped: false,
        });
    }

    mappings
}

/// Applies the type-appropriate transform to a resolved raw value. A value
/// that did not resolve becomes the empty string.
pub fn transform_value(raw: Option<&str>, kind: FieldKind) -> String {
    let Some(value) = raw else {
        return String::new();
    };

    match kind {
        FieldKind::Date => format_date(value),
        FieldKind::Text => {
            if value.len() >= 10
                && value.len() <= 11
                && value.bytes().all(|b| b.is_ascii_digit())
            {
                format_phone(value)
            } else {
                value.to_string()
            }
        }
        FieldKind::Checkbox => {
            if is_truthy(value) {
                "Yes".to_string()
            } else {
                "No".to_string()
            }
        }
        _ => value.to_string(),
    }
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && !matches!(value.to_lowercase().as_str(), "false" | "no" | "0" | "off")
}

/// Locale date rendering: ISO dates become MM/DD/YYYY, anything unparsable
/// becomes empty.
pub fn format_date(value: &str) -> String {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.format("%m/%d/%Y").to_string();
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return dt.format("%m/%d/%Y").to_string();
    }
    String::new()
}

/// US phone rendering for bare 10/11-digit strings; anything else passes
/// through unchanged.
pub fn format_phone(value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        11 => format!(
            "+{} ({}) {}-{}",
            &digits[..1],
            &digits[1..4],
            &digits[4..7],
            &digits[7..]
        ),
        _ => value.to_string(),
    }
}

/// File names derived from client/template data: keep alphanumerics and
/// dots, everything else becomes an underscore.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}

/// Fills the template's live form with the client's data and returns the
/// serialized document plus the mappings that drove it.
pub async fn fill_form(
    template: &PdfTemplate,
    client: &Client,
    llm: Option<&LlmClient>,
    use_ai: bool,
) -> Result<(Vec<u8>, Vec<FieldMapping>)> {
    let bytes = tokio::fs::read(&template.file_path).await?;
    let mut doc = Document::load_mem(&bytes).map_err(|e| PipelineError::UnparsablePdf {
        file: template.file_path.to_string_lossy().to_string(),
        detail: e.to_string(),
    })?;

    let mappings = map_fields(&template.fields, client, llm, use_ai).await;
    let live_fields = acroform_fields(&doc);

    for mapping in &mappings {
        let Some(value) = &mapping.value else {
            continue;
        };
        match live_fields.iter().find(|(name, _)| name == &mapping.field_name) {
            Some((_, object_id)) => {
                if let Err(e) = fill_field(&mut doc, *object_id, value) {
                    tracing::warn!("Failed to fill field '{}': {}", mapping.field_name, e);
                }
            }
            None => {
                tracing::warn!(
                    "Field '{}' not present in live form, skipped",
                    mapping.field_name
                );
            }
        }
    }

    // Form flattening (making fields non-editable) is supported by setting
    // the read-only flag per field, but stays off: reviewers want editable
    // output for now.
    if let Err(e) = set_need_appearances(&mut doc) {
        tracing::warn!("Could not set NeedAppearances: {}", e);
    }

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PipelineError::Extraction(format!("cannot serialize filled PDF: {}", e)))?;
    Ok((out, mappings))
}

fn fill_field(doc: &mut Document, object_id: ObjectId, value: &str) -> lopdf::Result<()> {
    let kind = classify_field_kind(doc, object_id);

    match kind {
        FieldKind::Text | FieldKind::Date => {
            let dict = doc.get_object_mut(object_id)?.as_dict_mut()?;
            dict.set("V", Object::string_literal(value));
        }
        FieldKind::Checkbox => {
            let checked = matches!(value, "true" | "Yes" | "1");
            let on_state = checkbox_on_state(doc, object_id);
            let state = if checked { on_state } else { "Off".to_string() };
            let dict = doc.get_object_mut(object_id)?.as_dict_mut()?;
            dict.set("V", Object::Name(state.clone().into_bytes()));
            dict.set("AS", Object::Name(state.into_bytes()));
        }
        FieldKind::Dropdown => {
            let dict = doc.get_object_mut(object_id)?.as_dict_mut()?;
            dict.set("V", Object::string_literal(value));
        }
        FieldKind::Radio => {
            // Writing Off here would clear a selection already present in
            // the source form.
            tracing::warn!("Radio groups are not auto-filled, skipped");
        }
        FieldKind::Signature => {
            tracing::debug!("Signature fields are not fillable, skipped");
        }
    }
    Ok(())
}

/// The appearance-state name a checkbox uses when checked, from its /AP
/// normal-appearance dictionary. Falls back to the conventional "Yes".
fn checkbox_on_state(doc: &Document, object_id: ObjectId) -> String {
    let Ok(dict) = doc.get_object(object_id).and_then(|o| o.as_dict()) else {
        return "Yes".to_string();
    };
    let normal = dict
        .get(b"AP")
        .ok()
        .and_then(|ap| resolve(doc, ap).as_dict().ok())
        .and_then(|ap| ap.get(b"N").ok())
        .and_then(|n| resolve(doc, n).as_dict().ok());

    if let Some(normal) = normal {
        for (key, _) in normal.iter() {
            if key.as_slice() != b"Off" {
                return String::from_utf8_lossy(key).to_string();
            }
        }
    }
    "Yes".to_string()
}

/// Asks viewers to regenerate widget appearances so written values render.
fn set_need_appearances(doc: &mut Document) -> lopdf::Result<()> {
    let acroform_entry = doc.catalog()?.get(b"AcroForm")?.clone();

    match acroform_entry {
        Object::Reference(id) => {
            let acroform = doc.get_object_mut(id)?.as_dict_mut()?;
            acroform.set("NeedAppearances", Object::Boolean(true));
        }
        Object::Dictionary(_) => {
            let root_id = doc.trailer.get(b"Root")?.as_reference()?;
            let catalog = doc.get_object_mut(root_id)?.as_dict_mut()?;
            let acroform = catalog.get_mut(b"AcroForm")?.as_dict_mut()?;
            acroform.set("NeedAppearances", Object::Boolean(true));
        }
        _ => {}
    }
    Ok(())
}

/// Selects an output directory when the caller did not supply one. The CLI
/// backs this with an interactive prompt; tests stub it out.
pub trait DirectoryPicker {
    fn pick_directory(&self) -> Option<PathBuf>;
}

pub struct PromptPicker;

impl DirectoryPicker for PromptPicker {
    fn pick_directory(&self) -> Option<PathBuf> {
        let input: String = dialoguer::Input::new()
            .with_prompt("Output directory")
            .allow_empty(true)
            .interact_text()
            .ok()?;
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }
}

/// Writes filled PDF bytes under a deterministic name:
/// `{lastName}_{firstName}_{templateName}_{timestamp}.pdf`.
pub async fn export_pdf(
    bytes: &[u8],
    client: &Client,
    template: &PdfTemplate,
    output_dir: Option<PathBuf>,
    picker: &dyn DirectoryPicker,
) -> Result<PathBuf> {
    let directory = output_dir
        .or_else(|| picker.pick_directory())
        .ok_or(PipelineError::NoOutputDirectory)?;

    let file_name = sanitize_file_name(&format!(
        "{}_{}_{}_{}.pdf",
        client.last_name,
        client.first_name,
        template.name,
        Utc::now().timestamp_millis()
    ));

    let path = directory.join(file_name);
    tokio::fs::write(&path, bytes).await?;
    tracing::info!("Exported filled PDF to {:?}", path);
    Ok(path)
}
