use crate::documents;
use crate::error::{PipelineError, Result};
use crate::llm::{first_json_object, LlmClient};
use crate::schema::{Address, ClientDraft};
use std::path::Path;

/// Sends document text to the model and parses a structured client delta
/// from its response, merging it into the existing profile when one is
/// supplied. There is no safe default guess for client data, so a malformed
/// response surfaces to the caller.
pub async fn extract_client_data(
    llm: &LlmClient,
    text: &str,
    existing: Option<&ClientDraft>,
) -> Result<ClientDraft> {
    if !llm.is_configured() {
        return Err(PipelineError::NotConfigured);
    }

    let prompt = build_extraction_prompt(text, existing);
    let response = llm.generate_content(&prompt).await?;

    let payload = first_json_object(&response).ok_or_else(|| {
        PipelineError::MalformedAiResponse("no JSON object in model response".to_string())
    })?;

    let extracted: ClientDraft = serde_json::from_str(payload)
        .map_err(|e| PipelineError::MalformedAiResponse(format!("unparsable payload: {}", e)))?;

    Ok(match existing {
        Some(profile) => merge_client_data(profile, &extracted),
        None => extracted,
    })
}

/// Folds over files sequentially, feeding each file's result into the next
/// extraction as the existing profile. A failure on one file is logged and
/// skipped so the accumulated profile survives.
pub async fn extract_client_from_files(llm: &LlmClient, paths: &[&Path]) -> Result<ClientDraft> {
    let mut profile = ClientDraft::default();

    for path in paths {
        let outcome = async {
            let text = documents::extract_text(path).await?;
            extract_client_data(llm, &text, Some(&profile)).await
        }
        .await;

        match outcome {
            Ok(merged) => profile = merged,
            Err(PipelineError::NotConfigured) => return Err(PipelineError::NotConfigured),
            Err(e) => tracing::warn!("Failed to process {:?}, continuing: {}", path, e),
        }
    }

    Ok(profile)
}

fn build_extraction_prompt(text: &str, existing: Option<&ClientDraft>) -> String {
    let existing_block = existing
        .and_then(|profile| serde_json::to_string_pretty(profile).ok())
        .map(|json| format!("\n\nExisting client data to merge with:\n{}\n", json))
        .unwrap_or_default();

    let merge_instruction = if existing.is_some() {
        "\nMerge this new information with the existing data, keeping the most \
         complete/recent information.\n"
    } else {
        ""
    };

    format!(
        "Extract client/patient information from the following document text.{existing_block}\n\
         Document text:\n{text}\n\n\
         Extract and return ONLY a JSON object with these fields (only include fields you find):\n\
         {{\n\
         \x20 \"firstName\": \"string\",\n\
         \x20 \"lastName\": \"string\",\n\
         \x20 \"dateOfBirth\": \"YYYY-MM-DD format\",\n\
         \x20 \"email\": \"string\",\n\
         \x20 \"phone\": \"string\",\n\
         \x20 \"address\": {{\n\
         \x20   \"street\": \"string\",\n\
         \x20   \"city\": \"string\",\n\
         \x20   \"state\": \"string\",\n\
         \x20   \"zipCode\": \"string\"\n\
         \x20 }},\n\
         \x20 \"customFields\": {{}}\n\
         }}\n\
         {merge_instruction}\n\
         Return ONLY the JSON object, no other text."
    )
}

/// Merge policy: top level is shallow; `address` and `customFields` merge
/// key-by-key. A non-empty new value always overwrites; an empty or missing
/// new value never does.
pub fn merge_client_data(existing: &ClientDraft, new: &ClientDraft) -> ClientDraft {
    let mut merged = existing.clone();

    merge_field(&mut merged.first_name, &new.first_name);
    merge_field(&mut merged.last_name, &new.last_name);
    merge_field(&mut merged.date_of_birth, &new.date_of_birth);
    merge_field(&mut merged.email, &new.email);
    merge_field(&mut merged.phone, &new.phone);

    if let Some(new_addr) = &new.address {
        let addr = merged.address.get_or_insert_with(Address::default);
        merge_field(&mut addr.street, &new_addr.street);
        merge_field(&mut addr.city, &new_addr.city);
        merge_field(&mut addr.state, &new_addr.state);
        merge_field(&mut addr.zip_code, &new_addr.zip_code);
        merge_field(&mut addr.country, &new_addr.country);
    }

    for (key, value) in &new.custom_fields {
        if !value.is_empty() {
            merged.custom_fields.insert(key.clone(), value.clone());
        }
    }

    merged
}

fn merge_field(target: &mut Option<String>, new: &Option<String>) {
    if let Some(value) = new {
        if !value.is_empty() {
            *target = Some(value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CustomValue;

    fn draft(first: Option<&str>, email: Option<&str>) -> ClientDraft {
        ClientDraft {
            first_name: first.map(String::from),
            email: email.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn non_empty_new_values_always_overwrite() {
        let existing = draft(Some("Ann"), Some("old@x.com"));
        let new = draft(Some("Anna"), Some("new@x.com"));

        let merged = merge_client_data(&existing, &new);
        assert_eq!(merged.first_name.as_deref(), Some("Anna"));
        assert_eq!(merged.email.as_deref(), Some("new@x.com"));
    }

    #[test]
    fn empty_new_values_never_overwrite() {
        let existing = draft(Some("Ann"), Some("ann@x.com"));
        let new = draft(Some(""), None);

        let merged = merge_client_data(&existing, &new);
        assert_eq!(merged.first_name.as_deref(), Some("Ann"));
        assert_eq!(merged.email.as_deref(), Some("ann@x.com"));
    }

    #[test]
    fn address_merges_key_by_key() {
        let existing = ClientDraft {
            address: Some(Address {
                street: Some("1 Main St".to_string()),
                city: Some("Springfield".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let new = ClientDraft {
            address: Some(Address {
                city: Some("Shelbyville".to_string()),
                zip_code: Some("12345".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = merge_client_data(&existing, &new);
        let addr = merged.address.unwrap();
        assert_eq!(addr.street.as_deref(), Some("1 Main St"));
        assert_eq!(addr.city.as_deref(), Some("Shelbyville"));
        assert_eq!(addr.zip_code.as_deref(), Some("12345"));
    }

    #[test]
    fn custom_fields_merge_and_skip_empty() {
        let mut existing = ClientDraft::default();
        existing
            .custom_fields
            .insert("plan".to_string(), CustomValue::Text("gold".to_string()));

        let mut new = ClientDraft::default();
        new.custom_fields
            .insert("plan".to_string(), CustomValue::Text(String::new()));
        new.custom_fields
            .insert("copay".to_string(), CustomValue::Number(25.0));

        let merged = merge_client_data(&existing, &new);
        assert_eq!(
            merged.custom_fields.get("plan"),
            Some(&CustomValue::Text("gold".to_string()))
        );
        assert_eq!(
            merged.custom_fields.get("copay"),
            Some(&CustomValue::Number(25.0))
        );
    }

    #[test]
    fn extraction_prompt_embeds_text_and_existing_profile() {
        let profile = draft(Some("Ann"), None);
        let prompt = build_extraction_prompt("Name: Ann Lee", Some(&profile));

        assert!(prompt.contains("Document text:\nName: Ann Lee"));
        assert!(prompt.contains("Existing client data to merge with:"));
        assert!(prompt.contains("\"firstName\": \"Ann\""));
        assert!(prompt.contains("Return ONLY the JSON object"));
    }

    #[test]
    fn prompt_without_existing_profile_omits_merge_instruction() {
        let prompt = build_extraction_prompt("some text", None);
        assert!(!prompt.contains("Existing client data"));
        assert!(!prompt.contains("Merge this new information"));
    }

    #[tokio::test]
    async fn extraction_requires_configuration() {
        let llm = LlmClient::new(None, None);
        let err = extract_client_data(&llm, "text", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotConfigured));
    }

    #[test]
    fn model_payload_parses_into_draft() {
        let payload = r#"{
            "firstName": "Ann",
            "lastName": "Lee",
            "dateOfBirth": "1990-05-02",
            "address": {"city": "Springfield", "zipCode": "12345"},
            "customFields": {"Insurance ID": "XYZ-9"}
        }"#;
        let parsed: ClientDraft = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.first_name.as_deref(), Some("Ann"));
        assert_eq!(
            parsed.address.as_ref().unwrap().zip_code.as_deref(),
            Some("12345")
        );
        assert_eq!(
            parsed.custom_fields.get("Insurance ID"),
            Some(&CustomValue::Text("XYZ-9".to_string()))
        );
    }
}
