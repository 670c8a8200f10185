use crate::error::{PipelineError, Result};
use crate::llm::{first_json_object, LlmClient};
use crate::schema::MappingSuggestion;

const MAX_ALTERNATIVES: usize = 3;

/// Asks the model which client-data path a PDF field should map to.
///
/// Never fails: any error (not configured, timeout, malformed response)
/// degrades to a low-confidence fallback pointing at the first available
/// path, which a human can review. Aborting an entire form fill over one
/// field would be worse.
pub async fn suggest_mapping(
    llm: &LlmClient,
    field_name: &str,
    context: &str,
    available_paths: &[String],
) -> MappingSuggestion {
    match try_suggest(llm, field_name, context, available_paths).await {
        Ok(suggestion) => suggestion,
        Err(e) => {
            tracing::warn!("AI mapping for '{}' failed, using fallback: {}", field_name, e);
            MappingSuggestion {
                suggested_field: available_paths.first().cloned().unwrap_or_default(),
                confidence: 0.1,
                reasoning: "AI service unavailable, showing first available field".to_string(),
                alternatives: Vec::new(),
            }
        }
    }
}

async fn try_suggest(
    llm: &LlmClient,
    field_name: &str,
    context: &str,
    available_paths: &[String],
) -> Result<MappingSuggestion> {
    if !llm.is_configured() {
        return Err(PipelineError::NotConfigured);
    }

    let prompt = build_mapping_prompt(field_name, context, available_paths);
    let response = llm.generate_content(&prompt).await?;

    let payload = first_json_object(&response).ok_or_else(|| {
        PipelineError::MalformedAiResponse("no JSON object in model response".to_string())
    })?;

    let mut suggestion: MappingSuggestion = serde_json::from_str(payload)
        .map_err(|e| PipelineError::MalformedAiResponse(format!("unparsable payload: {}", e)))?;

    suggestion.confidence = suggestion.confidence.clamp(0.0, 1.0);
    suggestion.alternatives.truncate(MAX_ALTERNATIVES);
    for alternative in &mut suggestion.alternatives {
        alternative.confidence = alternative.confidence.clamp(0.0, 1.0);
    }
    Ok(suggestion)
}

fn build_mapping_prompt(field_name: &str, context: &str, available_paths: &[String]) -> String {
    format!(
        "You are helping map PDF form fields to client data fields.\n\n\
         PDF Field Name: \"{field_name}\"\n\
         Context: {context}\n\n\
         Available client data fields:\n{}\n\n\
         Based on the PDF field name and context, suggest which client data field it should map to.\n\
         Provide your response in JSON format with:\n\
         - suggestedField: the best matching field name\n\
         - confidence: a number between 0 and 1\n\
         - reasoning: brief explanation\n\
         - alternatives: array of up to 3 alternative matches with their confidence scores\n\n\
         Example response:\n\
         {{\n\
         \x20 \"suggestedField\": \"firstName\",\n\
         \x20 \"confidence\": 0.95,\n\
         \x20 \"reasoning\": \"Field name clearly indicates first name\",\n\
         \x20 \"alternatives\": [\n\
         \x20   {{\"field\": \"lastName\", \"confidence\": 0.3}}\n\
         \x20 ]\n\
         }}",
        available_paths.join(", ")
    )
}
