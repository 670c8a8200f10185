use crate::config::Config;
use crate::error::PipelineError;
use crate::formfill::{self, PromptPicker};
use crate::ingest;
use crate::llm::{extract, LlmClient};
use crate::schema::Client;
use crate::store::{ClientStore, TemplateStore};
use crate::template;
use std::path::{Path, PathBuf};

pub async fn run_import_clients(path: &Path) -> anyhow::Result<()> {
    tracing::info!("Importing clients from {:?}", path);

    let mut store = ClientStore::new();
    let clients = ingest::load_clients_from_file(path, &mut store).await?;

    println!("Imported {} client(s):", clients.len());
    for client in store.all() {
        println!(
            "  {} - {} {} <{}>",
            client.id,
            client.first_name,
            client.last_name,
            client.email.as_deref().unwrap_or("no email")
        );
    }
    Ok(())
}

pub async fn run_load_template(path: &Path) -> anyhow::Result<()> {
    tracing::info!("Loading template from {:?}", path);

    let mut store = TemplateStore::new();
    let mut loaded = template::load_template(path, &mut store).await?;
    loaded.category = template::categorize_template(&loaded);
    store.insert(loaded.clone());

    println!(
        "Template '{}' ({}, {} page(s), {} field(s)):",
        loaded.name,
        loaded.category,
        loaded.metadata.page_count,
        loaded.fields.len()
    );
    for field in &loaded.fields {
        let mapping = field
            .suggested_mapping
            .as_deref()
            .unwrap_or("(no suggestion)");
        println!("  {:?} '{}' -> {}", field.kind, field.name, mapping);
    }
    Ok(())
}

pub async fn run_fill(
    template_path: &Path,
    client_file: &Path,
    client_id: Option<String>,
    output_dir: Option<PathBuf>,
    no_ai: bool,
) -> anyhow::Result<()> {
    let mut clients = ClientStore::new();
    let imported = ingest::load_clients_from_file(client_file, &mut clients).await?;
    let client = select_client(&imported, client_id.as_deref())?;
    tracing::info!("Filling for client {} {}", client.first_name, client.last_name);

    let mut templates = TemplateStore::new();
    let mut loaded = template::load_template(template_path, &mut templates).await?;
    loaded.category = template::categorize_template(&loaded);

    // The AI suggester is optional here: without a key the heuristic
    // mappings still apply and unmapped fields are left blank.
    let llm = if no_ai {
        None
    } else {
        let mut llm = LlmClient::from_config(&Config::load());
        match llm.initialize(None) {
            Ok(()) => Some(llm),
            Err(PipelineError::NotConfigured) => {
                tracing::warn!("No API key configured, filling without AI suggestions");
                None
            }
            Err(e) => return Err(e.into()),
        }
    };

    let (bytes, mappings) = formfill::fill_form(&loaded, client, llm.as_ref(), llm.is_some()).await?;

    println!("Mapped {} field(s):", mappings.len());
    for mapping in &mappings {
        println!(
            "  '{}' <- {} (confidence {:.1}) = {:?}",
            mapping.field_name,
            if mapping.client_data_path.is_empty() {
                "(unmapped)"
            } else {
                &mapping.client_data_path
            },
            mapping.confidence,
            mapping.value.as_deref().unwrap_or("")
        );
    }

    let path = formfill::export_pdf(&bytes, client, &loaded, output_dir, &PromptPicker).await?;
    println!("Wrote {:?}", path);
    Ok(())
}

fn select_client<'a>(clients: &'a [Client], client_id: Option<&str>) -> anyhow::Result<&'a Client> {
    match client_id {
        Some(id) => clients
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow::anyhow!("No client with id '{}' in the imported file", id)),
        None => clients
            .first()
            .ok_or_else(|| anyhow::anyhow!("The client file produced no valid clients")),
    }
}

pub async fn run_extract(paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut llm = LlmClient::from_config(&Config::load());
    if llm.initialize(None).is_err() {
        anyhow::bail!("AI extraction needs an API key. Run `formpilot set-api-key` first.");
    }

    let refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
    let draft = extract::extract_client_from_files(&llm, &refs).await?;

    println!("{}", serde_json::to_string_pretty(&draft)?);

    match draft.into_client("document") {
        Ok(client) => tracing::info!("Extracted profile validates as client {}", client.id),
        Err(e) => {
            tracing::warn!("Extracted profile is incomplete: {}", e);
            println!("Note: profile is incomplete ({})", e);
        }
    }
    Ok(())
}

pub fn run_set_api_key(key: Option<String>) -> anyhow::Result<()> {
    let key = match key {
        Some(key) => key,
        None => dialoguer::Password::new()
            .with_prompt("API key")
            .interact()?,
    };

    if key.trim().is_empty() {
        Config::clear_api_key()?;
        println!("API key cleared.");
    } else {
        Config::save_api_key(key.trim())?;
        println!("API key saved.");
    }
    Ok(())
}

pub fn run_configure_llm(base_url: Option<String>, model: Option<String>) -> anyhow::Result<()> {
    if base_url.is_none() && model.is_none() {
        let config = Config::load();
        println!(
            "base-url: {}\nmodel: {}",
            config.llm_base_url.as_deref().unwrap_or("(default)"),
            config.llm_model.as_deref().unwrap_or("(default)")
        );
        return Ok(());
    }
    Config::save_llm_settings(base_url, model)?;
    println!("LLM settings saved.");
    Ok(())
}
