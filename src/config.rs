use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const OBFUSCATION_KEY: &[u8] = b"FormPilot2026SecretKey!@#$%";

#[derive(Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm_base_url: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
    /// AI API key, XOR-obfuscated and base64-encoded. Kept out of plain
    /// sight in the config file; this is an opaque string store, not real
    /// at-rest encryption.
    #[serde(default)]
    api_key_obfuscated: Option<String>,
}

fn obfuscate(data: &str) -> String {
    let bytes: Vec<u8> = data
        .bytes()
        .zip(OBFUSCATION_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    BASE64.encode(bytes)
}

fn deobfuscate(encoded: &str) -> Option<String> {
    let bytes = BASE64.decode(encoded).ok()?;
    let decoded: Vec<u8> = bytes
        .iter()
        .zip(OBFUSCATION_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    String::from_utf8(decoded).ok()
}

impl Config {
    /// Get the application data directory
    pub fn get_app_data_dir() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("formpilot");

        if !path.exists() {
            let _ = std::fs::create_dir_all(&path);
        }
        path
    }

    fn config_path() -> PathBuf {
        Self::get_app_data_dir().join("config.json")
    }

    pub fn load() -> Config {
        let path = Self::config_path();
        if path.exists() {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                if let Ok(config) = serde_json::from_str(&contents) {
                    return config;
                }
            }
        }
        Config::default()
    }

    pub fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::config_path(), contents)?;
        Ok(())
    }

    /// Persist the AI API key (obfuscated).
    pub fn save_api_key(key: &str) -> Result<()> {
        let mut config = Config::load();
        config.api_key_obfuscated = Some(obfuscate(key));
        config.save()
    }

    /// Retrieve the persisted AI API key, if any.
    pub fn get_api_key() -> Option<String> {
        let config = Config::load();
        deobfuscate(&config.api_key_obfuscated?)
    }

    pub fn clear_api_key() -> Result<()> {
        let mut config = Config::load();
        config.api_key_obfuscated = None;
        config.save()
    }

    pub fn save_llm_settings(base_url: Option<String>, model: Option<String>) -> Result<()> {
        let mut config = Config::load();
        if base_url.is_some() {
            config.llm_base_url = base_url;
        }
        if model.is_some() {
            config.llm_model = model;
        }
        config.save()
    }
}
