use std::collections::HashMap;

use crate::{gemini::DEMO_KEY, models::Language};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub gemini_image_model: String,
    pub gemini_text_model: String,
    /// Street view source selection is disabled without this key.
    pub google_maps_api_key: Option<String>,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub default_language: Language,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: DEMO_KEY.to_string(),
            gemini_api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_image_model: "gemini-2.5-flash-image-preview".to_string(),
            gemini_text_model: "gemini-2.5-flash".to_string(),
            google_maps_api_key: None,
            port: 8080,
            max_upload_bytes: 20 * 1024 * 1024,
            default_language: Language::En,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars().collect())
    }

    /// Unset or empty values keep their default; unparsable ones log a warning.
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(v) = get("GEMINI_API_KEY") {
            config.gemini_api_key = v;
        }
        if let Some(v) = get("GEMINI_API_BASE") {
            config.gemini_api_base = v;
        }
        if let Some(v) = get("GEMINI_IMAGE_MODEL") {
            config.gemini_image_model = v;
        }
        if let Some(v) = get("GEMINI_TEXT_MODEL") {
            config.gemini_text_model = v;
        }
        config.google_maps_api_key = get("GOOGLE_MAPS_API_KEY");

        if let Some(v) = get("PORT") {
            match v.parse() {
                Ok(port) => config.port = port,
                Err(_) => tracing::warn!("⚠️ Ignoring invalid PORT={}", v),
            }
        }
        if let Some(v) = get("MAX_UPLOAD_BYTES") {
            match v.parse() {
                Ok(n) => config.max_upload_bytes = n,
                Err(_) => tracing::warn!("⚠️ Ignoring invalid MAX_UPLOAD_BYTES={}", v),
            }
        }
        if let Some(v) = get("DEFAULT_LANGUAGE") {
            match v.parse() {
                Ok(lang) => config.default_language = lang,
                Err(e) => tracing::warn!("⚠️ Ignoring DEFAULT_LANGUAGE: {}", e),
            }
        }
        config
    }

    /// First few characters of the key, for startup logging.
    pub fn masked_api_key(&self) -> String {
        let prefix: String = self.gemini_api_key.chars().take(6).collect();
        format!("{}...", prefix)
    }
}
