use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::io::Cursor;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    config::AppConfig,
    models::{Language, SourceImage},
    services::{AnalysisError, ImageSynthesisService, NarrationService, ScriptError, SynthesisError},
};

pub const DEMO_KEY: &str = "DEMO_KEY";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("base64 decode error: {0}")]
    Decode(String),
    #[error("no image data in response")]
    NoImage,
    #[error("no text content in response")]
    NoText,
}

// reqwest errors render their URL; drop it so nothing request-specific leaks into messages.
fn http_error(e: reqwest::Error) -> GeminiError {
    GeminiError::Http(e.without_url().to_string())
}

// Replaces long base64 `data` fields so request/response bodies stay readable in logs.
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && s.is_ascii() {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn loggable(value: &serde_json::Value) -> String {
    let mut copy = value.clone();
    truncate_base64_in_json(&mut copy);
    serde_json::to_string(&copy).unwrap_or_default()
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    image_model: String,
    text_model: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_api_base.trim_end_matches('/').to_string(),
            image_model: config.gemini_image_model.clone(),
            text_model: config.gemini_text_model.clone(),
        }
    }

    pub fn is_demo(&self) -> bool {
        self.api_key.is_empty() || self.api_key == DEMO_KEY
    }

    async fn generate_content(&self, model: &str, body: serde_json::Value) -> Result<GeminiResponse, GeminiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        info!("🔗 Making request to: {}", url);
        info!("📤 Request body: {}", loggable(&body));

        let response = self.client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await.map_err(http_error)?;
        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(GeminiError::Http(format!("status={} body={}", status, response_text)));
        }

        let parsed: serde_json::Value = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Parse(e.to_string()))?;
        info!("📥 Raw Gemini API response: {}", loggable(&parsed));

        serde_json::from_value(parsed).map_err(|e| GeminiError::Parse(e.to_string()))
    }

    fn image_part(image: &SourceImage) -> serde_json::Value {
        json!({
            "inlineData": {
                "mimeType": image.mime_type,
                "data": base64::engine::general_purpose::STANDARD.encode(&image.bytes),
            }
        })
    }

    pub async fn generate_image(&self, prompt: &str, image: &SourceImage) -> Result<Bytes, GeminiError> {
        let body = json!({
            "contents": [{
                "parts": [Self::image_part(image), {"text": prompt}]
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "candidateCount": 1
            }
        });
        let parsed = self.generate_content(&self.image_model, body).await?;
        let data = extract_first_image_b64(&parsed).ok_or(GeminiError::NoImage)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .map_err(|e| GeminiError::Decode(e.to_string()))?;
        info!("🖼️ Extracted image from API response ({} bytes)", bytes.len());
        Ok(Bytes::from(bytes))
    }

    pub async fn generate_text(&self, prompt: &str, image: Option<&SourceImage>) -> Result<String, GeminiError> {
        let mut parts = Vec::new();
        if let Some(image) = image {
            parts.push(Self::image_part(image));
        }
        parts.push(json!({ "text": prompt }));

        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "temperature": 0.7,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": 600
            }
        });
        let parsed = self.generate_content(&self.text_model, body).await?;
        extract_first_text(&parsed).ok_or(GeminiError::NoText)
    }
}

pub fn scene_prompt() -> &'static str {
    "Describe the subject and setting of this photo in one short sentence (under 25 words). \
     Mention the type of place and the main structures or materials visible. No preamble."
}

pub fn script_prompt(language: Language, scene: &str) -> String {
    let scene = scene.trim();
    match language {
        Language::En => {
            let subject = if scene.is_empty() {
                "an ordinary place".to_string()
            } else {
                format!("this scene: {scene}")
            };
            format!(
                "Write a calm documentary voice-over script (about 150 words) imagining {subject} after humans vanish. \
                 Move through six moments in order: 1 year, 100 years, 1,000 years, 10,000 years, 100,000 years and 1,000,000 years. \
                 One or two sentences per moment. Plain prose, no headings, no lists."
            )
        }
        Language::Zh => {
            let subject = if scene.is_empty() { "一个普通的地方".to_string() } else { format!("这个场景：{scene}") };
            format!(
                "请用中文写一段平静的纪录片旁白（约300字），想象{subject}在人类消失之后的样子。\
                 按顺序描述六个时刻：1年、100年、1000年、1万年、10万年和100万年。\
                 每个时刻一到两句话。只写正文，不要标题或列表。"
            )
        }
        Language::Ja => {
            let subject = if scene.is_empty() { "ありふれた場所".to_string() } else { format!("この風景（{scene}）") };
            format!(
                "日本語で、人類が消えた後の{subject}を想像する落ち着いたドキュメンタリーのナレーション原稿（約300字）を書いてください。\
                 1年後、100年後、1000年後、1万年後、10万年後、100万年後の6つの時点を順番に描写します。\
                 各時点は1〜2文で。見出しや箇条書きは使わず、本文のみ。"
            )
        }
    }
}

fn demo_script(language: Language) -> &'static str {
    match language {
        Language::En => "Demo narration: one year on, weeds split the pavement. After a century the roofs are gone. \
                         A thousand years later forest hides the last walls, and in a million years nothing remains to say we were here.",
        Language::Zh => "演示旁白：一年后，杂草钻出路面。一百年后，屋顶已经消失。一千年后，森林掩盖了最后的墙壁；一百万年后，再也没有任何痕迹表明我们曾经存在。",
        Language::Ja => "デモ用ナレーション：1年後、舗装を雑草が割る。100年後、屋根は消えている。1000年後、森が最後の壁を覆い、100万年後には私たちがいた証は何も残らない。",
    }
}

/// Solid tinted PNG standing in for a real render in demo mode.
pub fn placeholder_png(prompt: &str) -> Result<Bytes, image::ImageError> {
    let stage_colors: [[u8; 3]; 6] = [
        [0x3B, 0x82, 0xF6],
        [0x10, 0xB9, 0x81],
        [0xF5, 0x9E, 0x0B],
        [0x8B, 0x5C, 0xF6],
        [0xEF, 0x44, 0x44],
        [0x6B, 0x72, 0x80],
    ];
    let base = stage_colors[prompt.chars().count() % stage_colors.len()];
    let img = RgbImage::from_fn(64, 64, |_, y| {
        let fade = (y as u16 * 2).min(255) as u8 / 2;
        Rgb([base[0].saturating_sub(fade), base[1].saturating_sub(fade), base[2].saturating_sub(fade)])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(Bytes::from(out.into_inner()))
}

#[async_trait]
impl ImageSynthesisService for GeminiClient {
    async fn synthesize(&self, prompt: &str, image: &SourceImage) -> Result<Bytes, SynthesisError> {
        if self.is_demo() {
            info!("Using demo mode - no real images generated");
            return placeholder_png(prompt).map_err(|e| SynthesisError(e.to_string()));
        }
        info!("🎯 Generating future image with prompt (truncated): {}", prompt.chars().take(80).collect::<String>());
        match self.generate_image(prompt, image).await {
            Ok(bytes) => {
                info!("✅ Successfully generated image ({} bytes)", bytes.len());
                Ok(bytes)
            }
            Err(e) => {
                error!("❌ Failed to generate image: {}", e);
                Err(SynthesisError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl NarrationService for GeminiClient {
    async fn analyze_scene(&self, image: &SourceImage) -> Result<String, AnalysisError> {
        if self.is_demo() {
            return Ok("A quiet street with low buildings, parked cars and a few trees.".to_string());
        }
        let text = self
            .generate_text(scene_prompt(), Some(image))
            .await
            .map_err(|e| AnalysisError(e.to_string()))?;
        info!("✅ Scene described ({} chars)", text.len());
        Ok(text)
    }

    async fn write_script(&self, language: Language, scene: &str) -> Result<String, ScriptError> {
        if self.is_demo() {
            info!("Using demo mode - generating fallback script");
            return Ok(demo_script(language).to_string());
        }
        if scene.is_empty() {
            warn!("⚠️ Writing script without a scene description");
        }
        let text = self
            .generate_text(&script_prompt(language, scene), None)
            .await
            .map_err(|e| ScriptError(e.to_string()))?;
        info!("✅ Narration script generated ({} chars, {})", text.len(), language);
        Ok(text)
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    #[allow(dead_code)]
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn extract_first_image_b64(resp: &GeminiResponse) -> Option<&str> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Inline { inline_data } = p {
                info!("🎯 Found image data with mime type: {}", inline_data.mime_type);
                return Some(&inline_data.data);
            }
        }
    }
    info!("⚠️ No inline image data found in response structure");
    None
}

fn extract_first_text(resp: &GeminiResponse) -> Option<String> {
    resp.candidates
        .iter()
        .flat_map(|c| c.content.parts.iter())
        .find_map(|p| match p {
            Part::Text { text } if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        })
}
