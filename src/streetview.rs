//! Street View Static API frames as source images.

use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::models::SourceImage;

const STREETVIEW_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/streetview";

#[derive(Debug, Error)]
pub enum StreetViewError {
    #[error("location out of range: lat={lat} lng={lng}")]
    InvalidLocation { lat: f64, lng: f64 },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("street view returned no image")]
    Empty,
}

/// Camera position chosen in the map picker.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct StreetViewRequest {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub pitch: f64,
}

impl StreetViewRequest {
    pub fn validate(&self) -> Result<(), StreetViewError> {
        let valid = self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng);
        if valid {
            Ok(())
        } else {
            Err(StreetViewError::InvalidLocation { lat: self.lat, lng: self.lng })
        }
    }

    pub fn static_image_url(&self, api_key: &str) -> Result<Url, StreetViewError> {
        self.image_url_at(STREETVIEW_ENDPOINT, api_key)
    }

    fn image_url_at(&self, endpoint: &str, api_key: &str) -> Result<Url, StreetViewError> {
        Url::parse_with_params(
            endpoint,
            &[
                ("size", "600x400".to_string()),
                ("location", format!("{},{}", self.lat, self.lng)),
                ("heading", self.heading.to_string()),
                ("pitch", self.pitch.to_string()),
                ("fov", "90".to_string()),
                ("key", api_key.to_string()),
            ],
        )
        .map_err(|e| StreetViewError::Http(e.to_string()))
    }
}

// The key has to travel in the query string, so reqwest errors are stripped of their URL.
fn http_error(e: reqwest::Error) -> StreetViewError {
    StreetViewError::Http(e.without_url().to_string())
}

pub async fn fetch_frame(client: &Client, request: &StreetViewRequest, api_key: &str) -> Result<SourceImage, StreetViewError> {
    fetch_frame_at(client, STREETVIEW_ENDPOINT, request, api_key).await
}

async fn fetch_frame_at(
    client: &Client,
    endpoint: &str,
    request: &StreetViewRequest,
    api_key: &str,
) -> Result<SourceImage, StreetViewError> {
    request.validate()?;
    let url = request.image_url_at(endpoint, api_key)?;
    info!("🗺️ Fetching street view frame at {},{}", request.lat, request.lng);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(http_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(StreetViewError::Http(format!("status={}", status)));
    }

    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("image/"))
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = response.bytes().await.map_err(http_error)?;
    if bytes.is_empty() {
        return Err(StreetViewError::Empty);
    }
    Ok(SourceImage { mime_type, bytes })
}
