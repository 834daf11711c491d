use async_trait::async_trait;
use bytes::Bytes;
use std::io::{Cursor, Write};
use zip::{
    write::{FileOptions, ZipWriter},
    CompressionMethod,
};

use crate::{
    models::{GeneratedArtifact, SourceImage},
    services::{ArchiveBuilder, ArchiveEntry, ArchiveError},
};

pub const SCRIPT_ENTRY_NAME: &str = "narration_script.txt";

/// File extension for an image MIME type, e.g. `image/jpeg` -> `jpg`.
pub fn extension_for_mime(mime_type: &str) -> String {
    let subtype = mime_type
        .split(';')
        .next()
        .and_then(|m| m.trim().split('/').nth(1))
        .unwrap_or("")
        .to_lowercase();
    match subtype.as_str() {
        "jpeg" | "jpg" | "pjpeg" => "jpg".to_string(),
        "svg+xml" => "svg".to_string(),
        "" => "bin".to_string(),
        other => other.chars().filter(|c| c.is_ascii_alphanumeric()).collect(),
    }
}

/// Lower-cases and replaces every non-alphanumeric char with `_`.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .flat_map(|c| if c.is_alphanumeric() { c.to_lowercase().collect::<Vec<_>>() } else { vec!['_'] })
        .collect()
}

pub fn artifact_entry_name(artifact: &GeneratedArtifact) -> String {
    format!("{:02}_{}.png", artifact.index, sanitize_label(&artifact.label))
}

/// Original image, then the script, then every artifact in horizon order.
pub fn run_entries(source: &SourceImage, script: &str, artifacts: &[GeneratedArtifact]) -> Vec<ArchiveEntry> {
    let mut entries = Vec::with_capacity(artifacts.len() + 2);
    entries.push(ArchiveEntry {
        name: format!("original.{}", extension_for_mime(&source.mime_type)),
        bytes: source.bytes.clone(),
        is_text: false,
    });
    entries.push(ArchiveEntry {
        name: SCRIPT_ENTRY_NAME.to_string(),
        bytes: Bytes::copy_from_slice(script.as_bytes()),
        is_text: true,
    });
    entries.extend(artifacts.iter().map(|a| ArchiveEntry {
        name: artifact_entry_name(a),
        bytes: a.image.clone(),
        is_text: false,
    }));
    entries
}

/// Builds in-memory zip files.
#[derive(Debug, Default, Clone)]
pub struct ZipArchiveBuilder;

impl ZipArchiveBuilder {
    fn write_zip(entries: &[ArchiveEntry]) -> Result<Vec<u8>, ArchiveError> {
        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            // Images are already compressed; only deflate text.
            let text = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o644);
            let binary = FileOptions::default()
                .compression_method(CompressionMethod::Stored)
                .unix_permissions(0o644);

            for entry in entries {
                let options = if entry.is_text { text } else { binary };
                zip.start_file(entry.name.as_str(), options)
                    .map_err(|e| ArchiveError(format!("failed to add {}: {}", entry.name, e)))?;
                zip.write_all(&entry.bytes)
                    .map_err(|e| ArchiveError(format!("failed to write {}: {}", entry.name, e)))?;
            }

            zip.finish()
                .map_err(|e| ArchiveError(format!("failed to finalize archive: {}", e)))?;
        }
        Ok(buffer)
    }
}

#[async_trait]
impl ArchiveBuilder for ZipArchiveBuilder {
    async fn build(&self, entries: Vec<ArchiveEntry>) -> Result<Bytes, ArchiveError> {
        let count = entries.len();
        let buffer = tokio::task::spawn_blocking(move || Self::write_zip(&entries))
            .await
            .map_err(|e| ArchiveError(format!("archive task failed: {}", e)))??;
        tracing::info!("📦 Built zip archive with {} entries ({} bytes)", count, buffer.len());
        Ok(Bytes::from(buffer))
    }
}
