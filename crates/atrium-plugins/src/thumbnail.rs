//! Built-in thumbnail resolvers.

use std::path::Path;

use anyhow::Context as _;
use atrium_paths::format_strict;
use atrium_session::{keys, Session};
use atrium_types::Document;
use serde_json::{Map, Value};
use tracing::debug;

use crate::traits::ThumbnailResolver;

/// Bytes stored on the thumbnail document itself, as `data.binary_data`.
///
/// The bytes may be a hex string or an array of integers.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryThumbnail;

impl ThumbnailResolver for BinaryThumbnail {
    fn name(&self) -> &str {
        "BinaryThumbnail"
    }

    fn priority(&self) -> i64 {
        100
    }

    fn process(
        &self,
        entity: &Document,
        _thumbnail_type: &str,
        _session: &Session,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        match entity.data_field("binary_data") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(encoded)) => {
                let bytes = hex::decode(encoded).context("binary_data is not valid hex")?;
                Ok(Some(bytes))
            }
            Some(Value::Array(items)) => {
                let bytes = items
                    .iter()
                    .map(|item| {
                        item.as_u64()
                            .and_then(|n| u8::try_from(n).ok())
                            .context("binary_data items must be bytes")
                    })
                    .collect::<anyhow::Result<Vec<u8>>>()?;
                Ok(Some(bytes))
            }
            Some(_) => anyhow::bail!("binary_data must be a hex string or a byte array"),
        }
    }
}

/// A file under the session's `ATRIUM_THUMBNAIL_ROOT`, located by the
/// thumbnail document's `data.template` filled from `data.template_data`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateThumbnail;

impl ThumbnailResolver for TemplateThumbnail {
    fn name(&self) -> &str {
        "TemplateThumbnail"
    }

    fn priority(&self) -> i64 {
        90
    }

    fn process(
        &self,
        entity: &Document,
        thumbnail_type: &str,
        session: &Session,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let Some(root) = session.non_empty(keys::THUMBNAIL_ROOT) else {
            debug!("no thumbnail root in session");
            return Ok(None);
        };
        let Some(template) = entity.data_field("template").and_then(Value::as_str) else {
            return Ok(None);
        };

        let mut data: Map<String, Value> = entity
            .data_field("template_data")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(id) = entity.get("_id") {
            data.insert("_id".into(), id.clone());
        }
        data.insert("thumbnail_type".into(), Value::from(thumbnail_type));
        data.insert("thumbnail_root".into(), Value::from(root));

        let path = format_strict(template, &data)?;
        if !Path::new(&path).is_file() {
            debug!(path = %path, "thumbnail file does not exist");
            return Ok(None);
        }
        let bytes = std::fs::read(&path).with_context(|| format!("reading thumbnail {path}"))?;
        Ok(Some(bytes))
    }
}
