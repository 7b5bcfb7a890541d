//! Facility-code location metadata, loaded once per run.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use tracing::info;

/// Location metadata for one point of presence. Missing or `null` fields
/// take their zero value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationRecord {
    #[serde(rename = "iata", default, deserialize_with = "null_as_default")]
    pub code: String,
    #[serde(rename = "lat", default, deserialize_with = "null_as_default")]
    pub latitude: f64,
    #[serde(rename = "lon", default, deserialize_with = "null_as_default")]
    pub longitude: f64,
    #[serde(rename = "cca2", default, deserialize_with = "null_as_default")]
    pub country_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub city: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Immutable mapping from facility code to location.
#[derive(Debug, Default, Clone)]
pub struct LocationTable {
    by_code: HashMap<String, LocationRecord>,
}

impl LocationTable {
    /// Build a table from records. Later duplicates replace earlier ones.
    pub fn from_records(records: impl IntoIterator<Item = LocationRecord>) -> Self {
        let by_code = records
            .into_iter()
            .map(|rec| (rec.code.clone(), rec))
            .collect();
        Self { by_code }
    }

    /// Parse the JSON array document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let records: Vec<LocationRecord> =
            serde_json::from_slice(bytes).context("failed to parse location JSON")?;
        Ok(Self::from_records(records))
    }

    pub fn get(&self, code: &str) -> Option<&LocationRecord> {
        self.by_code.get(code)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Load the table from `cache` if it exists, otherwise download it from
    /// `url` and persist the raw document to `cache` for later runs.
    pub async fn load(cache: &Path, url: &str) -> Result<Self> {
        if cache.exists() {
            info!(path = %cache.display(), "using cached location table");
            let bytes = tokio::fs::read(cache)
                .await
                .with_context(|| format!("failed to read location cache: {}", cache.display()))?;
            let table = Self::from_json(&bytes)
                .with_context(|| format!("bad location cache: {}", cache.display()))?;
            info!(entries = table.len(), "location table loaded");
            return Ok(table);
        }

        info!(%url, path = %cache.display(), "location cache missing, downloading");
        let bytes = reqwest::get(url)
            .await
            .with_context(|| format!("failed to fetch location table from {url}"))?
            .error_for_status()
            .with_context(|| format!("location table request to {url} failed"))?
            .bytes()
            .await
            .context("failed to read location table response")?;

        let table = Self::from_json(&bytes)?;
        tokio::fs::write(cache, &bytes)
            .await
            .with_context(|| format!("failed to write location cache: {}", cache.display()))?;
        info!(entries = table.len(), "location table downloaded and cached");
        Ok(table)
    }
}
