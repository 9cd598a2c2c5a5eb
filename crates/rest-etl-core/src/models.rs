//! Core data models used throughout rest-etl.
//!
//! Raw API payloads are untyped [`serde_json::Value`]s. Transforms turn them
//! into the typed records below, and the loader writes each record as a
//! [`Document`] keyed by its natural key.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// An untyped record exactly as an upstream API returned it.
pub type RawRecord = Value;

/// A schema-less document as stored in a collection.
pub type Document = Map<String, Value>;

/// A transformed record that can be upserted by natural key.
///
/// Every record type names exactly one key field. The loader matches
/// stored documents on `{KEY_FIELD: natural_key()}`.
pub trait Record: Serialize {
    /// Name of the natural-key field in the serialized document.
    const KEY_FIELD: &'static str;

    /// Value of the natural key. Never empty for records produced by
    /// the transforms in this crate.
    fn natural_key(&self) -> &str;

    /// Serialize into a flat [`Document`].
    fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => bail!(
                "record keyed by '{}' did not serialize to an object: {}",
                Self::KEY_FIELD,
                other
            ),
        }
    }
}

/// Read the natural key out of a stored or about-to-be-stored document.
///
/// Strings are used as-is; numbers are rendered with their JSON text.
/// Anything else (missing, null, object) is an error.
pub fn document_key(doc: &Document, key_field: &str) -> Result<String> {
    match doc.get(key_field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => bail!("natural key '{}' has unusable value {}", key_field, other),
        None => bail!("document has no natural key field '{}'", key_field),
    }
}

// ============ NVD ============

/// A CVE flattened out of the NVD 2.0 `vulnerabilities[].cve` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CveRecord {
    pub cve_id: String,
    pub published_date: Option<String>,
    pub last_modified_date: Option<String>,
    pub description: Option<String>,
    pub base_score: Option<f64>,
    pub severity: Option<String>,
    pub vector_string: Option<String>,
    pub ingestion_timestamp: String,
}

impl Record for CveRecord {
    const KEY_FIELD: &'static str = "cve_id";

    fn natural_key(&self) -> &str {
        &self.cve_id
    }
}

// ============ Spotify ============

/// Three-way popularity bucket derived from Spotify's 0-100 popularity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PopularityTier {
    #[serde(rename = "Mainstream Hit")]
    MainstreamHit,
    #[serde(rename = "Popular")]
    Popular,
    #[serde(rename = "Niche")]
    Niche,
}

impl PopularityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopularityTier::MainstreamHit => "Mainstream Hit",
            PopularityTier::Popular => "Popular",
            PopularityTier::Niche => "Niche",
        }
    }
}

/// A track nested inside a [`PlaylistRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub track_id: String,
    pub track_name: Option<String>,
    pub artists: Vec<String>,
    pub album_name: Option<String>,
    pub album_age_years: Option<i32>,
    pub is_available_in_india: bool,
    pub popularity_tier: PopularityTier,
}

/// A playlist merged with the full details of its tracks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistRecord {
    pub playlist_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub total_followers: i64,
    pub tracks: Vec<TrackRecord>,
}

impl Record for PlaylistRecord {
    const KEY_FIELD: &'static str = "playlist_id";

    fn natural_key(&self) -> &str {
        &self.playlist_id
    }
}

// ============ SonarQube ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRecord {
    pub project_key: String,
    pub name: Option<String>,
    pub qualifier: Option<String>,
    pub visibility: Option<String>,
}

impl Record for ProjectRecord {
    const KEY_FIELD: &'static str = "project_key";

    fn natural_key(&self) -> &str {
        &self.project_key
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueRecord {
    pub issue_key: String,
    pub project_key: Option<String>,
    pub component: Option<String>,
    pub line: Option<i64>,
    pub message: Option<String>,
    pub severity: Option<String>,
    #[serde(rename = "type")]
    pub issue_type: Option<String>,
    pub status: Option<String>,
    pub creation_date: Option<String>,
    pub is_critical_or_blocker: bool,
}

impl Record for IssueRecord {
    const KEY_FIELD: &'static str = "issue_key";

    fn natural_key(&self) -> &str {
        &self.issue_key
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotRecord {
    pub hotspot_key: String,
    pub project_key: Option<String>,
    pub component: Option<String>,
    pub line: Option<i64>,
    pub message: Option<String>,
    pub security_category: Option<String>,
    pub vulnerability_probability: Option<String>,
    pub status: Option<String>,
    pub creation_date: Option<String>,
}

impl Record for HotspotRecord {
    const KEY_FIELD: &'static str = "hotspot_key";

    fn natural_key(&self) -> &str {
        &self.hotspot_key
    }
}

/// A single flattened metric value.
///
/// Values that parse as numbers are stored as numbers; anything else keeps
/// its raw text. An explicit `null` stays `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    Null,
}

/// One document per project holding every requested metric as a
/// top-level field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectMeasures {
    pub project_key: String,
    pub project_name: Option<String>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, MetricValue>,
}

impl Record for ProjectMeasures {
    const KEY_FIELD: &'static str = "project_key";

    fn natural_key(&self) -> &str {
        &self.project_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_measures_flatten_into_document() {
        let mut metrics = BTreeMap::new();
        metrics.insert("bugs".to_string(), MetricValue::Number(5.0));
        metrics.insert("rating".to_string(), MetricValue::Text("A".to_string()));
        metrics.insert("duplication".to_string(), MetricValue::Null);
        let measures = ProjectMeasures {
            project_key: "proj".to_string(),
            project_name: Some("Project".to_string()),
            metrics,
        };

        let doc = measures.to_document().unwrap();
        assert_eq!(doc.get("project_key"), Some(&json!("proj")));
        assert_eq!(doc.get("bugs"), Some(&json!(5.0)));
        assert_eq!(doc.get("rating"), Some(&json!("A")));
        assert_eq!(doc.get("duplication"), Some(&Value::Null));
        assert!(doc.get("metrics").is_none());
    }

    #[test]
    fn test_issue_type_serializes_as_type() {
        let issue = IssueRecord {
            issue_key: "AX-1".to_string(),
            project_key: None,
            component: None,
            line: None,
            message: None,
            severity: None,
            issue_type: Some("BUG".to_string()),
            status: None,
            creation_date: None,
            is_critical_or_blocker: false,
        };
        let doc = issue.to_document().unwrap();
        assert_eq!(doc.get("type"), Some(&json!("BUG")));
        assert_eq!(doc.get("line"), Some(&Value::Null));
    }

    #[test]
    fn test_popularity_tier_serializes_display_name() {
        let v = serde_json::to_value(PopularityTier::MainstreamHit).unwrap();
        assert_eq!(v, json!("Mainstream Hit"));
        assert_eq!(PopularityTier::Niche.as_str(), "Niche");
    }

    #[test]
    fn test_document_key() {
        let doc = json!({"cve_id": "CVE-2024-0001", "n": 7, "empty": ""});
        let doc = doc.as_object().unwrap();
        assert_eq!(document_key(doc, "cve_id").unwrap(), "CVE-2024-0001");
        assert_eq!(document_key(doc, "n").unwrap(), "7");
        assert!(document_key(doc, "empty").is_err());
        assert!(document_key(doc, "missing").is_err());
    }
}
