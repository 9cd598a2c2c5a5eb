//! Pure transforms from raw API payloads to typed records.
//!
//! Nothing here performs I/O or fails: missing or malformed optional fields
//! degrade to `None`. The only input besides the payload is a
//! [`TransformContext`] carrying the clock, so the same payload and context
//! always produce the same records.
//!
//! Records whose natural key is absent are dropped with a warning.

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::models::{
    CveRecord, HotspotRecord, IssueRecord, MetricValue, PlaylistRecord, PopularityTier,
    ProjectMeasures, ProjectRecord, RawRecord, TrackRecord,
};

/// Severities that mark an issue as critical.
pub const CRITICAL_SEVERITIES: [&str; 2] = ["CRITICAL", "BLOCKER"];

/// Market whose availability is recorded on every track.
pub const AVAILABILITY_MARKET: &str = "IN";

/// Clock used for derived, time-dependent fields.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext {
    pub now: DateTime<Utc>,
}

impl TransformContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn current_year(&self) -> i32 {
        self.now.year()
    }

    pub fn ingestion_timestamp(&self) -> String {
        self.now.to_rfc3339()
    }
}

// ============ Field helpers ============

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn int_field(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(Value::as_i64)
}

fn key_field(value: &Value, key: &str, kind: &str) -> Option<String> {
    match str_field(value, key) {
        Some(k) if !k.is_empty() => Some(k),
        _ => {
            warn!("skipping {} without '{}'", kind, key);
            None
        }
    }
}

// ============ Derived fields ============

/// True iff `severity` is one of [`CRITICAL_SEVERITIES`].
pub fn is_critical(severity: Option<&str>) -> bool {
    severity.is_some_and(|s| CRITICAL_SEVERITIES.contains(&s))
}

/// Bucket a 0-100 popularity score. Boundaries are strict: 75 is `Popular`.
pub fn popularity_tier(popularity: i64) -> PopularityTier {
    if popularity > 75 {
        PopularityTier::MainstreamHit
    } else if popularity > 50 {
        PopularityTier::Popular
    } else {
        PopularityTier::Niche
    }
}

/// Years since the album's release, from the leading `YYYY` of a Spotify
/// `release_date` (`"2019"`, `"2019-06"` or `"2019-06-21"`).
pub fn album_age_years(release_date: Option<&str>, current_year: i32) -> Option<i32> {
    let year = release_date?.split('-').next()?;
    if year.len() != 4 {
        return None;
    }
    year.parse::<i32>().ok().map(|y| current_year - y)
}

/// True iff `market` appears in a track's `available_markets` list.
pub fn is_available_in(markets: Option<&Value>, market: &str) -> bool {
    markets
        .and_then(Value::as_array)
        .is_some_and(|list| list.iter().any(|m| m.as_str() == Some(market)))
}

/// Coerce a measure value to a number, keeping the raw text when it does
/// not parse. An absent value counts as 0.
pub fn coerce_metric(value: Option<&Value>) -> MetricValue {
    match value {
        None => MetricValue::Number(0.0),
        Some(Value::Null) => MetricValue::Null,
        Some(Value::Number(n)) => n
            .as_f64()
            .map(MetricValue::Number)
            .unwrap_or_else(|| MetricValue::Text(n.to_string())),
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => MetricValue::Number(n),
            _ => MetricValue::Text(s.clone()),
        },
        Some(other) => MetricValue::Text(other.to_string()),
    }
}

/// First description whose `lang` is `en`.
pub fn english_description(descriptions: Option<&Value>) -> Option<String> {
    descriptions?
        .as_array()?
        .iter()
        .find(|d| d.get("lang").and_then(Value::as_str) == Some("en"))
        .and_then(|d| str_field(d, "value"))
}

/// CVSS v3.1 sub-fields picked from the first `cvssMetricV31` entry.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CvssV31 {
    pub base_score: Option<f64>,
    pub base_severity: Option<String>,
    pub vector_string: Option<String>,
}

/// Read CVSS v3.1 data. Other CVSS versions are deliberately ignored.
pub fn extract_cvss_v31(metrics: Option<&Value>) -> CvssV31 {
    let data = metrics
        .and_then(|m| m.get("cvssMetricV31"))
        .and_then(Value::as_array)
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("cvssData"));

    match data {
        Some(d) => CvssV31 {
            base_score: d.get("baseScore").and_then(Value::as_f64),
            base_severity: str_field(d, "baseSeverity"),
            vector_string: str_field(d, "vectorString"),
        },
        None => CvssV31::default(),
    }
}

// ============ NVD ============

/// Flatten NVD `vulnerabilities[]` entries into [`CveRecord`]s.
pub fn transform_cves(records: &[RawRecord], ctx: &TransformContext) -> Vec<CveRecord> {
    let timestamp = ctx.ingestion_timestamp();
    records
        .iter()
        .filter_map(|item| {
            let cve = item.get("cve").unwrap_or(&Value::Null);
            let cve_id = key_field(cve, "id", "CVE")?;
            let cvss = extract_cvss_v31(cve.get("metrics"));
            Some(CveRecord {
                cve_id,
                published_date: str_field(cve, "published"),
                last_modified_date: str_field(cve, "lastModified"),
                description: english_description(cve.get("descriptions")),
                base_score: cvss.base_score,
                severity: cvss.base_severity,
                vector_string: cvss.vector_string,
                ingestion_timestamp: timestamp.clone(),
            })
        })
        .collect()
}

// ============ Spotify ============

/// Map full Spotify track objects into [`TrackRecord`]s.
pub fn transform_tracks(tracks: &[RawRecord], ctx: &TransformContext) -> Vec<TrackRecord> {
    tracks
        .iter()
        .filter(|t| !t.is_null())
        .filter_map(|track| {
            let track_id = key_field(track, "id", "track")?;
            let album = track.get("album").unwrap_or(&Value::Null);
            let artists = track
                .get("artists")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(|a| str_field(a, "name")).collect())
                .unwrap_or_default();
            let popularity = int_field(track, "popularity").unwrap_or(0);

            Some(TrackRecord {
                track_id,
                track_name: str_field(track, "name"),
                artists,
                album_name: str_field(album, "name"),
                album_age_years: album_age_years(
                    album.get("release_date").and_then(Value::as_str),
                    ctx.current_year(),
                ),
                is_available_in_india: is_available_in(
                    track.get("available_markets"),
                    AVAILABILITY_MARKET,
                ),
                popularity_tier: popularity_tier(popularity),
            })
        })
        .collect()
}

/// Merge a playlist payload with already-transformed track details into a
/// single [`PlaylistRecord`].
pub fn transform_playlist(playlist: &RawRecord, tracks: Vec<TrackRecord>) -> Option<PlaylistRecord> {
    let playlist_id = key_field(playlist, "id", "playlist")?;
    Some(PlaylistRecord {
        playlist_id,
        name: str_field(playlist, "name"),
        description: str_field(playlist, "description"),
        owner: playlist
            .get("owner")
            .and_then(|o| str_field(o, "display_name")),
        total_followers: playlist
            .get("followers")
            .and_then(|f| int_field(f, "total"))
            .unwrap_or(0),
        tracks,
    })
}

/// Track ids listed in a playlist's `tracks.items[].track.id`, in order.
///
/// Local files and removed tracks have a null track or id and are skipped.
pub fn playlist_track_ids(items: &[RawRecord]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.get("track").and_then(|t| str_field(t, "id")))
        .collect()
}

// ============ SonarQube ============

pub fn transform_projects(projects: &[RawRecord]) -> Vec<ProjectRecord> {
    projects
        .iter()
        .filter_map(|p| {
            Some(ProjectRecord {
                project_key: key_field(p, "key", "project")?,
                name: str_field(p, "name"),
                qualifier: str_field(p, "qualifier"),
                visibility: str_field(p, "visibility"),
            })
        })
        .collect()
}

/// Map SonarQube issues, deriving `is_critical_or_blocker` from severity.
pub fn transform_issues(issues: &[RawRecord]) -> Vec<IssueRecord> {
    issues
        .iter()
        .filter_map(|issue| {
            let severity = str_field(issue, "severity");
            Some(IssueRecord {
                issue_key: key_field(issue, "key", "issue")?,
                project_key: str_field(issue, "project"),
                component: str_field(issue, "component"),
                line: int_field(issue, "line"),
                message: str_field(issue, "message"),
                is_critical_or_blocker: is_critical(severity.as_deref()),
                severity,
                issue_type: str_field(issue, "type"),
                status: str_field(issue, "status"),
                creation_date: str_field(issue, "creationDate"),
            })
        })
        .collect()
}

pub fn transform_hotspots(hotspots: &[RawRecord]) -> Vec<HotspotRecord> {
    hotspots
        .iter()
        .filter_map(|h| {
            Some(HotspotRecord {
                hotspot_key: key_field(h, "key", "hotspot")?,
                project_key: str_field(h, "project"),
                component: str_field(h, "component"),
                line: int_field(h, "line"),
                message: str_field(h, "message"),
                security_category: str_field(h, "securityCategory"),
                vulnerability_probability: str_field(h, "vulnerabilityProbability"),
                status: str_field(h, "status"),
                creation_date: str_field(h, "creationDate"),
            })
        })
        .collect()
}

/// Flatten a `/api/measures/component` `component` object into one
/// [`ProjectMeasures`] document.
///
/// Returns `None` when there is no `measures` list or no project key.
pub fn transform_measures(component: &RawRecord) -> Option<ProjectMeasures> {
    let measures = component.get("measures")?.as_array()?;
    let project_key = key_field(component, "key", "measures component")?;

    let mut metrics = BTreeMap::new();
    for measure in measures {
        let Some(metric) = str_field(measure, "metric") else {
            continue;
        };
        metrics.insert(metric, coerce_metric(measure.get("value")));
    }

    Some(ProjectMeasures {
        project_key,
        project_name: str_field(component, "name"),
        metrics,
    })
}
