//! Zonal / regional location addressing
//!
//! Google Cloud exposes different endpoint families for zonal and regional
//! resources. A location string is classified exactly once, here, and every
//! downstream call branches on [`LocationKind`] instead of re-parsing the string.

use serde::{Deserialize, Serialize};

/// Addressing scheme of a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Zonal,
    Regional,
}

impl std::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationKind::Zonal => write!(f, "zonal"),
            LocationKind::Regional => write!(f, "regional"),
        }
    }
}

/// A resolved location (e.g. `us-central1-a` or `us-central1`)
///
/// Fields are private so `kind` always stays a function of `raw`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Location {
    raw: String,
    kind: LocationKind,
    region: String,
}

impl Location {
    /// Classify a location string. Never fails: anything that does not end in
    /// `-<single lowercase letter>` is regional, malformed input included.
    pub fn resolve(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let zone_suffix = raw
            .rsplit_once('-')
            .filter(|(_, last)| is_zone_letter(last))
            .map(|(region, _)| region.to_string());

        match zone_suffix {
            Some(region) => Self {
                raw,
                kind: LocationKind::Zonal,
                region,
            },
            None => Self {
                region: raw.clone(),
                raw,
                kind: LocationKind::Regional,
            },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn is_zonal(&self) -> bool {
        self.kind == LocationKind::Zonal
    }

    /// The zone name, if this is a zonal location
    pub fn zone(&self) -> Option<&str> {
        self.is_zonal().then_some(self.raw.as_str())
    }

    /// Compute Engine scope: `projects/{p}/zones/{z}` or `projects/{p}/regions/{r}`
    pub fn compute_scope(&self, project: &str) -> String {
        match self.kind {
            LocationKind::Zonal => format!("projects/{}/zones/{}", project, self.raw),
            LocationKind::Regional => format!("projects/{}/regions/{}", project, self.raw),
        }
    }

    /// GKE scope. Zonal clusters live under the legacy `zones` surface,
    /// regional clusters under `locations`.
    pub fn cluster_scope(&self, project: &str) -> String {
        match self.kind {
            LocationKind::Zonal => format!("projects/{}/zones/{}", project, self.raw),
            LocationKind::Regional => format!("projects/{}/locations/{}", project, self.raw),
        }
    }

    pub fn cluster_path(&self, project: &str, cluster: &str) -> String {
        format!("{}/clusters/{}", self.cluster_scope(project), cluster)
    }

    pub fn node_pool_path(&self, project: &str, cluster: &str, pool: &str) -> String {
        format!("{}/nodePools/{}", self.cluster_path(project, cluster), pool)
    }
}

fn is_zone_letter(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_lowercase())
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<String> for Location {
    fn from(raw: String) -> Self {
        Location::resolve(raw)
    }
}

impl From<&str> for Location {
    fn from(raw: &str) -> Self {
        Location::resolve(raw)
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zonal_locations() {
        for raw in ["us-central1-a", "europe-west4-b", "asia-northeast1-c"] {
            let loc = Location::resolve(raw);
            assert_eq!(loc.kind(), LocationKind::Zonal, "{raw}");
        }
        let loc = Location::resolve("us-central1-a");
        assert_eq!(loc.region(), "us-central1");
        assert_eq!(loc.zone(), Some("us-central1-a"));
    }

    #[test]
    fn test_regional_locations() {
        for raw in ["us-central1", "europe-west4", "", "-", "us-central1-A", "zone-ab", "a"] {
            let loc = Location::resolve(raw);
            assert_eq!(loc.kind(), LocationKind::Regional, "{raw:?}");
            assert_eq!(loc.region(), raw);
            assert_eq!(loc.zone(), None);
        }
    }

    #[test]
    fn test_kind_is_pure_function_of_raw() {
        assert_eq!(Location::resolve("us-east1-d"), Location::resolve("us-east1-d"));
    }

    #[test]
    fn test_paths() {
        let zonal = Location::resolve("us-central1-a");
        assert_eq!(zonal.compute_scope("p"), "projects/p/zones/us-central1-a");
        assert_eq!(
            zonal.node_pool_path("p", "c1", "pool"),
            "projects/p/zones/us-central1-a/clusters/c1/nodePools/pool"
        );

        let regional = Location::resolve("us-central1");
        assert_eq!(regional.compute_scope("p"), "projects/p/regions/us-central1");
        assert_eq!(
            regional.cluster_path("p", "c1"),
            "projects/p/locations/us-central1/clusters/c1"
        );
    }

    #[test]
    fn test_serde_roundtrip_reclassifies() {
        let json = serde_json::to_string(&Location::resolve("europe-west4-b")).unwrap();
        assert_eq!(json, "\"europe-west4-b\"");
        let back: Location = serde_json::from_str(&json).unwrap();
        assert!(back.is_zonal());
    }
}
