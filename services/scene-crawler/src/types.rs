use std::fmt;

use serde::{Deserialize, Serialize};

// Trailing path segment of a /studio/{id} link
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudioId(pub String);


#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneId(pub String);


impl fmt::Display for StudioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StudioId {
    fn from(s: &str) -> Self { StudioId(s.to_string()) }
}

impl From<&str> for SceneId {
    fn from(s: &str) -> Self { SceneId(s.to_string()) }
}


#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub description: String,
    pub tag_name: String,
    pub tag_href: String,
    pub time: String
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_name: String,
    pub tag_href: String
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashId {
    pub id: String,
    pub url: String
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherId {
    pub id_type: String,
    pub id_value: String
}

// performers, galleries and movies all share this shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedLink {
    pub name: String,
    pub href: String
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneHash {
    pub hash: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String
}

/// Everything extracted from a single scene page. Absent sections stay
/// as empty strings/lists so every record serializes with the same keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub title: String,
    pub markers: Vec<Marker>,
    pub tags: Vec<Tag>,
    pub stash_ids: Vec<StashId>,
    pub other_ids: Vec<OtherId>,
    pub urls: Vec<String>,
    pub performers: Vec<NamedLink>,
    pub hashes: Vec<SceneHash>,
    pub galleries: Vec<NamedLink>,
    pub movies: Vec<NamedLink>,
    pub description: String
}
