use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::meta;

/// A user-uploaded drawing, as handed over by the service layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artwork {
    #[serde(deserialize_with = "loose_string")]
    pub id: String,
    pub image_src: String,
    #[serde(default)]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub uploaded_at: Option<String>,
    #[serde(default)]
    pub uploaded_date: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "loose_strings")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub collection_id: Option<String>,
}

impl Artwork {
    pub fn new(id: impl Into<String>, image_src: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image_src: image_src.into(),
            duration_minutes: None,
            uploaded_at: None,
            uploaded_date: None,
            date: None,
            tags: Vec::new(),
            title: None,
            description: None,
            collection_id: None,
        }
    }

    /// Whole practice minutes; `None` below one minute.
    pub fn duration(&self) -> Option<u32> {
        self.duration_minutes
            .filter(|m| m.is_finite() && *m >= 1.0)
            .map(|m| m.min(u32::MAX as f64) as u32)
    }

    pub fn uploaded(&self) -> Option<NaiveDateTime> {
        meta::resolve_date(self)
    }
}

/// Ids and tags show up as either JSON strings or numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Text(String),
    Number(serde_json::Number),
}

impl From<Loose> for String {
    fn from(value: Loose) -> Self {
        match value {
            Loose::Text(text) => text,
            Loose::Number(number) => number.to_string(),
        }
    }
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Loose::deserialize(deserializer).map(String::from)
}

fn loose_optional_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<Loose>::deserialize(deserializer)?.map(String::from))
}

fn loose_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<Loose>>::deserialize(deserializer)?
        .unwrap_or_default()
        .into_iter()
        .map(String::from)
        .collect())
}

/// Read access to tag display names.
pub trait TagLookup {
    fn tag_name(&self, id: u32) -> Option<&str>;
}

impl TagLookup for HashMap<u32, String> {
    fn tag_name(&self, id: u32) -> Option<&str> {
        self.get(&id).map(String::as_str)
    }
}

/// Display name for a tag reference. Numeric references go through
/// `lookup`; unknown ids and free-text tags are shown as written.
pub fn resolve_tag(tag: &str, lookup: &dyn TagLookup) -> String {
    tag.trim()
        .parse::<u32>()
        .ok()
        .and_then(|id| lookup.tag_name(id))
        .unwrap_or(tag.trim())
        .to_owned()
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Artworks plus the tag names needed to caption them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub artworks: Vec<Artwork>,
    pub tags: HashMap<u32, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestRepr {
    List(Vec<Artwork>),
    Full {
        artworks: Vec<Artwork>,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
}

impl Manifest {
    pub fn from_reader(reader: impl Read) -> Result<Self, ManifestError> {
        let repr: ManifestRepr = serde_json::from_reader(reader)?;
        Ok(Self::from(repr))
    }

    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let repr: ManifestRepr = serde_json::from_str(json)?;
        Ok(Self::from(repr))
    }
}

impl From<ManifestRepr> for Manifest {
    fn from(repr: ManifestRepr) -> Self {
        match repr {
            ManifestRepr::List(artworks) => Self {
                artworks,
                tags: HashMap::new(),
            },
            ManifestRepr::Full { artworks, tags } => {
                let tags = tags
                    .into_iter()
                    .filter_map(|(id, name)| match id.trim().parse() {
                        Ok(id) => Some((id, name)),
                        Err(_) => {
                            log::warn!("Ignoring tag with non-numeric id {id:?}");
                            None
                        }
                    })
                    .collect();

                Self { artworks, tags }
            }
        }
    }
}

/// Earliest upload first; undated artworks last; ties broken by id.
pub fn sort_by_upload(artworks: &mut [Artwork]) {
    artworks.sort_by_cached_key(|art| {
        let uploaded = art.uploaded();
        (uploaded.is_none(), uploaded, art.id.clone())
    });
}

/// Groups artworks by `collectionId`, each group in upload order.
pub fn group_collections(artworks: &[Artwork]) -> BTreeMap<String, Vec<Artwork>> {
    let mut groups: BTreeMap<String, Vec<Artwork>> = BTreeMap::new();

    for art in artworks {
        if let Some(collection) = &art.collection_id {
            groups.entry(collection.clone()).or_default().push(art.clone());
        }
    }

    for group in groups.values_mut() {
        sort_by_upload(group);
    }

    groups
}
