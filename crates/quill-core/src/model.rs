//! In-memory book document.
//!
//! A [`Document`] exclusively owns its chapters, characters, world-building
//! entries and story notes. Chapter order is the list position. The other
//! collections are keyed by [`EntityId`] and serialize as JSON arrays of
//! records carrying their `id`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::text;

/// Stable identifier of a document or one of its child records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Behaviour shared by every record kind a document owns.
pub trait Entry {
    fn id(&self) -> EntityId;
    fn title(&self) -> &str;
    fn content(&self) -> &str;
    fn modified(&self) -> DateTime<Utc>;

    /// Derived from the content on every call; never stored.
    fn word_count(&self) -> usize {
        text::word_count(self.content())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: EntityId,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Chapter {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::random(),
            title: title.into(),
            content: content.into(),
            created: now,
            modified: now,
        }
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.modified = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub image_path: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::random(),
            name: name.into(),
            description: String::new(),
            background: String::new(),
            attributes: BTreeMap::new(),
            image_path: String::new(),
            created: now,
            modified: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldBuilding {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub history: String,
    #[serde(default)]
    pub locations: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: BTreeMap<String, String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl WorldBuilding {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::random(),
            name: name.into(),
            description: String::new(),
            history: String::new(),
            locations: BTreeMap::new(),
            rules: BTreeMap::new(),
            created: now,
            modified: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryNote {
    pub id: EntityId,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl StoryNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::random(),
            title: title.into(),
            content: content.into(),
            created: now,
            modified: now,
        }
    }
}

macro_rules! impl_entry {
    ($ty:ty, $title:ident, $content:ident) => {
        impl Entry for $ty {
            fn id(&self) -> EntityId {
                self.id
            }
            fn title(&self) -> &str {
                &self.$title
            }
            fn content(&self) -> &str {
                &self.$content
            }
            fn modified(&self) -> DateTime<Utc> {
                self.modified
            }
        }
    };
}

impl_entry!(Chapter, title, content);
impl_entry!(Character, name, description);
impl_entry!(WorldBuilding, name, description);
impl_entry!(StoryNote, title, content);

/// A whole book: metadata, ordered chapters and the keyed side collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: EntityId,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub genre: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,

    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default, with = "keyed")]
    pub characters: BTreeMap<EntityId, Character>,
    #[serde(default, with = "keyed")]
    pub world_building: BTreeMap<EntityId, WorldBuilding>,
    #[serde(default, with = "keyed")]
    pub story_notes: BTreeMap<EntityId, StoryNote>,

    #[serde(default)]
    pub story_background: String,
    #[serde(default)]
    pub plot_outline: String,
    #[serde(default)]
    pub research_notes: String,
    #[serde(default)]
    pub timeline: String,

    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::random(),
            title: title.into(),
            author: author.into(),
            genre: String::new(),
            created: now,
            modified: now,
            chapters: Vec::new(),
            characters: BTreeMap::new(),
            world_building: BTreeMap::new(),
            story_notes: BTreeMap::new(),
            story_background: String::new(),
            plot_outline: String::new(),
            research_notes: String::new(),
            timeline: String::new(),
            metadata: default_metadata(),
        }
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }

    pub fn add_chapter(&mut self, title: impl Into<String>, content: impl Into<String>) -> EntityId {
        let chapter = Chapter::new(title, content);
        let id = chapter.id;
        self.chapters.push(chapter);
        self.touch();
        id
    }

    pub fn chapter(&self, id: EntityId) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn chapter_mut(&mut self, id: EntityId) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.id == id)
    }

    pub fn remove_chapter(&mut self, id: EntityId) -> Option<Chapter> {
        let pos = self.chapters.iter().position(|c| c.id == id)?;
        self.touch();
        Some(self.chapters.remove(pos))
    }

    /// Move a chapter to `to` (clamped to the last position).
    /// Returns false when the chapter is unknown.
    pub fn move_chapter(&mut self, id: EntityId, to: usize) -> bool {
        let Some(from) = self.chapters.iter().position(|c| c.id == id) else {
            return false;
        };
        let chapter = self.chapters.remove(from);
        let to = to.min(self.chapters.len());
        self.chapters.insert(to, chapter);
        self.touch();
        true
    }

    pub fn add_character(&mut self, character: Character) -> EntityId {
        let id = character.id;
        self.characters.insert(id, character);
        self.touch();
        id
    }

    pub fn remove_character(&mut self, id: EntityId) -> Option<Character> {
        let removed = self.characters.remove(&id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn add_world_building(&mut self, entry: WorldBuilding) -> EntityId {
        let id = entry.id;
        self.world_building.insert(id, entry);
        self.touch();
        id
    }

    pub fn remove_world_building(&mut self, id: EntityId) -> Option<WorldBuilding> {
        let removed = self.world_building.remove(&id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn add_story_note(&mut self, note: StoryNote) -> EntityId {
        let id = note.id;
        self.story_notes.insert(id, note);
        self.touch();
        id
    }

    pub fn remove_story_note(&mut self, id: EntityId) -> Option<StoryNote> {
        let removed = self.story_notes.remove(&id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Sum of chapter word counts.
    pub fn total_word_count(&self) -> usize {
        self.chapters.iter().map(Entry::word_count).sum()
    }
}

/// Metadata every new book starts with.
pub fn default_metadata() -> BTreeMap<String, serde_json::Value> {
    use serde_json::json;

    BTreeMap::from([
        ("language".to_string(), json!("en")),
        ("target_audience".to_string(), json!("")),
        ("estimated_pages".to_string(), json!(0)),
        ("status".to_string(), json!("draft")),
        ("tags".to_string(), json!([])),
    ])
}

/// Serde adapter writing a keyed map as a JSON array of its records.
/// Duplicate ids on the way in are a hard error.
mod keyed {
    use std::collections::BTreeMap;
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{self, SeqAccess, Visitor};
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{EntityId, Entry};

    pub fn serialize<T, S>(map: &BTreeMap<EntityId, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(map.len()))?;
        for record in map.values() {
            seq.serialize_element(record)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<BTreeMap<EntityId, T>, D::Error>
    where
        T: Deserialize<'de> + Entry,
        D: Deserializer<'de>,
    {
        struct RecordsVisitor<T>(PhantomData<T>);

        impl<'de, T> Visitor<'de> for RecordsVisitor<T>
        where
            T: Deserialize<'de> + Entry,
        {
            type Value = BTreeMap<EntityId, T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of records with unique ids")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut map = BTreeMap::new();
                while let Some(record) = seq.next_element::<T>()? {
                    let id = record.id();
                    if map.insert(id, record).is_some() {
                        return Err(de::Error::custom(format!("duplicate id {id}")));
                    }
                }
                Ok(map)
            }
        }

        deserializer.deserialize_seq(RecordsVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_default_metadata() {
        let doc = Document::new("Dune", "FH");
        assert_eq!(doc.metadata["language"], "en");
        assert_eq!(doc.metadata["status"], "draft");
        assert_eq!(doc.metadata["estimated_pages"], 0);
        assert!(doc.metadata["tags"].as_array().unwrap().is_empty());
    }

    #[test]
    fn chapter_order_is_list_position() {
        let mut doc = Document::new("t", "a");
        let a = doc.add_chapter("A", "");
        let b = doc.add_chapter("B", "");
        let c = doc.add_chapter("C", "");

        assert!(doc.move_chapter(c, 0));
        let titles: Vec<_> = doc.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["C", "A", "B"]);

        assert!(doc.remove_chapter(a).is_some());
        assert!(doc.remove_chapter(a).is_none());
        assert_eq!(doc.chapters[1].id, b);

        // out-of-range target clamps to the end
        assert!(doc.move_chapter(c, 99));
        assert_eq!(doc.chapters.last().unwrap().id, c);
        assert!(!doc.move_chapter(EntityId::random(), 0));
    }

    #[test]
    fn mutations_bump_modified() {
        let mut doc = Document::new("t", "a");
        doc.modified = DateTime::<Utc>::MIN_UTC;
        doc.add_story_note(StoryNote::new("idea", "spice"));
        assert!(doc.modified > DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn keyed_collections_serialize_as_arrays() {
        let mut doc = Document::new("t", "a");
        let id = doc.add_character(Character::new("Paul"));
        doc.add_world_building(WorldBuilding::new("Arrakis"));

        let value = serde_json::to_value(&doc).unwrap();
        let chars = value["characters"].as_array().unwrap();
        assert_eq!(chars.len(), 1);
        assert_eq!(chars[0]["id"], id.to_string());
        assert_eq!(chars[0]["name"], "Paul");
        assert_eq!(value["world_building"].as_array().unwrap().len(), 1);

        let back: Document = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let doc = Document::new("t", "a");
        let note = StoryNote::new("n", "c");
        let mut value = serde_json::to_value(&doc).unwrap();
        let record = serde_json::to_value(&note).unwrap();
        value["story_notes"] = serde_json::Value::Array(vec![record.clone(), record]);

        let err = serde_json::from_value::<Document>(value).unwrap_err();
        assert!(err.to_string().contains("duplicate id"));
    }

    #[test]
    fn total_word_count_sums_chapters() {
        let mut doc = Document::new("t", "a");
        doc.add_chapter("1", "Hello World");
        doc.add_chapter("2", "你好世界");
        assert_eq!(doc.total_word_count(), 14);
    }
}
