//! Reader for the version 1 JSON schema.
//!
//! Differences from the current schema:
//! - timestamps are ISO-8601 without an offset; they are taken as UTC
//! - chapters carry an explicit `order` and a stored `word_count`
//! - every collection is a plain list
//!
//! Conversion is one-way. Files are rewritten as version 2 on the next save.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, TimeZone, Utc};
use quill_core::model::{Chapter, Character, Document, EntityId, Entry, StoryNote, WorldBuilding};
use quill_core::{QuillError, QuillResult};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
struct LegacyBook {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    genre: String,
    created: Option<NaiveDateTime>,
    modified: Option<NaiveDateTime>,
    #[serde(default)]
    chapters: Vec<LegacyChapter>,
    #[serde(default)]
    characters: Vec<LegacyCharacter>,
    #[serde(default)]
    world_building: Vec<LegacyWorldBuilding>,
    #[serde(default)]
    story_notes: Vec<LegacyStoryNote>,
    #[serde(default)]
    story_background: String,
    #[serde(default)]
    plot_outline: String,
    #[serde(default)]
    research_notes: String,
    #[serde(default)]
    timeline: String,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct LegacyChapter {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    order: i64,
    created: NaiveDateTime,
    modified: NaiveDateTime,
}

#[derive(Deserialize)]
struct LegacyCharacter {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    background: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    image_path: String,
    created: NaiveDateTime,
    modified: NaiveDateTime,
}

#[derive(Deserialize)]
struct LegacyWorldBuilding {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    locations: BTreeMap<String, String>,
    #[serde(default)]
    rules: BTreeMap<String, String>,
    #[serde(default)]
    history: String,
    created: NaiveDateTime,
    modified: NaiveDateTime,
}

#[derive(Deserialize)]
struct LegacyStoryNote {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    created: NaiveDateTime,
    modified: NaiveDateTime,
}

/// Parse a decompressed version 1 payload into a current [`Document`].
pub fn deserialize(bytes: &[u8]) -> QuillResult<Document> {
    let book: LegacyBook =
        serde_json::from_slice(bytes).map_err(|e| QuillError::Schema(format!("v1: {e}")))?;

    let now = Utc::now();
    let mut chapters = book.chapters;
    // stable: equal `order` keeps file order
    chapters.sort_by_key(|c| c.order);

    let chapters = chapters
        .into_iter()
        .map(|c| {
            Ok(Chapter {
                id: parse_id(&c.id)?,
                title: c.title,
                content: c.content,
                created: utc(c.created),
                modified: utc(c.modified),
            })
        })
        .collect::<QuillResult<Vec<_>>>()?;

    let characters = keyed(book.characters, |c| {
        Ok(Character {
            id: parse_id(&c.id)?,
            name: c.name,
            description: c.description,
            background: c.background,
            attributes: c.attributes,
            image_path: c.image_path,
            created: utc(c.created),
            modified: utc(c.modified),
        })
    })?;

    let world_building = keyed(book.world_building, |w| {
        Ok(WorldBuilding {
            id: parse_id(&w.id)?,
            name: w.name,
            description: w.description,
            history: w.history,
            locations: w.locations,
            rules: w.rules,
            created: utc(w.created),
            modified: utc(w.modified),
        })
    })?;

    let story_notes = keyed(book.story_notes, |n| {
        Ok(StoryNote {
            id: parse_id(&n.id)?,
            title: n.title,
            content: n.content,
            created: utc(n.created),
            modified: utc(n.modified),
        })
    })?;

    let id = match book.id {
        Some(raw) => parse_id(&raw)?,
        None => EntityId::random(),
    };

    Ok(Document {
        id,
        title: book.title,
        author: book.author,
        genre: book.genre,
        created: book.created.map(utc).unwrap_or(now),
        modified: book.modified.map(utc).unwrap_or(now),
        chapters,
        characters,
        world_building,
        story_notes,
        story_background: book.story_background,
        plot_outline: book.plot_outline,
        research_notes: book.research_notes,
        timeline: book.timeline,
        metadata: book.metadata,
    })
}

fn keyed<L, T, F>(records: Vec<L>, convert: F) -> QuillResult<BTreeMap<EntityId, T>>
where
    T: Entry,
    F: Fn(L) -> QuillResult<T>,
{
    let mut map = BTreeMap::new();
    for record in records {
        let entry = convert(record)?;
        let id = entry.id();
        if map.insert(id, entry).is_some() {
            return Err(QuillError::Schema(format!("v1: duplicate id {id}")));
        }
    }
    Ok(map)
}

fn parse_id(raw: &str) -> QuillResult<EntityId> {
    Uuid::parse_str(raw)
        .map(EntityId)
        .map_err(|e| QuillError::Schema(format!("v1: bad id {raw:?}: {e}")))
}

fn utc(naive: NaiveDateTime) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const BOOK: &str = r#"{
  "id": "0b0f7a4e-8d0c-4a43-9b0e-3f1b2a9c6d11",
  "title": "Dune",
  "author": "FH",
  "genre": "",
  "created": "2024-01-15T10:30:00.123456",
  "modified": "2024-01-16T08:00:00",
  "chapters": [
    {"id": "6f1c9f0e-1111-4c1a-8a55-000000000002", "title": "Second", "content": "b",
     "order": 1, "word_count": 1,
     "created": "2024-01-15T10:30:00", "modified": "2024-01-15T10:30:00"},
    {"id": "6f1c9f0e-1111-4c1a-8a55-000000000001", "title": "First", "content": "It began...",
     "order": 0, "word_count": 8,
     "created": "2024-01-15T10:30:00", "modified": "2024-01-15T10:30:00"}
  ],
  "characters": [
    {"id": "6f1c9f0e-2222-4c1a-8a55-000000000001", "name": "Paul", "description": "heir",
     "background": "", "attributes": {"house": "Atreides"}, "image_path": "",
     "created": "2024-01-15T10:30:00", "modified": "2024-01-15T10:30:00"}
  ],
  "world_building": [],
  "story_notes": [],
  "story_background": "desert planet",
  "plot_outline": "",
  "research_notes": "",
  "timeline": "",
  "metadata": {"language": "en", "status": "draft", "tags": []}
}"#;

    #[test]
    fn test_chapters_follow_order_field() {
        let doc = deserialize(BOOK.as_bytes()).unwrap();
        let titles: Vec<_> = doc.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["First", "Second"]);
    }

    #[test]
    fn test_naive_timestamps_are_utc() {
        let doc = deserialize(BOOK.as_bytes()).unwrap();
        assert_eq!(doc.created.to_rfc3339(), "2024-01-15T10:30:00.123456+00:00");
        assert_eq!(doc.modified.hour(), 8);
    }

    #[test]
    fn test_fields_carry_over() {
        let doc = deserialize(BOOK.as_bytes()).unwrap();
        assert_eq!(doc.title, "Dune");
        assert_eq!(doc.story_background, "desert planet");
        let paul = doc.characters.values().next().unwrap();
        assert_eq!(paul.attributes["house"], "Atreides");
        assert_eq!(doc.metadata["status"], "draft");
    }

    #[test]
    fn test_malformed_id_rejected() {
        let bad = BOOK.replace("6f1c9f0e-2222-4c1a-8a55-000000000001", "not-a-uuid");
        assert!(matches!(
            deserialize(bad.as_bytes()),
            Err(QuillError::Schema(_))
        ));
    }

    #[test]
    fn test_duplicate_character_ids_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(BOOK).unwrap();
        let paul = value["characters"][0].clone();
        value["characters"].as_array_mut().unwrap().push(paul);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(deserialize(&bytes), Err(QuillError::Schema(_))));
    }
}
