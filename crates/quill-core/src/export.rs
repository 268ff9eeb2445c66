//! Plain markdown export of a document.

use std::fmt::Write;

use crate::model::Document;

/// Render the book as a single markdown file: title block, writing aids,
/// chapters in order, then characters and world-building entries.
pub fn to_markdown(doc: &Document) -> String {
    let mut out = String::new();

    let title = non_empty(&doc.title, "Untitled Book");
    let _ = writeln!(out, "# {title}\n");
    let _ = writeln!(out, "**Author:** {}", non_empty(&doc.author, "Unknown"));
    let _ = writeln!(out, "**Genre:** {}", non_empty(&doc.genre, "Unknown"));
    let _ = writeln!(out, "**Created:** {}\n", doc.created.to_rfc3339());

    section(&mut out, "Story Background", &doc.story_background);
    section(&mut out, "Plot Outline", &doc.plot_outline);

    if !doc.chapters.is_empty() {
        out.push_str("## Chapters\n\n");
        for chapter in &doc.chapters {
            let _ = writeln!(out, "### {}\n", non_empty(&chapter.title, "Untitled Chapter"));
            out.push_str(&chapter.content);
            out.push_str("\n\n");
        }
    }

    if !doc.characters.is_empty() {
        out.push_str("## Characters\n\n");
        for character in doc.characters.values() {
            let _ = writeln!(out, "### {}\n", non_empty(&character.name, "Unnamed Character"));
            if !character.description.is_empty() {
                let _ = writeln!(out, "**Description:** {}\n", character.description);
            }
            if !character.background.is_empty() {
                let _ = writeln!(out, "**Background:** {}\n", character.background);
            }
        }
    }

    if !doc.world_building.is_empty() {
        out.push_str("## World Building\n\n");
        for entry in doc.world_building.values() {
            let _ = writeln!(out, "### {}\n", non_empty(&entry.name, "Unnamed Element"));
            if !entry.description.is_empty() {
                out.push_str(&entry.description);
                out.push_str("\n\n");
            }
        }
    }

    out
}

fn section(out: &mut String, heading: &str, body: &str) {
    if body.is_empty() {
        return;
    }
    let _ = writeln!(out, "## {heading}\n");
    out.push_str(body);
    out.push_str("\n\n");
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}
