//! Schema description splitter.
//!
//! Splits a schema description into one [`SchemaSegment`] per table. A table
//! section starts at a line beginning with `###`; the rest of that line is
//! the table name. Everything before the first marker is preamble and is
//! dropped, as are sections whose marker line carries more `#` (deeper
//! headers) or no name at all.
//!
//! A final segment carries all business rules so that rules are searchable
//! alongside tables.

use uuid::Uuid;

use crate::catalog::{render_rules, SchemaCatalog};
use crate::models::{SchemaSegment, SegmentKind, DEFAULT_DOMAIN};

const TABLE_MARKER: &str = "###";

/// Heading placed at the top of the business-rules segment.
pub const RULES_HEADING: &str = "Business rules:";

/// Build every segment for a catalog: one per table, then one for the rules.
pub fn build_segments(catalog: &dyn SchemaCatalog) -> Vec<SchemaSegment> {
    let mut segments: Vec<SchemaSegment> = split_tables(catalog.description())
        .into_iter()
        .map(|(table, text)| SchemaSegment {
            id: Uuid::new_v4().to_string(),
            kind: SegmentKind::TableSchema,
            domain: catalog.domain_of(&table).to_string(),
            table_name: Some(table),
            text,
        })
        .collect();

    segments.push(SchemaSegment {
        id: Uuid::new_v4().to_string(),
        kind: SegmentKind::BusinessRules,
        domain: DEFAULT_DOMAIN.to_string(),
        table_name: None,
        text: format!("{}\n{}", RULES_HEADING, render_rules(catalog.business_rules())),
    });

    segments
}

/// Split a description into `(table_name, section_text)` pairs.
///
/// Table names are lowercased. The section text starts with the table name
/// line (without the marker) and runs to the next marker.
pub fn split_tables(description: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in description.lines() {
        if let Some(rest) = line.trim_start().strip_prefix(TABLE_MARKER) {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            // `####` and deeper are sub-headings, not tables.
            if rest.starts_with('#') {
                continue;
            }
            let name = rest.trim();
            if !name.is_empty() {
                current = Some((name.to_lowercase(), vec![name]));
            }
            continue;
        }

        if let Some((_, ref mut lines)) = current {
            lines.push(line);
        }
    }
    if let Some(section) = current.take() {
        sections.push(section);
    }

    sections
        .into_iter()
        .map(|(name, lines)| (name, lines.join("\n").trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticSchemaCatalog;

    const DESCRIPTION: &str = "\
Star Wars database

## Tables

### people
Characters of the saga.
- name VARCHAR
- gender VARCHAR

### Planets
- id INTEGER
- name VARCHAR
";

    #[test]
    fn test_preamble_excluded() {
        let sections = split_tables(DESCRIPTION);
        assert_eq!(sections.len(), 2);
        assert!(sections.iter().all(|(_, text)| !text.contains("Star Wars database")));
    }

    #[test]
    fn test_table_names_lowercased() {
        let sections = split_tables(DESCRIPTION);
        let names: Vec<&str> = sections.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["people", "planets"]);
    }

    #[test]
    fn test_section_text_starts_with_name() {
        let sections = split_tables(DESCRIPTION);
        assert!(sections[0].1.starts_with("people\nCharacters of the saga."));
        assert!(sections[0].1.contains("gender VARCHAR"));
        assert!(!sections[0].1.contains("Planets"));
    }

    #[test]
    fn test_deeper_headers_and_empty_names_skipped() {
        let text = "### \n#### Notes\nignored\n### films\n- title";
        let sections = split_tables(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].0, "films");
    }

    #[test]
    fn test_no_tables() {
        assert!(split_tables("just prose").is_empty());
        assert!(split_tables("").is_empty());
    }

    #[test]
    fn test_build_segments_tags_domain_and_appends_rules() {
        let catalog = StaticSchemaCatalog::new(DESCRIPTION, vec!["rule one".to_string()])
            .with_domain("7", ["planets"]);
        let segments = build_segments(&catalog);
        assert_eq!(segments.len(), 3);

        assert_eq!(segments[0].table_name.as_deref(), Some("people"));
        assert_eq!(segments[0].domain, DEFAULT_DOMAIN);
        assert_eq!(segments[1].domain, "7");

        let rules = &segments[2];
        assert_eq!(rules.kind, SegmentKind::BusinessRules);
        assert!(rules.table_name.is_none());
        assert!(rules.text.contains("- rule one"));
    }
}
