//! Schema catalog: the source of schema text and business rules.
//!
//! The catalog is what the retrieval index is built from and what the
//! generator falls back to when retrieval finds nothing relevant. Rules are
//! ordered; the order is part of the catalog's content.

use anyhow::{Context, Result};
use std::collections::HashMap;

use crate::config::SchemaConfig;
use crate::models::DEFAULT_DOMAIN;

/// Supplies the schema description and business rules.
pub trait SchemaCatalog: Send + Sync {
    /// Free-text schema description, table sections introduced by `###`.
    fn description(&self) -> &str;

    /// Ordered plain-language constraints on data semantics.
    fn business_rules(&self) -> &[String];

    /// Domain scope a table belongs to.
    fn domain_of(&self, _table: &str) -> &str {
        DEFAULT_DOMAIN
    }
}

/// Catalog held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaCatalog {
    description: String,
    rules: Vec<String>,
    domains: HashMap<String, String>,
}

impl StaticSchemaCatalog {
    pub fn new(description: impl Into<String>, rules: Vec<String>) -> Self {
        Self {
            description: description.into(),
            rules,
            domains: HashMap::new(),
        }
    }

    /// Tag `tables` with domain `id`. A table keeps the first domain it is given.
    pub fn with_domain<I, S>(mut self, id: &str, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for table in tables {
            self.domains
                .entry(table.as_ref().to_lowercase())
                .or_insert_with(|| id.to_string());
        }
        self
    }

    /// Load the description file and rules named by the `[schema]` section.
    pub fn load(config: &SchemaConfig) -> Result<Self> {
        let description = std::fs::read_to_string(&config.description_path).with_context(|| {
            format!(
                "Failed to read schema description: {}",
                config.description_path.display()
            )
        })?;

        let mut rules = config.rules.clone();
        if let Some(ref path) = config.rules_path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
            rules.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(|line| line.trim_start_matches("- ").to_string()),
            );
        }

        let mut catalog = Self::new(description, rules);
        for domain in &config.domains {
            catalog = catalog.with_domain(&domain.id, &domain.tables);
        }
        Ok(catalog)
    }
}

impl SchemaCatalog for StaticSchemaCatalog {
    fn description(&self) -> &str {
        &self.description
    }

    fn business_rules(&self) -> &[String] {
        &self.rules
    }

    fn domain_of(&self, table: &str) -> &str {
        self.domains
            .get(&table.to_lowercase())
            .map(String::as_str)
            .unwrap_or(DEFAULT_DOMAIN)
    }
}

/// Render rules as a bulleted list, one rule per line.
pub fn render_rules(rules: &[String]) -> String {
    let mut out = String::new();
    for rule in rules {
        out.push_str("- ");
        out.push_str(rule);
        out.push('\n');
    }
    out
}
