use std::collections::{BTreeMap, HashSet};

use globset::GlobBuilder;
use serde::{Deserialize, Deserializer};
use tracing::warn;

/// Accepts either a single glob string or a list of globs.
pub(crate) fn string_or_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        One(String),
        Many(Vec<String>),
    }

    Ok(Option::<StringOrList>::deserialize(deserializer)?.map(|value| match value {
        StringOrList::One(one) => vec![one],
        StringOrList::Many(many) => many,
    }))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeIncludeRule {
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub schemas: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeExcludeRule {
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub schemas: Option<Vec<String>>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub except_schemas: Option<Vec<String>>,
}

/// Include/exclude rule set over discovered catalogs and schemas.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntrospectionScope {
    #[serde(default)]
    pub include: Vec<ScopeIncludeRule>,
    #[serde(default)]
    pub exclude: Vec<ScopeExcludeRule>,
}

impl IntrospectionScope {
    pub fn validate(&self) -> Result<(), String> {
        for rule in &self.include {
            if rule.catalog.is_none() && rule.schemas.is_none() {
                return Err("include rule must specify at least 'catalog' or 'schemas'".to_string());
            }
        }
        for rule in &self.exclude {
            if rule.catalog.is_none() && rule.schemas.is_none() {
                return Err("exclude rule must specify at least 'catalog' or 'schemas'".to_string());
            }
        }
        Ok(())
    }
}

/// The final catalog+schema scope to introspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSelection {
    pub catalogs: Vec<String>,
    pub schemas_per_catalog: BTreeMap<String, Vec<String>>,
}

pub(crate) fn glob_match(pattern: &str, value: &str) -> bool {
    let glob = GlobBuilder::new(pattern).case_insensitive(true).build();
    match glob {
        Ok(glob) => glob.compile_matcher().is_match(value),
        Err(e) => {
            warn!(pattern, error = %e, "ignoring unparseable scope pattern");
            false
        }
    }
}

pub(crate) fn matches_any(patterns: Option<&Vec<String>>, value: &str) -> bool {
    match patterns {
        None => true,
        Some(patterns) => patterns.iter().any(|p| glob_match(p, value)),
    }
}

/// Applies include/exclude rules (glob matching, case-insensitive) to a
/// discovered set of catalogs/schemas.
///
/// Empty include means everything; a non-empty include is an allowlist.
/// Exclude wins over include; `except_schemas` punches holes in an exclude
/// rule. Ignored schemas are always dropped first, and a catalog without any
/// remaining schema disappears.
pub struct IntrospectionScopeMatcher {
    scope: IntrospectionScope,
    ignored_schemas: HashSet<String>,
}

impl IntrospectionScopeMatcher {
    pub fn new(scope: Option<IntrospectionScope>, ignored_schemas: &[&str]) -> Self {
        Self {
            scope: scope.unwrap_or_default(),
            ignored_schemas: ignored_schemas.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    pub fn filter_scopes(
        &self,
        catalogs: &[String],
        schemas_per_catalog: &BTreeMap<String, Vec<String>>,
    ) -> ScopeSelection {
        let has_includes = !self.scope.include.is_empty();
        let mut filtered: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for catalog in catalogs {
            let mut kept_schemas = Vec::new();
            for schema in schemas_per_catalog.get(catalog).unwrap_or(&Vec::new()) {
                if self.ignored_schemas.contains(&schema.to_lowercase()) {
                    continue;
                }
                if has_includes && !self.is_included(catalog, schema) {
                    continue;
                }
                if self.is_excluded(catalog, schema) {
                    continue;
                }
                kept_schemas.push(schema.clone());
            }

            if !kept_schemas.is_empty() {
                filtered.insert(catalog.clone(), kept_schemas);
            }
        }

        let catalogs = catalogs
            .iter()
            .filter(|c| filtered.contains_key(*c))
            .cloned()
            .collect();

        ScopeSelection {
            catalogs,
            schemas_per_catalog: filtered,
        }
    }

    fn is_included(&self, catalog: &str, schema: &str) -> bool {
        self.scope.include.iter().any(|rule| {
            if let Some(pattern) = &rule.catalog {
                if !glob_match(pattern, catalog) {
                    return false;
                }
            }
            matches_any(rule.schemas.as_ref(), schema)
        })
    }

    fn is_excluded(&self, catalog: &str, schema: &str) -> bool {
        self.scope.exclude.iter().any(|rule| {
            if let Some(pattern) = &rule.catalog {
                if !glob_match(pattern, catalog) {
                    return false;
                }
            }
            if !matches_any(rule.schemas.as_ref(), schema) {
                return false;
            }
            // except_schemas prevents exclusion for this rule only.
            if let Some(except) = &rule.except_schemas {
                if except.iter().any(|p| glob_match(p, schema)) {
                    return false;
                }
            }
            true
        })
    }
}
