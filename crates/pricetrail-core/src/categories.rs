//! Category reference list, loaded from a JSON file of the form
//! `{"items":[{"category_id", "parent_category_id", "category_name"}]}`.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::products::Category;
use crate::ConfigError;

#[derive(Debug, Deserialize)]
struct CategoriesFile {
    #[serde(default)]
    items: Vec<RawCategory>,
}

/// Ids arrive as numbers or numeric strings depending on how the file was
/// exported, so they are kept loose until validation.
#[derive(Debug, Deserialize)]
struct RawCategory {
    #[serde(default)]
    category_id: Value,
    #[serde(default)]
    parent_category_id: Value,
    #[serde(default)]
    category_name: Option<String>,
}

/// Load the category list from `path`.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or is not valid JSON.
/// Individual invalid entries are skipped, not reported as errors.
pub fn load_categories(path: &Path) -> Result<Vec<Category>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CategoriesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_categories(&content)
}

/// Parse a category list document.
///
/// Entries with a non-numeric id or a blank name are dropped with a warning,
/// as are repeated ids after the first. A parent id of `0` or an absent
/// parent marks a top-level category.
///
/// # Errors
///
/// Returns [`ConfigError::CategoriesFileParse`] if `content` is not valid JSON
/// of the expected shape.
pub fn parse_categories(content: &str) -> Result<Vec<Category>, ConfigError> {
    let file: CategoriesFile = serde_json::from_str(content)?;

    let mut categories: Vec<Category> = Vec::with_capacity(file.items.len());
    for raw in file.items {
        let Some(category_id) = as_id(&raw.category_id).filter(|id| *id != 0) else {
            tracing::warn!(category_id = %raw.category_id, "skipping category with invalid id");
            continue;
        };
        let name = raw.category_name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            tracing::warn!(category_id, "skipping category without a name");
            continue;
        }
        let parent_category_id = match &raw.parent_category_id {
            Value::Null => None,
            other => match as_id(other) {
                Some(0) => None,
                Some(id) => Some(id),
                None => {
                    tracing::warn!(category_id, "skipping category with invalid parent id");
                    continue;
                }
            },
        };
        if categories.iter().any(|c| c.category_id == category_id) {
            continue;
        }
        categories.push(Category {
            category_id,
            parent_category_id,
            name: name.to_owned(),
        });
    }

    Ok(categories)
}

fn as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
