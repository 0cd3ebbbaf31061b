//! Tag list helpers shared by rules and transactions
//!
//! Tags are stored as a JSON array in a nullable text column. An empty list
//! is stored as NULL, and anything unreadable comes back as an empty list.

use std::collections::HashSet;

/// Normalize tags: deduplicate, trim whitespace, remove empty
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for tag in tags {
        let trimmed = tag.trim().to_string();
        if !trimmed.is_empty() && seen.insert(trimmed.clone()) {
            result.push(trimmed);
        }
    }

    result
}

/// Serialize a tag list for storage (`None` for an empty list)
pub fn tags_to_storage(tags: &[String]) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    serde_json::to_string(tags).ok()
}

/// Deserialize a stored tag list
pub fn tags_from_storage(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Add a tag if not already present. Returns true if the list changed.
pub fn add_tag(tags: &mut Vec<String>, tag: &str) -> bool {
    let tag = tag.trim();
    if tag.is_empty() || tags.iter().any(|t| t == tag) {
        return false;
    }
    tags.push(tag.to_string());
    true
}

/// Remove a tag if present. Returns true if the list changed.
pub fn remove_tag(tags: &mut Vec<String>, tag: &str) -> bool {
    let before = tags.len();
    tags.retain(|t| t != tag);
    tags.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_normalization() {
        let tags = vec![
            "food".to_string(),
            "  groceries ".to_string(),
            "food".to_string(), // duplicate
            "".to_string(),     // empty
        ];
        assert_eq!(normalize_tags(&tags), vec!["food", "groceries"]);
    }

    #[test]
    fn test_storage_round_trip() {
        let tags = vec!["coffee".to_string(), "daily".to_string()];
        let stored = tags_to_storage(&tags);
        assert_eq!(tags_from_storage(stored.as_deref()), tags);
    }

    #[test]
    fn test_empty_list_is_absent() {
        assert_eq!(tags_to_storage(&[]), None);
        assert!(tags_from_storage(None).is_empty());
        assert!(tags_from_storage(Some("")).is_empty());
    }

    #[test]
    fn test_garbage_reads_as_empty() {
        assert!(tags_from_storage(Some("{not json")).is_empty());
    }

    #[test]
    fn test_add_remove() {
        let mut tags = Vec::new();
        assert!(add_tag(&mut tags, "travel"));
        assert!(!add_tag(&mut tags, "travel"));
        assert!(remove_tag(&mut tags, "travel"));
        assert!(!remove_tag(&mut tags, "travel"));
        assert!(tags.is_empty());
    }
}
