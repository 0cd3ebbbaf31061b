//! Category domain model
//!
//! Categories are owned by the surrounding CRUD layer. The engine only needs
//! an identifier, a display name and a tenant-scoped existence check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A transaction category belonging to a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub tenant_id: String,
    pub name: String,
    pub display_name: Option<String>,
    /// URL-friendly identifier derived from the name
    pub slug: String,
    pub parent_id: Option<i64>,
    /// income, expense, transfer, other
    pub category_type: String,
    pub is_active: bool,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Category {
    /// Create a new category with required fields
    pub fn new(id: i64, tenant_id: impl Into<String>, name: impl Into<String>, category_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            tenant_id: tenant_id.into(),
            slug: Self::slugify(&name),
            name,
            display_name: None,
            parent_id: None,
            category_type: category_type.into(),
            is_active: true,
            is_system: false,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    /// Lightweight reference carried by rules
    pub fn reference(&self) -> CategoryRef {
        CategoryRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Name shown to users (display name falls back to name)
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    fn slugify(name: &str) -> String {
        let mut slug = String::with_capacity(name.len());
        let mut last_dash = true;
        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        slug.trim_end_matches('-').to_string()
    }
}

/// The target category of a rule: its id and the name written onto
/// categorized transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
}

impl CategoryRef {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_generation() {
        let category = Category::new(1, "acme", "Food & Dining", "expense");
        assert_eq!(category.slug, "food-dining");
        assert_eq!(category.label(), "Food & Dining");
        assert_eq!(category.reference(), CategoryRef::new(1, "Food & Dining"));
    }
}
