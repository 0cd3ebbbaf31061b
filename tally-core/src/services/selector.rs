//! Rule selection - the ordered candidate list for categorization

use std::sync::Arc;

use crate::domain::result::Result;
use crate::domain::{Rule, RuleType, TenantId};
use crate::ports::RuleRepository;

/// Fetches the active rules of a tenant in evaluation order
///
/// Order is descending priority, then ascending id. The result is re-sorted
/// after fetching, whatever order the repository returned.
#[derive(Clone)]
pub struct RuleSelector {
    rules: Arc<dyn RuleRepository>,
}

impl RuleSelector {
    pub fn new(rules: Arc<dyn RuleRepository>) -> Self {
        Self { rules }
    }

    pub fn active_rules(&self, tenant: &TenantId, rule_type: Option<RuleType>) -> Result<Vec<Rule>> {
        let mut rules = self.rules.fetch_active(tenant, rule_type)?;
        rules.retain(|r| r.is_active && !r.is_deleted() && r.tenant_id == tenant);
        sort_for_evaluation(&mut rules);
        tracing::debug!(tenant_id = tenant, count = rules.len(), "Selected active rules");
        Ok(rules)
    }
}

/// Sort rules into evaluation order
pub fn sort_for_evaluation(rules: &mut [Rule]) {
    rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::domain::CategoryRef;

    fn rule(id: i64, priority: i32) -> Rule {
        let mut r = Rule::new(id, "acme", format!("r{}", id), RuleType::Keyword, "x", CategoryRef::new(1, "A"));
        r.priority = priority;
        r
    }

    #[test]
    fn test_priority_then_id() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.add_rule(rule(5, 100)).unwrap();
        repo.add_rule(rule(2, 100)).unwrap();
        repo.add_rule(rule(9, 300)).unwrap();
        repo.add_rule(rule(1, 10)).unwrap();

        let selector = RuleSelector::new(repo);
        let ids: Vec<i64> = selector
            .active_rules("acme", None)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![9, 2, 5, 1]);
    }

    #[test]
    fn test_filters() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut archived = rule(1, 100);
        archived.is_active = false;
        repo.add_rule(archived).unwrap();
        let mut deleted = rule(2, 100);
        deleted.deleted_at = Some(chrono::Utc::now());
        repo.add_rule(deleted).unwrap();
        let mut regex = rule(3, 100);
        regex.rule_type = RuleType::Regex;
        repo.add_rule(regex).unwrap();
        repo.add_rule(rule(4, 100)).unwrap();
        let mut foreign = rule(5, 100);
        foreign.tenant_id = "other".to_string();
        repo.add_rule(foreign).unwrap();

        let selector = RuleSelector::new(repo);
        let all: Vec<i64> = selector.active_rules("acme", None).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(all, vec![3, 4]);

        let regex_only = selector.active_rules("acme", Some(RuleType::Regex)).unwrap();
        assert_eq!(regex_only.len(), 1);
        assert_eq!(regex_only[0].id, 3);
    }
}
