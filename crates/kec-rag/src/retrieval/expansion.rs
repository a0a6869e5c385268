//! Synonym-based query expansion

use crate::domain::SynonymGroup;

/// Appends a bounded number of synonyms for every anchor found in a query
#[derive(Debug, Clone)]
pub struct QueryExpander {
    groups: Vec<SynonymGroup>,
    max_per_group: usize,
}

impl QueryExpander {
    pub fn new(groups: Vec<SynonymGroup>, max_per_group: usize) -> Self {
        Self { groups, max_per_group }
    }

    /// Expanded query text
    pub fn expand(&self, query: &str) -> String {
        let additions = self.expansions(query);
        if additions.is_empty() {
            return query.to_string();
        }
        format!("{} {}", query, additions.join(" "))
    }

    /// Synonyms that would be appended to `query`, in group order
    pub fn expansions(&self, query: &str) -> Vec<String> {
        let lower = query.to_lowercase();
        let mut additions: Vec<String> = Vec::new();

        for group in &self.groups {
            if !lower.contains(&group.anchor.to_lowercase()) {
                continue;
            }

            let picked: Vec<&String> = group
                .terms
                .iter()
                .filter(|term| !lower.contains(&term.to_lowercase()) && !additions.contains(term))
                .take(self.max_per_group)
                .collect();

            tracing::debug!("Expanding '{}' with {:?}", group.anchor, picked);
            additions.extend(picked.into_iter().cloned());
        }

        additions
    }
}
