use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Stable handle to a category. Ids are never reused after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CategoryId(usize);

#[derive(Debug, Clone)]
struct Node {
    name: String,
    keywords: BTreeSet<String>,
    parent: Option<CategoryId>,
    children: Vec<CategoryId>,
}

/// On-disk shape: name -> {keywords, subcategories}.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCategory {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    subcategories: BTreeMap<String, StoredCategory>,
}

/// Named keyword groups arranged as a tree. Missing categories are reported
/// through `tracing` and the operation is skipped; nothing here fails on a
/// bad name.
#[derive(Debug, Default, Clone)]
pub struct CategoryRegistry {
    nodes: Vec<Option<Node>>,
    roots: Vec<CategoryId>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the registry from a JSON file. A missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let mut registry = Self::new();
        if !path.exists() {
            return Ok(registry);
        }
        let content = std::fs::read_to_string(path)?;
        let stored: BTreeMap<String, StoredCategory> = serde_json::from_str(&content)?;
        for (name, cat) in &stored {
            registry.insert_stored(name, None, cat);
        }
        Ok(registry)
    }

    /// Loaded nodes are kept even when their name already exists elsewhere in
    /// the tree, so saving never loses them. Lookups by name find the first.
    fn insert_stored(&mut self, name: &str, parent: Option<CategoryId>, cat: &StoredCategory) {
        if self.find(name).is_some() {
            warn!(category = name, "category name appears more than once, lookups use the first");
        }
        let id = self.push_node(name, parent);
        if let Some(node) = self.node_mut(id) {
            node.keywords.extend(cat.keywords.iter().cloned());
        }
        for (child_name, child) in &cat.subcategories {
            self.insert_stored(child_name, Some(id), child);
        }
    }

    /// Writes the whole registry to a sibling temp file, then renames it over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let stored: BTreeMap<String, StoredCategory> = self
            .roots
            .iter()
            .filter_map(|id| self.to_stored(*id))
            .collect();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&stored)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, format!("{json}\n"))?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn to_stored(&self, id: CategoryId) -> Option<(String, StoredCategory)> {
        let node = self.node(id)?;
        let subcategories = node
            .children
            .iter()
            .filter_map(|child| self.to_stored(*child))
            .collect();
        Some((
            node.name.clone(),
            StoredCategory {
                keywords: node.keywords.iter().cloned().collect(),
                subcategories,
            },
        ))
    }

    fn node(&self, id: CategoryId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    fn node_mut(&mut self, id: CategoryId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(|n| n.as_mut())
    }

    fn insert_node(&mut self, name: &str, parent: Option<CategoryId>) -> Option<CategoryId> {
        if self.find(name).is_some() {
            warn!(category = name, "category already exists");
            return None;
        }
        Some(self.push_node(name, parent))
    }

    fn push_node(&mut self, name: &str, parent: Option<CategoryId>) -> CategoryId {
        let id = CategoryId(self.nodes.len());
        self.nodes.push(Some(Node {
            name: name.to_string(),
            keywords: BTreeSet::new(),
            parent,
            children: Vec::new(),
        }));
        match parent.and_then(|p| self.node_mut(p)) {
            Some(p) => p.children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    fn lookup(&self, name: &str) -> Option<CategoryId> {
        let found = self.find(name);
        if found.is_none() {
            warn!(category = name, "category does not exist");
        }
        found
    }

    /// Depth-first search by name; first match wins.
    pub fn find(&self, name: &str) -> Option<CategoryId> {
        self.ids().into_iter().find(|id| self.name(*id) == Some(name))
    }

    pub fn name(&self, id: CategoryId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    pub fn parent(&self, id: CategoryId) -> Option<CategoryId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn roots(&self) -> &[CategoryId] {
        &self.roots
    }

    pub fn children(&self, id: CategoryId) -> &[CategoryId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// All live categories in depth-first order.
    pub fn ids(&self) -> Vec<CategoryId> {
        let mut out = Vec::new();
        let mut stack: Vec<CategoryId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn names(&self) -> Vec<String> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.name(id).map(str::to_string))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn depth(&self, id: CategoryId) -> usize {
        let mut depth = 0;
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            depth += 1;
            cur = self.parent(p);
        }
        depth
    }

    fn is_descendant(&self, id: CategoryId, ancestor: CategoryId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    /// Creates a category, nested under `parent` when given.
    pub fn add(&mut self, name: &str, parent: Option<&str>, keywords: &[&str]) -> Option<CategoryId> {
        let parent_id = match parent {
            Some(p) => Some(self.lookup(p)?),
            None => None,
        };
        let id = self.insert_node(name, parent_id)?;
        if let Some(node) = self.node_mut(id) {
            node.keywords.extend(keywords.iter().map(|k| k.to_string()));
        }
        Some(id)
    }

    pub fn add_keywords(&mut self, name: &str, keywords: &[&str]) -> bool {
        let Some(node) = self.lookup(name).and_then(|id| self.node_mut(id)) else {
            return false;
        };
        node.keywords.extend(keywords.iter().map(|k| k.to_string()));
        true
    }

    pub fn remove_keywords(&mut self, name: &str, keywords: &[&str]) -> bool {
        let Some(node) = self.lookup(name).and_then(|id| self.node_mut(id)) else {
            return false;
        };
        for k in keywords {
            node.keywords.remove(*k);
        }
        true
    }

    /// Own keywords, plus every descendant's when `include_subcategories`.
    pub fn keywords_of(&self, name: &str, include_subcategories: bool) -> BTreeSet<String> {
        self.lookup(name)
            .map(|id| self.keywords_of_id(id, include_subcategories))
            .unwrap_or_default()
    }

    pub fn keywords_of_id(&self, id: CategoryId, include_subcategories: bool) -> BTreeSet<String> {
        let Some(node) = self.node(id) else {
            return BTreeSet::new();
        };
        let mut out = node.keywords.clone();
        if include_subcategories {
            for child in &node.children {
                out.extend(self.keywords_of_id(*child, true));
            }
        }
        out
    }

    pub fn rename(&mut self, name: &str, new_name: &str) -> bool {
        let Some(id) = self.lookup(name) else {
            return false;
        };
        if name != new_name && self.find(new_name).is_some() {
            warn!(category = new_name, "category already exists");
            return false;
        }
        if let Some(node) = self.node_mut(id) {
            node.name = new_name.to_string();
        }
        true
    }

    /// Reparents a category; `None` moves it to the top level. A category
    /// cannot be moved under itself or under one of its descendants.
    pub fn move_to(&mut self, name: &str, new_parent: Option<&str>) -> bool {
        let Some(id) = self.lookup(name) else {
            return false;
        };
        let parent_id = match new_parent {
            Some(p) => match self.lookup(p) {
                Some(pid) => Some(pid),
                None => return false,
            },
            None => None,
        };
        if let Some(pid) = parent_id {
            if self.is_descendant(pid, id) {
                warn!(category = name, parent = ?new_parent, "a category cannot be its own subcategory");
                return false;
            }
        }
        self.detach(id);
        if let Some(node) = self.node_mut(id) {
            node.parent = parent_id;
        }
        match parent_id.and_then(|p| self.node_mut(p)) {
            Some(p) => p.children.push(id),
            None => self.roots.push(id),
        }
        true
    }

    /// Removes a category together with all of its subcategories.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(id) = self.lookup(name) else {
            return false;
        };
        self.detach(id);
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(cur.0).and_then(Option::take) {
                stack.extend(node.children);
            }
        }
        true
    }

    fn detach(&mut self, id: CategoryId) {
        match self.parent(id).and_then(|p| self.node_mut(p)) {
            Some(p) => p.children.retain(|c| *c != id),
            None => self.roots.retain(|c| *c != id),
        }
    }

    /// Most specific category with an own keyword found in `description`
    /// (ASCII case-insensitive, like the query filter).
    pub fn categorize(&self, description: &str) -> Option<CategoryId> {
        let desc = description.to_ascii_lowercase();
        let mut best: Option<(usize, CategoryId)> = None;
        for id in self.ids() {
            let Some(node) = self.node(id) else { continue };
            if node
                .keywords
                .iter()
                .any(|k| desc.contains(&k.to_ascii_lowercase()))
            {
                let depth = self.depth(id);
                if best.map_or(true, |(d, _)| depth > d) {
                    best = Some((depth, id));
                }
            }
        }
        best.map(|(_, id)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CategoryRegistry {
        let mut reg = CategoryRegistry::new();
        reg.add("Food", None, &["GROCER"]);
        reg.add("Coffee", Some("Food"), &["STARBUCKS", "CAFE"]);
        reg.add("Espresso", Some("Coffee"), &["ESPRESSO BAR"]);
        reg.add("Rent", None, &["LANDLORD"]);
        reg
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_keywords_of_includes_descendants() {
        let reg = sample();
        assert_eq!(reg.keywords_of("Food", false), set(&["GROCER"]));
        assert_eq!(
            reg.keywords_of("Food", true),
            set(&["GROCER", "STARBUCKS", "CAFE", "ESPRESSO BAR"])
        );
    }

    #[test]
    fn test_keywords_are_monotonic() {
        let reg = sample();
        for name in reg.names() {
            let own = reg.keywords_of(&name, false);
            let all = reg.keywords_of(&name, true);
            assert!(all.is_superset(&own), "{name}");
        }
    }

    #[test]
    fn test_add_under_missing_parent_is_a_no_op() {
        let mut reg = sample();
        assert!(reg.add("Orphan", Some("Nope"), &["X"]).is_none());
        assert!(reg.find("Orphan").is_none());
        assert_eq!(reg.len(), 4);
    }

    #[test]
    fn test_add_existing_name_is_a_no_op() {
        let mut reg = sample();
        assert!(reg.add("Coffee", None, &["OTHER"]).is_none());
        assert!(!reg.keywords_of("Coffee", false).contains("OTHER"));
    }

    #[test]
    fn test_keyword_set_semantics() {
        let mut reg = sample();
        assert!(reg.add_keywords("Rent", &["LANDLORD", "PROPERTY MGMT", "PROPERTY MGMT"]));
        assert_eq!(reg.keywords_of("Rent", false), set(&["LANDLORD", "PROPERTY MGMT"]));
        assert!(reg.remove_keywords("Rent", &["LANDLORD", "ABSENT"]));
        assert_eq!(reg.keywords_of("Rent", false), set(&["PROPERTY MGMT"]));
    }

    #[test]
    fn test_missing_category_operations_report_false() {
        let mut reg = sample();
        assert!(!reg.add_keywords("Nope", &["X"]));
        assert!(!reg.remove_keywords("Nope", &["X"]));
        assert!(!reg.rename("Nope", "Other"));
        assert!(!reg.move_to("Nope", None));
        assert!(!reg.remove("Nope"));
        assert!(reg.keywords_of("Nope", true).is_empty());
    }

    #[test]
    fn test_rename_keeps_tree_position() {
        let mut reg = sample();
        assert!(reg.rename("Coffee", "Cafes"));
        assert!(reg.find("Coffee").is_none());
        let id = reg.find("Cafes").unwrap();
        assert_eq!(reg.parent(id), reg.find("Food"));
        assert!(!reg.rename("Cafes", "Rent"));
    }

    #[test]
    fn test_move_reparents_and_changes_inheritance() {
        let mut reg = sample();
        assert!(reg.move_to("Coffee", Some("Rent")));
        assert_eq!(reg.keywords_of("Food", true), set(&["GROCER"]));
        assert!(reg.keywords_of("Rent", true).contains("ESPRESSO BAR"));
        assert!(reg.move_to("Coffee", None));
        assert!(reg.roots().contains(&reg.find("Coffee").unwrap()));
    }

    #[test]
    fn test_move_rejects_self_and_descendant() {
        let mut reg = sample();
        assert!(!reg.move_to("Food", Some("Food")));
        assert!(!reg.move_to("Food", Some("Espresso")));
        assert_eq!(reg.parent(reg.find("Food").unwrap()), None);
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut reg = sample();
        assert!(reg.remove("Coffee"));
        assert!(reg.find("Espresso").is_none());
        assert_eq!(reg.names(), vec!["Food", "Rent"]);
        let id = reg.add("Coffee", None, &[]).unwrap();
        assert!(reg.keywords_of_id(id, true).is_empty());
    }

    #[test]
    fn test_ids_are_depth_first() {
        let reg = sample();
        assert_eq!(reg.names(), vec!["Food", "Coffee", "Espresso", "Rent"]);
    }

    #[test]
    fn test_categorize_prefers_deepest_match() {
        let reg = sample();
        let id = reg.categorize("Espresso Bar Cafe downtown").unwrap();
        assert_eq!(reg.name(id), Some("Espresso"));
        assert_eq!(reg.categorize("GROCER #12").and_then(|i| reg.name(i)), Some("Food"));
        assert!(reg.categorize("Payroll").is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("categories.json");
        let reg = sample();
        reg.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = CategoryRegistry::load(&path).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.keywords_of("Food", true), reg.keywords_of("Food", true));
        let espresso = loaded.find("Espresso").unwrap();
        assert_eq!(loaded.parent(espresso), loaded.find("Coffee"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = CategoryRegistry::load(&dir.path().join("none.json")).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn test_load_nested_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(
            &path,
            r#"{"Travel": {"keywords": ["AIRLINE"], "subcategories": {"Hotels": {"keywords": ["HILTON"]}}}}"#,
        )
        .unwrap();
        let reg = CategoryRegistry::load(&path).unwrap();
        assert_eq!(reg.keywords_of("Travel", true), set(&["AIRLINE", "HILTON"]));
    }

    #[test]
    fn test_load_keeps_same_name_in_two_branches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(
            &path,
            r#"{"A": {"subcategories": {"X": {}}},
                "B": {"subcategories": {"X": {"keywords": ["k"], "subcategories": {"Y": {"keywords": ["yk"]}}}}}}"#,
        )
        .unwrap();
        let mut reg = CategoryRegistry::load(&path).unwrap();
        assert_eq!(reg.names(), vec!["A", "X", "B", "X", "Y"]);
        assert_eq!(reg.keywords_of("B", true), set(&["k", "yk"]));
        // Lookup by name resolves to the first X, under A.
        let x = reg.find("X").unwrap();
        assert_eq!(reg.parent(x), reg.find("A"));

        assert!(reg.add_keywords("A", &["ak"]));
        reg.save(&path).unwrap();
        let reloaded = CategoryRegistry::load(&path).unwrap();
        assert_eq!(reloaded.keywords_of("B", true), set(&["k", "yk"]));
        assert_eq!(reloaded.keywords_of("Y", false), set(&["yk"]));
    }
}
