use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::{LambdaError, LambdaResult};

/// base name -> super names, in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideGraph {
    edges: HashMap<String, Vec<String>>,
}

impl OverrideGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supers(&self, base: &str) -> Option<&[String]> {
        self.edges.get(base).map(Vec::as_slice)
    }

    pub fn is_overridden(&self, base: &str) -> bool {
        self.edges.contains_key(base)
    }

    /// Appends `sup` to the supers of `base`. Rejects edges that close a cycle.
    pub fn add(&mut self, base: &str, sup: &str) -> LambdaResult<()> {
        if base == sup || self.reaches(sup, base) {
            return Err(LambdaError::structural(format!(
                "overriding [{}] with [{}] creates an override cycle",
                base, sup
            )));
        }
        debug!("override [{}] -> [{}]", base, sup);
        self.edges
            .entry(base.to_string())
            .or_default()
            .push(sup.to_string());
        Ok(())
    }

    /// Removes the most recent occurrence of `sup` under `base`.
    pub fn remove(&mut self, base: &str, sup: &str) -> bool {
        let Some(list) = self.edges.get_mut(base) else {
            return false;
        };
        let Some(position) = list.iter().rposition(|s| s == sup) else {
            return false;
        };
        list.remove(position);
        if list.is_empty() {
            self.edges.remove(base);
        }
        debug!("removed override [{}] -> [{}]", base, sup);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges
            .iter()
            .flat_map(|(base, list)| list.iter().map(move |s| (base.as_str(), s.as_str())))
    }

    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut pending = vec![from];
        let mut visited = HashSet::new();
        while let Some(current) = pending.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(next) = self.edges.get(current) {
                pending.extend(next.iter().map(String::as_str));
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_supers_kept_in_order() {
        let mut graph = OverrideGraph::new();
        graph.add("a", "b").unwrap();
        graph.add("a", "c").unwrap();
        assert_eq!(graph.supers("a").unwrap(), ["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_cycles_rejected() {
        let mut graph = OverrideGraph::new();
        graph.add("a", "b").unwrap();
        graph.add("b", "c").unwrap();
        assert!(graph.add("c", "a").is_err());
        assert!(graph.add("a", "a").is_err());
        assert!(graph.supers("c").is_none());
    }

    #[test]
    fn test_remove_one_occurrence() {
        let mut graph = OverrideGraph::new();
        graph.add("a", "b").unwrap();
        graph.add("a", "b").unwrap();
        assert!(graph.remove("a", "b"));
        assert_eq!(graph.supers("a").unwrap().len(), 1);
        assert!(graph.remove("a", "b"));
        assert!(!graph.is_overridden("a"));
        assert!(!graph.remove("a", "b"));
    }
}
