//! Domain trie for fast domain matching

use std::collections::HashMap;

/// Node in the domain trie
#[derive(Debug, Clone)]
struct TrieNode<T: Clone> {
    children: HashMap<String, TrieNode<T>>,
    /// Exact match on this node only
    value: Option<T>,
    /// Matches this node and everything below it
    subtree: Option<T>,
}

impl<T: Clone> Default for TrieNode<T> {
    fn default() -> Self {
        TrieNode {
            children: HashMap::new(),
            value: None,
            subtree: None,
        }
    }
}

/// Domain trie keyed by reversed labels
///
/// Supports:
/// - Exact match: `example.com` only
/// - Subtree match: `example.com` and every `*.example.com`
///
/// Lookups are case-insensitive and ignore a trailing dot.
#[derive(Debug, Clone)]
pub struct DomainTrie<T: Clone> {
    root: TrieNode<T>,
    /// Count of entries
    count: usize,
}

impl<T: Clone> Default for DomainTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> DomainTrie<T> {
    /// Create new domain trie
    pub fn new() -> Self {
        DomainTrie {
            root: TrieNode::default(),
            count: 0,
        }
    }

    /// Insert an exact domain
    pub fn insert_exact(&mut self, domain: &str, value: T) -> bool {
        match self.node_mut(domain) {
            Some(node) => {
                node.value = Some(value);
                self.count += 1;
                true
            }
            None => false,
        }
    }

    /// Insert a domain together with all of its subdomains
    pub fn insert_subtree(&mut self, domain: &str, value: T) -> bool {
        match self.node_mut(domain) {
            Some(node) => {
                node.subtree = Some(value);
                self.count += 1;
                true
            }
            None => false,
        }
    }

    fn node_mut(&mut self, domain: &str) -> Option<&mut TrieNode<T>> {
        let domain = normalize(domain);
        if domain.is_empty() {
            return None;
        }

        let mut node = &mut self.root;
        for part in domain.rsplit('.') {
            node = node.children.entry(part.to_string()).or_default();
        }
        Some(node)
    }

    /// Search for domain, returns matched value
    ///
    /// An exact entry wins over a subtree entry; among subtree entries the
    /// longest one wins.
    pub fn search(&self, domain: &str) -> Option<&T> {
        let domain = normalize(domain);
        if domain.is_empty() {
            return None;
        }

        let mut node = &self.root;
        let mut last_subtree: Option<&T> = None;

        for part in domain.rsplit('.') {
            match node.children.get(part) {
                Some(child) => {
                    node = child;
                    if node.subtree.is_some() {
                        last_subtree = node.subtree.as_ref();
                    }
                }
                None => return last_subtree,
            }
        }

        node.value.as_ref().or(last_subtree)
    }

    /// Check if domain matches (any value)
    pub fn contains(&self, domain: &str) -> bool {
        self.search(domain).is_some()
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.root = TrieNode::default();
        self.count = 0;
    }
}

fn normalize(domain: &str) -> String {
    domain.trim_end_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let mut trie = DomainTrie::new();
        trie.insert_exact("example.com", "proxy1");

        assert_eq!(trie.search("example.com"), Some(&"proxy1"));
        assert_eq!(trie.search("www.example.com"), None);
        assert_eq!(trie.search("example.org"), None);
        assert_eq!(trie.search("com"), None);
    }

    #[test]
    fn test_subtree_match() {
        let mut trie = DomainTrie::new();
        trie.insert_subtree("example.com", "proxy1");

        assert_eq!(trie.search("example.com"), Some(&"proxy1"));
        assert_eq!(trie.search("www.example.com"), Some(&"proxy1"));
        assert_eq!(trie.search("foo.bar.example.com"), Some(&"proxy1"));
        assert_eq!(trie.search("notexample.com"), None);
        assert_eq!(trie.search("com"), None);
    }

    #[test]
    fn test_case_and_trailing_dot() {
        let mut trie = DomainTrie::new();
        trie.insert_exact("Example.COM", "proxy1");

        assert_eq!(trie.search("example.com"), Some(&"proxy1"));
        assert_eq!(trie.search("EXAMPLE.COM."), Some(&"proxy1"));
    }

    #[test]
    fn test_priority() {
        let mut trie = DomainTrie::new();
        trie.insert_subtree("example.com", "outer");
        trie.insert_subtree("api.example.com", "inner");
        trie.insert_exact("www.example.com", "exact");

        assert_eq!(trie.search("www.example.com"), Some(&"exact"));
        assert_eq!(trie.search("v1.api.example.com"), Some(&"inner"));
        assert_eq!(trie.search("cdn.example.com"), Some(&"outer"));
    }

    #[test]
    fn test_empty_domain_rejected() {
        let mut trie: DomainTrie<()> = DomainTrie::new();
        assert!(!trie.insert_exact("", ()));
        assert!(!trie.insert_subtree(".", ()));
        assert!(trie.is_empty());
        assert!(!trie.contains(""));

        trie.insert_exact("a.b", ());
        assert_eq!(trie.len(), 1);
        trie.clear();
        assert!(trie.is_empty());
    }
}
