//! Hierarchical path map: an ordered trie over delimiter-separated keys.
//!
//! Build state is queried and invalidated by path, and source trees repeat
//! the same handful of directory segments thousands of times. A segment trie
//! with an interner makes prefix-shaped work proportional to subtree size and
//! amortizes segment storage across the whole key population, where a flat
//! hash map would pay per key.
//!
//! The interner is owned by the map instance. It is never process-wide state;
//! its lifecycle is the map's lifecycle.

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap as HashMap};
use serde::{Deserialize, Serialize};

/// Interned path-segment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegId(u32);

/// Deduplicating store for path segments.
///
/// Each distinct segment string is kept once and addressed by [`SegId`].
/// Owned by a single [`PathMap`]; interners are never shared or global.
#[derive(Debug, Clone, Default)]
pub struct SegmentInterner {
    ids: HashMap<Arc<str>, SegId>,
    segments: Vec<Arc<str>>,
}

impl SegmentInterner {
    /// Intern a segment, returning its stable id.
    pub fn intern(&mut self, segment: &str) -> SegId {
        if let Some(&id) = self.ids.get(segment) {
            return id;
        }
        let arc: Arc<str> = Arc::from(segment);
        let id = SegId(self.segments.len() as u32);
        self.segments.push(arc.clone());
        self.ids.insert(arc, id);
        id
    }

    /// Look up a segment id without interning.
    pub fn get(&self, segment: &str) -> Option<SegId> {
        self.ids.get(segment).copied()
    }

    /// Resolve an id back to its segment text.
    pub fn resolve(&self, id: SegId) -> &str {
        &self.segments[id.0 as usize]
    }

    /// Number of distinct interned segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether no segment has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[derive(Debug, Clone)]
struct TreeNode<V> {
    /// Children in first-insertion order, which fixes the DFS enumeration
    /// order deterministically.
    children: IndexMap<SegId, TreeNode<V>, FxBuildHasher>,
    /// Present iff this node terminates a stored key.
    value: Option<V>,
}

impl<V> TreeNode<V> {
    fn new() -> Self {
        Self {
            children: IndexMap::default(),
            value: None,
        }
    }
}

/// Ordered map from delimiter-separated path keys to values.
///
/// Keys are split on the map's delimiter into segments; a key ending in the
/// delimiter carries a trailing empty segment and is therefore a distinct key
/// from its delimiter-less twin. Enumeration is depth-first pre-order over the
/// segment tree, children in insertion order.
///
/// ```rust
/// use mason_graph::PathMap;
///
/// let mut map = PathMap::new('/');
/// map.put("aaa/bbb/ccc", 1);
/// map.put("aaa/bbb/ddd", 2);
/// assert_eq!(map.len(), 2);
/// assert_eq!(map.get("aaa/bbb/ccc"), Some(&1));
/// assert_eq!(map.get("aaa/bbb"), None); // intermediate, not terminal
/// ```
#[derive(Debug, Clone)]
pub struct PathMap<V> {
    delimiter: char,
    interner: SegmentInterner,
    root: TreeNode<V>,
    len: usize,
}

impl<V> PathMap<V> {
    /// Create an empty map splitting keys on `delimiter`.
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            interner: SegmentInterner::default(),
            root: TreeNode::new(),
            len: 0,
        }
    }

    /// The delimiter keys are split on.
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Number of stored terminal keys. O(1): maintained, not traversed.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no key is stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert or overwrite the value for an exact key.
    ///
    /// Returns the previous value for that exact key, if any. Values stored
    /// at prefix or extension keys are unaffected.
    pub fn put(&mut self, key: &str, value: V) -> Option<V> {
        let mut node = &mut self.root;
        for segment in key.split(self.delimiter) {
            let id = self.interner.intern(segment);
            node = node.children.entry(id).or_insert_with(TreeNode::new);
        }
        let old = node.value.replace(value);
        if old.is_none() {
            self.len += 1;
        }
        old
    }

    /// Exact-match lookup.
    ///
    /// Returns `None` when the path was never stored as a terminal key, even
    /// if it exists as an intermediate node on the way to other keys.
    pub fn get(&self, key: &str) -> Option<&V> {
        let mut node = &self.root;
        for segment in key.split(self.delimiter) {
            let id = self.interner.get(segment)?;
            node = node.children.get(&id)?;
        }
        node.value.as_ref()
    }

    /// Mutable exact-match lookup.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let mut node = &mut self.root;
        for segment in key.split(self.delimiter) {
            let id = self.interner.get(segment)?;
            node = node.children.get_mut(&id)?;
        }
        node.value.as_mut()
    }

    /// Whether the exact key is stored.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove the value at an exact key.
    ///
    /// Nodes left without children or value are pruned up to, but not
    /// including, the root.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let mut ids = Vec::new();
        for segment in key.split(self.delimiter) {
            ids.push(self.interner.get(segment)?);
        }
        let removed = Self::remove_rec(&mut self.root, &ids).0;
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Returns the removed value and whether the visited child became
    /// prunable (no value, no children).
    fn remove_rec(node: &mut TreeNode<V>, ids: &[SegId]) -> (Option<V>, bool) {
        match ids.split_first() {
            None => {
                let removed = node.value.take();
                (removed, node.children.is_empty())
            }
            Some((&id, rest)) => {
                let Some(child) = node.children.get_mut(&id) else {
                    return (None, false);
                };
                let (removed, prune) = Self::remove_rec(child, rest);
                if prune && removed.is_some() {
                    // shift_remove keeps the sibling insertion order intact.
                    node.children.shift_remove(&id);
                }
                (
                    removed,
                    node.value.is_none() && node.children.is_empty(),
                )
            }
        }
    }

    /// Lazy depth-first pre-order iterator over stored keys.
    ///
    /// Each call starts from the current map state. Mutating the map while an
    /// iterator from an earlier call is alive is out of contract.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.entries().map(|(key, _)| key)
    }

    /// Lazy depth-first pre-order iterator over `(key, value)` entries.
    ///
    /// This is the flat representation persisted state round-trips through;
    /// see [`PathMap::from_entries`].
    pub fn entries(&self) -> Entries<'_, V> {
        let mut stack = Vec::new();
        for (&id, child) in self.root.children.iter().rev() {
            stack.push(Action::Enter(id, child));
        }
        Entries {
            map: self,
            stack,
            path: Vec::new(),
        }
    }

    /// Rebuild a map from flat `(key, value)` pairs.
    pub fn from_entries(delimiter: char, entries: impl IntoIterator<Item = (String, V)>) -> Self {
        let mut map = Self::new(delimiter);
        for (key, value) in entries {
            map.put(&key, value);
        }
        map
    }

    fn render_path(&self, path: &[SegId]) -> String {
        let mut out = String::new();
        for (i, &id) in path.iter().enumerate() {
            if i > 0 {
                out.push(self.delimiter);
            }
            out.push_str(self.interner.resolve(id));
        }
        out
    }
}

enum Action<'a, V> {
    Enter(SegId, &'a TreeNode<V>),
    Leave,
}

/// Iterator over `(key, value)` entries in depth-first pre-order.
pub struct Entries<'a, V> {
    map: &'a PathMap<V>,
    stack: Vec<Action<'a, V>>,
    path: Vec<SegId>,
}

impl<'a, V> Iterator for Entries<'a, V> {
    type Item = (String, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(action) = self.stack.pop() {
            match action {
                Action::Enter(id, node) => {
                    self.path.push(id);
                    self.stack.push(Action::Leave);
                    for (&child_id, child) in node.children.iter().rev() {
                        self.stack.push(Action::Enter(child_id, child));
                    }
                    if let Some(value) = node.value.as_ref() {
                        return Some((self.map.render_path(&self.path), value));
                    }
                }
                Action::Leave => {
                    self.path.pop();
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get_distinct_siblings() {
        let mut map = PathMap::new('/');
        map.put("aaa/bbb/ccc", 1);
        map.put("aaa/bbb/ddd", 2);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("aaa/bbb/ccc"), Some(&1));
        assert_eq!(map.get("aaa/bbb/ddd"), Some(&2));
    }

    #[test]
    fn reput_overwrites_without_growing() {
        let mut map = PathMap::new('/');
        assert_eq!(map.put("a/b", 1), None);
        assert_eq!(map.put("a/b", 2), Some(1));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a/b"), Some(&2));
    }

    #[test]
    fn intermediate_nodes_are_not_terminal() {
        let mut map = PathMap::new('/');
        map.put("a/b/c", 1);
        assert_eq!(map.get("a"), None);
        assert_eq!(map.get("a/b"), None);
        assert!(!map.contains_key("a/b"));
    }

    #[test]
    fn trailing_delimiter_is_a_distinct_key() {
        let mut map = PathMap::new('/');
        map.put("/a/b/c", 'x');
        map.put("/a/b/c/", 'y');
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("/a/b/c"), Some(&'x'));
        assert_eq!(map.get("/a/b/c/"), Some(&'y'));

        assert_eq!(map.remove("/a/b/c"), Some('x'));
        assert_eq!(map.get("/a/b/c/"), Some(&'y'));
        let keys: Vec<String> = map.keys().collect();
        assert_eq!(keys, vec!["/a/b/c/".to_string()]);
    }

    #[test]
    fn remove_prunes_childless_ancestors() {
        let mut map = PathMap::new('/');
        map.put("a/b/c", 1);
        map.put("a/x", 2);
        assert_eq!(map.remove("a/b/c"), Some(1));
        assert_eq!(map.get("a/b/c"), None);
        assert_eq!(map.len(), 1);
        // Sibling subtree is untouched.
        assert_eq!(map.get("a/x"), Some(&2));
        let keys: Vec<String> = map.keys().collect();
        assert_eq!(keys, vec!["a/x".to_string()]);
    }

    #[test]
    fn remove_keeps_terminal_prefix() {
        let mut map = PathMap::new('/');
        map.put("a/b", 1);
        map.put("a/b/c", 2);
        assert_eq!(map.remove("a/b/c"), Some(2));
        assert_eq!(map.get("a/b"), Some(&1));

        // And removing a terminal that still has children keeps the subtree.
        map.put("a/b/c", 3);
        assert_eq!(map.remove("a/b"), Some(1));
        assert_eq!(map.get("a/b/c"), Some(&3));
    }

    #[test]
    fn remove_missing_key_is_a_noop() {
        let mut map = PathMap::new('/');
        map.put("a/b", 1);
        assert_eq!(map.remove("a/c"), None);
        assert_eq!(map.remove("nowhere"), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn keys_enumerate_in_insertion_dfs_order() {
        let mut map = PathMap::new('/');
        map.put("b/one", 1);
        map.put("a/two", 2);
        map.put("b/three", 3);
        map.put("b", 4);
        let keys: Vec<String> = map.keys().collect();
        // Pre-order: terminal "b" before its children, subtrees in
        // first-insertion order of their top segment.
        assert_eq!(keys, vec!["b", "b/one", "b/three", "a/two"]);
    }

    #[test]
    fn keys_restart_after_mutation() {
        let mut map = PathMap::new('/');
        map.put("a", 1);
        assert_eq!(map.keys().count(), 1);
        map.put("b", 2);
        assert_eq!(map.keys().count(), 2);
    }

    #[test]
    fn entries_round_trip_through_from_entries() {
        let mut map = PathMap::new('/');
        map.put("src/main/App", 1);
        map.put("src/main/Util", 2);
        map.put("src/test/AppTest", 3);

        let flat: Vec<(String, i32)> = map.entries().map(|(k, v)| (k, *v)).collect();
        let rebuilt = PathMap::from_entries('/', flat);
        assert_eq!(rebuilt.len(), 3);
        for (key, value) in map.entries() {
            assert_eq!(rebuilt.get(&key), Some(value));
        }
    }

    #[test]
    fn interner_deduplicates_repeated_segments() {
        let mut map = PathMap::new('/');
        map.put("src/a/lib", 1);
        map.put("src/b/lib", 2);
        map.put("src/c/lib", 3);
        // "src" and "lib" are stored once each: src, a, lib, b, c.
        assert_eq!(map.interner.len(), 5);
    }

    #[test]
    fn custom_delimiter() {
        let mut map = PathMap::new('.');
        map.put("com.example.Main", 1);
        assert_eq!(map.get("com.example.Main"), Some(&1));
        assert_eq!(map.get("com.example"), None);
    }
}
