//! Prefix tree over a pluggable [`Alphabet`].
//!
//! Nodes live in an arena and refer to their children by index, one slot per
//! alphabet position. A word is a path from the root whose last node carries a
//! payload. Deletion prunes dead chains eagerly, so memory stays proportional
//! to the live key set under churn.

mod alphabet;
mod cursor;

pub use alphabet::{Alphabet, CommandAlphabet, NickAlphabet};
pub use cursor::PrefixCursor;

use crate::error::TrieError;

pub(crate) type NodeId = usize;

const ROOT: NodeId = 0;

type FreeFn<T> = Box<dyn Fn(T) + Send + Sync>;

struct Node<T> {
    children: Box<[Option<NodeId>]>,
    child_count: usize,
    payload: Option<T>,
}

impl<T> Node<T> {
    fn is_dead(&self) -> bool {
        self.payload.is_none() && self.child_count == 0
    }
}

pub struct Trie<T, A> {
    nodes: Vec<Node<T>>,
    free: Vec<NodeId>,
    alphabet: A,
    len: usize,
    // Bumped whenever a node is released, so cursors know to re-anchor
    generation: u64,
    free_fn: Option<FreeFn<T>>,
}

impl<T, A: Alphabet> Trie<T, A> {
    pub fn new(alphabet: A) -> Self {
        let size = alphabet.size();
        let root = Node {
            children: vec![None; size].into_boxed_slice(),
            child_count: 0,
            payload: None,
        };
        Self {
            nodes: vec![root],
            free: Vec::new(),
            alphabet,
            len: 0,
            generation: 0,
            free_fn: None,
        }
    }

    /// Register the function [`Trie::destroy`] runs on every payload when
    /// asked to free them
    pub fn with_free_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.free_fn = Some(Box::new(f));
        self
    }

    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    /// Number of words stored
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert `word` with its payload.
    ///
    /// The word is checked against the alphabet before anything is touched, so
    /// an `InvalidWord` result leaves the trie unchanged. An existing word is
    /// never overwritten.
    pub fn add(&mut self, word: &str, payload: T) -> Result<(), TrieError> {
        self.validate(word)?;

        let mut path = Vec::with_capacity(word.len());
        let mut node = ROOT;
        for &c in word.as_bytes() {
            let pos = self.alphabet.char_to_pos(c);
            path.push((node, pos));
            node = match self.nodes[node].children[pos] {
                Some(child) => child,
                None => match self.alloc_node() {
                    Ok(child) => {
                        let parent = &mut self.nodes[node];
                        parent.children[pos] = Some(child);
                        parent.child_count += 1;
                        child
                    }
                    Err(e) => {
                        path.pop();
                        self.prune(&path);
                        return Err(e);
                    }
                },
            };
        }

        let terminal = &mut self.nodes[node];
        if terminal.payload.is_some() {
            return Err(TrieError::AlreadyExists);
        }
        terminal.payload = Some(payload);
        self.len += 1;
        Ok(())
    }

    pub fn find(&self, word: &str) -> Option<&T> {
        self.locate(word)
            .and_then(|id| self.nodes[id].payload.as_ref())
    }

    pub fn find_mut(&mut self, word: &str) -> Option<&mut T> {
        let id = self.locate(word)?;
        self.nodes[id].payload.as_mut()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.find(word).is_some()
    }

    /// Remove `word` and hand its payload back to the caller.
    pub fn delete(&mut self, word: &str) -> Result<T, TrieError> {
        if self.validate(word).is_err() {
            return Err(TrieError::NotFound);
        }

        let mut path = Vec::with_capacity(word.len());
        let mut node = ROOT;
        for &c in word.as_bytes() {
            let pos = self.alphabet.char_to_pos(c);
            path.push((node, pos));
            node = self.nodes[node].children[pos].ok_or(TrieError::NotFound)?;
        }

        let payload = self.nodes[node]
            .payload
            .take()
            .ok_or(TrieError::NotFound)?;
        self.len -= 1;
        self.prune(&path);
        Ok(payload)
    }

    /// Tear the trie down.
    ///
    /// With `free_data` set, every payload goes through the registered free
    /// function (or is dropped if none was registered) and nothing is
    /// returned. Otherwise the payloads are handed back untouched.
    pub fn destroy(self, free_data: bool) -> Vec<T> {
        let Trie { nodes, free_fn, .. } = self;
        let mut kept = Vec::new();
        for payload in nodes.into_iter().filter_map(|n| n.payload) {
            if !free_data {
                kept.push(payload);
            } else if let Some(f) = &free_fn {
                f(payload);
            }
        }
        kept
    }

    /// Visit every word depth-first, in ascending alphabet position at each
    /// level. Keys are rendered with the alphabet's canonical characters.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &T),
    {
        let mut key = String::new();
        self.walk(ROOT, &mut key, &mut f);
    }

    /// Yield the next word matching the cursor's prefix.
    ///
    /// The first call walks the prefix and fails with `InvalidWord` if it
    /// contains characters outside the alphabet. `Ok(None)` means the search
    /// is exhausted; further calls keep returning it.
    pub fn prefix_search_next<'c>(
        &self,
        cursor: &'c mut PrefixCursor,
    ) -> Result<Option<(&'c str, &T)>, TrieError> {
        if cursor.is_exhausted() {
            return Ok(None);
        }

        if !cursor.is_started() {
            let start = match self.start_search(cursor)? {
                Some(id) => id,
                None => {
                    cursor.finish();
                    return Ok(None);
                }
            };
            let canonical: String = cursor
                .prefix()
                .bytes()
                .map(|c| char::from(self.alphabet.canonical(c)))
                .collect();
            cursor.begin(start, self.generation, &canonical);
            if cursor.prefix_len() < cursor.max_depth() {
                if let Some(payload) = &self.nodes[start].payload {
                    return Ok(Some((cursor.path(), payload)));
                }
            }
        } else if cursor.generation() != self.generation {
            self.reanchor(cursor);
        }

        let size = self.alphabet.size();
        loop {
            let Some(top) = cursor.stack.last_mut() else {
                cursor.finish();
                return Ok(None);
            };

            let depth = top.depth;
            let node = &self.nodes[top.node];
            let next = if depth + 1 < cursor.max_depth {
                (top.next_pos..size).find_map(|pos| node.children[pos].map(|c| (pos, c)))
            } else {
                None
            };

            match next {
                Some((pos, child)) => {
                    top.next_pos = pos + 1;
                    cursor.descend(child, depth, self.alphabet.pos_to_char(pos));
                    if let Some(payload) = &self.nodes[child].payload {
                        return Ok(Some((cursor.path(), payload)));
                    }
                }
                None => {
                    cursor.stack.pop();
                }
            }
        }
    }

    fn start_search(&self, cursor: &PrefixCursor) -> Result<Option<NodeId>, TrieError> {
        let prefix = cursor.prefix().as_bytes();
        if !prefix.iter().all(|&c| self.is_valid(c)) {
            return Err(TrieError::InvalidWord);
        }
        let mut node = ROOT;
        for &c in prefix {
            match self.nodes[node].children[self.alphabet.char_to_pos(c)] {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    // Nodes were released since the cursor last ran: recompute every frame's
    // node from its path, dropping frames whose node no longer exists.
    fn reanchor(&self, cursor: &mut PrefixCursor) {
        let path = cursor.path.as_bytes();
        let mut node = Some(ROOT);
        let mut walked = 0;
        let mut keep = cursor.stack.len();

        for (i, frame) in cursor.stack.iter_mut().enumerate() {
            while walked < frame.depth {
                let pos = self.alphabet.char_to_pos(path[walked]);
                node = node.and_then(|id| self.nodes[id].children[pos]);
                walked += 1;
            }
            match node {
                Some(id) => frame.node = id,
                None => {
                    keep = i;
                    break;
                }
            }
        }

        cursor.stack.truncate(keep);
        cursor.set_generation(self.generation);
    }

    fn walk<F>(&self, id: NodeId, key: &mut String, f: &mut F)
    where
        F: FnMut(&str, &T),
    {
        let node = &self.nodes[id];
        if let Some(payload) = &node.payload {
            f(key, payload);
        }
        for (pos, child) in node.children.iter().enumerate() {
            if let Some(child) = child {
                key.push(char::from(self.alphabet.pos_to_char(pos)));
                self.walk(*child, key, f);
                key.pop();
            }
        }
    }

    fn is_valid(&self, c: u8) -> bool {
        c.is_ascii() && self.alphabet.is_valid(c)
    }

    fn validate(&self, word: &str) -> Result<(), TrieError> {
        if word.is_empty() || !word.bytes().all(|c| self.is_valid(c)) {
            return Err(TrieError::InvalidWord);
        }
        Ok(())
    }

    fn locate(&self, word: &str) -> Option<NodeId> {
        self.validate(word).ok()?;
        word.bytes().try_fold(ROOT, |node, c| {
            self.nodes[node].children[self.alphabet.char_to_pos(c)]
        })
    }

    fn alloc_node(&mut self) -> Result<NodeId, TrieError> {
        if let Some(id) = self.free.pop() {
            return Ok(id);
        }

        let size = self.alphabet.size();
        let mut children = Vec::new();
        children
            .try_reserve_exact(size)
            .map_err(|_| TrieError::NoMem)?;
        children.resize(size, None);
        self.nodes.try_reserve(1).map_err(|_| TrieError::NoMem)?;

        self.nodes.push(Node {
            children: children.into_boxed_slice(),
            child_count: 0,
            payload: None,
        });
        Ok(self.nodes.len() - 1)
    }

    // Walk `path` (parent, slot) bottom-up releasing childless, wordless nodes
    fn prune(&mut self, path: &[(NodeId, usize)]) {
        for &(parent, pos) in path.iter().rev() {
            let Some(child) = self.nodes[parent].children[pos] else {
                break;
            };
            if !self.nodes[child].is_dead() {
                break;
            }
            let parent_node = &mut self.nodes[parent];
            parent_node.children[pos] = None;
            parent_node.child_count -= 1;
            self.free.push(child);
            self.generation += 1;
        }
    }
}
