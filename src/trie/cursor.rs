use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Fresh,
    Active,
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Frame {
    pub(super) node: NodeId,
    pub(super) depth: usize,
    pub(super) next_pos: usize,
}

/// Resumable state of a prefix search.
///
/// The cursor is owned by the caller and does not borrow the trie, so the trie
/// may change between calls to
/// [`Trie::prefix_search_next`](super::Trie::prefix_search_next). Only
/// words shorter than `max_depth` characters (prefix included) are reported.
/// Dropping the cursor releases its traversal state.
#[derive(Debug, Clone)]
pub struct PrefixCursor {
    prefix: String,
    pub(super) max_depth: usize,
    pub(super) path: String,
    pub(super) stack: Vec<Frame>,
    generation: u64,
    state: CursorState,
}

impl PrefixCursor {
    pub fn new(prefix: &str, max_depth: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            max_depth,
            path: String::with_capacity(max_depth),
            stack: Vec::with_capacity(max_depth),
            generation: 0,
            state: CursorState::Fresh,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// True once the search has reported every match
    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    /// Drop the traversal state early. The cursor reports no more results.
    pub fn release(&mut self) {
        self.stack = Vec::new();
        self.path = String::new();
        self.state = CursorState::Exhausted;
    }

    pub(super) fn is_started(&self) -> bool {
        self.state != CursorState::Fresh
    }

    pub(super) fn prefix_len(&self) -> usize {
        self.prefix.len()
    }

    pub(super) fn path(&self) -> &str {
        &self.path
    }

    pub(super) fn generation(&self) -> u64 {
        self.generation
    }

    pub(super) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    // `path` starts as the prefix in the alphabet's canonical spelling
    pub(super) fn begin(&mut self, node: NodeId, generation: u64, canonical_prefix: &str) {
        self.path.clear();
        self.path.push_str(canonical_prefix);
        self.stack.clear();
        self.stack.push(Frame {
            node,
            depth: self.prefix.len(),
            next_pos: 0,
        });
        self.generation = generation;
        self.state = CursorState::Active;
    }

    pub(super) fn descend(&mut self, node: NodeId, parent_depth: usize, c: u8) {
        self.path.truncate(parent_depth);
        self.path.push(char::from(c));
        self.stack.push(Frame {
            node,
            depth: parent_depth + 1,
            next_pos: 0,
        });
    }

    pub(super) fn finish(&mut self) {
        self.stack.clear();
        self.state = CursorState::Exhausted;
    }
}
