//! Thread-safe name registry: one trie behind one lock.
//!
//! Every operation, including the user callback in
//! [`Registry::find_and_execute`], runs inside the same critical section, so
//! lookup-then-act sequences are atomic with respect to every other connection
//! thread. Operations are O(key length) to keep the lock hold time short.

use crate::error::TrieError;
use crate::trie::{Alphabet, NickAlphabet, PrefixCursor, Trie};
use parking_lot::Mutex;
use std::cell::Cell;
use tracing::debug;

thread_local! {
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Payloads that know the key they are registered under.
pub trait Keyed {
    fn registry_key(&self) -> Option<String>;
}

pub type NickRegistry<T> = Registry<T, NickAlphabet>;

pub struct Registry<T, A> {
    trie: Mutex<Trie<T, A>>,
}

// Clears the re-entry flag even if the callback panics
struct CallbackGuard;

impl CallbackGuard {
    fn enter() -> Self {
        IN_CALLBACK.with(|flag| flag.set(true));
        CallbackGuard
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        IN_CALLBACK.with(|flag| flag.set(false));
    }
}

impl<T, A: Alphabet> Registry<T, A> {
    /// Build the registry. Must happen before any thread can reach it.
    pub fn new(alphabet: A) -> Self {
        Self {
            trie: Mutex::new(Trie::new(alphabet)),
        }
    }

    /// Tear the registry down once every thread using it is gone.
    ///
    /// See [`Trie::destroy`] for what `free_data` does with the payloads.
    pub fn destroy(self, free_data: bool) -> Vec<T> {
        self.trie.into_inner().destroy(free_data)
    }

    /// Insert `payload` under `key` unless the key is taken
    pub fn add_if_absent(&self, payload: T, key: &str) -> Result<(), TrieError> {
        let mut trie = self.lock();
        trie.add(key, payload)
    }

    /// Remove whatever is registered under `key`
    pub fn delete_key(&self, key: &str) -> Result<T, TrieError> {
        self.lock().delete(key)
    }

    /// Look `key` up and run `f` on the payload while the lock is still held.
    ///
    /// The payload is only borrowed, so the entry under `key` cannot be
    /// swapped out from here. Returns `None` without calling `f` when the key
    /// is absent. `f` blocks
    /// every other registry operation, so it must be quick, and it must not
    /// call back into the registry: re-entry panics instead of deadlocking.
    pub fn find_and_execute<R, F>(&self, key: &str, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        let trie = self.lock();
        let payload = trie.find(key)?;
        let _guard = CallbackGuard::enter();
        Some(f(payload))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    /// Visit every entry in alphabet order while holding the lock
    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&str, &T),
    {
        self.lock().for_each(f)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> parking_lot::MutexGuard<'_, Trie<T, A>> {
        let reentered = IN_CALLBACK.with(|flag| flag.get());
        assert!(
            !reentered,
            "registry re-entered from inside a find_and_execute callback"
        );
        self.trie.lock()
    }
}

impl<T: Clone, A: Alphabet> Registry<T, A> {
    /// Yield the next entry under the cursor's prefix.
    ///
    /// The lock is taken per call, so entries added or removed between calls
    /// may or may not show up, but no entry is reported twice.
    pub fn prefix_search_next(
        &self,
        cursor: &mut PrefixCursor,
    ) -> Result<Option<(String, T)>, TrieError> {
        let trie = self.lock();
        let next = trie
            .prefix_search_next(cursor)?
            .map(|(word, payload)| (word.to_string(), payload.clone()));
        Ok(next)
    }
}

impl<T: Keyed, A: Alphabet> Registry<T, A> {
    /// Remove the entry registered under `payload`'s current key.
    /// Absent keys are ignored.
    pub fn delete(&self, payload: &T) -> Option<T> {
        let key = payload.registry_key()?;
        match self.delete_key(&key) {
            Ok(removed) => Some(removed),
            Err(e) => {
                debug!("Registry delete of '{}' skipped: {}", key, e);
                None
            }
        }
    }
}

impl<T> Default for Registry<T, NickAlphabet> {
    fn default() -> Self {
        Self::new(NickAlphabet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct User {
        nick: String,
        id: u32,
    }

    impl Keyed for User {
        fn registry_key(&self) -> Option<String> {
            Some(self.nick.clone())
        }
    }

    fn user(nick: &str, id: u32) -> User {
        User {
            nick: nick.to_string(),
            id,
        }
    }

    #[test]
    fn test_add_then_find_until_deleted() {
        let registry = NickRegistry::default();
        registry.add_if_absent(user("alice", 1), "alice").unwrap();

        assert_eq!(registry.find_and_execute("ALICE", |u| u.id), Some(1));
        assert_eq!(registry.delete(&user("alice", 1)), Some(user("alice", 1)));
        assert_eq!(registry.find_and_execute("alice", |u| u.id), None);
    }

    #[test]
    fn test_folded_keys_collide() {
        let registry = NickRegistry::default();
        registry.add_if_absent(user("Nick[a]", 1), "Nick[a]").unwrap();

        assert!(registry.contains("nick{a}"));
        assert_eq!(
            registry.add_if_absent(user("NICK{A}", 2), "NICK{A}"),
            Err(TrieError::AlreadyExists)
        );
        assert_eq!(registry.find_and_execute("nick{A}", |u| u.id), Some(1));
    }

    #[test]
    fn test_delete_absent() {
        let registry: NickRegistry<User> = NickRegistry::default();
        assert_eq!(registry.delete(&user("ghost", 1)), None);
        assert_eq!(registry.delete_key("ghost"), Err(TrieError::NotFound));
        assert_eq!(registry.delete_key("ghost"), Err(TrieError::NotFound));
    }

    #[test]
    fn test_callback_not_invoked_when_absent() {
        let registry: NickRegistry<User> = NickRegistry::default();
        let mut called = false;
        let result = registry.find_and_execute("nobody", |_| called = true);
        assert!(result.is_none());
        assert!(!called);
    }

    #[test]
    fn test_callback_sees_interior_state() {
        let registry = NickRegistry::default();
        registry
            .add_if_absent(std::cell::Cell::new(1u32), "bob")
            .unwrap();
        registry.find_and_execute("bob", |hits| hits.set(hits.get() + 1));
        assert_eq!(registry.find_and_execute("BOB", |hits| hits.get()), Some(2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[should_panic(expected = "re-entered")]
    fn test_reentry_from_callback_panics() {
        let registry = Arc::new(NickRegistry::default());
        registry.add_if_absent(user("carol", 1), "carol").unwrap();
        let inner = Arc::clone(&registry);
        registry.find_and_execute("carol", move |_| inner.len());
    }

    #[test]
    fn test_registry_usable_after_callback_panic() {
        let registry = Arc::new(NickRegistry::default());
        registry.add_if_absent(user("dave", 1), "dave").unwrap();

        let shared = Arc::clone(&registry);
        let outcome = std::thread::spawn(move || {
            shared.find_and_execute("dave", |_| panic!("boom"));
        })
        .join();
        assert!(outcome.is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_prefix_search_through_registry() {
        let registry = NickRegistry::default();
        for (i, nick) in ["sam", "sara", "sarah", "tom"].iter().enumerate() {
            registry.add_if_absent(user(nick, i as u32), nick).unwrap();
        }

        let mut cursor = PrefixCursor::new("sa", 10);
        let mut found = Vec::new();
        while let Some((nick, u)) = registry.prefix_search_next(&mut cursor).unwrap() {
            found.push((nick, u.id));
        }
        assert_eq!(
            found,
            vec![
                ("sam".to_string(), 0),
                ("sara".to_string(), 1),
                ("sarah".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_destroy_hands_back_payloads() {
        let registry = NickRegistry::default();
        registry.add_if_absent(user("erin", 1), "erin").unwrap();
        registry.add_if_absent(user("finn", 2), "finn").unwrap();

        let mut seen = Vec::new();
        registry.for_each(|key, u| seen.push((key.to_string(), u.id)));
        assert_eq!(seen, vec![("erin".to_string(), 1), ("finn".to_string(), 2)]);

        assert_eq!(registry.destroy(false).len(), 2);
    }
}
