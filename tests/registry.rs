use ircd_server::error::TrieError;
use ircd_server::{NickRegistry, PrefixCursor};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;

#[test]
fn test_concurrent_claims_on_one_nickname() {
    for _ in 0..20 {
        let registry = Arc::new(NickRegistry::default());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|id| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    // Spellings differ but all fold to the same key
                    let nick = if id % 2 == 0 { "Racer[x]" } else { "racer{X}" };
                    barrier.wait();
                    registry.add_if_absent(id, nick)
                })
            })
            .collect();

        let results: Vec<Result<(), TrieError>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .all(|r| matches!(r, Ok(()) | Err(TrieError::AlreadyExists))));
        assert_eq!(registry.len(), 1);
    }
}

#[test]
fn test_parallel_churn_leaves_consistent_registry() {
    let registry = Arc::new(NickRegistry::default());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let owner = (b'a' + t as u8) as char;
                for round in 0..200u8 {
                    let nick = format!(
                        "{}{}{}",
                        owner,
                        (b'a' + round / 26) as char,
                        (b'a' + round % 26) as char
                    );
                    registry.add_if_absent(t, &nick).unwrap();
                    assert_eq!(registry.find_and_execute(&nick, |v| *v), Some(t));
                    if round % 3 != 0 {
                        registry.delete_key(&nick).unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Every third round keeps its key: 67 of 200
    let mut per_owner = vec![0usize; THREADS];
    registry.for_each(|key, owner| {
        assert_eq!(key.as_bytes()[0], b'a' + *owner as u8);
        per_owner[*owner] += 1;
    });
    assert!(per_owner.iter().all(|n| *n == 67));
}

#[test]
fn test_prefix_scan_while_others_write() {
    let registry = Arc::new(NickRegistry::default());
    for nick in ["scan", "scanner", "scanning", "scant"] {
        registry.add_if_absent(0usize, nick).unwrap();
    }

    let writer = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for i in 0..500 {
                let nick = format!("scanz{}", ["a", "b", "c"][i % 3]);
                let _ = registry.add_if_absent(1, &nick);
                let _ = registry.delete_key(&nick);
            }
        })
    };

    let mut seen = Vec::new();
    let mut cursor = PrefixCursor::new("scan", 10);
    while let Some((nick, _)) = registry.prefix_search_next(&mut cursor).unwrap() {
        seen.push(nick);
    }
    writer.join().unwrap();

    // Stable entries appear exactly once and in order
    let stable: Vec<&str> = seen
        .iter()
        .map(String::as_str)
        .filter(|n| !n.starts_with("scanz"))
        .collect();
    assert_eq!(stable, vec!["scan", "scanner", "scanning", "scant"]);
    let unique: HashSet<&String> = seen.iter().collect();
    assert_eq!(unique.len(), seen.len());
}
