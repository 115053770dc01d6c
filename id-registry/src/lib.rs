//! Stable allocation of compact u32 ids for opaque string keys.
//!
//! Policy URIs are mapped to small integers used as on-wire tags (register
//! values, tunnel ids). Allocations are grouped into independent
//! namespaces, survive restarts through a per-namespace persistence file,
//! and are recycled only after a grace period so transient churn cannot
//! reassign a live tag.
//!
//! ## Persistence file (`<dir>/<namespace>.id`)
//!
//! ```text
//!  0: "opflexid"            8-byte literal
//!  8: u32 version = 1       native endian
//! 12: repeat { u32 id; u16 len; u8 bytes[len]; } until EOF
//! ```
//!
//! The whole file is rewritten on every change. A torn write is caught by
//! the header check on the next load and the namespace starts empty;
//! startup reconciliation reissues ids.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

/// Smallest id handed out by default.
pub const DEFAULT_MIN_ID: u32 = 1;
/// Largest id handed out by default; tags must fit in 31 bits on the wire.
pub const DEFAULT_MAX_ID: u32 = 1 << 31;

const FILE_MAGIC: &[u8; 8] = b"opflexid";
const FILE_VERSION: u32 = 1;
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Veto hook consulted before an id assignment is committed.
pub type AllocHook = Box<dyn Fn(&str, u32) -> bool + Send>;

/// An inclusive range of free ids. Free ranges are kept disjoint and
/// non-adjacent, ordered by start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct IdRange {
    start: u32,
    end: u32,
}

#[derive(Default)]
struct IdMap {
    ids: HashMap<String, u32>,
    reverse: HashMap<u32, String>,
    free: BTreeSet<IdRange>,
    /// Keys pending reclamation, with the time they were erased.
    erased: HashMap<String, Instant>,
    hook: Option<AllocHook>,
}

/// Return `id` to the free set, merging with adjacent ranges.
fn free_id(free: &mut BTreeSet<IdRange>, id: u32) {
    let prev = free
        .range(
            ..=IdRange {
                start: id,
                end: u32::MAX,
            },
        )
        .next_back()
        .copied();
    let next = free
        .range(
            IdRange {
                start: id.saturating_add(1),
                end: 0,
            }..,
        )
        .next()
        .copied();

    let joins_prev = prev.is_some_and(|p| p.end.checked_add(1) == Some(id));
    let joins_next = next.is_some_and(|n| id.checked_add(1) == Some(n.start));

    match (joins_prev, joins_next) {
        (true, true) => {
            if let (Some(p), Some(n)) = (prev, next) {
                free.remove(&p);
                free.remove(&n);
                free.insert(IdRange {
                    start: p.start,
                    end: n.end,
                });
            }
        }
        (true, false) => {
            if let Some(p) = prev {
                free.remove(&p);
                free.insert(IdRange {
                    start: p.start,
                    end: id,
                });
            }
        }
        (false, true) => {
            if let Some(n) = next {
                free.remove(&n);
                free.insert(IdRange {
                    start: id,
                    end: n.end,
                });
            }
        }
        (false, false) => {
            free.insert(IdRange { start: id, end: id });
        }
    }
}

/// Namespaced allocator of stable u32 ids for string keys.
///
/// All state sits behind one mutex; persistence writes happen inline on the
/// calling thread while the mutex is held, which callers accept.
pub struct IdGenerator {
    namespaces: Mutex<HashMap<String, IdMap>>,
    persist_dir: Option<PathBuf>,
    cleanup_interval: Duration,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::with_cleanup_interval(DEFAULT_CLEANUP_INTERVAL)
    }

    /// A generator whose erased keys are reclaimed after `interval`.
    pub fn with_cleanup_interval(interval: Duration) -> Self {
        Self {
            namespaces: Mutex::new(HashMap::new()),
            persist_dir: None,
            cleanup_interval: interval,
        }
    }

    /// Set the directory persistence files are written to. Must be called
    /// before namespaces are initialized.
    pub fn set_persist_location(&mut self, dir: impl Into<PathBuf>) {
        self.persist_dir = Some(dir.into());
    }

    /// Path of the persistence file backing `namespace`, when persistence
    /// is configured.
    pub fn namespace_file(&self, namespace: &str) -> Option<PathBuf> {
        self.persist_dir
            .as_ref()
            .map(|dir| dir.join(format!("{namespace}.id")))
    }

    /// Create (or reset) a namespace covering `[min, max]` and reload any
    /// persisted assignments for it.
    pub fn init_namespace_bounded(&self, namespace: &str, min: u32, max: u32) {
        let Ok(mut namespaces) = self.namespaces.lock() else {
            return;
        };
        let idmap = namespaces.entry(namespace.to_string()).or_default();
        idmap.ids.clear();
        idmap.reverse.clear();
        idmap.erased.clear();
        idmap.free.clear();
        idmap.free.insert(IdRange {
            start: min,
            end: max,
        });

        let Some(path) = self.namespace_file(namespace) else {
            return;
        };
        debug!(namespace, path = %path.display(), "loading ids");
        let Ok(mut file) = File::open(&path) else {
            debug!(path = %path.display(), "no id file to load");
            return;
        };

        let mut magic = [0u8; 8];
        let mut version = [0u8; 4];
        if file.read_exact(&mut magic).is_err() || file.read_exact(&mut version).is_err() {
            error!(path = %path.display(), "id file exists but could not be read");
            return;
        }
        if &magic != FILE_MAGIC {
            error!(path = %path.display(), "not an id file");
            return;
        }
        let version = u32::from_ne_bytes(version);
        if version != FILE_VERSION {
            error!(path = %path.display(), version, "unsupported id file format version");
            return;
        }

        let mut used: BTreeSet<u32> = BTreeSet::new();
        loop {
            let mut id_buf = [0u8; 4];
            let mut len_buf = [0u8; 2];
            if file.read_exact(&mut id_buf).is_err() || file.read_exact(&mut len_buf).is_err() {
                break;
            }
            let id = u32::from_ne_bytes(id_buf);
            let len = u16::from_ne_bytes(len_buf) as usize;
            let mut key = vec![0u8; len];
            if file.read_exact(&mut key).is_err() {
                debug!("unexpected EOF while reading key");
                break;
            }
            let key = String::from_utf8_lossy(&key).into_owned();
            if used.contains(&id) {
                warn!(id, "id file corrupt: id seen more than once");
            } else if id > max {
                warn!(id, max, "id file corrupt: id above maximum");
            } else if id < min {
                warn!(id, min, "id file corrupt: id below minimum");
            } else {
                used.insert(id);
                idmap.ids.insert(key.clone(), id);
                idmap.reverse.insert(id, key);
            }
        }

        // Rebuild the free set as the ascending complement of the retained
        // ids within [min, max]. The cursor is u64 so it can pass a max of
        // u32::MAX without wrapping.
        idmap.free.clear();
        let mut cursor = u64::from(min);
        for id in used {
            if u64::from(id) > cursor {
                idmap.free.insert(IdRange {
                    start: cursor as u32,
                    end: id - 1,
                });
            }
            cursor = u64::from(id) + 1;
        }
        if cursor <= u64::from(max) {
            idmap.free.insert(IdRange {
                start: cursor as u32,
                end: max,
            });
        }

        debug!(
            namespace,
            entries = idmap.ids.len(),
            free_ranges = idmap.free.len(),
            "loaded ids"
        );
    }

    /// Create (or reset) a namespace with the default bounds.
    pub fn init_namespace(&self, namespace: &str) {
        self.init_namespace_bounded(namespace, DEFAULT_MIN_ID, DEFAULT_MAX_ID);
    }

    /// Install a veto hook consulted before new assignments in `namespace`.
    pub fn set_alloc_hook(&self, namespace: &str, hook: AllocHook) {
        let Ok(mut namespaces) = self.namespaces.lock() else {
            return;
        };
        match namespaces.get_mut(namespace) {
            Some(idmap) => idmap.hook = Some(hook),
            None => error!(namespace, "cannot set hook for uninitialized namespace"),
        }
    }

    /// Get the id for `key`, allocating the smallest free id if the key is
    /// new. Returns `None` for unknown namespaces, exhausted namespaces and
    /// hook vetoes.
    pub fn get_id(&self, namespace: &str, key: &str) -> Option<u32> {
        let Ok(mut namespaces) = self.namespaces.lock() else {
            return None;
        };
        let Some(idmap) = namespaces.get_mut(namespace) else {
            error!(namespace, "id requested for unknown namespace");
            return None;
        };

        // A pending erase is revived by renewed interest.
        idmap.erased.remove(key);

        if let Some(&id) = idmap.ids.get(key) {
            return Some(id);
        }

        let Some(&range) = idmap.free.iter().next() else {
            error!(namespace, "no free ids");
            return None;
        };
        let id = range.start;
        if let Some(hook) = &idmap.hook {
            if !hook(key, id) {
                error!(namespace, key, id, "id allocation canceled by hook");
                return None;
            }
        }
        idmap.free.remove(&range);
        if range.start < range.end {
            idmap.free.insert(IdRange {
                start: range.start + 1,
                end: range.end,
            });
        }
        idmap.ids.insert(key.to_string(), id);
        idmap.reverse.insert(id, key.to_string());
        debug!(namespace, id, key, "assigned id");
        self.persist(namespace, idmap);
        Some(id)
    }

    /// Reverse lookup of the key currently holding `id`.
    pub fn get_string_for_id(&self, namespace: &str, id: u32) -> Option<String> {
        let Ok(namespaces) = self.namespaces.lock() else {
            return None;
        };
        let Some(idmap) = namespaces.get(namespace) else {
            error!(namespace, "id requested for unknown namespace");
            return None;
        };
        idmap.reverse.get(&id).cloned()
    }

    /// Mark `key` for reclamation. The id stays live until [`cleanup`]
    /// runs after the grace interval; a `get_id` in between revives it.
    ///
    /// [`cleanup`]: IdGenerator::cleanup
    pub fn erase(&self, namespace: &str, key: &str) {
        let Ok(mut namespaces) = self.namespaces.lock() else {
            return;
        };
        let Some(idmap) = namespaces.get_mut(namespace) else {
            return;
        };
        idmap
            .erased
            .entry(key.to_string())
            .or_insert_with(Instant::now);
    }

    /// Reclaim every pending erase older than the grace interval, merging
    /// freed ids back into the free-range set.
    pub fn cleanup(&self) {
        let Ok(mut namespaces) = self.namespaces.lock() else {
            return;
        };
        let now = Instant::now();
        for (namespace, idmap) in namespaces.iter_mut() {
            let expired: Vec<String> = idmap
                .erased
                .iter()
                .filter(|(_, at)| now.duration_since(**at) > self.cleanup_interval)
                .map(|(key, _)| key.clone())
                .collect();
            let mut changed = false;
            for key in expired {
                idmap.erased.remove(&key);
                if let Some(id) = idmap.ids.remove(&key) {
                    free_id(&mut idmap.free, id);
                    idmap.reverse.remove(&id);
                    changed = true;
                    debug!(namespace = namespace.as_str(), key = key.as_str(), id, "cleaned up id");
                }
            }
            if changed {
                self.persist(namespace, idmap);
            }
        }
    }

    /// Mark every live key the predicate rejects for reclamation; the
    /// subsequent [`cleanup`](IdGenerator::cleanup) actually reclaims them.
    pub fn collect_garbage(&self, namespace: &str, is_alive: impl Fn(&str, &str) -> bool) {
        let Ok(mut namespaces) = self.namespaces.lock() else {
            return;
        };
        let Some(idmap) = namespaces.get_mut(namespace) else {
            return;
        };
        let garbage: Vec<String> = idmap
            .ids
            .keys()
            .filter(|key| !is_alive(namespace, key))
            .cloned()
            .collect();
        for key in garbage {
            if !idmap.erased.contains_key(&key) {
                debug!(namespace, key = key.as_str(), "found garbage");
                idmap.erased.insert(key, Instant::now());
            }
        }
    }

    /// Total number of unassigned ids in `namespace`.
    pub fn remaining_ids(&self, namespace: &str) -> u32 {
        let Ok(namespaces) = self.namespaces.lock() else {
            return 0;
        };
        namespaces.get(namespace).map_or(0, |idmap| {
            idmap
                .free
                .iter()
                .map(|r| r.end - r.start + 1)
                .fold(0u32, u32::saturating_add)
        })
    }

    /// Number of disjoint free ranges in `namespace`.
    pub fn free_range_count(&self, namespace: &str) -> usize {
        let Ok(namespaces) = self.namespaces.lock() else {
            return 0;
        };
        namespaces.get(namespace).map_or(0, |idmap| idmap.free.len())
    }

    fn persist(&self, namespace: &str, idmap: &IdMap) {
        let Some(path) = self.namespace_file(namespace) else {
            return;
        };
        let file = match File::create(&path) {
            Ok(file) => file,
            Err(err) => {
                error!(path = %path.display(), %err, "unable to open id file for writing");
                return;
            }
        };
        let mut writer = BufWriter::new(file);
        if let Err(err) = write_id_file(&mut writer, idmap) {
            error!(path = %path.display(), %err, "failed to write id file");
            return;
        }
        if let Err(err) = writer.flush() {
            error!(path = %path.display(), %err, "failed to flush id file");
            return;
        }
        debug!(path = %path.display(), entries = idmap.ids.len(), "wrote id file");
    }
}

fn write_id_file(writer: &mut impl Write, idmap: &IdMap) -> std::io::Result<()> {
    writer.write_all(FILE_MAGIC)?;
    writer.write_all(&FILE_VERSION.to_ne_bytes())?;
    for (key, id) in &idmap.ids {
        let Ok(len) = u16::try_from(key.len()) else {
            error!(id, "id key length exceeds maximum, skipping");
            continue;
        };
        writer.write_all(&id.to_ne_bytes())?;
        writer.write_all(&len.to_ne_bytes())?;
        writer.write_all(key.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::thread::sleep;

    const GRACE: Duration = Duration::from_millis(15);
    const PAST_GRACE: Duration = Duration::from_millis(20);

    fn gen_with_dir(dir: &Path) -> IdGenerator {
        let mut generator = IdGenerator::with_cleanup_interval(GRACE);
        generator.set_persist_location(dir);
        generator
    }

    #[test]
    fn get_erase_revive() {
        let dir = tempfile::tempdir().unwrap();
        let ns = "idtest";

        let (u1_id, u2_id) = {
            let generator = gen_with_dir(dir.path());
            generator.init_namespace(ns);
            let u1_id = generator.get_id(ns, "/uri/one").unwrap();
            let u2_id = generator.get_id(ns, "/uri/two").unwrap();
            assert_ne!(u1_id, 0);
            assert_ne!(u2_id, 0);
            assert_eq!(u1_id, generator.get_id(ns, "/uri/one").unwrap());
            assert_eq!(
                generator.get_string_for_id(ns, u1_id).unwrap(),
                "/uri/one"
            );
            (u1_id, u2_id)
        };

        let generator = gen_with_dir(dir.path());
        generator.init_namespace(ns);
        assert_eq!(u1_id, generator.get_id(ns, "/uri/one").unwrap());
        assert_eq!(u2_id, generator.get_id(ns, "/uri/two").unwrap());

        // erase but resurrect before cleanup
        generator.erase(ns, "/uri/one");
        assert_eq!(u1_id, generator.get_id(ns, "/uri/one").unwrap());
        sleep(PAST_GRACE);
        generator.cleanup();
        assert_eq!(u1_id, generator.get_id(ns, "/uri/one").unwrap());

        // erase and allow to die
        generator.erase(ns, "/uri/one");
        sleep(PAST_GRACE);
        generator.cleanup();
        assert!(generator.get_string_for_id(ns, u1_id).is_none());
        assert!(generator.get_id(ns, "/uri/one").is_some());
    }

    #[test]
    fn unknown_namespace_yields_no_id() {
        let generator = IdGenerator::new();
        assert!(generator.get_id("nope", "/uri/one").is_none());
        assert!(generator.get_string_for_id("nope", 1).is_none());
    }

    #[test]
    fn garbage_collection() {
        let generator = IdGenerator::with_cleanup_interval(GRACE);
        let ns = "idtest";
        generator.init_namespace_bounded(ns, 1, 15);
        assert_eq!(generator.get_id(ns, "/uri/one"), Some(1));
        assert_eq!(generator.get_id(ns, "/uri/two"), Some(2));

        generator.collect_garbage(ns, |_, _| true);
        sleep(PAST_GRACE);
        generator.cleanup();
        assert_eq!(generator.get_id(ns, "/uri/one"), Some(1));
        assert_eq!(generator.get_id(ns, "/uri/two"), Some(2));
        assert_eq!(generator.remaining_ids(ns), 13);

        generator.collect_garbage(ns, |_, _| false);
        sleep(PAST_GRACE);
        generator.cleanup();
        assert_eq!(generator.remaining_ids(ns), 15);
        assert_eq!(generator.get_id(ns, "/uri/two"), Some(1));
        assert_eq!(generator.get_id(ns, "/uri/one"), Some(2));
    }

    #[test]
    fn free_range_merging() {
        let generator = IdGenerator::with_cleanup_interval(GRACE);
        let ns = "idtest";
        generator.init_namespace_bounded(ns, 1, 20);

        let uris: Vec<String> = (1..=20).map(|i| format!("/uri/{i}")).collect();

        assert_eq!(generator.remaining_ids(ns), 20);
        for (i, uri) in uris.iter().enumerate() {
            assert_eq!(generator.free_range_count(ns), 1);
            assert_eq!(generator.get_id(ns, uri), Some(i as u32 + 1));
        }
        assert_eq!(generator.remaining_ids(ns), 0);
        assert_eq!(generator.free_range_count(ns), 0);

        let erase_and_clean = |keys: &[usize]| {
            for &k in keys {
                generator.erase(ns, &uris[k]);
            }
            sleep(PAST_GRACE);
            generator.cleanup();
        };

        // add free to empty range
        erase_and_clean(&[10]);
        assert_eq!(generator.remaining_ids(ns), 1);
        assert_eq!(generator.free_range_count(ns), 1);

        // add isolated at start and end
        erase_and_clean(&[6, 14]);
        assert_eq!(generator.remaining_ids(ns), 3);
        assert_eq!(generator.free_range_count(ns), 3);

        // merge to range above and below
        erase_and_clean(&[7, 13]);
        assert_eq!(generator.remaining_ids(ns), 5);
        assert_eq!(generator.free_range_count(ns), 3);

        // merge to center range
        erase_and_clean(&[9, 11]);
        assert_eq!(generator.remaining_ids(ns), 7);
        assert_eq!(generator.free_range_count(ns), 3);

        // merge all ranges into one
        erase_and_clean(&[8, 12]);
        assert_eq!(generator.remaining_ids(ns), 9);
        assert_eq!(generator.free_range_count(ns), 1);

        // add to beginning and end
        erase_and_clean(&[0, 19]);
        assert_eq!(generator.remaining_ids(ns), 11);
        assert_eq!(generator.free_range_count(ns), 3);

        // add isolated between ranges
        erase_and_clean(&[3, 17]);
        assert_eq!(generator.remaining_ids(ns), 13);
        assert_eq!(generator.free_range_count(ns), 5);
    }

    #[test]
    fn persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ns = "idtest";
        let uris: Vec<String> = (1..=20).map(|i| format!("/uri/{i}")).collect();

        {
            let generator = gen_with_dir(dir.path());
            generator.init_namespace_bounded(ns, 1, 20);
            for (i, uri) in uris.iter().enumerate() {
                assert_eq!(generator.get_id(ns, uri), Some(i as u32 + 1));
            }
            assert_eq!(generator.remaining_ids(ns), 0);
        }

        {
            let generator = gen_with_dir(dir.path());
            generator.init_namespace_bounded(ns, 1, 20);
            assert_eq!(generator.remaining_ids(ns), 0);
            assert_eq!(generator.free_range_count(ns), 0);
            for (i, uri) in uris.iter().enumerate() {
                assert_eq!(
                    generator.get_string_for_id(ns, i as u32 + 1).unwrap(),
                    *uri
                );
                assert_eq!(generator.get_id(ns, uri), Some(i as u32 + 1));
            }
            generator.erase(ns, &uris[10]);
            sleep(PAST_GRACE);
            generator.cleanup();
        }

        {
            let generator = gen_with_dir(dir.path());
            generator.init_namespace_bounded(ns, 1, 20);
            assert_eq!(generator.remaining_ids(ns), 1);
            assert_eq!(generator.free_range_count(ns), 1);
            generator.erase(ns, &uris[5]);
            generator.erase(ns, &uris[15]);
            sleep(PAST_GRACE);
            generator.cleanup();
        }

        {
            let generator = gen_with_dir(dir.path());
            generator.init_namespace_bounded(ns, 1, 20);
            assert_eq!(generator.remaining_ids(ns), 3);
            assert_eq!(generator.free_range_count(ns), 3);
        }
    }

    #[test]
    fn reload_frees_the_top_id() {
        let dir = tempfile::tempdir().unwrap();
        let ns = "top";
        {
            let generator = gen_with_dir(dir.path());
            generator.init_namespace_bounded(ns, 1, 5);
            for key in ["/a", "/b", "/c", "/d"] {
                generator.get_id(ns, key);
            }
        }
        // only the top id is unassigned; the complement must include it
        let generator = gen_with_dir(dir.path());
        generator.init_namespace_bounded(ns, 1, 5);
        assert_eq!(generator.remaining_ids(ns), 1);
        assert_eq!(generator.free_range_count(ns), 1);
        assert_eq!(generator.get_id(ns, "/e"), Some(5));
    }

    #[test]
    fn load_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.id");
        std::fs::write(&path, b"notanidf\x01\x00\x00\x00").unwrap();

        let generator = gen_with_dir(dir.path());
        generator.init_namespace_bounded("corrupt", 1, 20);
        // namespace falls back to empty with the full range free
        assert_eq!(generator.remaining_ids("corrupt"), 20);
    }

    #[test]
    fn load_skips_out_of_range_and_truncated_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.id");
        let mut data = Vec::new();
        data.extend_from_slice(b"opflexid");
        data.extend_from_slice(&1u32.to_ne_bytes());
        // valid record: id 3 -> "/a"
        data.extend_from_slice(&3u32.to_ne_bytes());
        data.extend_from_slice(&2u16.to_ne_bytes());
        data.extend_from_slice(b"/a");
        // out of range: id 99
        data.extend_from_slice(&99u32.to_ne_bytes());
        data.extend_from_slice(&2u16.to_ne_bytes());
        data.extend_from_slice(b"/b");
        // truncated record at EOF
        data.extend_from_slice(&4u32.to_ne_bytes());
        data.extend_from_slice(&10u16.to_ne_bytes());
        data.extend_from_slice(b"/c");
        std::fs::write(&path, &data).unwrap();

        let generator = gen_with_dir(dir.path());
        generator.init_namespace_bounded("mixed", 1, 20);
        assert_eq!(generator.get_string_for_id("mixed", 3).unwrap(), "/a");
        assert!(generator.get_string_for_id("mixed", 99).is_none());
        assert!(generator.get_string_for_id("mixed", 4).is_none());
        assert_eq!(generator.remaining_ids("mixed"), 19);
    }

    #[test]
    fn alloc_hook_can_veto() {
        let generator = IdGenerator::new();
        generator.init_namespace_bounded("hooked", 1, 10);
        generator.set_alloc_hook("hooked", Box::new(|key, _id| key != "/blocked"));

        assert!(generator.get_id("hooked", "/blocked").is_none());
        // the veto leaves state untouched
        assert_eq!(generator.remaining_ids("hooked"), 10);
        assert_eq!(generator.get_id("hooked", "/ok"), Some(1));
    }

    #[test]
    fn exhaustion_returns_none() {
        let generator = IdGenerator::new();
        generator.init_namespace_bounded("tiny", 1, 2);
        assert_eq!(generator.get_id("tiny", "/a"), Some(1));
        assert_eq!(generator.get_id("tiny", "/b"), Some(2));
        assert!(generator.get_id("tiny", "/c").is_none());
        // existing keys still resolve
        assert_eq!(generator.get_id("tiny", "/a"), Some(1));
    }
}
