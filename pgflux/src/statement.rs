//! Prepared statement names and the statement cache.
use lru::LruCache;
use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{common::ByteStr, postgres::Oid};

const NAME_CAP: usize = 22;

/// A short server-side object name, `""` for the unnamed object.
#[derive(Clone, PartialEq, Eq)]
pub struct Id {
    buf: [u8; NAME_CAP],
    len: u8,
}

impl Id {
    pub(crate) fn unnamed() -> Self {
        Self { buf: [0; NAME_CAP], len: 0 }
    }

    pub(crate) fn named(prefix: &str, id: u64) -> Self {
        let mut buf = [0u8; NAME_CAP];
        buf[..prefix.len()].copy_from_slice(prefix.as_bytes());

        let mut b = itoa::Buffer::new();
        let id = b.format(id).as_bytes();
        buf[prefix.len()..prefix.len() + id.len()].copy_from_slice(id);

        Self { buf, len: (prefix.len() + id.len()) as u8 }
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: string only construction and is immutable
        unsafe { std::str::from_utf8_unchecked(&self.buf[..self.len as usize]) }
    }

    pub fn is_unnamed(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.as_str()).finish()
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

macro_rules! delegate {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name(Id);

        impl $name {
            #[allow(unused, reason = "only statements select the unnamed object")]
            pub(crate) fn unnamed() -> Self {
                Self(Id::unnamed())
            }
        }

        impl std::ops::Deref for $name {
            type Target = Id;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.as_str()).finish()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

delegate!(StatementName);
delegate!(PortalName);

impl StatementName {
    /// `S_<id>`, handed out by a [`StatementCache`].
    pub(crate) fn next(counter: &mut u64) -> Self {
        let id = *counter;
        *counter += 1;
        Self(Id::named("S_", id))
    }
}

impl PortalName {
    /// `P_<id>` from the process wide monotonic supplier.
    pub(crate) fn next() -> Self {
        static ID: AtomicU64 = AtomicU64::new(0);
        Self(Id::named("P_", ID.fetch_add(1, Ordering::Relaxed)))
    }
}

/// Key of a prepared statement: the sql string and the parameter type vector.
///
/// Two queries share a server-side prepared statement only when both are
/// equal element-wise.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CacheKey {
    sql: ByteStr,
    parameter_types: Box<[Oid]>,
}

impl CacheKey {
    pub fn new(sql: &str, parameter_types: impl Into<Box<[Oid]>>) -> CacheKey {
        CacheKey {
            sql: ByteStr::copy_from_str(sql),
            parameter_types: parameter_types.into(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_types(&self) -> &[Oid] {
        &self.parameter_types
    }
}

const DEFAULT_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(24).unwrap();

/// Server-side prepared statement cache.
///
/// All strategies share one contract: a lookup for an already parsed key
/// returns the same name it returned before, and at most one `Parse` is
/// issued per key. Mutations happen through the exclusive connection
/// reference, which serialises them.
///
/// - [`Disabled`][StatementCache::Disabled] always parses under the unnamed
///   statement `""` and caches nothing.
/// - [`Unbounded`][StatementCache::Unbounded] assigns `S_<n>` and keeps every
///   entry for the connection lifetime.
/// - [`Bounded`][StatementCache::Bounded] keeps an access-ordered map;
///   reserving a slot at capacity evicts the least recently used entry,
///   whose name must then be closed on the server.
#[derive(Debug)]
pub enum StatementCache {
    Disabled,
    Unbounded {
        stmts: HashMap<CacheKey, StatementName>,
        counter: u64,
    },
    Bounded {
        stmts: LruCache<CacheKey, StatementName>,
        counter: u64,
    },
}

impl StatementCache {
    pub fn disabled() -> StatementCache {
        Self::Disabled
    }

    pub fn unbounded() -> StatementCache {
        Self::Unbounded { stmts: HashMap::new(), counter: 0 }
    }

    pub fn bounded(limit: NonZeroUsize) -> StatementCache {
        Self::Bounded { stmts: LruCache::new(limit), counter: 0 }
    }

    /// Lookup a cached statement name, promoting the entry when access ordered.
    pub fn get(&mut self, key: &CacheKey) -> Option<StatementName> {
        match self {
            Self::Disabled => None,
            Self::Unbounded { stmts, .. } => stmts.get(key).cloned(),
            Self::Bounded { stmts, .. } => stmts.get(key).cloned(),
        }
    }

    /// Reserve a name for a statement about to be parsed.
    ///
    /// For the bounded strategy at capacity this evicts the eldest entry and
    /// returns its name, which the caller must `Close` on the server.
    ///
    /// The new entry is only added by [`insert`][StatementCache::insert]
    /// once `ParseComplete` is received, so a failed `Parse` caches nothing
    /// and the size bound holds at every point in between.
    pub fn reserve(&mut self) -> (StatementName, Option<StatementName>) {
        match self {
            Self::Disabled => (StatementName::unnamed(), None),
            Self::Unbounded { counter, .. } => (StatementName::next(counter), None),
            Self::Bounded { stmts, counter } => {
                let evicted = match stmts.len() >= stmts.cap().get() {
                    true => stmts.pop_lru().map(|(_, name)| name),
                    false => None,
                };
                (StatementName::next(counter), evicted)
            },
        }
    }

    /// Record a successfully parsed statement.
    pub fn insert(&mut self, key: CacheKey, name: StatementName) {
        match self {
            Self::Disabled => { },
            Self::Unbounded { stmts, .. } => {
                stmts.insert(key, name);
            },
            Self::Bounded { stmts, .. } => {
                stmts.put(key, name);
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Disabled => 0,
            Self::Unbounded { stmts, .. } => stmts.len(),
            Self::Bounded { stmts, .. } => stmts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::bounded(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(sql: &str) -> CacheKey {
        CacheKey::new(sql, [23u32])
    }

    #[test]
    fn names_are_monotonic() {
        let mut counter = 0;
        assert_eq!(StatementName::next(&mut counter).as_str(), "S_0");
        assert_eq!(StatementName::next(&mut counter).as_str(), "S_1");
        assert!(StatementName::unnamed().is_unnamed());
        assert_eq!(StatementName::unnamed().as_str(), "");
    }

    #[test]
    fn key_equality_is_element_wise() {
        assert_eq!(CacheKey::new("A", [23u32]), CacheKey::new("A", [23u32]));
        assert_ne!(CacheKey::new("A", [23u32]), CacheKey::new("A", [20u32]));
        assert_ne!(CacheKey::new("A", [23u32]), CacheKey::new("B", [23u32]));
        assert_ne!(CacheKey::new("A", [23u32]), CacheKey::new("A", [23u32, 23]));
    }

    #[test]
    fn disabled_always_parses_unnamed() {
        let mut cache = StatementCache::disabled();
        let (name, evicted) = cache.reserve();
        assert!(name.is_unnamed());
        assert!(evicted.is_none());
        cache.insert(key("A"), name);
        assert!(cache.get(&key("A")).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn unbounded_caches_forever() {
        let mut cache = StatementCache::unbounded();
        for i in 0..100 {
            let (name, evicted) = cache.reserve();
            assert!(evicted.is_none());
            cache.insert(key(&i.to_string()), name);
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.get(&key("0")).unwrap().as_str(), "S_0");
        assert_eq!(cache.get(&key("99")).unwrap().as_str(), "S_99");
    }

    // limit=2: A → S_0, B → S_1, A hit (promoted), C evicts B and gets S_2
    #[test]
    fn bounded_evicts_least_recently_used() {
        let mut cache = StatementCache::bounded(NonZeroUsize::new(2).unwrap());

        let (a, evicted) = cache.reserve();
        assert_eq!((a.as_str(), evicted), ("S_0", None));
        cache.insert(key("A"), a);

        let (b, evicted) = cache.reserve();
        assert_eq!((b.as_str(), evicted), ("S_1", None));
        cache.insert(key("B"), b);

        // promote A
        assert_eq!(cache.get(&key("A")).unwrap().as_str(), "S_0");

        assert!(cache.get(&key("C")).is_none());
        let (c, evicted) = cache.reserve();
        assert_eq!(c.as_str(), "S_2");
        assert_eq!(evicted.unwrap().as_str(), "S_1");
        cache.insert(key("C"), c);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("B")).is_none());
        assert_eq!(cache.get(&key("A")).unwrap().as_str(), "S_0");
    }

    // parse failure after reserve leaves the cache within its bound and
    // caches nothing for the failed key
    #[test]
    fn failed_parse_caches_nothing() {
        let mut cache = StatementCache::bounded(NonZeroUsize::new(1).unwrap());

        let (a, _) = cache.reserve();
        cache.insert(key("A"), a);

        let (_b, evicted) = cache.reserve();
        assert_eq!(evicted.unwrap().as_str(), "S_0");
        // ErrorResponse instead of ParseComplete: no insert happens
        assert_eq!(cache.len(), 0);
        assert!(cache.get(&key("B")).is_none());
    }
}
