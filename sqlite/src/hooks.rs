//! Callbacks run once a connection is ready.
//!
//! A [`HookRegistry`] is handed to the [`DatabaseBuilder`](crate::DatabaseBuilder)
//! and every hook in it runs, in registration order, after the connection
//! pragmas have been applied. The built-in `rank_bm25` hook registers the
//! scalar function used to rank FTS4 search results.

use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use tracing::debug;

/// A connection-ready callback.
pub type ConnectionHook = Box<dyn Fn(&Connection) -> rusqlite::Result<()> + Send>;

/// Name of the built-in hook registering `rank_bm25`.
pub const RANK_BM25_HOOK: &str = "rank_bm25";

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

/// Ordered, named collection of connection hooks.
///
/// # Examples
///
/// ```
/// use dyntable_sqlite::HookRegistry;
///
/// let mut hooks = HookRegistry::with_builtins();
/// hooks.register("pragma_cache", |conn| conn.execute_batch("PRAGMA cache_size = -4000"));
/// assert!(hooks.contains("rank_bm25"));
/// assert_eq!(hooks.names().count(), 2);
/// ```
pub struct HookRegistry {
    hooks: Vec<(String, ConnectionHook)>,
}

impl HookRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Creates a registry holding the built-in hooks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(RANK_BM25_HOOK, register_rank_bm25);
        registry
    }

    /// Adds a hook. A hook registered under an existing name replaces it in
    /// place.
    pub fn register<F>(&mut self, name: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&Connection) -> rusqlite::Result<()> + Send + 'static,
    {
        let name = name.into();
        let hook: ConnectionHook = Box::new(hook);
        match self.hooks.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = hook,
            None => self.hooks.push((name, hook)),
        }
        self
    }

    /// Removes a hook by name, returning whether it was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(existing, _)| existing != name);
        self.hooks.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.iter().any(|(existing, _)| existing == name)
    }

    /// Hook names in the order they run.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(|(name, _)| name.as_str())
    }

    pub(crate) fn run(&self, conn: &Connection) -> rusqlite::Result<()> {
        for (name, hook) in &self.hooks {
            debug!(hook = %name, "Running connection hook");
            hook(conn)?;
        }
        Ok(())
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Registers `rank_bm25(matchinfo(fts, 'pcnalx'))` on `conn`.
pub fn register_rank_bm25(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "rank_bm25",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let matchinfo: Vec<u8> = ctx.get(0)?;
            Ok(rank_bm25(&matchinfo))
        },
    )
}

/// Okapi BM25 over an FTS4 `matchinfo(…, 'pcnalx')` blob.
///
/// Returns the negated score so that ascending order puts the best match
/// first, matching FTS5's `rank` column. A malformed blob scores `0.0`.
pub fn rank_bm25(matchinfo: &[u8]) -> f64 {
    let ints: Vec<u32> = matchinfo
        .chunks_exact(4)
        .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if ints.len() < 3 {
        return 0.0;
    }

    let phrases = ints[0] as usize;
    let columns = ints[1] as usize;
    let total_docs = f64::from(ints[2]);
    let avg_offset = 3;
    let len_offset = avg_offset + columns;
    let hits_offset = len_offset + columns;
    if ints.len() < hits_offset + 3 * columns * phrases {
        return 0.0;
    }

    let mut score = 0.0;
    for phrase in 0..phrases {
        for column in 0..columns {
            let base = hits_offset + 3 * (column + phrase * columns);
            let term_freq = f64::from(ints[base]);
            let docs_with_hits = f64::from(ints[base + 2]);
            let doc_len = f64::from(ints[len_offset + column]);
            let avg_len = f64::from(ints[avg_offset + column]);

            let idf = ((total_docs - docs_with_hits + 0.5) / (docs_with_hits + 0.5))
                .ln()
                .max(0.0);
            let len_ratio = if avg_len > 0.0 { doc_len / avg_len } else { 0.0 };
            let denominator = term_freq + BM25_K1 * (1.0 - BM25_B + BM25_B * len_ratio);
            if denominator > 0.0 {
                score += idf * (term_freq * (BM25_K1 + 1.0)) / denominator;
            }
        }
    }
    -score
}
