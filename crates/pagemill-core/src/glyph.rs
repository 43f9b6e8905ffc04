//! Face-keyed glyph caches with a post-warmup lock-free read mode.
//!
//! Glyph lookups dominate text extraction, and after the first few pages the
//! caches stop changing; from then on the lock acquisition itself is the
//! bottleneck. `freeze` trades mutability away: it snapshots both maps and
//! publishes them through a lock-free cell, after which readers resolve
//! faces with a plain map lookup. The transition happens under the writer
//! lock so no reader is mid-access, and it is one-way.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use parking_lot::RwLock;
use pagemill_parser::{FontInfo, Rect};
use tracing::debug;

use crate::obj::ObjCell;

/// Stable identifier of a font face, as reported by the backend.
pub type FaceKey = u64;

/// Whether a face came from an embedded font or a system substitute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceClass {
    Internal,
    External,
}

/// Cached geometry of a single glyph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphMetrics {
    pub advance: f64,
    pub bbox: Rect,
}

/// Per-face cache of font properties and glyph metrics.
pub struct GlyphCache {
    font: FontInfo,
    glyphs: RwLock<HashMap<u32, GlyphMetrics>>,
}

impl GlyphCache {
    pub fn new(font: FontInfo) -> Self {
        GlyphCache {
            font,
            glyphs: RwLock::new(HashMap::new()),
        }
    }

    pub fn font(&self) -> &FontInfo {
        &self.font
    }

    pub fn metrics(&self, glyph: u32) -> Option<GlyphMetrics> {
        self.glyphs.read().get(&glyph).copied()
    }

    pub fn insert(&self, glyph: u32, metrics: GlyphMetrics) {
        self.glyphs.write().insert(glyph, metrics);
    }

    pub fn len(&self) -> usize {
        self.glyphs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.read().is_empty()
    }
}

type FaceMap = HashMap<FaceKey, ObjCell<GlyphCache>>;

/// Registry of glyph caches for the internal and external face sets.
#[derive(Default)]
pub struct GlyphCacheRegistry {
    internal: RwLock<FaceMap>,
    external: RwLock<FaceMap>,
    frozen: OnceLock<(FaceMap, FaceMap)>,
    read_only: AtomicBool,
}

impl GlyphCacheRegistry {
    pub fn new() -> Self {
        GlyphCacheRegistry::default()
    }

    fn map(&self, class: FaceClass) -> &RwLock<FaceMap> {
        match class {
            FaceClass::Internal => &self.internal,
            FaceClass::External => &self.external,
        }
    }

    /// Look up the cache for a face.
    ///
    /// In read-only mode this touches no lock at all.
    pub fn get(&self, class: FaceClass, key: FaceKey) -> Option<ObjCell<GlyphCache>> {
        if self.read_only.load(Ordering::Acquire) {
            let (internal, external) = self.frozen.get()?;
            let map = match class {
                FaceClass::Internal => internal,
                FaceClass::External => external,
            };
            return map.get(&key).map(ObjCell::retain);
        }
        self.map(class).read().get(&key).map(ObjCell::retain)
    }

    /// Look up a face, inserting a fresh cache on miss (warm-up mode).
    ///
    /// After `freeze`, a miss returns an unshared cache instead of mutating
    /// the registry: the read-only promise means no writes, ever.
    pub fn get_or_insert(&self, class: FaceClass, key: FaceKey, font: FontInfo) -> ObjCell<GlyphCache> {
        if let Some(cache) = self.get(class, key) {
            return cache;
        }
        if self.read_only.load(Ordering::Acquire) {
            return ObjCell::new(GlyphCache::new(font));
        }

        let mut map = self.map(class).write();
        // Re-check under the writer lock; the read-time miss may be stale.
        if let Some(cache) = map.get(&key) {
            return cache.retain();
        }
        let cache = ObjCell::new(GlyphCache::new(font));
        map.insert(key, cache.retain());
        cache
    }

    /// Switch to read-only mode. One-way.
    pub fn freeze(&self) {
        if self.read_only.load(Ordering::Acquire) {
            return;
        }
        // Hold both writer locks while publishing the snapshot so no reader
        // is mid-shared-access when the flag flips.
        let internal = self.internal.write();
        let external = self.external.write();
        let snapshot = (
            internal.iter().map(|(k, v)| (*k, v.retain())).collect(),
            external.iter().map(|(k, v)| (*k, v.retain())).collect(),
        );
        if self.frozen.set(snapshot).is_ok() {
            debug!(
                internal = internal.len(),
                external = external.len(),
                "glyph caches frozen"
            );
            self.read_only.store(true, Ordering::Release);
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font(face_id: u64, name: &str) -> FontInfo {
        FontInfo {
            face_id,
            name: name.to_string(),
            flags: 0,
            weight: 400,
        }
    }

    #[test]
    fn get_or_insert_is_idempotent() {
        let registry = GlyphCacheRegistry::new();
        let a = registry.get_or_insert(FaceClass::External, 1, font(1, "A"));
        a.insert(
            10,
            GlyphMetrics {
                advance: 6.0,
                bbox: Rect::new(0.0, 0.0, 6.0, 10.0),
            },
        );
        let b = registry.get_or_insert(FaceClass::External, 1, font(1, "other"));
        assert_eq!(b.font().name, "A");
        assert!(b.metrics(10).is_some());
    }

    #[test]
    fn classes_are_distinct() {
        let registry = GlyphCacheRegistry::new();
        registry.get_or_insert(FaceClass::Internal, 1, font(1, "int"));
        assert!(registry.get(FaceClass::External, 1).is_none());
        assert!(registry.get(FaceClass::Internal, 1).is_some());
    }

    #[test]
    fn frozen_registry_serves_existing_faces_without_writes() {
        let registry = GlyphCacheRegistry::new();
        registry.get_or_insert(FaceClass::External, 7, font(7, "warm"));
        registry.freeze();
        assert!(registry.is_read_only());

        // Warm face still resolves.
        let cache = registry.get(FaceClass::External, 7).unwrap();
        assert_eq!(cache.font().name, "warm");

        // Cold face yields an unshared cache and leaves the registry alone.
        let cold = registry.get_or_insert(FaceClass::External, 8, font(8, "cold"));
        assert_eq!(cold.font().name, "cold");
        assert!(registry.get(FaceClass::External, 8).is_none());
    }

    #[test]
    fn freeze_is_idempotent() {
        let registry = GlyphCacheRegistry::new();
        registry.freeze();
        registry.freeze();
        assert!(registry.is_read_only());
    }

    #[test]
    fn concurrent_warmup_creates_one_cache_per_face() {
        use std::sync::Arc;

        let registry = Arc::new(GlyphCacheRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for key in 0..16u64 {
                        registry.get_or_insert(FaceClass::External, key, font(key, "f"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for key in 0..16u64 {
            let cache = registry.get(FaceClass::External, key).unwrap();
            // Registry + this handle.
            assert!(cache.ref_count() >= 2);
        }
    }
}
