//! Type-resolution and string-interning collaborators.
//!
//! Per DELTA_FORMAT.md §6: the codec never consults global state. Class
//! references are resolved through an injected `TypeResolver`; interned
//! strings are canonicalized through an injected `StringInterner`. Caching,
//! where wanted, is an explicit wrapper, not a hidden static.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

use super::value::ClassSpec;

/// A resolved type handle: the canonical descriptor a class reference
/// resolves to on this node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    pub name: String,
    pub loader_desc: String,
}

/// Maps (type name, defining-loader description) pairs to resolved
/// descriptors and back.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, spec: &ClassSpec) -> io::Result<Arc<TypeDescriptor>>;

    fn describe(&self, ty: &TypeDescriptor) -> ClassSpec;
}

/// Resolver for types defined by this process: accepts exactly one loader
/// description and mints descriptors for it.
pub struct LocalResolver {
    loader_desc: String,
}

impl LocalResolver {
    pub fn new(loader_desc: impl Into<String>) -> Self {
        Self {
            loader_desc: loader_desc.into(),
        }
    }
}

impl TypeResolver for LocalResolver {
    fn resolve(&self, spec: &ClassSpec) -> io::Result<Arc<TypeDescriptor>> {
        if spec.loader_desc != self.loader_desc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "unknown loader description: {} (expected {})",
                    spec.loader_desc, self.loader_desc
                ),
            ));
        }
        Ok(Arc::new(TypeDescriptor {
            name: spec.name.clone(),
            loader_desc: spec.loader_desc.clone(),
        }))
    }

    fn describe(&self, ty: &TypeDescriptor) -> ClassSpec {
        ClassSpec {
            name: ty.name.clone(),
            loader_desc: ty.loader_desc.clone(),
        }
    }
}

/// Resolver for storage-mode codecs, which must never materialize types.
/// Any resolution attempt is a defect in the caller.
pub struct FailingResolver;

impl TypeResolver for FailingResolver {
    fn resolve(&self, spec: &ClassSpec) -> io::Result<Arc<TypeDescriptor>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("storage-mode codec asked to resolve type {}", spec.name),
        ))
    }

    fn describe(&self, ty: &TypeDescriptor) -> ClassSpec {
        ClassSpec {
            name: ty.name.clone(),
            loader_desc: ty.loader_desc.clone(),
        }
    }
}

/// Explicit memoizing wrapper around another resolver.
pub struct CachingResolver {
    inner: Arc<dyn TypeResolver>,
    cache: Mutex<HashMap<(String, String), Arc<TypeDescriptor>>>,
}

impl CachingResolver {
    pub fn new(inner: Arc<dyn TypeResolver>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl TypeResolver for CachingResolver {
    fn resolve(&self, spec: &ClassSpec) -> io::Result<Arc<TypeDescriptor>> {
        let key = (spec.name.clone(), spec.loader_desc.clone());
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(Arc::clone(hit));
            }
        }
        let resolved = self.inner.resolve(spec)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, Arc::clone(&resolved));
        }
        Ok(resolved)
    }

    fn describe(&self, ty: &TypeDescriptor) -> ClassSpec {
        self.inner.describe(ty)
    }
}

/// Substitutes the caller's canonical instance for interned strings.
pub trait StringInterner: Send + Sync {
    fn intern(&self, text: &str) -> Arc<str>;
}

/// Pooling interner: one canonical `Arc<str>` per distinct content.
#[derive(Default)]
pub struct PoolInterner {
    pool: Mutex<HashSet<Arc<str>>>,
}

impl PoolInterner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StringInterner for PoolInterner {
    fn intern(&self, text: &str) -> Arc<str> {
        if let Ok(mut pool) = self.pool.lock() {
            if let Some(hit) = pool.get(text) {
                return Arc::clone(hit);
            }
            let fresh: Arc<str> = Arc::from(text);
            pool.insert(Arc::clone(&fresh));
            return fresh;
        }
        Arc::from(text)
    }
}

/// Non-pooling interner: every call allocates. Used where canonicalization
/// is not wanted (tests, tooling).
pub struct PassthroughInterner;

impl StringInterner for PassthroughInterner {
    fn intern(&self, text: &str) -> Arc<str> {
        Arc::from(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_resolver_rejects_foreign_loader() {
        let resolver = LocalResolver::new("local");
        let spec = ClassSpec {
            name: "inventory.Bin".to_string(),
            loader_desc: "remote".to_string(),
        };
        assert!(resolver.resolve(&spec).is_err());
    }

    #[test]
    fn test_caching_resolver_returns_same_descriptor() {
        let resolver = CachingResolver::new(Arc::new(LocalResolver::new("local")));
        let spec = ClassSpec {
            name: "inventory.Bin".to_string(),
            loader_desc: "local".to_string(),
        };
        let a = resolver.resolve(&spec).unwrap();
        let b = resolver.resolve(&spec).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_pool_interner_canonicalizes() {
        let interner = PoolInterner::new();
        let a = interner.intern("shared");
        let b = interner.intern("shared");
        assert!(Arc::ptr_eq(&a, &b));
        let c = interner.intern("other");
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_failing_resolver_always_errors() {
        let spec = ClassSpec {
            name: "x".to_string(),
            loader_desc: "y".to_string(),
        };
        assert!(FailingResolver.resolve(&spec).is_err());
    }
}
