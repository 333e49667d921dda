//! DynamicConfig handles for live-updatable config.
//!
//! Reads are lock-free through `ArcSwap`; writers replace the whole value.

use arc_swap::ArcSwap;
use std::sync::Arc;

/// `DynamicConfig<T>` gives cheap reads and controlled updates for shared config.
///
/// Clones observe the same value.
#[derive(Debug)]
pub struct DynamicConfig<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> DynamicConfig<T> {
    /// Create a new `DynamicConfig` with the given initial value.
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
    }

    /// Snapshot the current value (cheap clone of Arc).
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replace the value entirely.
    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// Update via closure.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&T) -> T,
    {
        self.inner.rcu(|cur| f(cur));
    }
}

#[cfg(test)]
mod tests {
    use super::DynamicConfig;

    #[test]
    fn get_set_update() {
        let a = DynamicConfig::new(1);
        assert_eq!(*a.get(), 1);
        a.set(2);
        assert_eq!(*a.get(), 2);
        a.update(|v| v + 3);
        assert_eq!(*a.get(), 5);
    }

    #[test]
    fn clones_share_value() {
        let a = DynamicConfig::new("one");
        let b = a.clone();
        b.set("two");
        assert_eq!(*a.get(), "two");
    }
}
