//! Application and method tiers tracked for one route.

use super::limit::{Limit, LimitSnapshot, LimitType};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// Limits for one route: one application tier plus one tier per method.
///
/// Tiers are swapped, never edited: [`replace_app`](Limits::replace_app) and
/// [`replace_method`](Limits::replace_method) install a freshly built [`Limit`]. Callers already
/// waiting inside the old one finish against it, and those admissions are not counted in the new
/// tier's tokens. Until the next response reports the server's counts, the route can briefly
/// admit more than the new limit allows.
#[derive(Debug)]
pub struct Limits {
    app: ArcSwap<Limit>,
    methods: Mutex<HashMap<String, Arc<Limit>>>,
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

impl Limits {
    /// Empty tiers; everything is admitted until headers arrive.
    pub fn new() -> Self {
        Self {
            app: ArcSwap::from_pointee(Limit::new(LimitType::Application)),
            methods: Mutex::new(HashMap::new()),
        }
    }

    /// Current application tier.
    pub fn app(&self) -> Arc<Limit> {
        self.app.load_full()
    }

    /// Current tier for `method_id`, created empty on first use.
    pub fn method(&self, method_id: &str) -> Arc<Limit> {
        let mut methods = self.methods.lock().unwrap_or_else(PoisonError::into_inner);
        methods
            .entry(method_id.to_string())
            .or_insert_with(|| Arc::new(Limit::new(LimitType::Method)))
            .clone()
    }

    /// Install a new application tier, keeping any pending retry-after.
    ///
    /// Callers queued on the previous tier are admitted against its buckets, not the new ones.
    pub fn replace_app(&self, limit: Limit) {
        carry_retry_after(&self.app.load(), &limit);
        self.app.store(Arc::new(limit));
    }

    /// Install a new tier for `method_id`, keeping any pending retry-after.
    pub fn replace_method(&self, method_id: &str, limit: Limit) {
        let mut methods = self.methods.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = methods.get(method_id) {
            carry_retry_after(current, &limit);
        }
        methods.insert(method_id.to_string(), Arc::new(limit));
    }

    /// Diagnostic view of every tier.
    pub async fn snapshot(&self) -> RouteSnapshot {
        let methods: Vec<(String, Arc<Limit>)> = {
            let guard = self.methods.lock().unwrap_or_else(PoisonError::into_inner);
            guard.iter().map(|(id, limit)| (id.clone(), limit.clone())).collect()
        };

        let app = self.app().snapshot().await;
        let mut snapshots = BTreeMap::new();
        for (id, limit) in methods {
            snapshots.insert(id, limit.snapshot().await);
        }

        RouteSnapshot { app, methods: snapshots }
    }
}

fn carry_retry_after(current: &Limit, replacement: &Limit) {
    let pending = current.retry_after();
    if !pending.is_zero() && replacement.retry_after().is_zero() {
        replacement.set_retry_after(pending);
    }
}

/// Point-in-time copy of a route's [`Limits`], methods sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSnapshot {
    pub app: LimitSnapshot,
    pub methods: BTreeMap<String, LimitSnapshot>,
}
