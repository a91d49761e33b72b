use crate::reclaim::{MallocTrim, ReclaimHint};
use parking_lot::ReentrantMutex;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Opaque handle owned by the registry while a resource is registered.
pub type ResourceHandle = Arc<dyn Any + Send + Sync>;

/// Releases a resource. Must be idempotent: a failed call may be retried.
pub type CleanupFn = Box<dyn FnMut() -> Result<(), CleanupError> + Send>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CleanupError {
    #[error("{0}")]
    Failed(String),
    #[error("cleanup handler panicked: {0}")]
    Panicked(String),
    #[error("resource `{0}` is not registered")]
    NotRegistered(String),
    #[error("cleanup of `{0}` is already in progress")]
    InProgress(String),
}

impl CleanupError {
    pub fn failed(message: impl Into<String>) -> Self {
        CleanupError::Failed(message.into())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        CleanupError::Panicked(message)
    }
}

struct Entry {
    handle: ResourceHandle,
    // `None` while the handler is running.
    cleanup: Option<CleanupFn>,
    dependencies: Vec<String>,
}

#[derive(Default)]
struct RegistryState {
    entries: BTreeMap<String, Entry>,
}

impl RegistryState {
    fn dependents_of(&self, id: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.dependencies.iter().any(|dep| dep == id))
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }

    fn dependents_index(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut index: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (id, entry) in &self.entries {
            for dep in &entry.dependencies {
                index.entry(dep.as_str()).or_default().push(id.as_str());
            }
        }
        index
    }

    /// Post-order walk over dependents, starting from every registered id in
    /// sorted order. Each node is emitted once even when the graph has cycles.
    fn cleanup_order(&self) -> Vec<String> {
        let dependents = self.dependents_index();
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut order = Vec::with_capacity(self.entries.len());

        for root in self.entries.keys() {
            if !visited.insert(root.as_str()) {
                continue;
            }
            // (node, index of the next dependent to visit)
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            while let Some((node, next)) = stack.last_mut() {
                let children = dependents.get(*node).map(Vec::as_slice).unwrap_or(&[]);
                if let Some(child) = children.get(*next) {
                    *next += 1;
                    if visited.insert(child) {
                        stack.push((child, 0));
                    }
                    continue;
                }
                order.push((*node).to_string());
                stack.pop();
            }
        }
        order
    }

    /// `ids` plus everything that transitively depends on them.
    fn expand_dependents(&self, ids: &[String]) -> BTreeSet<String> {
        let dependents = self.dependents_index();
        let mut expanded = BTreeSet::new();
        let mut pending: Vec<&str> = ids.iter().map(String::as_str).collect();
        while let Some(id) = pending.pop() {
            if !expanded.insert(id.to_string()) {
                continue;
            }
            if let Some(children) = dependents.get(id) {
                pending.extend(children.iter().copied());
            }
        }
        expanded
    }
}

/// Owns live resources, their cleanup handlers and their dependency edges.
///
/// All mutation happens under a reentrant lock. A cleanup handler runs with
/// the lock held, so it may call back into the registry from the same thread;
/// its own entry is marked in progress while it runs.
pub struct ResourceRegistry {
    state: ReentrantMutex<RefCell<RegistryState>>,
    reclaim: Box<dyn ReclaimHint>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::with_reclaim_hint(MallocTrim)
    }

    pub fn with_reclaim_hint(hint: impl ReclaimHint + 'static) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(RegistryState::default())),
            reclaim: Box::new(hint),
        }
    }

    /// Register (or silently replace) a resource.
    pub fn register<T, F>(&self, id: impl Into<String>, handle: T, cleanup: F, dependencies: &[&str])
    where
        T: Any + Send + Sync,
        F: FnMut() -> Result<(), CleanupError> + Send + 'static,
    {
        self.register_shared(
            id,
            Arc::new(handle),
            Box::new(cleanup),
            dependencies.iter().map(|dep| dep.to_string()).collect(),
        );
    }

    pub fn register_shared(
        &self,
        id: impl Into<String>,
        handle: ResourceHandle,
        cleanup: CleanupFn,
        dependencies: Vec<String>,
    ) {
        let id = id.into();
        let guard = self.state.lock();
        let replaced = guard
            .borrow_mut()
            .entries
            .insert(
                id.clone(),
                Entry {
                    handle,
                    cleanup: Some(cleanup),
                    dependencies,
                },
            )
            .is_some();
        if replaced {
            tracing::debug!(target = "ward.guard", id = %id, "resource re-registered");
        } else {
            tracing::trace!(target = "ward.guard", id = %id, "resource registered");
        }
    }

    /// Forget a resource without running its cleanup. Returns its handle.
    pub fn unregister(&self, id: &str) -> Option<ResourceHandle> {
        let guard = self.state.lock();
        let removed = guard.borrow_mut().entries.remove(id);
        removed.map(|entry| entry.handle)
    }

    pub fn get(&self, id: &str) -> Option<ResourceHandle> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.entries.get(id).map(|entry| entry.handle.clone())
    }

    pub fn get_as<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
        self.get(id)?.downcast::<T>().ok()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().borrow().entries.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.state.lock().borrow().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dependencies_of(&self, id: &str) -> Option<Vec<String>> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.entries.get(id).map(|entry| entry.dependencies.clone())
    }

    /// Every registered id whose dependency list contains `id`.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.state.lock().borrow().dependents_of(id)
    }

    /// Consumers first: every resource appears after the resources that depend on it.
    pub fn cleanup_order(&self) -> Vec<String> {
        self.state.lock().borrow().cleanup_order()
    }

    /// Run the cleanup handler of `id`.
    ///
    /// On success the entry is removed. On failure (including a panicking
    /// handler) the entry stays registered so the cleanup can be retried.
    /// The reclaim hint runs after every attempt.
    pub fn cleanup_one(&self, id: &str) -> Result<(), CleanupError> {
        let guard = self.state.lock();

        let mut cleanup = {
            let mut state = guard.borrow_mut();
            let entry = state
                .entries
                .get_mut(id)
                .ok_or_else(|| CleanupError::NotRegistered(id.to_string()))?;
            entry
                .cleanup
                .take()
                .ok_or_else(|| CleanupError::InProgress(id.to_string()))?
        };

        let outcome = catch_unwind(AssertUnwindSafe(&mut cleanup))
            .unwrap_or_else(|payload| Err(CleanupError::from_panic(payload)));

        {
            let mut state = guard.borrow_mut();
            match &outcome {
                Ok(()) => {
                    state.entries.remove(id);
                }
                Err(_) => {
                    if let Some(entry) = state.entries.get_mut(id) {
                        if entry.cleanup.is_none() {
                            entry.cleanup = Some(cleanup);
                        }
                    }
                }
            }
        }
        drop(guard);

        self.reclaim.reclaim();

        match &outcome {
            Ok(()) => tracing::debug!(target = "ward.guard", id = %id, "resource cleaned up"),
            Err(err) => {
                tracing::warn!(target = "ward.guard", id = %id, error = %err, "resource cleanup failed")
            }
        }
        outcome
    }

    /// Clean up resources in dependency order and report the outcome per id.
    ///
    /// With `None` every registered resource is released. With explicit ids the
    /// set is first widened to everything that (transitively) depends on them.
    /// Ids that are not registered are skipped, so releasing twice is a no-op.
    pub fn release(&self, ids: Option<&[String]>) -> BTreeMap<String, bool> {
        let guard = self.state.lock();
        let order = {
            let state = guard.borrow();
            let order = state.cleanup_order();
            match ids {
                None => order,
                Some(ids) => {
                    let wanted = state.expand_dependents(ids);
                    order.into_iter().filter(|id| wanted.contains(id)).collect()
                }
            }
        };

        let mut outcomes = BTreeMap::new();
        for id in order {
            // A handler earlier in the sequence may have removed this entry.
            if !guard.borrow().entries.contains_key(&id) {
                continue;
            }
            let ok = self.cleanup_one(&id).is_ok();
            outcomes.insert(id, ok);
        }

        let failed = outcomes.values().filter(|ok| !**ok).count();
        if failed > 0 {
            tracing::warn!(
                target = "ward.guard",
                released = outcomes.len() - failed,
                failed,
                "resource release finished with failures"
            );
        } else if !outcomes.is_empty() {
            tracing::info!(target = "ward.guard", released = outcomes.len(), "resources released");
        }
        outcomes
    }

    pub fn release_all(&self) -> BTreeMap<String, bool> {
        self.release(None)
    }

    /// Run `f` while holding the registry lock.
    ///
    /// The lock is reentrant, so `f` may call any registry method. Components
    /// that release resources (the circuit breaker) serialize their own state
    /// changes through this lock so that a release and a state change are
    /// never waiting on each other from two threads.
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.state.lock();
        f()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("ids", &self.ids())
            .finish_non_exhaustive()
    }
}
