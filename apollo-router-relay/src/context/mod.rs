#[cfg(test)]
mod tests;

use std::any::Any;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

/// A trait for types that can be stored in the context.
/// Any type that is Clone, Send, Sync and 'static can be stored in the context.
pub trait ContextValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> ContextValue for T {}

/// Request-scoped state for one operation execution.
///
/// The hosting execution engine creates one `Context` per incoming request and hands a
/// reference to every resolver it invokes. Relay state (the node request cache, the type
/// brands of loaded objects, the client mutation ids) is created lazily the first time
/// it is needed within a context and dropped with it, so concurrent requests never see
/// each other's state.
///
/// Values are stored by type and cloned when retrieved. State that must be shared between
/// resolvers of the same request is therefore stored as a cheap handle around an `Arc`.
///
/// ```rust
/// use apollo_router_relay::Context;
///
/// let context = Context::new();
/// context.insert(42);
/// assert_eq!(context.get::<i32>(), Some(42));
/// assert_eq!(context.get_or_insert_with(|| 7), 42);
/// ```
#[derive(Clone, Default)]
pub struct Context {
    entries: Arc<DashMap<TypeId, Arc<dyn Any + Send + Sync + 'static>>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Context {
    /// Creates a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value from the context by type.
    pub fn get<T: ContextValue>(&self) -> Option<T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|value| value.value().downcast_ref::<T>().cloned())
    }

    /// Inserts a value into the context.
    /// If a value of the same type already exists, it will be overwritten.
    pub fn insert<T: ContextValue>(&self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Returns the value of type `T`, creating it with `init` if this is the first
    /// access within this context.
    ///
    /// Creation is atomic: two resolvers racing on the first access observe the same value.
    /// `init` runs while the entry is locked and must not access this context.
    pub fn get_or_insert_with<T, F>(&self, init: F) -> T
    where
        T: ContextValue,
        F: FnOnce() -> T,
    {
        let entry = self
            .entries
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(init()));
        entry
            .value()
            .downcast_ref::<T>()
            .expect("value is keyed by type id, qed")
            .clone()
    }

    /// Removes a value from the context.
    pub fn remove<T: ContextValue>(&self) {
        self.entries.remove(&TypeId::of::<T>());
    }
}
