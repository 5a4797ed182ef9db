//! Node type registration.
//!
//! Every type implementing the `Node` interface is described by a [`NodeTypeDescriptor`]
//! holding the single strategy used to load its objects by id. The persistence layer
//! supplies the loaders; this layer never talks to storage directly.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tower::BoxError;
use typed_builder::TypedBuilder;

use crate::context::Context;
use crate::error::RegistryError;
use crate::global_id::DELIMITER;
use crate::json_ext::Value;

/// A loaded domain object.
///
/// Objects are reference counted so that the type resolver can recognise an object it has
/// seen before by identity.
pub type NodeValue = Arc<Value>;

/// Structural check deciding whether a value belongs to a node type.
pub type IsTypeOf = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Loads one object at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoadOne: Send + Sync + 'static {
    /// Returns `None` when no object exists for `id`.
    async fn load_one(&self, id: &str, context: &Context) -> Result<Option<Value>, BoxError>;
}

/// Loads several objects of the same type in one call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoadMany: Send + Sync + 'static {
    /// Returns one entry per requested id, in the order of `ids`, with `None` for ids that
    /// do not exist.
    async fn load_many(
        &self,
        ids: &[String],
        context: &Context,
    ) -> Result<Vec<Option<Value>>, BoxError>;
}

/// Adapts an async closure into a [`LoadOne`] or [`LoadMany`].
///
/// ```rust
/// use apollo_router_relay::FnLoader;
/// use apollo_router_relay::LoaderStrategy;
///
/// let users = LoaderStrategy::single(FnLoader::new(|id: String, _context| async move {
///     Ok(Some(serde_json::json!({ "id": id })))
/// }));
/// ```
#[derive(Clone)]
pub struct FnLoader<F>(F);

impl<F> FnLoader<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> LoadOne for FnLoader<F>
where
    F: Fn(String, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, BoxError>> + Send + 'static,
{
    async fn load_one(&self, id: &str, context: &Context) -> Result<Option<Value>, BoxError> {
        (self.0)(id.to_string(), context.clone()).await
    }
}

#[async_trait]
impl<F, Fut> LoadMany for FnLoader<F>
where
    F: Fn(Vec<String>, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Option<Value>>, BoxError>> + Send + 'static,
{
    async fn load_many(
        &self,
        ids: &[String],
        context: &Context,
    ) -> Result<Vec<Option<Value>>, BoxError> {
        (self.0)(ids.to_vec(), context.clone()).await
    }
}

/// How objects of a node type are loaded by id.
///
/// Cached strategies share results through the request cache so an object is fetched at
/// most once per request. Uncached strategies fetch on every lookup, for sources that
/// manage their own caching.
#[derive(Clone)]
pub enum LoaderStrategy {
    /// One call per distinct id, cached.
    Single(Arc<dyn LoadOne>),
    /// One call per type with the deduplicated ids, cached.
    Batched(Arc<dyn LoadMany>),
    /// One call per id, never cached.
    SingleUncached(Arc<dyn LoadOne>),
    /// One call per type, never cached.
    BatchedUncached(Arc<dyn LoadMany>),
}

impl LoaderStrategy {
    pub fn single(loader: impl LoadOne) -> Self {
        LoaderStrategy::Single(Arc::new(loader))
    }

    pub fn batched(loader: impl LoadMany) -> Self {
        LoaderStrategy::Batched(Arc::new(loader))
    }

    pub fn single_uncached(loader: impl LoadOne) -> Self {
        LoaderStrategy::SingleUncached(Arc::new(loader))
    }

    pub fn batched_uncached(loader: impl LoadMany) -> Self {
        LoaderStrategy::BatchedUncached(Arc::new(loader))
    }

    /// Whether results go through the request cache.
    pub fn is_cached(&self) -> bool {
        matches!(self, LoaderStrategy::Single(_) | LoaderStrategy::Batched(_))
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            LoaderStrategy::Single(_) => "single",
            LoaderStrategy::Batched(_) => "batched",
            LoaderStrategy::SingleUncached(_) => "single_uncached",
            LoaderStrategy::BatchedUncached(_) => "batched_uncached",
        }
    }
}

impl fmt::Debug for LoaderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Registration record of a node type.
///
/// ```rust
/// use apollo_router_relay::NodeTypeDescriptor;
///
/// let users = NodeTypeDescriptor::builder()
///     .name("User")
///     .references(vec!["UserModel".to_string()])
///     .build();
/// ```
#[derive(Clone, TypedBuilder)]
pub struct NodeTypeDescriptor {
    /// The schema type name.
    #[builder(setter(into))]
    pub(crate) name: String,

    /// The loading strategy. A type without one is a `Node` that cannot be fetched by id.
    #[builder(default, setter(strip_option))]
    pub(crate) loader: Option<LoaderStrategy>,

    /// Overrides the configured `brand_loaded_objects` for this type.
    #[builder(default, setter(strip_option))]
    pub(crate) brand_loaded_objects: Option<bool>,

    /// Aliases (for example the name of a backing model) that values may carry in their
    /// `__type` field to point back at this type.
    #[builder(default)]
    pub(crate) references: Vec<String>,

    /// The field of loaded objects holding the local id. Defaults to the configured
    /// `id_field_name`.
    #[builder(default, setter(strip_option, into))]
    pub(crate) id_field: Option<String>,

    #[builder(default, setter(skip))]
    pub(crate) is_type_of: Option<IsTypeOf>,
}

impl NodeTypeDescriptor {
    /// Sets the structural check used when nothing else identifies a value's type.
    pub fn with_is_type_of(
        mut self,
        is_type_of: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_type_of = Some(Arc::new(is_type_of));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loader(&self) -> Option<&LoaderStrategy> {
        self.loader.as_ref()
    }

    pub(crate) fn is_type_of(&self, value: &Value) -> bool {
        self.is_type_of
            .as_ref()
            .map(|is_type_of| is_type_of(value))
            .unwrap_or(false)
    }
}

impl fmt::Debug for NodeTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTypeDescriptor")
            .field("name", &self.name)
            .field("loader", &self.loader)
            .field("brand_loaded_objects", &self.brand_loaded_objects)
            .field("references", &self.references)
            .field("id_field", &self.id_field)
            .field("is_type_of", &self.is_type_of.is_some())
            .finish()
    }
}

/// The registered node types, by name.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    types: IndexMap<String, NodeTypeDescriptor>,
    references: HashMap<String, String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node type.
    ///
    /// Type names must be non-empty, unique and free of the global ID delimiter, otherwise
    /// decoding a global ID would be ambiguous.
    pub fn register(&mut self, descriptor: NodeTypeDescriptor) -> Result<(), RegistryError> {
        let name = descriptor.name.clone();
        if name.is_empty() {
            return Err(RegistryError::EmptyTypeName);
        }
        if name.contains(DELIMITER) {
            return Err(RegistryError::DelimiterInTypeName(name));
        }
        if self.types.contains_key(&name) {
            return Err(RegistryError::DuplicateType(name));
        }
        for reference in &descriptor.references {
            if let Some(bound_to) = self.references.get(reference) {
                return Err(RegistryError::DuplicateReference {
                    reference: reference.clone(),
                    bound_to: bound_to.clone(),
                });
            }
        }

        for reference in &descriptor.references {
            self.references.insert(reference.clone(), name.clone());
        }
        tracing::debug!(
            typename = %name,
            loader = ?descriptor.loader,
            "registered node type"
        );
        self.types.insert(name, descriptor);
        Ok(())
    }

    pub fn get(&self, typename: &str) -> Option<&NodeTypeDescriptor> {
        self.types.get(typename)
    }

    /// Resolves a type reference (a registered alias or a type name) to the type name.
    pub fn resolve_reference(&self, reference: &str) -> Option<&str> {
        match self.references.get(reference) {
            Some(name) => Some(name.as_str()),
            None => self
                .types
                .get_key_value(reference)
                .map(|(name, _)| name.as_str()),
        }
    }

    /// The registered types, in registration order.
    pub fn types(&self) -> impl Iterator<Item = &NodeTypeDescriptor> {
        self.types.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> LoaderStrategy {
        LoaderStrategy::single(FnLoader::new(|_id: String, _context: Context| async {
            Ok::<_, BoxError>(None)
        }))
    }

    #[test]
    fn registers_and_resolves_references() {
        let mut registry = NodeRegistry::new();
        registry
            .register(
                NodeTypeDescriptor::builder()
                    .name("User")
                    .loader(loader())
                    .references(vec!["UserModel".to_string()])
                    .build(),
            )
            .unwrap();

        assert_eq!(registry.get("User").unwrap().name(), "User");
        assert!(registry.get("User").unwrap().loader().unwrap().is_cached());
        assert_eq!(registry.resolve_reference("UserModel"), Some("User"));
        assert_eq!(registry.resolve_reference("User"), Some("User"));
        assert_eq!(registry.resolve_reference("Post"), None);
    }

    #[test]
    fn rejects_invalid_type_names() {
        let mut registry = NodeRegistry::new();
        assert_eq!(
            registry.register(NodeTypeDescriptor::builder().name("").build()),
            Err(RegistryError::EmptyTypeName)
        );
        assert_eq!(
            registry.register(NodeTypeDescriptor::builder().name("Bad:Name").build()),
            Err(RegistryError::DelimiterInTypeName("Bad:Name".to_string()))
        );
    }

    #[test]
    fn rejects_duplicates() {
        let mut registry = NodeRegistry::new();
        registry
            .register(
                NodeTypeDescriptor::builder()
                    .name("User")
                    .references(vec!["Account".to_string()])
                    .build(),
            )
            .unwrap();
        assert_eq!(
            registry.register(NodeTypeDescriptor::builder().name("User").build()),
            Err(RegistryError::DuplicateType("User".to_string()))
        );
        assert_eq!(
            registry.register(
                NodeTypeDescriptor::builder()
                    .name("Admin")
                    .references(vec!["Account".to_string()])
                    .build()
            ),
            Err(RegistryError::DuplicateReference {
                reference: "Account".to_string(),
                bound_to: "User".to_string(),
            })
        );
        assert!(registry.get("Admin").is_none());
    }

    #[test]
    fn is_type_of_defaults_to_false() {
        let plain = NodeTypeDescriptor::builder().name("User").build();
        let checked = NodeTypeDescriptor::builder()
            .name("Post")
            .build()
            .with_is_type_of(|value| value.get("title").is_some());

        let post = serde_json::json!({ "title": "hello" });
        assert!(!plain.is_type_of(&post));
        assert!(checked.is_type_of(&post));
    }
}
