//! Resolution of the concrete type of a `Node` value.
//!
//! Strategies are tried in order, first match wins:
//! 1. the brand recorded by the node loader for this exact object,
//! 2. a `__typename` field on the value,
//! 3. a `__type` field holding a reference registered for a node type,
//! 4. the fallback resolver supplied by the execution engine.
//!
//! A strategy that cannot make sense of the value (wrong JSON type, unknown reference)
//! falls through to the next one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;

use crate::context::Context;
use crate::error::RelayError;
use crate::json_ext::Value;
use crate::registry::NodeRegistry;
use crate::registry::NodeValue;

pub(crate) const TYPENAME_FIELD: &str = "__typename";
pub(crate) const TYPE_REFERENCE_FIELD: &str = "__type";

/// Owning type of loaded objects, keyed by object identity.
///
/// Domain objects are never modified: the brand lives in this side table, which is stored
/// in the request [`Context`]. Each entry holds a weak reference to its object, which keeps
/// the allocation (and therefore the address used as key) from being reused while the
/// entry exists.
#[derive(Clone, Default)]
pub struct TypeBrands {
    entries: Arc<Mutex<HashMap<usize, (Weak<Value>, String)>>>,
}

impl TypeBrands {
    /// The brands of the request.
    pub fn of(context: &Context) -> TypeBrands {
        context.get_or_insert_with(TypeBrands::default)
    }

    /// Records `typename` as the owning type of `value`.
    pub fn brand(&self, value: &NodeValue, typename: &str) {
        self.entries.lock().insert(
            Arc::as_ptr(value) as usize,
            (Arc::downgrade(value), typename.to_string()),
        );
    }

    /// The brand of this exact object, if any.
    pub fn get(&self, value: &NodeValue) -> Option<String> {
        let entries = self.entries.lock();
        entries
            .get(&(Arc::as_ptr(value) as usize))
            .filter(|(weak, _)| weak.as_ptr() == Arc::as_ptr(value))
            .map(|(_, typename)| typename.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for TypeBrands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeBrands")
            .field("entries", &self.len())
            .finish()
    }
}

/// The execution engine's own type resolution, used when the value does not identify its
/// type through any relay convention.
pub trait DefaultTypeResolver: Send + Sync {
    fn resolve_type(&self, value: &Value, registry: &NodeRegistry) -> Result<String, RelayError>;
}

/// Picks the first registered node type whose `is_type_of` check accepts the value.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructuralTypeResolver;

impl DefaultTypeResolver for StructuralTypeResolver {
    fn resolve_type(&self, value: &Value, registry: &NodeRegistry) -> Result<String, RelayError> {
        registry
            .types()
            .find(|descriptor| descriptor.is_type_of(value))
            .map(|descriptor| descriptor.name().to_string())
            .ok_or_else(|| RelayError::TypeResolutionFailure {
                reason: if value.is_null() {
                    "the value is null".to_string()
                } else {
                    "no registered node type accepts the value".to_string()
                },
            })
    }
}

/// Resolves the `Node` interface to concrete object types.
#[derive(Clone)]
pub struct TypeResolver {
    registry: Arc<NodeRegistry>,
    fallback: Arc<dyn DefaultTypeResolver>,
}

impl fmt::Debug for TypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeResolver")
            .field("registry", &self.registry)
            .finish()
    }
}

impl TypeResolver {
    pub fn new(registry: Arc<NodeRegistry>, fallback: Arc<dyn DefaultTypeResolver>) -> Self {
        Self { registry, fallback }
    }

    /// Returns the schema type name of `value`.
    pub fn resolve_type(&self, context: &Context, value: &NodeValue) -> Result<String, RelayError> {
        if value.is_null() {
            return self.fallback.resolve_type(value, &self.registry);
        }

        if let Some(typename) = self.branded_type(context, value) {
            tracing::trace!(%typename, "resolved node type from brand");
            return Ok(typename);
        }

        if let Some(typename) = value
            .get(TYPENAME_FIELD)
            .and_then(Value::as_str)
            .filter(|typename| !typename.is_empty())
        {
            return Ok(typename.to_string());
        }

        if let Some(typename) = value
            .get(TYPE_REFERENCE_FIELD)
            .and_then(Value::as_str)
            .and_then(|reference| self.registry.resolve_reference(reference))
        {
            return Ok(typename.to_string());
        }

        self.fallback.resolve_type(value, &self.registry)
    }

    fn branded_type(&self, context: &Context, value: &NodeValue) -> Option<String> {
        // Only look: resolving a type must not create request state.
        let brands = context.get::<TypeBrands>()?;
        let brand = brands.get(value)?;
        self.registry
            .resolve_reference(&brand)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::registry::NodeTypeDescriptor;

    fn resolver() -> TypeResolver {
        let mut registry = NodeRegistry::new();
        registry
            .register(
                NodeTypeDescriptor::builder()
                    .name("User")
                    .references(vec!["UserModel".to_string()])
                    .build()
                    .with_is_type_of(|value| value.get("email").is_some()),
            )
            .unwrap();
        registry
            .register(
                NodeTypeDescriptor::builder()
                    .name("Post")
                    .build()
                    .with_is_type_of(|value| value.get("title").is_some()),
            )
            .unwrap();
        TypeResolver::new(Arc::new(registry), Arc::new(StructuralTypeResolver))
    }

    #[test]
    fn brand_wins_over_everything_else() {
        let context = Context::new();
        let value = Arc::new(json!({ "__typename": "Post", "email": "a@b.c" }));
        TypeBrands::of(&context).brand(&value, "User");

        assert_eq!(resolver().resolve_type(&context, &value).unwrap(), "User");
    }

    #[test]
    fn brand_is_keyed_by_identity_not_content() {
        let context = Context::new();
        let branded = Arc::new(json!({ "title": "hello" }));
        let lookalike = Arc::new(json!({ "title": "hello" }));
        TypeBrands::of(&context).brand(&branded, "User");

        assert_eq!(resolver().resolve_type(&context, &branded).unwrap(), "User");
        assert_eq!(resolver().resolve_type(&context, &lookalike).unwrap(), "Post");
    }

    #[test]
    fn brands_do_not_leak_between_requests() {
        let first = Context::new();
        let second = Context::new();
        let value = Arc::new(json!({ "title": "hello" }));
        TypeBrands::of(&first).brand(&value, "User");

        assert_eq!(resolver().resolve_type(&second, &value).unwrap(), "Post");
        assert!(second.get::<TypeBrands>().is_none());
    }

    #[test]
    fn explicit_typename_field() {
        let value = Arc::new(json!({ "__typename": "Comment" }));
        assert_eq!(
            resolver().resolve_type(&Context::new(), &value).unwrap(),
            "Comment"
        );
    }

    #[test]
    fn type_reference_resolves_to_registered_name() {
        let value = Arc::new(json!({ "__type": "UserModel" }));
        assert_eq!(
            resolver().resolve_type(&Context::new(), &value).unwrap(),
            "User"
        );
    }

    #[test]
    fn malformed_markers_fall_through() {
        let value = Arc::new(json!({
            "__typename": 12,
            "__type": "Unknown",
            "title": "structural match"
        }));
        assert_eq!(
            resolver().resolve_type(&Context::new(), &value).unwrap(),
            "Post"
        );
    }

    #[test]
    fn unmatched_value_fails() {
        let error = resolver()
            .resolve_type(&Context::new(), &Arc::new(json!({ "name": "?" })))
            .unwrap_err();
        assert!(matches!(error, RelayError::TypeResolutionFailure { .. }));

        let error = resolver()
            .resolve_type(&Context::new(), &Arc::new(Value::Null))
            .unwrap_err();
        assert_eq!(
            error,
            RelayError::TypeResolutionFailure {
                reason: "the value is null".to_string()
            }
        );
    }
}
