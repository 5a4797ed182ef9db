//! Entry point used by schema resolvers.

use std::sync::Arc;

use crate::configuration::RelayConfiguration;
use crate::connection::ConnectionBuilder;
use crate::connection::ConnectionField;
use crate::connection::ConnectionOptions;
use crate::context::Context;
use crate::error::Error;
use crate::error::RelayError;
use crate::global_id::Base64GlobalIdCodec;
use crate::global_id::GlobalId;
use crate::global_id::GlobalIdCodec;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::mutation::MutationResolver;
use crate::mutation::RelayMutationField;
use crate::node_loader::NodeLoader;
use crate::registry::NodeRegistry;
use crate::registry::NodeValue;
use crate::type_resolver::DefaultTypeResolver;
use crate::type_resolver::StructuralTypeResolver;
use crate::type_resolver::TypeResolver;

/// The result of the `nodes` field: one slot per requested id, and one error per slot
/// that could not be resolved.
#[derive(Clone, Debug, Default)]
pub struct Nodes {
    pub nodes: Vec<Option<NodeValue>>,
    pub errors: Vec<Error>,
}

/// Relay support for one schema.
///
/// A `Relay` is built once and shared by all requests; per-request state lives in the
/// [`Context`] passed to each call.
#[derive(Clone, Debug)]
pub struct Relay {
    configuration: Arc<RelayConfiguration>,
    registry: Arc<NodeRegistry>,
    codec: Arc<dyn GlobalIdCodec>,
    loader: NodeLoader,
    type_resolver: TypeResolver,
    connection_fields: Vec<ConnectionField>,
}

impl Relay {
    pub fn new(configuration: RelayConfiguration, registry: NodeRegistry) -> Self {
        let registry = Arc::new(registry);
        Self {
            loader: NodeLoader::new(registry.clone(), configuration.brand_loaded_objects),
            type_resolver: TypeResolver::new(registry.clone(), Arc::new(StructuralTypeResolver)),
            codec: Arc::new(Base64GlobalIdCodec),
            configuration: Arc::new(configuration),
            registry,
            connection_fields: Vec::new(),
        }
    }

    /// Adds a field to every connection type built by [`connection_builder`](Self::connection_builder).
    pub fn with_connection_field(mut self, field: ConnectionField) -> Self {
        self.connection_fields.push(field);
        self
    }

    /// Replaces the global ID codec.
    pub fn with_codec(mut self, codec: impl GlobalIdCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Replaces the type resolution used when a value carries no type information.
    pub fn with_default_type_resolver(
        mut self,
        fallback: impl DefaultTypeResolver + 'static,
    ) -> Self {
        self.type_resolver = TypeResolver::new(self.registry.clone(), Arc::new(fallback));
        self
    }

    pub fn configuration(&self) -> &RelayConfiguration {
        &self.configuration
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn loader(&self) -> &NodeLoader {
        &self.loader
    }

    pub fn type_resolver(&self) -> &TypeResolver {
        &self.type_resolver
    }

    pub fn encode(&self, typename: &str, id: &str) -> String {
        self.codec.encode(typename, id)
    }

    pub fn decode(&self, global_id: &str) -> Result<GlobalId, RelayError> {
        self.codec.decode(global_id)
    }

    /// Decodes the global ID arguments of a field in place, before its resolver runs.
    ///
    /// Each path names an argument, followed by the input object fields leading to the id.
    /// Lists are decoded element by element at any level, and null values are kept. A decoded
    /// id becomes `{ "typename": .., "id": .. }`, which deserializes as a [`GlobalId`].
    ///
    /// Every id that fails to decode is reported with its location in the arguments; the
    /// other ids are still decoded.
    pub fn decode_arguments(
        &self,
        arguments: &mut Object,
        global_id_arguments: &[Path],
    ) -> Result<(), Vec<(Path, RelayError)>> {
        let mut errors = Vec::new();
        for path in global_id_arguments {
            let Some((PathElement::Key(name), rest)) = path.0.split_first() else {
                continue;
            };
            if let Some(value) = arguments.get_mut(name) {
                self.decode_argument(value, rest, Path::from_keys([name.as_str()]), &mut errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            tracing::debug!(failed = errors.len(), "invalid global id arguments");
            Err(errors)
        }
    }

    fn decode_argument(
        &self,
        value: &mut Value,
        path: &[PathElement],
        location: Path,
        errors: &mut Vec<(Path, RelayError)>,
    ) {
        match (value, path.split_first()) {
            (Value::Null, _) => {}
            (Value::Array(items), Some((PathElement::Index(index), rest))) => {
                if let Some(item) = items.get_mut(*index) {
                    self.decode_argument(item, rest, location.join_index(*index), errors);
                }
            }
            (Value::Array(items), _) => {
                for (index, item) in items.iter_mut().enumerate() {
                    self.decode_argument(item, path, location.join_index(index), errors);
                }
            }
            (Value::Object(fields), Some((PathElement::Key(key), rest))) => {
                if let Some(field) = fields.get_mut(key) {
                    self.decode_argument(field, rest, location.join_key(key.as_str()), errors);
                }
            }
            (value, None) => {
                let decoded = match &*value {
                    Value::String(global_id) => self.decode(global_id),
                    other => self.decode(&other.to_string()),
                };
                match decoded {
                    Ok(GlobalId { typename, id }) => {
                        *value = serde_json::json!({ "typename": typename, "id": id });
                    }
                    Err(error) => errors.push((location, error)),
                }
            }
            // The path does not match the shape of the value.
            _ => {}
        }
    }

    /// Resolves the `id` field of an object of type `typename`.
    ///
    /// The local id is read from the type's id field, or the configured `id_field_name`.
    /// String and integer ids are accepted.
    pub fn global_id_of(&self, typename: &str, value: &Value) -> Result<String, RelayError> {
        let field = self
            .registry
            .get(typename)
            .and_then(|descriptor| descriptor.id_field.as_deref())
            .unwrap_or(&self.configuration.id_field_name);

        let id = match value.get(field) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) if id.is_i64() || id.is_u64() => id.to_string(),
            other => {
                return Err(RelayError::InvalidIdentifier {
                    id: other.map_or_else(|| "null".to_string(), Value::to_string),
                });
            }
        };
        Ok(self.codec.encode(typename, &id))
    }

    /// Resolves the concrete type of a `Node` value.
    pub fn resolve_type(&self, context: &Context, value: &NodeValue) -> Result<String, RelayError> {
        self.type_resolver.resolve_type(context, value)
    }

    /// Resolves the `node(id:)` field at `path`.
    pub async fn node(
        &self,
        context: &Context,
        path: &Path,
        global_id: &str,
    ) -> Result<Option<NodeValue>, Error> {
        let global_id = self
            .decode(global_id)
            .map_err(|error| error.to_graphql_error(Some(path.clone())))?;
        self.loader
            .resolve_by_id(context, &global_id)
            .await
            .map_err(|error| error.to_graphql_error(Some(path.clone())))
    }

    /// Resolves the `nodes(ids:)` field at `path`.
    ///
    /// A failing id produces a null slot and an error at `path` + its index; the other ids
    /// are unaffected.
    #[tracing::instrument(skip_all, level = "debug", name = "relay.nodes", fields(path = %path, count = global_ids.len()))]
    pub async fn nodes<S: AsRef<str>>(
        &self,
        context: &Context,
        path: &Path,
        global_ids: &[S],
    ) -> Nodes {
        let mut errors = Vec::new();
        let decoded: Vec<Option<GlobalId>> = global_ids
            .iter()
            .enumerate()
            .map(|(index, global_id)| match self.decode(global_id.as_ref()) {
                Ok(global_id) => Some(global_id),
                Err(error) => {
                    errors.push((index, error));
                    None
                }
            })
            .collect();

        let mut nodes = Vec::with_capacity(decoded.len());
        for (index, result) in self
            .loader
            .resolve_by_ids(context, &decoded)
            .await
            .into_iter()
            .enumerate()
        {
            match result {
                Ok(node) => nodes.push(node),
                Err(error) => {
                    errors.push((index, error));
                    nodes.push(None);
                }
            }
        }

        errors.sort_by_key(|(index, _)| *index);
        let errors: Vec<Error> = errors
            .into_iter()
            .map(|(index, error)| error.to_graphql_error(Some(path.join_index(index))))
            .collect();
        if !errors.is_empty() {
            tracing::debug!(failed = errors.len(), "some nodes could not be resolved");
        }

        Nodes { nodes, errors }
    }

    /// A builder for the connection type `name` over `node_type`, with the configured
    /// nullability and the fields shared by all connections.
    pub fn connection_builder(
        &self,
        name: impl Into<String>,
        node_type: impl Into<String>,
    ) -> ConnectionBuilder {
        self.connection_fields.iter().cloned().fold(
            ConnectionBuilder::new(
                name,
                node_type,
                ConnectionOptions::from(self.configuration.as_ref()),
            ),
            ConnectionBuilder::with_field,
        )
    }

    /// A relay mutation field using the configured `clientMutationId` handling.
    pub fn mutation_field(
        &self,
        field_name: impl Into<String>,
        resolver: impl MutationResolver,
    ) -> RelayMutationField {
        RelayMutationField::new(
            field_name,
            self.configuration.client_mutation_id,
            resolver,
        )
    }
}
