//! Relay configuration.
//!
//! ```yaml
//! client_mutation_id: optional
//! brand_loaded_objects: true
//! nodes_on_connection: true
//! edges_nullable:
//!   list: false
//!   items: false
//! ```

use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigurationError;

/// How the `clientMutationId` correlation token is handled on relay mutations.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClientMutationId {
    /// No `clientMutationId` field on inputs or payloads.
    Omit,
    /// The input field is nullable and the payload echoes null when it was not supplied.
    Optional,
    /// Every mutation input must carry a `clientMutationId`.
    #[default]
    Required,
}

/// Nullability of a connection's `edges` field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct EdgesNullability {
    /// Whether the `edges` list itself may be null.
    pub list: bool,
    /// Whether individual edges may be null.
    pub items: bool,
}

impl Default for EdgesNullability {
    fn default() -> Self {
        Self {
            list: false,
            items: true,
        }
    }
}

/// Configuration of the relay layer.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct RelayConfiguration {
    /// Handling of the mutation correlation token.
    pub client_mutation_id: ClientMutationId,

    /// Record the owning type of every object returned by a node loader, so that
    /// resolving the `Node` interface does not have to inspect the object.
    /// Node types may override this individually.
    pub brand_loaded_objects: bool,

    /// Expose a flattened `nodes` list on connections in addition to `edges`.
    pub nodes_on_connection: bool,

    /// Nullability of the `edges` field of connections.
    pub edges_nullable: EdgesNullability,

    /// Whether `node` may be null within an edge.
    pub node_nullable: bool,

    /// The field holding the global ID on node types.
    pub id_field_name: String,

    /// The scalar type used for cursors.
    pub cursor_type: String,
}

impl Default for RelayConfiguration {
    fn default() -> Self {
        Self {
            client_mutation_id: ClientMutationId::default(),
            brand_loaded_objects: false,
            nodes_on_connection: false,
            edges_nullable: EdgesNullability::default(),
            node_nullable: false,
            id_field_name: "id".to_string(),
            cursor_type: "String".to_string(),
        }
    }
}

impl RelayConfiguration {
    /// Parse the configuration from YAML. Missing keys take their default value.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigurationError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let configuration: Self = serde_yaml::from_str(raw)?;
        tracing::debug!(?configuration, "loaded relay configuration");
        Ok(configuration)
    }

    /// The JSON schema of the configuration, for editor support and validation tooling.
    pub fn json_schema() -> RootSchema {
        schemars::schema_for!(RelayConfiguration)
    }
}
