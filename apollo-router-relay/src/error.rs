//! Errors raised by the relay layer and their GraphQL representation.

use displaydoc::Display;
use heck::ToShoutySnakeCase;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;

/// Error types for relay node, connection and mutation resolution.
///
/// Errors are cloneable because a single in-flight node load is shared by every resolver
/// waiting on the same identifier.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[ignore_extra_doc_attributes]
pub enum RelayError {
    /// Invalid global ID: {id}
    InvalidIdentifier {
        /// The opaque identifier that could not be decoded.
        id: String,
    },

    /// Type '{typename}' does not support loading by id
    UnsupportedNodeType {
        /// The decoded type name.
        typename: String,
    },

    /// Could not resolve the concrete type of a node: {reason}
    TypeResolutionFailure {
        /// Why the fallback resolver failed.
        reason: String,
    },

    /// No client mutation id was recorded for the mutation at '{key}'
    ///
    /// The payload field must be resolved exactly one level below the mutation field it
    /// belongs to.
    CorrelationKeyMissing {
        /// The correlation key that was looked up.
        key: String,
    },

    /// Loading '{typename}' nodes failed: {reason}
    LoadFailed {
        /// The type whose loader failed.
        typename: String,

        /// The error returned by the loader.
        reason: String,
    },

    /// Cannot return null for non-nullable field '{field}'
    NullabilityViolation {
        /// The connection field that would have been null.
        field: String,
    },

    /// Invalid pagination argument '{name}': {reason}
    InvalidPaginationArgument {
        /// The argument name.
        name: String,

        /// Why the value was rejected.
        reason: String,
    },

    /// Invalid mutation input: {reason}
    InvalidMutationInput {
        /// Why the input was rejected.
        reason: String,
    },

    /// Mutation failed: {reason}
    MutationFailed {
        /// The error returned by the mutation resolver.
        reason: String,
    },
}

impl RelayError {
    /// The `extensions.code` used when this error is reported to a client.
    pub fn code(&self) -> String {
        let name = match self {
            RelayError::InvalidIdentifier { .. } => "InvalidIdentifier",
            RelayError::UnsupportedNodeType { .. } => "UnsupportedNodeType",
            RelayError::TypeResolutionFailure { .. } => "TypeResolutionFailure",
            RelayError::CorrelationKeyMissing { .. } => "CorrelationKeyMissing",
            RelayError::LoadFailed { .. } => "LoadFailed",
            RelayError::NullabilityViolation { .. } => "NullabilityViolation",
            RelayError::InvalidPaginationArgument { .. } => "InvalidPaginationArgument",
            RelayError::InvalidMutationInput { .. } => "InvalidMutationInput",
            RelayError::MutationFailed { .. } => "MutationFailed",
        };
        name.to_shouty_snake_case()
    }

    /// Convert the relay error to a GraphQL error attached to `path`.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        let mut error = Error::builder().message(self.to_string()).build();
        error.path = path;
        error.set_extension_code(self.code());
        error
    }
}

/// Errors detected while registering node types.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
pub enum RegistryError {
    /// Node type names must not be empty
    EmptyTypeName,

    /// Type name '{0}' contains the global ID delimiter ':'
    DelimiterInTypeName(String),

    /// Type '{0}' is already registered
    DuplicateType(String),

    /// Type reference '{reference}' is already bound to '{bound_to}'
    DuplicateReference {
        /// The reference alias.
        reference: String,

        /// The type the alias already resolves to.
        bound_to: String,
    },
}

/// Errors while loading [`crate::RelayConfiguration`].
#[derive(Error, Display, Debug)]
pub enum ConfigurationError {
    /// Could not deserialize relay configuration: {0}
    Deserialize(#[from] serde_yaml::Error),
}

/// A location in the request that triggered a graphql error.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// The line number.
    pub line: u32,

    /// The column number.
    pub column: u32,
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors) as reported in the
/// `errors` list of a response.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase", default)]
pub struct Error {
    /// The error message.
    #[builder(setter(into))]
    pub message: String,

    /// The locations of the error in the GraphQL document of the originating request.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub locations: Vec<Location>,

    /// If this is a field error, the path to that field in the response data.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub path: Option<Path>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    #[builder(default)]
    pub extensions: Object,
}

impl Error {
    /// Sets `extensions.code` unless the extensions already carry one.
    pub fn set_extension_code(&mut self, code: impl Into<String>) {
        self.extensions
            .entry("code")
            .or_insert_with(|| Value::String(code.into()));
    }

    /// Extract the error code from [`Error::extensions`] if it is set.
    pub fn extension_code(&self) -> Option<String> {
        self.extensions
            .get("code")
            .and_then(|code| code.as_str())
            .map(str::to_string)
    }
}
