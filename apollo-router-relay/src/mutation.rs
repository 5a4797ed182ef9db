//! Relay mutations and `clientMutationId` correlation.
//!
//! The token supplied in a mutation's input is recorded under the execution path of the
//! mutation field before the mutation runs. The payload's `clientMutationId` field sits one
//! level below that field, so it reads the token back under the parent of its own path.
//! Aliased sibling mutations have distinct paths and never see each other's token.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tower::BoxError;

use crate::configuration::ClientMutationId;
use crate::context::Context;
use crate::error::RelayError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;

pub(crate) const CLIENT_MUTATION_ID_FIELD: &str = "clientMutationId";
const DEFAULT_ARG_NAME: &str = "input";

/// Correlation tokens of one request, keyed by mutation field path.
#[derive(Clone, Default)]
pub struct MutationIdCache {
    entries: Arc<Mutex<HashMap<Path, Option<String>>>>,
}

impl MutationIdCache {
    pub fn of(context: &Context) -> MutationIdCache {
        context.get_or_insert_with(MutationIdCache::default)
    }

    fn insert(&self, key: Path, token: Option<String>) {
        self.entries.lock().insert(key, token);
    }

    fn get(&self, key: &Path) -> Option<Option<String>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for MutationIdCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationIdCache")
            .field("entries", &self.len())
            .finish()
    }
}

/// Records and returns correlation tokens according to the configured mode.
#[derive(Clone, Copy, Debug)]
pub struct MutationCorrelator {
    mode: ClientMutationId,
}

impl MutationCorrelator {
    pub fn new(mode: ClientMutationId) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ClientMutationId {
        self.mode
    }

    /// Records `token` for the mutation field at `field_path`.
    ///
    /// Fails when the mode requires a token and none was supplied. Does nothing when tokens
    /// are omitted.
    pub fn begin(
        &self,
        context: &Context,
        field_path: &Path,
        token: Option<String>,
    ) -> Result<(), RelayError> {
        match (self.mode, token) {
            (ClientMutationId::Omit, _) => Ok(()),
            (ClientMutationId::Required, None) => Err(RelayError::InvalidMutationInput {
                reason: format!("'{CLIENT_MUTATION_ID_FIELD}' is required"),
            }),
            (_, token) => {
                MutationIdCache::of(context).insert(field_path.clone(), token);
                Ok(())
            }
        }
    }

    /// The token echoed by the payload field at `field_path`.
    ///
    /// `field_path` is the path of the payload's `clientMutationId` field; the token is
    /// looked up under its parent, the mutation field. Always `None` when tokens are omitted.
    pub fn client_mutation_id(
        &self,
        context: &Context,
        field_path: &Path,
    ) -> Result<Option<String>, RelayError> {
        if self.mode == ClientMutationId::Omit {
            return Ok(None);
        }
        let key = field_path.parent().unwrap_or_default();
        context
            .get::<MutationIdCache>()
            .and_then(|cache| cache.get(&key))
            .ok_or_else(|| RelayError::CorrelationKeyMissing {
                key: key.to_string(),
            })
    }
}

/// The mutation logic wrapped by a [`RelayMutationField`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MutationResolver: Send + Sync + 'static {
    /// Runs the mutation with the value of the input argument and returns the payload.
    async fn resolve(&self, input: Object, context: Context) -> Result<Value, BoxError>;
}

#[async_trait]
impl<F, Fut> MutationResolver for F
where
    F: Fn(Object, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
{
    async fn resolve(&self, input: Object, context: Context) -> Result<Value, BoxError> {
        (self)(input, context).await
    }
}

/// A mutation field following the relay input/payload convention.
///
/// The field takes one input object argument (`input` by default) of type `<Name>Input` and
/// returns `<Name>Payload`, where `<Name>` is the field name in upper camel case. Unless
/// tokens are omitted, both types carry a `clientMutationId` field.
#[derive(Clone)]
pub struct RelayMutationField {
    field_name: String,
    input_type_name: String,
    payload_type_name: String,
    arg_name: String,
    correlator: MutationCorrelator,
    resolver: Arc<dyn MutationResolver>,
}

impl fmt::Debug for RelayMutationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayMutationField")
            .field("field_name", &self.field_name)
            .field("input_type_name", &self.input_type_name)
            .field("payload_type_name", &self.payload_type_name)
            .field("arg_name", &self.arg_name)
            .field("correlator", &self.correlator)
            .finish()
    }
}

impl RelayMutationField {
    pub fn new(
        field_name: impl Into<String>,
        mode: ClientMutationId,
        resolver: impl MutationResolver,
    ) -> Self {
        let field_name = field_name.into();
        let base = capitalize(&field_name);
        Self {
            input_type_name: format!("{base}Input"),
            payload_type_name: format!("{base}Payload"),
            field_name,
            arg_name: DEFAULT_ARG_NAME.to_string(),
            correlator: MutationCorrelator::new(mode),
            resolver: Arc::new(resolver),
        }
    }

    pub fn with_input_type_name(mut self, name: impl Into<String>) -> Self {
        self.input_type_name = name.into();
        self
    }

    pub fn with_payload_type_name(mut self, name: impl Into<String>) -> Self {
        self.payload_type_name = name.into();
        self
    }

    pub fn with_arg_name(mut self, name: impl Into<String>) -> Self {
        self.arg_name = name.into();
        self
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn input_type_name(&self) -> &str {
        &self.input_type_name
    }

    pub fn payload_type_name(&self) -> &str {
        &self.payload_type_name
    }

    pub fn arg_name(&self) -> &str {
        &self.arg_name
    }

    /// Type reference of `clientMutationId` on the input type, `None` when omitted.
    pub fn input_client_mutation_id_type_ref(&self) -> Option<&'static str> {
        match self.correlator.mode() {
            ClientMutationId::Omit => None,
            ClientMutationId::Optional => Some("ID"),
            ClientMutationId::Required => Some("ID!"),
        }
    }

    /// Type reference of `clientMutationId` on the payload type, `None` when omitted.
    pub fn payload_client_mutation_id_type_ref(&self) -> Option<&'static str> {
        self.input_client_mutation_id_type_ref()
    }

    /// Resolves the mutation field at `path` with its field `arguments`.
    #[tracing::instrument(skip_all, level = "debug", name = "relay.mutation", fields(field = %self.field_name, path = %path))]
    pub async fn resolve(
        &self,
        context: &Context,
        path: &Path,
        arguments: &Object,
    ) -> Result<Value, RelayError> {
        let input = match arguments.get(&self.arg_name) {
            Some(Value::Object(input)) => input.clone(),
            Some(_) => {
                return Err(RelayError::InvalidMutationInput {
                    reason: format!("argument '{}' must be an input object", self.arg_name),
                });
            }
            None => {
                return Err(RelayError::InvalidMutationInput {
                    reason: format!("missing argument '{}'", self.arg_name),
                });
            }
        };

        if self.correlator.mode() != ClientMutationId::Omit {
            let token = client_mutation_id_of(&input)?;
            self.correlator.begin(context, path, token)?;
        }

        self.resolver
            .resolve(input, context.clone())
            .await
            .map_err(|error| {
                tracing::debug!(%error, "mutation resolver failed");
                RelayError::MutationFailed {
                    reason: error.to_string(),
                }
            })
    }

    /// Resolves the payload's `clientMutationId` field at `path`.
    pub fn resolve_client_mutation_id(
        &self,
        context: &Context,
        path: &Path,
    ) -> Result<Value, RelayError> {
        Ok(self
            .correlator
            .client_mutation_id(context, path)?
            .map(Value::String)
            .unwrap_or(Value::Null))
    }
}

/// `clientMutationId` is an `ID`: strings and integers are accepted, integers are
/// normalised to their decimal representation.
/// Uppercases the first character only: `create_user` gives `Create_user`.
fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

fn client_mutation_id_of(input: &Object) -> Result<Option<String>, RelayError> {
    match input.get(CLIENT_MUTATION_ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(token)) => Ok(Some(token.clone())),
        Some(Value::Number(number)) if number.is_i64() || number.is_u64() => {
            Ok(Some(number.to_string()))
        }
        Some(_) => Err(RelayError::InvalidMutationInput {
            reason: format!("'{CLIENT_MUTATION_ID_FIELD}' must be a string or an integer"),
        }),
    }
}
