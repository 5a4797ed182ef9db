//! Batched, request-cached loading of nodes by global ID.
//!
//! Identifiers are grouped by type and dispatched to the loading strategy registered for
//! each type. Cached strategies publish one shared future per id in the [`RequestCache`]
//! before anything is awaited, so every lookup issued while a fetch is in flight, by this
//! resolver or a sibling, joins that fetch instead of starting another one.


use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use futures::future::join_all;
use indexmap::IndexMap;
use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::context::Context;
use crate::error::RelayError;
use crate::global_id::GlobalId;
use crate::global_id::cache_key;
use crate::registry::LoaderStrategy;
use crate::registry::NodeRegistry;
use crate::registry::NodeValue;
use crate::type_resolver::TypeBrands;

/// The outcome of loading one node: `Ok(None)` when no object exists for the id.
pub type NodeResult = Result<Option<NodeValue>, RelayError>;

type SharedLoad = Shared<BoxFuture<'static, NodeResult>>;

/// Node loads of one request, keyed by `{typename}:{id}`.
///
/// An entry is a possibly still pending load; once settled it keeps its result for the rest
/// of the request. The cache lives in the request [`Context`] and is dropped with it.
#[derive(Clone, Default)]
pub struct RequestCache {
    entries: Arc<Mutex<HashMap<String, SharedLoad>>>,
}

impl RequestCache {
    /// The cache of the request, created on first access.
    pub fn of(context: &Context) -> RequestCache {
        context.get_or_insert_with(RequestCache::default)
    }

    pub fn contains(&self, typename: &str, id: &str) -> bool {
        self.entries.lock().contains_key(&cache_key(typename, id))
    }

    /// The result of a settled load, or `None` if the load is unknown or still in flight.
    pub fn peek(&self, typename: &str, id: &str) -> Option<NodeResult> {
        self.entries
            .lock()
            .get(&cache_key(typename, id))
            .and_then(|load| load.peek().cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCache")
            .field("entries", &self.len())
            .finish()
    }
}

/// Loads nodes of any registered type by global ID.
#[derive(Clone, Debug)]
pub struct NodeLoader {
    registry: Arc<NodeRegistry>,
    brand_loaded_objects: bool,
}

impl NodeLoader {
    /// `brand_loaded_objects` applies to types that do not set their own preference.
    pub fn new(registry: Arc<NodeRegistry>, brand_loaded_objects: bool) -> Self {
        Self {
            registry,
            brand_loaded_objects,
        }
    }

    /// Loads one node.
    pub async fn resolve_by_id(&self, context: &Context, global_id: &GlobalId) -> NodeResult {
        self.resolve_by_ids(context, &[Some(global_id.clone())])
            .await
            .pop()
            .unwrap_or(Ok(None))
    }

    /// Loads the nodes identified by `global_ids`.
    ///
    /// The result has one entry per input, in input order: `Ok(None)` for a `None` input or
    /// an id with no object behind it, an error for ids whose type cannot be loaded or whose
    /// loader failed. Errors are per id; they never affect ids of other types.
    #[tracing::instrument(skip_all, level = "debug", name = "relay.resolve_nodes", fields(count = global_ids.len()))]
    pub async fn resolve_by_ids(
        &self,
        context: &Context,
        global_ids: &[Option<GlobalId>],
    ) -> Vec<NodeResult> {
        let cache = RequestCache::of(context);
        let mut pending: IndexMap<String, SharedLoad> = IndexMap::new();

        // Cache lookups and cache writes happen in one critical section, before any load is
        // polled: concurrent lookups either see the in-flight entry or create it.
        {
            let mut entries = cache.entries.lock();
            let mut ids_by_type: IndexMap<&str, IndexSet<&str>> = IndexMap::new();

            for global_id in global_ids.iter().flatten() {
                let key = global_id.cache_key();
                if pending.contains_key(&key) {
                    continue;
                }
                if let Some(load) = entries.get(&key) {
                    tracing::trace!(%key, "node request cache hit");
                    pending.insert(key, load.clone());
                    continue;
                }
                ids_by_type
                    .entry(global_id.typename.as_str())
                    .or_default()
                    .insert(global_id.id.as_str());
            }

            for (typename, ids) in ids_by_type {
                let ids: Vec<String> = ids.into_iter().map(str::to_string).collect();
                let (cached, loads) = self.dispatch(context, typename, ids);
                for (id, load) in loads {
                    let key = cache_key(typename, &id);
                    if cached {
                        entries.insert(key.clone(), load.clone());
                    }
                    pending.insert(key, load);
                }
            }
        }

        let keys: Vec<String> = pending.keys().cloned().collect();
        let results: HashMap<String, NodeResult> = keys
            .into_iter()
            .zip(join_all(pending.into_values()).await)
            .collect();

        global_ids
            .iter()
            .map(|global_id| match global_id {
                Some(global_id) => results
                    .get(&global_id.cache_key())
                    .cloned()
                    .unwrap_or(Ok(None)),
                None => Ok(None),
            })
            .collect()
    }

    /// Creates the loads for `ids` of one type. Returns whether they belong in the cache.
    fn dispatch(
        &self,
        context: &Context,
        typename: &str,
        ids: Vec<String>,
    ) -> (bool, Vec<(String, SharedLoad)>) {
        let Some(descriptor) = self.registry.get(typename) else {
            tracing::debug!(%typename, "global ID refers to an unregistered type");
            return (false, unsupported(typename, ids));
        };
        let Some(loader) = descriptor.loader() else {
            return (false, unsupported(typename, ids));
        };

        let brands = descriptor
            .brand_loaded_objects
            .unwrap_or(self.brand_loaded_objects)
            .then(|| TypeBrands::of(context));

        let loads: Vec<(String, SharedLoad)> = match loader {
            LoaderStrategy::Batched(loader) | LoaderStrategy::BatchedUncached(loader) => {
                let batch = {
                    let loader = loader.clone();
                    let ids = ids.clone();
                    let context = context.clone();
                    let typename = typename.to_string();
                    async move {
                        tracing::debug!(%typename, count = ids.len(), "loading nodes in batch");
                        let values = loader.load_many(&ids, &context).await.map_err(|error| {
                            RelayError::LoadFailed {
                                typename: typename.clone(),
                                reason: error.to_string(),
                            }
                        })?;
                        if values.len() != ids.len() {
                            tracing::warn!(
                                %typename,
                                requested = ids.len(),
                                returned = values.len(),
                                "batched node loader returned a different number of results than requested"
                            );
                        }
                        Ok::<_, RelayError>(Arc::new(
                            values
                                .into_iter()
                                .map(|value| value.map(Arc::new))
                                .collect::<Vec<_>>(),
                        ))
                    }
                    .boxed()
                    .shared()
                };

                ids.into_iter()
                    .enumerate()
                    .map(|(index, id)| {
                        let batch = batch.clone();
                        let brands = brands.clone();
                        let typename = typename.to_string();
                        let load: SharedLoad = async move {
                            let value = batch.await?.get(index).cloned().flatten();
                            brand(brands.as_ref(), value.as_ref(), &typename);
                            Ok::<_, RelayError>(value)
                        }
                        .boxed()
                        .shared();
                        (id, load)
                    })
                    .collect()
            }
            LoaderStrategy::Single(loader) | LoaderStrategy::SingleUncached(loader) => ids
                .into_iter()
                .map(|id| {
                    let loader = loader.clone();
                    let context = context.clone();
                    let brands = brands.clone();
                    let typename = typename.to_string();
                    let requested = id.clone();
                    let load: SharedLoad = async move {
                        tracing::debug!(%typename, id = %requested, "loading node");
                        let value = loader
                            .load_one(&requested, &context)
                            .await
                            .map_err(|error| RelayError::LoadFailed {
                                typename: typename.clone(),
                                reason: error.to_string(),
                            })?
                            .map(Arc::new);
                        brand(brands.as_ref(), value.as_ref(), &typename);
                        Ok::<_, RelayError>(value)
                    }
                    .boxed()
                    .shared();
                    (id, load)
                })
                .collect(),
        };

        (loader.is_cached(), loads)
    }
}

fn brand(brands: Option<&TypeBrands>, value: Option<&NodeValue>, typename: &str) {
    if let (Some(brands), Some(value)) = (brands, value) {
        brands.brand(value, typename);
    }
}

fn unsupported(typename: &str, ids: Vec<String>) -> Vec<(String, SharedLoad)> {
    let error = RelayError::UnsupportedNodeType {
        typename: typename.to_string(),
    };
    ids.into_iter()
        .map(|id| {
            let load: SharedLoad = futures::future::ready(Err(error.clone())).boxed().shared();
            (id, load)
        })
        .collect()
}
