//! Connection, edge and page info shapes for cursor-paginated fields.
//!
//! Pagination itself belongs to the data source: a [`ConnectionBuilder`] receives one page of
//! already ordered items and wraps it, applying the nullability policy of the connection.


use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use serde::Deserialize;
use serde::Serialize;
use typed_builder::TypedBuilder;

use crate::configuration::RelayConfiguration;
use crate::error::RelayError;
use crate::global_id::BASE64;
use crate::json_ext::Object;
use crate::json_ext::Value;

const CONNECTION_SUFFIX: &str = "Connection";
const OFFSET_CURSOR_PREFIX: &str = "OffsetConnection:";

/// Pagination facts of one page.
///
/// Cursors left unset are taken from the first and last edge of the page.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[builder(default)]
    pub has_next_page: bool,
    #[builder(default)]
    pub has_previous_page: bool,
    #[builder(default, setter(strip_option, into))]
    pub start_cursor: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub end_cursor: Option<String>,
}

/// One item of a connection with its cursor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: Option<T>,
    /// Additional fields of the edge type, serialized next to `cursor` and `node`.
    #[serde(flatten, default)]
    pub extra: Object,
}

impl<T> Edge<T> {
    pub fn new(cursor: impl Into<String>, node: T) -> Self {
        Self {
            cursor: cursor.into(),
            node: Some(node),
            extra: Object::new(),
        }
    }

    /// Sets an additional field of the edge.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// A page of a collection.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub page_info: PageInfo,
    pub edges: Option<Vec<Option<Edge<T>>>>,
    /// The nodes of `edges`, without cursors. Only present when enabled for the connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<Option<T>>>,
    /// Additional fields of the connection type, e.g. `totalCount`.
    #[serde(flatten, default)]
    pub extra: Object,
}

/// Computes an additional connection field from the data the page was read from.
pub type ConnectionFieldResolver = Arc<dyn Fn(&Object) -> Value + Send + Sync>;

/// An additional field of a connection type.
#[derive(Clone)]
pub struct ConnectionField {
    name: String,
    type_ref: String,
    resolve: ConnectionFieldResolver,
}

impl ConnectionField {
    pub fn new(
        name: impl Into<String>,
        type_ref: impl Into<String>,
        resolve: impl Fn(&Object) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            type_ref: type_ref.into(),
            resolve: Arc::new(resolve),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_ref(&self) -> &str {
        &self.type_ref
    }

    pub fn resolve(&self, source: &Object) -> Value {
        (self.resolve)(source)
    }
}

impl fmt::Debug for ConnectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionField")
            .field("name", &self.name)
            .field("type_ref", &self.type_ref)
            .finish_non_exhaustive()
    }
}

/// Nullability policy and shape options of a connection type.
#[derive(Clone, Debug, Eq, PartialEq, TypedBuilder)]
pub struct ConnectionOptions {
    /// Whether the `edges` list may be null.
    #[builder(default)]
    pub edges_list_nullable: bool,
    /// Whether individual edges may be null.
    #[builder(default = true)]
    pub edge_items_nullable: bool,
    /// Whether `node` may be null within an edge.
    #[builder(default)]
    pub node_nullable: bool,
    /// Whether the connection also exposes a `nodes` list.
    #[builder(default)]
    pub nodes_on_connection: bool,
    #[builder(default = "String".to_string(), setter(into))]
    pub cursor_type: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions::builder().build()
    }
}

impl From<&RelayConfiguration> for ConnectionOptions {
    fn from(configuration: &RelayConfiguration) -> Self {
        Self {
            edges_list_nullable: configuration.edges_nullable.list,
            edge_items_nullable: configuration.edges_nullable.items,
            node_nullable: configuration.node_nullable,
            nodes_on_connection: configuration.nodes_on_connection,
            cursor_type: configuration.cursor_type.clone(),
        }
    }
}

/// Assembles [`Connection`]s of one connection type.
#[derive(Clone, Debug)]
pub struct ConnectionBuilder {
    name: String,
    node_type: String,
    options: ConnectionOptions,
    fields: Vec<ConnectionField>,
}

impl ConnectionBuilder {
    /// A builder for the connection type `name` (e.g. `UserConnection`) over `node_type`.
    pub fn new(
        name: impl Into<String>,
        node_type: impl Into<String>,
        options: ConnectionOptions,
    ) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            options,
            fields: Vec::new(),
        }
    }

    /// Adds a field to the connection type. A field registered twice keeps its last
    /// definition.
    pub fn with_field(mut self, field: ConnectionField) -> Self {
        self.fields.retain(|existing| existing.name != field.name);
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// The additional fields of the connection type, in registration order.
    pub fn fields(&self) -> &[ConnectionField] {
        &self.fields
    }

    /// The edge type name: the connection name without its `Connection` suffix, followed
    /// by `Edge`.
    pub fn edge_type_name(&self) -> String {
        let base = self
            .name
            .strip_suffix(CONNECTION_SUFFIX)
            .unwrap_or(&self.name);
        format!("{base}Edge")
    }

    /// Type reference of the `edges` field, e.g. `[UserEdge]!`.
    pub fn edges_type_ref(&self) -> String {
        list_type_ref(
            &self.edge_type_name(),
            self.options.edge_items_nullable,
            self.options.edges_list_nullable,
        )
    }

    /// Type reference of the `node` field of an edge.
    pub fn node_type_ref(&self) -> String {
        type_ref(&self.node_type, self.options.node_nullable)
    }

    /// Type reference of the `nodes` field, or `None` when the connection has none.
    pub fn nodes_type_ref(&self) -> Option<String> {
        self.options.nodes_on_connection.then(|| {
            list_type_ref(
                &self.node_type,
                self.options.edge_items_nullable,
                self.options.edges_list_nullable,
            )
        })
    }

    pub fn cursor_type_ref(&self) -> String {
        type_ref(&self.options.cursor_type, false)
    }

    /// Wraps a page of items, computing each cursor from the item and its position.
    ///
    /// A `None` list produces a null `edges` list, a `None` item a null edge.
    pub fn from_items<T, F>(
        &self,
        items: Option<Vec<Option<T>>>,
        cursor: F,
        page_info: PageInfo,
    ) -> Result<Connection<T>, RelayError>
    where
        T: Clone,
        F: FnMut(usize, &T) -> String,
    {
        self.from_items_with_source(items, cursor, page_info, &Object::new())
    }

    /// Like [`from_items`](Self::from_items), resolving the additional fields from `source`.
    pub fn from_items_with_source<T, F>(
        &self,
        items: Option<Vec<Option<T>>>,
        mut cursor: F,
        page_info: PageInfo,
        source: &Object,
    ) -> Result<Connection<T>, RelayError>
    where
        T: Clone,
        F: FnMut(usize, &T) -> String,
    {
        let edges = items.map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| item.map(|item| Edge::new(cursor(index, &item), item)))
                .collect()
        });
        self.from_edges_with_source(edges, page_info, source)
    }

    /// Wraps edges built by the caller, in the given order.
    pub fn from_edges<T: Clone>(
        &self,
        edges: Option<Vec<Option<Edge<T>>>>,
        page_info: PageInfo,
    ) -> Result<Connection<T>, RelayError> {
        self.from_edges_with_source(edges, page_info, &Object::new())
    }

    /// Like [`from_edges`](Self::from_edges), resolving the additional fields from `source`.
    pub fn from_edges_with_source<T: Clone>(
        &self,
        edges: Option<Vec<Option<Edge<T>>>>,
        mut page_info: PageInfo,
        source: &Object,
    ) -> Result<Connection<T>, RelayError> {
        self.check_nullability(edges.as_deref())?;

        let present = || edges.iter().flatten().flatten();
        if page_info.start_cursor.is_none() {
            page_info.start_cursor = present().next().map(|edge| edge.cursor.clone());
        }
        if page_info.end_cursor.is_none() {
            page_info.end_cursor = present().last().map(|edge| edge.cursor.clone());
        }

        let nodes = self.options.nodes_on_connection.then(|| {
            edges
                .iter()
                .flatten()
                .map(|edge| edge.as_ref().and_then(|edge| edge.node.clone()))
                .collect::<Vec<_>>()
        });
        if let Some(nodes) = &nodes {
            if !self.options.edge_items_nullable {
                if let Some(index) = nodes.iter().position(Option::is_none) {
                    return Err(self.violation(&format!("nodes.{index}")));
                }
            }
        }

        let extra = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.resolve(source)))
            .collect();

        Ok(Connection {
            page_info,
            edges,
            nodes,
            extra,
        })
    }

    fn check_nullability<T>(&self, edges: Option<&[Option<Edge<T>>]>) -> Result<(), RelayError> {
        let Some(edges) = edges else {
            return if self.options.edges_list_nullable {
                Ok(())
            } else {
                Err(self.violation("edges"))
            };
        };

        for (index, edge) in edges.iter().enumerate() {
            match edge {
                None if !self.options.edge_items_nullable => {
                    return Err(self.violation(&format!("edges.{index}")));
                }
                Some(Edge { node: None, .. }) if !self.options.node_nullable => {
                    return Err(self.violation(&format!("edges.{index}.node")));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn violation(&self, field: &str) -> RelayError {
        RelayError::NullabilityViolation {
            field: format!("{}.{field}", self.name),
        }
    }
}

fn type_ref(name: &str, nullable: bool) -> String {
    if nullable {
        name.to_string()
    } else {
        format!("{name}!")
    }
}

fn list_type_ref(item: &str, items_nullable: bool, list_nullable: bool) -> String {
    type_ref(&format!("[{}]", type_ref(item, items_nullable)), list_nullable)
}

/// The standard pagination arguments of a connection field.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectionArguments {
    pub first: Option<u64>,
    pub after: Option<String>,
    pub last: Option<u64>,
    pub before: Option<String>,
}

impl ConnectionArguments {
    /// Reads the pagination arguments from the field arguments.
    ///
    /// Counts must be non-negative integers and cursors strings; absent and null arguments
    /// are both unset.
    pub fn from_arguments(arguments: &Object) -> Result<Self, RelayError> {
        Ok(Self {
            first: count(arguments, "first")?,
            after: cursor(arguments, "after")?,
            last: count(arguments, "last")?,
            before: cursor(arguments, "before")?,
        })
    }

    /// The offset encoded in `after`, if set.
    pub fn after_offset(&self) -> Result<Option<usize>, RelayError> {
        self.after
            .as_deref()
            .map(|cursor| offset_argument("after", cursor))
            .transpose()
    }

    /// The offset encoded in `before`, if set.
    pub fn before_offset(&self) -> Result<Option<usize>, RelayError> {
        self.before
            .as_deref()
            .map(|cursor| offset_argument("before", cursor))
            .transpose()
    }
}

fn count(arguments: &Object, name: &str) -> Result<Option<u64>, RelayError> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => match (number.as_u64(), number.as_i64()) {
            (Some(count), _) => Ok(Some(count)),
            (None, Some(_)) => Err(RelayError::InvalidPaginationArgument {
                name: name.to_string(),
                reason: "must be a non-negative integer".to_string(),
            }),
            (None, None) => Err(RelayError::InvalidPaginationArgument {
                name: name.to_string(),
                reason: "must be an integer".to_string(),
            }),
        },
        Some(_) => Err(RelayError::InvalidPaginationArgument {
            name: name.to_string(),
            reason: "must be an integer".to_string(),
        }),
    }
}

fn cursor(arguments: &Object, name: &str) -> Result<Option<String>, RelayError> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(cursor)) => Ok(Some(cursor.clone())),
        Some(_) => Err(RelayError::InvalidPaginationArgument {
            name: name.to_string(),
            reason: "must be a string".to_string(),
        }),
    }
}

fn offset_argument(name: &str, cursor: &str) -> Result<usize, RelayError> {
    cursor_to_offset(cursor).ok_or_else(|| RelayError::InvalidPaginationArgument {
        name: name.to_string(),
        reason: format!("'{cursor}' is not a valid offset cursor"),
    })
}

/// The opaque cursor of the item at `offset`, for data sources that page by offset.
pub fn offset_to_cursor(offset: usize) -> String {
    BASE64.encode(format!("{OFFSET_CURSOR_PREFIX}{offset}"))
}

/// The offset encoded by [`offset_to_cursor`].
pub fn cursor_to_offset(cursor: &str) -> Option<usize> {
    let decoded = BASE64.decode(cursor).ok()?;
    let decoded = std::str::from_utf8(&decoded).ok()?;
    decoded.strip_prefix(OFFSET_CURSOR_PREFIX)?.parse().ok()
}
