//! Relay conventions for GraphQL resolvers.
//!
//! * opaque global IDs and the `node`/`nodes` fields, backed by batched per-request loaders,
//! * resolution of the concrete type of `Node` values,
//! * connection, edge and page info shapes,
//! * mutations echoing the client's `clientMutationId`.
//!
//! ```rust,ignore
//! let mut registry = NodeRegistry::new();
//! registry.register(
//!     NodeTypeDescriptor::builder()
//!         .name("User")
//!         .loader(LoaderStrategy::batched(users))
//!         .build(),
//! )?;
//! let relay = Relay::new(RelayConfiguration::from_yaml(&yaml)?, registry);
//!
//! // once per request
//! let context = Context::new();
//! let user = relay.node(&context, &path, "VXNlcjox").await?;
//! ```

pub mod configuration;
pub mod connection;
pub mod context;
pub mod error;
pub mod global_id;
pub mod json_ext;
pub mod mutation;
pub mod node_loader;
pub mod registry;
mod relay;
pub mod type_resolver;

pub use crate::configuration::ClientMutationId;
pub use crate::configuration::EdgesNullability;
pub use crate::configuration::RelayConfiguration;
pub use crate::connection::Connection;
pub use crate::connection::ConnectionArguments;
pub use crate::connection::ConnectionBuilder;
pub use crate::connection::ConnectionField;
pub use crate::connection::ConnectionOptions;
pub use crate::connection::Edge;
pub use crate::connection::PageInfo;
pub use crate::context::Context;
pub use crate::error::Error;
pub use crate::error::RelayError;
pub use crate::global_id::Base64GlobalIdCodec;
pub use crate::global_id::GlobalId;
pub use crate::global_id::GlobalIdCodec;
pub use crate::mutation::MutationCorrelator;
pub use crate::mutation::MutationResolver;
pub use crate::mutation::RelayMutationField;
pub use crate::node_loader::NodeLoader;
pub use crate::registry::FnLoader;
pub use crate::registry::LoadMany;
pub use crate::registry::LoadOne;
pub use crate::registry::LoaderStrategy;
pub use crate::registry::NodeRegistry;
pub use crate::registry::NodeTypeDescriptor;
pub use crate::relay::Nodes;
pub use crate::relay::Relay;
