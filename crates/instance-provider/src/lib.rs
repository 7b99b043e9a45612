//! Instance providers for GPU node provisioning
//!
//! Turns a Karpenter [`NodeClaim`](crds::NodeClaim) into a single-node agent
//! pool and back. Two backends implement [`InstanceProvider`]:
//!
//! - [`ManagedProvider`] for managed clusters
//! - [`ConnectedProvider`] for Arc-connected provisioned clusters
//!
//! Both wait after create until exactly one cluster node carries the pool's
//! label and report that node's provider ID as the instance ID.
//!
//! The [`ProviderFactory`] picks the backend from a [`ProviderConfig`].

pub mod backoff;
pub mod bootstrap;
pub mod config;
pub mod connected;
pub mod convergence;
pub mod error;
pub mod factory;
pub mod instance;
pub mod labels;
pub mod managed;
pub mod naming;
pub mod nodes;
pub mod provider;
pub mod quantity;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use backoff::{Backoff, retry_on_error};
pub use config::{ProviderConfig, ProviderType};
pub use connected::ConnectedProvider;
pub use convergence::{Convergence, ConvergenceState, PendingReason};
pub use error::{ProviderError, ignore_not_found};
pub use factory::{ProviderFactory, supported_provider_types};
pub use instance::Instance;
pub use managed::ManagedProvider;
pub use naming::{is_valid_agent_pool_name, parse_agent_pool_name_from_id, validate_agent_pool_name};
pub use nodes::{NodeLister, nodes_for_agent_pool};
pub use provider::{InstanceProvider, ProviderSettings};
