//! Azure agent pool clients
//!
//! A Rust client library for the agent pool surface of two Azure Resource
//! Manager control planes:
//!
//! - **Managed clusters** (`Microsoft.ContainerService/managedClusters`),
//!   addressed by subscription, resource group and cluster name.
//! - **Arc-connected clusters** (`Microsoft.HybridContainerService`),
//!   addressed by the connected-cluster resource URI.
//!
//! Both clients expose the same four operations through [`AgentPoolsApi`]:
//! begin create-or-update, get, begin delete and a paginated list.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use agentpool_client::{
//!     ops, AgentPoolsApi, ClientOptions, ManagedAgentPoolsClient, ManagedClusterScope,
//!     PollOptions, StaticTokenCredential,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credential = Arc::new(StaticTokenCredential::new("token"));
//! let client = ManagedAgentPoolsClient::new(credential, ClientOptions::default())?;
//! let scope = ManagedClusterScope::new("sub", "rg", "cluster");
//!
//! let pools = ops::list_agent_pools(&client, &scope).await?;
//! let pool = client.get(&scope, "gpupool").await?;
//! ops::delete_agent_pool(&client, &scope, "gpupool", &PollOptions::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Long-running operations**: `Azure-AsyncOperation` and `Location` polling
//! - **Pagination**: `nextLink` pages drained lazily through [`Pager`]
//! - **Credentials**: managed identity, federated workload identity, static tokens
//! - **Mocks**: in-memory clients behind the `test-util` feature

pub mod common;
pub mod connected;
pub mod credential;
pub mod error;
pub mod managed;
pub mod models;
#[path = "trait.rs"]
pub mod agentpool_trait;
pub mod ops;
pub mod scope;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use agentpool_trait::AgentPoolsApi;
pub use common::pager::Pager;
pub use common::poller::{OperationOutput, PollOptions, Poller};
pub use common::{ClientOptions, HttpClient};
pub use connected::HybridAgentPoolsClient;
pub use credential::{
    AccessToken, ManagedIdentityCredential, StaticTokenCredential, TokenCredential,
    WorkloadIdentityCredential,
};
pub use error::ArmError;
pub use managed::ManagedAgentPoolsClient;
pub use models::*;
pub use scope::{AgentPoolScope, ConnectedClusterScope, ManagedClusterScope};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockAgentPools, MockHybridAgentPools, MockManagedAgentPools};
