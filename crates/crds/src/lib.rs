//! GPU provisioner CRD definitions
//!
//! Kubernetes custom resource types read by the GPU provisioner.

pub mod node_claim;

pub use node_claim::*;
