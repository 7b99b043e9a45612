//! Node convergence after agent pool creation
//!
//! A freshly created agent pool is usable once exactly one node carries its
//! name and that node has a provider ID. Until then the wait is `Pending`
//! with a reason; it ends `Ready` with the provider ID or `TimedOut` when
//! the backoff runs out.

use crate::backoff::Backoff;
use crate::error::ProviderError;
use crate::nodes::{nodes_for_agent_pool, provider_id, NodeLister};
use k8s_openapi::api::core::v1::Node;
use std::fmt;
use tracing::debug;

/// Why the agent pool has not converged yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingReason {
    /// No node carries the pool label yet
    NoNodes,
    /// More than one node matched, usually a spare VM being removed
    AmbiguousNodes(usize),
    /// The node exists but has no provider ID
    ProviderIdUnbound,
    /// Node lookup failed; retried like any other pending state
    LookupFailed(String),
}

impl fmt::Display for PendingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingReason::NoNodes => write!(f, "fail to find the node object"),
            PendingReason::AmbiguousNodes(n) => write!(f, "found {} nodes, expected exactly one", n),
            PendingReason::ProviderIdUnbound => write!(f, "node has no provider id yet"),
            PendingReason::LookupFailed(e) => write!(f, "listing nodes: {}", e),
        }
    }
}

/// Where a convergence wait stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceState {
    /// Still waiting, with the latest reason
    Pending(PendingReason),
    /// Provider ID of the single bound node
    Ready(String),
    TimedOut { attempts: u32, reason: PendingReason },
}

/// Classify one node lookup
pub fn classify(nodes: &[Node]) -> Result<String, PendingReason> {
    match nodes {
        [] => Err(PendingReason::NoNodes),
        [node] => provider_id(node)
            .map(str::to_string)
            .ok_or(PendingReason::ProviderIdUnbound),
        many => Err(PendingReason::AmbiguousNodes(many.len())),
    }
}

/// Convergence state machine driven by successive lookups
#[derive(Debug, Clone)]
pub struct Convergence {
    state: ConvergenceState,
    attempts: u32,
    max_attempts: u32,
}

impl Convergence {
    /// Start pending with room for `max_attempts` retries after `initial`
    pub fn new(initial: PendingReason, max_attempts: u32) -> Self {
        Self {
            state: ConvergenceState::Pending(initial),
            attempts: 0,
            max_attempts,
        }
    }

    /// Current state
    pub fn state(&self) -> &ConvergenceState {
        &self.state
    }

    /// Lookups observed after the initial one
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record the outcome of one retry
    ///
    /// Settled states are terminal and ignore further observations.
    pub fn observe(&mut self, outcome: Result<String, PendingReason>) -> &ConvergenceState {
        if !matches!(self.state, ConvergenceState::Pending(_)) {
            return &self.state;
        }

        self.attempts += 1;
        self.state = match outcome {
            Ok(id) => ConvergenceState::Ready(id),
            Err(reason) if self.attempts >= self.max_attempts => ConvergenceState::TimedOut {
                attempts: self.attempts,
                reason,
            },
            Err(reason) => ConvergenceState::Pending(reason),
        };
        &self.state
    }
}

/// Look up the node of `agent_pool` once
pub async fn resolve_once(
    lister: &dyn NodeLister,
    agent_pool: &str,
    node_list_retry: &Backoff,
) -> Result<Result<String, PendingReason>, ProviderError> {
    let nodes = nodes_for_agent_pool(lister, agent_pool, node_list_retry).await?;
    Ok(classify(&nodes))
}

/// Wait until `agent_pool` has exactly one bound node
///
/// The first lookup runs immediately and its errors are returned as-is; later
/// lookup errors count as pending attempts.
pub async fn wait_for_node(
    lister: &dyn NodeLister,
    agent_pool: &str,
    convergence: &Backoff,
    node_list_retry: &Backoff,
) -> Result<String, ProviderError> {
    let initial = match resolve_once(lister, agent_pool, node_list_retry).await? {
        Ok(id) => return Ok(id),
        Err(reason) => reason,
    };

    let mut machine = Convergence::new(initial, convergence.steps.max(1));
    loop {
        if let ConvergenceState::Pending(reason) = machine.state() {
            debug!("agent pool {} pending: {}", agent_pool, reason);
        }
        tokio::time::sleep(convergence.delay_for(machine.attempts() + 1)).await;

        let outcome = match resolve_once(lister, agent_pool, node_list_retry).await {
            Ok(outcome) => outcome,
            Err(e) => Err(PendingReason::LookupFailed(e.to_string())),
        };

        match machine.observe(outcome) {
            ConvergenceState::Ready(id) => return Ok(id.clone()),
            ConvergenceState::TimedOut { attempts, reason } => {
                return Err(ProviderError::ConvergenceTimeout {
                    agent_pool: agent_pool.to_string(),
                    attempts: *attempts,
                    reason: reason.to_string(),
                });
            }
            ConvergenceState::Pending(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{node, MockNodeLister};

    #[test]
    fn test_classify() {
        assert_eq!(classify(&[]), Err(PendingReason::NoNodes));
        assert_eq!(
            classify(&[node("a", &[], None)]),
            Err(PendingReason::ProviderIdUnbound)
        );
        assert_eq!(
            classify(&[node("a", &[], Some("azure:///vm/0"))]),
            Ok("azure:///vm/0".to_string())
        );
        assert_eq!(
            classify(&[
                node("a", &[], Some("azure:///vm/0")),
                node("b", &[], Some("azure:///vm/1"))
            ]),
            Err(PendingReason::AmbiguousNodes(2))
        );
    }

    #[test]
    fn test_state_machine_transitions() {
        let mut machine = Convergence::new(PendingReason::NoNodes, 3);
        assert_eq!(
            machine.observe(Err(PendingReason::AmbiguousNodes(2))),
            &ConvergenceState::Pending(PendingReason::AmbiguousNodes(2))
        );
        assert_eq!(
            machine.observe(Ok("azure:///vm/0".to_string())),
            &ConvergenceState::Ready("azure:///vm/0".to_string())
        );
        // Terminal
        assert_eq!(
            machine.observe(Err(PendingReason::NoNodes)),
            &ConvergenceState::Ready("azure:///vm/0".to_string())
        );
        assert_eq!(machine.attempts(), 2);
    }

    #[test]
    fn test_state_machine_times_out() {
        let mut machine = Convergence::new(PendingReason::NoNodes, 2);
        machine.observe(Err(PendingReason::ProviderIdUnbound));
        assert_eq!(
            machine.observe(Err(PendingReason::ProviderIdUnbound)),
            &ConvergenceState::TimedOut {
                attempts: 2,
                reason: PendingReason::ProviderIdUnbound
            }
        );
    }

    #[tokio::test]
    async fn test_wait_returns_once_node_binds() {
        let lister = MockNodeLister::new();
        lister.add_after_calls(
            4,
            node("aks-gpu1-0", &[("agentpool", "gpu1")], Some("azure:///vm/0")),
        );

        let id = wait_for_node(&lister, "gpu1", &Backoff::immediate(15), &Backoff::immediate(1))
            .await
            .unwrap();
        assert_eq!(id, "azure:///vm/0");
    }

    #[tokio::test]
    async fn test_wait_times_out_on_ambiguous_nodes() {
        let lister = MockNodeLister::new();
        lister.add(node("aks-gpu1-0", &[("agentpool", "gpu1")], Some("azure:///vm/0")));
        lister.add(node("aks-gpu1-1", &[("agentpool", "gpu1")], Some("azure:///vm/1")));

        let err = wait_for_node(&lister, "gpu1", &Backoff::immediate(3), &Backoff::immediate(1))
            .await
            .unwrap_err();
        match err {
            ProviderError::ConvergenceTimeout { agent_pool, attempts, reason } => {
                assert_eq!(agent_pool, "gpu1");
                assert_eq!(attempts, 3);
                assert!(reason.contains("found 2 nodes"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_wait_times_out_when_provider_id_never_binds() {
        let lister = MockNodeLister::new();
        lister.add(node("aks-gpu1-0", &[("kubernetes.azure.com/agentpool", "gpu1")], None));

        let err = wait_for_node(&lister, "gpu1", &Backoff::immediate(2), &Backoff::immediate(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ConvergenceTimeout { .. }));
        assert!(err.to_string().contains("no provider id"));
    }
}
