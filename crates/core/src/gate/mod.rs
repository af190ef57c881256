use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{CancellationToken, Result, SceneSwitchError};

/// Checkpoints a transition can suspend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateId {
    /// After the exit fade, before origin content is torn down.
    BeforeUnload,
    /// After the destination finished loading, before it is revealed.
    AfterLoad,
}

impl GateId {
    pub const ALL: [GateId; 2] = [GateId::BeforeUnload, GateId::AfterLoad];
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeUnload => f.write_str("before-unload"),
            Self::AfterLoad => f.write_str("after-load"),
        }
    }
}

/// How a bounded gate wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateWait {
    Opened,
    /// The timeout elapsed first. Callers proceed as if the gate had opened.
    TimedOut,
}

/// Named checkpoints shared between a transition and whoever releases it.
///
/// Clones share state. A gate only ever goes from closed to open, so a
/// registry should be created per transition.
#[derive(Clone)]
pub struct GateRegistry {
    gates: Arc<HashMap<GateId, watch::Sender<bool>>>,
}

impl GateRegistry {
    pub fn new() -> Self {
        let gates = GateId::ALL
            .iter()
            .map(|id| (*id, watch::channel(false).0))
            .collect();
        Self {
            gates: Arc::new(gates),
        }
    }

    /// Opens `gate`, releasing current waiters and every later one.
    pub fn open(&self, gate: GateId) {
        if let Some(sender) = self.gates.get(&gate) {
            sender.send_replace(true);
            tracing::debug!(%gate, "gate opened");
        }
    }

    pub fn is_open(&self, gate: GateId) -> bool {
        self.gates
            .get(&gate)
            .map(|sender| *sender.borrow())
            .unwrap_or(false)
    }

    /// Suspends until `gate` opens. Cancellation is returned as an error.
    pub async fn wait(&self, gate: GateId, token: &CancellationToken) -> Result<()> {
        token.run(self.opened(gate)).await
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// A timeout is a normal return ([`GateWait::TimedOut`]); only
    /// cancellation produces an error.
    pub async fn wait_with_timeout(
        &self,
        gate: GateId,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<GateWait> {
        token.check()?;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(SceneSwitchError::Cancelled),
            opened = self.opened(gate) => opened.map(|_| GateWait::Opened),
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!(%gate, ?timeout, "gate wait timed out");
                Ok(GateWait::TimedOut)
            }
        }
    }

    async fn opened(&self, gate: GateId) -> Result<()> {
        let sender = self
            .gates
            .get(&gate)
            .ok_or_else(|| SceneSwitchError::msg(format!("unknown gate {gate}")))?;
        let mut receiver = sender.subscribe();
        receiver
            .wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| SceneSwitchError::msg(format!("gate {gate} was dropped")))
    }
}

impl Default for GateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open: Vec<GateId> = GateId::ALL
            .iter()
            .copied()
            .filter(|gate| self.is_open(*gate))
            .collect();
        f.debug_struct("GateRegistry").field("open", &open).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opening_before_waiting_releases_later_waiters() {
        let gates = GateRegistry::new();
        let token = CancellationToken::new();
        gates.open(GateId::AfterLoad);

        gates.wait(GateId::AfterLoad, &token).await.unwrap();
        assert!(gates.is_open(GateId::AfterLoad));
        assert!(!gates.is_open(GateId::BeforeUnload));
    }

    #[tokio::test]
    async fn waiter_resumes_when_gate_opens() {
        let gates = GateRegistry::new();
        let opener = gates.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            opener.open(GateId::BeforeUnload);
        });

        let token = CancellationToken::new();
        let outcome = gates
            .wait_with_timeout(GateId::BeforeUnload, Duration::from_secs(5), &token)
            .await
            .unwrap();
        assert_eq!(outcome, GateWait::Opened);
    }

    #[tokio::test]
    async fn timeout_is_a_normal_return() {
        let gates = GateRegistry::new();
        let token = CancellationToken::new();

        let outcome = gates
            .wait_with_timeout(GateId::AfterLoad, Duration::from_millis(15), &token)
            .await
            .unwrap();
        assert_eq!(outcome, GateWait::TimedOut);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_wins_regardless_of_timeout() {
        let gates = GateRegistry::new();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            gates.wait_with_timeout(GateId::AfterLoad, Duration::from_secs(60), &token),
        )
        .await
        .expect("cancel must not wait for the gate timeout");
        assert!(matches!(outcome, Err(SceneSwitchError::Cancelled)));
    }

    #[tokio::test]
    async fn plain_wait_propagates_cancellation() {
        let gates = GateRegistry::new();
        let token = CancellationToken::new();
        token.cancel();
        let err = gates.wait(GateId::BeforeUnload, &token).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
