//! Halt gate - single source of halt state
//!
//! Every write-classified operation consults `is_halted()` before touching
//! any other state. If halted, the operation fails with `SystemHalted` and
//! leaves all state unchanged. Reads bypass the gate, with one deliberate
//! exception: the escalation queue refuses access during halt.

use std::sync::Arc;

use tokio::sync::watch;

use fates_types::{FatesError, Result};

/// Halt state contract
#[async_trait::async_trait]
pub trait HaltGate: Send + Sync {
    /// Whether the system is halted.
    async fn is_halted(&self) -> bool;

    /// The operator-supplied halt reason, when halted.
    async fn halt_reason(&self) -> Option<String>;
}

/// Fail with `SystemHalted` when the gate is active.
///
/// The single entry point for the halt-check-first pattern; services call
/// this before any other step of a write.
pub async fn ensure_not_halted(gate: &dyn HaltGate) -> Result<()> {
    if gate.is_halted().await {
        let reason = gate
            .halt_reason()
            .await
            .unwrap_or_else(|| "system is halted".to_string());
        return Err(FatesError::SystemHalted { reason });
    }
    Ok(())
}

/// Process-shared halt signal over a watch channel.
///
/// Reads are wait-free and linearizable with the rare halt/resume writes;
/// the channel broadcasts transitions to any task that wants to observe
/// them.
#[derive(Clone)]
pub struct SharedHaltGate {
    tx: Arc<watch::Sender<Option<String>>>,
    rx: watch::Receiver<Option<String>>,
}

impl SharedHaltGate {
    /// Create a gate in the running (not halted) state.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self { tx: Arc::new(tx), rx }
    }

    /// Engage the halt with a reason. Subsequent writes fail until
    /// [`resume`](Self::resume).
    pub fn halt(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(halt_reason = %reason, "halt engaged");
        let _ = self.tx.send(Some(reason));
    }

    /// Lift the halt.
    pub fn resume(&self) {
        tracing::info!("halt lifted");
        let _ = self.tx.send(None);
    }

    /// A receiver that observes halt transitions.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.rx.clone()
    }
}

impl Default for SharedHaltGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HaltGate for SharedHaltGate {
    async fn is_halted(&self) -> bool {
        self.rx.borrow().is_some()
    }

    async fn halt_reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_halt_and_resume() {
        let gate = SharedHaltGate::new();
        assert!(!gate.is_halted().await);
        assert!(ensure_not_halted(&gate).await.is_ok());

        gate.halt("constitutional review");
        assert!(gate.is_halted().await);
        assert_eq!(
            gate.halt_reason().await.as_deref(),
            Some("constitutional review")
        );
        let err = ensure_not_halted(&gate).await.unwrap_err();
        assert!(matches!(err, FatesError::SystemHalted { .. }));

        gate.resume();
        assert!(ensure_not_halted(&gate).await.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let gate = SharedHaltGate::new();
        let clone = gate.clone();
        gate.halt("maintenance");
        assert!(clone.is_halted().await);
    }
}
