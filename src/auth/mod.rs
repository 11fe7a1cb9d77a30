// Authorization gate
//
// Membership checks read through the state store on every decision — the
// gate keeps no private copy, so a restart or a concurrent add is never
// working from stale state. The allowed set only grows; there is no
// removal operation.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::FeederError;
use crate::store::StateStore;

#[derive(Clone)]
pub struct AuthGate {
    store: Arc<StateStore>,
}

impl AuthGate {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    pub async fn is_authorized(&self, operator: i64) -> bool {
        self.store.is_operator(operator).await
    }

    /// Gate a privileged operation: `Unauthorized` unless `operator` is in
    /// the allowed set.
    pub async fn require(&self, operator: i64) -> Result<(), FeederError> {
        if self.is_authorized(operator).await {
            Ok(())
        } else {
            warn!(operator, "Unauthorized access attempt");
            Err(FeederError::Unauthorized(operator))
        }
    }

    /// Add `new_operator` to the allowed set on behalf of `requesting`.
    /// Idempotent when the id is already present.
    pub async fn add_operator(
        &self,
        requesting: i64,
        new_operator: i64,
    ) -> Result<(), FeederError> {
        self.require(requesting).await?;

        let added = self.store.add_operator(new_operator).await?;
        if added {
            info!(by = requesting, operator = new_operator, "Operator authorized");
        }
        Ok(())
    }
}
