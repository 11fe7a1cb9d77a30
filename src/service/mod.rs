// Inbound service surface
//
// The small synchronous API the chat front end calls. Every privileged
// operation goes through the authorization gate before it can reach the
// store or the device; `whoami` alone is open, so a new user can discover
// the id an existing operator needs to authorize.

use std::sync::Arc;
use tracing::info;

use crate::auth::AuthGate;
use crate::device::{DeviceLink, DeviceState, Dispatcher};
use crate::error::FeederError;
use crate::store::{StateStore, Timer};

pub struct FeederService<L> {
    store: Arc<StateStore>,
    gate: AuthGate,
    dispatcher: Arc<Dispatcher<L>>,
    default_portions: u32,
}

impl<L: DeviceLink> FeederService<L> {
    pub fn new(
        store: Arc<StateStore>,
        gate: AuthGate,
        dispatcher: Arc<Dispatcher<L>>,
        default_portions: u32,
    ) -> Self {
        Self {
            store,
            gate,
            dispatcher,
            default_portions,
        }
    }

    /// Dispense food now. `portions` falls back to the configured default.
    pub async fn feed(&self, operator: i64, portions: Option<u32>) -> Result<u32, FeederError> {
        self.gate.require(operator).await?;
        let portions = portions.unwrap_or(self.default_portions);
        info!(operator, portions, "Manual feed requested");
        self.dispatcher.feed(portions).await?;
        Ok(portions)
    }

    /// Current device data-point map.
    pub async fn status(&self, operator: i64) -> Result<DeviceState, FeederError> {
        self.gate.require(operator).await?;
        info!(operator, "Status requested");
        self.dispatcher.status().await
    }

    /// Schedule (or replace) the daily timer at `hh:mm`.
    pub async fn add_timer(
        &self,
        operator: i64,
        hour: u8,
        minute: u8,
        portions: u32,
    ) -> Result<(), FeederError> {
        self.gate.require(operator).await?;
        let replaced = self.store.upsert_timer(hour, minute, portions).await?;
        info!(operator, hour, minute, portions, replaced, "Timer added");
        Ok(())
    }

    /// Delete the timer at `hh:mm`, or `TimerNotFound`.
    pub async fn delete_timer(
        &self,
        operator: i64,
        hour: u8,
        minute: u8,
    ) -> Result<(), FeederError> {
        self.gate.require(operator).await?;
        self.store.remove_timer(hour, minute).await?;
        info!(operator, hour, minute, "Timer deleted");
        Ok(())
    }

    /// All timers, sorted by time-of-day.
    pub async fn list_timers(&self, operator: i64) -> Result<Vec<Timer>, FeederError> {
        self.gate.require(operator).await?;
        Ok(self.store.timers().await)
    }

    /// Authorize a new operator on behalf of an existing one.
    pub async fn add_operator(&self, operator: i64, new_id: i64) -> Result<(), FeederError> {
        self.gate.add_operator(operator, new_id).await
    }

    /// Echo the caller's id. Open to everyone: this is how a new user
    /// learns the id to hand to an existing operator.
    pub fn whoami(&self, operator: i64) -> i64 {
        operator
    }
}
