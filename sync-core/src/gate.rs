//! Trigger composer for feedsync.
//!
//! This module combines the four trigger sources (timer, connectivity,
//! credential, pause) into one "sync now" decision. It has combine-latest
//! semantics: every event updates its input and recomputes the gate from the
//! latest value of all inputs. Identical recomputations are not deduplicated,
//! since every tick is a legitimate new attempt.
//!
//! The composer never fails and performs no I/O. The pipeline driver in
//! sync-client feeds it events and acts on the returned credential.

use feedsync_types::{Credential, GateState, TriggerEvent};

/// Composes trigger events into fetch decisions - NO I/O, just state.
#[derive(Debug, Clone)]
pub struct TriggerComposer {
    gate: GateState,
    /// Bumped every time a usable credential is supplied.
    generation: u64,
}

impl TriggerComposer {
    /// Create a composer with no credential, not paused.
    pub fn new(online: bool) -> Self {
        Self {
            gate: GateState {
                online,
                paused: false,
                credential: None,
            },
            generation: 0,
        }
    }

    /// Process an event and decide whether to sync now.
    ///
    /// Returns the credential to fetch with when the gate is open after the
    /// update, `None` when the fetch must be suppressed.
    pub fn on_event(&mut self, event: TriggerEvent) -> Option<Credential> {
        match event {
            TriggerEvent::Tick => {}
            TriggerEvent::ConnectivityChanged(online) => self.gate.online = online,
            TriggerEvent::CredentialAvailable(credential) if credential.is_empty() => {
                self.gate.credential = None;
            }
            TriggerEvent::CredentialAvailable(credential) => {
                self.gate.credential = Some(credential);
                self.generation = self.generation.wrapping_add(1);
            }
            TriggerEvent::CredentialRevoked => self.gate.credential = None,
            TriggerEvent::Paused(paused) => self.gate.paused = paused,
        }

        self.gate.open().cloned()
    }

    /// Latest value of every gate input.
    pub fn gate(&self) -> &GateState {
        &self.gate
    }

    /// Drop the current credential after the server refused it.
    ///
    /// The gate stays closed until a new credential is supplied.
    pub fn reject_credential(&mut self) {
        self.gate.credential = None;
    }

    /// Counter of credentials supplied so far.
    ///
    /// Comparing generations tells whether a newer credential arrived while a
    /// request with an older one was in flight.
    pub fn credential_generation(&self) -> u64 {
        self.generation
    }
}

impl Default for TriggerComposer {
    fn default() -> Self {
        Self::new(true)
    }
}
