//! BorrowingMutex - one active credit product per borrower
//!
//! Lock holders are the loan or credit line currently open for a borrower.
//! Only allow-listed lockers (the lending agencies) may take a lock;
//! the holder itself or any allowed locker may release it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use truefi_common::{Address, EventBus, ProtocolEvent, Result, TrueFiError};

#[derive(Debug, Default)]
struct MutexState {
    lockers: HashSet<Address>,
    locks: HashMap<Address, Address>,
}

pub struct BorrowingMutex {
    owner: Address,
    events: Arc<EventBus>,
    state: RwLock<MutexState>,
}

impl BorrowingMutex {
    pub fn new(owner: Address, events: Arc<EventBus>) -> Self {
        Self {
            owner,
            events,
            state: RwLock::new(MutexState::default()),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Grant or revoke locking rights
    pub fn allow_locker(&self, caller: &Address, locker: Address, allowed: bool) -> Result<()> {
        if *caller != self.owner {
            return Err(TrueFiError::unauthorized(caller, "mutex owner"));
        }

        {
            let mut state = self.state.write();
            if allowed {
                state.lockers.insert(locker);
            } else {
                state.lockers.remove(&locker);
            }
        }

        info!(locker = %locker.short(), allowed, "mutex locker updated");
        self.events
            .publish(ProtocolEvent::LockerAllowed { locker, allowed });
        Ok(())
    }

    pub fn is_allowed_locker(&self, locker: &Address) -> bool {
        self.state.read().lockers.contains(locker)
    }

    /// Take the borrower's lock on behalf of `holder`
    ///
    /// Relocking by the current holder is a no-op.
    pub fn lock(&self, caller: &Address, borrower: Address, holder: Address) -> Result<()> {
        let mut state = self.state.write();
        if !state.lockers.contains(caller) {
            return Err(TrueFiError::unauthorized(caller, "allowed locker"));
        }
        match state.locks.get(&borrower) {
            Some(current) if *current == holder => return Ok(()),
            Some(current) => {
                return Err(TrueFiError::AlreadyLocked {
                    borrower,
                    holder: *current,
                })
            }
            None => {}
        }
        state.locks.insert(borrower, holder);
        drop(state);

        debug!(borrower = %borrower.short(), holder = %holder.short(), "borrower locked");
        self.events
            .publish(ProtocolEvent::BorrowerLocked { borrower, holder });
        Ok(())
    }

    /// Release the borrower's lock
    pub fn unlock(&self, caller: &Address, borrower: Address) -> Result<()> {
        let mut state = self.state.write();
        let holder = match state.locks.get(&borrower) {
            Some(holder) => *holder,
            None => return Ok(()),
        };
        if *caller != holder && !state.lockers.contains(caller) {
            return Err(TrueFiError::unauthorized(caller, "lock holder"));
        }
        state.locks.remove(&borrower);
        drop(state);

        debug!(borrower = %borrower.short(), holder = %holder.short(), "borrower unlocked");
        self.events
            .publish(ProtocolEvent::BorrowerUnlocked { borrower, holder });
        Ok(())
    }

    pub fn is_unlocked(&self, borrower: &Address) -> bool {
        !self.state.read().locks.contains_key(borrower)
    }

    /// Current lock holder for `borrower`
    pub fn locker(&self, borrower: &Address) -> Option<Address> {
        self.state.read().locks.get(borrower).copied()
    }
}
