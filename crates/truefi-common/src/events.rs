//! Protocol events
//!
//! Every state transition and every administrative change is published as
//! a [`ProtocolEvent`] for off-chain observers:
//! - Configuration changes (new values only)
//! - Loan lifecycle transitions
//! - Votes, withdrawals and reward claims
//! - Borrowing mutex acquisitions and releases

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::address::Address;
use crate::types::clock::Clock;

/// Event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProtocolEvent {
    ConfigChanged {
        component: String,
        setting: String,
        value: String,
    },
    RateOracleUpdated {
        asset: Address,
        index: usize,
        running_total: u128,
        timestamp: u64,
    },
    LoanCreated {
        loan: Address,
        pool: Address,
        borrower: Address,
        amount: u128,
        term: u64,
        apy: u128,
    },
    LoanFunded {
        loan: Address,
        lender: Address,
        debt: u128,
        received: u128,
    },
    LoanWithdrawn {
        loan: Address,
        beneficiary: Address,
        amount: u128,
    },
    LoanRepaid {
        loan: Address,
        payer: Address,
        amount: u128,
        repaid: u128,
    },
    LoanClosed {
        loan: Address,
        status: String,
        balance: u128,
    },
    LoanRedeemed {
        loan: Address,
        holder: Address,
        claims: u128,
        payout: u128,
    },
    LoanLiquidated {
        loan: Address,
        liquidator: Address,
    },
    LoanReclaimed {
        loan: Address,
        borrower: Address,
        amount: u128,
    },
    LockerAllowed {
        locker: Address,
        allowed: bool,
    },
    BorrowerLocked {
        borrower: Address,
        holder: Address,
    },
    BorrowerUnlocked {
        borrower: Address,
        holder: Address,
    },
    LoanSubmitted {
        loan: Address,
        creator: Address,
    },
    LoanRetracted {
        loan: Address,
    },
    Voted {
        loan: Address,
        voter: Address,
        yes: bool,
        amount: u128,
    },
    VoteWithdrawn {
        loan: Address,
        voter: Address,
        amount: u128,
        payout: u128,
        burned: u128,
    },
    RewardAllocated {
        loan: Address,
        reward: u128,
    },
    RewardClaimed {
        loan: Address,
        voter: Address,
        beneficiary: Address,
        amount: u128,
    },
    LoanFundedByAgency {
        loan: Address,
        pool: Address,
        required_rate: u128,
    },
    LoanReclaimedByAgency {
        loan: Address,
        pool: Address,
        redeemed: u128,
        fee: u128,
    },
    FeeDistributed {
        loan: Address,
        fee: u128,
        stake_out: u128,
    },
    ClaimsSeized {
        loan: Address,
        recovery: Address,
        claims: u128,
    },
}

impl ProtocolEvent {
    /// Event type name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::ConfigChanged { .. } => "ConfigChanged",
            ProtocolEvent::RateOracleUpdated { .. } => "RateOracleUpdated",
            ProtocolEvent::LoanCreated { .. } => "LoanCreated",
            ProtocolEvent::LoanFunded { .. } => "LoanFunded",
            ProtocolEvent::LoanWithdrawn { .. } => "LoanWithdrawn",
            ProtocolEvent::LoanRepaid { .. } => "LoanRepaid",
            ProtocolEvent::LoanClosed { .. } => "LoanClosed",
            ProtocolEvent::LoanRedeemed { .. } => "LoanRedeemed",
            ProtocolEvent::LoanLiquidated { .. } => "LoanLiquidated",
            ProtocolEvent::LoanReclaimed { .. } => "LoanReclaimed",
            ProtocolEvent::LockerAllowed { .. } => "LockerAllowed",
            ProtocolEvent::BorrowerLocked { .. } => "BorrowerLocked",
            ProtocolEvent::BorrowerUnlocked { .. } => "BorrowerUnlocked",
            ProtocolEvent::LoanSubmitted { .. } => "LoanSubmitted",
            ProtocolEvent::LoanRetracted { .. } => "LoanRetracted",
            ProtocolEvent::Voted { .. } => "Voted",
            ProtocolEvent::VoteWithdrawn { .. } => "VoteWithdrawn",
            ProtocolEvent::RewardAllocated { .. } => "RewardAllocated",
            ProtocolEvent::RewardClaimed { .. } => "RewardClaimed",
            ProtocolEvent::LoanFundedByAgency { .. } => "LoanFundedByAgency",
            ProtocolEvent::LoanReclaimedByAgency { .. } => "LoanReclaimedByAgency",
            ProtocolEvent::FeeDistributed { .. } => "FeeDistributed",
            ProtocolEvent::ClaimsSeized { .. } => "ClaimsSeized",
        }
    }

    /// Build a configuration change notification
    pub fn config_changed(component: &str, setting: &str, value: impl std::fmt::Display) -> Self {
        ProtocolEvent::ConfigChanged {
            component: component.to_string(),
            setting: setting.to_string(),
            value: value.to_string(),
        }
    }
}

/// Published event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event ID
    pub id: String,

    /// Clock timestamp at publication (Unix seconds)
    pub timestamp: u64,

    pub event: ProtocolEvent,
}

impl EventRecord {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Event sink
pub trait EventSink: Send + Sync {
    fn write(&self, record: &EventRecord);
}

/// Writes every event to the tracing subscriber
pub struct TracingSink;

impl EventSink for TracingSink {
    fn write(&self, record: &EventRecord) {
        info!(
            event = record.event.name(),
            id = %record.id,
            timestamp = record.timestamp,
            payload = %record.to_json(),
            "protocol event"
        );
    }
}

/// Keeps every event in memory, in publication order
#[derive(Default)]
pub struct EventLog {
    records: RwLock<Vec<EventRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.read().clone()
    }

    pub fn events(&self) -> Vec<ProtocolEvent> {
        self.records.read().iter().map(|r| r.event.clone()).collect()
    }

    /// Number of recorded events of the given type
    pub fn count(&self, name: &str) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| r.event.name() == name)
            .count()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl EventSink for EventLog {
    fn write(&self, record: &EventRecord) {
        self.records.write().push(record.clone());
    }
}

/// Fans events out to every registered sink
pub struct EventBus {
    clock: Arc<dyn Clock>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl EventBus {
    /// Bus logging through tracing only
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sinks: RwLock::new(vec![Arc::new(TracingSink)]),
        }
    }

    /// Bus without any sink
    pub fn silent(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    pub fn publish(&self, event: ProtocolEvent) {
        let record = EventRecord {
            id: uuid::Uuid::now_v7().to_string(),
            timestamp: self.clock.now(),
            event,
        };
        for sink in self.sinks.read().iter() {
            sink.write(&record);
        }
    }
}
