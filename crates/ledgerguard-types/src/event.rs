use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::ids::{AccountId, SourceId, TxId};
use crate::risk::{EnforcementAction, PatternType, RiskLevel, Severity};

/// State-change notifications published to external subscribers.
///
/// One variant per observable transition. Events are emitted after the
/// mutation they describe has been applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GuardEvent {
    // Risk ledger
    RiskAssessed {
        account: AccountId,
        level: RiskLevel,
        score: u8,
        updated: bool,
    },
    RiskScoreUpdated {
        account: AccountId,
        score: u8,
        level: RiskLevel,
        previous_level: RiskLevel,
    },
    RiskCleared {
        account: AccountId,
    },

    // Compliance bridge
    DataSourceRegistered {
        source_id: SourceId,
        name: String,
    },
    AddressSanctioned {
        account: AccountId,
        source_id: SourceId,
    },
    SanctionCleared {
        account: AccountId,
    },
    JurisdictionSanctioned {
        code: String,
    },
    ComplianceChecked {
        account: AccountId,
        sanctioned: bool,
        pep: bool,
    },

    // Transaction monitor
    TransactionAnalyzed {
        tx_id: TxId,
        pattern: PatternType,
        severity: Severity,
        flagged: bool,
    },
    AlertRaised {
        alert_id: u64,
        target: AccountId,
        pattern: PatternType,
        severity: Severity,
    },
    AlertResolved {
        alert_id: u64,
    },
    ThresholdsUpdated {
        high_risk: u8,
        critical: u8,
    },

    // Enforcement engine
    AccountFrozen {
        account: AccountId,
        reason: String,
    },
    AccountUnfrozen {
        account: AccountId,
    },
    AccountWhitelisted {
        account: AccountId,
    },
    WhitelistRemoved {
        account: AccountId,
    },
    DailyLimitSet {
        account: AccountId,
        limit: u64,
    },
    SpendingRecorded {
        account: AccountId,
        amount: u64,
        daily_spent: u64,
    },
    EnforcementToggled {
        enabled: bool,
    },
    TransactionBlocked {
        from: AccountId,
        to: AccountId,
        amount: u64,
        action: EnforcementAction,
        reason: String,
    },
    DelayedTransactionCreated {
        id: u64,
        from: AccountId,
        to: AccountId,
        amount: u64,
    },
    DelayedTransactionApproved {
        id: u64,
        reviewer: AccountId,
    },
    DelayedTransactionExecuted {
        id: u64,
    },

    // Audit store
    ReportCreated {
        report_id: u64,
        subject: AccountId,
    },
    ReportUpdated {
        report_id: u64,
    },
    ReportSubmitted {
        report_id: u64,
    },
    ReportReviewStarted {
        report_id: u64,
        reviewer: AccountId,
    },
    ReportReviewed {
        report_id: u64,
        approved: bool,
    },
    ReportSealed {
        report_id: u64,
    },
    ReportArchived {
        report_id: u64,
    },
}

/// Sink for state-change notifications.
///
/// The core publishes; transport to real subscribers is external.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GuardEvent);
}

/// Default sink: structured log lines via `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: GuardEvent) {
        match &event {
            GuardEvent::AccountFrozen { account, reason } => {
                warn!(%account, reason, "account frozen");
            }
            GuardEvent::AddressSanctioned { account, source_id } => {
                warn!(%account, %source_id, "address sanctioned");
            }
            GuardEvent::TransactionBlocked {
                from, to, action, ..
            } => {
                warn!(%from, %to, ?action, "transaction blocked");
            }
            _ => debug!(?event, "guard event"),
        }
    }
}

/// Recording sink for tests: keeps every emitted event in order.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<GuardEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<GuardEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Drain and return the recorded events.
    pub fn take(&self) -> Vec<GuardEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: GuardEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
