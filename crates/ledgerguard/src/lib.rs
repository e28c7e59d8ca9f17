//! LedgerGuard - compliance policy engine for a high-throughput ledger
//!
//! Wires the five subsystems together over a shared authorizer and event
//! sink: the risk ledger, the compliance bridge, the transaction monitor,
//! the enforcement engine, and the audit store. Each mutating call is
//! applied atomically under its subsystem's writer lock; reads never block
//! each other and never observe a half-applied mutation.
//!
//! ```
//! use ledgerguard::{Guard, GuardConfig};
//! use ledgerguard::{AccountId, AllowAll, TracingSink};
//! use std::sync::Arc;
//!
//! let guard = Guard::new(
//!     GuardConfig::default(),
//!     Arc::new(AllowAll),
//!     Arc::new(TracingSink),
//! )
//! .unwrap();
//!
//! let verdict = guard.enforcement().check_transaction(
//!     &AccountId::new("sender"),
//!     &AccountId::new("receiver"),
//!     250,
//!     chrono::Utc::now(),
//! );
//! assert!(verdict.allowed);
//! ```

#![deny(unsafe_code)]

use chrono::Duration;
use std::sync::Arc;

pub use ledgerguard_audit::{AuditStore, ComplianceReport, ReportStatus, ReportType};
pub use ledgerguard_compliance::{ComplianceBridge, ComplianceCheck, DataSource};
pub use ledgerguard_enforcement::{
    AccountStatus, DelayedTransaction, EnforcementConfig, EnforcementEngine, Verdict,
};
pub use ledgerguard_monitor::{Alert, TransactionAnalysis, TransactionMonitor};
pub use ledgerguard_risk::{RiskAssessment, RiskLedger};
pub use ledgerguard_types::{
    AccountId, AllowAll, Authorizer, Digest, EnforcementAction, EventSink, GuardError, GuardEvent,
    GuardResult, MemorySink, PatternType, RiskLevel, Role, RoleTable, Severity, SourceId,
    TracingSink, TxId,
};

/// Construction-time configuration for the whole engine.
#[derive(Clone, Debug)]
pub struct GuardConfig {
    /// Daily spend limit applied to accounts without a configured limit.
    /// 0 disables the default limit.
    pub default_daily_limit: u64,
    /// Review period for delayed transactions.
    pub delay_period: Duration,
    /// Monitor flagging threshold (anomaly score at or above is flagged).
    pub high_risk_threshold: u8,
    /// Monitor critical threshold; must exceed the flagging threshold.
    pub critical_threshold: u8,
    /// Whether enforcement starts enabled.
    pub enforcement_enabled: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            default_daily_limit: 1_000_000,
            delay_period: Duration::hours(24),
            high_risk_threshold: 70,
            critical_threshold: 90,
            enforcement_enabled: true,
        }
    }
}

/// The assembled policy engine.
pub struct Guard {
    risk: Arc<RiskLedger>,
    compliance: Arc<ComplianceBridge>,
    monitor: Arc<TransactionMonitor>,
    enforcement: Arc<EnforcementEngine>,
    audit: Arc<AuditStore>,
}

impl Guard {
    /// Wire the subsystems over a shared authorizer and event sink.
    ///
    /// Fails with `Validation` if the configured thresholds are inconsistent.
    pub fn new(
        config: GuardConfig,
        authz: Arc<dyn Authorizer>,
        sink: Arc<dyn EventSink>,
    ) -> GuardResult<Self> {
        let risk = Arc::new(RiskLedger::new(authz.clone(), sink.clone()));
        let compliance = Arc::new(ComplianceBridge::new(
            risk.clone(),
            authz.clone(),
            sink.clone(),
        ));
        let monitor = Arc::new(
            TransactionMonitor::new(
                risk.clone(),
                compliance.clone(),
                authz.clone(),
                sink.clone(),
            )
            .with_thresholds(config.high_risk_threshold, config.critical_threshold)?,
        );
        let enforcement = Arc::new(EnforcementEngine::new(
            EnforcementConfig {
                default_daily_limit: config.default_daily_limit,
                delay_period: config.delay_period,
                enabled: config.enforcement_enabled,
            },
            risk.clone(),
            compliance.clone(),
            authz.clone(),
            sink.clone(),
        ));
        let audit = Arc::new(AuditStore::new(authz, sink));

        Ok(Self {
            risk,
            compliance,
            monitor,
            enforcement,
            audit,
        })
    }

    pub fn risk(&self) -> &Arc<RiskLedger> {
        &self.risk
    }

    pub fn compliance(&self) -> &Arc<ComplianceBridge> {
        &self.compliance
    }

    pub fn monitor(&self) -> &Arc<TransactionMonitor> {
        &self.monitor
    }

    pub fn enforcement(&self) -> &Arc<EnforcementEngine> {
        &self.enforcement
    }

    pub fn audit(&self) -> &Arc<AuditStore> {
        &self.audit
    }
}
