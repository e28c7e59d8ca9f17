//! LedgerGuard transaction monitor
//!
//! Ingests per-transfer pattern/anomaly verdicts from the external scoring
//! model, records write-once analyses indexed by both parties, raises alerts
//! for flagged transfers, and folds anomaly scores back into the risk ledger
//! as a damped average.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use ledgerguard_compliance::ComplianceBridge;
use ledgerguard_risk::RiskLedger;
use ledgerguard_types::{
    AccountId, Authorizer, EventSink, GuardError, GuardEvent, GuardResult, PatternType, RiskLevel,
    Role, Severity, TxId,
};

/// Reason written when a sender interacts with a sanctioned receiver.
pub const REASON_SANCTION_INTERACTION: &str = "Interaction with sanctioned address";

/// Default flagging threshold (anomaly score at or above is HIGH).
pub const DEFAULT_HIGH_THRESHOLD: u8 = 70;
/// Default critical threshold.
pub const DEFAULT_CRITICAL_THRESHOLD: u8 = 90;

/// Immutable record of a single transfer analysis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionAnalysis {
    pub tx_id: TxId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: u64,
    pub pattern: PatternType,
    pub severity: Severity,
    pub anomaly_score: u8,
    pub timestamp: DateTime<Utc>,
    pub flagged: bool,
    pub notes: String,
}

/// Alert raised alongside a flagged analysis. Resolution is one-way.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub target: AccountId,
    pub pattern: PatternType,
    pub severity: Severity,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub resolver: Option<AccountId>,
}

struct MonitorState {
    analyses: HashMap<TxId, TransactionAnalysis>,
    address_index: HashMap<AccountId, Vec<TxId>>,
    alerts: HashMap<u64, Alert>,
    next_alert_id: u64,
    flagged_count: u64,
    high_threshold: u8,
    critical_threshold: u8,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            analyses: HashMap::new(),
            address_index: HashMap::new(),
            alerts: HashMap::new(),
            next_alert_id: 1,
            flagged_count: 0,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
        }
    }
}

/// Records transfer analyses and keeps risk state in step with them.
pub struct TransactionMonitor {
    state: RwLock<MonitorState>,
    risk: Arc<RiskLedger>,
    compliance: Arc<ComplianceBridge>,
    authz: Arc<dyn Authorizer>,
    sink: Arc<dyn EventSink>,
}

impl TransactionMonitor {
    pub fn new(
        risk: Arc<RiskLedger>,
        compliance: Arc<ComplianceBridge>,
        authz: Arc<dyn Authorizer>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            state: RwLock::new(MonitorState::default()),
            risk,
            compliance,
            authz,
            sink,
        }
    }

    /// Construct with non-default thresholds. Same validity rule as
    /// [`TransactionMonitor::update_thresholds`].
    pub fn with_thresholds(self, high_risk: u8, critical: u8) -> GuardResult<Self> {
        validate_thresholds(high_risk, critical)?;
        {
            let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
            state.high_threshold = high_risk;
            state.critical_threshold = critical;
        }
        Ok(self)
    }

    /// Record the verdict for a transfer. Role: scoring-oracle.
    ///
    /// Write-once per transfer id. A flagged analysis raises an alert and
    /// folds the anomaly score into the sender's risk as a damped average;
    /// if the receiver is independently sanctioned, the sender is then
    /// forced straight to CRITICAL regardless of the average.
    #[allow(clippy::too_many_arguments)]
    pub fn analyze_transaction(
        &self,
        caller: &AccountId,
        tx_id: &TxId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
        pattern: PatternType,
        anomaly_score: u8,
        notes: &str,
    ) -> GuardResult<Severity> {
        self.authz.require(caller, Role::ScoringOracle)?;
        if tx_id.is_empty() {
            return Err(GuardError::Validation("empty transaction id".into()));
        }
        if from.is_empty() || to.is_empty() {
            return Err(GuardError::Validation("empty account id".into()));
        }
        if anomaly_score > 100 {
            return Err(GuardError::Validation(format!(
                "anomaly score {anomaly_score} exceeds 100"
            )));
        }

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        if state.analyses.contains_key(tx_id) {
            return Err(GuardError::InvalidState(format!(
                "transaction {tx_id} already analyzed"
            )));
        }

        let severity = severity_for(
            pattern,
            anomaly_score,
            state.high_threshold,
            state.critical_threshold,
        );
        let flagged = anomaly_score >= state.high_threshold || pattern != PatternType::Normal;

        state.analyses.insert(
            tx_id.clone(),
            TransactionAnalysis {
                tx_id: tx_id.clone(),
                from: from.clone(),
                to: to.clone(),
                amount,
                pattern,
                severity,
                anomaly_score,
                timestamp: Utc::now(),
                flagged,
                notes: notes.to_string(),
            },
        );
        state
            .address_index
            .entry(from.clone())
            .or_default()
            .push(tx_id.clone());
        if to != from {
            state
                .address_index
                .entry(to.clone())
                .or_default()
                .push(tx_id.clone());
        }

        let mut raised_alert = None;
        if flagged {
            state.flagged_count += 1;
            let alert_id = state.next_alert_id;
            state.next_alert_id += 1;
            state.alerts.insert(
                alert_id,
                Alert {
                    id: alert_id,
                    target: from.clone(),
                    pattern,
                    severity,
                    description: format!(
                        "{pattern:?} pattern in transaction {tx_id} (anomaly score {anomaly_score})"
                    ),
                    timestamp: Utc::now(),
                    resolved: false,
                    resolver: None,
                },
            );
            raised_alert = Some(alert_id);
        }
        drop(state);

        self.sink.emit(GuardEvent::TransactionAnalyzed {
            tx_id: tx_id.clone(),
            pattern,
            severity,
            flagged,
        });

        if let Some(alert_id) = raised_alert {
            warn!(%tx_id, %from, ?pattern, anomaly_score, alert_id, "transaction flagged");
            self.sink.emit(GuardEvent::AlertRaised {
                alert_id,
                target: from.clone(),
                pattern,
                severity,
            });

            // Damped fold-in: the new score never purely replaces history.
            let current = self.risk.get_risk_score(from);
            let folded = ((current as u16 + anomaly_score as u16) / 2) as u8;
            self.risk.force_assess(
                from,
                RiskLevel::for_score(folded),
                folded,
                &format!("Flagged transaction {tx_id}: {pattern:?}"),
                caller,
            )?;

            // Forced override must come second so it wins over the average.
            if self.compliance.try_is_sanctioned(to)? {
                self.risk.force_assess(
                    from,
                    RiskLevel::Critical,
                    100,
                    REASON_SANCTION_INTERACTION,
                    caller,
                )?;
            }
        } else {
            debug!(%tx_id, ?pattern, anomaly_score, "transaction analyzed");
        }

        Ok(severity)
    }

    /// Mark an alert handled. Role: monitor-operator. One-way.
    pub fn resolve_alert(&self, caller: &AccountId, alert_id: u64) -> GuardResult<()> {
        self.authz.require(caller, Role::MonitorOperator)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let alert = state
            .alerts
            .get_mut(&alert_id)
            .ok_or_else(|| GuardError::NotFound(format!("alert {alert_id}")))?;
        if alert.resolved {
            return Err(GuardError::InvalidState(format!(
                "alert {alert_id} already resolved"
            )));
        }
        alert.resolved = true;
        alert.resolver = Some(caller.clone());
        drop(state);

        debug!(alert_id, %caller, "alert resolved");
        self.sink.emit(GuardEvent::AlertResolved { alert_id });
        Ok(())
    }

    /// Retune flagging thresholds. Role: administrator.
    pub fn update_thresholds(
        &self,
        caller: &AccountId,
        high_risk: u8,
        critical: u8,
    ) -> GuardResult<()> {
        self.authz.require(caller, Role::Administrator)?;
        validate_thresholds(high_risk, critical)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        state.high_threshold = high_risk;
        state.critical_threshold = critical;
        drop(state);

        debug!(high_risk, critical, "monitor thresholds updated");
        self.sink.emit(GuardEvent::ThresholdsUpdated {
            high_risk,
            critical,
        });
        Ok(())
    }

    pub fn get_transaction_analysis(&self, tx_id: &TxId) -> Option<TransactionAnalysis> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.analyses.get(tx_id).cloned())
    }

    /// Every transfer id the account appears in, as sender or receiver.
    pub fn get_address_transactions(&self, account: &AccountId) -> Vec<TxId> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.address_index.get(account).cloned())
            .unwrap_or_default()
    }

    pub fn get_alert(&self, alert_id: u64) -> Option<Alert> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.alerts.get(&alert_id).cloned())
    }

    pub fn flagged_count(&self) -> u64 {
        self.state.read().map(|s| s.flagged_count).unwrap_or(0)
    }

    pub fn alert_count(&self) -> usize {
        self.state.read().map(|s| s.alerts.len()).unwrap_or(0)
    }

    /// Current (high, critical) thresholds.
    pub fn thresholds(&self) -> (u8, u8) {
        self.state
            .read()
            .map(|s| (s.high_threshold, s.critical_threshold))
            .unwrap_or((DEFAULT_HIGH_THRESHOLD, DEFAULT_CRITICAL_THRESHOLD))
    }
}

/// Fixed precedence table, highest severity wins.
fn severity_for(pattern: PatternType, score: u8, high: u8, critical: u8) -> Severity {
    if pattern == PatternType::SanctionInteraction || score >= critical {
        Severity::Critical
    } else if pattern == PatternType::Mixing || score >= high {
        Severity::High
    } else if pattern == PatternType::RapidMovement || score >= 50 {
        Severity::Medium
    } else if pattern != PatternType::Normal || score >= 25 {
        Severity::Low
    } else {
        Severity::Info
    }
}

fn validate_thresholds(high_risk: u8, critical: u8) -> GuardResult<()> {
    if high_risk >= critical || critical > 100 {
        return Err(GuardError::Validation(format!(
            "thresholds must satisfy high ({high_risk}) < critical ({critical}) <= 100"
        )));
    }
    Ok(())
}
