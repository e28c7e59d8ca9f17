//! LedgerGuard compliance bridge
//!
//! Ingests sanction/jurisdiction/PEP facts from registered external data
//! sources, owns the long-lived sanction flags, and pushes forced risk
//! assessments into the risk ledger. The sanction flag is authoritative and
//! independent of the transient per-account check snapshot.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use ledgerguard_risk::RiskLedger;
use ledgerguard_types::{
    AccountId, Authorizer, EventSink, GuardError, GuardEvent, GuardResult, RiskLevel, Role,
    SourceId,
};

/// Escalation reason written when a compliance check finds a sanction hit.
pub const REASON_SANCTIONED: &str = "Sanctioned in compliance check";
/// Escalation reason written when a compliance check flags a PEP.
pub const REASON_PEP: &str = "PEP flagged in compliance check";

/// A registered external compliance feed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataSource {
    pub id: SourceId,
    pub name: String,
    pub endpoint: String,
    pub registered_at: DateTime<Utc>,
    /// Refreshed each time the source is cited by an ingestion call.
    pub last_update: DateTime<Utc>,
    pub active: bool,
}

/// Point-in-time snapshot of the last compliance check for an account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub is_sanctioned: bool,
    pub is_pep: bool,
    pub jurisdiction: String,
    pub timestamp: DateTime<Utc>,
    pub source_id: SourceId,
}

#[derive(Default)]
struct ComplianceState {
    sources: HashMap<SourceId, DataSource>,
    sanctioned: HashSet<AccountId>,
    sanctioned_jurisdictions: HashSet<String>,
    checks: HashMap<AccountId, ComplianceCheck>,
}

/// Bridge between external sanction/jurisdiction feeds and the risk ledger.
pub struct ComplianceBridge {
    state: RwLock<ComplianceState>,
    risk: Arc<RiskLedger>,
    authz: Arc<dyn Authorizer>,
    sink: Arc<dyn EventSink>,
}

impl ComplianceBridge {
    pub fn new(
        risk: Arc<RiskLedger>,
        authz: Arc<dyn Authorizer>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            state: RwLock::new(ComplianceState::default()),
            risk,
            authz,
            sink,
        }
    }

    /// Register an external feed. Role: administrator.
    pub fn register_data_source(
        &self,
        caller: &AccountId,
        name: &str,
        endpoint: &str,
    ) -> GuardResult<SourceId> {
        self.authz.require(caller, Role::Administrator)?;
        if name.is_empty() || endpoint.is_empty() {
            return Err(GuardError::Validation(
                "data source name and endpoint are required".into(),
            ));
        }

        let id = SourceId::generate();
        let now = Utc::now();
        let source = DataSource {
            id: id.clone(),
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            registered_at: now,
            last_update: now,
            active: true,
        };

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        state.sources.insert(id.clone(), source);
        drop(state);

        debug!(source_id = %id, name, "data source registered");
        self.sink.emit(GuardEvent::DataSourceRegistered {
            source_id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    /// Activate or deactivate a registered feed. Role: administrator.
    ///
    /// Citations of a deactivated source fail with `InvalidSource`.
    pub fn set_source_active(
        &self,
        caller: &AccountId,
        source_id: &SourceId,
        active: bool,
    ) -> GuardResult<()> {
        self.authz.require(caller, Role::Administrator)?;
        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let source = state
            .sources
            .get_mut(source_id)
            .ok_or_else(|| GuardError::InvalidSource(source_id.to_string()))?;
        source.active = active;
        Ok(())
    }

    /// Set the long-lived sanction flag and force the account to maximum
    /// risk, unconditionally and synchronously. Role: data-updater.
    pub fn sanction_address(
        &self,
        caller: &AccountId,
        account: &AccountId,
        source_id: &SourceId,
        reason: &str,
    ) -> GuardResult<()> {
        self.authz.require(caller, Role::DataUpdater)?;
        if account.is_empty() {
            return Err(GuardError::Validation("empty account id".into()));
        }
        if reason.is_empty() {
            return Err(GuardError::Validation("sanction reason is empty".into()));
        }

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        cite_source(&mut state, source_id)?;
        state.sanctioned.insert(account.clone());
        drop(state);

        // Sanctioning always forces CRITICAL/100, regardless of prior state.
        self.risk
            .force_assess(account, RiskLevel::Critical, 100, reason, caller)?;

        warn!(%account, %source_id, reason, "address sanctioned");
        self.sink.emit(GuardEvent::AddressSanctioned {
            account: account.clone(),
            source_id: source_id.clone(),
        });
        Ok(())
    }

    /// Unset the sanction flag. Role: validator.
    ///
    /// Does not lower the risk score the sanction forced; risk history is
    /// cleared separately by an auditor on the risk ledger.
    pub fn clear_sanction(&self, caller: &AccountId, account: &AccountId) -> GuardResult<()> {
        self.authz.require(caller, Role::Validator)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        if !state.sanctioned.remove(account) {
            return Err(GuardError::NotFound(format!(
                "no sanction flag set for {account}"
            )));
        }
        drop(state);

        debug!(%account, "sanction cleared");
        self.sink.emit(GuardEvent::SanctionCleared {
            account: account.clone(),
        });
        Ok(())
    }

    /// Mark an entire jurisdiction as sanctioned. Role: data-updater.
    pub fn sanction_jurisdiction(&self, caller: &AccountId, code: &str) -> GuardResult<()> {
        self.authz.require(caller, Role::DataUpdater)?;
        if code.is_empty() {
            return Err(GuardError::Validation("empty jurisdiction code".into()));
        }

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        state.sanctioned_jurisdictions.insert(code.to_string());
        drop(state);

        warn!(code, "jurisdiction sanctioned");
        self.sink.emit(GuardEvent::JurisdictionSanctioned {
            code: code.to_string(),
        });
        Ok(())
    }

    /// Record a compliance check snapshot and auto-escalate risk on
    /// sanction or PEP hits. Role: data-updater.
    pub fn perform_compliance_check(
        &self,
        caller: &AccountId,
        account: &AccountId,
        jurisdiction: &str,
        is_pep: bool,
        source_id: &SourceId,
    ) -> GuardResult<()> {
        self.authz.require(caller, Role::DataUpdater)?;
        if account.is_empty() {
            return Err(GuardError::Validation("empty account id".into()));
        }
        if jurisdiction.is_empty() {
            return Err(GuardError::Validation("empty jurisdiction code".into()));
        }

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        cite_source(&mut state, source_id)?;
        let is_sanctioned = state.sanctioned.contains(account)
            || state.sanctioned_jurisdictions.contains(jurisdiction);
        state.checks.insert(
            account.clone(),
            ComplianceCheck {
                is_sanctioned,
                is_pep,
                jurisdiction: jurisdiction.to_string(),
                timestamp: Utc::now(),
                source_id: source_id.clone(),
            },
        );
        drop(state);

        if is_sanctioned {
            self.risk
                .force_assess(account, RiskLevel::Critical, 100, REASON_SANCTIONED, caller)?;
        } else if is_pep {
            self.risk
                .force_assess(account, RiskLevel::High, 75, REASON_PEP, caller)?;
        }

        debug!(%account, jurisdiction, is_sanctioned, is_pep, "compliance check recorded");
        self.sink.emit(GuardEvent::ComplianceChecked {
            account: account.clone(),
            sanctioned: is_sanctioned,
            pep: is_pep,
        });
        Ok(())
    }

    /// The authoritative sanction flag.
    pub fn is_sanctioned(&self, account: &AccountId) -> bool {
        self.try_is_sanctioned(account).unwrap_or(false)
    }

    /// `is_sanctioned` with lock failure surfaced instead of defaulted.
    ///
    /// Decision paths use this so that unreadable sanction state denies
    /// rather than reading as unsanctioned.
    pub fn try_is_sanctioned(&self, account: &AccountId) -> GuardResult<bool> {
        let state = self.state.read().map_err(|_| GuardError::poisoned())?;
        Ok(state.sanctioned.contains(account))
    }

    /// Compliance as of the last stored check snapshot.
    ///
    /// Point-in-time by design: the snapshot's sanction flag and recorded
    /// jurisdiction are used, not the live flag. An account with no check
    /// on record is not compliant.
    pub fn is_compliant(&self, account: &AccountId) -> bool {
        self.state
            .read()
            .map(|s| match s.checks.get(account) {
                Some(check) => {
                    !check.is_sanctioned
                        && !s.sanctioned_jurisdictions.contains(&check.jurisdiction)
                }
                None => false,
            })
            .unwrap_or(false)
    }

    pub fn get_compliance_check(&self, account: &AccountId) -> Option<ComplianceCheck> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.checks.get(account).cloned())
    }

    pub fn get_data_source(&self, source_id: &SourceId) -> Option<DataSource> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.sources.get(source_id).cloned())
    }

    pub fn list_data_sources(&self) -> Vec<DataSource> {
        self.state
            .read()
            .map(|s| s.sources.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_jurisdiction_sanctioned(&self, code: &str) -> bool {
        self.state
            .read()
            .map(|s| s.sanctioned_jurisdictions.contains(code))
            .unwrap_or(false)
    }

    pub fn sanctioned_count(&self) -> usize {
        self.state.read().map(|s| s.sanctioned.len()).unwrap_or(0)
    }
}

/// Require an active source and refresh its `last_update`.
fn cite_source(state: &mut ComplianceState, source_id: &SourceId) -> GuardResult<()> {
    let source = state
        .sources
        .get_mut(source_id)
        .filter(|s| s.active)
        .ok_or_else(|| GuardError::InvalidSource(source_id.to_string()))?;
    source.last_update = Utc::now();
    Ok(())
}
