//! LedgerGuard audit store
//!
//! Lifecycle store for compliance reports. Status moves strictly forward
//! (DRAFT -> SUBMITTED -> UNDER_REVIEW -> APPROVED|REJECTED -> ARCHIVED);
//! sealing is only reachable from APPROVED and freezes the record
//! permanently. Reports reference accounts for traceability and never
//! drive enforcement decisions.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use ledgerguard_types::{
    AccountId, Authorizer, Digest, EventSink, GuardError, GuardEvent, GuardResult, Role,
};

/// Category of a compliance report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportType {
    SuspiciousActivity,
    SanctionsReview,
    KycRefresh,
    PeriodicAudit,
    Incident,
}

/// Report lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    #[default]
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Archived,
}

/// A compliance report. The id doubles as an audit-token identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub id: u64,
    pub report_type: ReportType,
    pub status: ReportStatus,
    pub subject: AccountId,
    pub issuer: AccountId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewer: Option<AccountId>,
    /// Content-addressed reference to off-core report storage.
    pub content_ref: String,
    pub data_digest: Digest,
    pub sealed: bool,
}

#[derive(Default)]
struct AuditState {
    reports: HashMap<u64, ComplianceReport>,
    next_id: u64,
    subject_index: HashMap<AccountId, Vec<u64>>,
    issuer_index: HashMap<AccountId, Vec<u64>>,
}

/// Append-mostly store of sealed compliance reports.
pub struct AuditStore {
    state: RwLock<AuditState>,
    authz: Arc<dyn Authorizer>,
    sink: Arc<dyn EventSink>,
}

impl AuditStore {
    pub fn new(authz: Arc<dyn Authorizer>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: RwLock::new(AuditState {
                next_id: 1,
                ..AuditState::default()
            }),
            authz,
            sink,
        }
    }

    /// Open a DRAFT report owned by the caller. Role: compliance-officer.
    pub fn create_report(
        &self,
        caller: &AccountId,
        report_type: ReportType,
        subject: &AccountId,
        content_ref: &str,
        data_digest: Digest,
    ) -> GuardResult<u64> {
        self.authz.require(caller, Role::ComplianceOfficer)?;
        if subject.is_empty() {
            return Err(GuardError::Validation("empty subject account".into()));
        }
        if content_ref.is_empty() {
            return Err(GuardError::Validation("empty content reference".into()));
        }

        let now = Utc::now();
        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let id = state.next_id;
        state.next_id += 1;
        state.reports.insert(
            id,
            ComplianceReport {
                id,
                report_type,
                status: ReportStatus::Draft,
                subject: subject.clone(),
                issuer: caller.clone(),
                created_at: now,
                updated_at: now,
                reviewed_at: None,
                reviewer: None,
                content_ref: content_ref.to_string(),
                data_digest,
                sealed: false,
            },
        );
        state
            .subject_index
            .entry(subject.clone())
            .or_default()
            .push(id);
        state
            .issuer_index
            .entry(caller.clone())
            .or_default()
            .push(id);
        drop(state);

        debug!(report_id = id, %subject, ?report_type, "report created");
        self.sink.emit(GuardEvent::ReportCreated {
            report_id: id,
            subject: subject.clone(),
        });
        Ok(id)
    }

    /// Replace the content reference and digest. Owner only; any unsealed,
    /// unarchived state.
    pub fn update_report_data(
        &self,
        caller: &AccountId,
        id: u64,
        content_ref: &str,
        data_digest: Digest,
    ) -> GuardResult<()> {
        if content_ref.is_empty() {
            return Err(GuardError::Validation("empty content reference".into()));
        }

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let report = get_unsealed(&mut state, id)?;
        if report.issuer != *caller {
            return Err(GuardError::NotOwner {
                caller: caller.clone(),
                report_id: id,
            });
        }
        if report.status == ReportStatus::Archived {
            return Err(GuardError::InvalidState(format!(
                "report {id} is archived"
            )));
        }
        report.content_ref = content_ref.to_string();
        report.data_digest = data_digest;
        report.updated_at = Utc::now();
        drop(state);

        debug!(report_id = id, "report data updated");
        self.sink.emit(GuardEvent::ReportUpdated { report_id: id });
        Ok(())
    }

    /// DRAFT -> SUBMITTED. Owner only.
    pub fn submit_report(&self, caller: &AccountId, id: u64) -> GuardResult<()> {
        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let report = get_unsealed(&mut state, id)?;
        if report.issuer != *caller {
            return Err(GuardError::NotOwner {
                caller: caller.clone(),
                report_id: id,
            });
        }
        if report.status != ReportStatus::Draft {
            return Err(GuardError::InvalidState(format!(
                "report {id} is not a draft"
            )));
        }
        report.status = ReportStatus::Submitted;
        report.updated_at = Utc::now();
        drop(state);

        debug!(report_id = id, "report submitted");
        self.sink.emit(GuardEvent::ReportSubmitted { report_id: id });
        Ok(())
    }

    /// SUBMITTED -> UNDER_REVIEW. Role: auditor.
    pub fn start_review(&self, caller: &AccountId, id: u64) -> GuardResult<()> {
        self.authz.require(caller, Role::Auditor)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let report = get_unsealed(&mut state, id)?;
        if report.status != ReportStatus::Submitted {
            return Err(GuardError::InvalidState(format!(
                "report {id} is not submitted"
            )));
        }
        report.status = ReportStatus::UnderReview;
        report.reviewer = Some(caller.clone());
        report.updated_at = Utc::now();
        drop(state);

        debug!(report_id = id, reviewer = %caller, "report review started");
        self.sink.emit(GuardEvent::ReportReviewStarted {
            report_id: id,
            reviewer: caller.clone(),
        });
        Ok(())
    }

    /// SUBMITTED|UNDER_REVIEW -> APPROVED or REJECTED. Role: auditor.
    pub fn review_report(&self, caller: &AccountId, id: u64, approve: bool) -> GuardResult<()> {
        self.authz.require(caller, Role::Auditor)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let report = get_unsealed(&mut state, id)?;
        if !matches!(
            report.status,
            ReportStatus::Submitted | ReportStatus::UnderReview
        ) {
            return Err(GuardError::InvalidState(format!(
                "report {id} is not reviewable in state {:?}",
                report.status
            )));
        }
        report.status = if approve {
            ReportStatus::Approved
        } else {
            ReportStatus::Rejected
        };
        report.reviewer = Some(caller.clone());
        report.reviewed_at = Some(Utc::now());
        report.updated_at = Utc::now();
        drop(state);

        debug!(report_id = id, approve, "report reviewed");
        self.sink.emit(GuardEvent::ReportReviewed {
            report_id: id,
            approved: approve,
        });
        Ok(())
    }

    /// Permanently freeze an APPROVED report. Role: auditor. Irreversible;
    /// every later mutating call on the report fails.
    pub fn seal_report(&self, caller: &AccountId, id: u64) -> GuardResult<()> {
        self.authz.require(caller, Role::Auditor)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let report = get_unsealed(&mut state, id)?;
        if report.status != ReportStatus::Approved {
            return Err(GuardError::InvalidState(format!(
                "report {id} is not approved"
            )));
        }
        report.sealed = true;
        report.updated_at = Utc::now();
        drop(state);

        debug!(report_id = id, "report sealed");
        self.sink.emit(GuardEvent::ReportSealed { report_id: id });
        Ok(())
    }

    /// APPROVED|REJECTED -> ARCHIVED. Role: auditor. Sealed reports stay
    /// as-is and cannot be archived.
    pub fn archive_report(&self, caller: &AccountId, id: u64) -> GuardResult<()> {
        self.authz.require(caller, Role::Auditor)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let report = get_unsealed(&mut state, id)?;
        if !matches!(
            report.status,
            ReportStatus::Approved | ReportStatus::Rejected
        ) {
            return Err(GuardError::InvalidState(format!(
                "report {id} is not reviewed yet"
            )));
        }
        report.status = ReportStatus::Archived;
        report.updated_at = Utc::now();
        drop(state);

        debug!(report_id = id, "report archived");
        self.sink.emit(GuardEvent::ReportArchived { report_id: id });
        Ok(())
    }

    /// Recompute the digest of `candidate` and compare to the stored digest.
    /// Pure integrity check, no state change.
    pub fn verify_report_data(&self, id: u64, candidate: &[u8]) -> GuardResult<bool> {
        let state = self.state.read().map_err(|_| GuardError::poisoned())?;
        let report = state
            .reports
            .get(&id)
            .ok_or_else(|| GuardError::NotFound(format!("report {id}")))?;
        Ok(report.data_digest == Digest::of(candidate))
    }

    pub fn get_report(&self, id: u64) -> Option<ComplianceReport> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.reports.get(&id).cloned())
    }

    pub fn reports_by_subject(&self, subject: &AccountId) -> Vec<u64> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.subject_index.get(subject).cloned())
            .unwrap_or_default()
    }

    pub fn reports_by_issuer(&self, issuer: &AccountId) -> Vec<u64> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.issuer_index.get(issuer).cloned())
            .unwrap_or_default()
    }

    pub fn report_count(&self) -> usize {
        self.state.read().map(|s| s.reports.len()).unwrap_or(0)
    }
}

/// Look up a report for mutation, rejecting sealed records up front.
fn get_unsealed(state: &mut AuditState, id: u64) -> GuardResult<&mut ComplianceReport> {
    let report = state
        .reports
        .get_mut(&id)
        .ok_or_else(|| GuardError::NotFound(format!("report {id}")))?;
    if report.sealed {
        return Err(GuardError::InvalidState(format!("report {id} is sealed")));
    }
    Ok(report)
}
