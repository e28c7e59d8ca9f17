//! LedgerGuard risk ledger - authoritative store of per-account risk assessments
//!
//! One live assessment per account, overwritten on each write and logically
//! cleared (never deleted) by an auditor. Score and level are kept consistent
//! on every write; a per-level index is appended transactionally for audit
//! queries.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use ledgerguard_types::{
    AccountId, Authorizer, EventSink, GuardError, GuardEvent, GuardResult, RiskLevel, Role,
};

/// The live risk assessment of an account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// 0-100, always consistent with `level` via the score-to-level table.
    pub score: u8,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub assessor: AccountId,
    /// Cleared assessments stay on record with `active = false`.
    pub active: bool,
}

#[derive(Default)]
struct RiskState {
    assessments: HashMap<AccountId, RiskAssessment>,
    /// Append-only audit index: every assessment and level transition appends
    /// the account under the level it entered.
    level_index: HashMap<RiskLevel, Vec<AccountId>>,
}

/// Authoritative store of per-account risk assessments.
pub struct RiskLedger {
    state: RwLock<RiskState>,
    authz: Arc<dyn Authorizer>,
    sink: Arc<dyn EventSink>,
}

impl RiskLedger {
    pub fn new(authz: Arc<dyn Authorizer>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: RwLock::new(RiskState::default()),
            authz,
            sink,
        }
    }

    /// Record a risk assessment for an account. Role: risk-assessor.
    ///
    /// Overwrites any prior assessment. The supplied level must agree with
    /// the score-to-level table; a disagreeing pair is rejected rather than
    /// silently re-leveled.
    pub fn assess_risk(
        &self,
        caller: &AccountId,
        account: &AccountId,
        level: RiskLevel,
        score: u8,
        reason: &str,
    ) -> GuardResult<()> {
        self.authz.require(caller, Role::RiskAssessor)?;
        self.force_assess(account, level, score, reason, caller)
    }

    /// Ungated assessment write for trusted in-process collaborators
    /// (compliance bridge, transaction monitor). Same validation, no role check.
    pub fn force_assess(
        &self,
        account: &AccountId,
        level: RiskLevel,
        score: u8,
        reason: &str,
        assessor: &AccountId,
    ) -> GuardResult<()> {
        validate_account(account)?;
        validate_score(score)?;
        if reason.is_empty() {
            return Err(GuardError::Validation("assessment reason is empty".into()));
        }
        if RiskLevel::for_score(score) != level {
            return Err(GuardError::Validation(format!(
                "level {level:?} does not match score {score}"
            )));
        }

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let updated = state
            .assessments
            .get(account)
            .map(|a| a.active)
            .unwrap_or(false);

        state.assessments.insert(
            account.clone(),
            RiskAssessment {
                level,
                score,
                timestamp: Utc::now(),
                reason: reason.to_string(),
                assessor: assessor.clone(),
                active: true,
            },
        );
        state
            .level_index
            .entry(level)
            .or_default()
            .push(account.clone());
        drop(state);

        debug!(%account, ?level, score, updated, "risk assessed");
        self.sink.emit(GuardEvent::RiskAssessed {
            account: account.clone(),
            level,
            score,
            updated,
        });
        Ok(())
    }

    /// Re-score an account. Role: risk-assessor.
    ///
    /// Requires an active assessment; the level is recomputed from the new
    /// score and a level transition is recorded in the audit index.
    pub fn update_risk_score(
        &self,
        caller: &AccountId,
        account: &AccountId,
        new_score: u8,
    ) -> GuardResult<()> {
        self.authz.require(caller, Role::RiskAssessor)?;
        validate_score(new_score)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let assessment = state
            .assessments
            .get_mut(account)
            .filter(|a| a.active)
            .ok_or_else(|| {
                GuardError::NotFound(format!("no active risk assessment for {account}"))
            })?;

        let previous_level = assessment.level;
        let new_level = RiskLevel::for_score(new_score);
        assessment.score = new_score;
        assessment.level = new_level;
        assessment.timestamp = Utc::now();
        assessment.assessor = caller.clone();

        if new_level != previous_level {
            state
                .level_index
                .entry(new_level)
                .or_default()
                .push(account.clone());
        }
        drop(state);

        debug!(%account, score = new_score, ?new_level, ?previous_level, "risk score updated");
        self.sink.emit(GuardEvent::RiskScoreUpdated {
            account: account.clone(),
            score: new_score,
            level: new_level,
            previous_level,
        });
        Ok(())
    }

    /// Deactivate an account's assessment, preserving history. Role: auditor.
    pub fn clear_risk(&self, caller: &AccountId, account: &AccountId) -> GuardResult<()> {
        self.authz.require(caller, Role::Auditor)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let assessment = state
            .assessments
            .get_mut(account)
            .filter(|a| a.active)
            .ok_or_else(|| {
                GuardError::NotFound(format!("no active risk assessment for {account}"))
            })?;
        assessment.active = false;
        drop(state);

        debug!(%account, "risk cleared");
        self.sink.emit(GuardEvent::RiskCleared {
            account: account.clone(),
        });
        Ok(())
    }

    /// The stored assessment, active or not.
    pub fn get_risk_assessment(&self, account: &AccountId) -> Option<RiskAssessment> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.assessments.get(account).cloned())
    }

    /// Current level; `None` if the account has no active assessment.
    pub fn get_risk_level(&self, account: &AccountId) -> RiskLevel {
        self.active_assessment(account)
            .map(|a| a.level)
            .unwrap_or_default()
    }

    /// `get_risk_level` with lock failure surfaced instead of defaulted.
    ///
    /// Decision paths use this so that unreadable risk state denies rather
    /// than reading as no-risk.
    pub fn try_get_risk_level(&self, account: &AccountId) -> GuardResult<RiskLevel> {
        let state = self.state.read().map_err(|_| GuardError::poisoned())?;
        Ok(state
            .assessments
            .get(account)
            .filter(|a| a.active)
            .map(|a| a.level)
            .unwrap_or_default())
    }

    /// Current score; 0 if the account has no active assessment.
    pub fn get_risk_score(&self, account: &AccountId) -> u8 {
        self.active_assessment(account)
            .map(|a| a.score)
            .unwrap_or(0)
    }

    /// Active and High or Critical.
    pub fn is_high_risk(&self, account: &AccountId) -> bool {
        self.get_risk_level(account).is_high_risk()
    }

    /// Audit index: every account that entered `level`, in write order.
    pub fn accounts_by_level(&self, level: RiskLevel) -> Vec<AccountId> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.level_index.get(&level).cloned())
            .unwrap_or_default()
    }

    /// Number of accounts with a stored assessment (active or cleared).
    pub fn assessment_count(&self) -> usize {
        self.state.read().map(|s| s.assessments.len()).unwrap_or(0)
    }

    fn active_assessment(&self, account: &AccountId) -> Option<RiskAssessment> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.assessments.get(account).filter(|a| a.active).cloned())
    }
}

fn validate_account(account: &AccountId) -> GuardResult<()> {
    if account.is_empty() {
        return Err(GuardError::Validation("empty account id".into()));
    }
    Ok(())
}

fn validate_score(score: u8) -> GuardResult<()> {
    if score > 100 {
        return Err(GuardError::Validation(format!(
            "score {score} exceeds 100"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerguard_types::{AllowAll, MemorySink, RoleTable};
    use proptest::prelude::*;

    fn ledger() -> RiskLedger {
        RiskLedger::new(Arc::new(AllowAll), Arc::new(MemorySink::new()))
    }

    fn acct(s: &str) -> AccountId {
        AccountId::new(s)
    }

    #[test]
    fn assess_then_read_back() {
        let ledger = ledger();
        ledger
            .assess_risk(&acct("oracle"), &acct("a"), RiskLevel::High, 75, "velocity")
            .unwrap();

        assert_eq!(ledger.get_risk_score(&acct("a")), 75);
        assert_eq!(ledger.get_risk_level(&acct("a")), RiskLevel::High);
        assert!(ledger.is_high_risk(&acct("a")));

        let stored = ledger.get_risk_assessment(&acct("a")).unwrap();
        assert_eq!(stored.reason, "velocity");
        assert_eq!(stored.assessor, acct("oracle"));
        assert!(stored.active);
    }

    #[test]
    fn assess_rejects_bad_inputs() {
        let ledger = ledger();
        assert!(matches!(
            ledger.assess_risk(&acct("o"), &acct("a"), RiskLevel::Critical, 120, "r"),
            Err(GuardError::Validation(_))
        ));
        assert!(matches!(
            ledger.assess_risk(&acct("o"), &acct("a"), RiskLevel::Low, 15, ""),
            Err(GuardError::Validation(_))
        ));
        assert!(matches!(
            ledger.assess_risk(&acct("o"), &acct(""), RiskLevel::Low, 15, "r"),
            Err(GuardError::Validation(_))
        ));
        // Level must agree with the table
        assert!(matches!(
            ledger.assess_risk(&acct("o"), &acct("a"), RiskLevel::Low, 95, "r"),
            Err(GuardError::Validation(_))
        ));
        // Nothing was written
        assert!(ledger.get_risk_assessment(&acct("a")).is_none());
    }

    #[test]
    fn assess_requires_role() {
        let roles = Arc::new(RoleTable::new());
        let ledger = RiskLedger::new(roles.clone(), Arc::new(MemorySink::new()));

        let err = ledger
            .assess_risk(&acct("nobody"), &acct("a"), RiskLevel::Low, 10, "r")
            .unwrap_err();
        assert!(matches!(err, GuardError::Unauthorized { .. }));

        roles.grant(acct("oracle"), Role::RiskAssessor).unwrap();
        ledger
            .assess_risk(&acct("oracle"), &acct("a"), RiskLevel::Low, 10, "r")
            .unwrap();
    }

    #[test]
    fn new_versus_updated_event() {
        let sink = Arc::new(MemorySink::new());
        let ledger = RiskLedger::new(Arc::new(AllowAll), sink.clone());

        ledger
            .assess_risk(&acct("o"), &acct("a"), RiskLevel::Low, 10, "first")
            .unwrap();
        ledger
            .assess_risk(&acct("o"), &acct("a"), RiskLevel::Medium, 50, "second")
            .unwrap();

        let events = sink.take();
        assert_eq!(
            events[0],
            GuardEvent::RiskAssessed {
                account: acct("a"),
                level: RiskLevel::Low,
                score: 10,
                updated: false,
            }
        );
        assert_eq!(
            events[1],
            GuardEvent::RiskAssessed {
                account: acct("a"),
                level: RiskLevel::Medium,
                score: 50,
                updated: true,
            }
        );
    }

    #[test]
    fn update_score_recomputes_level() {
        let ledger = ledger();
        ledger
            .assess_risk(&acct("o"), &acct("a"), RiskLevel::Low, 20, "seed")
            .unwrap();

        ledger.update_risk_score(&acct("o"), &acct("a"), 85).unwrap();
        assert_eq!(ledger.get_risk_level(&acct("a")), RiskLevel::High);
        assert_eq!(ledger.get_risk_score(&acct("a")), 85);

        // Transition appended to the index under the new level
        assert!(ledger.accounts_by_level(RiskLevel::High).contains(&acct("a")));
    }

    #[test]
    fn update_score_requires_active_assessment() {
        let ledger = ledger();
        assert!(matches!(
            ledger.update_risk_score(&acct("o"), &acct("ghost"), 50),
            Err(GuardError::NotFound(_))
        ));

        ledger
            .assess_risk(&acct("o"), &acct("a"), RiskLevel::Low, 20, "seed")
            .unwrap();
        ledger.clear_risk(&acct("aud"), &acct("a")).unwrap();
        assert!(matches!(
            ledger.update_risk_score(&acct("o"), &acct("a"), 50),
            Err(GuardError::NotFound(_))
        ));
    }

    #[test]
    fn clear_preserves_history() {
        let ledger = ledger();
        ledger
            .assess_risk(&acct("o"), &acct("a"), RiskLevel::High, 80, "seed")
            .unwrap();
        ledger.clear_risk(&acct("aud"), &acct("a")).unwrap();

        // Accessors fall back to inactive defaults
        assert_eq!(ledger.get_risk_level(&acct("a")), RiskLevel::None);
        assert_eq!(ledger.get_risk_score(&acct("a")), 0);
        assert!(!ledger.is_high_risk(&acct("a")));

        // But the record itself survives
        let stored = ledger.get_risk_assessment(&acct("a")).unwrap();
        assert!(!stored.active);
        assert_eq!(stored.score, 80);

        // Clearing twice fails
        assert!(matches!(
            ledger.clear_risk(&acct("aud"), &acct("a")),
            Err(GuardError::NotFound(_))
        ));
    }

    #[test]
    fn level_index_is_append_only() {
        let ledger = ledger();
        ledger
            .assess_risk(&acct("o"), &acct("a"), RiskLevel::Medium, 50, "r")
            .unwrap();
        ledger
            .assess_risk(&acct("o"), &acct("b"), RiskLevel::Medium, 45, "r")
            .unwrap();
        ledger.update_risk_score(&acct("o"), &acct("a"), 95).unwrap();

        assert_eq!(
            ledger.accounts_by_level(RiskLevel::Medium),
            vec![acct("a"), acct("b")]
        );
        assert_eq!(ledger.accounts_by_level(RiskLevel::Critical), vec![acct("a")]);
    }

    #[test]
    fn poisoned_lock_surfaces_in_checked_reads() {
        let ledger = Arc::new(ledger());
        ledger
            .assess_risk(&acct("o"), &acct("a"), RiskLevel::High, 75, "seed")
            .unwrap();

        let poisoner = ledger.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.state.write().unwrap();
            panic!("poison the state lock");
        })
        .join();

        assert!(matches!(
            ledger.try_get_risk_level(&acct("a")),
            Err(GuardError::InvalidState(_))
        ));
        // The infallible query keeps its documented default
        assert_eq!(ledger.get_risk_level(&acct("a")), RiskLevel::None);
    }

    proptest! {
        #[test]
        fn assess_round_trips_any_valid_score(score in 0u8..=100) {
            let ledger = ledger();
            let level = RiskLevel::for_score(score);
            ledger
                .assess_risk(&acct("o"), &acct("a"), level, score, "prop")
                .unwrap();
            prop_assert_eq!(ledger.get_risk_score(&acct("a")), score);
            prop_assert_eq!(ledger.get_risk_level(&acct("a")), level);
        }
    }
}
