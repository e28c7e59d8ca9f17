//! LedgerGuard enforcement engine
//!
//! The decision function evaluated synchronously before a transfer is
//! admitted, plus the freeze/whitelist/daily-limit state it reads and the
//! delayed-transaction review queue. `check_transaction` is read-only and
//! deterministic against current state; spending is recorded separately by
//! the transfer-execution collaborator after a transfer completes.

#![deny(unsafe_code)]

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use ledgerguard_compliance::ComplianceBridge;
use ledgerguard_risk::RiskLedger;
use ledgerguard_types::{
    AccountId, Authorizer, EnforcementAction, EventSink, GuardError, GuardEvent, GuardResult,
    RiskLevel, Role,
};

/// Rolling window after which per-account spend counters reset.
const SPEND_WINDOW: Duration = Duration::days(1);

/// Enforcement state for one account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountStatus {
    pub frozen: bool,
    pub whitelisted: bool,
    /// 0 means the global default limit applies.
    pub daily_limit: u64,
    pub daily_spent: u64,
    pub last_reset: DateTime<Utc>,
    pub freeze_timestamp: Option<DateTime<Utc>>,
    pub freeze_initiator: Option<AccountId>,
    pub freeze_reason: Option<String>,
}

impl AccountStatus {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            frozen: false,
            whitelisted: false,
            daily_limit: 0,
            daily_spent: 0,
            last_reset: now,
            freeze_timestamp: None,
            freeze_initiator: None,
            freeze_reason: None,
        }
    }
}

/// A transfer held for review before it may execute.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelayedTransaction {
    pub id: u64,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: u64,
    /// Opaque settlement payload handed back to the executing collaborator.
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub delay_until: DateTime<Utc>,
    pub approved: bool,
    pub executed: bool,
    pub reviewer: Option<AccountId>,
}

/// The decision for a prospective transfer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub allowed: bool,
    pub action: EnforcementAction,
    pub reason: String,
}

impl Verdict {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            action: EnforcementAction::None,
            reason: reason.into(),
        }
    }

    fn deny(action: EnforcementAction, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            action,
            reason: reason.into(),
        }
    }
}

/// Construction-time knobs for the engine.
#[derive(Clone, Debug)]
pub struct EnforcementConfig {
    /// Applied when an account has no configured limit. 0 disables the check.
    pub default_daily_limit: u64,
    /// Review period stamped onto delayed transactions.
    pub delay_period: Duration,
    /// Initial global enable flag.
    pub enabled: bool,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            default_daily_limit: 1_000_000,
            delay_period: Duration::hours(24),
            enabled: true,
        }
    }
}

struct EnforcementState {
    statuses: HashMap<AccountId, AccountStatus>,
    delayed: HashMap<u64, DelayedTransaction>,
    next_delayed_id: u64,
    enabled: bool,
}

/// Decides, before a transfer is admitted, whether it proceeds, is delayed,
/// is capped, or is refused outright.
pub struct EnforcementEngine {
    state: RwLock<EnforcementState>,
    default_daily_limit: u64,
    delay_period: Duration,
    risk: Arc<RiskLedger>,
    compliance: Arc<ComplianceBridge>,
    authz: Arc<dyn Authorizer>,
    sink: Arc<dyn EventSink>,
}

impl EnforcementEngine {
    pub fn new(
        config: EnforcementConfig,
        risk: Arc<RiskLedger>,
        compliance: Arc<ComplianceBridge>,
        authz: Arc<dyn Authorizer>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            state: RwLock::new(EnforcementState {
                statuses: HashMap::new(),
                delayed: HashMap::new(),
                next_delayed_id: 1,
                enabled: config.enabled,
            }),
            default_daily_limit: config.default_daily_limit,
            delay_period: config.delay_period,
            risk,
            compliance,
            authz,
            sink,
        }
    }

    /// The decision function. Read-only; precedence is strict, first match
    /// wins. Whitelisting is an absolute override and is evaluated before
    /// freeze and sanction checks by design.
    pub fn check_transaction(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Verdict {
        let verdict = self.evaluate(from, to, amount, now);
        if !verdict.allowed {
            self.sink.emit(GuardEvent::TransactionBlocked {
                from: from.clone(),
                to: to.clone(),
                amount,
                action: verdict.action,
                reason: verdict.reason.clone(),
            });
        }
        verdict
    }

    fn evaluate(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Verdict {
        match self.evaluate_checked(from, to, amount, now) {
            Ok(verdict) => verdict,
            // Policy state that cannot be read cannot prove the transfer safe.
            Err(_) => Verdict::deny(EnforcementAction::Block, "Policy state unavailable"),
        }
    }

    fn evaluate_checked(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
        now: DateTime<Utc>,
    ) -> GuardResult<Verdict> {
        let state = self.state.read().map_err(|_| GuardError::poisoned())?;

        if !state.enabled {
            return Ok(Verdict::allow("Enforcement disabled"));
        }

        let sender = state.statuses.get(from);
        let receiver = state.statuses.get(to);

        if sender.map(|s| s.whitelisted).unwrap_or(false) {
            return Ok(Verdict::allow("Whitelisted"));
        }
        if sender.map(|s| s.frozen).unwrap_or(false) {
            return Ok(Verdict::deny(
                EnforcementAction::Freeze,
                "Sender account is frozen",
            ));
        }
        if receiver.map(|s| s.frozen).unwrap_or(false) {
            return Ok(Verdict::deny(
                EnforcementAction::Block,
                "Receiver account is frozen",
            ));
        }
        if self.compliance.try_is_sanctioned(from)? {
            return Ok(Verdict::deny(
                EnforcementAction::Freeze,
                "Sender is sanctioned",
            ));
        }
        if self.compliance.try_is_sanctioned(to)? {
            return Ok(Verdict::deny(
                EnforcementAction::Block,
                "Receiver is sanctioned",
            ));
        }

        let sender_level = self.risk.try_get_risk_level(from)?;
        if sender_level == RiskLevel::Critical {
            return Ok(Verdict::deny(
                EnforcementAction::Freeze,
                "Sender risk level is critical",
            ));
        }
        if self.risk.try_get_risk_level(to)? == RiskLevel::Critical {
            return Ok(Verdict::deny(
                EnforcementAction::Block,
                "Receiver risk level is critical",
            ));
        }
        if sender_level == RiskLevel::High {
            return Ok(Verdict::deny(
                EnforcementAction::Delay,
                "High risk transaction requires review",
            ));
        }

        if self.would_exceed_limit(sender, amount, now) {
            return Ok(Verdict::deny(
                EnforcementAction::Limit,
                "Daily transfer limit exceeded",
            ));
        }

        Ok(Verdict::allow(""))
    }

    fn would_exceed_limit(
        &self,
        status: Option<&AccountStatus>,
        amount: u64,
        now: DateTime<Utc>,
    ) -> bool {
        let configured = status.map(|s| s.daily_limit).unwrap_or(0);
        let effective = if configured > 0 {
            configured
        } else {
            self.default_daily_limit
        };
        if effective == 0 {
            return false;
        }
        let spent = match status {
            Some(s) if !window_elapsed(s.last_reset, now) => s.daily_spent,
            _ => 0,
        };
        spent.saturating_add(amount) > effective
    }

    /// Add a completed transfer to the sender's rolling spend counter.
    /// Role: enforcer. Called by the execution collaborator, never by
    /// `check_transaction`.
    pub fn record_spending(
        &self,
        caller: &AccountId,
        account: &AccountId,
        amount: u64,
        now: DateTime<Utc>,
    ) -> GuardResult<()> {
        self.authz.require(caller, Role::Enforcer)?;
        validate_account(account)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let status = state
            .statuses
            .entry(account.clone())
            .or_insert_with(|| AccountStatus::new(now));
        if window_elapsed(status.last_reset, now) {
            status.daily_spent = 0;
            status.last_reset = now;
        }
        status.daily_spent = status.daily_spent.saturating_add(amount);
        let daily_spent = status.daily_spent;
        drop(state);

        debug!(%account, amount, daily_spent, "spending recorded");
        self.sink.emit(GuardEvent::SpendingRecorded {
            account: account.clone(),
            amount,
            daily_spent,
        });
        Ok(())
    }

    /// Freeze an account. Role: enforcer. Freezing a frozen account fails.
    pub fn freeze_account(
        &self,
        caller: &AccountId,
        account: &AccountId,
        reason: &str,
    ) -> GuardResult<()> {
        self.authz.require(caller, Role::Enforcer)?;
        validate_account(account)?;
        if reason.is_empty() {
            return Err(GuardError::Validation("freeze reason is empty".into()));
        }

        let now = Utc::now();
        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let status = state
            .statuses
            .entry(account.clone())
            .or_insert_with(|| AccountStatus::new(now));
        if status.frozen {
            return Err(GuardError::InvalidState(format!(
                "account {account} is already frozen"
            )));
        }
        status.frozen = true;
        status.freeze_timestamp = Some(now);
        status.freeze_initiator = Some(caller.clone());
        status.freeze_reason = Some(reason.to_string());
        drop(state);

        warn!(%account, %caller, reason, "account frozen");
        self.sink.emit(GuardEvent::AccountFrozen {
            account: account.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Unfreeze an account. Role: enforcer. Fails if not frozen.
    pub fn unfreeze_account(&self, caller: &AccountId, account: &AccountId) -> GuardResult<()> {
        self.authz.require(caller, Role::Enforcer)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let status = state
            .statuses
            .get_mut(account)
            .filter(|s| s.frozen)
            .ok_or_else(|| {
                GuardError::InvalidState(format!("account {account} is not frozen"))
            })?;
        status.frozen = false;
        status.freeze_timestamp = None;
        status.freeze_initiator = None;
        status.freeze_reason = None;
        drop(state);

        debug!(%account, "account unfrozen");
        self.sink.emit(GuardEvent::AccountUnfrozen {
            account: account.clone(),
        });
        Ok(())
    }

    /// Whitelist an account. Role: whitelist-manager. Fails if already listed.
    pub fn whitelist_account(&self, caller: &AccountId, account: &AccountId) -> GuardResult<()> {
        self.authz.require(caller, Role::WhitelistManager)?;
        validate_account(account)?;

        let now = Utc::now();
        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let status = state
            .statuses
            .entry(account.clone())
            .or_insert_with(|| AccountStatus::new(now));
        if status.whitelisted {
            return Err(GuardError::InvalidState(format!(
                "account {account} is already whitelisted"
            )));
        }
        status.whitelisted = true;
        drop(state);

        debug!(%account, "account whitelisted");
        self.sink.emit(GuardEvent::AccountWhitelisted {
            account: account.clone(),
        });
        Ok(())
    }

    /// Remove an account from the whitelist. Role: whitelist-manager.
    pub fn remove_from_whitelist(
        &self,
        caller: &AccountId,
        account: &AccountId,
    ) -> GuardResult<()> {
        self.authz.require(caller, Role::WhitelistManager)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let status = state
            .statuses
            .get_mut(account)
            .filter(|s| s.whitelisted)
            .ok_or_else(|| {
                GuardError::InvalidState(format!("account {account} is not whitelisted"))
            })?;
        status.whitelisted = false;
        drop(state);

        debug!(%account, "whitelist removed");
        self.sink.emit(GuardEvent::WhitelistRemoved {
            account: account.clone(),
        });
        Ok(())
    }

    /// Set a per-account daily limit (0 reverts to the global default).
    /// Role: administrator.
    pub fn set_daily_limit(
        &self,
        caller: &AccountId,
        account: &AccountId,
        limit: u64,
    ) -> GuardResult<()> {
        self.authz.require(caller, Role::Administrator)?;
        validate_account(account)?;

        let now = Utc::now();
        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        state
            .statuses
            .entry(account.clone())
            .or_insert_with(|| AccountStatus::new(now))
            .daily_limit = limit;
        drop(state);

        debug!(%account, limit, "daily limit set");
        self.sink.emit(GuardEvent::DailyLimitSet {
            account: account.clone(),
            limit,
        });
        Ok(())
    }

    /// Toggle the engine globally. Role: administrator.
    pub fn set_enforcement_enabled(&self, caller: &AccountId, enabled: bool) -> GuardResult<()> {
        self.authz.require(caller, Role::Administrator)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        state.enabled = enabled;
        drop(state);

        warn!(enabled, "enforcement toggled");
        self.sink.emit(GuardEvent::EnforcementToggled { enabled });
        Ok(())
    }

    /// Queue a transfer for review. Role: enforcer. Returns the queue id;
    /// the transfer becomes executable once approved and matured.
    pub fn create_delayed_transaction(
        &self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
        payload: Vec<u8>,
        now: DateTime<Utc>,
    ) -> GuardResult<u64> {
        self.authz.require(caller, Role::Enforcer)?;
        validate_account(from)?;
        validate_account(to)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let id = state.next_delayed_id;
        state.next_delayed_id += 1;
        state.delayed.insert(
            id,
            DelayedTransaction {
                id,
                from: from.clone(),
                to: to.clone(),
                amount,
                payload,
                created_at: now,
                delay_until: now + self.delay_period,
                approved: false,
                executed: false,
                reviewer: None,
            },
        );
        drop(state);

        debug!(id, %from, %to, amount, "delayed transaction created");
        self.sink.emit(GuardEvent::DelayedTransactionCreated {
            id,
            from: from.clone(),
            to: to.clone(),
            amount,
        });
        Ok(id)
    }

    /// Approve a queued transfer. Role: enforcer. One-way; fails if the
    /// transfer was already approved or executed.
    pub fn approve_delayed_transaction(&self, caller: &AccountId, id: u64) -> GuardResult<()> {
        self.authz.require(caller, Role::Enforcer)?;

        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let delayed = state
            .delayed
            .get_mut(&id)
            .ok_or_else(|| GuardError::NotFound(format!("delayed transaction {id}")))?;
        if delayed.executed {
            return Err(GuardError::InvalidState(format!(
                "delayed transaction {id} already executed"
            )));
        }
        if delayed.approved {
            return Err(GuardError::InvalidState(format!(
                "delayed transaction {id} already approved"
            )));
        }
        delayed.approved = true;
        delayed.reviewer = Some(caller.clone());
        drop(state);

        debug!(id, reviewer = %caller, "delayed transaction approved");
        self.sink.emit(GuardEvent::DelayedTransactionApproved {
            id,
            reviewer: caller.clone(),
        });
        Ok(())
    }

    /// Execute a matured, approved transfer. Callable by anyone once the
    /// conditions hold; only flips the terminal flag and signals the
    /// collaborator that performs the real transfer.
    pub fn execute_delayed_transaction(
        &self,
        id: u64,
        now: DateTime<Utc>,
    ) -> GuardResult<DelayedTransaction> {
        let mut state = self.state.write().map_err(|_| GuardError::poisoned())?;
        let delayed = state
            .delayed
            .get_mut(&id)
            .ok_or_else(|| GuardError::NotFound(format!("delayed transaction {id}")))?;
        if delayed.executed {
            return Err(GuardError::InvalidState(format!(
                "delayed transaction {id} already executed"
            )));
        }
        if !delayed.approved {
            return Err(GuardError::InvalidState(format!(
                "delayed transaction {id} is not approved"
            )));
        }
        if now < delayed.delay_until {
            return Err(GuardError::InvalidState(format!(
                "delayed transaction {id} matures at {}",
                delayed.delay_until
            )));
        }
        delayed.executed = true;
        let executed = delayed.clone();
        drop(state);

        debug!(id, "delayed transaction executed");
        self.sink.emit(GuardEvent::DelayedTransactionExecuted { id });
        Ok(executed)
    }

    pub fn get_account_status(&self, account: &AccountId) -> Option<AccountStatus> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.statuses.get(account).cloned())
    }

    pub fn is_frozen(&self, account: &AccountId) -> bool {
        self.get_account_status(account)
            .map(|s| s.frozen)
            .unwrap_or(false)
    }

    pub fn is_whitelisted(&self, account: &AccountId) -> bool {
        self.get_account_status(account)
            .map(|s| s.whitelisted)
            .unwrap_or(false)
    }

    pub fn get_delayed_transaction(&self, id: u64) -> Option<DelayedTransaction> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.delayed.get(&id).cloned())
    }

    /// What the account could still transfer today. `u64::MAX` when no
    /// limit applies.
    pub fn remaining_daily_allowance(&self, account: &AccountId, now: DateTime<Utc>) -> u64 {
        let status = self.get_account_status(account);
        let configured = status.as_ref().map(|s| s.daily_limit).unwrap_or(0);
        let effective = if configured > 0 {
            configured
        } else {
            self.default_daily_limit
        };
        if effective == 0 {
            return u64::MAX;
        }
        let spent = match status {
            Some(ref s) if !window_elapsed(s.last_reset, now) => s.daily_spent,
            _ => 0,
        };
        effective.saturating_sub(spent)
    }

    pub fn is_enabled(&self) -> bool {
        self.state.read().map(|s| s.enabled).unwrap_or(false)
    }
}

fn window_elapsed(last_reset: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= last_reset + SPEND_WINDOW
}

fn validate_account(account: &AccountId) -> GuardResult<()> {
    if account.is_empty() {
        return Err(GuardError::Validation("empty account id".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerguard_types::{AllowAll, MemorySink, SourceId};

    fn acct(s: &str) -> AccountId {
        AccountId::new(s)
    }

    struct Fixture {
        engine: EnforcementEngine,
        risk: Arc<RiskLedger>,
        compliance: Arc<ComplianceBridge>,
        source: SourceId,
    }

    fn fixture_with(config: EnforcementConfig) -> Fixture {
        let authz: Arc<dyn Authorizer> = Arc::new(AllowAll);
        let sink: Arc<dyn EventSink> = Arc::new(MemorySink::new());
        let risk = Arc::new(RiskLedger::new(authz.clone(), sink.clone()));
        let compliance = Arc::new(ComplianceBridge::new(
            risk.clone(),
            authz.clone(),
            sink.clone(),
        ));
        let source = compliance
            .register_data_source(&acct("admin"), "feed", "https://feed.example")
            .unwrap();
        let engine =
            EnforcementEngine::new(config, risk.clone(), compliance.clone(), authz, sink);
        Fixture {
            engine,
            risk,
            compliance,
            source,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(EnforcementConfig::default())
    }

    #[test]
    fn clean_transfer_is_allowed() {
        let f = fixture();
        let verdict = f
            .engine
            .check_transaction(&acct("a"), &acct("b"), 100, Utc::now());
        assert!(verdict.allowed);
        assert_eq!(verdict.action, EnforcementAction::None);
    }

    #[test]
    fn disabled_engine_allows_everything() {
        let f = fixture();
        f.engine
            .freeze_account(&acct("enf"), &acct("a"), "test freeze")
            .unwrap();
        f.engine
            .set_enforcement_enabled(&acct("admin"), false)
            .unwrap();

        let verdict = f
            .engine
            .check_transaction(&acct("a"), &acct("b"), 100, Utc::now());
        assert!(verdict.allowed);
        assert!(!f.engine.is_enabled());
    }

    #[test]
    fn frozen_sender_denied_with_freeze_action() {
        let f = fixture();
        f.engine
            .freeze_account(&acct("enf"), &acct("a"), "suspicious activity")
            .unwrap();

        let verdict = f
            .engine
            .check_transaction(&acct("a"), &acct("b"), 1, Utc::now());
        assert_eq!(
            verdict,
            Verdict::deny(EnforcementAction::Freeze, "Sender account is frozen")
        );

        let status = f.engine.get_account_status(&acct("a")).unwrap();
        assert_eq!(status.freeze_initiator, Some(acct("enf")));
        assert_eq!(status.freeze_reason.as_deref(), Some("suspicious activity"));
    }

    #[test]
    fn frozen_receiver_denied_with_block_action() {
        let f = fixture();
        f.engine
            .freeze_account(&acct("enf"), &acct("b"), "hold")
            .unwrap();

        let verdict = f
            .engine
            .check_transaction(&acct("a"), &acct("b"), 1, Utc::now());
        assert!(!verdict.allowed);
        assert_eq!(verdict.action, EnforcementAction::Block);
    }

    #[test]
    fn whitelist_overrides_everything_including_freeze_and_sanction() {
        let f = fixture();
        // Whitelist first, then freeze and sanction
        f.engine
            .whitelist_account(&acct("wl"), &acct("a"))
            .unwrap();
        f.engine
            .freeze_account(&acct("enf"), &acct("a"), "hold")
            .unwrap();
        f.compliance
            .sanction_address(&acct("upd"), &acct("a"), &f.source, "hit")
            .unwrap();

        let verdict = f
            .engine
            .check_transaction(&acct("a"), &acct("b"), 1, Utc::now());
        assert_eq!(verdict, Verdict::allow("Whitelisted"));
    }

    #[test]
    fn freeze_then_whitelist_still_allows() {
        // Whitelist is evaluated before freeze regardless of mutation order.
        let f = fixture();
        f.engine
            .freeze_account(&acct("enf"), &acct("a"), "hold")
            .unwrap();
        f.engine
            .whitelist_account(&acct("wl"), &acct("a"))
            .unwrap();

        let verdict = f
            .engine
            .check_transaction(&acct("a"), &acct("b"), 1, Utc::now());
        assert_eq!(verdict, Verdict::allow("Whitelisted"));
    }

    #[test]
    fn sanctioned_parties_are_denied() {
        let f = fixture();
        f.compliance
            .sanction_address(&acct("upd"), &acct("dirty"), &f.source, "hit")
            .unwrap();

        let as_sender = f
            .engine
            .check_transaction(&acct("dirty"), &acct("b"), 1, Utc::now());
        assert_eq!(as_sender.action, EnforcementAction::Freeze);

        let as_receiver = f
            .engine
            .check_transaction(&acct("b"), &acct("dirty"), 1, Utc::now());
        assert_eq!(as_receiver.action, EnforcementAction::Block);
    }

    #[test]
    fn critical_and_high_risk_levels_gate_transfers() {
        let f = fixture();
        f.risk
            .force_assess(&acct("crit"), RiskLevel::Critical, 95, "r", &acct("o"))
            .unwrap();
        f.risk
            .force_assess(&acct("high"), RiskLevel::High, 75, "r", &acct("o"))
            .unwrap();

        assert_eq!(
            f.engine
                .check_transaction(&acct("crit"), &acct("b"), 1, Utc::now())
                .action,
            EnforcementAction::Freeze
        );
        assert_eq!(
            f.engine
                .check_transaction(&acct("b"), &acct("crit"), 1, Utc::now())
                .action,
            EnforcementAction::Block
        );

        let high = f
            .engine
            .check_transaction(&acct("high"), &acct("b"), 1, Utc::now());
        assert_eq!(high.action, EnforcementAction::Delay);
        assert_eq!(high.reason, "High risk transaction requires review");
    }

    #[test]
    fn daily_limit_denies_and_rolls_over() {
        let f = fixture();
        let now = Utc::now();
        f.engine
            .set_daily_limit(&acct("admin"), &acct("a"), 100)
            .unwrap();
        f.engine
            .record_spending(&acct("enf"), &acct("a"), 95, now)
            .unwrap();

        let verdict = f.engine.check_transaction(&acct("a"), &acct("b"), 10, now);
        assert_eq!(verdict.action, EnforcementAction::Limit);
        assert_eq!(f.engine.remaining_daily_allowance(&acct("a"), now), 5);

        // Within the limit still passes
        assert!(f.engine.check_transaction(&acct("a"), &acct("b"), 5, now).allowed);

        // After the window elapses the same call is allowed again
        let later = now + Duration::days(2);
        assert!(
            f.engine
                .check_transaction(&acct("a"), &acct("b"), 10, later)
                .allowed
        );
        assert_eq!(f.engine.remaining_daily_allowance(&acct("a"), later), 100);
    }

    #[test]
    fn default_limit_applies_without_configuration() {
        let f = fixture_with(EnforcementConfig {
            default_daily_limit: 50,
            ..EnforcementConfig::default()
        });
        let now = Utc::now();

        assert!(f.engine.check_transaction(&acct("a"), &acct("b"), 50, now).allowed);
        let verdict = f.engine.check_transaction(&acct("a"), &acct("b"), 51, now);
        assert_eq!(verdict.action, EnforcementAction::Limit);

        // Zero default disables the check entirely
        let unlimited = fixture_with(EnforcementConfig {
            default_daily_limit: 0,
            ..EnforcementConfig::default()
        });
        assert!(
            unlimited
                .engine
                .check_transaction(&acct("a"), &acct("b"), u64::MAX, now)
                .allowed
        );
    }

    #[test]
    fn record_spending_rolls_the_window_before_adding() {
        let f = fixture();
        let now = Utc::now();
        f.engine
            .record_spending(&acct("enf"), &acct("a"), 80, now)
            .unwrap();

        let later = now + Duration::days(2);
        f.engine
            .record_spending(&acct("enf"), &acct("a"), 30, later)
            .unwrap();

        let status = f.engine.get_account_status(&acct("a")).unwrap();
        assert_eq!(status.daily_spent, 30);
        assert_eq!(status.last_reset, later);
    }

    #[test]
    fn freeze_and_unfreeze_are_one_way_per_state() {
        let f = fixture();
        f.engine
            .freeze_account(&acct("enf"), &acct("a"), "hold")
            .unwrap();
        assert!(f.engine.is_frozen(&acct("a")));
        assert!(matches!(
            f.engine.freeze_account(&acct("enf"), &acct("a"), "again"),
            Err(GuardError::InvalidState(_))
        ));

        f.engine.unfreeze_account(&acct("enf"), &acct("a")).unwrap();
        assert!(!f.engine.is_frozen(&acct("a")));
        assert!(matches!(
            f.engine.unfreeze_account(&acct("enf"), &acct("a")),
            Err(GuardError::InvalidState(_))
        ));

        // Unfreezing clears the freeze bookkeeping
        let status = f.engine.get_account_status(&acct("a")).unwrap();
        assert!(status.freeze_reason.is_none());
        assert!(status.freeze_initiator.is_none());
    }

    #[test]
    fn whitelist_toggles_reject_redundant_calls() {
        let f = fixture();
        f.engine.whitelist_account(&acct("wl"), &acct("a")).unwrap();
        assert!(f.engine.is_whitelisted(&acct("a")));
        assert!(matches!(
            f.engine.whitelist_account(&acct("wl"), &acct("a")),
            Err(GuardError::InvalidState(_))
        ));

        f.engine
            .remove_from_whitelist(&acct("wl"), &acct("a"))
            .unwrap();
        assert!(matches!(
            f.engine.remove_from_whitelist(&acct("wl"), &acct("a")),
            Err(GuardError::InvalidState(_))
        ));
    }

    #[test]
    fn delayed_transaction_lifecycle_gating() {
        let f = fixture();
        let now = Utc::now();
        let id = f
            .engine
            .create_delayed_transaction(&acct("enf"), &acct("a"), &acct("b"), 500, vec![1, 2], now)
            .unwrap();

        // Not approved yet
        assert!(matches!(
            f.engine.execute_delayed_transaction(id, now + Duration::days(2)),
            Err(GuardError::InvalidState(_))
        ));

        f.engine
            .approve_delayed_transaction(&acct("rev"), id)
            .unwrap();
        assert!(matches!(
            f.engine.approve_delayed_transaction(&acct("rev"), id),
            Err(GuardError::InvalidState(_))
        ));

        // Approved but not matured
        assert!(matches!(
            f.engine.execute_delayed_transaction(id, now + Duration::hours(1)),
            Err(GuardError::InvalidState(_))
        ));

        // Approved and matured: executes exactly once
        let executed = f
            .engine
            .execute_delayed_transaction(id, now + Duration::hours(25))
            .unwrap();
        assert_eq!(executed.amount, 500);
        assert_eq!(executed.payload, vec![1, 2]);
        assert_eq!(executed.reviewer, Some(acct("rev")));

        assert!(matches!(
            f.engine.execute_delayed_transaction(id, now + Duration::hours(26)),
            Err(GuardError::InvalidState(_))
        ));

        // Approval after execution also fails
        let id2 = f
            .engine
            .create_delayed_transaction(&acct("enf"), &acct("a"), &acct("b"), 1, vec![], now)
            .unwrap();
        assert_ne!(id, id2);
    }

    #[test]
    fn unreadable_state_denies_the_transfer() {
        let f = fixture();
        let engine = Arc::new(f.engine);

        let poisoner = engine.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.state.write().unwrap();
            panic!("poison the state lock");
        })
        .join();

        let verdict = engine.check_transaction(&acct("a"), &acct("b"), 1, Utc::now());
        assert!(!verdict.allowed);
        assert_eq!(verdict.action, EnforcementAction::Block);
        assert_eq!(verdict.reason, "Policy state unavailable");
    }

    #[test]
    fn unknown_delayed_transaction_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.engine.execute_delayed_transaction(42, Utc::now()),
            Err(GuardError::NotFound(_))
        ));
        assert!(matches!(
            f.engine.approve_delayed_transaction(&acct("rev"), 42),
            Err(GuardError::NotFound(_))
        ));
    }
}
