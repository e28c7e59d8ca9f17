use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::error::{GuardError, GuardResult};
use crate::ids::AccountId;

/// Named roles gating the mutating entry points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May write risk assessments and scores.
    RiskAssessor,
    /// May clear risk state and review/seal audit reports.
    Auditor,
    /// May register data sources, tune thresholds, and toggle enforcement.
    Administrator,
    /// May assert sanction/jurisdiction/PEP facts from registered sources.
    DataUpdater,
    /// May clear sanction flags.
    Validator,
    /// May submit transaction analyses.
    ScoringOracle,
    /// May resolve alerts.
    MonitorOperator,
    /// May freeze/unfreeze accounts, record spending, and queue delayed transactions.
    Enforcer,
    /// May manage the whitelist.
    WhitelistManager,
    /// May create and own compliance reports.
    ComplianceOfficer,
}

/// Boolean role predicate supplied by the surrounding service.
///
/// The role-to-identity binding mechanism is an external concern; the core
/// only asks whether a caller holds a role.
pub trait Authorizer: Send + Sync {
    fn has_role(&self, caller: &AccountId, role: Role) -> bool;

    /// Convenience: check and turn a missing role into `Unauthorized`.
    fn require(&self, caller: &AccountId, role: Role) -> GuardResult<()> {
        if self.has_role(caller, role) {
            Ok(())
        } else {
            Err(GuardError::Unauthorized {
                caller: caller.clone(),
                role,
            })
        }
    }
}

/// In-memory role table with explicit grant/revoke.
#[derive(Default)]
pub struct RoleTable {
    grants: RwLock<HashMap<AccountId, HashSet<Role>>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role` to `account`. Idempotent.
    pub fn grant(&self, account: AccountId, role: Role) -> GuardResult<()> {
        let mut grants = self.grants.write().map_err(|_| GuardError::poisoned())?;
        grants.entry(account).or_default().insert(role);
        Ok(())
    }

    /// Revoke `role` from `account`. Revoking an absent grant is a no-op.
    pub fn revoke(&self, account: &AccountId, role: Role) -> GuardResult<()> {
        let mut grants = self.grants.write().map_err(|_| GuardError::poisoned())?;
        if let Some(roles) = grants.get_mut(account) {
            roles.remove(&role);
        }
        Ok(())
    }
}

impl Authorizer for RoleTable {
    fn has_role(&self, caller: &AccountId, role: Role) -> bool {
        self.grants
            .read()
            .map(|grants| {
                grants
                    .get(caller)
                    .map(|roles| roles.contains(&role))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }
}

/// Authorizer that grants every role to every caller.
///
/// For tests and embeddings where the surrounding service already performed
/// its own access control.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn has_role(&self, _caller: &AccountId, _role: Role) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_table_grant_and_revoke() {
        let table = RoleTable::new();
        let alice = AccountId::new("alice");

        assert!(!table.has_role(&alice, Role::Auditor));
        table.grant(alice.clone(), Role::Auditor).unwrap();
        assert!(table.has_role(&alice, Role::Auditor));
        assert!(!table.has_role(&alice, Role::Enforcer));

        table.revoke(&alice, Role::Auditor).unwrap();
        assert!(!table.has_role(&alice, Role::Auditor));
    }

    #[test]
    fn require_maps_to_unauthorized() {
        let table = RoleTable::new();
        let bob = AccountId::new("bob");
        let err = table.require(&bob, Role::Enforcer).unwrap_err();
        assert!(matches!(err, GuardError::Unauthorized { .. }));
    }

    #[test]
    fn allow_all_grants_everything() {
        let authz = AllowAll;
        assert!(authz.has_role(&AccountId::new("anyone"), Role::Administrator));
        assert!(authz.require(&AccountId::new("anyone"), Role::Auditor).is_ok());
    }
}
