use serde::{Deserialize, Serialize};

/// Ordinal risk category for an account.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Map a 0-100 score onto its level.
    ///
    /// Boundaries: >=90 Critical, >=70 High, >=40 Medium, >=10 Low.
    pub fn for_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => RiskLevel::Critical,
            70..=89 => RiskLevel::High,
            40..=69 => RiskLevel::Medium,
            10..=39 => RiskLevel::Low,
            _ => RiskLevel::None,
        }
    }

    /// High and Critical are treated as high-risk by enforcement.
    pub fn is_high_risk(self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

/// Transaction pattern classification produced by the external model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternType {
    #[default]
    Normal,
    Structuring,
    RapidMovement,
    Mixing,
    HighVolume,
    SanctionInteraction,
}

/// Severity of an analysis or alert, derived from pattern and score.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// The policy engine's verdict action on a prospective transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnforcementAction {
    #[default]
    None,
    Warn,
    Delay,
    Limit,
    Block,
    Freeze,
}
