//! Compiles an [`Ability`] from a user's role, responsibility and company.

use super::{Ability, Action, Rule, ScopeCondition, Subject};
use crate::models::{AuthUser, CompanyId, Responsibility, Role};

/// Subjects an operator may only look at.
const OPERATOR_READ_ONLY: [Subject; 8] = [
    Subject::Client,
    Subject::Equipment,
    Subject::Valve,
    Subject::Instrument,
    Subject::MaintenanceEquipment,
    Subject::EquipmentReport,
    Subject::ValveReport,
    Subject::InstrumentReport,
];

/// Builds per-request abilities. Pure; construction never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbilityEngine;

impl AbilityEngine {
    /// Compile the ability for an authenticated user.
    ///
    /// Admins get `manage all`. Ordinary users without a company get nothing.
    /// Everyone else gets the rule set of their responsibility tier, scoped to
    /// their own company.
    #[must_use]
    pub fn compile(user: &AuthUser) -> Ability {
        let Some(role) = user.role else {
            return Ability::empty();
        };
        if role == Role::Admin {
            return Ability::from_rules(vec![Rule::unscoped(Action::Manage, Subject::All)]);
        }
        let Some(company_id) = user.company_id.as_ref() else {
            return Ability::empty();
        };
        let Some(responsibility) = user.responsibility else {
            return Ability::empty();
        };
        Ability::from_rules(tier_rules(responsibility, company_id))
    }

    /// [`AbilityEngine::compile`] for an optional user; anonymous callers get nothing.
    #[must_use]
    pub fn compile_optional(user: Option<&AuthUser>) -> Ability {
        user.map_or_else(Ability::empty, Self::compile)
    }
}

fn tier_rules(responsibility: Responsibility, company_id: &CompanyId) -> Vec<Rule> {
    let scope = ScopeCondition::company(company_id);
    let grant = |action: Action, subject: Subject| Rule::scoped(action, subject, scope.clone());

    match responsibility {
        Responsibility::Operator => OPERATOR_READ_ONLY
            .into_iter()
            .map(|subject| grant(Action::Read, subject))
            .chain(std::iter::once(grant(
                Action::Manage,
                Subject::MaintenanceDaily,
            )))
            .collect(),
        Responsibility::Secretary => {
            let business = Subject::BUSINESS
                .into_iter()
                .flat_map(|subject| Action::CRUD.map(|action| grant(action, subject)));
            let reports = Subject::REPORTS.into_iter().flat_map(|subject| {
                [Action::Read, Action::Update, Action::Delete].map(|action| grant(action, subject))
            });
            business.chain(reports).collect()
        }
        Responsibility::Engineer => Subject::BUSINESS
            .into_iter()
            .chain(Subject::REPORTS)
            .flat_map(|subject| Action::CRUD.map(|action| grant(action, subject)))
            .collect(),
    }
}
