//! Scoped authorization rules.
//!
//! An [`Ability`] is a flat list of [`Rule`]s compiled per request by
//! [`AbilityEngine`]. Rules are additive and never conflict, so evaluation is
//! "any rule matches".

mod engine;

pub use engine::AbilityEngine;

use crate::error::AuthError;
use crate::models::CompanyId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Field name carrying the tenant on scoped resources.
pub const COMPANY_FIELD: &str = "companyId";

/// What a caller wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Implies every other action.
    Manage,
    /// Create a resource.
    Create,
    /// Read a resource.
    Read,
    /// Update a resource.
    Update,
    /// Delete a resource.
    Delete,
}

impl Action {
    /// Create, read, update and delete.
    pub const CRUD: [Self; 4] = [Self::Create, Self::Read, Self::Update, Self::Delete];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manage => "manage",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manage" => Ok(Self::Manage),
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(AuthError::InvalidRequest(format!("unknown action '{other}'"))),
        }
    }
}

/// Resource classes rules can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// Every subject, present and future.
    #[serde(rename = "all")]
    All,
    /// Customer companies being inspected.
    Client,
    /// Pressure equipment.
    Equipment,
    /// Safety valves.
    Valve,
    /// Measuring instruments.
    Instrument,
    /// Equipment under maintenance follow-up.
    MaintenanceEquipment,
    /// Day-to-day maintenance records.
    MaintenanceDaily,
    /// Equipment inspection reports.
    EquipmentReport,
    /// Valve inspection reports.
    ValveReport,
    /// Instrument calibration reports.
    InstrumentReport,
}

impl Subject {
    /// Company-scoped business entities.
    pub const BUSINESS: [Self; 6] = [
        Self::Client,
        Self::Equipment,
        Self::Valve,
        Self::Instrument,
        Self::MaintenanceEquipment,
        Self::MaintenanceDaily,
    ];

    /// Company-scoped report subjects.
    pub const REPORTS: [Self; 3] = [
        Self::EquipmentReport,
        Self::ValveReport,
        Self::InstrumentReport,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Client => "Client",
            Self::Equipment => "Equipment",
            Self::Valve => "Valve",
            Self::Instrument => "Instrument",
            Self::MaintenanceEquipment => "MaintenanceEquipment",
            Self::MaintenanceDaily => "MaintenanceDaily",
            Self::EquipmentReport => "EquipmentReport",
            Self::ValveReport => "ValveReport",
            Self::InstrumentReport => "InstrumentReport",
        }
    }

    fn covers(self, requested: &str) -> bool {
        self == Self::All || self.as_str() == requested
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field/value pairs describing a concrete resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceScope(BTreeMap<String, Value>);

impl ResourceScope {
    /// Scope with no fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope carrying only a company.
    #[must_use]
    pub fn company(company_id: &CompanyId) -> Self {
        Self::new().with(COMPANY_FIELD, company_id.as_str())
    }

    /// Add a field.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Read a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

/// Equalities a resource must satisfy for a rule to apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeCondition(BTreeMap<String, Value>);

impl ScopeCondition {
    /// Condition binding a rule to one company.
    #[must_use]
    pub fn company(company_id: &CompanyId) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(COMPANY_FIELD.to_string(), Value::from(company_id.as_str()));
        Self(fields)
    }

    /// Every field must be present on the resource and equal. Missing is a mismatch.
    #[must_use]
    pub fn matches(&self, resource: &ResourceScope) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| resource.get(field) == Some(expected))
    }
}

/// One grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Granted action; `manage` implies all others.
    pub action: Action,
    /// Subject the grant applies to.
    pub subject: Subject,
    /// Optional scope the resource must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "conditions")]
    pub condition: Option<ScopeCondition>,
}

impl Rule {
    /// Grant without conditions.
    #[must_use]
    pub const fn unscoped(action: Action, subject: Subject) -> Self {
        Self {
            action,
            subject,
            condition: None,
        }
    }

    /// Grant limited by a condition.
    #[must_use]
    pub const fn scoped(action: Action, subject: Subject, condition: ScopeCondition) -> Self {
        Self {
            action,
            subject,
            condition: Some(condition),
        }
    }

    /// Whether this rule allows `action` on `subject` for `resource`.
    #[must_use]
    pub fn allows(&self, action: Action, subject: &str, resource: &ResourceScope) -> bool {
        self.subject.covers(subject)
            && (self.action == Action::Manage || self.action == action)
            && self
                .condition
                .as_ref()
                .is_none_or(|condition| condition.matches(resource))
    }
}

/// Compiled rule set for one authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ability {
    rules: Vec<Rule>,
}

impl Ability {
    /// Ability that denies everything.
    #[must_use]
    pub const fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Ability from explicit rules.
    #[must_use]
    pub const fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The compiled rules.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Whether no rule exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// True if any rule allows the request. Never fails.
    #[must_use]
    pub fn can(&self, action: Action, subject: &str, resource: &ResourceScope) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.allows(action, subject, resource))
    }

    /// [`Ability::can`] with a typed subject.
    #[must_use]
    pub fn can_subject(&self, action: Action, subject: Subject, resource: &ResourceScope) -> bool {
        self.can(action, subject.as_str(), resource)
    }

    /// [`Ability::can`] translated into a handler result.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] when no rule matches.
    pub fn require(
        &self,
        action: Action,
        subject: &str,
        resource: &ResourceScope,
    ) -> Result<(), AuthError> {
        if self.can(action, subject, resource) {
            Ok(())
        } else {
            tracing::debug!(%action, subject, "ability denied request");
            Err(AuthError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c1() -> CompanyId {
        CompanyId::new("c1")
    }

    #[test]
    fn test_manage_implies_every_action() {
        let rule = Rule::unscoped(Action::Manage, Subject::Valve);
        let scope = ResourceScope::new();
        for action in Action::CRUD {
            assert!(rule.allows(action, "Valve", &scope));
        }
        assert!(!rule.allows(Action::Read, "Equipment", &scope));
    }

    #[test]
    fn test_plain_action_does_not_imply_manage() {
        let rule = Rule::unscoped(Action::Update, Subject::Valve);
        assert!(!rule.allows(Action::Manage, "Valve", &ResourceScope::new()));
    }

    #[test]
    fn test_condition_requires_field_presence() {
        let rule = Rule::scoped(Action::Read, Subject::Client, ScopeCondition::company(&c1()));
        assert!(rule.allows(Action::Read, "Client", &ResourceScope::company(&c1())));
        assert!(!rule.allows(Action::Read, "Client", &ResourceScope::new()));
        assert!(!rule.allows(
            Action::Read,
            "Client",
            &ResourceScope::company(&CompanyId::new("c2"))
        ));
    }

    #[test]
    fn test_condition_ignores_extra_fields() {
        let rule = Rule::scoped(Action::Read, Subject::Client, ScopeCondition::company(&c1()));
        let scope = ResourceScope::company(&c1()).with("id", 42);
        assert!(rule.allows(Action::Read, "Client", &scope));
    }

    #[test]
    fn test_condition_compares_values_strictly() {
        let rule = Rule::scoped(Action::Read, Subject::Client, ScopeCondition::company(&c1()));
        let scope = ResourceScope::new().with(COMPANY_FIELD, Value::Null);
        assert!(!rule.allows(Action::Read, "Client", &scope));
    }

    #[test]
    fn test_require_maps_to_forbidden() {
        let ability = Ability::empty();
        let err = ability
            .require(Action::Read, "Client", &ResourceScope::new())
            .unwrap_err();
        assert!(matches!(err, AuthError::Forbidden));
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("delete".parse::<Action>().unwrap(), Action::Delete);
        assert!("destroy".parse::<Action>().is_err());
    }

    #[test]
    fn test_rule_serialization_shape() {
        let rule = Rule::scoped(Action::Read, Subject::Client, ScopeCondition::company(&c1()));
        let json = serde_json::to_value(rule).unwrap();
        assert_eq!(json["action"], "read");
        assert_eq!(json["subject"], "Client");
        assert_eq!(json["conditions"]["companyId"], "c1");

        let admin = serde_json::to_value(Rule::unscoped(Action::Manage, Subject::All)).unwrap();
        assert_eq!(admin["subject"], "all");
        assert!(admin.get("conditions").is_none());
    }
}
