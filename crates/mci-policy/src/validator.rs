//! Legality rules for policies and policy sets.
//!
//! A policy is valid when every rule below holds, checked in this order:
//!
//! 1. the policy type is set;
//! 2. the role is set;
//! 3. at least one condition is set, every set condition belongs to the role, and
//!    every condition code lies in its value domain;
//! 4. exactly one action slot is set, and it belongs to the role;
//! 5. Action policies carry a legal method code, no compliance, and an enforcement flag;
//! 6. Compliance policies carry the `0` marker, a compliance in `(0, 1)`, and no
//!    enforcement flag;
//! 7. the method value is set only on Action policies whose action takes one, and
//!    lies in its domain.
//!
//! An invalid policy is an expected outcome during generation and mutation, so
//! [`check`] reports it as a [`Violation`] value rather than an error.

use crate::{
    Policy,
    domain::{ActionSlot, COMPLIANCE_MARKER, ConditionSlot, PolicyType, Role, Slot},
};

/// The first legality rule a policy breaks.
#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum Violation {
    #[display("policy type is unset")]
    MissingType,
    #[display("role is unset")]
    MissingRole,
    #[display("no condition is set")]
    NoCondition,
    #[display("condition {condition} is not allowed for role {role}")]
    ConditionNotForRole { condition: ConditionSlot, role: Role },
    #[display("condition {condition} has out-of-domain value {code}")]
    ConditionOutOfDomain { condition: ConditionSlot, code: u8 },
    #[display("{count} action slots are set, expected exactly one")]
    ActionCount { count: usize },
    #[display("action {action} is not allowed for role {role}")]
    ActionNotForRole { action: ActionSlot, role: Role },
    #[display("action {action} has illegal method code {code}")]
    InvalidMethod { action: ActionSlot, code: u8 },
    #[display("compliance policy action {action} holds {code} instead of the marker")]
    MissingMarker { action: ActionSlot, code: u8 },
    #[display("action policy carries a compliance value")]
    ComplianceOnActionPolicy,
    #[display("action policy has no enforcement flag")]
    MissingEnforce,
    #[display("compliance {value} is not strictly between 0 and 1")]
    ComplianceOutOfRange { value: f64 },
    #[display("compliance policy has no compliance value")]
    MissingCompliance,
    #[display("compliance policy carries an enforcement flag")]
    EnforceOnCompliancePolicy,
    #[display("method value is set but does not apply to this policy")]
    MethodValueNotApplicable,
    #[display("method value {value} is out of domain")]
    MethodValueOutOfDomain { value: u8 },
}

/// Checks every legality rule, returning the first one that fails.
pub fn check(policy: &Policy) -> Result<(), Violation> {
    let policy_type = policy.policy_type().ok_or(Violation::MissingType)?;
    let role = policy.role().ok_or(Violation::MissingRole)?;

    if policy.condition_count() == 0 {
        return Err(Violation::NoCondition);
    }
    for (condition, code) in policy.conditions() {
        if !role.allows_condition(condition) {
            return Err(Violation::ConditionNotForRole { condition, role });
        }
        if !condition.contains(code) {
            return Err(Violation::ConditionOutOfDomain { condition, code });
        }
    }

    let count = policy.active_actions().count();
    let (action, code) = policy
        .active_action()
        .ok_or(Violation::ActionCount { count })?;
    if !role.allows_action(action) {
        return Err(Violation::ActionNotForRole { action, role });
    }

    match policy_type {
        PolicyType::Action => {
            if !action.is_method(code) {
                return Err(Violation::InvalidMethod { action, code });
            }
            if policy.compliance().is_some() {
                return Err(Violation::ComplianceOnActionPolicy);
            }
            if policy.enforce().is_none() {
                return Err(Violation::MissingEnforce);
            }
        }
        PolicyType::Compliance => {
            if code != COMPLIANCE_MARKER {
                return Err(Violation::MissingMarker { action, code });
            }
            let value = policy.compliance().ok_or(Violation::MissingCompliance)?;
            if !(value > 0.0 && value < 1.0) {
                return Err(Violation::ComplianceOutOfRange { value });
            }
            if policy.enforce().is_some() {
                return Err(Violation::EnforceOnCompliancePolicy);
            }
        }
    }

    if let Some(value) = policy.method_value() {
        if !(policy_type.is_action() && action.takes_method_value()) {
            return Err(Violation::MethodValueNotApplicable);
        }
        if !Slot::MethodValue.value_domain().contains(f64::from(value)) {
            return Err(Violation::MethodValueOutOfDomain { value });
        }
    }

    Ok(())
}

/// Returns `true` if the policy satisfies every legality rule.
#[must_use]
pub fn is_valid(policy: &Policy) -> bool {
    check(policy).is_ok()
}

/// Returns `true` if the policy set is non-empty and every policy is valid.
#[must_use]
pub fn is_valid_policy_set<'a, I>(policies: I) -> bool
where
    I: IntoIterator<Item = &'a Policy>,
{
    let mut count = 0;
    for policy in policies {
        if !is_valid(policy) {
            return false;
        }
        count += 1;
    }
    count > 0
}

/// Returns `true` if every listed slot is set.
///
/// Mutation uses this to decide whether another condition can still be added.
#[must_use]
pub fn is_full_description(policy: &Policy, slots: &[Slot]) -> bool {
    slots.iter().all(|slot| policy.is_set(*slot))
}

/// Returns `true` if exactly one listed slot is set.
///
/// Mutation uses this to refuse deleting the last remaining condition.
#[must_use]
pub fn is_single_description(policy: &Policy, slots: &[Slot]) -> bool {
    slots.iter().filter(|slot| policy.is_set(**slot)).count() == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::UNSET,
        policy::tests::{RESCUE_SELECT_VECTOR, TRANSPORT_COMPLIANCE_VECTOR},
    };

    fn with(base: [f64; 18], edits: &[(Slot, f64)]) -> Policy {
        let mut vector = base;
        for (slot, value) in edits {
            vector[slot.index()] = *value;
        }
        Policy::from_vector(&vector).unwrap()
    }

    #[test]
    fn test_valid_policies() {
        assert_eq!(check(&with(RESCUE_SELECT_VECTOR, &[])), Ok(()));
        assert_eq!(check(&with(TRANSPORT_COMPLIANCE_VECTOR, &[])), Ok(()));
    }

    #[test]
    fn test_missing_type_and_role() {
        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::PolicyType, UNSET)]);
        assert_eq!(check(&policy), Err(Violation::MissingType));
        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::Role, UNSET)]);
        assert_eq!(check(&policy), Err(Violation::MissingRole));
    }

    #[test]
    fn test_condition_rules() {
        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::MciLevel, UNSET)]);
        assert_eq!(check(&policy), Err(Violation::NoCondition));

        // Rescue may not be conditioned on time of day.
        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::Time, 2.0)]);
        assert_eq!(
            check(&policy),
            Err(Violation::ConditionNotForRole {
                condition: ConditionSlot::Time,
                role: Role::Rescue,
            })
        );

        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::MciLevel, 6.0)]);
        assert_eq!(
            check(&policy),
            Err(Violation::ConditionOutOfDomain {
                condition: ConditionSlot::MciLevel,
                code: 6,
            })
        );
    }

    #[test]
    fn test_action_rules() {
        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::Select, UNSET)]);
        assert_eq!(check(&policy), Err(Violation::ActionCount { count: 0 }));

        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::Stage, 1.0)]);
        assert_eq!(check(&policy), Err(Violation::ActionCount { count: 2 }));

        let policy = with(
            RESCUE_SELECT_VECTOR,
            &[(Slot::Select, UNSET), (Slot::Load, 1.0)],
        );
        assert_eq!(
            check(&policy),
            Err(Violation::ActionNotForRole {
                action: ActionSlot::Load,
                role: Role::Rescue,
            })
        );

        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::Select, 0.0)]);
        assert_eq!(
            check(&policy),
            Err(Violation::InvalidMethod {
                action: ActionSlot::Select,
                code: 0,
            })
        );

        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::Select, 4.0)]);
        assert!(!is_valid(&policy));
    }

    #[test]
    fn test_type_exclusive_fields() {
        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::Compliance, 0.5)]);
        assert_eq!(check(&policy), Err(Violation::ComplianceOnActionPolicy));

        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::Enforce, UNSET)]);
        assert_eq!(check(&policy), Err(Violation::MissingEnforce));

        let policy = with(TRANSPORT_COMPLIANCE_VECTOR, &[(Slot::Enforce, 1.0)]);
        assert_eq!(check(&policy), Err(Violation::EnforceOnCompliancePolicy));

        let policy = with(TRANSPORT_COMPLIANCE_VECTOR, &[(Slot::DeliverTo, 2.0)]);
        assert_eq!(
            check(&policy),
            Err(Violation::MissingMarker {
                action: ActionSlot::DeliverTo,
                code: 2,
            })
        );
    }

    #[test]
    fn test_compliance_range_is_exclusive() {
        for value in [0.0, 1.0, 1.5] {
            let policy = with(TRANSPORT_COMPLIANCE_VECTOR, &[(Slot::Compliance, value)]);
            assert_eq!(check(&policy), Err(Violation::ComplianceOutOfRange { value }));
        }
        let policy = with(TRANSPORT_COMPLIANCE_VECTOR, &[(Slot::Compliance, UNSET)]);
        assert_eq!(check(&policy), Err(Violation::MissingCompliance));
        let policy = with(TRANSPORT_COMPLIANCE_VECTOR, &[(Slot::Compliance, 0.95)]);
        assert!(is_valid(&policy));
    }

    #[test]
    fn test_method_value_rules() {
        // Transport / Wait / Stay
        let wait = with(
            RESCUE_SELECT_VECTOR,
            &[
                (Slot::Role, 2.0),
                (Slot::Select, UNSET),
                (Slot::Wait, 1.0),
                (Slot::MethodValue, 3.0),
            ],
        );
        assert_eq!(check(&wait), Ok(()));

        let policy = with(RESCUE_SELECT_VECTOR, &[(Slot::MethodValue, 3.0)]);
        assert_eq!(check(&policy), Err(Violation::MethodValueNotApplicable));

        let policy = with(wait.to_vector(), &[(Slot::MethodValue, 9.0)]);
        assert_eq!(
            check(&policy),
            Err(Violation::MethodValueOutOfDomain { value: 9 })
        );
    }

    #[test]
    fn test_policy_set_validity() {
        let valid = with(RESCUE_SELECT_VECTOR, &[]);
        let invalid = with(RESCUE_SELECT_VECTOR, &[(Slot::Role, UNSET)]);
        assert!(is_valid_policy_set(&[valid.clone(), valid.clone()]));
        assert!(!is_valid_policy_set(&[valid, invalid]));
        assert!(!is_valid_policy_set(&Vec::<Policy>::new()));
    }

    #[test]
    fn test_description_helpers() {
        let conditions = [Slot::MciLevel, Slot::DamageType, Slot::Story];
        let policy = with(RESCUE_SELECT_VECTOR, &[]);
        assert!(is_single_description(&policy, &conditions));
        assert!(!is_full_description(&policy, &conditions));

        let policy = with(
            RESCUE_SELECT_VECTOR,
            &[(Slot::DamageType, 1.0), (Slot::Story, 2.0)],
        );
        assert!(!is_single_description(&policy, &conditions));
        assert!(is_full_description(&policy, &conditions));
    }
}
