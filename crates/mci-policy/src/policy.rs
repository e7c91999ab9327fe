//! The policy record and policy sets.
//!
//! [`Policy`] stores the 18 slots as named, typed fields. An unset slot is `None`
//! rather than the `-1` sentinel of the numeric form; [`Policy::to_vector`] and
//! [`Policy::from_vector`] convert to and from the flat numeric view when one is
//! needed (diagnostics, persistence of raw vectors, tests).
//!
//! A `Policy` value may be illegal (a mutation candidate, a decoded record);
//! legality is decided by [`validator::check`](crate::validator::check).

use std::fmt;

use crate::{
    DomainError,
    domain::{ActionSlot, ConditionSlot, PolicyType, Role, SLOT_COUNT, Slot, UNSET},
};

/// Flat numeric form of a policy, `-1` marking unset slots.
pub type PolicyVector = [f64; SLOT_COUNT];

/// One rule governing a role under a set of conditions.
///
/// # Example
///
/// ```
/// use mci_policy::Policy;
/// use mci_policy::domain::{ActionSlot, ConditionSlot, PolicyType, Role};
///
/// let vector = [
///     1.0, 3.0, -1.0, -1.0, -1.0, 1.0, 2.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0,
///     -1.0, -1.0, 1.0,
/// ];
/// let policy = Policy::from_vector(&vector).unwrap();
/// assert_eq!(policy.policy_type(), Some(PolicyType::Action));
/// assert_eq!(policy.role(), Some(Role::Rescue));
/// assert_eq!(policy.condition(ConditionSlot::MciLevel), Some(3));
/// assert_eq!(policy.active_action(), Some((ActionSlot::Select, 2)));
/// assert_eq!(policy.enforce(), Some(true));
/// assert_eq!(policy.to_vector(), vector);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Policy {
    policy_type: Option<PolicyType>,
    conditions: [Option<u8>; ConditionSlot::LEN],
    role: Option<Role>,
    actions: [Option<u8>; ActionSlot::LEN],
    method_value: Option<u8>,
    compliance: Option<f64>,
    enforce: Option<bool>,
}

impl Policy {
    #[must_use]
    pub fn policy_type(&self) -> Option<PolicyType> {
        self.policy_type
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    #[must_use]
    pub fn condition(&self, slot: ConditionSlot) -> Option<u8> {
        self.conditions[slot.index()]
    }

    /// Returns the set condition slots with their codes, in slot order.
    pub fn conditions(&self) -> impl Iterator<Item = (ConditionSlot, u8)> + '_ {
        ConditionSlot::ALL
            .into_iter()
            .filter_map(|slot| self.condition(slot).map(|code| (slot, code)))
    }

    #[must_use]
    pub fn condition_count(&self) -> usize {
        self.conditions.iter().flatten().count()
    }

    #[must_use]
    pub fn action(&self, slot: ActionSlot) -> Option<u8> {
        self.actions[slot.index()]
    }

    /// Returns every set action slot with its code, in slot order.
    pub fn active_actions(&self) -> impl Iterator<Item = (ActionSlot, u8)> + '_ {
        ActionSlot::ALL
            .into_iter()
            .filter_map(|slot| self.action(slot).map(|code| (slot, code)))
    }

    /// Returns the active action if exactly one action slot is set.
    #[must_use]
    pub fn active_action(&self) -> Option<(ActionSlot, u8)> {
        let mut actions = self.active_actions();
        let first = actions.next()?;
        actions.next().is_none().then_some(first)
    }

    #[must_use]
    pub fn method_value(&self) -> Option<u8> {
        self.method_value
    }

    #[must_use]
    pub fn compliance(&self) -> Option<f64> {
        self.compliance
    }

    #[must_use]
    pub fn enforce(&self) -> Option<bool> {
        self.enforce
    }

    /// Returns the numeric value of a slot, or `None` if it is unset.
    #[must_use]
    pub fn value(&self, slot: Slot) -> Option<f64> {
        match slot {
            Slot::PolicyType => self.policy_type.map(|t| f64::from(t.code())),
            Slot::Role => self.role.map(|r| f64::from(r.code())),
            Slot::MethodValue => self.method_value.map(f64::from),
            Slot::Compliance => self.compliance,
            Slot::Enforce => self.enforce.map(|e| f64::from(u8::from(e))),
            _ => {
                if let Some(condition) = ConditionSlot::from_slot(slot) {
                    self.condition(condition).map(f64::from)
                } else {
                    ActionSlot::from_slot(slot)
                        .and_then(|action| self.action(action))
                        .map(f64::from)
                }
            }
        }
    }

    #[must_use]
    pub fn is_set(&self, slot: Slot) -> bool {
        self.value(slot).is_some()
    }

    /// Converts to the flat 18-slot numeric form.
    #[must_use]
    pub fn to_vector(&self) -> PolicyVector {
        Slot::ALL.map(|slot| self.value(slot).unwrap_or(UNSET))
    }

    /// Builds a policy from the flat numeric form.
    ///
    /// Every slot must hold `-1`, or a non-negative integer code (any real value for
    /// the compliance slot). Type and role codes must be recognized and the
    /// enforcement flag must be `0` or `1`; other range checks are left to the
    /// validator.
    pub fn from_vector(values: &[f64]) -> Result<Self, DomainError> {
        let values: &PolicyVector = values
            .try_into()
            .map_err(|_| DomainError::SlotCount { len: values.len() })?;

        let mut policy = Policy {
            policy_type: read_code(values, Slot::PolicyType)?
                .map(|code| {
                    PolicyType::from_code(code).ok_or(unknown_code(Slot::PolicyType, code))
                })
                .transpose()?,
            role: read_code(values, Slot::Role)?
                .map(|code| Role::from_code(code).ok_or(unknown_code(Slot::Role, code)))
                .transpose()?,
            method_value: read_code(values, Slot::MethodValue)?,
            enforce: read_code(values, Slot::Enforce)?
                .map(|code| match code {
                    0 => Ok(false),
                    1 => Ok(true),
                    _ => Err(unknown_code(Slot::Enforce, code)),
                })
                .transpose()?,
            ..Policy::default()
        };
        for condition in ConditionSlot::ALL {
            policy.conditions[condition.index()] = read_code(values, condition.slot())?;
        }
        for action in ActionSlot::ALL {
            policy.actions[action.index()] = read_code(values, action.slot())?;
        }
        let compliance = values[Slot::Compliance.index()];
        policy.compliance = (!is_unset(compliance)).then_some(compliance);
        Ok(policy)
    }

    pub(crate) fn set_policy_type(&mut self, policy_type: PolicyType) {
        self.policy_type = Some(policy_type);
    }

    pub(crate) fn set_role(&mut self, role: Role) {
        self.role = Some(role);
    }

    pub(crate) fn set_condition(&mut self, slot: ConditionSlot, code: Option<u8>) {
        self.conditions[slot.index()] = code;
    }

    pub(crate) fn set_action(&mut self, slot: ActionSlot, code: Option<u8>) {
        self.actions[slot.index()] = code;
    }

    pub(crate) fn clear_actions(&mut self) {
        self.actions = [None; ActionSlot::LEN];
    }

    pub(crate) fn set_method_value(&mut self, value: Option<u8>) {
        self.method_value = value;
    }

    pub(crate) fn set_compliance(&mut self, compliance: Option<f64>) {
        self.compliance = compliance;
    }

    pub(crate) fn set_enforce(&mut self, enforce: Option<bool>) {
        self.enforce = enforce;
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.to_vector().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")
    }
}

fn is_unset(value: f64) -> bool {
    (value - UNSET).abs() < f64::EPSILON
}

fn unknown_code(slot: Slot, code: u8) -> DomainError {
    DomainError::UnknownCode {
        slot,
        value: f64::from(code),
    }
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn read_code(values: &PolicyVector, slot: Slot) -> Result<Option<u8>, DomainError> {
    let value = values[slot.index()];
    if is_unset(value) {
        return Ok(None);
    }
    if value.fract() != 0.0 || !(0.0..=f64::from(u8::MAX)).contains(&value) {
        return Err(DomainError::UnknownCode { slot, value });
    }
    Ok(Some(value as u8))
}

/// An ordered collection of policies evaluated together by the simulator.
///
/// Order carries no meaning for the simulator but is preserved for deterministic
/// encoding and crossover. Duplicate policies are allowed. Cloning a set clones
/// every policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySet {
    policies: Vec<Policy>,
}

impl PolicySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn push(&mut self, policy: Policy) {
        self.policies.push(policy);
    }

    /// Removes and returns the policy at `index`, shifting later policies down.
    pub fn remove(&mut self, index: usize) -> Policy {
        self.policies.remove(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Policy> {
        self.policies.iter()
    }

    #[must_use]
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn policies_mut(&mut self) -> &mut [Policy] {
        &mut self.policies
    }

    #[must_use]
    pub fn into_policies(self) -> Vec<Policy> {
        self.policies
    }
}

impl From<Vec<Policy>> for PolicySet {
    fn from(policies: Vec<Policy>) -> Self {
        Self { policies }
    }
}

impl FromIterator<Policy> for PolicySet {
    fn from_iter<I: IntoIterator<Item = Policy>>(iter: I) -> Self {
        Self {
            policies: iter.into_iter().collect(),
        }
    }
}

impl Extend<Policy> for PolicySet {
    fn extend<I: IntoIterator<Item = Policy>>(&mut self, iter: I) {
        self.policies.extend(iter);
    }
}

impl IntoIterator for PolicySet {
    type Item = Policy;
    type IntoIter = std::vec::IntoIter<Policy>;

    fn into_iter(self) -> Self::IntoIter {
        self.policies.into_iter()
    }
}

impl<'a> IntoIterator for &'a PolicySet {
    type Item = &'a Policy;
    type IntoIter = std::slice::Iter<'a, Policy>;

    fn into_iter(self) -> Self::IntoIter {
        self.policies.iter()
    }
}
