//! Static domain tables for MCI response policies.
//!
//! Every policy is laid out as a fixed 18-slot record. This module owns the
//! closed symbol tables for each group of slots and the relations between them:
//!
//! ```text
//! [0]    [1]   [2]    [3]   [4]  [5]  [6]    [7]   [8]  [9]     [10]     [11] [12]  [13]    [14]    [15]    [16]       [17]
//! Type | MCI | Dmg  | Story| Time| Role| Select| Stage| Load| Deliver| ReturnTo| Wait| Treat| Operate| Release| MethodV| Compliance| Enforce
//! ```
//!
//! - [`Role::actions`] - actions a role may take (`RoleActions`)
//! - [`Role::conditions`] - condition slots a role may carry (`RoleConditions`)
//! - [`ActionSlot::conditions`] - condition slots enumerated for an action (`ActionConditions`)
//! - [`Slot::value_domain`] - legal codes of every slot (`ValueDomain`)
//!
//! Each enum maps to its numeric code and its external string by array
//! indexing, so tables never need to be hashed or mutated at runtime.

use rand::{
    Rng,
    distr::{Distribution, StandardUniform},
};

use crate::DomainError;

/// Number of slots in the numeric policy vector.
pub const SLOT_COUNT: usize = 18;

/// Sentinel stored in the numeric vector for an unset slot.
pub const UNSET: f64 = -1.0;

/// Code stored in the active action slot of a compliance policy.
pub const COMPLIANCE_MARKER: u8 = 0;

/// Legal minimum-compliance fractions, in generation order.
pub const COMPLIANCE_LEVELS: [f64; 9] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];

/// Legal codes of the method-value slot.
///
/// Only meaningful while the `Wait` or `Release` action is active.
pub const METHOD_VALUES: [u8; 6] = [0, 1, 2, 3, 4, 5];

const POLICY_TYPE_CODES: [u8; 2] = [1, 2];
const ROLE_CODES: [u8; 3] = [1, 2, 3];
const ENFORCE_CODES: [u8; 2] = [0, 1];
const MCI_LEVELS: [u8; 5] = [1, 2, 3, 4, 5];
const DAMAGE_TYPES: [u8; 2] = [1, 2];
const STORIES: [u8; 4] = [1, 2, 3, 4];
const TIMES: [u8; 5] = [1, 2, 3, 4, 5];
const METHOD_CODES: [u8; 3] = [1, 2, 3];

const DAMAGE_TYPE_NAMES: [&str; 2] = ["Fire", "Collapse"];

/// Position of a field in the numeric policy vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum Slot {
    PolicyType = 0,
    MciLevel = 1,
    DamageType = 2,
    Story = 3,
    Time = 4,
    Role = 5,
    Select = 6,
    Stage = 7,
    Load = 8,
    DeliverTo = 9,
    ReturnTo = 10,
    Wait = 11,
    Treat = 12,
    Operate = 13,
    Release = 14,
    MethodValue = 15,
    Compliance = 16,
    Enforce = 17,
}

impl Slot {
    /// All slots in vector order.
    pub const ALL: [Self; SLOT_COUNT] = [
        Self::PolicyType,
        Self::MciLevel,
        Self::DamageType,
        Self::Story,
        Self::Time,
        Self::Role,
        Self::Select,
        Self::Stage,
        Self::Load,
        Self::DeliverTo,
        Self::ReturnTo,
        Self::Wait,
        Self::Treat,
        Self::Operate,
        Self::Release,
        Self::MethodValue,
        Self::Compliance,
        Self::Enforce,
    ];

    /// Returns the position of this slot in the numeric vector.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Looks up the slot at a vector position.
    pub fn from_index(index: usize) -> Result<Self, DomainError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(DomainError::UnknownSlot { index })
    }

    /// Returns the legal values of this slot.
    #[must_use]
    pub fn value_domain(self) -> ValueDomain {
        match self {
            Self::PolicyType => ValueDomain::Codes(&POLICY_TYPE_CODES),
            Self::Role => ValueDomain::Codes(&ROLE_CODES),
            Self::MethodValue => ValueDomain::Codes(&METHOD_VALUES),
            Self::Compliance => ValueDomain::Fractions(&COMPLIANCE_LEVELS),
            Self::Enforce => ValueDomain::Codes(&ENFORCE_CODES),
            Self::MciLevel => ValueDomain::Codes(ConditionSlot::MciLevel.values()),
            Self::DamageType => ValueDomain::Codes(ConditionSlot::DamageType.values()),
            Self::Story => ValueDomain::Codes(ConditionSlot::Story.values()),
            Self::Time => ValueDomain::Codes(ConditionSlot::Time.values()),
            Self::Select => ValueDomain::Codes(ActionSlot::Select.method_codes()),
            Self::Stage => ValueDomain::Codes(ActionSlot::Stage.method_codes()),
            Self::Load => ValueDomain::Codes(ActionSlot::Load.method_codes()),
            Self::DeliverTo => ValueDomain::Codes(ActionSlot::DeliverTo.method_codes()),
            Self::ReturnTo => ValueDomain::Codes(ActionSlot::ReturnTo.method_codes()),
            Self::Wait => ValueDomain::Codes(ActionSlot::Wait.method_codes()),
            Self::Treat => ValueDomain::Codes(ActionSlot::Treat.method_codes()),
            Self::Operate => ValueDomain::Codes(ActionSlot::Operate.method_codes()),
            Self::Release => ValueDomain::Codes(ActionSlot::Release.method_codes()),
        }
    }
}

/// Looks up the value domain of the slot at a vector position.
///
/// # Examples
///
/// ```
/// use mci_policy::domain;
///
/// assert!(domain::value_domain(1).unwrap().contains(5.0));
/// assert!(domain::value_domain(18).is_err());
/// ```
pub fn value_domain(index: usize) -> Result<ValueDomain, DomainError> {
    Ok(Slot::from_index(index)?.value_domain())
}

/// Ordered set of legal values for one slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueDomain {
    /// Small integer codes.
    Codes(&'static [u8]),
    /// Fractions strictly between 0 and 1.
    Fractions(&'static [f64]),
}

impl ValueDomain {
    /// Returns `true` if `value` is one of the legal values.
    #[must_use]
    pub fn contains(self, value: f64) -> bool {
        match self {
            Self::Codes(codes) => codes
                .iter()
                .any(|&code| (f64::from(code) - value).abs() < f64::EPSILON),
            Self::Fractions(fractions) => fractions.iter().any(|f| (f - value).abs() < 1e-9),
        }
    }

    /// Returns the number of legal values.
    #[must_use]
    pub fn len(self) -> usize {
        match self {
            Self::Codes(codes) => codes.len(),
            Self::Fractions(fractions) => fractions.len(),
        }
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Kind of a policy (slot 0).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, derive_more::IsVariant,
)]
pub enum PolicyType {
    /// Prescribes an action method for a role.
    Action = 1,
    /// Requires a minimum fraction of a role's agents to comply.
    Compliance = 2,
}

impl PolicyType {
    pub const ALL: [Self; 2] = [Self::Action, Self::Compliance];

    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Returns the external name used in policy files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Action => "Action",
            Self::Compliance => "Compliance",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl Distribution<PolicyType> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> PolicyType {
        if rng.random_bool(0.5) {
            PolicyType::Action
        } else {
            PolicyType::Compliance
        }
    }
}

/// Responder category governed by a policy (slot 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Role {
    Rescue = 1,
    Transport = 2,
    Treatment = 3,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::Rescue, Self::Transport, Self::Treatment];

    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rescue => "RESCUE",
            Self::Transport => "TRANSPORT",
            Self::Treatment => "TREATMENT",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }

    /// Actions this role may take, in slot order.
    #[must_use]
    pub const fn actions(self) -> &'static [ActionSlot] {
        match self {
            Self::Rescue => &[ActionSlot::Select, ActionSlot::Stage],
            Self::Transport => &[
                ActionSlot::Load,
                ActionSlot::DeliverTo,
                ActionSlot::ReturnTo,
                ActionSlot::Wait,
            ],
            Self::Treatment => &[ActionSlot::Treat, ActionSlot::Operate, ActionSlot::Release],
        }
    }

    /// Condition slots this role may carry, in slot order.
    #[must_use]
    pub const fn conditions(self) -> &'static [ConditionSlot] {
        match self {
            Self::Rescue => &[
                ConditionSlot::MciLevel,
                ConditionSlot::DamageType,
                ConditionSlot::Story,
            ],
            Self::Transport | Self::Treatment => &[
                ConditionSlot::MciLevel,
                ConditionSlot::DamageType,
                ConditionSlot::Time,
            ],
        }
    }

    #[must_use]
    pub fn allows_action(self, action: ActionSlot) -> bool {
        self.actions().contains(&action)
    }

    #[must_use]
    pub fn allows_condition(self, condition: ConditionSlot) -> bool {
        self.conditions().contains(&condition)
    }
}

impl Distribution<Role> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Role {
        match rng.random_range(0..Role::ALL.len()) {
            0 => Role::Rescue,
            1 => Role::Transport,
            _ => Role::Treatment,
        }
    }
}

/// Situational predicate slots (slots 1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ConditionSlot {
    MciLevel,
    DamageType,
    Story,
    Time,
}

impl ConditionSlot {
    pub const LEN: usize = 4;
    pub const ALL: [Self; ConditionSlot::LEN] =
        [Self::MciLevel, Self::DamageType, Self::Story, Self::Time];

    /// Position within the condition group.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn slot(self) -> Slot {
        match self {
            Self::MciLevel => Slot::MciLevel,
            Self::DamageType => Slot::DamageType,
            Self::Story => Slot::Story,
            Self::Time => Slot::Time,
        }
    }

    #[must_use]
    pub fn from_slot(slot: Slot) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.slot() == slot)
    }

    /// Returns the `variable` name used in policy files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MciLevel => "MCILevel",
            Self::DamageType => "DamageType",
            Self::Story => "Story",
            Self::Time => "Time",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Legal codes of this condition.
    #[must_use]
    pub const fn values(self) -> &'static [u8] {
        match self {
            Self::MciLevel => &MCI_LEVELS,
            Self::DamageType => &DAMAGE_TYPES,
            Self::Story => &STORIES,
            Self::Time => &TIMES,
        }
    }

    #[must_use]
    pub fn contains(self, code: u8) -> bool {
        self.values().contains(&code)
    }

    /// Renders a condition code as its external `value` string.
    ///
    /// Damage types are named; every other condition is written as a decimal number.
    pub fn value_label(self, code: u8) -> Result<String, DomainError> {
        if !self.contains(code) {
            return Err(DomainError::UnknownCode {
                slot: self.slot(),
                value: f64::from(code),
            });
        }
        Ok(match self {
            Self::DamageType => DAMAGE_TYPE_NAMES[usize::from(code - 1)].to_owned(),
            _ => code.to_string(),
        })
    }

    /// Parses an external `value` string into a condition code.
    ///
    /// Numeric conditions accept any `u8`; range checks belong to the validator.
    #[must_use]
    pub fn parse_value(self, value: &str) -> Option<u8> {
        match self {
            Self::DamageType => DAMAGE_TYPE_NAMES
                .iter()
                .position(|name| *name == value)
                .and_then(|i| u8::try_from(i + 1).ok()),
            _ => value.trim().parse().ok(),
        }
    }
}

/// Mutually exclusive action slots (slots 6-14).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ActionSlot {
    Select,
    Stage,
    Load,
    DeliverTo,
    ReturnTo,
    Wait,
    Treat,
    Operate,
    Release,
}

impl ActionSlot {
    pub const LEN: usize = 9;
    pub const ALL: [Self; ActionSlot::LEN] = [
        Self::Select,
        Self::Stage,
        Self::Load,
        Self::DeliverTo,
        Self::ReturnTo,
        Self::Wait,
        Self::Treat,
        Self::Operate,
        Self::Release,
    ];

    /// Position within the action group.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn slot(self) -> Slot {
        match self {
            Self::Select => Slot::Select,
            Self::Stage => Slot::Stage,
            Self::Load => Slot::Load,
            Self::DeliverTo => Slot::DeliverTo,
            Self::ReturnTo => Slot::ReturnTo,
            Self::Wait => Slot::Wait,
            Self::Treat => Slot::Treat,
            Self::Operate => Slot::Operate,
            Self::Release => Slot::Release,
        }
    }

    #[must_use]
    pub fn from_slot(slot: Slot) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.slot() == slot)
    }

    /// Returns the `actionName` used in policy files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Select => "Select",
            Self::Stage => "Stage",
            Self::Load => "Load",
            Self::DeliverTo => "DeliverTo",
            Self::ReturnTo => "ReturnTo",
            Self::Wait => "Wait",
            Self::Treat => "Treat",
            Self::Operate => "Operate",
            Self::Release => "Release",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// The role that owns this action.
    #[must_use]
    pub const fn role(self) -> Role {
        match self {
            Self::Select | Self::Stage => Role::Rescue,
            Self::Load | Self::DeliverTo | Self::ReturnTo | Self::Wait => Role::Transport,
            Self::Treat | Self::Operate | Self::Release => Role::Treatment,
        }
    }

    /// Method names of this action; the method at index `i` has code `i + 1`.
    #[must_use]
    pub const fn methods(self) -> &'static [&'static str] {
        match self {
            Self::Select | Self::Load => &["Distance", "Severity", "InjuryType"],
            Self::Stage => &["MeanRandom", "MCSlot"],
            Self::DeliverTo => &["Distance", "Vacancy", "Rate"],
            Self::ReturnTo => &["MeanRandom", "MCSlot", "Original"],
            Self::Wait => &["Stay"],
            Self::Treat => &["Severity"],
            Self::Operate => &["Severity", "ArriveTime", "InjuryType"],
            Self::Release => &["Strength", "Time"],
        }
    }

    /// Legal method codes of this action (never includes the compliance marker).
    #[must_use]
    pub fn method_codes(self) -> &'static [u8] {
        &METHOD_CODES[..self.methods().len()]
    }

    #[must_use]
    pub fn is_method(self, code: u8) -> bool {
        self.method_codes().contains(&code)
    }

    /// Renders a method code as its `actionMethod` string.
    ///
    /// The compliance marker renders as the empty string.
    pub fn method_name(self, code: u8) -> Result<&'static str, DomainError> {
        if code == COMPLIANCE_MARKER {
            return Ok("");
        }
        self.methods()
            .get(usize::from(code) - 1)
            .copied()
            .ok_or(DomainError::UnknownCode {
                slot: self.slot(),
                value: f64::from(code),
            })
    }

    /// Parses an `actionMethod` string; the empty string is the compliance marker.
    #[must_use]
    pub fn method_code(self, name: &str) -> Option<u8> {
        if name.is_empty() {
            return Some(COMPLIANCE_MARKER);
        }
        self.methods()
            .iter()
            .position(|m| *m == name)
            .and_then(|i| u8::try_from(i + 1).ok())
    }

    /// Condition slots enumerated for this action by exhaustive generation.
    ///
    /// Always a non-empty subset of the owning role's conditions.
    #[must_use]
    pub const fn conditions(self) -> &'static [ConditionSlot] {
        match self {
            Self::Select => &[
                ConditionSlot::MciLevel,
                ConditionSlot::DamageType,
                ConditionSlot::Story,
            ],
            Self::Load => &[
                ConditionSlot::MciLevel,
                ConditionSlot::DamageType,
                ConditionSlot::Time,
            ],
            Self::Stage | Self::Treat => &[ConditionSlot::MciLevel, ConditionSlot::DamageType],
            Self::DeliverTo | Self::ReturnTo | Self::Wait | Self::Operate | Self::Release => {
                &[ConditionSlot::MciLevel, ConditionSlot::Time]
            }
        }
    }

    /// Returns `true` if the method-value slot applies to this action.
    #[must_use]
    pub const fn takes_method_value(self) -> bool {
        matches!(self, Self::Wait | Self::Release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_roundtrip() {
        for (i, slot) in Slot::ALL.into_iter().enumerate() {
            assert_eq!(slot.index(), i);
            assert_eq!(Slot::from_index(i), Ok(slot));
        }
        assert_eq!(
            Slot::from_index(SLOT_COUNT),
            Err(DomainError::UnknownSlot { index: SLOT_COUNT })
        );
    }

    #[test]
    fn test_condition_and_action_slots_map_to_vector_positions() {
        for condition in ConditionSlot::ALL {
            assert_eq!(condition.slot().index(), condition.index() + 1);
            assert_eq!(ConditionSlot::from_slot(condition.slot()), Some(condition));
        }
        for action in ActionSlot::ALL {
            assert_eq!(action.slot().index(), action.index() + 6);
            assert_eq!(ActionSlot::from_slot(action.slot()), Some(action));
        }
        assert_eq!(ActionSlot::from_slot(Slot::Role), None);
    }

    #[test]
    fn test_every_action_belongs_to_exactly_one_role() {
        for action in ActionSlot::ALL {
            let owners: Vec<_> = Role::ALL
                .into_iter()
                .filter(|r| r.allows_action(action))
                .collect();
            assert_eq!(owners, vec![action.role()]);
        }
    }

    #[test]
    fn test_action_conditions_are_subset_of_role_conditions() {
        for action in ActionSlot::ALL {
            assert!(!action.conditions().is_empty());
            for condition in action.conditions() {
                assert!(
                    action.role().allows_condition(*condition),
                    "{action} uses {condition} outside its role"
                );
            }
        }
    }

    #[test]
    fn test_value_domains() {
        assert_eq!(Slot::MciLevel.value_domain().len(), 5);
        assert_eq!(Slot::DamageType.value_domain().len(), 2);
        assert_eq!(Slot::Story.value_domain().len(), 4);
        assert_eq!(Slot::Time.value_domain().len(), 5);
        assert_eq!(Slot::Stage.value_domain().len(), 2);
        assert_eq!(Slot::Wait.value_domain().len(), 1);
        assert!(Slot::Compliance.value_domain().contains(0.3));
        assert!(!Slot::Compliance.value_domain().contains(1.0));
        assert!(Slot::Enforce.value_domain().contains(0.0));
        assert!(!Slot::Enforce.value_domain().contains(2.0));
        assert!(Slot::MethodValue.value_domain().contains(5.0));
        assert!(!Slot::MethodValue.value_domain().contains(6.0));
        assert!(value_domain(99).is_err());
    }

    #[test]
    fn test_method_names_roundtrip() {
        for action in ActionSlot::ALL {
            for &code in action.method_codes() {
                let name = action.method_name(code).unwrap();
                assert_eq!(action.method_code(name), Some(code));
            }
            assert_eq!(action.method_name(COMPLIANCE_MARKER), Ok(""));
            assert_eq!(action.method_code(""), Some(COMPLIANCE_MARKER));
        }
        assert_eq!(ActionSlot::Select.method_code("Severity"), Some(2));
        assert_eq!(ActionSlot::Stage.method_code("Severity"), None);
        assert!(ActionSlot::Wait.method_name(2).is_err());
    }

    #[test]
    fn test_condition_value_labels() {
        assert_eq!(ConditionSlot::DamageType.value_label(1).unwrap(), "Fire");
        assert_eq!(ConditionSlot::DamageType.value_label(2).unwrap(), "Collapse");
        assert_eq!(ConditionSlot::DamageType.parse_value("Collapse"), Some(2));
        assert_eq!(ConditionSlot::DamageType.parse_value("Flood"), None);
        assert_eq!(ConditionSlot::MciLevel.value_label(3).unwrap(), "3");
        assert_eq!(ConditionSlot::Story.parse_value("4"), Some(4));
        assert!(ConditionSlot::Time.value_label(6).is_err());
    }

    #[test]
    fn test_names_roundtrip() {
        for t in PolicyType::ALL {
            assert_eq!(PolicyType::from_name(t.name()), Some(t));
            assert_eq!(PolicyType::from_code(t.code()), Some(t));
        }
        for r in Role::ALL {
            assert_eq!(Role::from_name(r.name()), Some(r));
            assert_eq!(Role::from_code(r.code()), Some(r));
        }
        for c in ConditionSlot::ALL {
            assert_eq!(ConditionSlot::from_name(c.name()), Some(c));
        }
        for a in ActionSlot::ALL {
            assert_eq!(ActionSlot::from_name(a.name()), Some(a));
        }
        assert_eq!(Role::from_name("rescue"), None);
    }
}
