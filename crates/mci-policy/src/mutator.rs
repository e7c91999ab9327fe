//! Structural point mutations that keep policies legal.
//!
//! [`PolicyMutator::mutate_by_modify`] picks one mutable aspect of a policy and
//! changes it. The candidate is validated; if it fails, the mutation restarts from
//! the original policy, at most `max_attempts` times. A policy that cannot be
//! mutated within the bound yields [`GenerationExhausted`] and is never returned
//! half-changed.
//!
//! [`PolicyMutator::mutate_individual`] works on a whole set: it either appends a
//! fresh policy, removes one, or point-mutates each policy independently.

use arrayvec::ArrayVec;
use rand::{Rng, seq::IndexedRandom as _};

use crate::{
    GenerationExhausted, Policy, PolicySet,
    domain::{
        ActionSlot, COMPLIANCE_LEVELS, COMPLIANCE_MARKER, ConditionSlot, METHOD_VALUES,
        PolicyType, Role,
    },
    generator::{self, PolicyGenerator},
    validator,
};

/// Default probability of appending a new policy to a set.
pub const DEFAULT_ADD_PROBABILITY: f64 = 0.1;
/// Default probability of removing a policy from a set.
pub const DEFAULT_REMOVE_PROBABILITY: f64 = 0.1;

const MAX_ASPECTS: usize = 6;

/// A field group that a point mutation may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum MutationAspect {
    Role,
    Condition,
    ActionName,
    ActionMethod,
    MethodValue,
    Enforcement,
    Compliance,
}

impl MutationAspect {
    /// Aspects that can produce a different, legal policy.
    ///
    /// Action policies offer role, condition, action name, action method, method
    /// value and enforcement; Compliance policies offer role, condition, action name
    /// and compliance. The action method is only offered when the action has another
    /// method to switch to, and the method value only for actions that take one.
    #[must_use]
    pub fn applicable(policy: &Policy) -> ArrayVec<Self, MAX_ASPECTS> {
        let mut aspects = ArrayVec::new();
        aspects.push(Self::Role);
        aspects.push(Self::Condition);
        aspects.push(Self::ActionName);
        let action = policy.active_action().map(|(action, _)| action);
        match policy.policy_type() {
            Some(PolicyType::Action) => {
                if action.is_some_and(|a| a.method_codes().len() > 1) {
                    aspects.push(Self::ActionMethod);
                }
                if action.is_some_and(ActionSlot::takes_method_value) {
                    aspects.push(Self::MethodValue);
                }
                aspects.push(Self::Enforcement);
            }
            Some(PolicyType::Compliance) => aspects.push(Self::Compliance),
            None => {}
        }
        aspects
    }
}

/// A structural change to the conditions of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionEdit {
    Add,
    Delete,
    Modify,
}

/// What [`PolicyMutator::mutate_individual`] did to a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// A freshly generated policy was appended.
    Appended,
    /// The policy at `index` was removed.
    Removed { index: usize },
    /// `count` policies were point-mutated.
    Modified { count: usize },
}

/// Mutation operators and their tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyMutator {
    /// Candidate attempts allowed per point mutation.
    pub max_attempts: usize,
    /// Probability that `mutate_individual` appends a policy.
    pub add_probability: f64,
    /// Probability that `mutate_individual` removes a policy.
    pub remove_probability: f64,
    /// Sets at or below this size never lose a policy.
    pub min_size: usize,
    /// Source of appended policies.
    pub generator: PolicyGenerator,
}

impl Default for PolicyMutator {
    fn default() -> Self {
        Self {
            max_attempts: generator::DEFAULT_MAX_ATTEMPTS,
            add_probability: DEFAULT_ADD_PROBABILITY,
            remove_probability: DEFAULT_REMOVE_PROBABILITY,
            min_size: 1,
            generator: PolicyGenerator::default(),
        }
    }
}

impl PolicyMutator {
    /// Applies one of three mutually exclusive set mutations.
    ///
    /// With probability `add_probability` a new valid policy is appended; otherwise
    /// with probability `remove_probability` a random policy is removed, provided the
    /// set is larger than `min_size`; otherwise every policy is point-mutated
    /// independently with probability `rate`.
    ///
    /// On error the set may already hold the policies mutated before the failing
    /// one; all of them are valid.
    pub fn mutate_individual<R>(
        &self,
        policies: &mut PolicySet,
        rate: f64,
        rng: &mut R,
    ) -> Result<MutationOutcome, GenerationExhausted>
    where
        R: Rng + ?Sized,
    {
        let draw: f64 = rng.random();
        if draw < self.add_probability {
            policies.push(self.generator.generate_valid_policy(rng)?);
            return Ok(MutationOutcome::Appended);
        }
        if draw < self.add_probability + self.remove_probability && policies.len() > self.min_size
        {
            let index = rng.random_range(0..policies.len());
            policies.remove(index);
            return Ok(MutationOutcome::Removed { index });
        }

        let mut count = 0;
        for policy in policies.policies_mut() {
            if rng.random_bool(rate) {
                *policy = self.mutate_by_modify(policy, rng)?;
                count += 1;
            }
        }
        Ok(MutationOutcome::Modified { count })
    }

    /// Returns a mutated copy of a valid policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use mci_policy::{generator::PolicyGenerator, mutator::PolicyMutator, validator};
    /// use rand::SeedableRng as _;
    /// use rand_pcg::Pcg32;
    ///
    /// let mut rng = Pcg32::seed_from_u64(3);
    /// let policy = PolicyGenerator::default().generate_valid_policy(&mut rng).unwrap();
    /// let mutated = PolicyMutator::default().mutate_by_modify(&policy, &mut rng).unwrap();
    /// assert!(validator::is_valid(&mutated));
    /// ```
    pub fn mutate_by_modify<R>(
        &self,
        policy: &Policy,
        rng: &mut R,
    ) -> Result<Policy, GenerationExhausted>
    where
        R: Rng + ?Sized,
    {
        let aspects = MutationAspect::applicable(policy);
        for attempt in 1..=self.max_attempts {
            let Some(&aspect) = aspects.choose(rng) else {
                break;
            };
            let candidate = self.mutate_aspect(policy, aspect, rng);
            match validator::check(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(violation) => {
                    tracing::trace!(attempt, %aspect, %violation, "rejected mutation candidate");
                }
            }
        }
        tracing::warn!(
            attempts = self.max_attempts,
            %policy,
            "policy mutation exhausted its retry bound"
        );
        Err(GenerationExhausted {
            operation: "mutate_by_modify",
            attempts: self.max_attempts,
        })
    }

    /// Applies one aspect change to a copy of `policy` without validating it.
    pub fn mutate_aspect<R>(&self, policy: &Policy, aspect: MutationAspect, rng: &mut R) -> Policy
    where
        R: Rng + ?Sized,
    {
        let mut candidate = policy.clone();
        match aspect {
            MutationAspect::Role => change_role(&mut candidate, rng),
            MutationAspect::Condition => change_condition(&mut candidate, rng),
            MutationAspect::ActionName => change_action(&mut candidate, rng),
            MutationAspect::ActionMethod => change_method(&mut candidate, rng),
            MutationAspect::MethodValue => change_method_value(&mut candidate, rng),
            MutationAspect::Enforcement => {
                candidate.set_enforce(candidate.enforce().map(|enforce| !enforce));
            }
            MutationAspect::Compliance => change_compliance(&mut candidate, rng),
        }
        candidate
    }
}

fn change_role<R>(policy: &mut Policy, rng: &mut R)
where
    R: Rng + ?Sized,
{
    let (Some(policy_type), Some(current)) = (policy.policy_type(), policy.role()) else {
        return;
    };
    let others: ArrayVec<Role, 2> = Role::ALL.into_iter().filter(|r| *r != current).collect();
    let Some(&role) = others.choose(rng) else {
        return;
    };
    policy.set_role(role);

    for condition in ConditionSlot::ALL {
        if !role.allows_condition(condition) {
            policy.set_condition(condition, None);
        }
    }
    if policy.condition_count() == 0 {
        let conditions = role.conditions();
        let slot = conditions[rng.random_range(0..conditions.len())];
        policy.set_condition(slot, Some(generator::random_condition_value(slot, rng)));
    }

    generator::set_random_action(policy, policy_type, role, rng);
    policy.set_method_value(None);
}

fn change_condition<R>(policy: &mut Policy, rng: &mut R)
where
    R: Rng + ?Sized,
{
    let Some(role) = policy.role() else {
        return;
    };
    let allowed = role.conditions();
    let slots: ArrayVec<_, { ConditionSlot::LEN }> = allowed.iter().map(|c| c.slot()).collect();

    let mut edits = ArrayVec::<ConditionEdit, 3>::new();
    if !validator::is_full_description(policy, &slots) {
        edits.push(ConditionEdit::Add);
    }
    if !validator::is_single_description(policy, &slots) {
        edits.push(ConditionEdit::Delete);
    }
    edits.push(ConditionEdit::Modify);
    let Some(&edit) = edits.choose(rng) else {
        return;
    };

    let (set, unset): (ArrayVec<ConditionSlot, 4>, ArrayVec<ConditionSlot, 4>) = allowed
        .iter()
        .copied()
        .partition(|c| policy.condition(*c).is_some());
    match edit {
        ConditionEdit::Add => {
            if let Some(&slot) = unset.choose(rng) {
                policy.set_condition(slot, Some(generator::random_condition_value(slot, rng)));
            }
        }
        ConditionEdit::Delete => {
            if let Some(&slot) = set.choose(rng) {
                policy.set_condition(slot, None);
            }
        }
        ConditionEdit::Modify => {
            if let Some(&slot) = set.choose(rng) {
                let current = policy.condition(slot);
                let values: ArrayVec<u8, 5> = slot
                    .values()
                    .iter()
                    .copied()
                    .filter(|v| Some(*v) != current)
                    .collect();
                if let Some(&value) = values.choose(rng) {
                    policy.set_condition(slot, Some(value));
                }
            }
        }
    }
}

fn change_action<R>(policy: &mut Policy, rng: &mut R)
where
    R: Rng + ?Sized,
{
    let (Some(policy_type), Some(role)) = (policy.policy_type(), policy.role()) else {
        return;
    };
    let current = policy.active_action().map(|(action, _)| action);
    let others: ArrayVec<ActionSlot, 4> = role
        .actions()
        .iter()
        .copied()
        .filter(|a| Some(*a) != current)
        .collect();
    let Some(&action) = others.choose(rng) else {
        return;
    };
    let code = match policy_type {
        PolicyType::Action => generator::random_method(action, rng),
        PolicyType::Compliance => COMPLIANCE_MARKER,
    };
    policy.clear_actions();
    policy.set_action(action, Some(code));
    if !action.takes_method_value() {
        policy.set_method_value(None);
    }
}

fn change_method<R>(policy: &mut Policy, rng: &mut R)
where
    R: Rng + ?Sized,
{
    let Some((action, code)) = policy.active_action() else {
        return;
    };
    let others: ArrayVec<u8, 3> = action
        .method_codes()
        .iter()
        .copied()
        .filter(|m| *m != code)
        .collect();
    if let Some(&method) = others.choose(rng) {
        policy.set_action(action, Some(method));
    }
}

fn change_method_value<R>(policy: &mut Policy, rng: &mut R)
where
    R: Rng + ?Sized,
{
    let current = policy.method_value();
    let choices: ArrayVec<Option<u8>, 7> = std::iter::once(None)
        .chain(METHOD_VALUES.into_iter().map(Some))
        .filter(|v| *v != current)
        .collect();
    if let Some(&value) = choices.choose(rng) {
        policy.set_method_value(value);
    }
}

fn change_compliance<R>(policy: &mut Policy, rng: &mut R)
where
    R: Rng + ?Sized,
{
    let current = policy.compliance();
    let levels: ArrayVec<f64, 9> = COMPLIANCE_LEVELS
        .into_iter()
        .filter(|level| current.is_none_or(|c| (c - level).abs() > 1e-9))
        .collect();
    if let Some(&level) = levels.choose(rng) {
        policy.set_compliance(Some(level));
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;
    use crate::{
        domain::Slot,
        policy::tests::{RESCUE_SELECT_VECTOR, TRANSPORT_COMPLIANCE_VECTOR},
    };

    fn sample_policies(rng: &mut Pcg32) -> PolicySet {
        PolicyGenerator::default().generate_individual(300, rng).unwrap()
    }

    #[test]
    fn test_mutate_by_modify_is_sound() {
        let mutator = PolicyMutator::default();
        let mut rng = Pcg32::seed_from_u64(17);
        for policy in &sample_policies(&mut rng) {
            let mutated = mutator.mutate_by_modify(policy, &mut rng).unwrap();
            assert_eq!(validator::check(&mutated), Ok(()), "{policy} -> {mutated}");
        }
    }

    #[test]
    fn test_every_applicable_aspect_changes_the_policy() {
        let mutator = PolicyMutator::default();
        let mut rng = Pcg32::seed_from_u64(23);
        for policy in &sample_policies(&mut rng) {
            for aspect in MutationAspect::applicable(policy) {
                let candidate = mutator.mutate_aspect(policy, aspect, &mut rng);
                assert_ne!(&candidate, policy, "{aspect} left {policy} unchanged");
                assert_eq!(validator::check(&candidate), Ok(()), "{aspect}: {candidate}");
            }
        }
    }

    #[test]
    fn test_compliance_aspect_always_changes_value() {
        let mutator = PolicyMutator::default();
        let mut rng = Pcg32::seed_from_u64(0);
        let policy = Policy::from_vector(&TRANSPORT_COMPLIANCE_VECTOR).unwrap();
        for _ in 0..200 {
            let mutated = mutator.mutate_aspect(&policy, MutationAspect::Compliance, &mut rng);
            let value = mutated.compliance().unwrap();
            assert!((value - 0.4).abs() > 1e-9);
            assert!(value > 0.0 && value < 1.0);
            assert!(validator::is_valid(&mutated));
        }
    }

    #[test]
    fn test_applicable_aspects_depend_on_type_and_action() {
        let rescue = Policy::from_vector(&RESCUE_SELECT_VECTOR).unwrap();
        assert_eq!(
            MutationAspect::applicable(&rescue).as_slice(),
            &[
                MutationAspect::Role,
                MutationAspect::Condition,
                MutationAspect::ActionName,
                MutationAspect::ActionMethod,
                MutationAspect::Enforcement,
            ]
        );

        let compliance = Policy::from_vector(&TRANSPORT_COMPLIANCE_VECTOR).unwrap();
        assert_eq!(
            MutationAspect::applicable(&compliance).as_slice(),
            &[
                MutationAspect::Role,
                MutationAspect::Condition,
                MutationAspect::ActionName,
                MutationAspect::Compliance,
            ]
        );

        // Transport / Wait has a single method but takes a method value.
        let mut vector = RESCUE_SELECT_VECTOR;
        vector[Slot::Role.index()] = 2.0;
        vector[Slot::Select.index()] = -1.0;
        vector[Slot::Wait.index()] = 1.0;
        let wait = Policy::from_vector(&vector).unwrap();
        assert_eq!(
            MutationAspect::applicable(&wait).as_slice(),
            &[
                MutationAspect::Role,
                MutationAspect::Condition,
                MutationAspect::ActionName,
                MutationAspect::MethodValue,
                MutationAspect::Enforcement,
            ]
        );
    }

    #[test]
    fn test_role_change_repairs_conditions_and_action() {
        let mutator = PolicyMutator::default();
        let mut rng = Pcg32::seed_from_u64(4);
        let mut vector = RESCUE_SELECT_VECTOR;
        // Story is only legal for Rescue.
        vector[Slot::MciLevel.index()] = -1.0;
        vector[Slot::Story.index()] = 2.0;
        let policy = Policy::from_vector(&vector).unwrap();
        for _ in 0..100 {
            let mutated = mutator.mutate_aspect(&policy, MutationAspect::Role, &mut rng);
            let role = mutated.role().unwrap();
            assert_ne!(role, Role::Rescue);
            assert_eq!(mutated.condition(ConditionSlot::Story), None);
            assert_eq!(mutated.condition_count(), 1);
            assert!(validator::is_valid(&mutated));
        }
    }

    #[test]
    fn test_condition_edit_never_empties_or_overfills() {
        let mutator = PolicyMutator::default();
        let mut rng = Pcg32::seed_from_u64(6);
        let single = Policy::from_vector(&RESCUE_SELECT_VECTOR).unwrap();
        let full = Policy::from_vector(&TRANSPORT_COMPLIANCE_VECTOR).unwrap();
        for _ in 0..100 {
            let mutated = mutator.mutate_aspect(&single, MutationAspect::Condition, &mut rng);
            assert!(mutated.condition_count() >= 1);
            let mutated = mutator.mutate_aspect(&full, MutationAspect::Condition, &mut rng);
            assert!(mutated.condition_count() <= 3);
            assert!(validator::is_valid(&mutated));
        }
    }

    #[test]
    fn test_mutation_exhaustion_is_reported() {
        let mutator = PolicyMutator {
            max_attempts: 0,
            ..PolicyMutator::default()
        };
        let mut rng = Pcg32::seed_from_u64(0);
        let policy = Policy::from_vector(&RESCUE_SELECT_VECTOR).unwrap();
        assert_eq!(
            mutator.mutate_by_modify(&policy, &mut rng),
            Err(GenerationExhausted {
                operation: "mutate_by_modify",
                attempts: 0,
            })
        );
    }

    #[test]
    fn test_mutate_individual_outcomes() {
        let mut rng = Pcg32::seed_from_u64(12);
        let generator = PolicyGenerator::default();

        let always_add = PolicyMutator {
            add_probability: 1.0,
            ..PolicyMutator::default()
        };
        let mut set = generator.generate_individual(3, &mut rng).unwrap();
        let outcome = always_add.mutate_individual(&mut set, 0.0, &mut rng).unwrap();
        assert_eq!(outcome, MutationOutcome::Appended);
        assert_eq!(set.len(), 4);

        let always_remove = PolicyMutator {
            add_probability: 0.0,
            remove_probability: 1.0,
            min_size: 2,
            ..PolicyMutator::default()
        };
        let outcome = always_remove.mutate_individual(&mut set, 0.0, &mut rng).unwrap();
        assert!(matches!(outcome, MutationOutcome::Removed { index } if index < 4));
        assert_eq!(set.len(), 3);
        always_remove.mutate_individual(&mut set, 0.0, &mut rng).unwrap();
        assert_eq!(set.len(), 2);
        // At the minimum size removal falls through to point mutation.
        let outcome = always_remove.mutate_individual(&mut set, 0.0, &mut rng).unwrap();
        assert_eq!(outcome, MutationOutcome::Modified { count: 0 });
        assert_eq!(set.len(), 2);

        let modify_all = PolicyMutator {
            add_probability: 0.0,
            remove_probability: 0.0,
            ..PolicyMutator::default()
        };
        let before = set.clone();
        let outcome = modify_all.mutate_individual(&mut set, 1.0, &mut rng).unwrap();
        assert_eq!(outcome, MutationOutcome::Modified { count: 2 });
        assert!(validator::is_valid_policy_set(&set));
        assert!(set.iter().zip(&before).all(|(a, b)| a != b));
    }
}
