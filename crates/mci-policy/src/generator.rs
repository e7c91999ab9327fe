//! Random and exhaustive construction of policy sets.
//!
//! Three strategies share one [`PolicyGenerator`]:
//!
//! - [`PolicyGenerator::generate_policy`] draws one candidate policy. Candidates are
//!   not guaranteed legal: the minimum compliance is drawn from tenths in `0.0..=0.9`
//!   and a `0.0` draw fails validation.
//! - [`PolicyGenerator::generate_individual`] rejection-samples candidates until the
//!   requested number of valid policies is collected. Every policy gets at most
//!   `max_attempts` draws before [`GenerationExhausted`] is returned.
//! - [`PolicyGenerator::generate_individual_exhaustive`] enumerates every
//!   (role, action, condition combination) as an Action policy, plus one Compliance
//!   policy per (role, action, compliance level). The [`ExhaustiveMode`] selects how
//!   method and enforcement are filled in.

use arrayvec::ArrayVec;
use rand::{Rng, seq::IndexedRandom as _};
use serde::{Deserialize, Serialize};

use crate::{
    GenerationExhausted, Policy, PolicySet,
    domain::{ActionSlot, COMPLIANCE_LEVELS, COMPLIANCE_MARKER, ConditionSlot, PolicyType, Role},
    validator,
};

/// Default bound on candidate draws per emitted policy.
pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;

/// A condition assignment: the set condition slots and their codes.
pub type Conditions = ArrayVec<(ConditionSlot, u8), { ConditionSlot::LEN }>;

/// How exhaustive generation fills in the method and enforcement of Action policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExhaustiveMode {
    /// First method of the action, not enforced.
    #[default]
    Fixed,
    /// Random method, random enforcement.
    Random,
    /// Random method, always enforced.
    AlwaysEnforce,
}

/// Selects which generation pipeline builds a policy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationStrategy {
    /// Rejection-sampled random policies, exactly `size` of them.
    Random { size: usize },
    /// The complete enumeration of the rule space.
    Exhaustive(ExhaustiveMode),
}

/// Builds legal policies and policy sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyGenerator {
    /// Candidate draws allowed per emitted policy.
    pub max_attempts: usize,
}

impl Default for PolicyGenerator {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PolicyGenerator {
    /// Draws one candidate policy.
    ///
    /// Type and role are uniform, the action is uniform among the role's actions, and a
    /// random non-empty subset of the role's conditions is set to uniform legal codes.
    pub fn generate_policy<R>(&self, rng: &mut R) -> Policy
    where
        R: Rng + ?Sized,
    {
        let policy_type: PolicyType = rng.random();
        let role: Role = rng.random();

        let mut policy = Policy::default();
        policy.set_policy_type(policy_type);
        policy.set_role(role);
        set_random_action(&mut policy, policy_type, role, rng);
        match policy_type {
            PolicyType::Action => policy.set_enforce(Some(rng.random_bool(0.5))),
            PolicyType::Compliance => {
                let tenths = rng.random_range(0..=9_u8);
                policy.set_compliance(Some(f64::from(tenths) / 10.0));
            }
        }
        for (slot, code) in random_conditions(role, rng) {
            policy.set_condition(slot, Some(code));
        }
        policy
    }

    /// Draws candidates until one passes the validator.
    pub fn generate_valid_policy<R>(&self, rng: &mut R) -> Result<Policy, GenerationExhausted>
    where
        R: Rng + ?Sized,
    {
        for attempt in 1..=self.max_attempts {
            let policy = self.generate_policy(rng);
            match validator::check(&policy) {
                Ok(()) => return Ok(policy),
                Err(violation) => {
                    tracing::trace!(attempt, %violation, "rejected generated policy");
                }
            }
        }
        tracing::warn!(
            attempts = self.max_attempts,
            "policy generation exhausted its retry bound"
        );
        Err(GenerationExhausted {
            operation: "generate_policy",
            attempts: self.max_attempts,
        })
    }

    /// Builds a set of exactly `size` valid policies by rejection sampling.
    ///
    /// # Examples
    ///
    /// ```
    /// use mci_policy::{generator::PolicyGenerator, validator};
    /// use rand::SeedableRng as _;
    /// use rand_pcg::Pcg32;
    ///
    /// let mut rng = Pcg32::seed_from_u64(1);
    /// let set = PolicyGenerator::default().generate_individual(5, &mut rng).unwrap();
    /// assert_eq!(set.len(), 5);
    /// assert!(validator::is_valid_policy_set(&set));
    /// ```
    pub fn generate_individual<R>(
        &self,
        size: usize,
        rng: &mut R,
    ) -> Result<PolicySet, GenerationExhausted>
    where
        R: Rng + ?Sized,
    {
        (0..size).map(|_| self.generate_valid_policy(rng)).collect()
    }

    /// Enumerates the whole rule space.
    ///
    /// Action policies come first, ordered by role, action, then condition codes;
    /// compliance policies follow, ordered by role, action, then compliance level.
    /// The random stream is only consumed by [`ExhaustiveMode::Random`] and
    /// [`ExhaustiveMode::AlwaysEnforce`].
    pub fn generate_individual_exhaustive<R>(&self, mode: ExhaustiveMode, rng: &mut R) -> PolicySet
    where
        R: Rng + ?Sized,
    {
        let mut set = PolicySet::new();

        for role in Role::ALL {
            for &action in role.actions() {
                for conditions in condition_combinations(action.conditions()) {
                    let (method, enforce) = match mode {
                        ExhaustiveMode::Fixed => (action.method_codes()[0], false),
                        ExhaustiveMode::Random => (random_method(action, rng), rng.random_bool(0.5)),
                        ExhaustiveMode::AlwaysEnforce => (random_method(action, rng), true),
                    };
                    let mut policy = base_policy(PolicyType::Action, role, &conditions);
                    policy.set_action(action, Some(method));
                    policy.set_enforce(Some(enforce));
                    set.push(policy);
                }
            }
        }

        for role in Role::ALL {
            for &action in role.actions() {
                let first = action.conditions()[0];
                let mut conditions = Conditions::new();
                conditions.push((first, first.values()[0]));
                for level in COMPLIANCE_LEVELS {
                    let mut policy = base_policy(PolicyType::Compliance, role, &conditions);
                    policy.set_action(action, Some(COMPLIANCE_MARKER));
                    policy.set_compliance(Some(level));
                    set.push(policy);
                }
            }
        }

        tracing::debug!(?mode, policies = set.len(), "enumerated exhaustive policy set");
        set
    }

    /// Builds a policy set with the selected strategy.
    pub fn generate<R>(
        &self,
        strategy: GenerationStrategy,
        rng: &mut R,
    ) -> Result<PolicySet, GenerationExhausted>
    where
        R: Rng + ?Sized,
    {
        match strategy {
            GenerationStrategy::Random { size } => self.generate_individual(size, rng),
            GenerationStrategy::Exhaustive(mode) => {
                Ok(self.generate_individual_exhaustive(mode, rng))
            }
        }
    }
}

fn base_policy(policy_type: PolicyType, role: Role, conditions: &Conditions) -> Policy {
    let mut policy = Policy::default();
    policy.set_policy_type(policy_type);
    policy.set_role(role);
    for &(slot, code) in conditions {
        policy.set_condition(slot, Some(code));
    }
    policy
}

/// Cartesian product of the legal codes of `slots`, in lexicographic order.
fn condition_combinations(slots: &[ConditionSlot]) -> Vec<Conditions> {
    let mut combinations = vec![Conditions::new()];
    for &slot in slots {
        combinations = combinations
            .into_iter()
            .flat_map(|prefix| {
                slot.values().iter().map(move |&code| {
                    let mut next = prefix.clone();
                    next.push((slot, code));
                    next
                })
            })
            .collect();
    }
    combinations
}

/// Draws a non-empty subset of the role's conditions with uniform legal codes.
pub(crate) fn random_conditions<R>(role: Role, rng: &mut R) -> Conditions
where
    R: Rng + ?Sized,
{
    let allowed = role.conditions();
    let count = rng.random_range(1..=allowed.len());
    let mut conditions: Conditions = allowed
        .choose_multiple(rng, count)
        .map(|&slot| (slot, random_condition_value(slot, rng)))
        .collect();
    conditions.sort_unstable_by_key(|(slot, _)| *slot);
    conditions
}

pub(crate) fn random_condition_value<R>(slot: ConditionSlot, rng: &mut R) -> u8
where
    R: Rng + ?Sized,
{
    let values = slot.values();
    values[rng.random_range(0..values.len())]
}

pub(crate) fn random_method<R>(action: ActionSlot, rng: &mut R) -> u8
where
    R: Rng + ?Sized,
{
    let codes = action.method_codes();
    codes[rng.random_range(0..codes.len())]
}

/// Clears every action slot and activates a uniform action of `role`, holding a
/// random method for Action policies or the marker for Compliance policies.
pub(crate) fn set_random_action<R>(
    policy: &mut Policy,
    policy_type: PolicyType,
    role: Role,
    rng: &mut R,
) where
    R: Rng + ?Sized,
{
    let actions = role.actions();
    let action = actions[rng.random_range(0..actions.len())];
    let code = match policy_type {
        PolicyType::Action => random_method(action, rng),
        PolicyType::Compliance => COMPLIANCE_MARKER,
    };
    policy.clear_actions();
    policy.set_action(action, Some(code));
}
