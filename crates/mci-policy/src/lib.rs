//! Policy encoding and constrained generation for mass-casualty-incident (MCI) response.
//!
//! A policy is one rule: for a responder [`Role`](domain::Role) under some situational
//! conditions, either prescribe an action method (an *Action* policy) or demand a minimum
//! compliance fraction for an action (a *Compliance* policy). An optimizer searches over
//! [`PolicySet`]s whose fitness comes from an external simulator.
//!
//! This crate owns everything that has invariants:
//!
//! - [`domain`] - static relational tables (role → actions → conditions → methods)
//! - [`policy`] - the 18-slot [`Policy`] record and its numeric vector view
//! - [`codec`] - exact round-trip between [`Policy`] and the JSON policy record
//! - [`validator`] - the legality predicate every emitted policy satisfies
//! - [`generator`] - random, rejection-sampled and exhaustive policy sets
//! - [`mutator`] - structural point mutations with bounded repair-until-valid
//!
//! # Architecture
//!
//! ```text
//! domain tables
//!     ↓ consulted by
//! generator ──→ validator ←── mutator
//!     ↓ emits              ↑ re-validates
//! Policy / PolicySet ──────┘
//!     ↕ codec
//! JSON policy records (simulator input, persistence)
//! ```
//!
//! Every stochastic operation takes an explicit random number generator, so
//! independent policy sets can be built concurrently with their own streams.
//!
//! # Example
//!
//! ```
//! use mci_policy::{codec, generator::PolicyGenerator, validator};
//! use rand::SeedableRng as _;
//! use rand_pcg::Pcg32;
//!
//! let mut rng = Pcg32::seed_from_u64(7);
//! let generator = PolicyGenerator::default();
//! let set = generator.generate_individual(5, &mut rng).unwrap();
//! assert_eq!(set.len(), 5);
//!
//! for policy in &set {
//!     assert!(validator::is_valid(policy));
//!     let record = codec::encode(policy).unwrap();
//!     assert_eq!(&codec::decode(&record).unwrap(), policy);
//! }
//! ```

pub use self::policy::{Policy, PolicySet, PolicyVector};

pub mod codec;
pub mod domain;
pub mod generator;
pub mod mutator;
pub mod policy;
pub mod validator;

use self::domain::Slot;

/// A slot or value outside the static symbol tables was requested.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum DomainError {
    #[display("slot index {index} is outside the 18-slot policy layout")]
    UnknownSlot { index: usize },
    #[display("policy vector has {len} slots, expected 18")]
    SlotCount { len: usize },
    #[display("value {value} is not a recognized code for slot {slot}")]
    UnknownCode { slot: Slot, value: f64 },
    #[display("slot {slot} is required but unset")]
    MissingSlot { slot: Slot },
    #[display("policy has {count} active action slots, expected exactly one")]
    ActionCount { count: usize },
}

/// A bounded retry loop ran out of attempts without producing a valid policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("{operation} found no valid policy after {attempts} attempts")]
pub struct GenerationExhausted {
    pub operation: &'static str,
    pub attempts: usize,
}
