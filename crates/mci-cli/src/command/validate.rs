use std::path::PathBuf;

use mci_policy::{codec::DecodedPolicies, validator};

use crate::util;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ValidateArg {
    /// Policy file to check
    path: PathBuf,
    /// Print the 18-slot numeric vector of every decoded policy
    #[arg(long)]
    vectors: bool,
}

/// Verdict on one record of a policy file.
#[derive(Debug, Clone, PartialEq)]
enum RecordReport {
    Valid { vector: String },
    Invalid { vector: String, reason: String },
    Rejected { reason: String },
}

pub(crate) fn run(arg: &ValidateArg) -> anyhow::Result<()> {
    let ValidateArg { path, vectors } = arg;
    let decoded = util::read_policy_file(path)?;
    let reports = check_records(&decoded);

    for (position, report) in reports.iter().enumerate() {
        match report {
            RecordReport::Valid { vector } => {
                if *vectors {
                    println!("#{position}: valid {vector}");
                } else {
                    println!("#{position}: valid");
                }
            }
            RecordReport::Invalid { vector, reason } => {
                if *vectors {
                    println!("#{position}: invalid ({reason}) {vector}");
                } else {
                    println!("#{position}: invalid ({reason})");
                }
            }
            RecordReport::Rejected { reason } => println!("#{position}: rejected ({reason})"),
        }
    }

    let failures = reports
        .iter()
        .filter(|r| !matches!(r, RecordReport::Valid { .. }))
        .count();
    tracing::info!(
        records = reports.len(),
        failures,
        path = %path.display(),
        "validated policy file"
    );
    anyhow::ensure!(
        !reports.is_empty(),
        "{} contains no policy records",
        path.display()
    );
    anyhow::ensure!(
        failures == 0,
        "{failures} of {} policy records in {} are rejected or invalid",
        reports.len(),
        path.display()
    );
    Ok(())
}

/// Reports every record in file order, merging decoded and rejected records.
fn check_records(decoded: &DecodedPolicies) -> Vec<RecordReport> {
    let total = decoded.policies.len() + decoded.rejected.len();
    let mut policies = decoded.policies.iter();
    let mut rejected = decoded.rejected.iter().peekable();
    let mut reports = Vec::with_capacity(total);

    for position in 0..total {
        if let Some(record) = rejected.next_if(|r| r.position == position) {
            reports.push(RecordReport::Rejected {
                reason: record.error.to_string(),
            });
            continue;
        }
        let Some(policy) = policies.next() else {
            break;
        };
        let vector = policy.to_string();
        reports.push(match validator::check(policy) {
            Ok(()) => RecordReport::Valid { vector },
            Err(violation) => RecordReport::Invalid {
                vector,
                reason: violation.to_string(),
            },
        });
    }
    reports
}
