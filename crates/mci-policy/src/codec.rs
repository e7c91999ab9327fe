//! Exact translation between [`Policy`] and the JSON policy record.
//!
//! The record is the format consumed by the external simulator and used for
//! persistence:
//!
//! ```json
//! {
//!   "policyType": "Action",
//!   "conditions": [{ "variable": "MCILevel", "operator": "==", "value": "3" }],
//!   "role": "RESCUE",
//!   "action": { "actionName": "Select", "actionMethod": "Severity", "methodValue": "" },
//!   "minCompliance": -1,
//!   "enforce": "true"
//! }
//! ```
//!
//! For every policy accepted by the validator, `decode(encode(p)) == p`.
//!
//! A policy *file* is one or more top-level JSON arrays of records. A single array
//! may span many physical lines; [`read_policy_set`] re-assembles lines until a
//! complete JSON value parses.

use std::io::{self, BufRead};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    DomainError, Policy, PolicySet,
    domain::{ActionSlot, ConditionSlot, PolicyType, Role, Slot, UNSET},
};

const EQUALS: &str = "==";
const TRUE: &str = "true";
const FALSE: &str = "false";

/// One policy in the external JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    pub policy_type: String,
    pub conditions: Vec<ConditionRecord>,
    pub role: String,
    pub action: ActionRecord,
    /// Minimum compliance fraction, `-1` for Action policies.
    ///
    /// Numeric strings such as `"0.5"` are accepted when reading.
    #[serde(deserialize_with = "number_or_string")]
    pub min_compliance: f64,
    /// `"true"` or `"false"`; only meaningful for Action policies.
    #[serde(default)]
    pub enforce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRecord {
    pub variable: String,
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub action_name: String,
    pub action_method: String,
    /// Decimal method value, or `""` when absent.
    #[serde(default)]
    pub method_value: String,
}

/// A record field, named by its JSON path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RecordField {
    #[display("policyType")]
    PolicyType,
    #[display("conditions.variable")]
    ConditionVariable,
    #[display("conditions.operator")]
    ConditionOperator,
    #[display("conditions.value")]
    ConditionValue,
    #[display("role")]
    Role,
    #[display("action.actionName")]
    ActionName,
    #[display("action.actionMethod")]
    ActionMethod,
    #[display("action.methodValue")]
    MethodValue,
    #[display("enforce")]
    Enforce,
}

/// A record used a string outside the symbol tables.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("unrecognized {field} `{value}`")]
pub struct DecodeError {
    pub field: RecordField,
    pub value: String,
}

/// Why a record of a policy file was rejected.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum RecordError {
    /// The record does not have the shape of a policy record.
    #[display("malformed policy record: {message}")]
    Malformed { message: String },
    #[display("{error}")]
    Decode { error: DecodeError },
}

impl DecodeError {
    fn new(field: RecordField, value: &str) -> Self {
        Self {
            field,
            value: value.to_owned(),
        }
    }
}

/// Translates a policy into its JSON record.
///
/// Unset conditions are omitted and an unset method value is written as `""`.
/// Compliance policies carry `"enforce": "false"` for compatibility with the
/// simulator's reader; the field is ignored when decoding them.
pub fn encode(policy: &Policy) -> Result<PolicyRecord, DomainError> {
    let policy_type = policy.policy_type().ok_or(DomainError::MissingSlot {
        slot: Slot::PolicyType,
    })?;
    let role = policy
        .role()
        .ok_or(DomainError::MissingSlot { slot: Slot::Role })?;

    let conditions = policy
        .conditions()
        .map(|(slot, code)| {
            Ok(ConditionRecord {
                variable: slot.name().to_owned(),
                operator: EQUALS.to_owned(),
                value: slot.value_label(code)?,
            })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;

    let (action, code) = policy.active_action().ok_or(DomainError::ActionCount {
        count: policy.active_actions().count(),
    })?;
    let action = ActionRecord {
        action_name: action.name().to_owned(),
        action_method: action.method_name(code)?.to_owned(),
        method_value: policy
            .method_value()
            .map(|value| value.to_string())
            .unwrap_or_default(),
    };

    Ok(PolicyRecord {
        policy_type: policy_type.name().to_owned(),
        conditions,
        role: role.name().to_owned(),
        action,
        min_compliance: policy.compliance().unwrap_or(UNSET),
        enforce: if policy.enforce() == Some(true) {
            TRUE
        } else {
            FALSE
        }
        .to_owned(),
    })
}

fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(value) => Ok(value),
        NumberOrString::String(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Encodes every policy of a set, preserving order.
pub fn encode_set(policies: &PolicySet) -> Result<Vec<PolicyRecord>, DomainError> {
    policies.iter().map(encode).collect()
}

/// Translates a JSON record into a policy.
///
/// Unknown type, role, action, method, condition variable, damage type or
/// enforcement strings are rejected with a [`DecodeError`] naming the field. The
/// decoded policy is not validated.
pub fn decode(record: &PolicyRecord) -> Result<Policy, DecodeError> {
    let mut policy = Policy::default();

    let policy_type = PolicyType::from_name(&record.policy_type)
        .ok_or_else(|| DecodeError::new(RecordField::PolicyType, &record.policy_type))?;
    policy.set_policy_type(policy_type);

    for condition in &record.conditions {
        let slot = ConditionSlot::from_name(&condition.variable).ok_or_else(|| {
            DecodeError::new(RecordField::ConditionVariable, &condition.variable)
        })?;
        if condition.operator != EQUALS {
            return Err(DecodeError::new(
                RecordField::ConditionOperator,
                &condition.operator,
            ));
        }
        let code = slot
            .parse_value(&condition.value)
            .ok_or_else(|| DecodeError::new(RecordField::ConditionValue, &condition.value))?;
        policy.set_condition(slot, Some(code));
    }

    let role = Role::from_name(&record.role)
        .ok_or_else(|| DecodeError::new(RecordField::Role, &record.role))?;
    policy.set_role(role);

    let action_record = &record.action;
    let action = ActionSlot::from_name(&action_record.action_name)
        .ok_or_else(|| DecodeError::new(RecordField::ActionName, &action_record.action_name))?;
    let method = action
        .method_code(&action_record.action_method)
        .ok_or_else(|| DecodeError::new(RecordField::ActionMethod, &action_record.action_method))?;
    policy.set_action(action, Some(method));

    if !action_record.method_value.is_empty() {
        let value = action_record
            .method_value
            .trim()
            .parse()
            .map_err(|_| DecodeError::new(RecordField::MethodValue, &action_record.method_value))?;
        policy.set_method_value(Some(value));
    }

    match policy_type {
        PolicyType::Action => {
            let enforce = match record.enforce.as_str() {
                TRUE => true,
                FALSE => false,
                other => return Err(DecodeError::new(RecordField::Enforce, other)),
            };
            policy.set_enforce(Some(enforce));
        }
        PolicyType::Compliance => {
            let compliance = record.min_compliance;
            if (compliance - UNSET).abs() >= f64::EPSILON {
                policy.set_compliance(Some(compliance));
            }
        }
    }

    Ok(policy)
}

/// Failure to read a policy file as JSON.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum PolicyFileError {
    #[display("failed to read policy data")]
    Io { source: io::Error },
    #[display("malformed policy JSON ending at line {line}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
}

/// A record that failed to decode, with its position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    /// Zero-based index of the record among all records read.
    pub position: usize,
    pub error: RecordError,
}

/// Result of reading a policy file: decoded policies in file order plus the
/// records that were rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedPolicies {
    pub policies: PolicySet,
    pub rejected: Vec<RejectedRecord>,
}

impl DecodedPolicies {
    fn push_records(&mut self, records: Vec<serde_json::Value>) {
        for value in records {
            let position = self.policies.len() + self.rejected.len();
            let decoded = PolicyRecord::deserialize(value)
                .map_err(|e| RecordError::Malformed {
                    message: e.to_string(),
                })
                .and_then(|record| decode(&record).map_err(|error| RecordError::Decode { error }));
            match decoded {
                Ok(policy) => self.policies.push(policy),
                Err(error) => {
                    tracing::warn!(position, %error, "rejected policy record");
                    self.rejected.push(RejectedRecord { position, error });
                }
            }
        }
    }
}

/// Reads a policy file made of top-level JSON arrays of records.
///
/// Lines are accumulated until the buffer parses as a complete array; an array may
/// therefore span any number of lines. A record with missing or mistyped fields or
/// an unrecognized enumerant is rejected on its own and the remaining records are
/// still decoded. Malformed JSON that is not merely incomplete aborts the read.
///
/// # Examples
///
/// ```
/// use mci_policy::codec;
///
/// let file = r#"[
///   {"policyType": "Compliance",
///    "conditions": [{"variable": "Time", "operator": "==", "value": "2"}],
///    "role": "TREATMENT",
///    "action": {"actionName": "Operate", "actionMethod": "", "methodValue": ""},
///    "minCompliance": 0.7, "enforce": "false"}
/// ]"#;
/// let decoded = codec::read_policy_set(file.as_bytes()).unwrap();
/// assert_eq!(decoded.policies.len(), 1);
/// assert!(decoded.rejected.is_empty());
/// ```
pub fn read_policy_set<R>(reader: R) -> Result<DecodedPolicies, PolicyFileError>
where
    R: BufRead,
{
    let mut decoded = DecodedPolicies::default();
    let mut buffer = String::new();
    let mut line_count = 0;

    for line in reader.lines() {
        let line = line.map_err(|source| PolicyFileError::Io { source })?;
        line_count += 1;
        buffer.push_str(&line);
        buffer.push('\n');
        if buffer.trim().is_empty() {
            buffer.clear();
            continue;
        }
        match serde_json::from_str::<Vec<serde_json::Value>>(&buffer) {
            Ok(records) => {
                decoded.push_records(records);
                buffer.clear();
            }
            Err(e) if e.is_eof() => {}
            Err(source) => {
                return Err(PolicyFileError::Json {
                    line: line_count,
                    source,
                });
            }
        }
    }

    if !buffer.trim().is_empty() {
        let records = serde_json::from_str::<Vec<serde_json::Value>>(&buffer).map_err(|source| {
            PolicyFileError::Json {
                line: line_count,
                source,
            }
        })?;
        decoded.push_records(records);
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;
    use crate::{
        generator::{ExhaustiveMode, PolicyGenerator},
        policy::tests::{RESCUE_SELECT_VECTOR, TRANSPORT_COMPLIANCE_VECTOR},
        validator,
    };

    const RESCUE_SELECT_JSON: &str = r#"{"policyType":"Action","conditions":[{"variable":"MCILevel","operator":"==","value":"3"}],"role":"RESCUE","action":{"actionName":"Select","actionMethod":"Severity","methodValue":""},"minCompliance":-1,"enforce":"true"}"#;

    fn record(json: &str) -> PolicyRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_decode_known_record() {
        let policy = decode(&record(RESCUE_SELECT_JSON)).unwrap();
        assert_eq!(policy.to_vector(), RESCUE_SELECT_VECTOR);
    }

    #[test]
    fn test_reencode_known_record() {
        let original = record(RESCUE_SELECT_JSON);
        let policy = decode(&original).unwrap();
        let encoded = encode(&policy).unwrap();
        assert_eq!(encoded, original);

        let original_value: serde_json::Value = serde_json::from_str(RESCUE_SELECT_JSON).unwrap();
        let encoded_value = serde_json::to_value(&encoded).unwrap();
        assert_eq!(encoded_value, original_value);
    }

    #[test]
    fn test_encode_compliance_policy() {
        let policy = Policy::from_vector(&TRANSPORT_COMPLIANCE_VECTOR).unwrap();
        let encoded = encode(&policy).unwrap();
        assert_eq!(encoded.policy_type, "Compliance");
        assert_eq!(encoded.role, "TRANSPORT");
        assert_eq!(encoded.action.action_name, "DeliverTo");
        assert_eq!(encoded.action.action_method, "");
        assert_eq!(encoded.action.method_value, "");
        assert!((encoded.min_compliance - 0.4).abs() < f64::EPSILON);
        let conditions: Vec<_> = encoded
            .conditions
            .iter()
            .map(|c| (c.variable.as_str(), c.value.as_str()))
            .collect();
        assert_eq!(
            conditions,
            vec![("MCILevel", "1"), ("DamageType", "Collapse"), ("Time", "4")]
        );
        assert_eq!(decode(&encoded).unwrap(), policy);
    }

    #[test]
    fn test_method_value_roundtrip() {
        let json = r#"{"policyType":"Action","conditions":[{"variable":"Time","operator":"==","value":"5"}],"role":"TREATMENT","action":{"actionName":"Release","actionMethod":"Time","methodValue":"4"},"minCompliance":-1,"enforce":"false"}"#;
        let policy = decode(&record(json)).unwrap();
        assert!(validator::is_valid(&policy));
        assert_eq!(policy.method_value(), Some(4));
        assert_eq!(policy.enforce(), Some(false));
        assert_eq!(encode(&policy).unwrap(), record(json));
    }

    #[test]
    fn test_decode_errors_name_the_field() {
        let cases = [
            ("\"Action\"", "\"Rule\"", RecordField::PolicyType),
            ("\"RESCUE\"", "\"POLICE\"", RecordField::Role),
            ("\"Select\"", "\"Fly\"", RecordField::ActionName),
            ("\"Severity\"", "\"Random\"", RecordField::ActionMethod),
            ("\"MCILevel\"", "\"Weather\"", RecordField::ConditionVariable),
            ("\"==\"", "\">=\"", RecordField::ConditionOperator),
            ("\"true\"", "\"yes\"", RecordField::Enforce),
        ];
        for (from, to, field) in cases {
            let json = RESCUE_SELECT_JSON.replacen(from, to, 1);
            let error = decode(&record(&json)).unwrap_err();
            assert_eq!(error.field, field, "{json}");
            assert_eq!(error.value, to.trim_matches('"'));
        }
    }

    #[test]
    fn test_decode_malformed_values() {
        let json = RESCUE_SELECT_JSON.replace("\"value\":\"3\"", "\"value\":\"high\"");
        assert_eq!(
            decode(&record(&json)).unwrap_err().field,
            RecordField::ConditionValue
        );

        let json = RESCUE_SELECT_JSON.replace("\"methodValue\":\"\"", "\"methodValue\":\"x\"");
        assert_eq!(
            decode(&record(&json)).unwrap_err().field,
            RecordField::MethodValue
        );
    }

    #[test]
    fn test_encode_rejects_incomplete_policy() {
        let mut vector = RESCUE_SELECT_VECTOR;
        vector[Slot::Role.index()] = UNSET;
        let policy = Policy::from_vector(&vector).unwrap();
        assert_eq!(
            encode(&policy),
            Err(DomainError::MissingSlot { slot: Slot::Role })
        );

        let mut vector = RESCUE_SELECT_VECTOR;
        vector[Slot::Stage.index()] = 1.0;
        let policy = Policy::from_vector(&vector).unwrap();
        assert_eq!(encode(&policy), Err(DomainError::ActionCount { count: 2 }));
    }

    #[test]
    fn test_roundtrip_generated_policies() {
        let mut rng = Pcg32::seed_from_u64(11);
        let generator = PolicyGenerator::default();
        let random = generator.generate_individual(200, &mut rng).unwrap();
        let exhaustive = generator.generate_individual_exhaustive(ExhaustiveMode::Random, &mut rng);
        for policy in random.iter().chain(&exhaustive) {
            assert!(validator::is_valid(policy));
            let record = encode(policy).unwrap();
            assert_eq!(&decode(&record).unwrap(), policy);

            // Through text as well, as the simulator sees it.
            let text = serde_json::to_string(&record).unwrap();
            let reparsed: PolicyRecord = serde_json::from_str(&text).unwrap();
            assert_eq!(&decode(&reparsed).unwrap(), policy);
        }
    }

    #[test]
    fn test_read_multiline_file() {
        let set: PolicySet = [RESCUE_SELECT_VECTOR, TRANSPORT_COMPLIANCE_VECTOR]
            .iter()
            .map(|v| Policy::from_vector(v).unwrap())
            .collect();
        let records = encode_set(&set).unwrap();
        let pretty = serde_json::to_string_pretty(&records).unwrap();
        assert!(pretty.lines().count() > 10);

        let decoded = read_policy_set(pretty.as_bytes()).unwrap();
        assert_eq!(decoded.policies, set);
        assert!(decoded.rejected.is_empty());
    }

    #[test]
    fn test_read_several_arrays_and_blank_lines() {
        let file = format!("\n[{RESCUE_SELECT_JSON}]\n\n[\n{RESCUE_SELECT_JSON},\n{RESCUE_SELECT_JSON}\n]\n");
        let decoded = read_policy_set(file.as_bytes()).unwrap();
        assert_eq!(decoded.policies.len(), 3);
    }

    #[test]
    fn test_read_rejects_single_record() {
        let bad = RESCUE_SELECT_JSON.replace("RESCUE", "POLICE");
        let file = format!("[{RESCUE_SELECT_JSON},\n{bad},\n{RESCUE_SELECT_JSON}]");
        let decoded = read_policy_set(file.as_bytes()).unwrap();
        assert_eq!(decoded.policies.len(), 2);
        assert_eq!(decoded.rejected.len(), 1);
        assert_eq!(decoded.rejected[0].position, 1);
        assert!(matches!(
            &decoded.rejected[0].error,
            RecordError::Decode { error } if error.field == RecordField::Role
        ));
    }

    #[test]
    fn test_read_rejects_malformed_record() {
        let missing = RESCUE_SELECT_JSON.replace(r#","minCompliance":-1"#, "");
        let quoted = r#"{"policyType":"Compliance","conditions":[{"variable":"Time","operator":"==","value":"2"}],"role":"TREATMENT","action":{"actionName":"Operate","actionMethod":"","methodValue":""},"minCompliance":"0.5","enforce":"false"}"#;
        let file = format!("[{missing},\n{quoted},\n{RESCUE_SELECT_JSON}]");
        let decoded = read_policy_set(file.as_bytes()).unwrap();

        assert_eq!(decoded.policies.len(), 2);
        assert_eq!(decoded.policies.policies()[0].compliance(), Some(0.5));
        assert_eq!(decoded.rejected.len(), 1);
        assert_eq!(decoded.rejected[0].position, 0);
        assert!(matches!(
            &decoded.rejected[0].error,
            RecordError::Malformed { message } if message.contains("minCompliance")
        ));
    }

    #[test]
    fn test_read_errors() {
        let truncated = format!("[{RESCUE_SELECT_JSON},\n{RESCUE_SELECT_JSON}\n");
        let err = read_policy_set(truncated.as_bytes()).unwrap_err();
        assert!(matches!(err, PolicyFileError::Json { line: 2, .. }));

        let garbage = "[{\"policyType\": }]\n";
        let err = read_policy_set(garbage.as_bytes()).unwrap_err();
        assert!(matches!(err, PolicyFileError::Json { line: 1, .. }));
    }
}
