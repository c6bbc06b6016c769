//! Feature schema: the frozen ordered list and encoding rules for model inputs
//!
//! Every component keys off this ordering. The order is fixed at training
//! time; reordering an enumeration or the feature list after a model has been
//! trained silently changes model semantics, so both are frozen constants.

use std::collections::HashMap;

use ndarray::Array1;
use serde_json::Value;

use crate::error::{CreditLensError, Result};

/// Value domain of a single feature
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureDomain {
    /// Unbounded numeric value, passed through unchanged
    Numeric,
    /// Fixed label enumeration; the label's index is the integer code
    Categorical(&'static [&'static str]),
}

/// One schema entry: feature name plus its domain
#[derive(Debug, Clone, Copy)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub domain: FeatureDomain,
}

// Label enumerations. Index positions are the trained integer codes and
// must never be reordered.
const GENDER: &[&str] = &["Female", "Male"];
const EDUCATION: &[&str] = &["High School", "Bachelor", "Master", "Associate", "Doctorate"];
const HOME_OWNERSHIP: &[&str] = &["RENT", "OWN", "MORTGAGE", "OTHER"];
const LOAN_INTENT: &[&str] = &[
    "EDUCATION",
    "MEDICAL",
    "VENTURE",
    "PERSONAL",
    "DEBTCONSOLIDATION",
    "HOMEIMPROVEMENT",
];
const DEFAULTS_ON_FILE: &[&str] = &["No", "Yes"];

const LOAN_FEATURES: &[FeatureSpec] = &[
    FeatureSpec { name: "person_age", domain: FeatureDomain::Numeric },
    FeatureSpec { name: "person_gender", domain: FeatureDomain::Categorical(GENDER) },
    FeatureSpec { name: "person_education", domain: FeatureDomain::Categorical(EDUCATION) },
    FeatureSpec { name: "person_income", domain: FeatureDomain::Numeric },
    FeatureSpec { name: "person_emp_exp", domain: FeatureDomain::Numeric },
    FeatureSpec { name: "person_home_ownership", domain: FeatureDomain::Categorical(HOME_OWNERSHIP) },
    FeatureSpec { name: "loan_amnt", domain: FeatureDomain::Numeric },
    FeatureSpec { name: "loan_intent", domain: FeatureDomain::Categorical(LOAN_INTENT) },
    FeatureSpec { name: "loan_int_rate", domain: FeatureDomain::Numeric },
    FeatureSpec { name: "loan_percent_income", domain: FeatureDomain::Numeric },
    FeatureSpec { name: "cb_person_cred_hist_length", domain: FeatureDomain::Numeric },
    FeatureSpec { name: "credit_score", domain: FeatureDomain::Numeric },
    FeatureSpec { name: "previous_loan_defaults_on_file", domain: FeatureDomain::Categorical(DEFAULTS_ON_FILE) },
];

/// An encoded applicant record: feature name to coded numeric value,
/// exactly one entry per schema feature
pub type ApplicantRecord = HashMap<String, f64>;

/// The canonical ordered feature schema
///
/// Process-wide and immutable: constructed once at startup and shared
/// read-only across requests.
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    features: &'static [FeatureSpec],
}

impl FeatureSchema {
    /// The frozen 13-feature loan approval schema
    pub fn loan_approval() -> Self {
        Self { features: LOAN_FEATURES }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[FeatureSpec] {
        self.features
    }

    /// Feature names in frozen order
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.to_string()).collect()
    }

    /// Encode a raw form submission into an applicant record.
    ///
    /// Categorical fields accept either the string label (mapped to its
    /// frozen integer code) or the numeric code itself; numeric fields pass
    /// through unchanged. Unknown keys, missing keys, and unrecognized
    /// labels are schema errors.
    pub fn encode(&self, raw: &HashMap<String, Value>) -> Result<ApplicantRecord> {
        for key in raw.keys() {
            if !self.features.iter().any(|f| f.name == key) {
                return Err(CreditLensError::Schema(format!("unknown feature: {}", key)));
            }
        }

        let mut record = ApplicantRecord::with_capacity(self.features.len());
        for spec in self.features {
            let value = raw
                .get(spec.name)
                .ok_or_else(|| CreditLensError::Schema(format!("missing feature: {}", spec.name)))?;
            record.insert(spec.name.to_string(), self.encode_value(spec, value)?);
        }
        Ok(record)
    }

    fn encode_value(&self, spec: &FeatureSpec, value: &Value) -> Result<f64> {
        match (spec.domain, value) {
            (FeatureDomain::Numeric, Value::Number(n)) => n.as_f64().ok_or_else(|| {
                CreditLensError::Schema(format!("non-finite value for {}", spec.name))
            }),
            (FeatureDomain::Categorical(labels), Value::String(s)) => labels
                .iter()
                .position(|&l| l == s)
                .map(|idx| idx as f64)
                .ok_or_else(|| {
                    CreditLensError::Schema(format!(
                        "unrecognized category '{}' for {} (expected one of {:?})",
                        s, spec.name, labels
                    ))
                }),
            (FeatureDomain::Categorical(labels), Value::Number(n)) => {
                let code = n.as_f64().unwrap_or(-1.0);
                Self::check_code(spec.name, labels, code)?;
                Ok(code)
            }
            _ => Err(CreditLensError::Schema(format!(
                "invalid value type for {}: {}",
                spec.name, value
            ))),
        }
    }

    fn check_code(name: &str, labels: &[&str], code: f64) -> Result<()> {
        if code.fract() != 0.0 || code < 0.0 || code >= labels.len() as f64 {
            return Err(CreditLensError::Schema(format!(
                "unrecognized category code {} for {} (valid codes 0..{})",
                code,
                name,
                labels.len()
            )));
        }
        Ok(())
    }

    /// Select and order record values by the frozen feature sequence.
    ///
    /// Selection is strictly name-based: the payload's own ordering carries
    /// no meaning. The record must contain exactly the schema's names.
    pub fn reorder(&self, record: &ApplicantRecord) -> Result<Array1<f64>> {
        if record.len() != self.features.len() {
            for key in record.keys() {
                if !self.features.iter().any(|f| f.name == key) {
                    return Err(CreditLensError::Schema(format!("unknown feature: {}", key)));
                }
            }
        }

        let mut values = Vec::with_capacity(self.features.len());
        for spec in self.features {
            let value = *record
                .get(spec.name)
                .ok_or_else(|| CreditLensError::Schema(format!("missing feature: {}", spec.name)))?;
            if let FeatureDomain::Categorical(labels) = spec.domain {
                Self::check_code(spec.name, labels, value)?;
            }
            values.push(value);
        }
        Ok(Array1::from_vec(values))
    }
}
