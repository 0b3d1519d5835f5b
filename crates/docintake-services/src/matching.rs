//! Company matching for extracted account numbers.
//!
//! Strategies run in a fixed order and the first hit wins: integer reference number,
//! then short code, then text reference. Reordering them changes which company wins
//! when a code and a reference number collide in value.

use docintake_core::models::Company;
use docintake_core::AppError;
use docintake_db::CompanyDirectory;
use serde_json::{json, Value};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    ReferenceNo,
    Code,
    ReferenceText,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::ReferenceNo => "reference_no",
            MatchStrategy::Code => "code",
            MatchStrategy::ReferenceText => "reference_text",
        }
    }
}

impl Display for MatchStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Raw and digit-only forms of an account number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCandidates {
    pub raw: String,
    /// `None` when the input has no digits.
    pub digits: Option<String>,
}

impl AccountCandidates {
    pub fn normalize(account_number: &str) -> Self {
        let raw = account_number.trim().to_string();
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        Self {
            raw,
            digits: (!digits.is_empty()).then_some(digits),
        }
    }

    /// Integer form of the digits, if it fits.
    pub fn numeric(&self) -> Option<i64> {
        self.digits.as_deref().and_then(|d| d.parse().ok())
    }

    /// Raw first, then the digit form when it differs.
    fn text_forms(&self) -> Vec<&str> {
        let mut forms = vec![self.raw.as_str()];
        if let Some(digits) = self.digits.as_deref() {
            if digits != self.raw {
                forms.push(digits);
            }
        }
        forms
    }
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched {
        company: Company,
        strategy: MatchStrategy,
        candidate: String,
    },
    NoMatch {
        /// Every `strategy:value` pair that was tried, in order.
        attempted: Vec<String>,
    },
}

impl MatchOutcome {
    pub fn company(&self) -> Option<&Company> {
        match self {
            MatchOutcome::Matched { company, .. } => Some(company),
            MatchOutcome::NoMatch { .. } => None,
        }
    }

    /// Diagnostics stored on an unallocated file.
    pub fn diagnostics(&self, account_number: &str) -> Value {
        match self {
            MatchOutcome::Matched {
                strategy,
                candidate,
                ..
            } => json!({
                "account_number": account_number,
                "strategy": strategy.as_str(),
                "candidate": candidate,
            }),
            MatchOutcome::NoMatch { attempted } => json!({
                "account_number": account_number,
                "attempted": attempted,
            }),
        }
    }
}

#[derive(Clone)]
pub struct MatchingEngine {
    directory: Arc<dyn CompanyDirectory>,
}

impl MatchingEngine {
    pub fn new(directory: Arc<dyn CompanyDirectory>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<dyn CompanyDirectory> {
        &self.directory
    }

    #[tracing::instrument(skip(self))]
    pub async fn match_account(&self, account_number: &str) -> Result<MatchOutcome, AppError> {
        let candidates = AccountCandidates::normalize(account_number);
        let mut attempted = Vec::new();

        if candidates.raw.is_empty() {
            return Ok(MatchOutcome::NoMatch { attempted });
        }

        if let Some(reference_no) = candidates.numeric() {
            attempted.push(format!("reference_no:{}", reference_no));
            let found = self.directory.find_by_reference_no(reference_no).await?;
            if let Some(outcome) = pick(found, MatchStrategy::ReferenceNo, reference_no.to_string())
            {
                return Ok(outcome);
            }
        }

        for form in candidates.text_forms() {
            attempted.push(format!("code:{}", form));
            let found = self.directory.find_by_code(form).await?;
            if let Some(outcome) = pick(found, MatchStrategy::Code, form.to_string()) {
                return Ok(outcome);
            }
        }

        for form in candidates.text_forms() {
            attempted.push(format!("reference_text:{}", form));
            let found = self.directory.find_by_reference_text(form).await?;
            if let Some(outcome) = pick(found, MatchStrategy::ReferenceText, form.to_string()) {
                return Ok(outcome);
            }
        }

        tracing::debug!(attempted = ?attempted, "No company matched");
        Ok(MatchOutcome::NoMatch { attempted })
    }
}

/// First company of a strategy's hits. The directory returns them in a stable order.
fn pick(found: Vec<Company>, strategy: MatchStrategy, candidate: String) -> Option<MatchOutcome> {
    if found.len() > 1 {
        tracing::warn!(
            strategy = %strategy,
            candidate = %candidate,
            matches = found.len(),
            "Ambiguous company match, using the first"
        );
    }
    found.into_iter().next().map(|company| MatchOutcome::Matched {
        company,
        strategy,
        candidate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docintake_db::InMemoryCompanyDirectory;

    fn engine(companies: Vec<Company>) -> MatchingEngine {
        MatchingEngine::new(Arc::new(InMemoryCompanyDirectory::with_companies(companies)))
    }

    #[test]
    fn normalize_keeps_raw_and_digits() {
        let c = AccountCandidates::normalize("  ACC-00045 ");
        assert_eq!(c.raw, "ACC-00045");
        assert_eq!(c.digits.as_deref(), Some("00045"));
        assert_eq!(c.numeric(), Some(45));

        let letters = AccountCandidates::normalize("ABC");
        assert_eq!(letters.digits, None);
        assert_eq!(letters.numeric(), None);
    }

    #[tokio::test]
    async fn reference_number_beats_code() {
        let by_reference = Company::new("Reference Ltd").with_reference_no(123);
        let by_code = Company::new("Code Ltd").with_code("123");
        let engine = engine(vec![by_code, by_reference.clone()]);

        match engine.match_account("123").await.unwrap() {
            MatchOutcome::Matched {
                company, strategy, ..
            } => {
                assert_eq!(company.id, by_reference.id);
                assert_eq!(strategy, MatchStrategy::ReferenceNo);
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn code_matches_raw_then_digits() {
        let raw = Company::new("Raw").with_code("AB-12");
        let engine_raw = engine(vec![raw.clone()]);
        let outcome = engine_raw.match_account("AB-12").await.unwrap();
        assert_eq!(outcome.company().map(|c| c.id), Some(raw.id));

        let digits = Company::new("Digits").with_code("0012");
        let engine_digits = engine(vec![digits.clone()]);
        match engine_digits.match_account("X-0012").await.unwrap() {
            MatchOutcome::Matched {
                company,
                strategy,
                candidate,
            } => {
                assert_eq!(company.id, digits.id);
                assert_eq!(strategy, MatchStrategy::Code);
                assert_eq!(candidate, "0012");
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn text_reference_is_last_resort() {
        let company = Company::new("Text").with_reference_text("HQ-NORTH");
        let engine = engine(vec![company.clone()]);
        match engine.match_account("HQ-NORTH").await.unwrap() {
            MatchOutcome::Matched { strategy, .. } => {
                assert_eq!(strategy, MatchStrategy::ReferenceText)
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn no_match_records_attempts() {
        let engine = engine(vec![Company::new("Other").with_reference_no(1)]);
        match engine.match_account("999").await.unwrap() {
            MatchOutcome::NoMatch { attempted } => {
                assert_eq!(
                    attempted,
                    vec!["reference_no:999", "code:999", "reference_text:999"]
                );
            }
            other => panic!("expected no match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn inactive_companies_are_ignored() {
        let mut inactive = Company::new("Gone").with_reference_no(77);
        inactive.is_active = false;
        let engine = engine(vec![inactive]);
        assert!(engine.match_account("77").await.unwrap().company().is_none());
    }
}
