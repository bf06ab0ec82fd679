use std::sync::LazyLock;

use regex::Regex;
use ulid::Ulid;

use crate::domain::errors::DomainError;

static SUBMISSION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sub_[0-9A-HJKMNP-TV-Z]{26}$").unwrap());
static CANDIDATE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^cand_[0-9A-HJKMNP-TV-Z]{26}$").unwrap());
static ASSIGNMENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^asg_[0-9A-HJKMNP-TV-Z]{26}$").unwrap());
static EXPORT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^exp_[0-9A-HJKMNP-TV-Z]{26}$").unwrap());

pub(crate) fn new_submission_public_id() -> String {
    format!("sub_{}", Ulid::new())
}

pub(crate) fn new_candidate_public_id() -> String {
    format!("cand_{}", Ulid::new())
}

pub(crate) fn new_assignment_public_id() -> String {
    format!("asg_{}", Ulid::new())
}

pub(crate) fn new_export_public_id() -> String {
    format!("exp_{}", Ulid::new())
}

pub(crate) fn validate_submission_id(value: &str) -> Result<(), DomainError> {
    validate(&SUBMISSION_ID_RE, value)
}

pub(crate) fn validate_candidate_id(value: &str) -> Result<(), DomainError> {
    validate(&CANDIDATE_ID_RE, value)
}

pub(crate) fn validate_assignment_id(value: &str) -> Result<(), DomainError> {
    validate(&ASSIGNMENT_ID_RE, value)
}

pub(crate) fn validate_export_id(value: &str) -> Result<(), DomainError> {
    validate(&EXPORT_ID_RE, value)
}

fn validate(re: &Regex, value: &str) -> Result<(), DomainError> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(DomainError::InvalidPublicId(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_validate() {
        validate_submission_id(&new_submission_public_id()).unwrap();
        validate_candidate_id(&new_candidate_public_id()).unwrap();
        validate_assignment_id(&new_assignment_public_id()).unwrap();
        validate_export_id(&new_export_public_id()).unwrap();
    }

    #[test]
    fn prefixes_are_not_interchangeable() {
        let id = new_submission_public_id();
        assert!(validate_candidate_id(&id).is_err());
        assert!(validate_assignment_id(&id).is_err());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(validate_submission_id("sub_").is_err());
        assert!(validate_submission_id("sub_not-a-ulid").is_err());
        // Crockford alphabet excludes I, L, O, U.
        assert!(validate_submission_id("sub_IIIIIIIIIIIIIIIIIIIIIIIIII").is_err());
        assert!(validate_submission_id("").is_err());
    }
}
