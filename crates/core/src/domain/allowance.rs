use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Remaining feedback submissions per user id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowanceLedger(BTreeMap<String, u32>);

impl AllowanceLedger {
    /// Overwrites (never adds to) the user's quota.
    pub fn grant(&mut self, user_id: &str, amount: u32) -> Result<u32, DomainError> {
        if amount == 0 {
            return Err(DomainError::InvalidGrantAmount(amount.to_string()));
        }
        self.0.insert(user_id.to_owned(), amount);
        Ok(amount)
    }

    pub fn remaining(&self, user_id: &str) -> u32 {
        self.0.get(user_id).copied().unwrap_or(0)
    }

    /// Floors at zero and returns what is left after the attempt.
    pub fn decrement(&mut self, user_id: &str) -> u32 {
        match self.0.get_mut(user_id) {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining
            }
            None => 0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u32)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn parse_grant_amount(raw: &str) -> Result<u32, DomainError> {
    let trimmed = raw.trim();
    match trimmed.parse::<u32>() {
        Ok(amount) if amount >= 1 => Ok(amount),
        _ => Err(DomainError::InvalidGrantAmount(trimmed.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_grant_amount, AllowanceLedger};
    use crate::errors::DomainError;

    #[test]
    fn grant_overwrites_existing_quota() {
        let mut ledger = AllowanceLedger::default();
        ledger.grant("U1", 5).expect("grant");
        ledger.grant("U1", 2).expect("regrant");

        assert_eq!(ledger.remaining("U1"), 2);
    }

    #[test]
    fn grant_rejects_zero() {
        let mut ledger = AllowanceLedger::default();
        assert!(matches!(ledger.grant("U1", 0), Err(DomainError::InvalidGrantAmount(_))));
        assert!(ledger.is_empty());
    }

    #[test]
    fn unknown_users_have_no_allowance() {
        let mut ledger = AllowanceLedger::default();
        assert_eq!(ledger.remaining("nobody"), 0);
        assert_eq!(ledger.decrement("nobody"), 0);
        assert!(ledger.is_empty(), "decrementing an unknown user must not create an entry");
    }

    #[test]
    fn decrement_floors_at_zero() {
        let mut ledger = AllowanceLedger::default();
        ledger.grant("U1", 1).expect("grant");

        assert_eq!(ledger.decrement("U1"), 0);
        assert_eq!(ledger.decrement("U1"), 0);
        assert_eq!(ledger.remaining("U1"), 0);
    }

    #[test]
    fn grant_amount_parser_requires_positive_integer() {
        assert_eq!(parse_grant_amount(" 3 ").expect("amount"), 3);
        assert!(parse_grant_amount("0").is_err());
        assert!(parse_grant_amount("-2").is_err());
        assert!(parse_grant_amount("many").is_err());
    }

    #[test]
    fn ledger_serializes_as_plain_object() {
        let mut ledger = AllowanceLedger::default();
        ledger.grant("U1", 3).expect("grant");

        let json = serde_json::to_string(&ledger).expect("serialize");
        assert_eq!(json, r#"{"U1":3}"#);
    }
}
