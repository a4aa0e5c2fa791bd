//! Client identity records.
//!
//! An account is just a UUID string; equality compares the string. The
//! dispatch layer uses accounts for bookkeeping — authentication itself
//! happens in the handshake via constant-time UUID comparison.

use uuid::Uuid;

use crate::error::{Error, Result};

/// In-memory representation of a Reflex client account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: String,
}

impl Account {
    /// Create an account, validating that the id parses as a UUID.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Uuid::parse_str(&id)
            .map_err(|_| Error::config(format!("invalid client id: {id:?}")))?;
        Ok(Self { id })
    }

    /// The UUID string as configured.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The parsed UUID.
    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).expect("validated at construction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_equality() {
        let a = Account::new("b831381d-6324-4d53-ad4f-8cda48b30811").unwrap();
        let b = Account::new("b831381d-6324-4d53-ad4f-8cda48b30811").unwrap();
        let c = Account::new("f9a1c030-92f7-4b4c-aaa4-b51e6da41f0f").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_invalid_id_rejected() {
        assert!(Account::new("not-a-uuid").is_err());
        assert!(Account::new("").is_err());
    }

    #[test]
    fn test_uuid_accessor() {
        let account = Account::new("b831381d-6324-4d53-ad4f-8cda48b30811").unwrap();
        assert_eq!(
            account.uuid(),
            Uuid::parse_str("b831381d-6324-4d53-ad4f-8cda48b30811").unwrap()
        );
    }
}
