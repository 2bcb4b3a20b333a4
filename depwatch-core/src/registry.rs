//! Address registry: the fixed set of user deposit addresses a watcher
//! attributes transfers to.

use std::collections::{HashMap, HashSet};

use depwatch_sdk::objects::{Address, UserId, Wallet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two distinct users share one normalized address.
    #[error("address {address} is claimed by both {first} and {second}")]
    DuplicateAddress {
        address: Address,
        first: UserId,
        second: UserId,
    },
}

/// Immutable bidirectional user/address index.
///
/// Built once before a watcher starts; there is no mutation API.
#[derive(Debug, Clone, Default)]
pub struct AddressRegistry {
    by_address: HashMap<Address, UserId>,
    by_user: HashMap<UserId, Vec<Address>>,
}

impl AddressRegistry {
    /// Build the registry from `(user, raw address)` pairs.
    ///
    /// A user may own several addresses and may list the same address more
    /// than once. Two different users on the same address is an error.
    pub fn new<I, U, A>(entries: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (U, A)>,
        U: Into<UserId>,
        A: AsRef<str>,
    {
        let mut registry = Self::default();
        for (user, raw) in entries {
            let user = user.into();
            let address = Self::normalize(raw.as_ref());
            match registry.by_address.get(&address) {
                Some(existing) if *existing == user => continue,
                Some(existing) => {
                    return Err(RegistryError::DuplicateAddress {
                        address,
                        first: existing.clone(),
                        second: user,
                    });
                }
                None => {}
            }
            registry
                .by_user
                .entry(user.clone())
                .or_default()
                .push(address.clone());
            registry.by_address.insert(address, user);
        }
        Ok(registry)
    }

    pub fn from_wallets(wallets: &[Wallet]) -> Result<Self, RegistryError> {
        Self::new(
            wallets
                .iter()
                .map(|w| (w.user_id.clone(), w.address.as_str().to_owned())),
        )
    }

    pub fn normalize(address: &str) -> Address {
        Address::normalize(address)
    }

    pub fn resolve_user(&self, address: &Address) -> Option<&UserId> {
        self.by_address.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.by_address.contains_key(address)
    }

    pub fn addresses(&self) -> HashSet<&Address> {
        self.by_address.keys().collect()
    }

    pub fn addresses_of(&self, user: &UserId) -> &[Address] {
        self.by_user.get(user).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depwatch_sdk::objects::PrivateKey;

    #[test]
    fn test_duplicate_address_differing_case_is_rejected() {
        let err = AddressRegistry::new([("user1", "0xABC"), ("user2", "0xabc")]).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateAddress { ref address, .. } if address.as_str() == "0xabc"
        ));
    }

    #[test]
    fn test_same_user_repeated_address_is_accepted() {
        let registry = AddressRegistry::new([(1i64, "0xAbC"), (1i64, "0xabc ")]).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.addresses_of(&UserId::Int(1)).len(), 1);
    }

    #[test]
    fn test_resolve_user_uses_normalized_form() {
        let registry = AddressRegistry::new([("alice", "0xAAaa"), ("bob", "0xBBbb")]).unwrap();
        let lookup = AddressRegistry::normalize(" 0XAAAA");
        assert_eq!(registry.resolve_user(&lookup), Some(&UserId::from("alice")));
        assert!(registry.contains(&Address::normalize("0xbbBB")));
        assert!(!registry.contains(&Address::normalize("0xcccc")));
        assert_eq!(registry.addresses().len(), 2);
    }

    #[test]
    fn test_from_wallets() {
        let wallets = vec![
            Wallet {
                user_id: UserId::Int(7),
                address: Address::normalize("0x00000000000000000000000000000000000000AA"),
                private_key: PrivateKey::new("00"),
            },
            Wallet {
                user_id: UserId::Int(8),
                address: Address::normalize("0x00000000000000000000000000000000000000bb"),
                private_key: PrivateKey::new("01"),
            },
        ];
        let registry = AddressRegistry::from_wallets(&wallets).unwrap();
        assert_eq!(
            registry.resolve_user(&Address::normalize(
                "0x00000000000000000000000000000000000000aa"
            )),
            Some(&UserId::Int(7))
        );
    }
}
