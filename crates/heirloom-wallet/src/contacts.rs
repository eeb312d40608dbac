//! Contact directory collaborator
//!
//! The contact book (names, identity keys, sync) lives entirely
//! outside this core. The wallet consumes it through this one narrow
//! interface, typically to label counterparties when pairing an
//! inheritance account.

/// A named counterparty identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    /// Opaque identity key string (e.g. a fingerprint or an encoded
    /// public key), owned by the external contacts subsystem.
    pub identity_key: String,
}

/// The whole surface the core needs from the contacts subsystem.
pub trait ContactDirectory: Send + Sync {
    fn list_contacts(&self) -> Vec<Contact>;
}

/// Case-insensitive name lookup over any directory.
pub fn find_contact(directory: &dyn ContactDirectory, name: &str) -> Option<Contact> {
    directory
        .list_contacts()
        .into_iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDirectory(Vec<Contact>);

    impl ContactDirectory for FixedDirectory {
        fn list_contacts(&self) -> Vec<Contact> {
            self.0.clone()
        }
    }

    #[test]
    fn test_find_contact_by_name() {
        let directory = FixedDirectory(vec![
            Contact {
                name: "Alice".into(),
                identity_key: "fp:00000001".into(),
            },
            Contact {
                name: "Bob".into(),
                identity_key: "fp:00000002".into(),
            },
        ]);

        let hit = find_contact(&directory, "alice").unwrap();
        assert_eq!(hit.identity_key, "fp:00000001");
        assert!(find_contact(&directory, "Carol").is_none());
    }
}
