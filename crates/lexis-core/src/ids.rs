//! Identifier newtypes
//!
//! Catalog identifiers (vocabulary, bundle, story) and participant ids are
//! externally supplied strings. Asset and rating ids are generated here and
//! never reused.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Opaque participant identifier supplied by the login gate
    ParticipantId
);

string_id!(
    /// Vocabulary entry id, unique within a round
    VocabId
);

string_id!(
    /// Bundle id, unique within a round
    BundleId
);

string_id!(
    /// Bundled story id, unique within its bundle
    StoryId
);

/// Globally unique asset identifier, assigned once at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct AssetId(Uuid);

impl AssetId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse the hyphenated string form
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Globally unique rating identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct RatingId(Uuid);

impl RatingId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_ids_display_and_compare() {
        let a = VocabId::from("va1");
        assert_eq!(a.to_string(), "va1");
        assert_eq!(a.as_str(), "va1");
        assert!(VocabId::from("va1") < VocabId::from("va2"));
    }

    #[test]
    fn test_asset_ids_are_unique() {
        let a = AssetId::generate();
        let b = AssetId::generate();
        assert_ne!(a, b);
        assert_eq!(AssetId::parse(&a.to_string()).unwrap(), a);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&ParticipantId::from("a1")).unwrap();
        assert_eq!(json, "\"a1\"");
    }
}
