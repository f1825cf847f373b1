//! Strongly-typed wrappers for runtime concepts
//!
//! Trigger keys, ability names and command names are all strings on the
//! wire. Wrapping them keeps a trigger key from being passed where a
//! command name is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                $name(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_newtype!(
    /// Name of a trigger event (e.g. "damaged", "turn_ended")
    TriggerKey
);

string_newtype!(
    /// Catalogue name of an ability (e.g. "Armor")
    AbilityName
);

string_newtype!(
    /// Catalogue name of a command (e.g. "attack")
    CommandName
);
