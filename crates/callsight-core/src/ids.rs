//! Branded ID newtypes for type safety.
//!
//! Every identity flowing through the pipeline has a distinct newtype
//! around `String`, so a worker id can never be passed where a client id
//! is expected. Client ids arrive from the transport; worker ids are
//! generated locally as UUID v7 (time-ordered).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of one client session, as supplied by the transport.
    ///
    /// After sink collision resolution this may carry a `_1`, `_2`, …
    /// suffix distinguishing reconnects of the same upstream client.
    ClientId
}

branded_id! {
    /// Identifier of one peer connection within a session (`PC_0`, `PC_1`, …).
    PeerConnectionId
}

branded_id! {
    /// Identifier of one execution unit in the extraction pool.
    WorkerId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_from_str_round_trips() {
        let id = ClientId::from("abc-123");
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(String::from(id), "abc-123");
    }

    #[test]
    fn worker_id_new_is_unique() {
        let a = WorkerId::new();
        let b = WorkerId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_matches_inner() {
        let id = PeerConnectionId::from("PC_0");
        assert_eq!(id.to_string(), "PC_0");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ClientId::from("abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");
        let back: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn deref_to_str() {
        let id = ClientId::from("abc");
        assert!(id.starts_with("ab"));
    }
}
