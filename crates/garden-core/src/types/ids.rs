use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Characters used for generated player ids. Omits `0`, `O`, `I`, `l` and
/// `o` so ids can be read back without ambiguity.
pub const PLAYER_ID_ALPHABET: &[u8] =
    b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Prefix of every generated player id.
pub const PLAYER_ID_PREFIX: &str = "p_";

/// Number of random characters after [`PLAYER_ID_PREFIX`].
pub const PLAYER_ID_RANDOM_LEN: usize = 16;

/// Prefix of the public room pool (`MG1`, `MG2`, ...).
pub const MAIN_ROOM_PREFIX: &str = "MG";

/// Macro to define a string-backed identifier newtype.
///
/// The server picks the format of these identifiers, so they are kept as the
/// exact text received and serialize transparently.
macro_rules! define_id_type {
    ($name:ident) => {
        #[doc = concat!(stringify!($name), ": a string identifier assigned by the server or client.")]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an ID from any string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the ID text.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID, returning its text.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self::new(s))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_id_type!(PlayerId);
define_id_type!(RoomId);

impl PlayerId {
    /// Generate a fresh client-side player id: `p_` followed by 16 characters
    /// from [`PLAYER_ID_ALPHABET`].
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..PLAYER_ID_RANDOM_LEN)
            .map(|_| PLAYER_ID_ALPHABET[rng.gen_range(0..PLAYER_ID_ALPHABET.len())] as char)
            .collect();
        Self(format!("{PLAYER_ID_PREFIX}{suffix}"))
    }
}

impl RoomId {
    /// The `n`th room of the public pool.
    pub fn main(n: u32) -> Self {
        Self(format!("{MAIN_ROOM_PREFIX}{n}"))
    }

    /// The public pool `MG1..=MGcount`, in order.
    pub fn main_pool(count: u32) -> Vec<Self> {
        (1..=count).map(Self::main).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_player_id_format() {
        let id = PlayerId::generate();
        assert!(id.starts_with(PLAYER_ID_PREFIX));
        let suffix = &id[PLAYER_ID_PREFIX.len()..];
        assert_eq!(suffix.len(), PLAYER_ID_RANDOM_LEN);
        assert!(suffix.bytes().all(|b| PLAYER_ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(PlayerId::generate(), PlayerId::generate());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = PlayerId::new("p_abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p_abc\"");
        let back: PlayerId = serde_json::from_str("\"p_abc\"").unwrap();
        assert_eq!(back, id);
        assert!(back == "p_abc");
    }

    #[test]
    fn main_pool_order() {
        let pool = RoomId::main_pool(15);
        assert_eq!(pool.len(), 15);
        assert_eq!(pool[0], "MG1");
        assert_eq!(pool[14].to_string(), "MG15");
    }
}
