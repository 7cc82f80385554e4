//! Newtype IDs for type-safe entity references.
//!
//! Backend rows are keyed by opaque strings (UUIDs in practice, but nothing
//! here depends on that). Use the `define_id!` macro to create wrappers that
//! prevent accidentally mixing IDs from different tables.

/// Errors that can occur when parsing an entity ID.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input is empty or whitespace only.
    #[error("{kind} cannot be empty")]
    Empty {
        /// Name of the ID type that rejected the input.
        kind: &'static str,
    },
}

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` as a bare string, rejecting empty input
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `parse()`, `as_str()`, `into_inner()`
/// - `Display`, `FromStr`, `AsRef<str>`, and `TryFrom<String>`
///
/// # Example
///
/// ```rust
/// # use takeout_core::define_id;
/// define_id!(UserId);
/// define_id!(OrderId);
///
/// let user_id = UserId::parse("8a6e0804").unwrap();
/// let order_id = OrderId::parse("8a6e0804").unwrap();
///
/// // These are different types, so this won't compile:
/// // let _: UserId = order_id;
/// assert!(UserId::parse("   ").is_err());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse an ID, trimming surrounding whitespace.
            ///
            /// # Errors
            ///
            /// Returns [`IdError::Empty`](crate::IdError::Empty) if nothing is
            /// left after trimming.
            pub fn parse(id: &str) -> ::core::result::Result<Self, $crate::IdError> {
                let trimmed = id.trim();
                if trimmed.is_empty() {
                    return Err($crate::IdError::Empty {
                        kind: stringify!($name),
                    });
                }
                Ok(Self(trimmed.to_owned()))
            }

            /// Returns the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the ID and returns the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl ::core::convert::TryFrom<String> for $name {
            type Error = $crate::IdError;

            fn try_from(id: String) -> ::core::result::Result<Self, Self::Error> {
                Self::parse(&id)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Identifiers for the backend tables
define_id!(UserId);
define_id!(FoodId);
define_id!(RestaurantId);
define_id!(MenuItemId);
define_id!(OrderId);
define_id!(CartRowId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let id = FoodId::parse("  p1 \n").unwrap();
        assert_eq!(id.as_str(), "p1");
    }

    #[test]
    fn test_parse_empty_is_rejected() {
        assert_eq!(
            FoodId::parse(""),
            Err(IdError::Empty { kind: "FoodId" })
        );
        assert!(UserId::parse("\t ").is_err());
    }

    #[test]
    fn test_empty_error_names_the_type() {
        let err = RestaurantId::parse("").unwrap_err();
        assert_eq!(err.to_string(), "RestaurantId cannot be empty");
    }

    #[test]
    fn test_serde_is_a_bare_string() {
        let id = OrderId::parse("ord-42").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ord-42\"");

        let parsed: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        let result: Result<CartRowId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }
}
