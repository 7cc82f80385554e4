//! Line-item quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// Zero or negative quantity.
    #[error("quantity must be at least 1 (got {0})")]
    NotPositive(i64),
    /// Larger than a line can hold.
    #[error("quantity must be at most {max} (got {got})")]
    TooLarge {
        /// Maximum allowed quantity.
        max: u32,
        /// Requested quantity.
        got: i64,
    },
}

/// A positive item count (always `>= 1`).
///
/// ```
/// use takeout_core::Quantity;
///
/// assert_eq!(Quantity::try_from(3_i64).unwrap().get(), 3);
/// assert!(Quantity::try_from(0_i64).is_err());
/// assert!(Quantity::try_from(-2_i64).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// A single item.
    pub const ONE: Self = Self(1);

    /// Upper bound for one line, far beyond any real order.
    pub const MAX: u32 = 9_999;

    /// Returns the count.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the quantity increased by one, or `None` at [`Self::MAX`].
    #[must_use]
    pub const fn incremented(self) -> Option<Self> {
        if self.0 >= Self::MAX {
            None
        } else {
            Some(Self(self.0 + 1))
        }
    }

    /// Adds two quantities, or `None` if the sum exceeds [`Self::MAX`].
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        let sum = self.0 + other.0;
        if sum > Self::MAX { None } else { Some(Self(sum)) }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 {
            return Err(QuantityError::NotPositive(value));
        }
        match u32::try_from(value) {
            Ok(count) if count <= Self::MAX => Ok(Self(count)),
            _ => Err(QuantityError::TooLarge {
                max: Self::MAX,
                got: value,
            }),
        }
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_and_negative() {
        assert_eq!(Quantity::try_from(0_i64), Err(QuantityError::NotPositive(0)));
        assert_eq!(
            Quantity::try_from(-5_i64),
            Err(QuantityError::NotPositive(-5))
        );
    }

    #[test]
    fn test_rejects_above_max() {
        assert!(matches!(
            Quantity::try_from(10_000_i64),
            Err(QuantityError::TooLarge { .. })
        ));
        assert!(Quantity::try_from(i64::MAX).is_err());
    }

    #[test]
    fn test_incremented_stops_at_max() {
        let max = Quantity::try_from(i64::from(Quantity::MAX)).unwrap();
        assert_eq!(max.incremented(), None);
        assert_eq!(Quantity::ONE.incremented().unwrap().get(), 2);
    }

    #[test]
    fn test_checked_add() {
        let two = Quantity::try_from(2_i64).unwrap();
        assert_eq!(two.checked_add(two).unwrap().get(), 4);
    }

    #[test]
    fn test_deserialize_validates() {
        let q: Quantity = serde_json::from_str("3").unwrap();
        assert_eq!(q.get(), 3);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert!(serde_json::from_str::<Quantity>("-1").is_err());
    }
}
