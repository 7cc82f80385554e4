//! Cart lines and the aggregate cart state.

use std::collections::HashSet;

use rust_decimal::Decimal;
use takeout_core::{FoodId, Price, Quantity};

use super::CartError;

/// One line in the cart: a distinct item and how many of it.
///
/// Fields are private so the subtotal can only ever be
/// `unit_price * quantity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    item_id: FoodId,
    name: String,
    unit_price: Price,
    quantity: Quantity,
    subtotal: Price,
}

impl CartLine {
    /// Build a line, rejecting a subtotal too large to represent.
    pub(crate) fn new(
        item_id: FoodId,
        name: String,
        unit_price: Price,
        quantity: Quantity,
    ) -> Result<Self, CartError> {
        let subtotal = unit_price.checked_times(quantity).ok_or_else(|| {
            CartError::InvalidArgument(format!(
                "subtotal for {item_id} ({quantity} at {unit_price}) is too large"
            ))
        })?;
        Ok(Self {
            item_id,
            name,
            unit_price,
            quantity,
            subtotal,
        })
    }

    /// Copy of this line with a different quantity.
    pub(crate) fn with_quantity(&self, quantity: Quantity) -> Result<Self, CartError> {
        Self::new(self.item_id.clone(), self.name.clone(), self.unit_price, quantity)
    }

    /// Identity of the purchasable item.
    #[must_use]
    pub const fn item_id(&self) -> &FoodId {
        &self.item_id
    }

    /// Display name captured when the item was added.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit price captured when the item was added.
    #[must_use]
    pub const fn unit_price(&self) -> Price {
        self.unit_price
    }

    #[must_use]
    pub const fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub const fn subtotal(&self) -> Price {
        self.subtotal
    }

    fn is_consistent(&self) -> bool {
        self.unit_price.checked_times(self.quantity) == Some(self.subtotal)
    }
}

/// Unvalidated line data, as it arrives from a remote cart or a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineInput {
    pub item_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i64,
}

impl CartLineInput {
    /// Validate into a [`CartLine`].
    pub(crate) fn validate(&self) -> Result<CartLine, CartError> {
        let item_id = FoodId::parse(&self.item_id)?;
        let name = validate_name(&self.name)?;
        let unit_price = Price::new(self.unit_price)?;
        let quantity = Quantity::try_from(self.quantity)?;
        CartLine::new(item_id, name, unit_price, quantity)
    }
}

impl From<&CartLine> for CartLineInput {
    fn from(line: &CartLine) -> Self {
        Self {
            item_id: line.item_id.to_string(),
            name: line.name.clone(),
            unit_price: line.unit_price.amount(),
            quantity: i64::from(line.quantity.get()),
        }
    }
}

/// Trim a display name and reject it if nothing is left.
pub(crate) fn validate_name(name: &str) -> Result<String, CartError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CartError::InvalidArgument(
            "item name cannot be empty".to_string(),
        ));
    }
    Ok(trimmed.to_owned())
}

/// The whole cart at one point in time.
///
/// Immutable once built: the store replaces it wholesale on every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartState {
    lines: Vec<CartLine>,
    total: Price,
    delivery_address: Option<String>,
}

impl CartState {
    /// An empty cart with no delivery address.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a state, deriving the total from the lines.
    ///
    /// Callers guarantee that item IDs are unique.
    pub(crate) fn from_parts(
        lines: Vec<CartLine>,
        delivery_address: Option<String>,
    ) -> Result<Self, CartError> {
        let total = Price::checked_sum(lines.iter().map(CartLine::subtotal))
            .ok_or_else(|| CartError::InvalidArgument("cart total is too large".to_string()))?;
        Ok(Self {
            lines,
            total,
            delivery_address,
        })
    }

    /// Same lines and total with a different delivery address.
    pub(crate) fn with_delivery_address(&self, delivery_address: Option<String>) -> Self {
        Self {
            lines: self.lines.clone(),
            total: self.total,
            delivery_address,
        }
    }

    /// Lines in the order they were first added.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Look up the line for an item.
    #[must_use]
    pub fn line(&self, item_id: &FoodId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.item_id == item_id)
    }

    /// Sum of all line subtotals.
    #[must_use]
    pub const fn total(&self) -> Price {
        self.total
    }

    #[must_use]
    pub fn delivery_address(&self) -> Option<&str> {
        self.delivery_address.as_deref()
    }

    /// Total number of units across all lines (the cart badge count).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity.get()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Check every derived value and the uniqueness of item IDs.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        let unique = self.lines.iter().all(|line| seen.insert(&line.item_id));
        let sum = Price::checked_sum(self.lines.iter().map(CartLine::subtotal));

        unique && self.lines.iter().all(CartLine::is_consistent) && sum == Some(self.total)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::dec;

    use super::*;

    fn line(id: &str, price: Decimal, quantity: i64) -> CartLine {
        CartLineInput {
            item_id: id.to_string(),
            name: format!("Item {id}"),
            unit_price: price,
            quantity,
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_subtotal_is_derived() {
        let line = line("p1", dec!(2.50), 4);
        assert_eq!(line.subtotal().amount(), dec!(10));
    }

    #[test]
    fn test_with_quantity_recomputes_subtotal() {
        let line = line("p1", dec!(3), 1)
            .with_quantity(Quantity::try_from(5_i64).unwrap())
            .unwrap();
        assert_eq!(line.subtotal().amount(), dec!(15));
    }

    #[test]
    fn test_total_is_sum_of_subtotals() {
        let state = CartState::from_parts(
            vec![line("p1", dec!(10), 2), line("p2", dec!(5), 1)],
            None,
        )
        .unwrap();
        assert_eq!(state.total().amount(), dec!(25));
        assert_eq!(state.item_count(), 3);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_duplicate_ids_are_inconsistent() {
        let state = CartState::from_parts(
            vec![line("p1", dec!(10), 1), line("p1", dec!(10), 1)],
            None,
        )
        .unwrap();
        assert!(!state.is_consistent());
    }

    #[test]
    fn test_oversized_amounts_are_rejected() {
        let max = line("p1", Decimal::MAX, 1);
        assert!(matches!(
            max.with_quantity(Quantity::try_from(2_i64).unwrap()),
            Err(CartError::InvalidArgument(_))
        ));

        let input = CartLineInput {
            item_id: "p1".to_string(),
            name: "Gold".to_string(),
            unit_price: Decimal::MAX,
            quantity: 3,
        };
        assert!(matches!(input.validate(), Err(CartError::InvalidArgument(_))));

        let result = CartState::from_parts(vec![max, line("p2", Decimal::MAX, 1)], None);
        assert!(matches!(result, Err(CartError::InvalidArgument(_))));
    }

    #[test]
    fn test_input_validation() {
        let valid = CartLineInput {
            item_id: "p1".to_string(),
            name: " Pizza ".to_string(),
            unit_price: dec!(9.99),
            quantity: 1,
        };
        assert_eq!(valid.validate().unwrap().name(), "Pizza");

        let mut bad = valid.clone();
        bad.item_id = String::new();
        assert!(matches!(bad.validate(), Err(CartError::InvalidArgument(_))));

        let mut bad = valid.clone();
        bad.name = "  ".to_string();
        assert!(matches!(bad.validate(), Err(CartError::InvalidArgument(_))));

        let mut bad = valid.clone();
        bad.unit_price = dec!(-1);
        assert!(matches!(bad.validate(), Err(CartError::InvalidArgument(_))));

        let mut bad = valid;
        bad.quantity = 0;
        assert!(matches!(bad.validate(), Err(CartError::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_state() {
        let state = CartState::empty();
        assert!(state.is_empty());
        assert!(state.total().is_zero());
        assert_eq!(state.delivery_address(), None);
        assert!(state.is_consistent());
    }
}
