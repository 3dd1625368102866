//! Point-of-sale cart arithmetic.
//!
//! Stock is counted in pieces. A `box` line only exists for tablets and
//! takes `quantity * tablets_per_box` pieces from stock, while the price is
//! charged once per selected unit: `price_per_unit * quantity`.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    app_error::AppError,
    inventory::MedicineType,
    models::{CartItemEntity, MedicineEntity},
};

/// Largest quantity a single cart line may carry.
pub const MAX_LINE_QUANTITY: i32 = 10_000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SaleUnit {
    #[default]
    Piece,
    Box,
}

impl SaleUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleUnit::Piece => "piece",
            SaleUnit::Box => "box",
        }
    }

    /// Label with plural suffix, e.g. `2 boxes`.
    pub fn label(&self, quantity: i32) -> String {
        match (self, quantity) {
            (unit, 1) => format!("1 {}", unit.as_str()),
            (SaleUnit::Piece, n) => format!("{n} pieces"),
            (SaleUnit::Box, n) => format!("{n} boxes"),
        }
    }
}

impl fmt::Display for SaleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleUnit {
    type Err = CartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "piece" => Ok(SaleUnit::Piece),
            "box" => Ok(SaleUnit::Box),
            other => Err(CartError::UnknownUnit(other.to_string())),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum CartError {
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("{0} is not sold by the box")]
    BoxNotAllowed(String),

    #[error("Quantity of {0} is too large")]
    QuantityTooLarge(String),

    #[error("Unknown unit {0}")]
    UnknownUnit(String),

    #[error("Unknown medicine type {0}")]
    UnknownMedicineType(String),
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// One cart line: a snapshot of the medicine plus the chosen quantity and unit.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub medicine_id: Uuid,
    pub name: String,
    pub medicine_type: MedicineType,
    pub unit: SaleUnit,
    pub quantity: i32,
    pub price_per_unit: f64,
    pub tablets_per_box: Option<i32>,
    pieces: i32,
}

impl CartLine {
    pub fn new(medicine: &MedicineEntity, quantity: i32, unit: SaleUnit) -> Result<Self, CartError> {
        let medicine_type = medicine
            .medicine_type
            .parse::<MedicineType>()
            .map_err(|_| CartError::UnknownMedicineType(medicine.medicine_type.clone()))?;

        Self::build(
            medicine.id,
            medicine.name.clone(),
            medicine_type,
            unit,
            quantity,
            medicine.price_per_unit,
            medicine.tablets_per_box,
        )
    }

    fn build(
        medicine_id: Uuid,
        name: String,
        medicine_type: MedicineType,
        unit: SaleUnit,
        quantity: i32,
        price_per_unit: f64,
        tablets_per_box: Option<i32>,
    ) -> Result<Self, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity);
        }

        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityTooLarge(name));
        }

        let pieces = match unit {
            SaleUnit::Piece => Some(quantity),
            SaleUnit::Box => match tablets_per_box {
                Some(per_box) if medicine_type == MedicineType::Tablets && per_box > 0 => {
                    quantity.checked_mul(per_box)
                }
                _ => return Err(CartError::BoxNotAllowed(name)),
            },
        };
        let Some(pieces) = pieces else {
            return Err(CartError::QuantityTooLarge(name));
        };

        Ok(Self {
            medicine_id,
            name,
            medicine_type,
            unit,
            quantity,
            price_per_unit,
            tablets_per_box,
            pieces,
        })
    }

    /// Pieces taken from stock when this line is sold.
    pub fn pieces(&self) -> i32 {
        self.pieces
    }

    pub fn line_total(&self) -> f64 {
        self.price_per_unit * f64::from(self.quantity)
    }
}

impl TryFrom<&CartItemEntity> for CartLine {
    type Error = CartError;

    fn try_from(item: &CartItemEntity) -> Result<Self, Self::Error> {
        let medicine_type = item
            .medicine_type
            .parse::<MedicineType>()
            .map_err(|_| CartError::UnknownMedicineType(item.medicine_type.clone()))?;

        Self::build(
            item.medicine_id,
            item.medicine_name.clone(),
            medicine_type,
            item.unit.parse()?,
            item.quantity,
            item.price_per_unit,
            item.tablets_per_box,
        )
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn from_items(items: &[CartItemEntity]) -> Result<Self, CartError> {
        let lines = items
            .iter()
            .map(CartLine::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let cart = Self { lines };
        cart.pieces_by_medicine()?;
        Ok(cart)
    }

    /// Appends a line; the same medicine may appear on several lines.
    /// Fails when the medicine's pieces across the cart no longer fit.
    pub fn add(&mut self, line: CartLine) -> Result<(), CartError> {
        self.lines.push(line);
        if let Err(err) = self.pieces_by_medicine() {
            self.lines.pop();
            return Err(err);
        }
        Ok(())
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Pieces needed per medicine, summed across lines, in a stable order.
    pub fn pieces_by_medicine(&self) -> Result<BTreeMap<Uuid, (String, i32)>, CartError> {
        let mut needed: BTreeMap<Uuid, (String, i32)> = BTreeMap::new();
        for line in &self.lines {
            let (name, pieces) = needed
                .entry(line.medicine_id)
                .or_insert_with(|| (line.name.clone(), 0));
            *pieces = pieces
                .checked_add(line.pieces())
                .ok_or_else(|| CartError::QuantityTooLarge(line.name.clone()))?;
        }
        Ok(needed)
    }
}

/// Rounds a currency amount to cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::tests::medicine;

    fn tablets() -> MedicineEntity {
        let mut med = medicine("Panadol", MedicineType::Tablets);
        med.price_per_unit = 0.25;
        med.tablets_per_box = Some(20);
        med
    }

    #[test]
    fn adding_an_item_increments_cart_count_by_one() {
        let mut cart = Cart::default();
        let med = tablets();

        cart.add(CartLine::new(&med, 2, SaleUnit::Piece).unwrap()).unwrap();
        assert_eq!(cart.lines().len(), 1);

        cart.add(CartLine::new(&med, 1, SaleUnit::Box).unwrap()).unwrap();
        assert_eq!(cart.lines().len(), 2);
    }

    #[test]
    fn box_lines_take_pieces_but_charge_per_box() {
        let line = CartLine::new(&tablets(), 2, SaleUnit::Box).unwrap();
        assert_eq!(line.pieces(), 40);
        assert!((line.line_total() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn oversized_box_lines_are_rejected() {
        let mut med = tablets();
        med.tablets_per_box = Some(i32::MAX);
        assert_eq!(
            CartLine::new(&med, 2, SaleUnit::Box),
            Err(CartError::QuantityTooLarge("Panadol".into()))
        );
        assert_eq!(
            CartLine::new(&tablets(), 200_000_000, SaleUnit::Box),
            Err(CartError::QuantityTooLarge("Panadol".into()))
        );
    }

    #[test]
    fn adding_past_the_piece_limit_leaves_the_cart_untouched() {
        let mut med = tablets();
        med.tablets_per_box = Some(i32::MAX);
        let mut cart = Cart::default();
        cart.add(CartLine::new(&med, 1, SaleUnit::Box).unwrap()).unwrap();

        let err = cart
            .add(CartLine::new(&med, 1, SaleUnit::Box).unwrap())
            .unwrap_err();
        assert_eq!(err, CartError::QuantityTooLarge("Panadol".into()));
        assert_eq!(cart.lines().len(), 1);
        assert!(matches!(AppError::from(err), AppError::BadRequest(_)));
    }

    #[test]
    fn box_is_only_for_tablets() {
        let syrup = medicine("Cough syrup", MedicineType::Liquid);
        assert_eq!(
            CartLine::new(&syrup, 1, SaleUnit::Box),
            Err(CartError::BoxNotAllowed("Cough syrup".into()))
        );

        let mut loose = tablets();
        loose.tablets_per_box = None;
        assert!(CartLine::new(&loose, 1, SaleUnit::Box).is_err());
    }

    #[test]
    fn quantity_must_be_positive() {
        assert_eq!(
            CartLine::new(&tablets(), 0, SaleUnit::Piece),
            Err(CartError::InvalidQuantity)
        );
    }

    #[test]
    fn total_sums_every_line() {
        let mut cart = Cart::default();
        let med = tablets();
        cart.add(CartLine::new(&med, 4, SaleUnit::Piece).unwrap()).unwrap();
        cart.add(CartLine::new(&med, 1, SaleUnit::Box).unwrap()).unwrap();
        assert!((cart.total() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn pieces_are_aggregated_per_medicine() {
        let mut cart = Cart::default();
        let med = tablets();
        let other = medicine("Brufen", MedicineType::Other);
        cart.add(CartLine::new(&med, 4, SaleUnit::Piece).unwrap()).unwrap();
        cart.add(CartLine::new(&med, 1, SaleUnit::Box).unwrap()).unwrap();
        cart.add(CartLine::new(&other, 2, SaleUnit::Piece).unwrap()).unwrap();

        let needed = cart.pieces_by_medicine().unwrap();
        assert_eq!(needed.get(&med.id), Some(&("Panadol".to_string(), 24)));
        assert_eq!(needed.get(&other.id), Some(&("Brufen".to_string(), 2)));
    }

    #[test]
    fn unit_labels_pluralize() {
        assert_eq!(SaleUnit::Piece.label(1), "1 piece");
        assert_eq!(SaleUnit::Piece.label(3), "3 pieces");
        assert_eq!(SaleUnit::Box.label(2), "2 boxes");
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round_cents(10.005_1), 10.01);
        assert_eq!(round_cents(3.0), 3.0);
    }
}
