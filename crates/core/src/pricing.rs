//! Order totals.
//!
//! Totals are derived from the cart's captured line prices:
//!
//! - `subtotal` is the sum of `quantity * unit_price`
//! - `tax` is a percentage of the subtotal
//! - `shipping` is a flat fee below the free-shipping threshold
//! - `discount` is a percentage of the subtotal above the discount threshold
//! - `total = subtotal + tax + shipping - discount`
//!
//! Every amount is rounded to cents with midpoint-away-from-zero rounding.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Money;

/// Rates and thresholds used to price an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Fraction of the subtotal charged as tax (`0.08` is 8%).
    pub tax_rate: Decimal,
    /// Subtotals strictly below this pay `flat_shipping`.
    pub free_shipping_threshold: Money,
    pub flat_shipping: Money,
    /// Subtotals strictly above this receive `discount_rate`.
    pub discount_threshold: Money,
    /// Fraction of the subtotal taken off (`0.10` is 10%).
    pub discount_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(8, 2),
            free_shipping_threshold: Money::from_cents(10_000),
            flat_shipping: Money::from_cents(1_000),
            discount_threshold: Money::from_cents(20_000),
            discount_rate: Decimal::new(10, 2),
        }
    }
}

/// One priced line of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineItem {
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    #[must_use]
    pub const fn new(quantity: u32, unit_price: Money) -> Self {
        Self {
            quantity,
            unit_price,
        }
    }

    /// `quantity * unit_price`.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Monetary amounts recorded on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Price a set of lines under `policy`.
    #[must_use]
    pub fn compute(lines: &[LineItem], policy: &PricingPolicy) -> Self {
        let subtotal: Money = lines.iter().map(LineItem::line_total).sum();

        let tax = Money::round(subtotal.amount() * policy.tax_rate);
        let shipping = if subtotal < policy.free_shipping_threshold {
            policy.flat_shipping
        } else {
            Money::ZERO
        };
        let discount = if subtotal > policy.discount_threshold {
            Money::round(subtotal.amount() * policy.discount_rate)
        } else {
            Money::ZERO
        };
        let total = (subtotal + tax + shipping).saturating_sub(discount);

        Self {
            subtotal,
            tax,
            shipping,
            discount,
            total,
        }
    }

    /// Share of the order discount attributed to one line:
    /// `line_total * discount / subtotal`, rounded to cents.
    #[must_use]
    pub fn line_discount(&self, line: &LineItem) -> Money {
        if self.discount.is_zero() || self.subtotal.is_zero() {
            return Money::ZERO;
        }
        Money::round(line.line_total().amount() * self.discount.amount() / self.subtotal.amount())
    }
}
