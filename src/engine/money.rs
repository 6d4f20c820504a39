// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Invoice arithmetic.
//!
//! Every intermediate value is rounded half away from zero to the currency
//! minor unit before it feeds the next step: line amounts are rounded before
//! summing, the subtotal before taxing, and so on. A total recomputed in one
//! shot from raw quantities and rates can therefore differ by a cent, and
//! callers must not "correct" that.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::BillingError;
use crate::models::{ItemSpec, LineItem, Totals};

pub const MINOR_UNIT_DP: u32 = 2;

fn out_of_range() -> BillingError {
    BillingError::Validation("amount out of range".into())
}

/// Rounds to the minor unit and pads the scale, so `300` is stored as `300.00`.
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MINOR_UNIT_DP);
    rounded
}

pub fn line_amount(quantity: Decimal, rate: Decimal) -> Result<Decimal, BillingError> {
    quantity.checked_mul(rate).map(round2).ok_or_else(out_of_range)
}

/// Sum of already-rounded line amounts, re-rounded.
pub fn subtotal<'a, I>(items: I) -> Result<Decimal, BillingError>
where
    I: IntoIterator<Item = &'a LineItem>,
{
    items
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, i| acc.checked_add(i.amount))
        .map(round2)
        .ok_or_else(out_of_range)
}

pub fn tax_amount(subtotal: Decimal, tax_rate_percent: Decimal) -> Result<Decimal, BillingError> {
    subtotal
        .checked_mul(tax_rate_percent)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .map(round2)
        .ok_or_else(out_of_range)
}

pub fn total(
    subtotal: Decimal,
    tax_amount: Decimal,
    discount: Decimal,
) -> Result<Decimal, BillingError> {
    subtotal
        .checked_add(tax_amount)
        .and_then(|v| v.checked_sub(discount))
        .map(round2)
        .ok_or_else(out_of_range)
}

/// Turns item specs into priced line items, keeping their order.
pub fn price_items(items: &[ItemSpec]) -> Result<Vec<LineItem>, BillingError> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            Ok(LineItem {
                description: item.description.clone(),
                quantity: item.quantity,
                rate: item.rate,
                amount: line_amount(item.quantity, item.rate)?,
                sort_order: idx as i64,
            })
        })
        .collect()
}

pub fn compute_totals(
    items: &[LineItem],
    tax_rate: Decimal,
    discount: Decimal,
) -> Result<Totals, BillingError> {
    let subtotal = subtotal(items)?;
    let tax_amount = tax_amount(subtotal, tax_rate)?;
    let discount = round2(discount);
    Ok(Totals {
        subtotal,
        tax_rate,
        tax_amount,
        discount,
        total: total(subtotal, tax_amount, discount)?,
    })
}
