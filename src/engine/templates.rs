// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::engine::store;
use crate::errors::BillingError;
use crate::models::{Frequency, ItemSpec, RecurringTemplate};

#[derive(Debug, Clone)]
pub struct TemplateRequest {
    pub owner_id: String,
    pub client_id: i64,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub invoice_number_prefix: String,
    pub payment_terms: i64,
    pub tax_rate: Decimal,
    pub currency: String,
    pub notes: Option<String>,
    pub items: Vec<ItemSpec>,
}

pub fn validate_items(items: &[ItemSpec]) -> Result<(), BillingError> {
    if items.is_empty() {
        return Err(BillingError::Validation("at least one line item is required".into()));
    }
    for (idx, item) in items.iter().enumerate() {
        if item.description.trim().is_empty() {
            return Err(BillingError::Validation(format!(
                "item {} has an empty description",
                idx + 1
            )));
        }
        if item.quantity.is_sign_negative() || item.rate.is_sign_negative() {
            return Err(BillingError::Validation(format!(
                "item '{}' has a negative quantity or rate",
                item.description
            )));
        }
    }
    Ok(())
}

pub fn validate_tax_rate(tax_rate: Decimal) -> Result<(), BillingError> {
    if tax_rate.is_sign_negative() || tax_rate > Decimal::ONE_HUNDRED {
        return Err(BillingError::Validation(format!(
            "tax rate {} must be between 0 and 100",
            tax_rate
        )));
    }
    Ok(())
}

/// Validates and stores a new template. The first cycle is due on the
/// start date.
pub fn create_template(
    conn: &Connection,
    req: TemplateRequest,
) -> Result<RecurringTemplate, BillingError> {
    validate_items(&req.items)?;
    validate_tax_rate(req.tax_rate)?;
    if req.payment_terms < 0 {
        return Err(BillingError::Validation("payment terms cannot be negative".into()));
    }
    if req.invoice_number_prefix.trim().is_empty() {
        return Err(BillingError::Validation("invoice number prefix is required".into()));
    }
    if let Some(end) = req.end_date {
        if end < req.start_date {
            return Err(BillingError::Validation(format!(
                "end date {} is before start date {}",
                end, req.start_date
            )));
        }
    }
    store::get_client(conn, &req.owner_id, req.client_id)?
        .ok_or_else(|| BillingError::NotFound(format!("client {}", req.client_id)))?;

    let mut template = RecurringTemplate {
        id: 0,
        owner_id: req.owner_id,
        client_id: req.client_id,
        frequency: req.frequency,
        start_date: req.start_date,
        end_date: req.end_date,
        next_generation_date: req.start_date,
        is_active: true,
        invoice_number_prefix: req.invoice_number_prefix.trim().to_string(),
        payment_terms: req.payment_terms,
        tax_rate: req.tax_rate,
        currency: req.currency.trim().to_uppercase(),
        notes: req.notes,
        items: req.items,
    };
    template.id = store::insert_template(conn, &template)?;
    Ok(template)
}

pub fn set_active(
    conn: &Connection,
    template_id: i64,
    owner_id: &str,
    active: bool,
) -> Result<(), BillingError> {
    if store::set_template_active(conn, template_id, owner_id, active)? {
        Ok(())
    } else {
        Err(BillingError::NotFound(format!("recurring template {}", template_id)))
    }
}

pub fn delete(conn: &Connection, template_id: i64, owner_id: &str) -> Result<(), BillingError> {
    if store::delete_template(conn, template_id, owner_id)? {
        Ok(())
    } else {
        Err(BillingError::NotFound(format!("recurring template {}", template_id)))
    }
}
