// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{Days, Months, NaiveDate};

use crate::errors::BillingError;
use crate::models::Frequency;

/// Next anchor date after `anchor` for the given frequency.
///
/// Month-based steps clamp to the last day of the target month, so
/// Jan 31 + monthly is Feb 28 (or 29), and Feb 29 + yearly is Feb 28.
pub fn next_date(anchor: NaiveDate, frequency: Frequency) -> Result<NaiveDate, BillingError> {
    let next = match frequency {
        Frequency::Weekly => anchor.checked_add_days(Days::new(7)),
        Frequency::Monthly => anchor.checked_add_months(Months::new(1)),
        Frequency::Quarterly => anchor.checked_add_months(Months::new(3)),
        Frequency::Yearly => anchor.checked_add_months(Months::new(12)),
    };
    next.ok_or_else(|| {
        BillingError::Validation(format!(
            "cannot advance {} by one {} cycle",
            anchor, frequency
        ))
    })
}
