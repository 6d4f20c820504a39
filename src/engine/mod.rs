// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod cadence;
pub mod delivery;
pub mod invoices;
pub mod mailer;
pub mod money;
pub mod numbering;
pub mod payments;
pub mod recurring;
pub mod reminders;
pub mod schedule;
pub mod status;
pub mod store;
pub mod templates;
