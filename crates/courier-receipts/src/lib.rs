// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery and read receipts for Courier.
//!
//! [`DeliveryTracker`] keeps the `delivered_to` and `read_by` sets of every
//! message and derives per-user unread counts from them. Group conversations
//! need the full sets because read state is per recipient.
//! [`PresenceRegistry`] tracks open conversation views for push suppression.

pub mod presence;
pub mod tracker;

pub use presence::PresenceRegistry;
pub use tracker::DeliveryTracker;
