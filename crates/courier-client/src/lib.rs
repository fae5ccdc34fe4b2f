// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device-side entry point for Courier.
//!
//! [`CourierClient`] composes the durable outbox, the retry scheduler, the
//! write batcher, receipt tracking and presence into the handful of calls a
//! chat UI makes: send a message, receive one, open and close a
//! conversation, go to the background, and report connectivity.

pub mod client;
pub mod network;

pub use client::{ClientDeps, CourierClient};
pub use network::NetworkMonitor;

/// Register metric descriptions for every device-side component.
pub fn register_metrics() {
    courier_outbox::register_metrics();
    courier_batcher::register_metrics();
}
