// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Online/offline signal.

use tokio::sync::watch;

/// Observable connectivity state. `true` means online.
pub trait ConnectivitySignal: Send + Sync {
    /// Returns a receiver that observes every online/offline transition.
    fn subscribe(&self) -> watch::Receiver<bool>;

    /// Current connectivity.
    fn is_online(&self) -> bool {
        *self.subscribe().borrow()
    }
}
