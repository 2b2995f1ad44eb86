// Sentinel Center - Network Module
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Active network identity and automatic zone selection.

mod identity;
mod reconciler;

pub use identity::{NetworkIdentitySource, NetworkManagerSource};
pub use reconciler::{ReconcileOutcome, ReconcilerHandle, ZoneEvent, ZonePrompt, ZoneReconciler};
