// Sentinel Center - Models
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Data models shared by both firewall backends.

mod rule;
mod service;
mod zone;

pub use rule::{
    is_valid_port, parse_port_proto, Direction, OutboundTarget, PortOp, Protocol, Rule,
    RuleAction, RuleKey,
};
pub use service::{ServiceEntry, ServiceMode};
pub use zone::{Zone, ZoneBucket};
