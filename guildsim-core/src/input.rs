//! Front-door mutation commands.
//!
//! Every external mutation (UI verbs, script calls, the optimizer) goes
//! through [`Command`] and `execute_command`, so all writers share one
//! validation and route-invalidation path.

use crate::resources::{PerHour, Resources};
use crate::state::{
    Border, BonusKind, Route, RoutingMode, Tag, TerritoryOptions, TreasuryLevel, UpgradeKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which of a territory's two route lists a pin applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDirection {
    ToHq,
    FromHq,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    SetGuild {
        territory: String,
        guild: Tag,
    },
    SetOptions {
        territory: String,
        options: TerritoryOptions,
    },
    SetUpgrade {
        territory: String,
        kind: UpgradeKind,
        level: u8,
    },
    SetBonus {
        territory: String,
        kind: BonusKind,
        level: u8,
    },
    SetTax {
        territory: String,
        tax: f64,
        ally: f64,
    },
    SetBorder {
        territory: String,
        border: Border,
    },
    SetRoutingMode {
        territory: String,
        mode: RoutingMode,
    },
    SetHq {
        territory: String,
    },
    SetTreasuryOverride {
        territory: String,
        level: Option<TreasuryLevel>,
    },
    ModifyStorage {
        territory: String,
        current: Resources,
    },
    SetTradingRoute {
        territory: String,
        direction: RouteDirection,
        route: Route,
    },
    SetAllies {
        guild: Tag,
        allies: BTreeSet<Tag>,
    },
    CreateGuild {
        name: String,
        tag: Tag,
    },
    DeleteGuild {
        tag: Tag,
    },
    CreateTribute {
        from_guild: Option<Tag>,
        to_guild: Option<Tag>,
        amount_per_hour: PerHour,
        interval_minutes: u64,
    },
    EditTribute {
        id: u64,
        amount_per_hour: Option<PerHour>,
        interval_minutes: Option<u64>,
    },
    SetTributeActive {
        id: u64,
        active: bool,
    },
    DeleteTribute {
        id: u64,
    },
}
