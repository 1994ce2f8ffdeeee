//! External interface adapter.
//!
//! Translates the wire verb vocabulary into engine operations. Every
//! request carries a correlation id and receives exactly one response: an
//! ack, a data payload, or an error. The transport itself (sockets,
//! scripts, UI) lives outside the core; tick digests reach subscribers
//! through [`crate::engine::TickEngine::subscribe`].

use crate::engine::TickEngine;
use crate::input::{Command, RouteDirection};
use crate::resources::{PerHour, Resources};
use crate::snapshot::{self, Snapshot};
use crate::state::{Border, BonusKind, Route, RoutingMode, Tag, TreasuryLevel, UpgradeKind};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: u64,
    #[serde(flatten)]
    pub verb: Verb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Verb {
    GetTerritory { name: String },
    GetStats,
    GetGuilds,
    GetRoutes { territory: String },
    SetUpgrade { territory: String, kind: UpgradeKind, level: u8 },
    SetBonus { territory: String, kind: BonusKind, level: u8 },
    SetTax { territory: String, tax: f64, ally: f64 },
    SetBorder { territory: String, border: Border },
    SetRouting { territory: String, mode: RoutingMode },
    SetHq { territory: String },
    SetGuild { territory: String, guild: Tag },
    SetAllies { guild: Tag, allies: std::collections::BTreeSet<Tag> },
    CreateGuild { name: String, tag: Tag },
    DeleteGuild { tag: Tag },
    SetTreasuryOverride { territory: String, level: Option<TreasuryLevel> },
    SetTradingRoute { territory: String, direction: RouteDirection, route: Route },
    ModifyStorage { territory: String, current: Resources },
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
    EnableTribute { id: u64 },
    DisableTribute { id: u64 },
    DeleteTribute { id: u64 },
    LoadState { snapshot: Snapshot },
    SaveState,
    Reset,
    Halt,
    Resume,
    NextTick,
    SetTickRate { tps: f64 },
    /// Plugin hook: accepted and acknowledged, not interpreted here.
    RegisterPathfinder { name: String },
    /// Plugin hook: accepted and acknowledged, not interpreted here.
    RegisterKeybind { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Response {
    fn ack(request_id: u64) -> Self {
        Response {
            request_id,
            ok: true,
            error: None,
            data: None,
        }
    }

    fn with_data(request_id: u64, data: serde_json::Value) -> Self {
        Response {
            request_id,
            ok: true,
            error: None,
            data: Some(data),
        }
    }

    fn err(request_id: u64, message: impl std::fmt::Display) -> Self {
        Response {
            request_id,
            ok: false,
            error: Some(message.to_string()),
            data: None,
        }
    }
}

/// Execute one request against the engine, synchronously.
pub fn handle(engine: &TickEngine, request: Request) -> Response {
    let id = request.request_id;
    match request.verb {
        Verb::GetTerritory { name } => engine.with_state(|state| match state.territory(&name) {
            Some(territory) => match serde_json::to_value(territory) {
                Ok(value) => Response::with_data(id, value),
                Err(e) => Response::err(id, e),
            },
            None => Response::err(id, format!("territory not found: {}", name)),
        }),
        Verb::GetStats => match serde_json::to_value(engine.stats()) {
            Ok(value) => Response::with_data(id, value),
            Err(e) => Response::err(id, e),
        },
        Verb::GetGuilds => engine.with_state(|state| {
            let mut tags: Vec<_> = state.guilds.keys().cloned().collect();
            tags.sort();
            let guilds: Vec<_> = tags.iter().map(|t| state.guilds[t].clone()).collect();
            match serde_json::to_value(guilds) {
                Ok(value) => Response::with_data(id, value),
                Err(e) => Response::err(id, e),
            }
        }),
        Verb::GetRoutes { territory } => engine.with_state(|state| {
            match state.territory(&territory) {
                Some(t) => Response::with_data(
                    id,
                    json!({
                        "routes_to_hq": t.routes_to_hq,
                        "routes_from_hq": t.routes_from_hq,
                        "route_tax": t.route_tax,
                    }),
                ),
                None => Response::err(id, format!("territory not found: {}", territory)),
            }
        }),
        Verb::SetUpgrade { territory, kind, level } => {
            command(engine, id, Command::SetUpgrade { territory, kind, level })
        }
        Verb::SetBonus { territory, kind, level } => {
            command(engine, id, Command::SetBonus { territory, kind, level })
        }
        Verb::SetTax { territory, tax, ally } => {
            command(engine, id, Command::SetTax { territory, tax, ally })
        }
        Verb::SetBorder { territory, border } => {
            command(engine, id, Command::SetBorder { territory, border })
        }
        Verb::SetRouting { territory, mode } => {
            command(engine, id, Command::SetRoutingMode { territory, mode })
        }
        Verb::SetHq { territory } => command(engine, id, Command::SetHq { territory }),
        Verb::SetGuild { territory, guild } => {
            command(engine, id, Command::SetGuild { territory, guild })
        }
        Verb::SetAllies { guild, allies } => {
            command(engine, id, Command::SetAllies { guild, allies })
        }
        Verb::CreateGuild { name, tag } => command(engine, id, Command::CreateGuild { name, tag }),
        Verb::DeleteGuild { tag } => command(engine, id, Command::DeleteGuild { tag }),
        Verb::SetTreasuryOverride { territory, level } => {
            command(engine, id, Command::SetTreasuryOverride { territory, level })
        }
        Verb::SetTradingRoute { territory, direction, route } => command(
            engine,
            id,
            Command::SetTradingRoute { territory, direction, route },
        ),
        Verb::ModifyStorage { territory, current } => {
            command(engine, id, Command::ModifyStorage { territory, current })
        }
        Verb::CreateTribute {
            from_guild,
            to_guild,
            amount_per_hour,
            interval_minutes,
        } => command(
            engine,
            id,
            Command::CreateTribute {
                from_guild,
                to_guild,
                amount_per_hour,
                interval_minutes,
            },
        ),
        Verb::EditTribute {
            id: tribute_id,
            amount_per_hour,
            interval_minutes,
        } => command(
            engine,
            id,
            Command::EditTribute {
                id: tribute_id,
                amount_per_hour,
                interval_minutes,
            },
        ),
        Verb::EnableTribute { id: tribute_id } => command(
            engine,
            id,
            Command::SetTributeActive {
                id: tribute_id,
                active: true,
            },
        ),
        Verb::DisableTribute { id: tribute_id } => command(
            engine,
            id,
            Command::SetTributeActive {
                id: tribute_id,
                active: false,
            },
        ),
        Verb::DeleteTribute { id: tribute_id } => {
            command(engine, id, Command::DeleteTribute { id: tribute_id })
        }
        Verb::LoadState { snapshot } => {
            engine.with_state_mut(|state| match snapshot::apply(state, &snapshot) {
                Ok(()) => Response::ack(id),
                Err(e) => Response::err(id, e),
            })
        }
        Verb::SaveState => engine.with_state(|state| {
            match serde_json::to_value(snapshot::capture(state)) {
                Ok(value) => Response::with_data(id, value),
                Err(e) => Response::err(id, e),
            }
        }),
        Verb::Reset => {
            engine.reset();
            Response::ack(id)
        }
        Verb::Halt => {
            engine.halt();
            Response::ack(id)
        }
        Verb::Resume => {
            engine.resume();
            Response::ack(id)
        }
        Verb::NextTick => {
            engine.next_tick();
            Response::ack(id)
        }
        Verb::SetTickRate { tps } => {
            engine.set_tick_rate(tps);
            Response::ack(id)
        }
        Verb::RegisterPathfinder { name } => {
            log::debug!("plugin pathfinder registered: {}", name);
            Response::ack(id)
        }
        Verb::RegisterKeybind { name } => {
            log::debug!("plugin keybind registered: {}", name);
            Response::ack(id)
        }
    }
}

fn command(engine: &TickEngine, id: u64, cmd: Command) -> Response {
    match engine.execute(&cmd) {
        Ok(()) => Response::ack(id),
        Err(e) => Response::err(id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WorldStateBuilder;

    fn engine() -> TickEngine {
        let mut state = WorldStateBuilder::new()
            .with_guild("Alpha", "ALF")
            .with_territory("A", "ALF")
            .with_territory("B", "ALF")
            .with_hq("A")
            .with_link("A", "B")
            .build();
        state.halted = true;
        TickEngine::spawn(state)
    }

    #[test]
    fn test_set_and_get_round_trip() {
        let mut engine = engine();
        let response = handle(
            &engine,
            Request {
                request_id: 1,
                verb: Verb::SetUpgrade {
                    territory: "B".into(),
                    kind: UpgradeKind::Damage,
                    level: 4,
                },
            },
        );
        assert!(response.ok);

        let response = handle(
            &engine,
            Request {
                request_id: 2,
                verb: Verb::GetTerritory { name: "B".into() },
            },
        );
        assert!(response.ok);
        let data = response.data.unwrap();
        assert_eq!(data["options"]["upgrades"]["damage"], 4);
        engine.shutdown();
    }

    #[test]
    fn test_errors_carry_the_request_id() {
        let mut engine = engine();
        let response = handle(
            &engine,
            Request {
                request_id: 77,
                verb: Verb::SetUpgrade {
                    territory: "Nowhere".into(),
                    kind: UpgradeKind::Damage,
                    level: 1,
                },
            },
        );
        assert!(!response.ok);
        assert_eq!(response.request_id, 77);
        assert!(response.error.unwrap().contains("Nowhere"));
        engine.shutdown();
    }

    #[test]
    fn test_save_and_load_state() {
        let mut engine = engine();
        handle(
            &engine,
            Request {
                request_id: 1,
                verb: Verb::SetUpgrade {
                    territory: "B".into(),
                    kind: UpgradeKind::Attack,
                    level: 2,
                },
            },
        );
        let saved = handle(
            &engine,
            Request {
                request_id: 2,
                verb: Verb::SaveState,
            },
        );
        let snapshot: Snapshot = serde_json::from_value(saved.data.unwrap()).unwrap();

        handle(
            &engine,
            Request {
                request_id: 3,
                verb: Verb::SetUpgrade {
                    territory: "B".into(),
                    kind: UpgradeKind::Attack,
                    level: 0,
                },
            },
        );
        let response = handle(
            &engine,
            Request {
                request_id: 4,
                verb: Verb::LoadState { snapshot },
            },
        );
        assert!(response.ok);
        assert_eq!(
            engine.with_state(|w| w.territory("B").unwrap().options.upgrades.attack),
            2
        );
        engine.shutdown();
    }

    #[test]
    fn test_wire_shape_is_stable() {
        let request: Request = serde_json::from_str(
            r#"{"request_id": 9, "verb": "set_tick_rate", "tps": 5.0}"#,
        )
        .unwrap();
        assert!(matches!(request.verb, Verb::SetTickRate { .. }));

        let mut engine = engine();
        let response = handle(&engine, request);
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["request_id"], 9);
        assert_eq!(wire["ok"], true);
        assert!(wire.get("error").is_none());
        engine.shutdown();
    }

    #[test]
    fn test_plugin_hooks_ack() {
        let mut engine = engine();
        let response = handle(
            &engine,
            Request {
                request_id: 5,
                verb: Verb::RegisterPathfinder {
                    name: "custom".into(),
                },
            },
        );
        assert!(response.ok);
        engine.shutdown();
    }
}
