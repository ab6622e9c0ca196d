use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::db;
use crate::grading::GradingPolicy;
use crate::ipc::error::HandlerError;
use crate::ipc::helpers::{db_conn, parse_actor, require_admin, respond};
use crate::ipc::types::{AppState, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetupSection {
    Grading,
    Attendance,
    Paging,
}

impl SetupSection {
    const ALL: [SetupSection; 3] = [Self::Grading, Self::Attendance, Self::Paging];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "attendance" => Some(Self::Attendance),
            "paging" => Some(Self::Paging),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Grading => "grading",
            Self::Attendance => "attendance",
            Self::Paging => "paging",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Attendance => "setup.attendance",
            Self::Paging => "setup.paging",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => {
            serde_json::to_value(GradingPolicy::default()).unwrap_or_else(|_| json!({}))
        }
        SetupSection::Attendance => json!({
            "lowAttendancePct": 75.0
        }),
        SetupSection::Paging => json!({
            "defaultPerPage": 20,
            "maxPerPage": 100
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("{} must be a number", key))?;
    if n < min || n > max {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

/// Applies `patch` field by field, then checks cross-field rules on the
/// merged result so a patch cannot leave the section inconsistent.
fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "assignmentWeight" | "midtermWeight" | "finalWeight" | "thresholdA"
                | "thresholdB" | "thresholdC" | "thresholdD" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 100.0)?));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Attendance => match k.as_str() {
                "lowAttendancePct" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 100.0)?));
                }
                _ => return Err(format!("unknown attendance field: {}", k)),
            },
            SetupSection::Paging => match k.as_str() {
                "defaultPerPage" | "maxPerPage" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 1000)?));
                }
                _ => return Err(format!("unknown paging field: {}", k)),
            },
        }
    }
    match section {
        SetupSection::Grading => {
            let policy: GradingPolicy = serde_json::from_value(Value::Object(obj.clone()))
                .map_err(|e| format!("invalid grading section: {}", e))?;
            policy.validate()?;
        }
        SetupSection::Paging => {
            let paging = paging_from_value(&Value::Object(obj.clone()));
            if paging.default_per_page > paging.max_per_page {
                return Err("defaultPerPage must be <= maxPerPage".into());
            }
        }
        SetupSection::Attendance => {}
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let defaults = default_section(section);
    let mut current = defaults.clone();
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                warn!(section = section.name(), error = %msg, "ignoring stored setup section");
                current = defaults;
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttendanceSettings {
    pub low_attendance_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingSettings {
    pub default_per_page: u32,
    pub max_per_page: u32,
}

fn paging_from_value(v: &Value) -> PagingSettings {
    let field = |k: &str, dflt: u32| {
        v.get(k)
            .and_then(|n| n.as_u64())
            .filter(|n| *n >= 1 && *n <= u32::MAX as u64)
            .map(|n| n as u32)
            .unwrap_or(dflt)
    };
    PagingSettings {
        default_per_page: field("defaultPerPage", 20),
        max_per_page: field("maxPerPage", 100),
    }
}

/// The policy every score write is computed under.
pub fn grading_policy(conn: &Connection) -> anyhow::Result<GradingPolicy> {
    let v = load_section(conn, SetupSection::Grading)?;
    Ok(serde_json::from_value(v).unwrap_or_default())
}

pub fn attendance_settings(conn: &Connection) -> anyhow::Result<AttendanceSettings> {
    let v = load_section(conn, SetupSection::Attendance)?;
    Ok(AttendanceSettings {
        low_attendance_pct: v
            .get("lowAttendancePct")
            .and_then(|n| n.as_f64())
            .unwrap_or(75.0),
    })
}

pub fn paging_settings(conn: &Connection) -> anyhow::Result<PagingSettings> {
    Ok(paging_from_value(&load_section(conn, SetupSection::Paging)?))
}

fn handle_setup_get(state: &mut AppState, _req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let mut out = Map::new();
    for section in SetupSection::ALL {
        out.insert(section.name().to_string(), load_section(conn, section)?);
    }
    Ok(Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    require_admin(&actor)?;
    let section_raw = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerError::bad_params("missing section"))?;
    let section = SetupSection::parse(section_raw)
        .ok_or_else(|| HandlerError::bad_params("unknown section"))?;
    let patch_obj = req
        .params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerError::bad_params("patch must be an object"))?;

    let mut current = load_section(conn, section)?;
    merge_section_patch(section, &mut current, patch_obj).map_err(HandlerError::BadParams)?;
    db::settings_set_json(conn, section.key(), &current).map_err(|e| HandlerError::Update {
        table: "settings",
        message: e.to_string(),
    })?;
    info!(section = section.name(), "setup section updated");
    Ok(json!({ "ok": true, "section": section.name(), "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
