use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::actor::{ActorContext, ActorError, Role};
use crate::grading::{is_acceptable_score, MAX_SCORE_MAGNITUDE};
use crate::ipc::error::{ok, HandlerError};
use crate::ipc::handlers::setup::PagingSettings;
use crate::ipc::types::{AppState, Request};
use crate::models::{Term, TermName};
use crate::records::Page;

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerError> {
    state.db.as_ref().ok_or(HandlerError::NoWorkspace)
}

/// Wraps a handler result in the response envelope.
pub fn respond(req: &Request, result: Result<Value, HandlerError>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            warn!(method = %req.method, id = %req.id, code = e.code(), error = %e, "request failed");
            e.response(&req.id)
        }
    }
}

pub fn to_json<T: Serialize>(v: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(v).map_err(|e| HandlerError::Storage(e.into()))
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerError::bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        Some(_) => Err(HandlerError::bad_params(format!(
            "{} must be string or null",
            key
        ))),
    }
}

/// Absent keeps the stored value, `null` clears it, a number replaces it.
pub fn score_patch(params: &Value, key: &str) -> Result<Option<Option<f64>>, HandlerError> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(v) => {
            let n = v
                .as_f64()
                .ok_or_else(|| HandlerError::bad_params(format!("{} must be a number or null", key)))?;
            if !is_acceptable_score(n) {
                return Err(HandlerError::bad_params(format!(
                    "{} must be within -{max}..={max}",
                    key,
                    max = MAX_SCORE_MAGNITUDE
                )));
            }
            Ok(Some(Some(n)))
        }
    }
}

pub fn parse_term_name(v: &Value) -> Option<TermName> {
    match v {
        Value::String(s) => TermName::parse(s),
        Value::Number(n) => n
            .as_u64()
            .filter(|n| *n > 0 && *n <= u32::MAX as u64)
            .map(|n| TermName::Semester(n as u32)),
        _ => None,
    }
}

pub fn optional_term_name(params: &Value, key: &str) -> Result<Option<TermName>, HandlerError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_term_name(v).map(Some).ok_or_else(|| {
            HandlerError::bad_params(format!(
                "{} must be 'odd', 'even' or a positive semester number",
                key
            ))
        }),
    }
}

pub fn required_term(params: &Value) -> Result<Term, HandlerError> {
    let academic_year = required_str(params, "academicYear")?;
    let term_name = optional_term_name(params, "termName")?
        .ok_or_else(|| HandlerError::bad_params("missing termName"))?;
    Ok(Term::new(academic_year, term_name))
}

pub fn optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerError> {
    let Some(raw) = optional_str(params, key)? else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| HandlerError::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerError> {
    optional_date(params, key)?.ok_or_else(|| HandlerError::bad_params(format!("missing {}", key)))
}

pub fn parse_actor(params: &Value) -> Result<ActorContext, HandlerError> {
    let Some(actor) = params.get("actor").filter(|v| v.is_object()) else {
        return Err(ActorError::Missing.into());
    };
    let role_raw = actor.get("role").and_then(|v| v.as_str()).unwrap_or("");
    let role = Role::parse(role_raw).ok_or_else(|| ActorError::UnknownRole(role_raw.to_string()))?;
    let profile_id = actor
        .get("profileId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    Ok(ActorContext::new(role, profile_id)?)
}

pub fn require_admin(actor: &ActorContext) -> Result<(), HandlerError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(HandlerError::forbidden("admin role required"))
    }
}

pub fn parse_page(params: &Value, paging: &PagingSettings) -> Result<Page, HandlerError> {
    let page = match params.get("page") {
        None | Some(Value::Null) => 1,
        Some(v) => v
            .as_u64()
            .filter(|n| *n >= 1 && *n <= u32::MAX as u64)
            .ok_or_else(|| HandlerError::bad_params("page must be a positive integer"))?
            as u32,
    };
    let per_page = match params.get("perPage") {
        None | Some(Value::Null) => paging.default_per_page,
        Some(v) => {
            let n = v
                .as_u64()
                .filter(|n| *n >= 1)
                .ok_or_else(|| HandlerError::bad_params("perPage must be a positive integer"))?;
            n.min(paging.max_per_page as u64) as u32
        }
    };
    Ok(Page { page, per_page })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn score_patch_distinguishes_absent_null_and_value() {
        let p = json!({ "a": null, "b": 72.5, "c": "x" });
        assert_eq!(score_patch(&p, "missing").expect("absent"), None);
        assert_eq!(score_patch(&p, "a").expect("null"), Some(None));
        assert_eq!(score_patch(&p, "b").expect("value"), Some(Some(72.5)));
        assert!(score_patch(&p, "c").is_err());
    }

    #[test]
    fn score_patch_rejects_magnitudes_that_overflow_the_final() {
        let p = json!({ "big": 1e308, "low": -1e308, "edge": 1e6, "over": 150 });
        assert_eq!(score_patch(&p, "big").expect_err("big").code(), "bad_params");
        assert_eq!(score_patch(&p, "low").expect_err("low").code(), "bad_params");
        assert_eq!(score_patch(&p, "edge").expect("edge"), Some(Some(1e6)));
        assert_eq!(score_patch(&p, "over").expect("over"), Some(Some(150.0)));
    }

    #[test]
    fn term_accepts_names_and_numbers() {
        let t = required_term(&json!({ "academicYear": "2024/2025", "termName": "Even" }))
            .expect("term");
        assert_eq!(t.term_name, TermName::Even);
        let t = required_term(&json!({ "academicYear": "2024", "termName": 3 })).expect("term");
        assert_eq!(t.term_name, TermName::Semester(3));
        assert!(required_term(&json!({ "academicYear": "2024", "termName": 0 })).is_err());
        assert!(required_term(&json!({ "termName": "odd" })).is_err());
    }

    #[test]
    fn actor_parsing() {
        let a = parse_actor(&json!({ "actor": { "role": "lecturer", "profileId": "l1" } }))
            .expect("actor");
        assert_eq!(a.lecturer_id(), Some("l1"));
        assert_eq!(parse_actor(&json!({})).expect_err("missing").code(), "bad_params");
        assert!(parse_actor(&json!({ "actor": { "role": "dean" } })).is_err());
        assert!(parse_actor(&json!({ "actor": { "role": "student" } })).is_err());
    }

    #[test]
    fn page_is_clamped_to_configured_max() {
        let paging = PagingSettings {
            default_per_page: 20,
            max_per_page: 50,
        };
        let p = parse_page(&json!({}), &paging).expect("defaults");
        assert_eq!((p.page, p.per_page), (1, 20));
        let p = parse_page(&json!({ "page": 3, "perPage": 500 }), &paging).expect("clamp");
        assert_eq!((p.page, p.per_page), (3, 50));
        assert!(parse_page(&json!({ "page": 0 }), &paging).is_err());
    }

    #[test]
    fn dates_must_be_iso() {
        let p = json!({ "from": "2024-09-01", "to": "09/30/2024" });
        assert_eq!(
            optional_date(&p, "from").expect("from"),
            NaiveDate::from_ymd_opt(2024, 9, 1)
        );
        assert!(optional_date(&p, "to").is_err());
        assert!(required_date(&p, "on").is_err());
    }
}
