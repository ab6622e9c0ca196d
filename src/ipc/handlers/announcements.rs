use rusqlite::{params, params_from_iter, types::Value as SqlValue};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::actor::Role;
use crate::ipc::error::HandlerError;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    db_conn, optional_str, parse_actor, parse_page, required_str, respond, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{now_rfc3339, Paged};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    All,
    Students,
    Lecturers,
}

impl Audience {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "students" => Some(Self::Students),
            "lecturers" => Some(Self::Lecturers),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Students => "students",
            Self::Lecturers => "lecturers",
        }
    }

    /// Audiences a reader with `role` is shown.
    fn visible_to(role: Role) -> &'static [Audience] {
        match role {
            Role::Admin => &[Audience::All, Audience::Students, Audience::Lecturers],
            Role::Lecturer => &[Audience::All, Audience::Lecturers],
            Role::Student => &[Audience::All, Audience::Students],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Announcement {
    id: String,
    title: String,
    body: String,
    audience: String,
    author_role: String,
    author_id: Option<String>,
    created_at: String,
}

fn handle_announcements_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    if actor.role == Role::Student {
        return Err(HandlerError::forbidden("students cannot post announcements"));
    }
    let audience = match optional_str(&req.params, "audience")? {
        None => Audience::All,
        Some(raw) => Audience::parse(&raw).ok_or_else(|| {
            HandlerError::bad_params("audience must be one of: all, students, lecturers")
        })?,
    };
    let announcement = Announcement {
        id: Uuid::new_v4().to_string(),
        title: required_str(&req.params, "title")?,
        body: required_str(&req.params, "body")?,
        audience: audience.as_str().to_string(),
        author_role: actor.role.as_str().to_string(),
        author_id: actor.profile_id.clone(),
        created_at: now_rfc3339(),
    };
    conn.execute(
        "INSERT INTO announcements(id, title, body, audience, author_role, author_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        params![
            announcement.id,
            announcement.title,
            announcement.body,
            announcement.audience,
            announcement.author_role,
            announcement.author_id,
            announcement.created_at,
        ],
    )
    .map_err(HandlerError::update("announcements"))?;
    info!(id = %announcement.id, audience = audience.as_str(), "announcement posted");
    Ok(json!({ "announcement": announcement }))
}

/// Newest first, restricted to the audiences the caller belongs to.
fn handle_announcements_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let paging = setup::paging_settings(conn)?;
    let page = parse_page(&req.params, &paging)?;

    let audiences = Audience::visible_to(actor.role);
    let placeholders = vec!["?"; audiences.len()].join(", ");
    let mut args: Vec<SqlValue> = audiences
        .iter()
        .map(|a| SqlValue::Text(a.as_str().to_string()))
        .collect();
    let where_sql = format!(" WHERE audience IN ({})", placeholders);

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM announcements{}", where_sql),
        params_from_iter(args.iter()),
        |r| r.get(0),
    )?;
    args.push(SqlValue::Integer(page.per_page as i64));
    args.push(SqlValue::Integer(page.offset()));
    let mut stmt = conn.prepare(&format!(
        "SELECT id, title, body, audience, author_role, author_id, created_at
         FROM announcements{}
         ORDER BY created_at DESC, id
         LIMIT ? OFFSET ?",
        where_sql
    ))?;
    let items = stmt
        .query_map(params_from_iter(args.iter()), |r| {
            Ok(Announcement {
                id: r.get(0)?,
                title: r.get(1)?,
                body: r.get(2)?,
                audience: r.get(3)?,
                author_role: r.get(4)?,
                author_id: r.get(5)?,
                created_at: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    to_json(&Paged::new(items, total, page))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "announcements.create" => handle_announcements_create(state, req),
        "announcements.list" => handle_announcements_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
