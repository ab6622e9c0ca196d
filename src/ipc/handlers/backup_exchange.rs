use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::backup;
use crate::db;
use crate::ipc::error::HandlerError;
use crate::ipc::handlers::reports::course_score_rows;
use crate::ipc::helpers::{db_conn, optional_str, parse_actor, require_admin, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::records::ScoreRow;

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn csv_score(v: Option<f64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

const SCORES_CSV_HEADER: &str = "student_no,student_name,course_code,academic_year,term_name,assignment_score,midterm_score,final_score,computed_final,letter_grade\n";

fn scores_csv(course_code: &str, rows: &[ScoreRow]) -> String {
    let mut csv = String::from(SCORES_CSV_HEADER);
    for row in rows {
        let rec = &row.record;
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{:.2},{}\n",
            csv_quote(&row.student_no),
            csv_quote(&row.student_name),
            csv_quote(row.course_code.as_deref().unwrap_or(course_code)),
            csv_quote(&rec.term.academic_year),
            rec.term.term_name,
            csv_score(rec.components.assignment),
            csv_score(rec.components.midterm),
            csv_score(rec.components.final_exam),
            rec.computed_final(),
            rec.letter_grade()
        ));
    }
    csv
}

fn handle_backup_export_workspace_bundle(
    state: &mut AppState,
    req: &Request,
) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    require_admin(&parse_actor(&req.params)?)?;
    let out_path = required_str(&req.params, "outPath")?;
    let workspace_path = state.workspace.clone().ok_or(HandlerError::NoWorkspace)?;

    let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");

    let out = PathBuf::from(&out_path);
    let export = backup::export_workspace_bundle(&workspace_path, &out)
        .map_err(|e| HandlerError::io(out_path.as_str(), format!("{:#}", e)))?;
    info!(path = %out_path, sha256 = %export.db_sha256, "workspace bundle exported");
    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256
    }))
}

fn handle_backup_import_workspace_bundle(
    state: &mut AppState,
    req: &Request,
) -> Result<Value, HandlerError> {
    db_conn(state)?;
    require_admin(&parse_actor(&req.params)?)?;
    let in_path = required_str(&req.params, "inPath")?;
    let workspace_path = optional_str(&req.params, "workspacePath")?
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or(HandlerError::NoWorkspace)?;

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerError::not_found(format!(
            "bundle file not found: {}",
            in_path
        )));
    }

    // Drop open handle before replacing file.
    let previous = state.workspace.clone();
    state.db = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            if let Some(prev) = previous {
                match db::open_db(&prev) {
                    Ok(conn) => state.db = Some(conn),
                    Err(reopen) => warn!(error = %reopen, "failed to reopen workspace after import error"),
                }
            }
            return Err(HandlerError::io(in_path.as_str(), format!("{:#}", e)));
        }
    };

    let conn = db::open_db(&workspace_path).map_err(|e| HandlerError::Io {
        path: workspace_path.to_string_lossy().to_string(),
        message: format!("failed to open imported database: {:#}", e),
    })?;
    state.workspace = Some(workspace_path.clone());
    state.db = Some(conn);
    info!(
        path = %in_path,
        format = %import.bundle_format_detected,
        "workspace bundle imported"
    );
    Ok(json!({
        "ok": true,
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected
    }))
}

fn handle_exchange_export_course_scores_csv(
    state: &mut AppState,
    req: &Request,
) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let out_path = required_str(&req.params, "outPath")?;
    let (course, _, rows) = course_score_rows(conn, &actor, &req.params)?;
    let csv = scores_csv(&course.code, &rows);

    let out = PathBuf::from(&out_path);
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HandlerError::io(out_path.as_str(), e))?;
    }
    std::fs::write(&out, csv).map_err(|e| HandlerError::io(out_path.as_str(), e))?;
    info!(course_id = %course.id, rows = rows.len(), path = %out_path, "course scores exported");
    Ok(json!({ "ok": true, "rowsExported": rows.len(), "path": out_path }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => handle_backup_export_workspace_bundle(state, req),
        "backup.importWorkspaceBundle" => handle_backup_import_workspace_bundle(state, req),
        "exchange.exportCourseScoresCsv" => handle_exchange_export_course_scores_csv(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
