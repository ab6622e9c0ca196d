mod test_support;

use serde_json::json;
use test_support::{
    admin, lecturer, request_err, request_ok, seed_campus, select_workspace, spawn_sidecar,
    student, temp_dir,
};

#[test]
fn bundle_export_then_import_restores_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = select_workspace(&mut stdin, &mut reader, "campusd-bundle-src");
    let c = seed_campus(&mut stdin, &mut reader);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scores.upsert",
        json!({
            "actor": admin(),
            "studentId": c.student_b,
            "courseId": c.course_a,
            "academicYear": "2024/2025",
            "termName": "odd",
            "assignmentScore": 90,
            "midtermScore": 90,
            "finalScore": 90
        }),
    );

    let bundle = temp_dir("campusd-bundle-out").join("campus.zip");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "backup.exportWorkspaceBundle",
        json!({ "actor": admin(), "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(exported["bundleFormat"], json!("campus-workspace-v1"));
    assert_eq!(exported["dbSha256"].as_str().map(str::len), Some(64));
    assert!(bundle.is_file());

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.delete",
        json!({ "actor": admin(), "studentId": c.student_b }),
    );
    assert_eq!(deleted["deletedScores"], json!(1));

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.importWorkspaceBundle",
        json!({ "actor": admin(), "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(imported["bundleFormatDetected"], json!("campus-workspace-v1"));
    assert_eq!(
        imported["workspacePath"],
        json!(workspace.to_string_lossy())
    );

    let students = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.list",
        json!({ "actor": admin() }),
    );
    assert_eq!(students["total"], json!(2));
    let scores = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "scores.list",
        json!({ "actor": admin(), "studentId": c.student_b }),
    );
    assert_eq!(scores["total"], json!(1));
    assert_eq!(scores["items"][0]["letterGrade"], json!("A"));
}

#[test]
fn failed_import_keeps_current_workspace_open() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "campusd-bundle-bad");
    let c = seed_campus(&mut stdin, &mut reader);

    let junk = temp_dir("campusd-bundle-junk").join("notes.zip");
    std::fs::write(&junk, "not a bundle").expect("write junk");
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "1",
            "backup.importWorkspaceBundle",
            json!({ "actor": admin(), "inPath": junk.to_string_lossy() })
        ),
        "io_failed"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "2",
            "backup.importWorkspaceBundle",
            json!({ "actor": admin(), "inPath": "/definitely/missing.zip" })
        ),
        "not_found"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "backup.exportWorkspaceBundle",
            json!({ "actor": lecturer(&c.lecturer_a), "outPath": "/tmp/x.zip" })
        ),
        "forbidden"
    );

    let students = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.list",
        json!({ "actor": admin() }),
    );
    assert_eq!(students["total"], json!(2));
}

#[test]
fn course_scores_csv_export() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "campusd-csv");
    let c = seed_campus(&mut stdin, &mut reader);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scores.upsert",
        json!({
            "actor": lecturer(&c.lecturer_a),
            "studentId": c.student_a,
            "courseId": c.course_a,
            "academicYear": "2024/2025",
            "termName": "odd",
            "assignmentScore": 80,
            "midtermScore": 70.5,
            "finalScore": 90
        }),
    );

    let out = temp_dir("campusd-csv-out").join("nested").join("if101.csv");
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "exchange.exportCourseScoresCsv",
        json!({
            "actor": lecturer(&c.lecturer_a),
            "courseId": c.course_a,
            "outPath": out.to_string_lossy()
        }),
    );
    assert_eq!(res["rowsExported"], json!(1));

    let text = std::fs::read_to_string(&out).expect("read csv");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "student_no,student_name,course_code,academic_year,term_name,assignment_score,midterm_score,final_score,computed_final,letter_grade"
    );
    // 80*0.3 + 70.5*0.3 + 90*0.4 = 81.15
    assert_eq!(lines[1], "2101,Ayu Lestari,IF101,2024/2025,odd,80,70.5,90,81.15,B");
    assert_eq!(lines.len(), 2);

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "exchange.exportCourseScoresCsv",
            json!({
                "actor": student(&c.student_a),
                "courseId": c.course_a,
                "outPath": out.to_string_lossy()
            })
        ),
        "forbidden"
    );
}
