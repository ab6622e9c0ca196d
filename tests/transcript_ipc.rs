mod test_support;

use serde_json::{json, Value};
use test_support::{
    admin, lecturer, request_err, request_ok, seed_campus, select_workspace, spawn_sidecar,
    student,
};

fn all_components(
    actor: Value,
    student_id: &str,
    course_id: &str,
    year: &str,
    term: &str,
    score: f64,
) -> Value {
    json!({
        "actor": actor,
        "studentId": student_id,
        "courseId": course_id,
        "academicYear": year,
        "termName": term,
        "assignmentScore": score,
        "midtermScore": score,
        "finalScore": score
    })
}

#[test]
fn transcript_weights_by_credit_hours_and_skips_deleted_courses() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, "campusd-transcript");
    let c = seed_campus(&mut stdin, &mut reader);

    let writes = [
        (&c.course_a, "2024/2025", "odd", 90.0),
        (&c.course_b, "2024/2025", "odd", 80.0),
        (&c.course_a, "2023/2024", "even", 70.0),
    ];
    for (i, (course, year, term, score)) in writes.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("w{}", i),
            "scores.upsert",
            all_components(admin(), &c.student_a, course, year, term, *score),
        );
    }

    let t = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.transcript",
        json!({ "actor": student(&c.student_a) }),
    );
    assert_eq!(t["student"]["studentNo"], json!("2101"));
    let terms = t["byTerm"].as_array().expect("byTerm");
    assert_eq!(terms.len(), 2);
    assert_eq!(terms[0]["term"]["academicYear"], json!("2024/2025"));
    assert_eq!(terms[0]["term"]["termName"], json!("odd"));
    assert_eq!(terms[0]["termGPA"], json!(84.29));
    assert_eq!(terms[0]["termCreditHours"], json!(7));
    assert_eq!(terms[0]["courses"][0]["code"], json!("IF101"));
    assert_eq!(terms[1]["term"]["termName"], json!("even"));
    assert_eq!(terms[1]["termGPA"], json!(70.0));
    assert_eq!(t["overallGPA"], json!(80.0));
    assert_eq!(t["totalCreditHours"], json!(10));
    assert_eq!(t["skippedRecords"], json!(0));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.delete",
        json!({ "actor": admin(), "courseId": c.course_b }),
    );
    assert_eq!(deleted["deletedSchedules"], json!(1));
    assert_eq!(deleted["orphanedScoreRecords"], json!(1));

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.transcript",
        json!({ "actor": admin(), "studentId": c.student_a }),
    );
    assert_eq!(after["skippedRecords"], json!(1));
    assert_eq!(after["byTerm"][0]["termGPA"], json!(90.0));
    assert_eq!(after["byTerm"][0]["termCreditHours"], json!(3));
    assert_eq!(after["overallGPA"], json!(80.0));
    assert_eq!(after["totalCreditHours"], json!(6));

    // Orphans still show up in score listings, without course details.
    let orphans = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "scores.list",
        json!({ "actor": admin(), "courseId": c.course_b }),
    );
    assert_eq!(orphans["total"], json!(1));
    assert!(orphans["items"][0]["courseCode"].is_null());
}

#[test]
fn transcript_access_is_limited_to_admin_and_the_student() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, "campusd-transcript-access");
    let c = seed_campus(&mut stdin, &mut reader);

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.transcript",
        json!({ "actor": student(&c.student_b) }),
    );
    assert_eq!(empty["byTerm"], json!([]));
    assert_eq!(empty["overallGPA"], json!(0.0));
    assert_eq!(empty["totalCreditHours"], json!(0));

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "2",
            "reports.transcript",
            json!({ "actor": student(&c.student_b), "studentId": c.student_a })
        ),
        "forbidden"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "reports.transcript",
            json!({ "actor": lecturer(&c.lecturer_a), "studentId": c.student_a })
        ),
        "forbidden"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "4",
            "reports.transcript",
            json!({ "actor": admin(), "studentId": "nobody" })
        ),
        "not_found"
    );
}

#[test]
fn credit_hours_outside_the_catalog_range_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, "campusd-transcript-credits");

    for (id, credit_hours) in [("1", json!(0)), ("2", json!(101)), ("3", json!(3_000_000_000u64))] {
        assert_eq!(
            request_err(
                &mut stdin,
                &mut reader,
                id,
                "courses.create",
                json!({ "actor": admin(), "code": format!("X{}", id), "name": "X", "creditHours": credit_hours })
            ),
            "bad_params",
            "creditHours {}",
            credit_hours
        );
    }
    let max = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "courses.create",
        json!({ "actor": admin(), "code": "THESIS", "name": "Thesis", "creditHours": 100 }),
    );
    assert_eq!(max["course"]["creditHours"], json!(100));

    let listed = request_ok(&mut stdin, &mut reader, "5", "courses.list", json!({ "actor": admin() }));
    assert_eq!(listed["courses"].as_array().map(|a| a.len()), Some(1));
}
