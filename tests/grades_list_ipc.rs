use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_miniescolad");
    let mut child = Command::new(exe)
        .env_remove("MINIESCOLA_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn miniescolad");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = send(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = send(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

fn create(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    key: &str,
) -> i64 {
    request_ok(stdin, reader, id, method, params)[key]
        .as_i64()
        .expect(key)
}

fn names(listing: &serde_json::Value) -> Vec<String> {
    listing["students"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| s["studentName"].as_str().map(|s| s.to_string()))
        .collect()
}

#[test]
fn listing_filters_orders_and_summarizes() {
    let workspace = temp_dir("miniescola-grades-list");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (stdin, reader) = (&mut stdin, &mut reader);
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let cc = create(
        stdin,
        reader,
        "c1",
        "courses.create",
        json!({ "name": "Ciência da Computação" }),
        "courseId",
    );
    let med = create(
        stdin,
        reader,
        "c2",
        "courses.create",
        json!({ "name": "Medicina" }),
        "courseId",
    );
    let algo = create(
        stdin,
        reader,
        "s1",
        "subjects.create",
        json!({ "name": "Algoritmos" }),
        "subjectId",
    );
    let calc = create(
        stdin,
        reader,
        "s2",
        "subjects.create",
        json!({ "name": "Cálculo I" }),
        "subjectId",
    );
    let anat = create(
        stdin,
        reader,
        "s3",
        "subjects.create",
        json!({ "name": "Anatomia" }),
        "subjectId",
    );
    for (id, course, subject) in [("l1", cc, algo), ("l2", cc, calc), ("l3", med, anat)] {
        request_ok(
            stdin,
            reader,
            id,
            "courses.linkSubject",
            json!({ "courseId": course, "subjectId": subject }),
        );
    }

    let bruno = create(
        stdin,
        reader,
        "a1",
        "students.create",
        json!({ "name": "Bruno Lima", "courseId": cc }),
        "studentId",
    );
    let ana = create(
        stdin,
        reader,
        "a2",
        "students.create",
        json!({ "name": "Ana Souza", "courseId": cc }),
        "studentId",
    );
    let carla = create(
        stdin,
        reader,
        "a3",
        "students.create",
        json!({ "name": "Carla Dias", "courseId": med }),
        "studentId",
    );
    // No grades, so never listed.
    create(
        stdin,
        reader,
        "a4",
        "students.create",
        json!({ "name": "Ana Sem Notas", "courseId": cc }),
        "studentId",
    );

    let saves = [
        (bruno, calc, json!({ "work": "3", "exam": "4" })),
        (bruno, algo, json!({ "work": "5", "partial1": "1", "exam": "5" })),
        (ana, algo, json!({ "partial1": "0,5" })),
        (carla, anat, json!({ "work": "2", "exam": "2" })),
    ];
    for (i, (student, subject, parts)) in saves.into_iter().enumerate() {
        let mut params = parts;
        params["studentId"] = json!(student);
        params["subjectId"] = json!(subject);
        request_ok(stdin, reader, &format!("g{i}"), "grades.save", params);
    }

    let all = request_ok(stdin, reader, "q1", "grades.list", json!({}));
    assert_eq!(names(&all), vec!["Ana Souza", "Bruno Lima", "Carla Dias"]);

    let ana_row = &all["students"][0];
    assert_eq!(ana_row["courseAbbreviation"], "Ciê. Computação");
    assert_eq!(ana_row["displayName"], "Ana Souza (Ciê. Computação)");
    let pending = &ana_row["grades"][0];
    assert_eq!(pending["status"], "Pending");
    assert_eq!(pending["finalDisplay"], "0.5");
    assert_eq!(pending["cells"]["work"], "");
    assert_eq!(pending["cells"]["partial1"], "0.5");

    // Subjects come back ordered by name; the final is capped at ten.
    let bruno_row = &all["students"][1];
    assert_eq!(bruno_row["grades"][0]["subjectName"], "Algoritmos");
    assert_eq!(bruno_row["grades"][0]["finalDisplay"], "10.0");
    assert_eq!(bruno_row["grades"][0]["status"], "Approved");
    assert_eq!(bruno_row["grades"][1]["subjectName"], "Cálculo I");
    assert_eq!(bruno_row["grades"][1]["status"], "Approved");
    assert_eq!(bruno_row["total"], json!(17.0));

    let carla_row = &all["students"][2];
    assert_eq!(carla_row["displayName"], "Carla Dias (Med)");
    assert_eq!(carla_row["grades"][0]["status"], "Failed");
    assert_eq!(carla_row["grades"][0]["statusLabel"], "Reprovado");

    let by_name = request_ok(
        stdin,
        reader,
        "q2",
        "grades.list",
        json!({ "nameContains": "  ana " }),
    );
    assert_eq!(names(&by_name), vec!["Ana Souza"]);

    let by_course = request_ok(
        stdin,
        reader,
        "q3",
        "grades.list",
        json!({ "courseName": "Medicina" }),
    );
    assert_eq!(names(&by_course), vec!["Carla Dias"]);

    // Course match is exact, not a substring.
    let partial_course = request_ok(
        stdin,
        reader,
        "q4",
        "grades.list",
        json!({ "courseName": "Medic" }),
    );
    assert_eq!(partial_course["students"], json!([]));

    let combined = request_ok(
        stdin,
        reader,
        "q5",
        "grades.list",
        json!({ "nameContains": "LIMA", "courseName": "Ciência da Computação" }),
    );
    assert_eq!(names(&combined), vec!["Bruno Lima"]);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn student_without_course_is_listed_by_plain_name() {
    let workspace = temp_dir("miniescola-grades-list-detached");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (stdin, reader) = (&mut stdin, &mut reader);
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let course = create(
        stdin,
        reader,
        "c1",
        "courses.create",
        json!({ "name": "Direito" }),
        "courseId",
    );
    let subject = create(
        stdin,
        reader,
        "s1",
        "subjects.create",
        json!({ "name": "Direito Civil" }),
        "subjectId",
    );
    request_ok(
        stdin,
        reader,
        "l1",
        "courses.linkSubject",
        json!({ "courseId": course, "subjectId": subject }),
    );
    let student = create(
        stdin,
        reader,
        "a1",
        "students.create",
        json!({ "name": "Gabriel Costa", "courseId": course }),
        "studentId",
    );
    request_ok(
        stdin,
        reader,
        "g1",
        "grades.save",
        json!({ "studentId": student, "subjectId": subject, "work": "4", "exam": "3" }),
    );
    // Leaving the course keeps the grade already recorded.
    request_ok(
        stdin,
        reader,
        "u1",
        "students.update",
        json!({ "studentId": student, "name": "Gabriel Costa", "courseId": null }),
    );

    let listing = request_ok(stdin, reader, "q1", "grades.list", json!({}));
    let row = &listing["students"][0];
    assert_eq!(row["displayName"], "Gabriel Costa");
    assert!(row["courseName"].is_null());
    assert_eq!(row["grades"][0]["finalDisplay"], "7.0");

    let subjects = request_ok(
        stdin,
        reader,
        "q2",
        "students.subjects",
        json!({ "studentId": student }),
    );
    assert_eq!(subjects["subjects"], json!([]));

    let _ = std::fs::remove_dir_all(workspace);
}
