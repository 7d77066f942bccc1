use crate::calc::{
    self, GradeComponents, GradeEvaluation, RawComponents, RejectedComponent,
};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;

pub const COURSE_NAME_MAX: usize = 50;
pub const SUBJECT_NAME_MAX: usize = 50;
pub const STUDENT_NAME_MAX: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{what} name must be between 1 and {max} characters")]
    InvalidName { what: &'static str, max: usize },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("enter at least one valid score")]
    NoValidComponent { rejected: Vec<RejectedComponent> },
    #[error("subject does not belong to the student's course")]
    Ineligible { student_id: i64, subject_id: i64 },
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidName { .. } => "invalid_name",
            StoreError::NotFound(_) => "not_found",
            StoreError::NoValidComponent { .. } => "no_valid_component",
            StoreError::Ineligible { .. } => "ineligible_pairing",
            StoreError::Db(_) => "db_error",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Name,
    Id,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Some(SortOrder::Name),
            "id" => Some(SortOrder::Id),
            _ => None,
        }
    }

    fn clause(self, alias: &str) -> String {
        match self {
            SortOrder::Name => format!("{alias}.name COLLATE pt_name, {alias}.id"),
            SortOrder::Id => format!("{alias}.id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub student_count: i64,
    pub subject_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub course_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub course_id: Option<i64>,
    pub course_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSubject {
    pub id: i64,
    pub name: String,
    pub linked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    #[serde(flatten)]
    pub components: GradeComponents,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCells {
    pub work: String,
    pub partial1: String,
    pub partial2: String,
    pub exam: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRow {
    pub grade_id: i64,
    pub subject_id: i64,
    pub subject_name: String,
    #[serde(flatten)]
    pub components: GradeComponents,
    pub cells: GradeCells,
    #[serde(flatten)]
    pub evaluation: GradeEvaluation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGrades {
    pub student_id: i64,
    pub student_name: String,
    pub course_name: Option<String>,
    pub course_abbreviation: String,
    pub display_name: String,
    pub grades: Vec<GradeRow>,
    /// Sum of the capped per-subject finals; not a pass/fail input.
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeFilter {
    pub name_contains: Option<String>,
    pub course_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeSummary {
    pub grades_removed: usize,
    pub links_removed: usize,
    pub students_detached: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub grade: GradeRecord,
    pub rejected: Vec<RejectedComponent>,
    pub evaluation: GradeEvaluation,
}

pub fn validate_name(raw: &str, what: &'static str, max: usize) -> StoreResult<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > max {
        return Err(StoreError::InvalidName { what, max });
    }
    Ok(name.to_string())
}

fn exists(conn: &Connection, sql: &str, id: i64) -> StoreResult<bool> {
    let found: Option<i64> = conn.query_row(sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

fn require_course(conn: &Connection, id: i64) -> StoreResult<()> {
    if exists(conn, "SELECT 1 FROM courses WHERE id = ?", id)? {
        Ok(())
    } else {
        Err(StoreError::NotFound("course"))
    }
}

fn require_subject(conn: &Connection, id: i64) -> StoreResult<()> {
    if exists(conn, "SELECT 1 FROM subjects WHERE id = ?", id)? {
        Ok(())
    } else {
        Err(StoreError::NotFound("subject"))
    }
}

fn require_student(conn: &Connection, id: i64) -> StoreResult<()> {
    if exists(conn, "SELECT 1 FROM students WHERE id = ?", id)? {
        Ok(())
    } else {
        Err(StoreError::NotFound("student"))
    }
}

// ---- courses ----

const COURSE_SELECT: &str = "SELECT
       c.id,
       c.name,
       (SELECT COUNT(*) FROM students s WHERE s.course_id = c.id) AS student_count,
       (SELECT COUNT(*) FROM course_subjects cs WHERE cs.course_id = c.id) AS subject_count
     FROM courses c";

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        name: row.get(1)?,
        student_count: row.get(2)?,
        subject_count: row.get(3)?,
    })
}

pub fn list_courses(conn: &Connection, order: SortOrder) -> StoreResult<Vec<Course>> {
    let sql = format!("{COURSE_SELECT} ORDER BY {}", order.clause("c"));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], course_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_course(conn: &Connection, id: i64) -> StoreResult<Course> {
    let sql = format!("{COURSE_SELECT} WHERE c.id = ?");
    conn.query_row(&sql, [id], course_from_row)
        .optional()?
        .ok_or(StoreError::NotFound("course"))
}

pub fn create_course(conn: &Connection, name: &str) -> StoreResult<i64> {
    let name = validate_name(name, "course", COURSE_NAME_MAX)?;
    conn.execute("INSERT INTO courses(name) VALUES(?)", [&name])?;
    let id = conn.last_insert_rowid();
    tracing::info!(course_id = id, %name, "course created");
    Ok(id)
}

pub fn update_course(conn: &Connection, id: i64, name: &str) -> StoreResult<()> {
    let name = validate_name(name, "course", COURSE_NAME_MAX)?;
    let changed = conn.execute("UPDATE courses SET name = ? WHERE id = ?", (&name, id))?;
    if changed == 0 {
        return Err(StoreError::NotFound("course"));
    }
    Ok(())
}

/// Removes a course. Its students stay but lose their course and every grade
/// they had; the course's subject links go with it.
pub fn delete_course(conn: &Connection, id: i64) -> StoreResult<CascadeSummary> {
    require_course(conn, id)?;

    // Dropping the transaction without commit rolls everything back.
    let tx = conn.unchecked_transaction()?;
    let grades_removed = tx.execute(
        "DELETE FROM grades
         WHERE student_id IN (SELECT id FROM students WHERE course_id = ?)",
        [id],
    )?;
    let students_detached = tx.execute(
        "UPDATE students SET course_id = NULL WHERE course_id = ?",
        [id],
    )?;
    let links_removed = tx.execute("DELETE FROM course_subjects WHERE course_id = ?", [id])?;
    tx.execute("DELETE FROM courses WHERE id = ?", [id])?;
    tx.commit()?;

    let summary = CascadeSummary {
        grades_removed,
        links_removed,
        students_detached,
    };
    tracing::info!(course_id = id, ?summary, "course deleted");
    Ok(summary)
}

/// Every subject, flagged with whether it is linked to the course. `search`
/// filters by case-insensitive substring of the subject name.
pub fn course_subjects(
    conn: &Connection,
    course_id: i64,
    search: Option<&str>,
) -> StoreResult<Vec<CourseSubject>> {
    require_course(conn, course_id)?;
    let mut stmt = conn.prepare(
        "SELECT
           m.id,
           m.name,
           EXISTS(
             SELECT 1 FROM course_subjects cs
             WHERE cs.course_id = ? AND cs.subject_id = m.id
           ) AS linked
         FROM subjects m
         ORDER BY m.name COLLATE pt_name, m.id",
    )?;
    let rows = stmt
        .query_map([course_id], |row| {
            Ok(CourseSubject {
                id: row.get(0)?,
                name: row.get(1)?,
                linked: row.get::<_, i64>(2)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    Ok(match needle {
        Some(n) => rows
            .into_iter()
            .filter(|s| s.name.to_lowercase().contains(&n))
            .collect(),
        None => rows,
    })
}

/// Returns true when a new link was created.
pub fn link_course_subject(conn: &Connection, course_id: i64, subject_id: i64) -> StoreResult<bool> {
    require_course(conn, course_id)?;
    require_subject(conn, subject_id)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO course_subjects(course_id, subject_id) VALUES(?, ?)",
        (course_id, subject_id),
    )?;
    Ok(inserted > 0)
}

/// Returns true when a link was removed. Existing grades are left alone.
pub fn unlink_course_subject(
    conn: &Connection,
    course_id: i64,
    subject_id: i64,
) -> StoreResult<bool> {
    let removed = conn.execute(
        "DELETE FROM course_subjects WHERE course_id = ? AND subject_id = ?",
        (course_id, subject_id),
    )?;
    Ok(removed > 0)
}

// ---- subjects ----

const SUBJECT_SELECT: &str = "SELECT
       m.id,
       m.name,
       (SELECT COUNT(*) FROM course_subjects cs WHERE cs.subject_id = m.id) AS course_count
     FROM subjects m";

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        course_count: row.get(2)?,
    })
}

pub fn list_subjects(conn: &Connection, order: SortOrder) -> StoreResult<Vec<Subject>> {
    let sql = format!("{SUBJECT_SELECT} ORDER BY {}", order.clause("m"));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_subject(conn: &Connection, id: i64) -> StoreResult<Subject> {
    let sql = format!("{SUBJECT_SELECT} WHERE m.id = ?");
    conn.query_row(&sql, [id], subject_from_row)
        .optional()?
        .ok_or(StoreError::NotFound("subject"))
}

pub fn create_subject(conn: &Connection, name: &str) -> StoreResult<i64> {
    let name = validate_name(name, "subject", SUBJECT_NAME_MAX)?;
    conn.execute("INSERT INTO subjects(name) VALUES(?)", [&name])?;
    let id = conn.last_insert_rowid();
    tracing::info!(subject_id = id, %name, "subject created");
    Ok(id)
}

pub fn update_subject(conn: &Connection, id: i64, name: &str) -> StoreResult<()> {
    let name = validate_name(name, "subject", SUBJECT_NAME_MAX)?;
    let changed = conn.execute("UPDATE subjects SET name = ? WHERE id = ?", (&name, id))?;
    if changed == 0 {
        return Err(StoreError::NotFound("subject"));
    }
    Ok(())
}

pub fn delete_subject(conn: &Connection, id: i64) -> StoreResult<CascadeSummary> {
    require_subject(conn, id)?;

    let tx = conn.unchecked_transaction()?;
    let grades_removed = tx.execute("DELETE FROM grades WHERE subject_id = ?", [id])?;
    let links_removed = tx.execute("DELETE FROM course_subjects WHERE subject_id = ?", [id])?;
    tx.execute("DELETE FROM subjects WHERE id = ?", [id])?;
    tx.commit()?;

    let summary = CascadeSummary {
        grades_removed,
        links_removed,
        students_detached: 0,
    };
    tracing::info!(subject_id = id, ?summary, "subject deleted");
    Ok(summary)
}

// ---- students ----

const STUDENT_SELECT: &str = "SELECT s.id, s.name, s.course_id, c.name
     FROM students s
     LEFT JOIN courses c ON c.id = s.course_id";

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        course_id: row.get(2)?,
        course_name: row.get(3)?,
    })
}

pub fn list_students(conn: &Connection, order: SortOrder) -> StoreResult<Vec<Student>> {
    let sql = format!("{STUDENT_SELECT} ORDER BY {}", order.clause("s"));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, id: i64) -> StoreResult<Student> {
    let sql = format!("{STUDENT_SELECT} WHERE s.id = ?");
    conn.query_row(&sql, [id], student_from_row)
        .optional()?
        .ok_or(StoreError::NotFound("student"))
}

pub fn create_student(conn: &Connection, name: &str, course_id: Option<i64>) -> StoreResult<i64> {
    let name = validate_name(name, "student", STUDENT_NAME_MAX)?;
    if let Some(cid) = course_id {
        require_course(conn, cid)?;
    }
    conn.execute(
        "INSERT INTO students(name, course_id) VALUES(?, ?)",
        (&name, course_id),
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(student_id = id, ?course_id, "student created");
    Ok(id)
}

/// Changing the course keeps existing grades; only new saves are checked
/// against the new course's subjects.
pub fn update_student(
    conn: &Connection,
    id: i64,
    name: &str,
    course_id: Option<i64>,
) -> StoreResult<()> {
    let name = validate_name(name, "student", STUDENT_NAME_MAX)?;
    if let Some(cid) = course_id {
        require_course(conn, cid)?;
    }
    let changed = conn.execute(
        "UPDATE students SET name = ?, course_id = ? WHERE id = ?",
        (&name, course_id, id),
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound("student"));
    }
    Ok(())
}

pub fn delete_student(conn: &Connection, id: i64) -> StoreResult<CascadeSummary> {
    require_student(conn, id)?;

    let tx = conn.unchecked_transaction()?;
    let grades_removed = tx.execute("DELETE FROM grades WHERE student_id = ?", [id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [id])?;
    tx.commit()?;

    tracing::info!(student_id = id, grades_removed, "student deleted");
    Ok(CascadeSummary {
        grades_removed,
        ..CascadeSummary::default()
    })
}

/// Subjects a grade can be recorded for: those linked to the student's
/// course. Empty for a student without a course.
pub fn student_subjects(conn: &Connection, student_id: i64) -> StoreResult<Vec<Subject>> {
    require_student(conn, student_id)?;
    let sql = format!(
        "{SUBJECT_SELECT}
         JOIN course_subjects lk ON lk.subject_id = m.id
         JOIN students s ON s.course_id = lk.course_id
         WHERE s.id = ?
         ORDER BY m.name COLLATE pt_name, m.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([student_id], subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---- grades ----

pub fn is_eligible(conn: &Connection, student_id: i64, subject_id: i64) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1
             FROM course_subjects cs
             JOIN students s ON s.course_id = cs.course_id
             WHERE s.id = ? AND cs.subject_id = ?",
            (student_id, subject_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn grade_from_row(row: &Row<'_>) -> rusqlite::Result<GradeRecord> {
    Ok(GradeRecord {
        id: row.get(0)?,
        student_id: row.get(1)?,
        subject_id: row.get(2)?,
        components: GradeComponents {
            work: row.get(3)?,
            partial1: row.get(4)?,
            partial2: row.get(5)?,
            exam: row.get(6)?,
        },
        updated_at: row.get(7)?,
    })
}

pub fn get_grade(
    conn: &Connection,
    student_id: i64,
    subject_id: i64,
) -> StoreResult<Option<GradeRecord>> {
    let rec = conn
        .query_row(
            "SELECT id, student_id, subject_id, work, partial1, partial2, exam, updated_at
             FROM grades
             WHERE student_id = ? AND subject_id = ?
             ORDER BY id DESC
             LIMIT 1",
            (student_id, subject_id),
            grade_from_row,
        )
        .optional()?;
    Ok(rec)
}

/// Validates the raw scores, checks the subject belongs to the student's
/// course, then replaces the pair's record in one transaction. Only the
/// components that validated are stored.
pub fn save_grade(
    conn: &Connection,
    student_id: i64,
    subject_id: i64,
    raw: &RawComponents,
) -> StoreResult<SaveOutcome> {
    let validated = calc::validate_components(raw);
    if validated.values.is_empty() {
        return Err(StoreError::NoValidComponent {
            rejected: validated.rejected,
        });
    }

    require_student(conn, student_id)?;
    require_subject(conn, subject_id)?;
    if !is_eligible(conn, student_id, subject_id)? {
        return Err(StoreError::Ineligible {
            student_id,
            subject_id,
        });
    }

    let c = validated.values;
    let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM grades WHERE student_id = ? AND subject_id = ?",
        (student_id, subject_id),
    )?;
    tx.execute(
        "INSERT INTO grades(student_id, subject_id, work, partial1, partial2, exam, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            student_id,
            subject_id,
            c.work,
            c.partial1,
            c.partial2,
            c.exam,
            &updated_at,
        ),
    )?;
    let grade_id = tx.last_insert_rowid();
    tx.commit()?;

    tracing::info!(student_id, subject_id, grade_id, "grade saved");
    Ok(SaveOutcome {
        grade: GradeRecord {
            id: grade_id,
            student_id,
            subject_id,
            components: c,
            updated_at: Some(updated_at),
        },
        rejected: validated.rejected,
        evaluation: calc::evaluate(&c),
    })
}

/// Returns the number of records removed (0 when the pair had none).
pub fn delete_grade(conn: &Connection, student_id: i64, subject_id: i64) -> StoreResult<usize> {
    let removed = conn.execute(
        "DELETE FROM grades WHERE student_id = ? AND subject_id = ?",
        (student_id, subject_id),
    )?;
    Ok(removed)
}

/// Students with at least one grade record, by name, each with their
/// per-subject rows by subject name.
pub fn list_grades(conn: &Connection, filter: &GradeFilter) -> StoreResult<Vec<StudentGrades>> {
    let course_name = filter
        .course_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let needle = filter
        .name_contains
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut student_stmt = conn.prepare(
        "SELECT DISTINCT s.id, s.name, c.name
         FROM students s
         JOIN grades g ON g.student_id = s.id
         LEFT JOIN courses c ON c.id = s.course_id
         WHERE (?1 IS NULL OR c.name = ?1)
         ORDER BY s.name COLLATE pt_name, s.id",
    )?;
    let students = student_stmt
        .query_map([course_name], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut grade_stmt = conn.prepare(
        "SELECT g.id, g.subject_id, m.name, g.work, g.partial1, g.partial2, g.exam
         FROM grades g
         JOIN subjects m ON m.id = g.subject_id
         WHERE g.student_id = ?
         ORDER BY m.name COLLATE pt_name, g.id",
    )?;

    let mut out = Vec::new();
    for (student_id, student_name, course_name) in students {
        if let Some(n) = &needle {
            if !student_name.to_lowercase().contains(n) {
                continue;
            }
        }

        let grades = grade_stmt
            .query_map([student_id], |row| {
                let components = GradeComponents {
                    work: row.get(3)?,
                    partial1: row.get(4)?,
                    partial2: row.get(5)?,
                    exam: row.get(6)?,
                };
                Ok(GradeRow {
                    grade_id: row.get(0)?,
                    subject_id: row.get(1)?,
                    subject_name: row.get(2)?,
                    cells: GradeCells {
                        work: calc::display_component(components.work),
                        partial1: calc::display_component(components.partial1),
                        partial2: calc::display_component(components.partial2),
                        exam: calc::display_component(components.exam),
                    },
                    evaluation: calc::evaluate(&components),
                    components,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let total = calc::student_total(grades.iter().map(|g| &g.components));
        let course_abbreviation = course_name
            .as_deref()
            .map(calc::course_abbreviation)
            .unwrap_or_default();
        let display_name = if course_abbreviation.is_empty() {
            student_name.clone()
        } else {
            format!("{student_name} ({course_abbreviation})")
        };

        out.push(StudentGrades {
            student_id,
            student_name,
            course_name,
            course_abbreviation,
            display_name,
            grades,
            total,
        });
    }
    Ok(out)
}
