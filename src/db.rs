use rusqlite::Connection;
use std::cmp::Ordering;
use std::path::Path;

pub const DB_FILE_NAME: &str = "miniescola.sqlite3";
/// Collation used by every `ORDER BY ... name`.
pub const NAME_COLLATION: &str = "pt_name";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Folds the accented letters used in Portuguese names to their base letter.
fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Orders names ignoring case and accents, so "Ágata" sorts with the A's.
/// Names equal under folding fall back to a plain comparison.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let key = |s: &str| -> Vec<char> {
        s.chars()
            .flat_map(char::to_lowercase)
            .map(fold_accent)
            .collect()
    };
    key(a).cmp(&key(b)).then_with(|| a.cmp(b))
}

pub fn register_collations(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_collation(NAME_COLLATION, compare_names)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    // Collations live on the connection, not in the file.
    register_collations(conn)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_subjects(
            course_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            PRIMARY KEY(course_id, subject_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_subjects_subject ON course_subjects(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            course_id INTEGER,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_course ON students(course_id)",
        [],
    )?;

    // No UNIQUE(student_id, subject_id): saves replace the pair's row inside
    // one transaction instead.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            work REAL CHECK (work >= 0 AND work <= 5),
            partial1 REAL CHECK (partial1 >= 0 AND partial1 <= 1),
            partial2 REAL CHECK (partial2 >= 0 AND partial2 <= 1),
            exam REAL CHECK (exam >= 0 AND exam <= 5),
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    ensure_grades_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student_subject ON grades(student_id, subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_subject ON grades(subject_id)",
        [],
    )?;

    Ok(())
}

// Databases created before save timestamps existed lack the column.
fn ensure_grades_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "grades", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE grades ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
