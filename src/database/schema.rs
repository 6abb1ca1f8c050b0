/// Target layout of the tracker database. Taxonomy references between tables are by name
/// and deliberately carry no foreign keys; the synchronizer keeps them in step.
pub const CURRENT_SCHEMA: &str = r#"
PRAGMA user_version = 1;

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    category_name TEXT NOT NULL UNIQUE,
    is_custom BOOLEAN NOT NULL DEFAULT TRUE,
    date_added DATE NOT NULL DEFAULT CURRENT_DATE
);

CREATE TABLE IF NOT EXISTS technologies (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL,
    goal_hours REAL NOT NULL DEFAULT 50.0,
    date_added DATE NOT NULL DEFAULT CURRENT_DATE
);

CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY,
    session_date DATE NOT NULL,
    session_type TEXT NOT NULL DEFAULT 'Studying',
    category_name TEXT NOT NULL,
    technology TEXT NOT NULL,
    work_item TEXT NOT NULL DEFAULT '',
    skill_topic TEXT NOT NULL DEFAULT '',
    category_source TEXT NOT NULL DEFAULT '',
    difficulty TEXT,
    status TEXT,
    hours_spent REAL NOT NULL CHECK (hours_spent >= 0 AND hours_spent <= 12),
    tags TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

-- Root-level values store '' for both parent columns
CREATE TABLE IF NOT EXISTS option_values (
    id INTEGER PRIMARY KEY,
    field_name TEXT NOT NULL,
    field_value TEXT NOT NULL,
    parent_field TEXT NOT NULL DEFAULT '',
    parent_value TEXT NOT NULL DEFAULT '',
    UNIQUE (field_name, field_value, parent_field, parent_value)
);

CREATE INDEX IF NOT EXISTS idx_technologies_category ON technologies (category);
CREATE INDEX IF NOT EXISTS idx_sessions_technology ON sessions (technology);
CREATE INDEX IF NOT EXISTS idx_sessions_category ON sessions (category_name);
CREATE INDEX IF NOT EXISTS idx_sessions_date ON sessions (session_date);
CREATE INDEX IF NOT EXISTS idx_option_values_parent ON option_values (field_name, parent_value);
"#;
