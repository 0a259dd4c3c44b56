use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::Result;
use crate::programs::builtin_programs;

/// Initialise programs, applications and templates, then seed the program
/// catalog. Idempotent: safe to call on every startup.
///
/// The users table must already exist (see `hojokin_users::db::init_db`).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS subsidy_programs (
            id               TEXT PRIMARY KEY NOT NULL,
            name             TEXT NOT NULL,
            category         TEXT NOT NULL,
            description      TEXT NOT NULL,
            max_amount_yen   INTEGER NOT NULL,
            subsidy_rate     TEXT NOT NULL,
            requirements     TEXT NOT NULL DEFAULT '[]',  -- JSON array
            scoring_criteria TEXT NOT NULL DEFAULT '[]',  -- JSON array
            sections         TEXT NOT NULL DEFAULT '[]'   -- JSON array of SectionSpec
        );

        CREATE TABLE IF NOT EXISTS applications (
            id                   TEXT PRIMARY KEY NOT NULL,
            owner_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            program_id           TEXT NOT NULL REFERENCES subsidy_programs(id),
            title                TEXT NOT NULL,
            business_overview    TEXT NOT NULL DEFAULT '',
            current_challenges   TEXT NOT NULL DEFAULT '',
            plan_details         TEXT NOT NULL DEFAULT '',
            expected_effects     TEXT NOT NULL DEFAULT '',
            budget_plan          TEXT NOT NULL DEFAULT '',
            requested_amount_yen INTEGER,
            status               TEXT NOT NULL DEFAULT 'DRAFT',
            generated_content    TEXT,                       -- JSON GeneratedContent
            last_error           TEXT,
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_applications_owner
            ON applications(owner_id, updated_at DESC);

        CREATE TABLE IF NOT EXISTS templates (
            id          TEXT PRIMARY KEY NOT NULL,
            owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name        TEXT NOT NULL,
            category    TEXT,
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_templates_owner
            ON templates(owner_id, updated_at DESC);",
    )?;
    seed_programs(conn)?;
    Ok(())
}

/// Insert the built-in catalog. Existing rows are left alone so operators
/// can hand-edit program text in the database.
fn seed_programs(conn: &Connection) -> Result<()> {
    let mut inserted = 0;
    for p in builtin_programs() {
        inserted += conn.execute(
            "INSERT OR IGNORE INTO subsidy_programs
                (id, name, category, description, max_amount_yen, subsidy_rate,
                 requirements, scoring_criteria, sections)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                p.id,
                p.name,
                p.category,
                p.description,
                p.max_amount_yen,
                p.subsidy_rate,
                serde_json::to_string(&p.requirements)?,
                serde_json::to_string(&p.scoring_criteria)?,
                serde_json::to_string(&p.sections)?,
            ],
        )?;
    }
    debug!(inserted, "subsidy program catalog seeded");
    Ok(())
}
