use std::sync::Mutex;

use chrono::Utc;
use hojokin_core::types::ApplicationStatus;
use rusqlite::{params, Connection};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{ApplicationError, Result};
use crate::programs;
use crate::types::{Application, ApplicationUpdate, GeneratedContent, NewApplication, SubsidyProgram};

/// Who is asking. Owners can do everything with their records; admins can
/// read and delete anyone's.
#[derive(Debug, Clone, Copy)]
pub struct Caller<'a> {
    pub user_id: &'a str,
    pub is_admin: bool,
}

impl<'a> Caller<'a> {
    pub fn new(user_id: &'a str, is_admin: bool) -> Self {
        Self { user_id, is_admin }
    }

    fn can_read(&self, app: &Application) -> bool {
        self.is_admin || app.owner_id == self.user_id
    }

    fn can_write(&self, app: &Application) -> bool {
        app.owner_id == self.user_id
    }
}

const APP_COLUMNS: &str = "id, owner_id, program_id, title, business_overview, current_challenges,
     plan_details, expected_effects, budget_plan, requested_amount_yen, status,
     generated_content, last_error, created_at, updated_at";

fn row_to_application(row: &rusqlite::Row<'_>) -> rusqlite::Result<Application> {
    use std::str::FromStr;
    let status = ApplicationStatus::from_str(&row.get::<_, String>(10)?).unwrap_or_default();
    let generated_content = row
        .get::<_, Option<String>>(11)?
        .and_then(|json| serde_json::from_str::<GeneratedContent>(&json).ok());
    Ok(Application {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        program_id: row.get(2)?,
        title: row.get(3)?,
        business_overview: row.get(4)?,
        current_challenges: row.get(5)?,
        plan_details: row.get(6)?,
        expected_effects: row.get(7)?,
        budget_plan: row.get(8)?,
        requested_amount_yen: row.get(9)?,
        status,
        generated_content,
        last_error: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

/// Application records and their status machine.
///
/// Wraps a single SQLite connection in a `Mutex`, like every other manager
/// in the workspace. Status changes are compare-and-set on the current
/// status so two concurrent "generate" clicks cannot both win.
pub struct ApplicationManager {
    db: Mutex<Connection>,
}

impl ApplicationManager {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    pub fn programs(&self) -> Result<Vec<SubsidyProgram>> {
        let db = self.db.lock().unwrap();
        programs::list_programs(&db)
    }

    pub fn program(&self, id: &str) -> Result<SubsidyProgram> {
        let db = self.db.lock().unwrap();
        programs::get_program(&db, id)
    }

    /// Create a new application in DRAFT for `owner_id`.
    #[instrument(skip(self, new), fields(program = %new.program_id))]
    pub fn create(&self, owner_id: &str, new: NewApplication) -> Result<Application> {
        if new.title.trim().is_empty() {
            return Err(ApplicationError::Invalid("title is required".to_string()));
        }
        validate_amount(new.requested_amount_yen)?;

        let db = self.db.lock().unwrap();
        programs::get_program(&db, &new.program_id)?;

        let now = Utc::now().to_rfc3339();
        let app = Application {
            id: Uuid::now_v7().to_string(),
            owner_id: owner_id.to_string(),
            program_id: new.program_id,
            title: new.title.trim().to_string(),
            business_overview: new.business_overview,
            current_challenges: new.current_challenges,
            plan_details: new.plan_details,
            expected_effects: new.expected_effects,
            budget_plan: new.budget_plan,
            requested_amount_yen: new.requested_amount_yen,
            status: ApplicationStatus::Draft,
            generated_content: None,
            last_error: None,
            created_at: now.clone(),
            updated_at: now,
        };
        db.execute(
            &format!("INSERT INTO applications ({APP_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)"),
            params![
                app.id,
                app.owner_id,
                app.program_id,
                app.title,
                app.business_overview,
                app.current_challenges,
                app.plan_details,
                app.expected_effects,
                app.budget_plan,
                app.requested_amount_yen,
                app.status.as_str(),
                Option::<String>::None,
                app.last_error,
                app.created_at,
                app.updated_at,
            ],
        )?;
        info!(application_id = %app.id, owner_id, "application created");
        Ok(app)
    }

    /// Fetch an application the caller may read.
    pub fn get(&self, caller: Caller<'_>, id: &str) -> Result<Application> {
        let db = self.db.lock().unwrap();
        let app = load(&db, id)?;
        if !caller.can_read(&app) {
            debug!(application_id = id, user_id = caller.user_id, "read denied");
            return Err(ApplicationError::NotFound(id.to_string()));
        }
        Ok(app)
    }

    /// Most recently updated first.
    pub fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Application>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {APP_COLUMNS} FROM applications WHERE owner_id = ?1 ORDER BY updated_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![owner_id], row_to_application)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_all(&self) -> Result<Vec<Application>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {APP_COLUMNS} FROM applications ORDER BY updated_at DESC"
        ))?;
        let rows = stmt
            .query_map([], row_to_application)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Save plan fields (last write wins).
    #[instrument(skip(self, caller, update), fields(user_id = caller.user_id))]
    pub fn update(&self, caller: Caller<'_>, id: &str, update: ApplicationUpdate) -> Result<Application> {
        validate_amount(update.requested_amount_yen)?;
        let db = self.db.lock().unwrap();
        let mut app = load_writable(&db, caller, id)?;
        if !app.status.is_editable() {
            return Err(ApplicationError::NotEditable { status: app.status });
        }
        update.apply(&mut app);
        if app.title.trim().is_empty() {
            return Err(ApplicationError::Invalid("title is required".to_string()));
        }
        let content_json = app
            .generated_content
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        app.updated_at = Utc::now().to_rfc3339();
        db.execute(
            "UPDATE applications SET
                title=?2, business_overview=?3, current_challenges=?4, plan_details=?5,
                expected_effects=?6, budget_plan=?7, requested_amount_yen=?8,
                generated_content=?9, updated_at=?10
             WHERE id=?1",
            params![
                app.id,
                app.title,
                app.business_overview,
                app.current_challenges,
                app.plan_details,
                app.expected_effects,
                app.budget_plan,
                app.requested_amount_yen,
                content_json,
                app.updated_at,
            ],
        )?;
        Ok(app)
    }

    /// User-requested status change (e.g. EDITING -> COMPLETED -> SUBMITTED).
    ///
    /// GENERATING is entered and left only through the generation methods.
    #[instrument(skip(self, caller), fields(user_id = caller.user_id))]
    pub fn transition(
        &self,
        caller: Caller<'_>,
        id: &str,
        next: ApplicationStatus,
    ) -> Result<Application> {
        let db = self.db.lock().unwrap();
        let app = load_writable(&db, caller, id)?;
        let from = app.status;
        if from == ApplicationStatus::Generating
            || next == ApplicationStatus::Generating
            || !from.can_transition_to(next)
        {
            return Err(ApplicationError::InvalidTransition { from, to: next });
        }
        compare_and_set(&db, id, from, next, None)?;
        info!(application_id = id, %from, to = %next, "status changed");
        load(&db, id)
    }

    /// Move to GENERATING. Fails with `InvalidTransition` when a generation
    /// is already running or the current status does not allow one.
    #[instrument(skip(self, caller), fields(user_id = caller.user_id))]
    pub fn begin_generation(&self, caller: Caller<'_>, id: &str) -> Result<Application> {
        let db = self.db.lock().unwrap();
        let app = load_writable(&db, caller, id)?;
        let from = app.status;
        if !from.can_transition_to(ApplicationStatus::Generating) {
            return Err(ApplicationError::InvalidTransition {
                from,
                to: ApplicationStatus::Generating,
            });
        }
        compare_and_set(&db, id, from, ApplicationStatus::Generating, Some(None))?;
        info!(application_id = id, "generation started");
        load(&db, id)
    }

    /// Store drafted content and move GENERATING -> EDITING.
    ///
    /// With `merge`, sections in `content` replace same-keyed sections of the
    /// existing content; without it the content is replaced wholesale.
    #[instrument(skip(self, content))]
    pub fn complete_generation(
        &self,
        id: &str,
        content: GeneratedContent,
        merge: bool,
    ) -> Result<Application> {
        let db = self.db.lock().unwrap();
        let app = load(&db, id)?;
        let final_content = match (merge, app.generated_content) {
            (true, Some(mut existing)) => {
                existing.merge(content);
                existing
            }
            _ => content,
        };
        let json = serde_json::to_string(&final_content)?;
        let rows = db.execute(
            "UPDATE applications SET status=?3, generated_content=?4, last_error=NULL, updated_at=?5
             WHERE id=?1 AND status=?2",
            params![
                id,
                ApplicationStatus::Generating.as_str(),
                ApplicationStatus::Editing.as_str(),
                json,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if rows == 0 {
            let current = load(&db, id)?.status;
            return Err(ApplicationError::InvalidTransition {
                from: current,
                to: ApplicationStatus::Editing,
            });
        }
        info!(application_id = id, sections = final_content.sections.len(), "generation completed");
        load(&db, id)
    }

    /// Record a failed generation and move GENERATING -> FAILED.
    #[instrument(skip(self))]
    pub fn fail_generation(&self, id: &str, error: &str) -> Result<Application> {
        let db = self.db.lock().unwrap();
        compare_and_set(
            &db,
            id,
            ApplicationStatus::Generating,
            ApplicationStatus::Failed,
            Some(Some(error)),
        )?;
        warn!(application_id = id, error, "generation failed");
        load(&db, id)
    }

    /// Generations run in-process; after a restart nothing will finish them.
    /// Marks every GENERATING record FAILED and returns how many were touched.
    pub fn recover_interrupted(&self) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE applications SET status=?2, last_error=?3, updated_at=?4 WHERE status=?1",
            params![
                ApplicationStatus::Generating.as_str(),
                ApplicationStatus::Failed.as_str(),
                "generation interrupted by server restart",
                Utc::now().to_rfc3339(),
            ],
        )?;
        if n > 0 {
            warn!(count = n, "marked interrupted generations as failed");
        }
        Ok(n)
    }

    #[instrument(skip(self, caller), fields(user_id = caller.user_id))]
    pub fn delete(&self, caller: Caller<'_>, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let app = load(&db, id)?;
        if !(caller.can_write(&app) || caller.is_admin) {
            return Err(ApplicationError::NotFound(id.to_string()));
        }
        db.execute("DELETE FROM applications WHERE id = ?1", params![id])?;
        info!(application_id = id, "application deleted");
        Ok(())
    }
}

fn validate_amount(amount: Option<i64>) -> Result<()> {
    match amount {
        Some(v) if v < 0 => Err(ApplicationError::Invalid(
            "requested_amount_yen must not be negative".to_string(),
        )),
        _ => Ok(()),
    }
}

fn load(conn: &Connection, id: &str) -> Result<Application> {
    match conn.query_row(
        &format!("SELECT {APP_COLUMNS} FROM applications WHERE id = ?1"),
        params![id],
        row_to_application,
    ) {
        Ok(app) => Ok(app),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(ApplicationError::NotFound(id.to_string())),
        Err(e) => Err(e.into()),
    }
}

fn load_writable(conn: &Connection, caller: Caller<'_>, id: &str) -> Result<Application> {
    let app = load(conn, id)?;
    if !caller.can_write(&app) {
        return Err(ApplicationError::NotFound(id.to_string()));
    }
    Ok(app)
}

/// `last_error`: `None` leaves the column alone, `Some(v)` overwrites it.
fn compare_and_set(
    conn: &Connection,
    id: &str,
    from: ApplicationStatus,
    to: ApplicationStatus,
    last_error: Option<Option<&str>>,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = match last_error {
        Some(err) => conn.execute(
            "UPDATE applications SET status=?3, last_error=?4, updated_at=?5 WHERE id=?1 AND status=?2",
            params![id, from.as_str(), to.as_str(), err, now],
        )?,
        None => conn.execute(
            "UPDATE applications SET status=?3, updated_at=?4 WHERE id=?1 AND status=?2",
            params![id, from.as_str(), to.as_str(), now],
        )?,
    };
    if rows == 0 {
        let current = load(conn, id)?.status;
        return Err(ApplicationError::InvalidTransition { from: current, to });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeneratedSection;
    use hojokin_core::types::UserRole;
    use hojokin_users::NewUser;

    struct Fixture {
        mgr: ApplicationManager,
        owner: String,
        other: String,
    }

    fn fixture() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        hojokin_users::db::init_db(&conn).unwrap();
        crate::db::init_db(&conn).unwrap();
        let mk = |email: &str| {
            hojokin_users::accounts::create_user(
                &conn,
                &NewUser {
                    email: email.into(),
                    password: String::new(),
                    company_name: "テスト工業".into(),
                    representative_name: String::new(),
                    industry: String::new(),
                    employee_count: None,
                    capital_yen: None,
                    prefecture: String::new(),
                    phone: None,
                },
                "x",
                UserRole::User,
            )
            .unwrap()
            .id
        };
        let owner = mk("owner@example.jp");
        let other = mk("other@example.jp");
        Fixture {
            mgr: ApplicationManager::new(conn),
            owner,
            other,
        }
    }

    fn new_app() -> NewApplication {
        NewApplication {
            program_id: "monozukuri".into(),
            title: "新型CNC導入による短納期化".into(),
            business_overview: "精密部品加工".into(),
            current_challenges: String::new(),
            plan_details: String::new(),
            expected_effects: String::new(),
            budget_plan: String::new(),
            requested_amount_yen: Some(8_000_000),
        }
    }

    fn content(keys: &[(&str, &str)]) -> GeneratedContent {
        GeneratedContent {
            sections: keys
                .iter()
                .map(|(k, t)| GeneratedSection {
                    key: k.to_string(),
                    title: k.to_string(),
                    text: t.to_string(),
                })
                .collect(),
            model: "test".into(),
            tokens_in: 10,
            tokens_out: 20,
            generated_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn create_starts_in_draft() {
        let f = fixture();
        let app = f.mgr.create(&f.owner, new_app()).unwrap();
        assert_eq!(app.status, ApplicationStatus::Draft);
        assert!(app.generated_content.is_none());
        assert_eq!(f.mgr.list_for_owner(&f.owner).unwrap().len(), 1);
        assert!(f.mgr.list_for_owner(&f.other).unwrap().is_empty());
    }

    #[test]
    fn create_rejects_unknown_program_and_blank_title() {
        let f = fixture();
        let mut bad = new_app();
        bad.program_id = "unknown".into();
        assert!(matches!(
            f.mgr.create(&f.owner, bad),
            Err(ApplicationError::ProgramNotFound(_))
        ));
        let mut blank = new_app();
        blank.title = " ".into();
        assert!(matches!(f.mgr.create(&f.owner, blank), Err(ApplicationError::Invalid(_))));
    }

    #[test]
    fn non_owner_sees_not_found() {
        let f = fixture();
        let app = f.mgr.create(&f.owner, new_app()).unwrap();
        let stranger = Caller::new(&f.other, false);
        assert!(matches!(f.mgr.get(stranger, &app.id), Err(ApplicationError::NotFound(_))));
        assert!(matches!(
            f.mgr.update(stranger, &app.id, ApplicationUpdate::default()),
            Err(ApplicationError::NotFound(_))
        ));
        assert!(matches!(f.mgr.delete(stranger, &app.id), Err(ApplicationError::NotFound(_))));

        let admin = Caller::new(&f.other, true);
        assert_eq!(f.mgr.get(admin, &app.id).unwrap().id, app.id);
    }

    #[test]
    fn update_is_partial_and_blocked_while_generating() {
        let f = fixture();
        let me = Caller::new(&f.owner, false);
        let app = f.mgr.create(&f.owner, new_app()).unwrap();
        let updated = f
            .mgr
            .update(
                me,
                &app.id,
                ApplicationUpdate {
                    plan_details: Some("5軸加工機を導入".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.plan_details, "5軸加工機を導入");
        assert_eq!(updated.business_overview, "精密部品加工");

        f.mgr.begin_generation(me, &app.id).unwrap();
        assert!(matches!(
            f.mgr.update(me, &app.id, ApplicationUpdate::default()),
            Err(ApplicationError::NotEditable { status: ApplicationStatus::Generating })
        ));
    }

    #[test]
    fn generation_cannot_start_twice() {
        let f = fixture();
        let me = Caller::new(&f.owner, false);
        let app = f.mgr.create(&f.owner, new_app()).unwrap();
        f.mgr.begin_generation(me, &app.id).unwrap();
        assert!(matches!(
            f.mgr.begin_generation(me, &app.id),
            Err(ApplicationError::InvalidTransition { from: ApplicationStatus::Generating, .. })
        ));
    }

    #[test]
    fn generation_success_then_single_section_merge() {
        let f = fixture();
        let me = Caller::new(&f.owner, false);
        let app = f.mgr.create(&f.owner, new_app()).unwrap();

        f.mgr.begin_generation(me, &app.id).unwrap();
        let done = f
            .mgr
            .complete_generation(&app.id, content(&[("a", "one"), ("b", "two")]), false)
            .unwrap();
        assert_eq!(done.status, ApplicationStatus::Editing);

        f.mgr.begin_generation(me, &app.id).unwrap();
        let merged = f
            .mgr
            .complete_generation(&app.id, content(&[("b", "TWO")]), true)
            .unwrap();
        let c = merged.generated_content.unwrap();
        assert_eq!(c.section("a").unwrap().text, "one");
        assert_eq!(c.section("b").unwrap().text, "TWO");
        assert_eq!(c.tokens_out, 40);
    }

    #[test]
    fn generation_failure_records_error_and_clears_on_retry() {
        let f = fixture();
        let me = Caller::new(&f.owner, false);
        let app = f.mgr.create(&f.owner, new_app()).unwrap();
        f.mgr.begin_generation(me, &app.id).unwrap();
        let failed = f.mgr.fail_generation(&app.id, "quota exhausted").unwrap();
        assert_eq!(failed.status, ApplicationStatus::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("quota exhausted"));

        let retried = f.mgr.begin_generation(me, &app.id).unwrap();
        assert_eq!(retried.status, ApplicationStatus::Generating);
        assert!(retried.last_error.is_none());
    }

    #[test]
    fn complete_without_running_generation_is_rejected() {
        let f = fixture();
        let app = f.mgr.create(&f.owner, new_app()).unwrap();
        assert!(matches!(
            f.mgr.complete_generation(&app.id, content(&[("a", "x")]), false),
            Err(ApplicationError::InvalidTransition { from: ApplicationStatus::Draft, .. })
        ));
    }

    #[test]
    fn manual_transitions_follow_the_table() {
        let f = fixture();
        let me = Caller::new(&f.owner, false);
        let app = f.mgr.create(&f.owner, new_app()).unwrap();
        assert!(matches!(
            f.mgr.transition(me, &app.id, ApplicationStatus::Submitted),
            Err(ApplicationError::InvalidTransition { .. })
        ));
        assert!(matches!(
            f.mgr.transition(me, &app.id, ApplicationStatus::Generating),
            Err(ApplicationError::InvalidTransition { .. })
        ));
        f.mgr.transition(me, &app.id, ApplicationStatus::Editing).unwrap();
        f.mgr.transition(me, &app.id, ApplicationStatus::Completed).unwrap();
        let submitted = f.mgr.transition(me, &app.id, ApplicationStatus::Submitted).unwrap();
        assert_eq!(submitted.status, ApplicationStatus::Submitted);
        assert!(matches!(
            f.mgr.update(me, &app.id, ApplicationUpdate::default()),
            Err(ApplicationError::NotEditable { .. })
        ));
    }

    #[test]
    fn restart_recovery_fails_stuck_generations() {
        let f = fixture();
        let me = Caller::new(&f.owner, false);
        let app = f.mgr.create(&f.owner, new_app()).unwrap();
        f.mgr.begin_generation(me, &app.id).unwrap();
        assert_eq!(f.mgr.recover_interrupted().unwrap(), 1);
        let app = f.mgr.get(me, &app.id).unwrap();
        assert_eq!(app.status, ApplicationStatus::Failed);
        assert!(app.last_error.is_some());
    }

    #[test]
    fn deleting_owner_cascades() {
        let f = fixture();
        let app = f.mgr.create(&f.owner, new_app()).unwrap();
        {
            let db = f.mgr.db.lock().unwrap();
            hojokin_users::accounts::delete_user(&db, &f.owner).unwrap();
        }
        assert!(matches!(
            f.mgr.get(Caller::new(&f.owner, true), &app.id),
            Err(ApplicationError::NotFound(_))
        ));
    }
}
