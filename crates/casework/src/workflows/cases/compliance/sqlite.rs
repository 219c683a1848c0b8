//! SQLite-backed rule and blocker store.
//!
//! The partial unique index on `blockers(case_id, rule_id) WHERE is_resolved = 0`
//! enforces "at most one unresolved blocker per (case, rule)" independently of
//! any application-level locking. A racing insert for an already-open pair is
//! dropped by `INSERT OR IGNORE`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, ToSql};
use tracing::debug;

use super::super::domain::{CaseId, OrganizationId};
use super::blockers::{Blocker, BlockerId, ReconciliationOutcome, ReconciliationPlan};
use super::repository::{BlockerRepository, RepositoryError, RuleRepository};
use super::rules::{ComplianceRule, RuleDefinition, RuleId};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS compliance_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organization_id TEXT NOT NULL,
    name TEXT NOT NULL COLLATE NOCASE,
    definition_json TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (organization_id, name)
);

CREATE TABLE IF NOT EXISTS blockers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organization_id TEXT NOT NULL,
    case_id TEXT NOT NULL,
    rule_id INTEGER NOT NULL REFERENCES compliance_rules(id),
    is_resolved INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    resolved_at TEXT,
    CHECK ((is_resolved = 0) = (resolved_at IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS blockers_one_open_per_rule
    ON blockers(case_id, rule_id) WHERE is_resolved = 0;

CREATE INDEX IF NOT EXISTS blockers_by_organization
    ON blockers(organization_id, is_resolved);
"#;

const BLOCKER_COLUMNS: &str =
    "id, organization_id, case_id, rule_id, is_resolved, created_at, resolved_at";

impl From<rusqlite::Error> for RepositoryError {
    fn from(value: rusqlite::Error) -> Self {
        match &value {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                RepositoryError::Conflict
            }
            _ => RepositoryError::Unavailable(format!("sqlite: {value}")),
        }
    }
}

pub struct SqliteComplianceStore {
    conn: Mutex<Connection>,
}

impl SqliteComplianceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn.lock().map_err(|_| {
            RepositoryError::Unavailable("sqlite connection mutex poisoned".to_string())
        })
    }

    fn blockers_where(
        &self,
        clause: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<Blocker>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BLOCKER_COLUMNS} FROM blockers WHERE {clause} ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map(params, blocker_from_row)?;
        let mut blockers = Vec::new();
        for row in rows {
            blockers.push(row?);
        }
        Ok(blockers)
    }
}

fn blocker_from_row(row: &Row) -> Result<Blocker, rusqlite::Error> {
    Ok(Blocker {
        blocker_id: BlockerId(row.get::<_, i64>("id")? as u64),
        organization_id: OrganizationId(row.get("organization_id")?),
        case_id: CaseId(row.get("case_id")?),
        rule_id: RuleId(row.get::<_, i64>("rule_id")? as u64),
        is_resolved: row.get("is_resolved")?,
        created_at: row.get("created_at")?,
        resolved_at: row.get("resolved_at")?,
    })
}

struct RuleRow {
    rule_id: RuleId,
    organization_id: OrganizationId,
    definition_json: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RuleRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            rule_id: RuleId(row.get::<_, i64>("id")? as u64),
            organization_id: OrganizationId(row.get("organization_id")?),
            definition_json: row.get("definition_json")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn decode(self) -> Result<ComplianceRule, RepositoryError> {
        let definition = serde_json::from_str(&self.definition_json).map_err(|err| {
            RepositoryError::Unavailable(format!(
                "rule {} has an unreadable definition: {err}",
                self.rule_id
            ))
        })?;
        Ok(ComplianceRule {
            rule_id: self.rule_id,
            organization_id: self.organization_id,
            definition,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn encode_definition(definition: &RuleDefinition) -> Result<String, RepositoryError> {
    serde_json::to_string(definition)
        .map_err(|err| RepositoryError::Unavailable(format!("unable to encode rule: {err}")))
}

impl RuleRepository for SqliteComplianceStore {
    fn insert_rule(
        &self,
        organization: &OrganizationId,
        definition: RuleDefinition,
        now: DateTime<Utc>,
    ) -> Result<ComplianceRule, RepositoryError> {
        let encoded = encode_definition(&definition)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO compliance_rules (organization_id, name, definition_json, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![organization.0, definition.name, encoded, definition.is_active, now],
        )?;
        let rule_id = RuleId(conn.last_insert_rowid() as u64);

        Ok(ComplianceRule {
            rule_id,
            organization_id: organization.clone(),
            definition,
            created_at: now,
            updated_at: now,
        })
    }

    fn update_rule(&self, rule: ComplianceRule) -> Result<(), RepositoryError> {
        let encoded = encode_definition(&rule.definition)?;
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE compliance_rules
            SET name = ?1, definition_json = ?2, is_active = ?3, updated_at = ?4
            WHERE id = ?5 AND organization_id = ?6
            "#,
            params![
                rule.definition.name,
                encoded,
                rule.definition.is_active,
                rule.updated_at,
                rule.rule_id.0 as i64,
                rule.organization_id.0
            ],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn fetch_rule(
        &self,
        organization: &OrganizationId,
        rule_id: RuleId,
    ) -> Result<Option<ComplianceRule>, RepositoryError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT * FROM compliance_rules WHERE id = ?1 AND organization_id = ?2",
                params![rule_id.0 as i64, organization.0],
                RuleRow::from_row,
            )
            .optional()?;
        row.map(RuleRow::decode).transpose()
    }

    fn rules(&self, organization: &OrganizationId) -> Result<Vec<ComplianceRule>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT * FROM compliance_rules WHERE organization_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![organization.0], RuleRow::from_row)?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?.decode()?);
        }
        Ok(rules)
    }
}

impl BlockerRepository for SqliteComplianceStore {
    fn open_for_case(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        self.blockers_where(
            "organization_id = ?1 AND case_id = ?2 AND is_resolved = 0",
            params![organization.0, case_id.0],
        )
    }

    fn open_for_organization(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        self.blockers_where(
            "organization_id = ?1 AND is_resolved = 0",
            params![organization.0],
        )
    }

    fn history_for_case(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        self.blockers_where(
            "organization_id = ?1 AND case_id = ?2",
            params![organization.0, case_id.0],
        )
    }

    fn open_counts_by_rule(
        &self,
        organization: &OrganizationId,
    ) -> Result<BTreeMap<RuleId, usize>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT rule_id, COUNT(*) FROM blockers
            WHERE organization_id = ?1 AND is_resolved = 0
            GROUP BY rule_id
            "#,
        )?;
        let rows = stmt.query_map(params![organization.0], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (rule_id, count) = row?;
            counts.insert(RuleId(rule_id as u64), count as usize);
        }
        Ok(counts)
    }

    fn apply(
        &self,
        plan: &ReconciliationPlan,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, RepositoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut outcome = ReconciliationOutcome::empty(plan.case_id.clone());

        for blocker_id in &plan.resolve {
            let updated = tx.execute(
                "UPDATE blockers SET is_resolved = 1, resolved_at = ?1 WHERE id = ?2 AND case_id = ?3 AND is_resolved = 0",
                params![now, blocker_id.0 as i64, plan.case_id.0],
            )?;
            if updated == 1 {
                let blocker = tx.query_row(
                    &format!("SELECT {BLOCKER_COLUMNS} FROM blockers WHERE id = ?1"),
                    params![blocker_id.0 as i64],
                    blocker_from_row,
                )?;
                outcome.resolved.push(blocker);
            }
        }

        for rule_id in &plan.open {
            let inserted = tx.execute(
                r#"
                INSERT OR IGNORE INTO blockers (organization_id, case_id, rule_id, is_resolved, created_at)
                VALUES (?1, ?2, ?3, 0, ?4)
                "#,
                params![plan.organization_id.0, plan.case_id.0, rule_id.0 as i64, now],
            )?;
            if inserted == 0 {
                debug!(case_id = %plan.case_id, rule_id = %rule_id, "open blocker already present");
                continue;
            }
            outcome.opened.push(Blocker {
                blocker_id: BlockerId(tx.last_insert_rowid() as u64),
                organization_id: plan.organization_id.clone(),
                case_id: plan.case_id.clone(),
                rule_id: *rule_id,
                is_resolved: false,
                created_at: now,
                resolved_at: None,
            });
        }

        tx.commit()?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::cases::compliance::rules::{RuleCondition, RuleRequirement, Severity};
    use crate::workflows::cases::domain::DocumentTag;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 9, minute, 0).unwrap()
    }

    fn org() -> OrganizationId {
        OrganizationId("org-sqlite".to_string())
    }

    fn definition(name: &str) -> RuleDefinition {
        RuleDefinition {
            name: name.to_string(),
            description: Some("FTC Funeral Rule".to_string()),
            condition: RuleCondition::Always,
            requirement: RuleRequirement::DocumentExists {
                tag: DocumentTag::new("GPL"),
            },
            severity: Severity::Blocker,
            is_active: true,
        }
    }

    fn plan(case: &str, open: Vec<RuleId>, resolve: Vec<BlockerId>) -> ReconciliationPlan {
        ReconciliationPlan {
            organization_id: org(),
            case_id: CaseId(case.to_string()),
            open,
            resolve,
        }
    }

    #[test]
    fn rules_round_trip_and_names_are_unique() {
        let store = SqliteComplianceStore::open_in_memory().expect("store opens");
        let rule = store
            .insert_rule(&org(), definition("GPL on file"), at(0))
            .expect("rule inserted");

        let fetched = store
            .fetch_rule(&org(), rule.rule_id)
            .expect("fetch succeeds")
            .expect("rule present");
        assert_eq!(fetched, rule);

        assert!(matches!(
            store.insert_rule(&org(), definition("gpl ON FILE"), at(1)),
            Err(RepositoryError::Conflict)
        ));
        assert!(store
            .fetch_rule(&OrganizationId("other".to_string()), rule.rule_id)
            .expect("fetch succeeds")
            .is_none());
    }

    #[test]
    fn apply_ignores_duplicate_open_blockers() {
        let store = SqliteComplianceStore::open_in_memory().expect("store opens");
        let rule = store
            .insert_rule(&org(), definition("GPL on file"), at(0))
            .expect("rule inserted");

        let first = store
            .apply(&plan("case-1", vec![rule.rule_id], Vec::new()), at(1))
            .expect("first apply");
        assert_eq!(first.opened.len(), 1);

        let second = store
            .apply(&plan("case-1", vec![rule.rule_id], Vec::new()), at(2))
            .expect("duplicate apply is a no-op");
        assert!(second.is_empty());
        assert_eq!(
            store
                .open_for_case(&org(), &CaseId("case-1".to_string()))
                .expect("query")
                .len(),
            1
        );
    }

    #[test]
    fn resolution_is_final_and_reviolation_adds_a_row() {
        let store = SqliteComplianceStore::open_in_memory().expect("store opens");
        let rule = store
            .insert_rule(&org(), definition("GPL on file"), at(0))
            .expect("rule inserted");
        let opened = store
            .apply(&plan("case-1", vec![rule.rule_id], Vec::new()), at(1))
            .expect("open")
            .opened;
        let blocker_id = opened[0].blocker_id;

        let resolved = store
            .apply(&plan("case-1", Vec::new(), vec![blocker_id]), at(2))
            .expect("resolve");
        assert_eq!(resolved.resolved.len(), 1);
        assert_eq!(resolved.resolved[0].resolved_at, Some(at(2)));

        let again = store
            .apply(&plan("case-1", Vec::new(), vec![blocker_id]), at(3))
            .expect("second resolve");
        assert!(again.is_empty(), "resolved rows are never touched again");

        store
            .apply(&plan("case-1", vec![rule.rule_id], Vec::new()), at(4))
            .expect("reopen as new row");
        let history = store
            .history_for_case(&org(), &CaseId("case-1".to_string()))
            .expect("history");
        assert_eq!(history.len(), 2);
        assert!(history[0].is_resolved);
        assert!(history[1].is_open());
        assert_ne!(history[0].blocker_id, history[1].blocker_id);

        let counts = store.open_counts_by_rule(&org()).expect("counts");
        assert_eq!(counts.get(&rule.rule_id), Some(&1));
    }

    #[test]
    fn update_rule_persists_activation() {
        let store = SqliteComplianceStore::open_in_memory().expect("store opens");
        let mut rule = store
            .insert_rule(&org(), definition("GPL on file"), at(0))
            .expect("rule inserted");
        rule.definition.is_active = false;
        rule.updated_at = at(5);
        store.update_rule(rule.clone()).expect("update");

        let rules = store.rules(&org()).expect("list");
        assert_eq!(rules, vec![rule]);
    }
}
