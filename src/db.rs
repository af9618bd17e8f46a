//! Database façade — parse, authorize, dispatch.
//!
//! One `execute` call is one statement: validate the session (when auth is
//! on), parse the SQL, resolve the target tables, fold the ownership
//! predicate into the WHERE when the table is user-scoped, run the storage
//! operation, and persist the affected table before returning. Mutations
//! that fail never persist.

use std::path::Path;

use tracing::info;

use crate::auth::{Authenticator, DEFAULT_SESSION_TTL_HOURS, Session};
use crate::config::Config;
use crate::error::{Result, TabletError};
use crate::parser::{self, ColumnSpec, CompareOp, Join, Predicate, Statement};
use crate::storage::{Catalog, Column, DataType, Row, Value};

/// What a statement evaluates to: rows for SELECT, an affected-row count
/// for everything else.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Rows(Vec<Row>),
    Affected(usize),
}

pub struct Database {
    catalog: Catalog,
    auth: Authenticator,
    auth_enabled: bool,
}

impl Database {
    /// Open (or create) a database over a persistence directory. With auth
    /// enabled, the built-in `users` table is created on first open.
    pub fn open(dir: &Path, auth_enabled: bool) -> Result<Self> {
        Self::open_with_ttl(dir, auth_enabled, DEFAULT_SESSION_TTL_HOURS)
    }

    pub fn open_with_ttl(dir: &Path, auth_enabled: bool, session_ttl_hours: i64) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut catalog = Catalog::new(dir);
        catalog.load_existing()?;
        let mut db = Self {
            catalog,
            auth: Authenticator::new(session_ttl_hours),
            auth_enabled,
        };
        if auth_enabled {
            db.ensure_users_table()?;
        }
        info!(dir = %dir.display(), auth_enabled, "database opened");
        Ok(db)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open_with_ttl(&config.data_dir, config.auth_enabled, config.session_ttl_hours)
    }

    pub fn data_dir(&self) -> &Path {
        self.catalog.dir()
    }

    fn ensure_users_table(&mut self) -> Result<()> {
        if self.catalog.has_table("users") {
            return Ok(());
        }
        self.catalog.create_table(
            "users",
            vec![
                Column::primary("id", DataType::Int),
                Column::unique("username", DataType::Str),
                Column::new("password_hash", DataType::Str),
                Column::new("email", DataType::Str),
                Column::new("is_admin", DataType::Int),
            ],
        )
    }

    // -----------------------------------------------------------------
    // Accounts & sessions
    // -----------------------------------------------------------------

    /// Register a new user and return its id. Ids are `max(id) + 1` over
    /// the current table, starting at 1; username uniqueness comes from the
    /// storage constraint.
    pub fn register_user(&mut self, username: &str, password: &str, email: &str, is_admin: i64) -> Result<i64> {
        if !self.auth_enabled {
            return Err(TabletError::Auth("auth disabled".into()));
        }
        let user_id = self.next_int_id("users")?;
        let row = vec![
            ("id".to_string(), Value::Int(user_id)),
            ("username".to_string(), Value::Str(username.to_string())),
            ("password_hash".to_string(), Value::Str(Authenticator::hash_password(password))),
            ("email".to_string(), Value::Str(email.to_string())),
            ("is_admin".to_string(), Value::Int(is_admin)),
        ];
        let users = self.catalog.get_table_mut("users")?;
        users.insert(&row)?;
        users.persist()?;
        info!(username, user_id, "user registered");
        Ok(user_id)
    }

    fn next_int_id(&self, table: &str) -> Result<i64> {
        let rows = self.catalog.get_table(table)?.select(&["id".to_string()], None)?;
        let mut max_id = 0;
        for row in &rows {
            if let Some(Value::Int(v)) = field(row, "id") {
                if *v > max_id {
                    max_id = *v;
                }
            }
        }
        Ok(max_id + 1)
    }

    /// Check credentials and issue a session token.
    pub fn login(&mut self, username: &str, password: &str) -> Result<String> {
        if !self.auth_enabled {
            return Err(TabletError::Auth("auth disabled".into()));
        }
        let filter = Predicate {
            column: "username".to_string(),
            op: CompareOp::Eq,
            value: Value::Str(username.to_string()),
        };
        let rows = self.catalog.get_table("users")?.select(
            &["id".to_string(), "username".to_string(), "password_hash".to_string()],
            Some(&filter),
        )?;
        let row = rows
            .first()
            .ok_or_else(|| TabletError::Auth("invalid credentials".into()))?;
        let stored = match field(row, "password_hash") {
            Some(Value::Str(h)) => h.as_str(),
            _ => "",
        };
        if stored != Authenticator::hash_password(password) {
            return Err(TabletError::Auth("invalid credentials".into()));
        }
        let user_id = match field(row, "id") {
            Some(Value::Int(id)) => *id,
            _ => return Err(TabletError::Auth("invalid credentials".into())),
        };
        Ok(self.auth.create_session(user_id, username))
    }

    /// Resolve a session token to `(user_id, username)`.
    pub fn validate(&mut self, token: Option<&str>) -> Result<(i64, String)> {
        let session = self.auth.validate(token)?;
        Ok((session.user_id, session.username))
    }

    pub fn logout(&mut self, token: Option<&str>) {
        self.auth.logout(token);
    }

    /// Persist every table once.
    pub fn close(&self) -> Result<()> {
        self.catalog.persist_all()?;
        info!("database closed");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Statement execution
    // -----------------------------------------------------------------

    pub fn execute(&mut self, sql: &str, token: Option<&str>) -> Result<QueryOutput> {
        let session = if self.auth_enabled {
            Some(self.auth.validate(token)?)
        } else {
            None
        };

        match parser::parse(sql)? {
            Statement::CreateTable { table, columns } => {
                let columns = columns
                    .into_iter()
                    .map(column_from_spec)
                    .collect::<Result<Vec<_>>>()?;
                self.catalog.create_table(&table, columns)?;
                Ok(QueryOutput::Affected(1))
            }
            Statement::DropTable { table } => {
                self.catalog.drop_table(&table)?;
                Ok(QueryOutput::Affected(1))
            }
            Statement::Insert { table, mut row } => {
                // Stamp the owning user onto user-scoped tables unless the
                // caller set one explicitly.
                if let Some(session) = &session {
                    let t = self.catalog.get_table(&table)?;
                    if t.has_column("user_id") && !row.iter().any(|(n, _)| n == "user_id") {
                        row.push(("user_id".to_string(), Value::Int(session.user_id)));
                    }
                }
                let t = self.catalog.get_table_mut(&table)?;
                t.insert(&row)?;
                t.persist()?;
                Ok(QueryOutput::Affected(1))
            }
            Statement::Select { table, columns, join: None, filter } => {
                let filter = self.scoped_filter(&table, filter, session.as_ref())?;
                let rows = self.catalog.get_table(&table)?.select(&columns, filter.as_ref())?;
                Ok(QueryOutput::Rows(rows))
            }
            Statement::Select { table, columns, join: Some(join), filter } => {
                self.execute_join(&table, &columns, &join, filter, session.as_ref())
            }
            Statement::Update { table, assignments, filter } => {
                let filter = self.scoped_filter(&table, filter, session.as_ref())?;
                let t = self.catalog.get_table_mut(&table)?;
                let affected = t.update(&assignments, filter.as_ref())?;
                t.persist()?;
                Ok(QueryOutput::Affected(affected))
            }
            Statement::Delete { table, filter } => {
                let filter = self.scoped_filter(&table, filter, session.as_ref())?;
                let t = self.catalog.get_table_mut(&table)?;
                let removed = t.delete(filter.as_ref())?;
                t.persist()?;
                Ok(QueryOutput::Affected(removed))
            }
        }
    }

    /// Single left-table JOIN: filter the left side (ownership included),
    /// look up matching right rows by equality (index-backed when the right
    /// column is unique), and merge each pair under `"<table>.<column>"`
    /// keys.
    fn execute_join(
        &self,
        table: &str,
        columns: &[String],
        join: &Join,
        filter: Option<Predicate>,
        session: Option<&Session>,
    ) -> Result<QueryOutput> {
        let filter = self.scoped_filter(table, filter, session)?;
        let left = self.catalog.get_table(table)?;
        let right = self.catalog.get_table(&join.table)?;

        let star = ["*".to_string()];
        let left_rows = left.select(&star, filter.as_ref())?;

        let mut merged_rows: Vec<Row> = Vec::new();
        for left_row in &left_rows {
            let left_value = field(left_row, &join.left).cloned().unwrap_or(Value::Null);
            let right_filter = Predicate {
                column: join.right.clone(),
                op: CompareOp::Eq,
                value: left_value,
            };
            for right_row in right.select(&star, Some(&right_filter))? {
                let mut merged: Row = left_row
                    .iter()
                    .map(|(name, value)| (format!("{table}.{name}"), value.clone()))
                    .collect();
                for (name, value) in right_row {
                    let key = format!("{}.{}", join.table, name);
                    match merged.iter_mut().find(|(k, _)| *k == key) {
                        Some(slot) => slot.1 = value,
                        None => merged.push((key, value)),
                    }
                }
                merged_rows.push(merged);
            }
        }

        if columns.len() == 1 && columns[0] == "*" {
            return Ok(QueryOutput::Rows(merged_rows));
        }
        let projected = merged_rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.clone(), field(row, c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();
        Ok(QueryOutput::Rows(projected))
    }

    /// Fold the ownership overlay into a statement's WHERE: non-admin
    /// sessions only see rows whose `user_id` is their own. Tables without
    /// a `user_id` column, admin sessions, and disabled auth pass through.
    fn scoped_filter(
        &self,
        table: &str,
        filter: Option<Predicate>,
        session: Option<&Session>,
    ) -> Result<Option<Predicate>> {
        let Some(session) = session else { return Ok(filter) };
        let t = self.catalog.get_table(table)?;
        if !t.has_column("user_id") || self.is_admin(session.user_id)? {
            return Ok(filter);
        }
        let overlay = Predicate {
            column: "user_id".to_string(),
            op: CompareOp::Eq,
            value: Value::Int(session.user_id),
        };
        Ok(Some(and_where(filter, overlay)?))
    }

    /// A user is admin iff their `users` row has a non-null, non-zero
    /// `is_admin`.
    fn is_admin(&self, user_id: i64) -> Result<bool> {
        if !self.auth_enabled {
            return Ok(true);
        }
        let filter = Predicate {
            column: "id".to_string(),
            op: CompareOp::Eq,
            value: Value::Int(user_id),
        };
        let rows = self
            .catalog
            .get_table("users")?
            .select(&["is_admin".to_string()], Some(&filter))?;
        Ok(match rows.first().and_then(|row| field(row, "is_admin")) {
            Some(Value::Int(v)) => *v != 0,
            _ => false,
        })
    }
}

/// Combine the caller's predicate with the ownership overlay. Only one
/// WHERE is supported: same-column equality deduplicates in the caller's
/// favor, anything else is a conflict.
fn and_where(existing: Option<Predicate>, overlay: Predicate) -> Result<Predicate> {
    match existing {
        None => Ok(overlay),
        Some(p) if p.column == overlay.column && p.op == CompareOp::Eq && overlay.op == CompareOp::Eq => {
            Ok(p)
        }
        Some(_) => Err(TabletError::Schema("only one WHERE condition supported".into())),
    }
}

fn column_from_spec(spec: ColumnSpec) -> Result<Column> {
    Ok(Column {
        name: spec.name,
        dtype: DataType::parse(&spec.dtype)?,
        primary: spec.primary,
        unique: spec.unique,
    })
}

fn field<'a>(row: &'a Row, name: &str) -> Option<&'a Value> {
    row.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_no_auth(tmp: &TempDir) -> Database {
        Database::open(tmp.path(), false).unwrap()
    }

    fn rows(output: QueryOutput) -> Vec<Row> {
        match output {
            QueryOutput::Rows(rows) => rows,
            other => panic!("expected rows, got {other:?}"),
        }
    }

    fn affected(output: QueryOutput) -> usize {
        match output {
            QueryOutput::Affected(n) => n,
            other => panic!("expected count, got {other:?}"),
        }
    }

    #[test]
    fn create_insert_select() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_no_auth(&tmp);
        assert_eq!(affected(db.execute("CREATE TABLE t (id INT PRIMARY UNIQUE, name STRING);", None).unwrap()), 1);
        assert_eq!(affected(db.execute("INSERT INTO t (id, name) VALUES (1, 'a');", None).unwrap()), 1);
        let rows = rows(db.execute("SELECT * FROM t;", None).unwrap());
        assert_eq!(
            rows,
            vec![vec![
                ("id".to_string(), Value::Int(1)),
                ("name".to_string(), Value::Str("a".into())),
            ]]
        );
    }

    #[test]
    fn unique_violation_leaves_single_row() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_no_auth(&tmp);
        db.execute("CREATE TABLE u (id INT PRIMARY UNIQUE, email STRING UNIQUE)", None).unwrap();
        db.execute("INSERT INTO u (id, email) VALUES (1, 'x@y')", None).unwrap();
        let err = db.execute("INSERT INTO u (id, email) VALUES (2, 'x@y')", None).unwrap_err();
        assert!(matches!(err, TabletError::Constraint(_)));
        assert_eq!(rows(db.execute("SELECT * FROM u", None).unwrap()).len(), 1);
    }

    #[test]
    fn where_comparison_across_types() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_no_auth(&tmp);
        db.execute("CREATE TABLE p (id INT PRIMARY, price FLOAT)", None).unwrap();
        db.execute("INSERT INTO p (id, price) VALUES (1, 9.5)", None).unwrap();
        db.execute("INSERT INTO p (id, price) VALUES (2, 10.0)", None).unwrap();
        let out = rows(db.execute("SELECT * FROM p WHERE price > 9", None).unwrap());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0][0], ("id".to_string(), Value::Int(1)));
        assert_eq!(out[1][0], ("id".to_string(), Value::Int(2)));
    }

    #[test]
    fn join_merges_rows_with_prefixed_keys() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_no_auth(&tmp);
        db.execute("CREATE TABLE a (id INT PRIMARY, name STRING)", None).unwrap();
        db.execute("CREATE TABLE b (id INT PRIMARY, a_id INT)", None).unwrap();
        db.execute("INSERT INTO a (id, name) VALUES (1, 'x')", None).unwrap();
        db.execute("INSERT INTO b (id, a_id) VALUES (10, 1)", None).unwrap();
        let out = rows(db.execute("SELECT * FROM b JOIN a ON a_id = id", None).unwrap());
        assert_eq!(
            out,
            vec![vec![
                ("b.id".to_string(), Value::Int(10)),
                ("b.a_id".to_string(), Value::Int(1)),
                ("a.id".to_string(), Value::Int(1)),
                ("a.name".to_string(), Value::Str("x".into())),
            ]]
        );
    }

    #[test]
    fn join_projection_by_merged_key() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_no_auth(&tmp);
        db.execute("CREATE TABLE a (id INT PRIMARY, name STRING)", None).unwrap();
        db.execute("CREATE TABLE b (id INT PRIMARY, a_id INT)", None).unwrap();
        db.execute("INSERT INTO a (id, name) VALUES (1, 'x')", None).unwrap();
        db.execute("INSERT INTO b (id, a_id) VALUES (10, 1)", None).unwrap();
        // Explicit projections match merged keys exactly; plain column names
        // that match nothing come back null.
        let out = rows(db.execute("SELECT name FROM b JOIN a ON a_id = id", None).unwrap());
        assert_eq!(out, vec![vec![("name".to_string(), Value::Null)]]);
    }

    #[test]
    fn join_without_matches_is_empty() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_no_auth(&tmp);
        db.execute("CREATE TABLE a (id INT PRIMARY)", None).unwrap();
        db.execute("CREATE TABLE b (id INT PRIMARY, a_id INT)", None).unwrap();
        db.execute("INSERT INTO b (id, a_id) VALUES (10, 7)", None).unwrap();
        let out = rows(db.execute("SELECT * FROM b JOIN a ON a_id = id", None).unwrap());
        assert!(out.is_empty());
    }

    #[test]
    fn update_and_delete_counts() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_no_auth(&tmp);
        db.execute("CREATE TABLE t (id INT PRIMARY, score INT)", None).unwrap();
        for i in 1..=3 {
            db.execute(&format!("INSERT INTO t (id, score) VALUES ({i}, 0)"), None).unwrap();
        }
        assert_eq!(affected(db.execute("UPDATE t SET score = 5 WHERE id > 1", None).unwrap()), 2);
        assert_eq!(affected(db.execute("DELETE FROM t WHERE score = 5", None).unwrap()), 2);
        assert_eq!(rows(db.execute("SELECT * FROM t", None).unwrap()).len(), 1);
    }

    #[test]
    fn drop_table_removes_table() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_no_auth(&tmp);
        db.execute("CREATE TABLE t (id INT PRIMARY)", None).unwrap();
        assert_eq!(affected(db.execute("DROP TABLE t", None).unwrap()), 1);
        assert!(matches!(
            db.execute("SELECT * FROM t", None),
            Err(TabletError::TableNotFound(_))
        ));
        assert!(!tmp.path().join("t.meta.json").exists());
    }

    #[test]
    fn reopen_reproduces_tables() {
        let tmp = TempDir::new().unwrap();
        {
            let mut db = open_no_auth(&tmp);
            db.execute("CREATE TABLE t (id INT PRIMARY, name STRING)", None).unwrap();
            db.execute("INSERT INTO t (id, name) VALUES (1, 'a')", None).unwrap();
            db.execute("INSERT INTO t (id, name) VALUES (2, 'b')", None).unwrap();
            db.execute("UPDATE t SET name = 'z' WHERE id = 2", None).unwrap();
            db.execute("DELETE FROM t WHERE id = 1", None).unwrap();
            db.close().unwrap();
        }
        let mut db = open_no_auth(&tmp);
        let out = rows(db.execute("SELECT * FROM t", None).unwrap());
        assert_eq!(
            out,
            vec![vec![
                ("id".to_string(), Value::Int(2)),
                ("name".to_string(), Value::Str("z".into())),
            ]]
        );
    }

    #[test]
    fn unknown_table_is_table_not_found() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_no_auth(&tmp);
        assert!(matches!(
            db.execute("SELECT * FROM ghost", None),
            Err(TabletError::TableNotFound(_))
        ));
    }

    // -----------------------------------------------------------------
    // Auth-enabled behavior
    // -----------------------------------------------------------------

    #[test]
    fn open_with_auth_creates_users_table() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path(), true).unwrap();
        assert!(tmp.path().join("users.meta.json").exists());
        drop(db);
        // Reopening does not recreate or clobber it.
        let mut db = Database::open(tmp.path(), true).unwrap();
        db.register_user("alice", "pw", "a@example.com", 0).unwrap();
        drop(db);
        let mut db = Database::open(tmp.path(), true).unwrap();
        assert!(db.login("alice", "pw").is_ok());
    }

    #[test]
    fn register_assigns_incrementing_ids() {
        let tmp = TempDir::new().unwrap();
        let mut db = Database::open(tmp.path(), true).unwrap();
        assert_eq!(db.register_user("a", "pw", "", 0).unwrap(), 1);
        assert_eq!(db.register_user("b", "pw", "", 0).unwrap(), 2);
        // Duplicate usernames bounce off the storage constraint.
        assert!(matches!(
            db.register_user("a", "pw", "", 0),
            Err(TabletError::Constraint(_))
        ));
    }

    #[test]
    fn register_and_login_disabled_without_auth() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_no_auth(&tmp);
        assert!(matches!(db.register_user("a", "pw", "", 0), Err(TabletError::Auth(_))));
        assert!(matches!(db.login("a", "pw"), Err(TabletError::Auth(_))));
    }

    #[test]
    fn login_and_validate() {
        let tmp = TempDir::new().unwrap();
        let mut db = Database::open(tmp.path(), true).unwrap();
        let uid = db.register_user("alice", "secret", "", 0).unwrap();
        let token = db.login("alice", "secret").unwrap();
        assert_eq!(db.validate(Some(&token)).unwrap(), (uid, "alice".to_string()));
        assert!(matches!(db.login("alice", "wrong"), Err(TabletError::Auth(_))));
        assert!(matches!(db.login("nobody", "secret"), Err(TabletError::Auth(_))));
        db.logout(Some(&token));
        assert!(matches!(db.validate(Some(&token)), Err(TabletError::Auth(_))));
    }

    #[test]
    fn session_expiry_is_lazy_and_evicting() {
        let tmp = TempDir::new().unwrap();
        let mut db = Database::open_with_ttl(tmp.path(), true, 0).unwrap();
        db.register_user("alice", "pw", "", 0).unwrap();
        let token = db.login("alice", "pw").unwrap();
        let err = db.validate(Some(&token)).unwrap_err();
        assert!(err.to_string().contains("expired"));
        // Evicted: now reported as invalid rather than expired.
        let err = db.validate(Some(&token)).unwrap_err();
        assert!(err.to_string().contains("invalid session"));
    }

    #[test]
    fn execute_requires_session_when_auth_enabled() {
        let tmp = TempDir::new().unwrap();
        let mut db = Database::open(tmp.path(), true).unwrap();
        assert!(matches!(
            db.execute("SELECT * FROM users", None),
            Err(TabletError::Auth(_))
        ));
    }

    fn scoped_db(tmp: &TempDir) -> (Database, String, String, i64, i64) {
        let mut db = Database::open(tmp.path(), true).unwrap();
        let alice = db.register_user("alice", "pw", "", 0).unwrap();
        let bob = db.register_user("bob", "pw", "", 0).unwrap();
        let alice_token = db.login("alice", "pw").unwrap();
        let bob_token = db.login("bob", "pw").unwrap();
        db.execute(
            "CREATE TABLE notes (id INT PRIMARY, user_id INT, text STRING)",
            Some(&alice_token),
        )
        .unwrap();
        db.execute("INSERT INTO notes (id, text) VALUES (1, 'a1')", Some(&alice_token)).unwrap();
        db.execute("INSERT INTO notes (id, text) VALUES (2, 'a2')", Some(&alice_token)).unwrap();
        db.execute("INSERT INTO notes (id, text) VALUES (3, 'b1')", Some(&bob_token)).unwrap();
        (db, alice_token, bob_token, alice, bob)
    }

    #[test]
    fn insert_injects_owner_user_id() {
        let tmp = TempDir::new().unwrap();
        let (mut db, alice_token, _, alice, bob) = scoped_db(&tmp);
        // Read back as an admin so a WHERE can be used without tripping the
        // one-predicate rule.
        db.register_user("root", "pw", "", 1).unwrap();
        let root_token = db.login("root", "pw").unwrap();

        let out = rows(db.execute("SELECT * FROM notes WHERE id = 1", Some(&root_token)).unwrap());
        assert_eq!(field(&out[0], "user_id"), Some(&Value::Int(alice)));

        // An explicit user_id in the statement is not overridden.
        db.execute(
            &format!("INSERT INTO notes (id, user_id, text) VALUES (9, {bob}, 'x')"),
            Some(&alice_token),
        )
        .unwrap();
        let out = rows(db.execute("SELECT * FROM notes WHERE id = 9", Some(&root_token)).unwrap());
        assert_eq!(field(&out[0], "user_id"), Some(&Value::Int(bob)));
    }

    #[test]
    fn ownership_scopes_select() {
        let tmp = TempDir::new().unwrap();
        let (mut db, alice_token, bob_token, alice, bob) = scoped_db(&tmp);
        let out = rows(db.execute("SELECT * FROM notes", Some(&alice_token)).unwrap());
        assert_eq!(out.len(), 2);
        for row in &out {
            assert_eq!(field(row, "user_id"), Some(&Value::Int(alice)));
        }
        let out = rows(db.execute("SELECT * FROM notes", Some(&bob_token)).unwrap());
        assert_eq!(out.len(), 1);
        assert_eq!(field(&out[0], "user_id"), Some(&Value::Int(bob)));
    }

    #[test]
    fn ownership_scopes_delete_and_counts() {
        let tmp = TempDir::new().unwrap();
        let (mut db, alice_token, bob_token, _, _) = scoped_db(&tmp);
        assert_eq!(affected(db.execute("DELETE FROM notes", Some(&alice_token)).unwrap()), 2);
        // Bob's row survives.
        let out = rows(db.execute("SELECT * FROM notes", Some(&bob_token)).unwrap());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn ownership_scopes_update() {
        let tmp = TempDir::new().unwrap();
        let (mut db, alice_token, bob_token, _, _) = scoped_db(&tmp);
        assert_eq!(
            affected(db.execute("UPDATE notes SET text = 'mine'", Some(&alice_token)).unwrap()),
            2
        );
        let out = rows(db.execute("SELECT text FROM notes", Some(&bob_token)).unwrap());
        assert_eq!(out, vec![vec![("text".to_string(), Value::Str("b1".into()))]]);
    }

    #[test]
    fn admin_sees_everything() {
        let tmp = TempDir::new().unwrap();
        let (mut db, alice_token, _, _, _) = scoped_db(&tmp);
        db.register_user("root", "pw", "", 1).unwrap();
        let root_token = db.login("root", "pw").unwrap();
        assert_eq!(rows(db.execute("SELECT * FROM notes", Some(&root_token)).unwrap()).len(), 3);
        // Non-admin is still scoped.
        assert_eq!(rows(db.execute("SELECT * FROM notes", Some(&alice_token)).unwrap()).len(), 2);
    }

    #[test]
    fn same_column_where_wins_over_overlay() {
        let tmp = TempDir::new().unwrap();
        let (mut db, alice_token, _, _, bob) = scoped_db(&tmp);
        // The caller's user_id predicate replaces the overlay, so a
        // non-admin can name another user explicitly. Deliberate quirk.
        let out = rows(db
            .execute(&format!("SELECT * FROM notes WHERE user_id = {bob}"), Some(&alice_token))
            .unwrap());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn conflicting_where_and_overlay_rejected() {
        let tmp = TempDir::new().unwrap();
        let (mut db, alice_token, _, _, _) = scoped_db(&tmp);
        let err = db.execute("SELECT * FROM notes WHERE id > 0", Some(&alice_token)).unwrap_err();
        assert!(matches!(err, TabletError::Schema(_)));
        assert!(err.to_string().contains("only one WHERE"));
    }

    #[test]
    fn tables_without_user_id_are_unscoped() {
        let tmp = TempDir::new().unwrap();
        let (mut db, alice_token, bob_token, _, _) = scoped_db(&tmp);
        db.execute("CREATE TABLE shared (id INT PRIMARY)", Some(&alice_token)).unwrap();
        db.execute("INSERT INTO shared (id) VALUES (1)", Some(&alice_token)).unwrap();
        assert_eq!(rows(db.execute("SELECT * FROM shared", Some(&bob_token)).unwrap()).len(), 1);
    }

    #[test]
    fn join_applies_left_side_ownership() {
        let tmp = TempDir::new().unwrap();
        let (mut db, alice_token, bob_token, _, _) = scoped_db(&tmp);
        db.execute("CREATE TABLE tags (note_id INT PRIMARY, label STRING)", Some(&alice_token)).unwrap();
        for (id, label) in [(1, "red"), (2, "blue"), (3, "green")] {
            db.execute(
                &format!("INSERT INTO tags (note_id, label) VALUES ({id}, '{label}')"),
                Some(&alice_token),
            )
            .unwrap();
        }
        let out = rows(db
            .execute("SELECT * FROM notes JOIN tags ON id = note_id", Some(&alice_token))
            .unwrap());
        assert_eq!(out.len(), 2);
        let out = rows(db
            .execute("SELECT * FROM notes JOIN tags ON id = note_id", Some(&bob_token))
            .unwrap());
        assert_eq!(out.len(), 1);
        assert_eq!(field(&out[0], "tags.label"), Some(&Value::Str("green".into())));
    }
}
