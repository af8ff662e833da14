//! Database handle
//!
//! A [`Database`] owns the session of one named database together with the
//! model registry bound to it. Transaction operations are pass-through calls
//! to the session; driver errors are returned as they come.

use crate::database::core::{quote_ident, DatabaseSettings, SchemaManager};
use crate::database::error::{DatabaseError, DbResult};
use crate::database::model::{Model, ModelRegistry};
use crate::database::session::{Session, SessionGuard};
use crate::events::EventBus;
use crate::plugin::Owner;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{ToSql, Value};
use rusqlite::params_from_iter;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// One named database: connection, session and bound record classes
///
/// Handles are created by the directory only. The session is used by one
/// unit of work at a time; every operation takes the session lock for its
/// duration, and [`Database::session`] holds it for longer sequences.
pub struct Database {
    name: String,
    url: String,
    description: String,
    owner: Owner,
    registered_at: DateTime<Utc>,
    session: Mutex<Session>,
    models: ModelRegistry,
}

/// Serializable summary of a handle, used for listings
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct DatabaseInfo {
    pub name: String,
    pub description: String,
    pub url: String,
    pub owner: String,
    pub models: usize,
    pub registered_at: String,
}

impl Database {
    pub(crate) fn open(
        name: &str,
        url: &str,
        description: &str,
        owner: Owner,
        settings: &DatabaseSettings,
        events: &EventBus,
    ) -> DbResult<Arc<Self>> {
        let session = Session::open(name, url, settings)?;
        Ok(Arc::new_cyclic(|weak| Self {
            name: name.to_string(),
            url: url.to_string(),
            description: description.to_string(),
            owner: owner.clone(),
            registered_at: Utc::now(),
            session: Mutex::new(session),
            models: ModelRegistry::new(weak.clone(), name, owner, events.clone()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Record classes bound to this database
    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn info(&self) -> DatabaseInfo {
        DatabaseInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            owner: self.owner.to_string(),
            models: self.models.len(),
            registered_at: self.registered_at.to_rfc3339(),
        }
    }

    /// Exclusive access to the session until the guard is dropped
    pub fn session(&self) -> SessionGuard<'_> {
        self.session.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.session.lock().is_closed()
    }

    pub fn in_transaction(&self) -> bool {
        self.session.lock().in_transaction()
    }

    /// Create the tables of every registered record class
    ///
    /// Refused while a transaction is pending, since a later rollback would
    /// drop the new tables as well.
    pub fn create_all(&self) -> DbResult<()> {
        let schemas = self.models.schemas();
        let session = self.session.lock();
        if session.in_transaction() {
            return Err(DatabaseError::Schema(format!(
                "Can not create tables of {} inside a pending transaction",
                self.name
            )));
        }
        SchemaManager::new(session.connection()?).create_all(&schemas)
    }

    pub fn commit(&self) -> DbResult<()> {
        self.session.lock().commit()
    }

    pub fn rollback(&self) -> DbResult<()> {
        self.session.lock().rollback()
    }

    /// Close the session; the handle stays registered but inert
    pub fn close(&self) -> DbResult<()> {
        self.session.lock().close()
    }

    /// Write `record` in the current transaction
    ///
    /// A record without a primary key is inserted and receives one. A record
    /// with a key replaces the stored row, or is inserted under that key.
    pub fn add<M: Model>(&self, record: &mut M) -> DbResult<()> {
        self.ensure_registered::<M>()?;
        let schema = M::schema();
        let columns: Vec<String> = schema.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let table = quote_ident(&schema.table);
        let pk = quote_ident(&schema.primary_key);
        let values = record.values();

        let session = self.session.lock();
        let conn = session.writer()?;

        match record.id() {
            None => {
                let placeholders: Vec<String> =
                    (1..=columns.len()).map(|i| format!("?{}", i)).collect();
                let sql = if columns.is_empty() {
                    format!("INSERT INTO {} DEFAULT VALUES", table)
                } else {
                    format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        table,
                        columns.join(", "),
                        placeholders.join(", ")
                    )
                };
                conn.execute_with_params(&sql, params_from_iter(values.iter()))?;
                record.set_id(conn.conn.last_insert_rowid());
            }
            Some(id) => {
                let mut params = vec![Value::Integer(id)];
                params.extend(values);
                let mut all_columns = vec![pk];
                all_columns.extend(columns);
                let placeholders: Vec<String> =
                    (1..=all_columns.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                    table,
                    all_columns.join(", "),
                    placeholders.join(", ")
                );
                conn.execute_with_params(&sql, params_from_iter(params.iter()))?;
            }
        }
        Ok(())
    }

    /// Delete the stored row of `record` in the current transaction
    ///
    /// Returns false when the record was never added or is already gone.
    pub fn delete<M: Model>(&self, record: &M) -> DbResult<bool> {
        self.ensure_registered::<M>()?;
        let Some(id) = record.id() else {
            return Ok(false);
        };
        let schema = M::schema();
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(&schema.table),
            quote_ident(&schema.primary_key)
        );

        let session = self.session.lock();
        let deleted = session.writer()?.execute_with_params(&sql, [id])?;
        Ok(deleted > 0)
    }

    /// Start a query over the stored records of `M`
    pub fn query<M: Model>(&self) -> DbResult<Query<'_, M>> {
        self.ensure_registered::<M>()?;
        Ok(Query {
            database: self,
            filters: Vec::new(),
            _model: PhantomData,
        })
    }

    fn ensure_registered<M: Model>(&self) -> DbResult<()> {
        if self.models.contains::<M>() {
            Ok(())
        } else {
            Err(DatabaseError::ModelNotRegistered {
                model: M::NAME.to_string(),
                database: self.name.clone(),
            })
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("description", &self.description)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Equality filters over one record type
pub struct Query<'a, M: Model> {
    database: &'a Database,
    filters: Vec<(String, Box<dyn ToSql + 'a>)>,
    _model: PhantomData<M>,
}

impl<'a, M: Model> Query<'a, M> {
    /// Keep records whose `column` equals `value`
    pub fn filter_by(mut self, column: &str, value: impl ToSql + 'a) -> Self {
        self.filters.push((column.to_string(), Box::new(value)));
        self
    }

    pub fn all(&self) -> DbResult<Vec<M>> {
        self.fetch(None)
    }

    pub fn first(&self) -> DbResult<Option<M>> {
        Ok(self.fetch(Some(1))?.into_iter().next())
    }

    pub fn count(&self) -> DbResult<u64> {
        let schema = M::schema();
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            quote_ident(&schema.table),
            self.where_clause()
        );
        let session = self.database.session.lock();
        let count = session.connection()?.query_row(
            &sql,
            params_from_iter(self.filters.iter().map(|(_, v)| v)),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn fetch(&self, limit: Option<u32>) -> DbResult<Vec<M>> {
        let schema = M::schema();
        let columns: Vec<String> = schema
            .column_names()
            .into_iter()
            .map(quote_ident)
            .collect();
        let mut sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}",
            columns.join(", "),
            quote_ident(&schema.table),
            self.where_clause(),
            quote_ident(&schema.primary_key)
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let session = self.database.session.lock();
        let mut stmt = session.connection()?.prepare(&sql)?;
        let records = stmt
            .query_map(
                params_from_iter(self.filters.iter().map(|(_, v)| v)),
                M::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn where_clause(&self) -> String {
        if self.filters.is_empty() {
            return String::new();
        }
        let conditions: Vec<String> = self
            .filters
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", quote_ident(column), i + 1))
            .collect();
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::model::tests::{Group, User};

    fn open_memory(name: &str) -> Arc<Database> {
        Database::open(
            name,
            "sqlite:///:memory:",
            "test_database",
            Owner::Application,
            &DatabaseSettings::default(),
            &EventBus::new(),
        )
        .unwrap()
    }

    fn user_db() -> Arc<Database> {
        let db = open_memory("my_db");
        db.models().register::<User>(None).unwrap();
        db.create_all().unwrap();
        db
    }

    #[test]
    fn test_open_bad_url() {
        let result = Database::open(
            "bad",
            "mysql://localhost/db",
            "",
            Owner::Application,
            &DatabaseSettings::default(),
            &EventBus::new(),
        );
        assert!(matches!(result, Err(DatabaseError::Connection { .. })));
    }

    #[test]
    fn test_accessors() {
        let db = open_memory("my_db");
        assert_eq!(db.name(), "my_db");
        assert_eq!(db.url(), "sqlite:///:memory:");
        assert_eq!(db.description(), "test_database");
        assert_eq!(db.owner(), &Owner::Application);

        let info = db.info();
        assert_eq!(info.owner, "application");
        assert_eq!(info.models, 0);
    }

    #[test]
    fn test_read_your_writes_then_rollback() {
        let db = user_db();
        assert!(db
            .query::<User>()
            .unwrap()
            .filter_by("name", "test")
            .first()
            .unwrap()
            .is_none());

        let mut user = User::new("test", "Test Test", "password");
        db.add(&mut user).unwrap();
        assert!(user.id.is_some());
        assert!(db.in_transaction());

        let found = db
            .query::<User>()
            .unwrap()
            .filter_by("name", "test")
            .first()
            .unwrap();
        assert_eq!(found, Some(user.clone()));

        db.rollback().unwrap();
        let found = db
            .query::<User>()
            .unwrap()
            .filter_by("name", "test")
            .first()
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_commit_and_delete() {
        let db = user_db();
        let mut user = User::new("test", "Test Test", "password");
        db.add(&mut user).unwrap();
        db.commit().unwrap();
        assert!(!db.in_transaction());
        assert_eq!(db.query::<User>().unwrap().count().unwrap(), 1);

        assert!(db.delete(&user).unwrap());
        db.commit().unwrap();
        assert!(db
            .query::<User>()
            .unwrap()
            .filter_by("name", "test")
            .first()
            .unwrap()
            .is_none());
        assert!(!db.delete(&user).unwrap());
        assert!(!db.delete(&User::new("x", "y", "z")).unwrap());
    }

    #[test]
    fn test_add_existing_record_updates() {
        let db = user_db();
        let mut user = User::new("test", "Test Test", "password");
        db.add(&mut user).unwrap();
        let id = user.id;

        user.fullname = Some("Renamed".to_string());
        db.add(&mut user).unwrap();
        db.commit().unwrap();

        let all = db.query::<User>().unwrap().all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].fullname.as_deref(), Some("Renamed"));
    }

    #[test]
    fn test_filters_combine() {
        let db = user_db();
        for (name, fullname) in [("a", "A"), ("b", "B"), ("a", "Other")] {
            db.add(&mut User::new(name, fullname, "pw")).unwrap();
        }
        let query = db.query::<User>().unwrap().filter_by("name", "a");
        assert_eq!(query.count().unwrap(), 2);
        let matched = query.filter_by("fullname", "Other").all().unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "a");
    }

    #[test]
    fn test_unregistered_model() {
        let db = user_db();
        let err = db.add(&mut Group { id: None, title: "g".into() }).unwrap_err();
        assert!(matches!(err, DatabaseError::ModelNotRegistered { .. }));
        assert!(db.query::<Group>().is_err());
    }

    #[test]
    fn test_driver_error_surfaces() {
        let db = open_memory("my_db");
        db.models().register::<User>(None).unwrap();
        // table was never created
        let err = db.add(&mut User::new("a", "b", "c")).unwrap_err();
        assert!(matches!(err, DatabaseError::Driver(_)));
    }

    #[test]
    fn test_create_all_conflicting_classes() {
        let db = open_memory("my_db");

        struct OtherUser;
        impl Model for OtherUser {
            const NAME: &'static str = "OtherUser";
            fn schema() -> crate::database::core::TableSchema {
                crate::database::core::TableSchema::new("users")
            }
            fn id(&self) -> Option<i64> {
                None
            }
            fn set_id(&mut self, _id: i64) {}
            fn values(&self) -> Vec<Value> {
                Vec::new()
            }
            fn from_row(_row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
                Ok(OtherUser)
            }
        }

        db.models().register::<User>(None).unwrap();
        db.models().register::<OtherUser>(None).unwrap();
        assert!(matches!(db.create_all(), Err(DatabaseError::Schema(_))));
    }

    #[test]
    fn test_close_makes_handle_inert() {
        let db = user_db();
        db.add(&mut User::new("a", "b", "c")).unwrap();
        db.close().unwrap();
        assert!(db.is_closed());
        assert!(matches!(db.commit(), Err(DatabaseError::Closed(_))));
        assert!(matches!(
            db.query::<User>().unwrap().all(),
            Err(DatabaseError::Closed(_))
        ));
        db.close().unwrap();
    }

    #[test]
    fn test_create_all_refused_in_transaction() {
        let db = user_db();
        db.add(&mut User::new("test", "Test Test", "password")).unwrap();
        db.models().register::<Group>(None).unwrap();
        assert!(matches!(db.create_all(), Err(DatabaseError::Schema(_))));

        db.rollback().unwrap();
        db.create_all().unwrap();
        db.rollback().unwrap();
        assert!(db.session().conn().unwrap().table_exists("groups").unwrap());
    }

    #[test]
    fn test_session_guard_raw_access() {
        let db = user_db();
        let session = db.session();
        let conn = session.conn().unwrap();
        assert!(conn.table_exists("users").unwrap());
        assert_eq!(conn.table_count("users").unwrap(), 0);
    }
}
