//! Generic data-access façade.
//!
//! [`DbManager`] runs every operation in its own session: it checks out a
//! pooled connection, opens a transaction, does the work under the configured
//! timeout, then commits (mutations that succeeded) or rolls back (reads and
//! failures). Returned records are plain values with no tie to the session.

use crate::db::loader::{self, column_kinds};
use crate::db::pool::SessionProvider;
use crate::db::session::Session;
use crate::db::sql::{self, Join, OnConflict};
use crate::error::{DbError, DbResult};
use crate::models::{Entity, Fields, Filter, Key, Loaded, Record, Related, RelationKind, TableMeta, Value};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// An arbitrary SQL statement with positional parameters.
///
/// Placeholders follow the backend: `$1, $2, ...` for PostgreSQL, `?` for
/// SQLite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl RawQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// How a session ends when its work succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Finish {
    Read,
    Write,
}

/// Entity-agnostic CRUD, join and upsert operations.
#[derive(Debug, Clone)]
pub struct DbManager {
    provider: Arc<SessionProvider>,
    timeout: Duration,
}

impl DbManager {
    /// Manager using the provider's configured query timeout.
    pub fn new(provider: Arc<SessionProvider>) -> Self {
        let timeout = provider.settings().query_timeout_duration();
        Self { provider, timeout }
    }

    /// Manager configured from the environment.
    pub fn from_env() -> DbResult<Self> {
        Ok(Self::new(Arc::new(SessionProvider::from_env()?)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> &Arc<SessionProvider> {
        &self.provider
    }

    // =========================================================================
    // Session envelope
    // =========================================================================

    pub(crate) async fn session(&self) -> DbResult<Session> {
        let mut session = self.provider.get_session().await?;
        if let Err(err) = session.set_statement_timeout(self.timeout).await {
            self.discard(session);
            return Err(err);
        }
        Ok(session)
    }

    /// Roll back in the background. The connection may still be busy with a
    /// statement that is being cancelled, so the caller does not wait for it.
    fn discard(&self, session: Session) {
        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move {
            let session_id = session.id();
            if let Err(err) = provider.close_session(session).await {
                warn!(%session_id, error = %err, "Rollback failed");
            }
        });
    }

    /// Run `work` under the query timeout.
    pub(crate) async fn bounded<R>(
        &self,
        operation: &str,
        work: impl Future<Output = DbResult<R>>,
    ) -> DbResult<R> {
        let start = Instant::now();
        match tokio::time::timeout(self.timeout, work).await {
            Ok(Err(err)) if err.is_statement_cancelled() => {
                warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Statement cancelled at deadline"
                );
                Err(DbError::timeout(operation, self.timeout))
            }
            Ok(result) => {
                debug!(
                    operation,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "Operation finished"
                );
                result
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Operation timed out"
                );
                Err(DbError::timeout(operation, self.timeout))
            }
        }
    }

    /// Commit successful writes; roll back everything else.
    pub(crate) async fn finish<R>(
        &self,
        session: Session,
        result: DbResult<R>,
        finish: Finish,
    ) -> DbResult<R> {
        match result {
            Ok(value) if finish == Finish::Write => {
                session.commit().await?;
                Ok(value)
            }
            Ok(value) => {
                self.provider.close_session(session).await?;
                Ok(value)
            }
            Err(err @ DbError::Timeout { .. }) => {
                self.discard(session);
                Err(err)
            }
            Err(err) => {
                let session_id = session.id();
                if let Err(rollback_err) = self.provider.close_session(session).await {
                    warn!(%session_id, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch one row by primary key.
    pub async fn get<T: Entity>(&self, id: impl Into<Key>) -> DbResult<T> {
        Ok(self.get_loaded::<T>(id, &Related::None).await?.into_inner())
    }

    /// Fetch one row by primary key with the selected relationships.
    ///
    /// Zero matches is [`DbError::NotFound`]; more than one is
    /// [`DbError::MultipleRows`].
    pub async fn get_loaded<T: Entity>(
        &self,
        id: impl Into<Key>,
        related: &Related,
    ) -> DbResult<Loaded<T>> {
        let id = id.into();
        let mut session = self.session().await?;
        let result = self
            .bounded("get", Self::get_in::<T>(&mut session, &id, related))
            .await;
        self.finish(session, result, Finish::Read).await
    }

    pub(crate) async fn get_in<T: Entity>(
        session: &mut Session,
        id: &Key,
        related: &Related,
    ) -> DbResult<Loaded<T>> {
        let meta = T::meta();
        let filters = sql::key_filter(meta, id)?;
        let mut rows = Self::load_in::<T>(session, &filters, related, Some(2)).await?;
        match rows.len() {
            0 => Err(DbError::not_found(meta.name, id.to_string())),
            1 => Ok(rows.remove(0)),
            _ => Err(DbError::multiple_rows(meta.name, id.to_string())),
        }
    }

    /// All rows matching every filter, ordered by primary key.
    pub async fn find_records<T: Entity>(&self, filters: &[Filter]) -> DbResult<Vec<T>> {
        Ok(self
            .find_records_loaded::<T>(filters, &Related::None)
            .await?
            .into_iter()
            .map(Loaded::into_inner)
            .collect())
    }

    pub async fn find_records_loaded<T: Entity>(
        &self,
        filters: &[Filter],
        related: &Related,
    ) -> DbResult<Vec<Loaded<T>>> {
        let mut session = self.session().await?;
        let result = self
            .bounded(
                "find_records",
                Self::load_in::<T>(&mut session, filters, related, None),
            )
            .await;
        self.finish(session, result, Finish::Read).await
    }

    /// The first matching row by primary key order, if any.
    pub async fn find_first_record<T: Entity>(&self, filters: &[Filter]) -> DbResult<Option<T>> {
        Ok(self
            .find_first_record_loaded::<T>(filters, &Related::None)
            .await?
            .map(Loaded::into_inner))
    }

    pub async fn find_first_record_loaded<T: Entity>(
        &self,
        filters: &[Filter],
        related: &Related,
    ) -> DbResult<Option<Loaded<T>>> {
        let mut session = self.session().await?;
        let result = self
            .bounded(
                "find_first_record",
                Self::load_in::<T>(&mut session, filters, related, Some(1)),
            )
            .await;
        let rows = self.finish(session, result, Finish::Read).await?;
        Ok(rows.into_iter().next())
    }

    pub(crate) async fn select_in(
        session: &mut Session,
        meta: &'static TableMeta,
        filters: &[Filter],
        limit: Option<u32>,
    ) -> DbResult<Vec<Record>> {
        let stmt = sql::select(session.db_type(), meta, filters, limit)?;
        let rows = session.fetch(&stmt, &column_kinds(meta)).await?;
        Ok(rows
            .into_iter()
            .map(|values| Record::from_values(meta, values))
            .collect())
    }

    async fn load_in<T: Entity>(
        session: &mut Session,
        filters: &[Filter],
        related: &Related,
        limit: Option<u32>,
    ) -> DbResult<Vec<Loaded<T>>> {
        let meta = T::meta();
        let relations = loader::resolve(meta, related)?;
        let rows = Self::select_in(session, meta, filters, limit).await?;
        let related_rows = loader::load(session, meta, &rows, &relations).await?;

        rows.into_iter()
            .zip(related_rows)
            .map(|(row, related)| {
                Ok(Loaded {
                    record: T::from_record(row)?,
                    related,
                })
            })
            .collect()
    }

    // =========================================================================
    // Joins
    // =========================================================================

    /// Inner join of `A` and `B`, related through a declared relationship.
    pub async fn find_join_records2<A: Entity, B: Entity>(
        &self,
        filters: &[Filter],
    ) -> DbResult<Vec<(A, B)>> {
        let mut session = self.session().await?;
        let result = self
            .bounded(
                "find_join_records2",
                Self::join2_in::<A, B>(&mut session, filters),
            )
            .await;
        self.finish(session, result, Finish::Read).await
    }

    async fn join2_in<A: Entity, B: Entity>(
        session: &mut Session,
        filters: &[Filter],
    ) -> DbResult<Vec<(A, B)>> {
        let (a, b) = (A::meta(), B::meta());
        let join = infer_join(&[a], b)?;
        let stmt = sql::select_join(session.db_type(), a, &[join], filters, false)?;

        let mut kinds = column_kinds(a);
        kinds.extend(column_kinds(b));
        let rows = session.fetch(&stmt, &kinds).await?;

        rows.into_iter()
            .map(|mut values| {
                let right = values.split_off(a.columns.len());
                Ok((
                    A::from_record(Record::from_values(a, values))?,
                    B::from_record(Record::from_values(b, right))?,
                ))
            })
            .collect()
    }

    /// Three-way join. `B` joins `A`; `C` joins `A` when they are related,
    /// otherwise `B`.
    ///
    /// With `outer` both joins are `LEFT OUTER` and a missing side comes back
    /// as `None`; inner joins always yield `Some`.
    pub async fn find_join_records3<A: Entity, B: Entity, C: Entity>(
        &self,
        filters: &[Filter],
        outer: bool,
    ) -> DbResult<Vec<(A, Option<B>, Option<C>)>> {
        let mut session = self.session().await?;
        let result = self
            .bounded(
                "find_join_records3",
                Self::join3_in::<A, B, C>(&mut session, filters, outer),
            )
            .await;
        self.finish(session, result, Finish::Read).await
    }

    async fn join3_in<A: Entity, B: Entity, C: Entity>(
        session: &mut Session,
        filters: &[Filter],
        outer: bool,
    ) -> DbResult<Vec<(A, Option<B>, Option<C>)>> {
        let (a, b, c) = (A::meta(), B::meta(), C::meta());
        let joins = [infer_join(&[a], b)?, infer_join(&[a, b], c)?];
        let stmt = sql::select_join(session.db_type(), a, &joins, filters, outer)?;

        let mut kinds = column_kinds(a);
        kinds.extend(column_kinds(b));
        kinds.extend(column_kinds(c));
        let rows = session.fetch(&stmt, &kinds).await?;

        rows.into_iter()
            .map(|mut values| {
                let mut second = values.split_off(a.columns.len());
                let third = second.split_off(b.columns.len());
                Ok((
                    A::from_record(Record::from_values(a, values))?,
                    optional::<B>(Record::from_values(b, second))?,
                    optional::<C>(Record::from_values(c, third))?,
                ))
            })
            .collect()
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Update one row by primary key. Returns the number of rows changed.
    pub async fn update_record<T: Entity>(
        &self,
        id: impl Into<Key>,
        fields: &Fields,
    ) -> DbResult<u64> {
        let filters = sql::key_filter(T::meta(), &id.into())?;
        self.update_records::<T>(&filters, fields).await
    }

    /// Update every row matching `filters`.
    pub async fn update_records<T: Entity>(
        &self,
        filters: &[Filter],
        fields: &Fields,
    ) -> DbResult<u64> {
        let meta = T::meta();
        let mut session = self.session().await?;
        let result = self
            .bounded("update_records", async {
                let stmt = sql::update(session.db_type(), meta, fields, filters)?;
                session.execute(&stmt).await
            })
            .await;
        let rows = self.finish(session, result, Finish::Write).await?;
        info!(table = meta.name, rows, "Updated rows");
        Ok(rows)
    }

    // =========================================================================
    // Inserts
    // =========================================================================

    /// Insert one row and return it as stored.
    pub async fn create_record<T: Entity>(&self, record: &T) -> DbResult<T> {
        self.create_records(std::slice::from_ref(record))
            .await?
            .pop()
            .ok_or_else(|| DbError::internal(format!("insert into '{}' returned no row", T::table())))
    }

    /// Insert rows in one transaction and return them as stored.
    pub async fn create_records<T: Entity>(&self, records: &[T]) -> DbResult<Vec<T>> {
        let mut session = self.session().await?;
        let result = self
            .bounded(
                "create_records",
                Self::insert_in(&mut session, records, OnConflict::Fail),
            )
            .await;
        let created = self.finish(session, result, Finish::Write).await?;
        info!(table = T::table(), rows = created.len(), "Created rows");
        Ok(created)
    }

    /// Insert rows, silently skipping each one that collides with an existing
    /// key or unique constraint. Returns how many were inserted.
    pub async fn create_or_ignore<T: Entity>(&self, records: &[T]) -> DbResult<u64> {
        let mut session = self.session().await?;
        let result = self
            .bounded(
                "create_or_ignore",
                Self::insert_in(&mut session, records, OnConflict::Ignore),
            )
            .await;
        let inserted = self.finish(session, result, Finish::Write).await?.len() as u64;
        info!(
            table = T::table(),
            inserted,
            skipped = records.len() as u64 - inserted,
            "Created rows, ignoring conflicts"
        );
        Ok(inserted)
    }

    /// Insert rows, overwriting every column of rows whose primary key
    /// already exists. Returns the rows as stored.
    pub async fn upsert_records<T: Entity>(&self, records: &[T]) -> DbResult<Vec<T>> {
        let mut session = self.session().await?;
        let result = self
            .bounded(
                "upsert_records",
                Self::insert_in(&mut session, records, OnConflict::Update),
            )
            .await;
        let stored = self.finish(session, result, Finish::Write).await?;
        info!(table = T::table(), rows = stored.len(), "Upserted rows");
        Ok(stored)
    }

    async fn insert_in<T: Entity>(
        session: &mut Session,
        records: &[T],
        on_conflict: OnConflict,
    ) -> DbResult<Vec<T>> {
        let meta = T::meta();
        let kinds = column_kinds(meta);
        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            let stmt = sql::insert(session.db_type(), meta, &record.to_record(), on_conflict)?;
            for values in session.fetch(&stmt, &kinds).await? {
                stored.push(T::from_record(Record::from_values(meta, values))?);
            }
        }
        Ok(stored)
    }

    // =========================================================================
    // Deletes
    // =========================================================================

    /// Delete one row by primary key with a single statement.
    pub async fn delete_record<T: Entity>(&self, id: impl Into<Key>) -> DbResult<u64> {
        let meta = T::meta();
        let filters = sql::key_filter(meta, &id.into())?;
        let mut session = self.session().await?;
        let result = self
            .bounded("delete_record", async {
                let stmt = sql::delete(session.db_type(), meta, &filters)?;
                session.execute(&stmt).await
            })
            .await;
        let rows = self.finish(session, result, Finish::Write).await?;
        info!(table = meta.name, rows, "Deleted rows");
        Ok(rows)
    }

    /// Load the matching rows, then delete each one by key.
    ///
    /// Returns the rows as they were before deletion, with the selected
    /// relationships loaded.
    pub async fn delete_records<T: Entity>(
        &self,
        filters: &[Filter],
        related: &Related,
    ) -> DbResult<Vec<Loaded<T>>> {
        let mut session = self.session().await?;
        let result = self
            .bounded("delete_records", async {
                let rows = Self::load_in::<T>(&mut session, filters, related, None).await?;
                for row in &rows {
                    let key_filters = sql::key_filter(T::meta(), &row.get_id())?;
                    let stmt = sql::delete(session.db_type(), T::meta(), &key_filters)?;
                    session.execute(&stmt).await?;
                }
                Ok(rows)
            })
            .await;
        let deleted = self.finish(session, result, Finish::Write).await?;
        info!(table = T::table(), rows = deleted.len(), "Deleted rows");
        Ok(deleted)
    }

    // =========================================================================
    // Raw SQL
    // =========================================================================

    /// Run an arbitrary statement and return its rows as JSON objects.
    ///
    /// The session is always rolled back.
    pub async fn execute_sql_query(
        &self,
        query: &RawQuery,
    ) -> DbResult<Vec<serde_json::Map<String, JsonValue>>> {
        let mut session = self.session().await?;
        let result = self
            .bounded(
                "execute_sql_query",
                session.fetch_json(&query.sql, &query.params),
            )
            .await;
        self.finish(session, result, Finish::Read).await
    }
}

/// `None` for the all-NULL side of an outer join.
fn optional<T: Entity>(record: Record) -> DbResult<Option<T>> {
    let meta = T::meta();
    if record.key(meta).values().iter().all(Value::is_null) {
        return Ok(None);
    }
    T::from_record(record).map(Some)
}

/// Find how `right` joins one of `tables`, trying them in order.
///
/// Relationships declared on the already-joined table win over the reverse
/// direction. Two different column pairs for the same table are ambiguous.
fn infer_join(tables: &[&'static TableMeta], right: &'static TableMeta) -> DbResult<Join> {
    for (left, meta) in tables.iter().enumerate() {
        if let Some((left_column, right_column)) = join_columns(*meta, right)? {
            return Ok(Join {
                meta: right,
                left,
                left_column,
                right_column,
            });
        }
    }
    Err(DbError::invalid_input(format!(
        "no relationship joins '{}' to {}",
        right.name,
        tables
            .iter()
            .map(|t| format!("'{}'", t.name))
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

fn join_columns(
    left: &'static TableMeta,
    right: &'static TableMeta,
) -> DbResult<Option<(&'static str, &'static str)>> {
    let direct = |from: &'static TableMeta, to: &'static TableMeta| -> Vec<(&'static str, &'static str)> {
        from.relations
            .iter()
            .filter(|r| r.target().name == to.name)
            .filter_map(|r| match r.kind {
                RelationKind::BelongsTo { local, remote } | RelationKind::HasMany { local, remote } => {
                    Some((local, remote))
                }
                RelationKind::ManyToMany { .. } => None,
            })
            .collect()
    };

    let mut pairs = direct(left, right);
    if pairs.is_empty() {
        pairs = direct(right, left)
            .into_iter()
            .map(|(local, remote)| (remote, local))
            .collect();
    }
    pairs.sort_unstable();
    pairs.dedup();

    match pairs.as_slice() {
        [] => Ok(None),
        [pair] => Ok(Some(*pair)),
        _ => Err(DbError::invalid_input(format!(
            "'{}' and '{}' are related in more than one way",
            left.name, right.name
        ))),
    }
}
