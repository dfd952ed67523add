//! SQL statement rendering.
//!
//! Statements are rendered from table metadata and [`Filter`] trees. Every
//! value travels as a bound parameter; identifiers are always quoted.
//! SELECTs alias their tables `t0`, `t1`, ... in join order, while UPDATE and
//! DELETE qualify columns with the quoted table name.

use crate::db::DatabaseType;
use crate::error::{DbError, DbResult};
use crate::models::value::strip_qualifier;
use crate::models::{Column, ColumnKind, ColumnRef, CompareOp, Fields, Filter, Key, Record, TableMeta, Value};

/// A bound statement parameter with the kind of the column it targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub value: Value,
    pub kind: Option<ColumnKind>,
}

/// Rendered SQL plus its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

/// Conflict policy for INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Surface the constraint violation.
    Fail,
    /// `ON CONFLICT DO NOTHING`
    Ignore,
    /// Overwrite the existing row's columns, keyed by the primary key.
    Update,
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Tables visible to a statement and the prefix used to qualify their columns.
pub(crate) struct Scope {
    entries: Vec<(&'static TableMeta, String)>,
}

impl Scope {
    /// `t0`, `t1`, ... in the given order.
    pub fn aliased(tables: &[&'static TableMeta]) -> DbResult<Self> {
        for (i, meta) in tables.iter().enumerate() {
            if tables[..i].iter().any(|m| m.name == meta.name) {
                return Err(DbError::invalid_input(format!(
                    "table '{}' appears more than once in the join",
                    meta.name
                )));
            }
        }
        Ok(Self {
            entries: tables
                .iter()
                .enumerate()
                .map(|(i, meta)| (*meta, format!("t{}", i)))
                .collect(),
        })
    }

    /// Columns qualified with the quoted table name.
    pub fn qualified(meta: &'static TableMeta) -> Self {
        Self {
            entries: vec![(meta, quote_ident(meta.name))],
        }
    }

    fn resolve(&self, column: &ColumnRef) -> DbResult<(String, &'static Column)> {
        let (meta, prefix) = self
            .entries
            .iter()
            .find(|(meta, _)| meta.name == column.table)
            .ok_or_else(|| {
                DbError::invalid_input(format!(
                    "table '{}' is not part of this query",
                    column.table
                ))
            })?;
        let col = meta.require_column(column.name)?;
        Ok((format!("{}.{}", prefix, quote_ident(col.name)), col))
    }
}

/// Incremental statement builder that numbers placeholders per backend.
pub(crate) struct SqlBuilder {
    db: DatabaseType,
    sql: String,
    params: Vec<Param>,
}

impl SqlBuilder {
    pub fn new(db: DatabaseType) -> Self {
        Self {
            db,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_ident(&mut self, ident: &str) -> &mut Self {
        self.sql.push_str(&quote_ident(ident));
        self
    }

    pub fn push_bind(&mut self, value: Value, kind: Option<ColumnKind>) -> &mut Self {
        self.params.push(Param { value, kind });
        let placeholder = self.db.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// `prefix."a", prefix."b", ...` for every column of `meta`.
    pub fn push_columns(&mut self, prefix: Option<&str>, meta: &TableMeta) -> &mut Self {
        for (i, column) in meta.columns.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            if let Some(prefix) = prefix {
                self.sql.push_str(prefix);
                self.sql.push('.');
            }
            self.push_ident(column.name);
        }
        self
    }

    /// ` WHERE a AND b`, or nothing for an empty conjunction.
    pub fn push_where(&mut self, scope: &Scope, filters: &[Filter]) -> DbResult<()> {
        if filters.is_empty() {
            return Ok(());
        }
        self.push(" WHERE ");
        for (i, filter) in filters.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.push_filter(scope, filter)?;
        }
        Ok(())
    }

    pub fn push_filter(&mut self, scope: &Scope, filter: &Filter) -> DbResult<()> {
        match filter {
            Filter::Literal(true) => {
                self.push("1 = 1");
            }
            Filter::Literal(false) => {
                self.push("1 = 0");
            }
            Filter::Compare { column, op, value } => {
                let (sql, col) = scope.resolve(column)?;
                match (op, value) {
                    (CompareOp::Eq, Value::Null) => {
                        self.push(&sql).push(" IS NULL");
                    }
                    (CompareOp::Ne, Value::Null) => {
                        self.push(&sql).push(" IS NOT NULL");
                    }
                    _ => {
                        let value = coerce(column.table, col, value.clone())?;
                        self.push(&sql).push(" ").push(op.sql()).push(" ");
                        self.push_bind(value, Some(col.kind));
                    }
                }
            }
            Filter::IsNull(column) => {
                let (sql, _) = scope.resolve(column)?;
                self.push(&sql).push(" IS NULL");
            }
            Filter::IsNotNull(column) => {
                let (sql, _) = scope.resolve(column)?;
                self.push(&sql).push(" IS NOT NULL");
            }
            Filter::In { column, values } => {
                let (sql, col) = scope.resolve(column)?;
                if values.is_empty() {
                    self.push("1 = 0");
                    return Ok(());
                }
                self.push(&sql).push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    let value = coerce(column.table, col, value.clone())?;
                    self.push_bind(value, Some(col.kind));
                }
                self.push(")");
            }
            Filter::Like { column, pattern } => {
                let (sql, _) = scope.resolve(column)?;
                self.push(&sql).push(" LIKE ");
                self.push_bind(Value::Text(pattern.clone()), Some(ColumnKind::Text));
            }
            Filter::And(parts) => self.push_group(scope, parts, " AND ", "1 = 1")?,
            Filter::Or(parts) => self.push_group(scope, parts, " OR ", "1 = 0")?,
            Filter::Not(inner) => {
                self.push("NOT (");
                self.push_filter(scope, inner)?;
                self.push(")");
            }
        }
        Ok(())
    }

    fn push_group(
        &mut self,
        scope: &Scope,
        parts: &[Filter],
        joiner: &str,
        empty: &str,
    ) -> DbResult<()> {
        if parts.is_empty() {
            self.push(empty);
            return Ok(());
        }
        self.push("(");
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.push(joiner);
            }
            self.push_filter(scope, part)?;
        }
        self.push(")");
        Ok(())
    }

    fn push_order_by_key(&mut self, prefix: &str, meta: &TableMeta) -> &mut Self {
        self.push(" ORDER BY ");
        for (i, pk) in meta.primary_key.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push(prefix).push(".").push_ident(pk);
        }
        self
    }

    fn push_returning(&mut self, meta: &TableMeta) -> &mut Self {
        self.push(" RETURNING ");
        self.push_columns(None, meta)
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

fn coerce(table: &str, column: &Column, value: Value) -> DbResult<Value> {
    column
        .kind
        .coerce(value)
        .map_err(|reason| DbError::invalid_value(table, column.name, reason))
}

/// Equality filters selecting one row by primary key.
pub fn key_filter(meta: &'static TableMeta, key: &Key) -> DbResult<Vec<Filter>> {
    if key.values().len() != meta.primary_key.len() {
        return Err(DbError::invalid_input(format!(
            "'{}' has a {}-column primary key but {} values were given",
            meta.name,
            meta.primary_key.len(),
            key.values().len()
        )));
    }
    Ok(meta
        .primary_key
        .iter()
        .zip(key.values())
        .map(|(pk, value)| ColumnRef::new(meta.name, pk).eq(value.clone()))
        .collect())
}

/// `SELECT` every column of one table.
pub fn select(
    db: DatabaseType,
    meta: &'static TableMeta,
    filters: &[Filter],
    limit: Option<u32>,
) -> DbResult<Statement> {
    let scope = Scope::aliased(&[meta])?;
    let mut builder = SqlBuilder::new(db);
    builder.push("SELECT ");
    builder.push_columns(Some("t0"), meta);
    builder.push(" FROM ").push_ident(meta.name).push(" AS t0");
    builder.push_where(&scope, filters)?;
    builder.push_order_by_key("t0", meta);
    if let Some(limit) = limit {
        builder.push(&format!(" LIMIT {}", limit));
    }
    Ok(builder.finish())
}

/// One joined table: `meta` is joined on `tN.left_column = meta.right_column`
/// where `N` is `left` (the position of an earlier table).
#[derive(Debug, Clone, Copy)]
pub struct Join {
    pub meta: &'static TableMeta,
    pub left: usize,
    pub left_column: &'static str,
    pub right_column: &'static str,
}

/// `SELECT` the columns of `base` and every joined table, in order.
pub fn select_join(
    db: DatabaseType,
    base: &'static TableMeta,
    joins: &[Join],
    filters: &[Filter],
    outer: bool,
) -> DbResult<Statement> {
    let tables: Vec<&'static TableMeta> = std::iter::once(base)
        .chain(joins.iter().map(|j| j.meta))
        .collect();
    let scope = Scope::aliased(&tables)?;

    let mut builder = SqlBuilder::new(db);
    builder.push("SELECT ");
    for (i, meta) in tables.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push_columns(Some(&format!("t{}", i)), meta);
    }
    builder.push(" FROM ").push_ident(base.name).push(" AS t0");
    for (i, join) in joins.iter().enumerate() {
        let alias = format!("t{}", i + 1);
        if join.left > i {
            return Err(DbError::internal(format!(
                "join {} refers to later table t{}",
                alias, join.left
            )));
        }
        builder.push(if outer { " LEFT OUTER JOIN " } else { " JOIN " });
        builder.push_ident(join.meta.name).push(" AS ").push(&alias);
        builder
            .push(&format!(" ON t{}.", join.left))
            .push_ident(join.left_column)
            .push(" = ")
            .push(&alias)
            .push(".")
            .push_ident(join.right_column);
    }
    builder.push_where(&scope, filters)?;
    builder.push_order_by_key("t0", base);
    Ok(builder.finish())
}

/// Link table hop for many-to-many loading.
#[derive(Debug, Clone, Copy)]
pub struct Through<'a> {
    pub table: &'a str,
    /// Link column pointing at the owning rows.
    pub local: &'a str,
    /// Link column pointing at `target`'s key.
    pub remote: &'a str,
}

/// `SELECT` the rows of `target` linked to any of `owner_keys`, followed by
/// the owning key as an extra trailing column.
pub fn select_through(
    db: DatabaseType,
    target: &'static TableMeta,
    through: Through<'_>,
    owner_keys: &[Value],
    owner_kind: ColumnKind,
) -> DbResult<Statement> {
    let [target_key] = target.primary_key else {
        return Err(DbError::invalid_input(format!(
            "'{}' needs a single-column key to be linked through '{}'",
            target.name, through.table
        )));
    };

    let mut builder = SqlBuilder::new(db);
    builder.push("SELECT ");
    builder.push_columns(Some("t0"), target);
    builder.push(", l.").push_ident(through.local);
    builder.push(" FROM ").push_ident(target.name).push(" AS t0");
    builder.push(" JOIN ").push_ident(through.table).push(" AS l ON l.");
    builder
        .push_ident(through.remote)
        .push(" = t0.")
        .push_ident(target_key);
    if owner_keys.is_empty() {
        builder.push(" WHERE 1 = 0");
    } else {
        builder.push(" WHERE l.").push_ident(through.local).push(" IN (");
        for (i, key) in owner_keys.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push_bind(key.clone(), Some(owner_kind));
        }
        builder.push(")");
    }
    builder.push_order_by_key("t0", target);
    Ok(builder.finish())
}

/// `UPDATE` matching rows, stamping `updated` on audited tables.
pub fn update(
    db: DatabaseType,
    meta: &'static TableMeta,
    fields: &Fields,
    filters: &[Filter],
) -> DbResult<Statement> {
    if fields.is_empty() {
        return Err(DbError::invalid_input(format!(
            "no fields given for update of '{}'",
            meta.name
        )));
    }
    let scope = Scope::qualified(meta);
    let mut builder = SqlBuilder::new(db);
    builder.push("UPDATE ").push_ident(meta.name).push(" SET ");
    for (i, (name, value)) in fields.iter().enumerate() {
        let column = meta.require_column(strip_qualifier(name))?;
        if column.audit {
            return Err(DbError::invalid_input(format!(
                "'{}.{}' is maintained by the store",
                meta.name, column.name
            )));
        }
        if value.is_null() && !column.nullable {
            return Err(DbError::invalid_value(meta.name, column.name, "unexpected NULL"));
        }
        let value = coerce(meta.name, column, value.clone())?;
        if i > 0 {
            builder.push(", ");
        }
        builder.push_ident(column.name).push(" = ");
        builder.push_bind(value, Some(column.kind));
    }
    if let Some(updated) = meta.column("updated").filter(|c| c.audit) {
        builder
            .push(", ")
            .push_ident(updated.name)
            .push(" = ")
            .push(db.utc_now());
    }
    builder.push_where(&scope, filters)?;
    Ok(builder.finish())
}

/// `DELETE` matching rows.
pub fn delete(
    db: DatabaseType,
    meta: &'static TableMeta,
    filters: &[Filter],
) -> DbResult<Statement> {
    let scope = Scope::qualified(meta);
    let mut builder = SqlBuilder::new(db);
    builder.push("DELETE FROM ").push_ident(meta.name);
    builder.push_where(&scope, filters)?;
    Ok(builder.finish())
}

/// Whether a column is left for the store to fill on insert.
fn omitted_on_insert(column: &Column, value: &Value) -> bool {
    column.audit || (column.generated && matches!(value, Value::Null | Value::Int(0)))
}

/// `INSERT` one row and return it as stored.
pub fn insert(
    db: DatabaseType,
    meta: &'static TableMeta,
    record: &Record,
    on_conflict: OnConflict,
) -> DbResult<Statement> {
    let mut builder = SqlBuilder::new(db);
    builder.push("INSERT INTO ").push_ident(meta.name);

    let values: Vec<(&'static Column, Value)> = meta
        .columns
        .iter()
        .map(|c| (c, record.get(c.name).cloned().unwrap_or(Value::Null)))
        .filter(|(c, v)| !omitted_on_insert(c, v))
        .collect();

    if values.is_empty() {
        builder.push(" DEFAULT VALUES");
    } else {
        builder.push(" (");
        for (i, (column, _)) in values.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push_ident(column.name);
        }
        builder.push(") VALUES (");
        for (i, (column, value)) in values.into_iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push_bind(value, Some(column.kind));
        }
        builder.push(")");
    }

    match on_conflict {
        OnConflict::Fail => {}
        OnConflict::Ignore => {
            builder.push(" ON CONFLICT DO NOTHING");
        }
        OnConflict::Update => push_upsert(&mut builder, db, meta),
    }
    builder.push_returning(meta);
    Ok(builder.finish())
}

fn push_upsert(builder: &mut SqlBuilder, db: DatabaseType, meta: &TableMeta) {
    builder.push(" ON CONFLICT (");
    for (i, pk) in meta.primary_key.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push_ident(pk);
    }
    builder.push(") DO UPDATE SET ");

    let mut assignments: Vec<String> = meta
        .columns
        .iter()
        .filter(|c| !c.audit && !meta.is_key(c.name))
        .map(|c| format!("{0} = excluded.{0}", quote_ident(c.name)))
        .collect();
    if let Some(updated) = meta.column("updated").filter(|c| c.audit) {
        assignments.push(format!("{} = {}", quote_ident(updated.name), db.utc_now()));
    }
    if assignments.is_empty() {
        // Pure link rows: nothing to overwrite, but the row must still be returned.
        if let Some(pk) = meta.primary_key.first() {
            assignments.push(format!("{0} = excluded.{0}", quote_ident(pk)));
        }
    }
    builder.push(&assignments.join(", "));
}
