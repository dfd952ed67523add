//! Eager relationship loading.
//!
//! Relationships are loaded with one extra query per relationship (more for
//! very large parent sets) using `IN (...)` over the parent keys, then
//! distributed back to the parents. Nothing is cached between calls.

use crate::db::session::Session;
use crate::db::sql::{self, Through};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnKind, ColumnRef, Filter, Record, Related, Relation, RelationKind, TableMeta, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Upper bound on bound parameters per loading query.
const CHUNK_SIZE: usize = 500;

/// Rows related to one parent, by relationship name.
pub type RelatedRows = BTreeMap<&'static str, Vec<Record>>;

/// Hashable form of a join key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyRepr {
    Int(i64),
    Text(String),
}

impl KeyRepr {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(KeyRepr::Int(*v)),
            Value::Text(v) => Some(KeyRepr::Text(v.clone())),
            _ => None,
        }
    }
}

/// Resolve the relationship selector against `meta`.
pub(crate) fn resolve(meta: &'static TableMeta, related: &Related) -> DbResult<Vec<&'static Relation>> {
    match related {
        Related::None => Ok(Vec::new()),
        Related::All => Ok(meta.relations.iter().collect()),
        Related::Named(names) => names
            .iter()
            .map(|name| {
                meta.relation(name)
                    .ok_or_else(|| DbError::unknown_attribute(meta.name, name.as_str()))
            })
            .collect(),
    }
}

/// Load `relations` for every row in `rows`; the result is index-aligned with `rows`.
pub(crate) async fn load(
    session: &mut Session,
    meta: &'static TableMeta,
    rows: &[Record],
    relations: &[&'static Relation],
) -> DbResult<Vec<RelatedRows>> {
    let mut loaded: Vec<RelatedRows> = vec![BTreeMap::new(); rows.len()];
    if rows.is_empty() {
        return Ok(loaded);
    }

    for relation in relations {
        let (local, grouped) = match relation.kind {
            RelationKind::BelongsTo { local, remote } | RelationKind::HasMany { local, remote } => {
                let target = relation.target();
                let keys = distinct_keys(rows, local);
                let found = fetch_by_column(session, target, remote, &keys).await?;
                (local, group_by(found, |r| (r.get(remote).and_then(KeyRepr::of), r)))
            }
            RelationKind::ManyToMany {
                through,
                local,
                remote,
            } => {
                let [owner_key] = meta.primary_key else {
                    return Err(DbError::invalid_input(format!(
                        "'{}' needs a single-column key to load '{}'",
                        meta.name, relation.name
                    )));
                };
                let owner_kind = meta.require_column(owner_key)?.kind;
                let keys = distinct_keys(rows, owner_key);
                let found = fetch_through(
                    session,
                    relation.target(),
                    Through {
                        table: through,
                        local,
                        remote,
                    },
                    &keys,
                    owner_kind,
                )
                .await?;
                (*owner_key, group_by(found, |(r, owner)| (KeyRepr::of(&owner), r)))
            }
        };

        let mut total = 0;
        for (row, slot) in rows.iter().zip(loaded.iter_mut()) {
            let matches: Vec<Record> = row
                .get(local)
                .and_then(KeyRepr::of)
                .and_then(|key| grouped.get(&key))
                .cloned()
                .unwrap_or_default();
            total += matches.len();
            slot.insert(relation.name, matches);
        }
        debug!(
            table = meta.name,
            relation = relation.name,
            rows = total,
            "Loaded relationship"
        );
    }

    Ok(loaded)
}

fn distinct_keys(rows: &[Record], column: &str) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter(|value| KeyRepr::of(value).is_some_and(|key| seen.insert(key)))
        .cloned()
        .collect()
}

fn group_by<T>(
    items: Vec<T>,
    split: impl Fn(T) -> (Option<KeyRepr>, Record),
) -> HashMap<KeyRepr, Vec<Record>> {
    let mut grouped: HashMap<KeyRepr, Vec<Record>> = HashMap::new();
    for item in items {
        if let (Some(key), record) = split(item) {
            grouped.entry(key).or_default().push(record);
        }
    }
    grouped
}

async fn fetch_by_column(
    session: &mut Session,
    target: &'static TableMeta,
    column: &'static str,
    keys: &[Value],
) -> DbResult<Vec<Record>> {
    let kinds = column_kinds(target);
    let mut found = Vec::new();
    for chunk in keys.chunks(CHUNK_SIZE) {
        let filter = Filter::In {
            column: ColumnRef::new(target.name, column),
            values: chunk.to_vec(),
        };
        let stmt = sql::select(session.db_type(), target, &[filter], None)?;
        for values in session.fetch(&stmt, &kinds).await? {
            found.push(Record::from_values(target, values));
        }
    }
    Ok(found)
}

async fn fetch_through(
    session: &mut Session,
    target: &'static TableMeta,
    through: Through<'_>,
    keys: &[Value],
    owner_kind: ColumnKind,
) -> DbResult<Vec<(Record, Value)>> {
    let mut kinds = column_kinds(target);
    kinds.push(owner_kind);
    let mut found = Vec::new();
    for chunk in keys.chunks(CHUNK_SIZE) {
        let stmt = sql::select_through(session.db_type(), target, through, chunk, owner_kind)?;
        for mut values in session.fetch(&stmt, &kinds).await? {
            let owner = values.pop().unwrap_or(Value::Null);
            found.push((Record::from_values(target, values), owner));
        }
    }
    Ok(found)
}

pub(crate) fn column_kinds(meta: &TableMeta) -> Vec<ColumnKind> {
    meta.columns.iter().map(|c| c.kind).collect()
}
