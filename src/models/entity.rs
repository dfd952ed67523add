//! Entity reflection.
//!
//! Every table is a plain struct plus a static [`TableMeta`] describing its
//! columns, primary key and relationships. The [`entity!`] macro generates
//! both from a single declaration, together with the [`Entity`] impl that
//! lets the access layer read, write and rebuild rows without knowing the
//! concrete type.

use crate::error::{DbError, DbResult};
use crate::models::value::{ColumnKind, Fields, Key, Value, strip_qualifier};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::ops::Deref;

/// Column description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// Filled by the store when omitted on insert (serial ids, defaults).
    pub generated: bool,
    /// `created` / `updated` bookkeeping columns.
    pub audit: bool,
}

/// How a relationship maps onto columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// `self.local` references `target.remote`.
    BelongsTo {
        local: &'static str,
        remote: &'static str,
    },
    /// `target.remote` references `self.local`.
    HasMany {
        local: &'static str,
        remote: &'static str,
    },
    /// Link table `through` with `local` pointing at this table's key and
    /// `remote` pointing at the target's key.
    ManyToMany {
        through: &'static str,
        local: &'static str,
        remote: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Relation {
    pub name: &'static str,
    pub target: fn() -> &'static TableMeta,
    pub kind: RelationKind,
}

impl Relation {
    pub fn target(&self) -> &'static TableMeta {
        (self.target)()
    }
}

#[derive(Debug)]
pub struct TableMeta {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub primary_key: &'static [&'static str],
    pub relations: &'static [Relation],
}

impl TableMeta {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column or fail with an unknown-attribute error.
    pub fn require_column(&self, name: &str) -> DbResult<&'static Column> {
        self.column(name)
            .ok_or_else(|| DbError::unknown_attribute(self.name, name))
    }

    pub fn relation(&self, name: &str) -> Option<&'static Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &'static Column> + '_ {
        self.primary_key
            .iter()
            .filter_map(|name| self.column(name))
    }

    /// Whether the table carries `created` / `updated`.
    pub fn is_audited(&self) -> bool {
        self.columns.iter().any(|c| c.audit)
    }

    pub fn is_key(&self, column: &str) -> bool {
        self.primary_key.contains(&column)
    }
}

/// Column values of one row, in table column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<(&'static str, Value)>,
}

impl Record {
    /// Pair decoded values with the table's columns.
    pub fn from_values(meta: &'static TableMeta, values: Vec<Value>) -> Self {
        Self {
            values: meta
                .columns
                .iter()
                .map(|c| c.name)
                .zip(values)
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// Move a value out, leaving NULL behind.
    pub fn take(&mut self, name: &str) -> Value {
        self.values
            .iter_mut()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| std::mem::take(v))
            .unwrap_or(Value::Null)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(n, v)| (*n, v))
    }

    /// Primary key of this row according to `meta`.
    pub fn key(&self, meta: &TableMeta) -> Key {
        Key(meta
            .primary_key
            .iter()
            .map(|c| self.get(c).cloned().unwrap_or(Value::Null))
            .collect())
    }
}

/// A table-backed record type.
pub trait Entity: Sized + Clone + Send + Sync + std::fmt::Debug + 'static {
    fn meta() -> &'static TableMeta;

    /// Rebuild an entity from a decoded row.
    fn from_record(record: Record) -> DbResult<Self>;

    /// Value of a declared column, or `None` when `name` is not a column.
    fn get(&self, name: &str) -> Option<Value>;

    /// Assign a declared column. Unknown names are an error.
    fn set(&mut self, name: &str, value: Value) -> DbResult<()>;

    fn table() -> &'static str {
        Self::meta().name
    }

    /// Reference to one of this entity's columns, for filters.
    fn col(name: &'static str) -> crate::models::ColumnRef {
        crate::models::ColumnRef::new(Self::meta().name, name)
    }

    fn get_id(&self) -> Key {
        Key(Self::meta()
            .primary_key
            .iter()
            .map(|c| self.get(c).unwrap_or(Value::Null))
            .collect())
    }

    /// Every column except `created` / `updated`, nulls included.
    fn to_dict(&self) -> serde_json::Map<String, JsonValue> {
        Self::meta()
            .columns
            .iter()
            .filter(|c| !c.audit)
            .map(|c| {
                let value = self.get(c.name).unwrap_or(Value::Null);
                (c.name.to_string(), value.to_json())
            })
            .collect()
    }

    /// Apply `fields`, stripping any `table.` qualifier from each name.
    fn update(&mut self, fields: &Fields) -> DbResult<()> {
        for (name, value) in fields.iter() {
            self.set(strip_qualifier(name), value.clone())?;
        }
        Ok(())
    }

    fn to_record(&self) -> Record {
        let meta = Self::meta();
        Record::from_values(
            meta,
            meta.columns
                .iter()
                .map(|c| self.get(c.name).unwrap_or(Value::Null))
                .collect(),
        )
    }
}

/// An entity together with its eagerly loaded relationships.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub record: T,
    pub related: BTreeMap<&'static str, Vec<Record>>,
}

impl<T: Entity> Loaded<T> {
    pub fn new(record: T) -> Self {
        Self {
            record,
            related: BTreeMap::new(),
        }
    }

    pub fn into_inner(self) -> T {
        self.record
    }

    pub fn is_loaded(&self, relation: &str) -> bool {
        self.related.contains_key(relation)
    }

    /// Rows of a loaded relationship, typed as `R`.
    pub fn related<R: Entity>(&self, relation: &str) -> DbResult<Vec<R>> {
        let rows = self.related.get(relation).ok_or_else(|| {
            DbError::invalid_input(format!(
                "relationship '{}.{}' was not loaded",
                T::meta().name,
                relation
            ))
        })?;
        rows.iter().cloned().map(R::from_record).collect()
    }

    /// Single row of a to-one relationship.
    pub fn related_one<R: Entity>(&self, relation: &str) -> DbResult<Option<R>> {
        Ok(self.related::<R>(relation)?.into_iter().next())
    }
}

impl<T> Deref for Loaded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

/// Declare an entity struct and its table metadata.
///
/// ```ignore
/// entity! {
///     /// An organization.
///     pub struct Org in "orgs" {
///         key(id);
///         columns {
///             id: i64 [generated],
///             parent_id: Option<i64>,
///             name: String,
///             created: NaiveDateTime [generated, audit],
///             updated: NaiveDateTime [generated, audit],
///         }
///         relations {
///             parent: belongs_to(Org, parent_id => id),
///             children: has_many(Org, id => parent_id),
///         }
///     }
/// }
/// ```
///
/// A column can be renamed with `field as "column": Type`.
#[macro_export]
macro_rules! entity {
    (
        $(#[$attr:meta])*
        pub struct $name:ident in $table:literal {
            key($($pk:ident),+);
            columns {
                $(
                    $(#[$fattr:meta])*
                    $field:ident $(as $col:literal)? : $ty:ty $([$($flag:ident),*])?
                ),+ $(,)?
            }
            relations {
                $(
                    $rel:ident : $rkind:ident ( $target:ty, $($rargs:tt)+ )
                ),* $(,)?
            }
        }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Default)]
        pub struct $name {
            $(
                $(#[$fattr])*
                pub $field: $ty,
            )+
        }

        impl $crate::models::Entity for $name {
            fn meta() -> &'static $crate::models::TableMeta {
                static META: $crate::models::TableMeta = $crate::models::TableMeta {
                    name: $table,
                    columns: &[
                        $(
                            $crate::models::Column {
                                name: $crate::entity!(@name $field $($col)?),
                                kind: <$ty as $crate::models::FieldValue>::KIND,
                                nullable: <$ty as $crate::models::FieldValue>::NULLABLE,
                                generated: $crate::entity!(@flag generated; $($($flag)*)?),
                                audit: $crate::entity!(@flag audit; $($($flag)*)?),
                            },
                        )+
                    ],
                    primary_key: &[$(stringify!($pk)),+],
                    relations: &[
                        $(
                            $crate::models::Relation {
                                name: stringify!($rel),
                                target: <$target as $crate::models::Entity>::meta,
                                kind: $crate::entity!(@relation $rkind $($rargs)+),
                            },
                        )*
                    ],
                };
                &META
            }

            fn from_record(
                mut record: $crate::models::Record,
            ) -> $crate::error::DbResult<Self> {
                let table = $table;
                Ok(Self {
                    $(
                        $field: {
                            let column = $crate::entity!(@name $field $($col)?);
                            <$ty as $crate::models::FieldValue>::from_value(record.take(column))
                                .map_err(|e| $crate::error::DbError::invalid_value(table, column, e))?
                        },
                    )+
                })
            }

            fn get(&self, name: &str) -> Option<$crate::models::Value> {
                $(
                    if name == $crate::entity!(@name $field $($col)?) {
                        return Some($crate::models::FieldValue::to_value(&self.$field));
                    }
                )+
                None
            }

            fn set(
                &mut self,
                name: &str,
                value: $crate::models::Value,
            ) -> $crate::error::DbResult<()> {
                $(
                    if name == $crate::entity!(@name $field $($col)?) {
                        self.$field = <$ty as $crate::models::FieldValue>::from_value(value)
                            .map_err(|e| $crate::error::DbError::invalid_value($table, name, e))?;
                        return Ok(());
                    }
                )+
                Err($crate::error::DbError::unknown_attribute($table, name))
            }
        }
    };

    (@name $field:ident $col:literal) => { $col };
    (@name $field:ident) => { stringify!($field) };

    (@flag generated; generated $($rest:ident)*) => { true };
    (@flag audit; audit $($rest:ident)*) => { true };
    (@flag $want:ident;) => { false };
    (@flag $want:ident; $other:ident $($rest:ident)*) => {
        $crate::entity!(@flag $want; $($rest)*)
    };

    (@relation belongs_to $local:ident => $remote:ident) => {
        $crate::models::RelationKind::BelongsTo {
            local: stringify!($local),
            remote: stringify!($remote),
        }
    };
    (@relation has_many $local:ident => $remote:ident) => {
        $crate::models::RelationKind::HasMany {
            local: stringify!($local),
            remote: stringify!($remote),
        }
    };
    (@relation many_to_many $through:literal, $local:ident => $remote:ident) => {
        $crate::models::RelationKind::ManyToMany {
            through: $through,
            local: stringify!($local),
            remote: stringify!($remote),
        }
    };
}

pub use entity;
