//! Predicate expressions and eager-loading selectors.

use crate::models::value::Value;

/// A column qualified by its table, e.g. `events.org_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A boolean predicate over one or more tables.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: Value,
    },
    IsNull(ColumnRef),
    IsNotNull(ColumnRef),
    In {
        column: ColumnRef,
        values: Vec<Value>,
    },
    Like {
        column: ColumnRef,
        pattern: String,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Literal(bool),
}

impl ColumnRef {
    pub const fn new(table: &'static str, name: &'static str) -> Self {
        Self { table, name }
    }

    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Filter {
        Filter::Compare {
            column: self,
            op,
            value: value.into(),
        }
    }

    /// Equality; comparing with NULL renders as `IS NULL`.
    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Ge, value)
    }

    pub fn is_null(self) -> Filter {
        Filter::IsNull(self)
    }

    pub fn is_not_null(self) -> Filter {
        Filter::IsNotNull(self)
    }

    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Filter {
        Filter::In {
            column: self,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn like(self, pattern: impl Into<String>) -> Filter {
        Filter::Like {
            column: self,
            pattern: pattern.into(),
        }
    }
}

impl Filter {
    pub fn always() -> Self {
        Filter::Literal(true)
    }

    pub fn never() -> Self {
        Filter::Literal(false)
    }

    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }
}

/// Which relationships to load alongside the primary rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Related {
    #[default]
    None,
    /// Every declared relationship.
    All,
    Named(Vec<String>),
}

impl Related {
    pub fn named<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Related::Named(names.into_iter().map(Into::into).collect())
    }

    /// Parse the textual form: `"all"` or a comma-separated list of names.
    pub fn parse(selector: &str) -> Self {
        let selector = selector.trim();
        if selector.is_empty() {
            Related::None
        } else if selector.eq_ignore_ascii_case("all") {
            Related::All
        } else {
            Related::named(selector.split(',').map(str::trim).filter(|s| !s.is_empty()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: ColumnRef = ColumnRef::new("orgs", "name");
    const ACTIVE: ColumnRef = ColumnRef::new("orgs", "is_active");

    #[test]
    fn test_and_flattens() {
        let f = NAME.eq("A").and(ACTIVE.eq(true)).and(NAME.ne("B"));
        match f {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_is_in_collects_values() {
        let f = NAME.is_in(["a", "b"]);
        assert_eq!(
            f,
            Filter::In {
                column: NAME,
                values: vec![Value::from("a"), Value::from("b")],
            }
        );
    }

    #[test]
    fn test_related_parse() {
        assert_eq!(Related::parse("all"), Related::All);
        assert_eq!(Related::parse("ALL"), Related::All);
        assert_eq!(Related::parse(""), Related::None);
        assert_eq!(
            Related::parse("org, location"),
            Related::named(["org", "location"])
        );
    }
}
