//! Metadata filters on the `usermeta` store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::sql::{like_contains, quote, quote_list};
use crate::store::{USERMETA_TABLE, USERS_TABLE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl Relation {
    fn as_sql(self) -> &'static str {
        match self {
            Relation::And => " AND ",
            Relation::Or => " OR ",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaCompare {
    #[default]
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "EXISTS")]
    Exists,
    #[serde(rename = "NOT EXISTS")]
    NotExists,
}

impl MetaCompare {
    fn is_negative(self) -> bool {
        matches!(
            self,
            MetaCompare::NotEqual | MetaCompare::NotLike | MetaCompare::NotIn | MetaCompare::NotExists
        )
    }
}

/// A single condition on one metadata key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaClause {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub compare: MetaCompare,
}

impl MetaClause {
    pub fn new(key: impl Into<String>, compare: MetaCompare, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            compare,
        }
    }

    pub fn like(key: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::new(key, MetaCompare::Like, needle.into())
    }

    pub fn not_like(key: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::new(key, MetaCompare::NotLike, needle.into())
    }

    fn values(&self) -> Vec<String> {
        match &self.value {
            Value::Array(items) => items.iter().filter_map(scalar).collect(),
            other => scalar(other).into_iter().collect(),
        }
    }

    fn to_sql(&self) -> Option<String> {
        let column = "m.meta_value";
        let value = || self.values().into_iter().next().unwrap_or_default();

        let predicate = match self.compare {
            MetaCompare::Exists | MetaCompare::NotExists => None,
            MetaCompare::Equal | MetaCompare::NotEqual => {
                Some(format!("{column} = {}", quote(&value())))
            }
            MetaCompare::Like | MetaCompare::NotLike => Some(like_contains(column, &value())),
            MetaCompare::In | MetaCompare::NotIn => {
                let values = self.values();
                if values.is_empty() {
                    // IN () holds for nobody; NOT IN () for everybody.
                    return (self.compare == MetaCompare::In).then(|| "1 = 0".to_string());
                }
                Some(format!("{column} IN ({})", quote_list(&values)))
            }
        };

        let mut select = format!(
            "SELECT 1 FROM {USERMETA_TABLE} m WHERE m.user_id = {USERS_TABLE}.id AND m.meta_key = {}",
            quote(&self.key)
        );
        if let Some(predicate) = predicate {
            select.push_str(" AND ");
            select.push_str(&predicate);
        }

        let exists = if self.compare.is_negative() {
            "NOT EXISTS"
        } else {
            "EXISTS"
        };
        Some(format!("{exists} ({select})"))
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "" }.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaNode {
    Clause(MetaClause),
    Group(MetaQuery),
}

/// A tree of metadata clauses joined by AND or OR.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaQuery {
    #[serde(default)]
    pub relation: Relation,
    #[serde(default)]
    pub clauses: Vec<MetaNode>,
}

impl MetaQuery {
    #[must_use]
    pub fn and(clauses: Vec<MetaNode>) -> Self {
        Self {
            relation: Relation::And,
            clauses,
        }
    }

    #[must_use]
    pub fn or(clauses: Vec<MetaNode>) -> Self {
        Self {
            relation: Relation::Or,
            clauses,
        }
    }

    /// Reads a `meta_query` var: either a query object or a bare array of
    /// clauses joined by AND. Malformed input is ignored.
    #[must_use]
    pub fn from_var(value: Option<&Value>) -> Option<Self> {
        let value = value?;
        let parsed = match value {
            Value::Null => return None,
            Value::Array(_) => serde_json::from_value::<Vec<MetaNode>>(value.clone()).map(Self::and),
            _ => serde_json::from_value::<MetaQuery>(value.clone()),
        };
        parsed
            .inspect_err(|e| warn!("ignoring malformed meta_query: {e}"))
            .ok()
    }

    pub fn push(&mut self, node: MetaNode) {
        self.clauses.push(node);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Drops every clause on `key`, at any depth.
    ///
    /// Groups left empty by the removal disappear with it.
    #[must_use]
    pub fn without_key(&self, key: &str) -> Self {
        let clauses = self
            .clauses
            .iter()
            .filter_map(|node| match node {
                MetaNode::Clause(clause) => (clause.key != key).then(|| node.clone()),
                MetaNode::Group(group) => {
                    let pruned = group.without_key(key);
                    (!pruned.is_empty() || group.is_empty()).then_some(MetaNode::Group(pruned))
                }
            })
            .collect();

        Self {
            relation: self.relation,
            clauses,
        }
    }

    /// Renders the tree as one predicate, or `None` when it constrains nothing.
    #[must_use]
    pub fn to_sql(&self) -> Option<String> {
        let rendered = self.clauses.iter().map(|node| match node {
            MetaNode::Clause(clause) => clause.to_sql(),
            MetaNode::Group(group) => group.to_sql(),
        });

        let parts: Vec<String> = match self.relation {
            Relation::And => rendered.flatten().collect(),
            // An unconstrained branch satisfies the whole OR.
            Relation::Or if self.clauses.is_empty() => return Some("1 = 0".to_string()),
            Relation::Or => rendered.collect::<Option<_>>()?,
        };

        match parts.len() {
            0 => None,
            1 => parts.into_iter().next(),
            _ => Some(format!("({})", parts.join(self.relation.as_sql()))),
        }
    }
}
