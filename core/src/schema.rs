//! Entity registry: which fields each entity type can be filtered on.
//!
//! # Design
//! `Entity` is a closed enum, so every lookup is an exhaustive match. A typo
//! in a route or field name fails with a typed error at build time.
//! Operator sets follow the legacy API documentation. The HTTP API accepts
//! more fields than are listed here; use [`Node`](crate::condition::Node)
//! for those.

use std::fmt;
use std::str::FromStr;

use crate::condition::{clean, Expression, Field, OperatorSet};
use crate::error::{ConditionError, QueryError};

const ALL: OperatorSet = OperatorSet::RELATIONAL;
const SOME: OperatorSet = OperatorSet::SOME;
const EQ: OperatorSet = OperatorSet::EQ;
const MATCH: OperatorSet = OperatorSet::MATCH;
const SOME_MATCH: OperatorSet = OperatorSet::SOME.with(OperatorSet::MATCH);

const VN_FIELDS: &[(&str, OperatorSet)] = &[
    ("id", ALL),
    ("title", SOME_MATCH),
    ("original", SOME_MATCH),
    ("firstchar", SOME),
    ("released", ALL),
    ("platforms", SOME),
    ("languages", SOME),
    ("orig_lang", SOME),
    ("search", MATCH),
    ("tags", SOME),
];

const RELEASE_FIELDS: &[(&str, OperatorSet)] = &[
    ("id", ALL),
    ("vn", SOME),
    ("producer", EQ),
    ("title", SOME_MATCH),
    ("original", SOME_MATCH),
    ("released", ALL),
    ("patch", EQ),
    ("freeware", EQ),
    ("doujin", EQ),
    ("type", SOME),
    ("gtin", SOME),
    ("catalog", SOME),
    ("languages", SOME),
    ("platforms", SOME),
];

const PRODUCER_FIELDS: &[(&str, OperatorSet)] = &[
    ("id", ALL),
    ("name", SOME_MATCH),
    ("original", SOME_MATCH),
    ("type", SOME),
    ("language", SOME),
    ("search", MATCH),
];

const CHARACTER_FIELDS: &[(&str, OperatorSet)] = &[
    ("id", ALL),
    ("name", SOME_MATCH),
    ("original", SOME_MATCH),
    ("search", MATCH),
    ("vn", EQ),
    ("traits", SOME),
];

const STAFF_FIELDS: &[(&str, OperatorSet)] = &[("id", ALL), ("aid", EQ), ("search", MATCH)];

const QUOTE_FIELDS: &[(&str, OperatorSet)] = &[("id", ALL)];

const USER_FIELDS: &[(&str, OperatorSet)] = &[("id", ALL), ("username", SOME_MATCH)];

const ULIST_LABELS_FIELDS: &[(&str, OperatorSet)] = &[("uid", EQ)];

const ULIST_FIELDS: &[(&str, OperatorSet)] = &[("uid", EQ), ("vn", ALL), ("label", EQ)];

/// An entity type the API can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Vn,
    Release,
    Producer,
    Character,
    Staff,
    Quote,
    User,
    Ulist,
    UlistLabels,
}

impl Entity {
    pub const ALL: [Entity; 9] = [
        Entity::Vn,
        Entity::Release,
        Entity::Producer,
        Entity::Character,
        Entity::Staff,
        Entity::Quote,
        Entity::User,
        Entity::Ulist,
        Entity::UlistLabels,
    ];

    /// Type token used by the line protocol (`get vn ...`).
    pub fn name(self) -> &'static str {
        match self {
            Entity::Vn => "vn",
            Entity::Release => "release",
            Entity::Producer => "producer",
            Entity::Character => "character",
            Entity::Staff => "staff",
            Entity::Quote => "quote",
            Entity::User => "user",
            Entity::Ulist => "ulist",
            Entity::UlistLabels => "ulist-labels",
        }
    }

    /// Path segment used by the HTTP API (`POST /kana/<route>`).
    pub fn route(self) -> &'static str {
        match self {
            Entity::UlistLabels => "ulist_labels",
            other => other.name(),
        }
    }

    fn table(self) -> &'static [(&'static str, OperatorSet)] {
        match self {
            Entity::Vn => VN_FIELDS,
            Entity::Release => RELEASE_FIELDS,
            Entity::Producer => PRODUCER_FIELDS,
            Entity::Character => CHARACTER_FIELDS,
            Entity::Staff => STAFF_FIELDS,
            Entity::Quote => QUOTE_FIELDS,
            Entity::User => USER_FIELDS,
            Entity::Ulist => ULIST_FIELDS,
            Entity::UlistLabels => ULIST_LABELS_FIELDS,
        }
    }

    /// All filterable fields of this entity.
    pub fn fields(self) -> Vec<Field> {
        self.table()
            .iter()
            .map(|(name, ops)| Field::new(name, *ops))
            .collect()
    }

    /// Look up one field descriptor.
    pub fn field(self, name: &str) -> Result<Field, ConditionError> {
        let wanted = clean(name);
        self.table()
            .iter()
            .find(|(n, _)| *n == wanted)
            .map(|(n, ops)| Field::new(n, *ops))
            .ok_or_else(|| ConditionError::UnknownField {
                entity: self.name().to_string(),
                field: wanted,
            })
    }

    /// Check every predicate of `expr` against this entity's fields and
    /// their operators.
    pub fn check(self, expr: &Expression) -> Result<(), ConditionError> {
        match expr {
            Expression::Predicate { field, op, .. } => {
                let descriptor = self.field(field)?;
                if descriptor.supports(*op) {
                    Ok(())
                } else {
                    Err(ConditionError::OperationNotSupported {
                        field: field.clone(),
                        op: *op,
                    })
                }
            }
            Expression::Combined { left, right, .. } => {
                self.check(left)?;
                self.check(right)
            }
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Entity {
    type Err = QueryError;

    /// Accepts both the line-protocol name and the HTTP route spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = clean(s);
        Entity::ALL
            .into_iter()
            .find(|e| e.name() == wanted || e.route() == wanted)
            .ok_or(QueryError::UnknownRoute(wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;

    #[test]
    fn parses_both_spellings() {
        assert_eq!("ulist-labels".parse::<Entity>().unwrap(), Entity::UlistLabels);
        assert_eq!("ulist_labels".parse::<Entity>().unwrap(), Entity::UlistLabels);
        assert_eq!(" VN ".parse::<Entity>().unwrap(), Entity::Vn);
        assert_eq!(
            "novel".parse::<Entity>().unwrap_err(),
            QueryError::UnknownRoute("novel".into())
        );
    }

    #[test]
    fn every_entity_has_fields() {
        for entity in Entity::ALL {
            assert!(!entity.fields().is_empty(), "{entity} has no fields");
        }
    }

    #[test]
    fn search_only_matches() {
        let search = Entity::Vn.field("search").unwrap();
        assert!(search.supports(Operator::Match));
        assert!(!search.supports(Operator::Eq));
        assert!(search.eq("x").is_err());
        assert!(search.matches("x").is_ok());
    }

    #[test]
    fn id_is_relational() {
        let id = Entity::Release.field("ID").unwrap();
        assert!(id.ge(100).is_ok());
        assert!(id.matches("x").is_err());
    }

    #[test]
    fn check_walks_the_whole_expression() {
        let id = Entity::Vn.field("id").unwrap();
        let aid = Entity::Staff.field("aid").unwrap();
        let expr = id.ge(1).unwrap() & aid.eq(3).unwrap();
        assert_eq!(
            Entity::Vn.check(&expr).unwrap_err(),
            ConditionError::UnknownField {
                entity: "vn".into(),
                field: "aid".into()
            }
        );
        assert!(Entity::Staff.check(&aid.eq(3).unwrap()).is_ok());

        let loose = crate::condition::Node::new("search").eq("fate").unwrap();
        assert_eq!(
            Entity::Vn.check(&loose).unwrap_err(),
            ConditionError::OperationNotSupported {
                field: "search".into(),
                op: Operator::Eq
            }
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = Entity::Staff.field("title").unwrap_err();
        assert_eq!(
            err,
            ConditionError::UnknownField {
                entity: "staff".into(),
                field: "title".into()
            }
        );
    }
}
