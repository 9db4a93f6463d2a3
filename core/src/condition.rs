//! Filter expression DSL.
//!
//! # Design
//! A [`Field`] pairs a field name with the [`OperatorSet`] the API accepts
//! for it. Its comparison methods check the operator first and only then
//! build an [`Expression`], so an invalid filter fails where it is written,
//! long before serialization.
//!
//! Expressions are immutable trees. `and`/`or` (and the `&`/`|` operators)
//! always allocate a new `Combined` node, so an operand can be reused in any
//! number of combinations.
//!
//! Two renderings are provided: the nested-array form sent to the HTTP API
//! (`["and", ["id", "=", "v17"], ...]`) and the fully parenthesized string
//! form used by the line protocol (`((id = "v17") and (...))`).

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::ConditionError;

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// Substring / search match, `~` on the wire.
    Match,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Ge,
        Operator::Lt,
        Operator::Le,
        Operator::Match,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Match => "~",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.symbol() == s)
            .ok_or_else(|| format!("unknown operator '{s}'"))
    }
}

/// The set of operators a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperatorSet(u8);

impl OperatorSet {
    /// `=` only.
    pub const EQ: OperatorSet = OperatorSet(1);
    /// `=` and `!=`.
    pub const SOME: OperatorSet = OperatorSet(0b11);
    /// `= != > >= < <=`.
    pub const RELATIONAL: OperatorSet = OperatorSet(0b11_1111);
    /// `~` only.
    pub const MATCH: OperatorSet = OperatorSet(0b100_0000);
    /// Every operator, used by the unchecked [`Node`].
    pub const ANY: OperatorSet = OperatorSet(0b111_1111);

    pub fn of(ops: &[Operator]) -> Self {
        OperatorSet(ops.iter().fold(0, |acc, op| acc | op.bit()))
    }

    pub const fn with(self, other: OperatorSet) -> Self {
        OperatorSet(self.0 | other.0)
    }

    pub fn contains(self, op: Operator) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Operator> {
        Operator::ALL.into_iter().filter(move |op| self.contains(*op))
    }
}

/// Boolean combinator of two expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    pub fn keyword(self) -> &'static str {
        match self {
            BoolOp::And => "and",
            BoolOp::Or => "or",
        }
    }
}

/// An immutable filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Predicate {
        field: String,
        op: Operator,
        value: Value,
    },
    Combined {
        op: BoolOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn and(self, other: Expression) -> Expression {
        Expression::combine(BoolOp::And, self, other)
    }

    pub fn or(self, other: Expression) -> Expression {
        Expression::combine(BoolOp::Or, self, other)
    }

    fn combine(op: BoolOp, left: Expression, right: Expression) -> Expression {
        Expression::Combined {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Nested-array form used by the HTTP API.
    pub fn to_filter(&self) -> Value {
        match self {
            Expression::Predicate { field, op, value } => {
                Value::Array(vec![Value::from(field.as_str()), Value::from(op.symbol()), value.clone()])
            }
            Expression::Combined { op, left, right } => {
                Value::Array(vec![Value::from(op.keyword()), left.to_filter(), right.to_filter()])
            }
        }
    }

    /// Every field name referenced by this expression, left to right.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Expression::Predicate { field, .. } => vec![field.as_str()],
            Expression::Combined { left, right, .. } => {
                let mut out = left.fields();
                out.extend(right.fields());
                out
            }
        }
    }
}

/// Fully parenthesized string form used by the line protocol.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Predicate { field, op, value } => write!(f, "({field} {op} {value})"),
            Expression::Combined { op, left, right } => {
                write!(f, "({left} {} {right})", op.keyword())
            }
        }
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_filter().serialize(serializer)
    }
}

impl BitAnd for Expression {
    type Output = Expression;

    fn bitand(self, rhs: Expression) -> Expression {
        self.and(rhs)
    }
}

impl BitOr for Expression {
    type Output = Expression;

    fn bitor(self, rhs: Expression) -> Expression {
        self.or(rhs)
    }
}

impl BitAnd for &Expression {
    type Output = Expression;

    fn bitand(self, rhs: &Expression) -> Expression {
        self.clone().and(rhs.clone())
    }
}

impl BitOr for &Expression {
    type Output = Expression;

    fn bitor(self, rhs: &Expression) -> Expression {
        self.clone().or(rhs.clone())
    }
}

/// A filterable field and the operators it supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    ops: OperatorSet,
}

impl Field {
    pub fn new(name: &str, ops: OperatorSet) -> Self {
        Self {
            name: clean(name),
            ops,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operators(&self) -> OperatorSet {
        self.ops
    }

    pub fn supports(&self, op: Operator) -> bool {
        self.ops.contains(op)
    }

    /// Build `field op value`, rejecting operators outside the field's set.
    /// A list value only takes `=` or `!=`.
    pub fn compare(&self, op: Operator, value: impl Into<Value>) -> Result<Expression, ConditionError> {
        let value = value.into();
        let list_op = matches!(op, Operator::Eq | Operator::Ne);
        if !self.supports(op) || (value.is_array() && !list_op) {
            return Err(ConditionError::OperationNotSupported {
                field: self.name.clone(),
                op,
            });
        }
        Ok(Expression::Predicate {
            field: self.name.clone(),
            op,
            value,
        })
    }

    pub fn eq(&self, value: impl Into<Value>) -> Result<Expression, ConditionError> {
        self.compare(Operator::Eq, value)
    }

    pub fn ne(&self, value: impl Into<Value>) -> Result<Expression, ConditionError> {
        self.compare(Operator::Ne, value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Result<Expression, ConditionError> {
        self.compare(Operator::Gt, value)
    }

    pub fn ge(&self, value: impl Into<Value>) -> Result<Expression, ConditionError> {
        self.compare(Operator::Ge, value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Result<Expression, ConditionError> {
        self.compare(Operator::Lt, value)
    }

    pub fn le(&self, value: impl Into<Value>) -> Result<Expression, ConditionError> {
        self.compare(Operator::Le, value)
    }

    pub fn matches(&self, value: impl Into<Value>) -> Result<Expression, ConditionError> {
        self.compare(Operator::Match, value)
    }
}

/// An unchecked field for free-form HTTP filters.
///
/// Accepts every operator and leaves validation to the server, for fields
/// the registry doesn't describe (e.g. `olang` or nested filters).
#[derive(Debug, Clone)]
pub struct Node(Field);

impl Node {
    pub fn new(name: &str) -> Self {
        Node(Field::new(name, OperatorSet::ANY))
    }
}

impl std::ops::Deref for Node {
    type Target = Field;

    fn deref(&self) -> &Field {
        &self.0
    }
}

/// Trim and case-fold a user-supplied identifier.
pub(crate) fn clean(s: &str) -> String {
    s.trim().to_lowercase()
}
