//! Row selections for histogram draws
//!
//! A selection is a boolean expression over dataset columns and numeric
//! literals, for example `ke > 10 AND z = 0` or `x < 2 && y >= -1`.
//! Expressions are parsed with sqlparser's generic dialect; the C-style
//! operators `&&`, `||` and `==` are accepted as aliases.
//!
//! Supported:
//! - comparisons `>`, `>=`, `<`, `<=`, `=`, `!=` between a column and a literal
//! - `AND`, `OR`, `NOT`, parentheses

use crate::storage::column_as_f64;
use crate::{Error, Result};
use arrow::array::BooleanArray;
use arrow::record_batch::RecordBatch;
use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator, Value};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `=`
    Eq,
    /// `!=`
    NotEq,
}

impl CompareOp {
    fn from_sql(op: &BinaryOperator) -> Option<Self> {
        Some(match op {
            BinaryOperator::Gt => Self::Gt,
            BinaryOperator::GtEq => Self::GtEq,
            BinaryOperator::Lt => Self::Lt,
            BinaryOperator::LtEq => Self::LtEq,
            BinaryOperator::Eq => Self::Eq,
            BinaryOperator::NotEq => Self::NotEq,
            _ => return None,
        })
    }

    /// Operator with its operands swapped (`3 < x` is `x > 3`)
    const fn flipped(self) -> Self {
        match self {
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Eq => Self::Eq,
            Self::NotEq => Self::NotEq,
        }
    }

    fn test(self, v: f64, value: f64) -> bool {
        match self {
            Self::Gt => v > value,
            Self::GtEq => v >= value,
            Self::Lt => v < value,
            Self::LtEq => v <= value,
            Self::Eq => (v - value).abs() < f64::EPSILON,
            Self::NotEq => (v - value).abs() >= f64::EPSILON,
        }
    }
}

/// Parsed predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column op value`
    Compare {
        /// Column name
        column: String,
        /// Operator
        op: CompareOp,
        /// Literal operand
        value: f64,
    },
    /// Both sides hold
    And(Box<Predicate>, Box<Predicate>),
    /// Either side holds
    Or(Box<Predicate>, Box<Predicate>),
    /// Negation
    Not(Box<Predicate>),
}

impl Predicate {
    fn columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { column, .. } => {
                if !out.contains(&column.as_str()) {
                    out.push(column);
                }
            }
            Self::And(a, b) | Self::Or(a, b) => {
                a.columns(out);
                b.columns(out);
            }
            Self::Not(a) => a.columns(out),
        }
    }

    fn mask(&self, batch: &RecordBatch) -> Result<Vec<bool>> {
        Ok(match self {
            Self::Compare { column, op, value } => column_as_f64(batch, column)?
                .into_iter()
                // NaN (null) never matches
                .map(|v| !v.is_nan() && op.test(v, *value))
                .collect(),
            Self::And(a, b) => zip_masks(a.mask(batch)?, &b.mask(batch)?, |x, y| x && y),
            Self::Or(a, b) => zip_masks(a.mask(batch)?, &b.mask(batch)?, |x, y| x || y),
            Self::Not(a) => a.mask(batch)?.into_iter().map(|x| !x).collect(),
        })
    }
}

fn zip_masks(mut left: Vec<bool>, right: &[bool], f: impl Fn(bool, bool) -> bool) -> Vec<bool> {
    for (l, &r) in left.iter_mut().zip(right) {
        *l = f(*l, r);
    }
    left
}

/// A parsed row selection
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    text: String,
    predicate: Predicate,
}

impl Selection {
    /// Parse a selection expression
    ///
    /// # Errors
    /// Returns [`Error::Selection`] if the expression is not valid syntax or
    /// uses an unsupported construct
    ///
    /// # Example
    /// ```
    /// use simchar::selection::Selection;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let selection = Selection::parse("ke > 10 && (x < 2 OR y < 2)")?;
    /// assert_eq!(selection.columns(), vec!["ke", "x", "y"]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let normalized = text
            .replace("&&", " AND ")
            .replace("||", " OR ")
            .replace("==", "=");
        if normalized.trim().is_empty() {
            return Err(Error::Selection("empty selection".to_string()));
        }

        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(&normalized)
            .map_err(|e| Error::Selection(format!("{text}: {e}")))?;
        let expr = parser
            .parse_expr()
            .map_err(|e| Error::Selection(format!("{text}: {e}")))?;
        if parser.peek_token().token != Token::EOF {
            return Err(Error::Selection(format!(
                "{text}: unexpected trailing input"
            )));
        }

        Ok(Self {
            text: text.to_string(),
            predicate: Self::lower(&expr)?,
        })
    }

    /// Original expression text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Parsed predicate
    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Columns referenced, in order of first use
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.predicate.columns(&mut out);
        out
    }

    /// Evaluate against a batch
    ///
    /// # Errors
    /// Returns [`Error::Schema`] if a referenced column is missing
    pub fn evaluate(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        Ok(BooleanArray::from(self.predicate.mask(batch)?))
    }

    fn lower(expr: &Expr) -> Result<Predicate> {
        match expr {
            Expr::Nested(inner) => Self::lower(inner),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(Predicate::Not(Box::new(Self::lower(expr)?))),
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And => Ok(Predicate::And(
                    Box::new(Self::lower(left)?),
                    Box::new(Self::lower(right)?),
                )),
                BinaryOperator::Or => Ok(Predicate::Or(
                    Box::new(Self::lower(left)?),
                    Box::new(Self::lower(right)?),
                )),
                other => {
                    let op = CompareOp::from_sql(other).ok_or_else(|| {
                        Error::Selection(format!("unsupported operator '{other}'"))
                    })?;
                    Self::lower_comparison(left, op, right)
                }
            },
            other => Err(Error::Selection(format!(
                "unsupported expression '{other}'"
            ))),
        }
    }

    fn lower_comparison(left: &Expr, op: CompareOp, right: &Expr) -> Result<Predicate> {
        match (column_name(left), literal(right), column_name(right), literal(left)) {
            (Some(column), Some(value), _, _) => Ok(Predicate::Compare { column, op, value }),
            (_, _, Some(column), Some(value)) => Ok(Predicate::Compare {
                column,
                op: op.flipped(),
                value,
            }),
            _ => Err(Error::Selection(format!(
                "comparison must be between a column and a number: '{left}' vs '{right}'"
            ))),
        }
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

fn column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::Nested(inner) => column_name(inner),
        _ => None,
    }
}

fn literal(expr: &Expr) -> Option<f64> {
    match expr {
        Expr::Value(Value::Number(n, _)) => n.parse().ok(),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => literal(expr).map(|v| -v),
        Expr::UnaryOp {
            op: UnaryOperator::Plus,
            expr,
        }
        | Expr::Nested(expr) => literal(expr),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("x", DataType::Float64, true),
            Field::new("ke", DataType::Float64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![Some(-1.0), Some(0.5), None, Some(3.0)])),
                Arc::new(Float64Array::from(vec![5.0, 15.0, 25.0, 35.0])),
            ],
        )
        .unwrap()
    }

    fn mask(text: &str) -> Vec<bool> {
        let array = Selection::parse(text).unwrap().evaluate(&batch()).unwrap();
        (0..array.len()).map(|i| array.value(i)).collect()
    }

    #[test]
    fn test_simple_comparison() {
        assert_eq!(mask("ke > 10"), vec![false, true, true, true]);
        assert_eq!(mask("ke <= 15"), vec![true, true, false, false]);
    }

    #[test]
    fn test_literal_on_left_is_flipped() {
        assert_eq!(mask("10 < ke"), mask("ke > 10"));
    }

    #[test]
    fn test_negative_literal() {
        assert_eq!(mask("x > -0.5"), vec![false, true, false, true]);
    }

    #[test]
    fn test_null_never_matches() {
        assert_eq!(mask("x != 100"), vec![true, true, false, true]);
    }

    #[test]
    fn test_boolean_combinations() {
        assert_eq!(mask("ke > 10 AND x < 1"), vec![false, true, false, false]);
        assert_eq!(mask("ke > 10 && x < 1"), vec![false, true, false, false]);
        assert_eq!(mask("ke < 10 || x > 2"), vec![true, false, false, true]);
        assert_eq!(mask("NOT (ke > 10)"), vec![true, false, false, false]);
    }

    #[test]
    fn test_c_style_equality() {
        assert_eq!(mask("ke == 25"), vec![false, false, true, false]);
    }

    #[test]
    fn test_columns_listed_once() {
        let selection = Selection::parse("ke > 1 AND ke < 9 OR x = 0").unwrap();
        assert_eq!(selection.columns(), vec!["ke", "x"]);
        assert_eq!(selection.to_string(), "ke > 1 AND ke < 9 OR x = 0");
    }

    #[test]
    fn test_rejects_unsupported() {
        assert!(Selection::parse("").is_err());
        assert!(Selection::parse("ke + 1").is_err());
        assert!(Selection::parse("ke > x").is_err());
        assert!(Selection::parse("ke > 'abc'").is_err());
        assert!(Selection::parse("ke > 1 garbage").is_err());
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let selection = Selection::parse("bogus > 1").unwrap();
        let err = selection.evaluate(&batch()).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }
}
