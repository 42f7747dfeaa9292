use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::core::{FIELD_START_AT, FieldValue};
use crate::error::{DashError, DashResult};

/// Declarative condition over one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Constraint {
    /// Inclusive on both ends.
    Range { min: FieldValue, max: FieldValue },
    Equals { value: FieldValue },
    OneOf { values: Vec<FieldValue> },
}

/// Field-scoped filter derived from a selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: String,
    pub constraint: Constraint,
}

impl FilterPredicate {
    #[must_use]
    pub fn range(
        field: impl Into<String>,
        min: impl Into<FieldValue>,
        max: impl Into<FieldValue>,
    ) -> Self {
        Self {
            field: field.into(),
            constraint: Constraint::Range {
                min: min.into(),
                max: max.into(),
            },
        }
    }

    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            constraint: Constraint::Equals {
                value: value.into(),
            },
        }
    }

    #[must_use]
    pub fn one_of(field: impl Into<String>, values: Vec<FieldValue>) -> Self {
        Self {
            field: field.into(),
            constraint: Constraint::OneOf { values },
        }
    }

    /// Date slider selection in epoch milliseconds.
    #[must_use]
    pub fn time_range(start_millis: i64, end_millis: i64) -> Self {
        Self::range(FIELD_START_AT, start_millis, end_millis)
    }

    /// Checks the predicate and returns it with range bounds in ascending order.
    pub fn validated(self) -> DashResult<Self> {
        if self.field.trim().is_empty() {
            return Err(DashError::InvalidPredicate(
                "predicate field must not be empty".to_owned(),
            ));
        }

        let constraint = match self.constraint {
            Constraint::Range { min, max } => match min.compare(&max) {
                Some(Ordering::Greater) => Constraint::Range { min: max, max: min },
                Some(_) => Constraint::Range { min, max },
                None => {
                    return Err(DashError::InvalidPredicate(format!(
                        "range bounds on {} are not comparable: {min} / {max}",
                        self.field
                    )));
                }
            },
            Constraint::Equals { value } if value.is_null() => {
                return Err(DashError::InvalidPredicate(format!(
                    "equality on {} needs a value",
                    self.field
                )));
            }
            Constraint::OneOf { values } if values.iter().any(FieldValue::is_null) => {
                return Err(DashError::InvalidPredicate(format!(
                    "value set on {} contains null",
                    self.field
                )));
            }
            other => other,
        };

        Ok(Self {
            field: self.field,
            constraint,
        })
    }

    /// Missing or null values never match.
    #[must_use]
    pub fn matches(&self, value: Option<&FieldValue>) -> bool {
        let Some(value) = value.filter(|value| !value.is_null()) else {
            return false;
        };
        match &self.constraint {
            Constraint::Range { min, max } => {
                matches!(
                    value.compare(min),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(value.compare(max), Some(Ordering::Less | Ordering::Equal))
            }
            Constraint::Equals { value: expected } => value.matches(expected),
            Constraint::OneOf { values } => values.iter().any(|expected| value.matches(expected)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapped_range_is_normalized() {
        let predicate = FilterPredicate::range("price", 9.0, 3.0)
            .validated()
            .expect("valid");
        assert_eq!(
            predicate.constraint,
            Constraint::Range {
                min: FieldValue::Number(3.0),
                max: FieldValue::Number(9.0),
            }
        );
    }

    #[test]
    fn incomparable_bounds_are_rejected() {
        let result = FilterPredicate::range("price", true, 3.0).validated();
        assert!(matches!(result, Err(DashError::InvalidPredicate(_))));
    }

    #[test]
    fn range_is_inclusive_and_skips_nulls() {
        let predicate = FilterPredicate::range("price", 3.0, 9.0);
        assert!(predicate.matches(Some(&FieldValue::Number(3.0))));
        assert!(predicate.matches(Some(&FieldValue::Number(9.0))));
        assert!(!predicate.matches(Some(&FieldValue::Number(9.5))));
        assert!(!predicate.matches(Some(&FieldValue::Null)));
        assert!(!predicate.matches(None));
    }
}
