//! Ordered threshold rules.
//!
//! A [RuleSet] is a priority list: rules are tried in insertion order and the first one whose
//! comparison holds decides the verdict. Nothing after it is looked at, so a warn rule placed
//! before a crit rule on the same field masks the crit rule.

use tracing::debug;

use crate::{display_number, CheckError, ServiceState};

/// The observed quantity a rule reads from a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Cpu,
    Memory,
    Age,
    Value,
    Text,
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Field::Cpu => "cpu",
            Field::Memory => "memory",
            Field::Age => "age",
            Field::Value | Field::Text => "value",
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Field::Cpu | Field::Memory => "%",
            Field::Age => "s",
            Field::Value | Field::Text => "",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    NotEquals,
    GreaterOrEqual,
    Greater,
    Less,
}

impl Comparator {
    pub fn holds<T: PartialOrd + ?Sized>(&self, observed: &T, limit: &T) -> bool {
        match self {
            Comparator::NotEquals => observed != limit,
            Comparator::GreaterOrEqual => observed >= limit,
            Comparator::Greater => observed > limit,
            Comparator::Less => observed < limit,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Comparator::NotEquals => "does not match",
            Comparator::GreaterOrEqual => "is at or above",
            Comparator::Greater => "exceeds",
            Comparator::Less => "is below",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Limit {
    Number(f64),
    Text(String),
}

/// A single comparison that yields `status` when it holds.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdRule {
    pub name: &'static str,
    pub field: Field,
    pub comparator: Comparator,
    pub limit: Limit,
    pub status: ServiceState,
}

impl ThresholdRule {
    pub fn numeric(
        name: &'static str,
        field: Field,
        comparator: Comparator,
        limit: f64,
        status: ServiceState,
    ) -> Self {
        ThresholdRule {
            name,
            field,
            comparator,
            limit: Limit::Number(limit),
            status,
        }
    }

    pub fn text(
        name: &'static str,
        comparator: Comparator,
        limit: &str,
        status: ServiceState,
    ) -> Self {
        ThresholdRule {
            name,
            field: Field::Text,
            comparator,
            limit: Limit::Text(limit.to_owned()),
            status,
        }
    }

    /// Returns the rendered message when the rule fires on `observed`.
    fn fire<O: Observed + ?Sized>(&self, observed: &O) -> Result<Option<String>, CheckError> {
        let (shown, limit) = match self.limit {
            Limit::Number(limit) => {
                let value = observed.number(self.field)?;
                if !self.comparator.holds(&value, &limit) {
                    return Ok(None);
                }
                let suffix = self.field.suffix();
                (
                    format!("{}{}", display_number(value), suffix),
                    format!("{}{}", display_number(limit), suffix),
                )
            }
            Limit::Text(ref limit) => {
                let value = observed.text(self.field);
                if !self.comparator.holds(value, limit.as_str()) {
                    return Ok(None);
                }
                (format!("{:?}", value), format!("{:?}", limit))
            }
        };

        Ok(Some(format!(
            "{}: {} {} {} {} {}",
            observed.subject(),
            self.field.label(),
            shown,
            self.comparator.verb(),
            self.name,
            limit
        )))
    }
}

/// Something a rule can be evaluated against.
pub trait Observed {
    /// How the entity is named in messages, e.g. `metric foo`.
    fn subject(&self) -> String;
    fn number(&self, field: Field) -> Result<f64, CheckError>;
    fn text(&self, field: Field) -> &str;
}

/// The rule that decided an evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    pub rule: &'static str,
    pub status: ServiceState,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<ThresholdRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: ThresholdRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Appends the rule built by `f` only when `limit` is present.
    pub fn with_rule_if<T>(self, limit: Option<T>, f: impl FnOnce(T) -> ThresholdRule) -> Self {
        match limit {
            Some(limit) => self.with_rule(f(limit)),
            None => self,
        }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the first rule that fires on `observed`, or None when all of them pass.
    pub fn evaluate<O: Observed + ?Sized>(
        &self,
        observed: &O,
    ) -> Result<Option<Verdict>, CheckError> {
        for rule in &self.rules {
            if let Some(message) = rule.fire(observed)? {
                debug!(rule = rule.name, status = %rule.status, "rule fired");
                return Ok(Some(Verdict {
                    rule: rule.name,
                    status: rule.status,
                    message,
                }));
            }
        }
        Ok(None)
    }
}
