//! Validity window checks on a received response.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::warn;

use crate::error::TimingError;
use crate::message::{Element, Message};

/// Default clock-skew window in seconds.
pub const DEFAULT_MAX_AGE_SECONDS: i64 = 3600;

/// Checks the time bounds of the assertion in a response.
///
/// Every `NotOnOrAfter` must not lie before `now - skew`, and
/// `Conditions/@NotBefore` must not lie after `now + skew`. All violations
/// are collected before failing.
#[derive(Debug, Clone, Copy)]
pub struct TimingValidator {
    skew: Duration,
    now: DateTime<Utc>,
}

impl TimingValidator {
    /// Creates a validator for the given skew, evaluated at the current time.
    #[must_use]
    pub fn new(max_age_seconds: i64) -> Self {
        Self::at(max_age_seconds, Utc::now())
    }

    /// Creates a validator evaluated at a fixed instant.
    #[must_use]
    pub fn at(max_age_seconds: i64, now: DateTime<Utc>) -> Self {
        Self {
            skew: Duration::seconds(max_age_seconds),
            now,
        }
    }

    /// Validates a response.
    ///
    /// A message without an assertion has nothing to check.
    ///
    /// # Errors
    ///
    /// Returns [`TimingError`] listing every violated check.
    pub fn validate(&self, message: &Message) -> Result<(), TimingError> {
        let Some(assertion) = message.assertion() else {
            return Ok(());
        };

        let a_short_while_ago = self.now - self.skew;
        let in_a_short_while = self.now + self.skew;
        let mut issues = Vec::new();

        if let Some(subject) = assertion.child("Subject") {
            for confirmation in subject.children_named("SubjectConfirmation") {
                for data in confirmation.children_named("SubjectConfirmationData") {
                    check_not_after(
                        data,
                        "NotOnOrAfter",
                        "SubjectConfirmation too old",
                        a_short_while_ago,
                        &mut issues,
                    );
                }
            }
        }

        if let Some(conditions) = assertion.child("Conditions") {
            if let Some(value) = conditions.attr("NotBefore") {
                match parse_instant(value) {
                    Some(not_before) if in_a_short_while < not_before => {
                        issues.push("Assertion Conditions not valid yet".to_string());
                    }
                    Some(_) => {}
                    None => issues.push(format!("Conditions NotBefore '{value}' is not a valid instant")),
                }
            }
            check_not_after(
                conditions,
                "NotOnOrAfter",
                "Assertions Condition too old",
                a_short_while_ago,
                &mut issues,
            );
        }

        for statement in assertion.children_named("AuthnStatement") {
            check_not_after(
                statement,
                "SessionNotOnOrAfter",
                "AuthnStatement Session too old",
                a_short_while_ago,
                &mut issues,
            );
        }

        if issues.is_empty() {
            Ok(())
        } else {
            warn!(issuer = ?message.issuer(), issues = ?issues, "timing validation failed");
            Err(TimingError { issues })
        }
    }
}

fn check_not_after(
    element: &Element,
    attribute: &str,
    issue: &str,
    a_short_while_ago: DateTime<Utc>,
    issues: &mut Vec<String>,
) {
    let Some(value) = element.attr(attribute) else {
        return;
    };
    match parse_instant(value) {
        Some(not_on_or_after) if a_short_while_ago > not_on_or_after => {
            issues.push(issue.to_string());
        }
        Some(_) => {}
        None => issues.push(format!(
            "{} {attribute} '{value}' is not a valid instant",
            element.local_name()
        )),
    }
}

/// Parses an `xs:dateTime`, reading a value without zone as UTC.
fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
