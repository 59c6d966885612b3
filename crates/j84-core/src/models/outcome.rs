//! Outcomes emitted by compliance checks
//!
//! Every finding is reported as an [`Outcome`] tagged with the J1939-84
//! section that defines it. Section codes are structured values; their
//! display form (`6.1.4.2.d`) is what ends up in the report, so the
//! formatting here is part of the external contract.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Verdict severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Pass => "PASS",
            Severity::Warn => "WARN",
            Severity::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

/// Error parsing a section code string
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid section code '{0}', expected 6.<part>.<step>.<clause>.<letter>")]
pub struct SectionCodeError(pub String);

/// J1939-84 section identifier, e.g. `6.1.4.2.d`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionCode {
    pub part: u8,
    pub step: u8,
    pub clause: u8,
    pub letter: char,
}

impl SectionCode {
    pub const fn new(part: u8, step: u8, clause: u8, letter: char) -> Self {
        Self {
            part,
            step,
            clause,
            letter,
        }
    }
}

impl fmt::Display for SectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "6.{}.{}.{}.{}",
            self.part, self.step, self.clause, self.letter
        )
    }
}

impl FromStr for SectionCode {
    type Err = SectionCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SectionCodeError(s.to_string());
        let fields: Vec<&str> = s.trim().split('.').collect();
        let [root, part, step, clause, letter] = fields.as_slice() else {
            return Err(err());
        };
        if *root != "6" {
            return Err(err());
        }
        let mut letters = letter.chars();
        let letter = match (letters.next(), letters.next()) {
            (Some(c), None) if c.is_ascii_lowercase() => c,
            _ => return Err(err()),
        };
        Ok(Self {
            part: part.parse().map_err(|_| err())?,
            step: step.parse().map_err(|_| err())?,
            clause: clause.parse().map_err(|_| err())?,
            letter,
        })
    }
}

impl Serialize for SectionCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SectionCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub part: u8,
    pub step: u8,
    pub severity: Severity,
    /// Section that defines the check, absent for bus-level conditions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionCode>,
    /// Full report text, `"<section> - <detail>"` when a section is set
    pub message: String,
}

impl Outcome {
    pub fn new(severity: Severity, section: SectionCode, detail: impl AsRef<str>) -> Self {
        Self {
            part: section.part,
            step: section.step,
            severity,
            message: format!("{} - {}", section, detail.as_ref()),
            section: Some(section),
        }
    }

    pub fn fail(section: SectionCode, detail: impl AsRef<str>) -> Self {
        Self::new(Severity::Fail, section, detail)
    }

    pub fn warn(section: SectionCode, detail: impl AsRef<str>) -> Self {
        Self::new(Severity::Warn, section, detail)
    }

    /// Outcome that is not tied to a section (bus contention and the like)
    pub fn unsectioned(part: u8, step: u8, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            part,
            step,
            severity,
            section: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_section_code_display() {
        assert_eq!(SectionCode::new(1, 4, 2, 'd').to_string(), "6.1.4.2.d");
        assert_eq!(SectionCode::new(1, 26, 12, 'a').to_string(), "6.1.26.12.a");
    }

    #[rstest]
    #[case("6.1.4.2.d", SectionCode::new(1, 4, 2, 'd'))]
    #[case("6.1.26.14.a", SectionCode::new(1, 26, 14, 'a'))]
    #[case(" 6.2.3.1.b ", SectionCode::new(2, 3, 1, 'b'))]
    fn test_section_code_parse(#[case] input: &str, #[case] expected: SectionCode) {
        assert_eq!(input.parse::<SectionCode>().unwrap(), expected);
    }

    #[rstest]
    #[case("5.1.4.2.d")]
    #[case("6.1.4.2")]
    #[case("6.1.4.2.D")]
    #[case("6.1.4.2.ab")]
    #[case("6.x.4.2.a")]
    fn test_section_code_parse_rejects(#[case] input: &str) {
        assert!(input.parse::<SectionCode>().is_err());
    }

    #[test]
    fn test_outcome_message_includes_section() {
        let outcome = Outcome::fail(
            SectionCode::new(1, 4, 2, 'd'),
            "SP 12675 is not included in DM24 response from Engine #1 (0)",
        );
        assert_eq!(outcome.part, 1);
        assert_eq!(outcome.step, 4);
        assert_eq!(
            outcome.message,
            "6.1.4.2.d - SP 12675 is not included in DM24 response from Engine #1 (0)"
        );
        assert_eq!(
            outcome.to_string(),
            "FAIL: 6.1.4.2.d - SP 12675 is not included in DM24 response from Engine #1 (0)"
        );
    }
}
