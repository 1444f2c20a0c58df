#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt::Display, fs, io::Write, path::Path, str::FromStr};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};
use serde_json::ser::PrettyFormatter;
use typed_builder::TypedBuilder;

/// Represents visibility settings for submissions and test cases.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GradescopeVisibility {
    /// Hidden from students.
    Hidden,
    /// Visible after the due date of the assignment (or the late due date,
    /// if late submissions are allowed).
    AfterDueDate,
    /// Visible after the grades are published.
    AfterPublished,
    /// Always visible to students.
    #[default]
    Visible,
}

impl GradescopeVisibility {
    /// The spelling used both in specification files and in results.
    pub fn as_str(&self) -> &'static str {
        match self {
            GradescopeVisibility::Hidden => "hidden",
            GradescopeVisibility::AfterDueDate => "after_due_date",
            GradescopeVisibility::AfterPublished => "after_published",
            GradescopeVisibility::Visible => "visible",
        }
    }
}

impl Display for GradescopeVisibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradescopeVisibility {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hidden" => Ok(GradescopeVisibility::Hidden),
            "after_due_date" => Ok(GradescopeVisibility::AfterDueDate),
            "after_published" => Ok(GradescopeVisibility::AfterPublished),
            "visible" => Ok(GradescopeVisibility::Visible),
            other => Err(format!("unknown visibility `{other}`")),
        }
    }
}

/// Represents the status of a test case.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GradescopeStatus {
    /// Full marks.
    Passed,
    /// Some, but not all, of the points.
    Partial,
    /// No points (or a penalty).
    Failed,
}

impl Display for GradescopeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GradescopeStatus::Passed => write!(f, "passed"),
            GradescopeStatus::Partial => write!(f, "partial"),
            GradescopeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Represents the overall submission data.
#[derive(Serialize, Deserialize, Debug, Clone, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[builder(doc)]
pub struct GradescopeSubmission {
    /// Recorded score of the whole submission.
    pub score: f64,

    /// Text relevant to the entire submission.
    pub output: String,

    /// Total time spent running tests, in seconds.
    pub execution_time: f64,

    /// Visibility of the submission's test cases.
    pub visibility: GradescopeVisibility,

    /// Visibility of the autograder's stdout.
    pub stdout_visibility: GradescopeVisibility,

    /// Test cases, in specification order.
    pub tests: Vec<GradescopeTestCase>,
}

impl GradescopeSubmission {
    /// A zero-score submission carrying only `output`; used when nothing
    /// could be graded.
    pub fn failed(output: impl Into<String>) -> Self {
        GradescopeSubmission::builder().output(output).build()
    }
}

/// Represents an individual test case.
#[derive(Serialize, Deserialize, Debug, Clone, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[builder(doc)]
pub struct GradescopeTestCase {
    /// Number of the test case, as written in the specification.
    pub number: String,

    /// Name of the test case.
    pub name: String,

    /// Points awarded.
    pub score: f64,

    /// Points possible.
    pub max_score: f64,

    /// Optional status of the test case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GradescopeStatus>,

    /// Detailed output for the test case.
    pub output: String,

    /// Tags associated with the test case.
    pub tags: Vec<String>,

    /// Visibility setting for the test case.
    pub visibility: GradescopeVisibility,

    /// Extra data to be stored with the test case.
    #[serde(serialize_with = "object_or_empty")]
    pub extra_data: serde_json::Value,
}

/// Serializes `null` extra data as an empty object.
fn object_or_empty<S: Serializer>(
    value: &serde_json::Value,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    if value.is_null() {
        serializer.serialize_map(Some(0))?.end()
    } else {
        value.serialize(serializer)
    }
}

/// Writes the result document to `path`, pretty-printed with four-space
/// indentation.
pub fn write_results(path: &Path, submission: &GradescopeSubmission) -> Result<()> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    submission
        .serialize(&mut ser)
        .context("Failed to serialize results")?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    let mut file = fs::File::create(path)
        .with_context(|| format!("Could not create {}", path.display()))?;
    file.write_all(&buf)
        .with_context(|| format!("Could not write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_round_trips_through_spec_spelling() {
        for v in [
            GradescopeVisibility::Hidden,
            GradescopeVisibility::AfterDueDate,
            GradescopeVisibility::AfterPublished,
            GradescopeVisibility::Visible,
        ] {
            assert_eq!(v.as_str().parse::<GradescopeVisibility>(), Ok(v));
        }
        assert!("public".parse::<GradescopeVisibility>().is_err());
    }

    #[test]
    fn test_case_serializes_every_documented_field() {
        let case = GradescopeTestCase::builder()
            .number("1.1")
            .name("adds")
            .score(2.5)
            .max_score(5.0)
            .status(Some(GradescopeStatus::Partial))
            .output("half")
            .build();
        let json = serde_json::to_value(&case).unwrap();

        assert_eq!(json["number"], "1.1");
        assert_eq!(json["status"], "partial");
        assert_eq!(json["visibility"], "visible");
        assert_eq!(json["tags"], serde_json::json!([]));
        assert_eq!(json["extra_data"], serde_json::json!({}));
    }

    #[test]
    fn failed_submission_has_zero_score() {
        let submission = GradescopeSubmission::failed("boom");
        assert_eq!(submission.score, 0.0);
        assert_eq!(submission.output, "boom");
        assert!(submission.tests.is_empty());
        assert_eq!(submission.stdout_visibility, GradescopeVisibility::Visible);
    }
}
