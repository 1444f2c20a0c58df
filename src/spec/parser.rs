#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use super::{
    attributes::{Test, TestType},
    error::SpecError,
    grammar::line,
};
use crate::{
    constants::{
        BEGIN_MULTILINE_COMMENT_DELIMITER, BEGIN_TEST_DELIMITER, DEFAULT_POINTS, DEFAULT_TIMEOUT,
        EMPTY_TEST_BLOCK, END_MULTILINE_COMMENT_DELIMITER, END_TEST_DELIMITER,
    },
    gradescope::GradescopeVisibility,
    types::Location,
};

/// A well-formed annotation block whose type no backend knows.
#[derive(Debug, Clone, PartialEq)]
struct UnknownTest {
    /// `@number`, possibly empty.
    number:    String,
    /// `@name`.
    name:      String,
    /// `@type` as written.
    type_name: String,
}

impl std::fmt::Display for UnknownTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unsupported test type: {}. this one will be ignored: {} {}",
            self.type_name, self.number, self.name
        )
    }
}

/// What an annotation block turned out to describe.
#[derive(Debug)]
enum Header {
    /// A test to read the body of.
    Test(Test),
    /// A test whose body is skipped.
    Unknown(UnknownTest),
}

/// Forward-only cursor over the lines of one specification file.
///
/// `index` only ever moves forward; every reader below takes the cursor by
/// `&mut` and leaves it on the last line it consumed.
#[derive(Debug)]
pub struct FilePosition<'a> {
    /// Current line, 0-based.
    index:    usize,
    /// Lines of the file, trailing blank lines removed.
    lines:    Vec<&'a str>,
    /// Name used in diagnostics.
    filename: String,
}

impl<'a> FilePosition<'a> {
    /// Splits `source` into lines and drops trailing blank lines.
    pub fn new(filename: impl Into<String>, source: &'a str) -> Self {
        let mut lines: Vec<&str> = source.lines().collect();
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }

        Self {
            index: 0,
            lines,
            filename: filename.into(),
        }
    }

    /// True once every line has been consumed.
    pub fn at_end(&self) -> bool {
        self.index >= self.lines.len()
    }

    /// Location of the current line.
    pub fn location(&self) -> Location {
        Location::new(self.filename.clone(), self.index + 1)
    }

    /// The current line without trailing whitespace.
    pub fn current_line(&self) -> &'a str {
        self.lines.get(self.index).map_or("", |l| l.trim_end())
    }

    /// Moves past blank lines.
    pub fn skip_blank_lines(&mut self) {
        while self.index < self.lines.len() && self.lines[self.index].trim().is_empty() {
            self.index += 1;
        }
    }

    /// Goes to the next non-blank line and returns it without trailing
    /// whitespace.
    pub fn goto_next_line(&mut self) -> Result<&'a str, SpecError> {
        self.index += 1;
        self.skip_blank_lines();
        if self.at_end() {
            return Err(self.unexpected_end_of_input());
        }
        Ok(self.current_line())
    }

    /// Moves past the current line, which the last reader left the cursor on.
    fn advance(&mut self) {
        self.index += 1;
    }

    /// Error for running off the end of the file; points at the last line.
    fn unexpected_end_of_input(&self) -> SpecError {
        let last = self.lines.len().max(1);
        SpecError::UnexpectedEnd {
            location: Location::new(self.filename.clone(), last),
            text:     self.lines.last().map_or("", |l| l.trim_end()).to_string(),
        }
    }

    /// Syntax error at the current line.
    fn syntax_error(&self, message: impl Into<String>, text: &str) -> SpecError {
        SpecError::Syntax {
            location: self.location(),
            message:  message.into(),
            text:     text.to_string(),
        }
    }

    /// Warning prefix naming the current line.
    fn here(&self) -> String {
        format!("({}:{})", self.filename, self.index + 1)
    }
}

/// Annotations of a single test, in the order they were written.
#[derive(Debug, Default)]
struct Annotations {
    /// Raw `tag -> value` pairs; duplicates overwrite in place.
    entries:    Vec<(String, String)>,
    /// Parsed `@points`.
    points:     Option<f64>,
    /// Parsed `@timeout`.
    timeout:    Option<f64>,
    /// Parsed `@visibility`.
    visibility: Option<GradescopeVisibility>,
}

impl Annotations {
    /// Value of `tag`, if present.
    fn get(&self, tag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Stores `value`, returning the value it replaced.
    fn insert(&mut self, tag: &str, value: String) -> Option<String> {
        match self.entries.iter_mut().find(|(t, _)| t == tag) {
            Some((_, old)) => Some(std::mem::replace(old, value)),
            None => {
                self.entries.push((tag.to_string(), value));
                None
            }
        }
    }

    /// Every attribute collected so far, for diagnostics.
    fn dump(&self) -> String {
        self.entries
            .iter()
            .map(|(tag, value)| format!("  {tag}: {value}\n"))
            .collect()
    }
}

/// Parses `@points`, falling back to the default for anything that is not a
/// finite, non-negative number.
fn parse_points(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
}

/// Parses `@timeout`, which must be finite and strictly positive.
fn parse_timeout(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite() && *t > 0.0)
}

/// Reads specification files into [`Test`] records.
pub struct SpecReader<'a> {
    /// Cursor over the file.
    pos:      FilePosition<'a>,
    /// Directory that relative i/o and script file names resolve against.
    base_dir: PathBuf,
}

impl<'a> SpecReader<'a> {
    /// Creates a reader over `source`. `filename` is only used in
    /// diagnostics.
    pub fn new(filename: impl Into<String>, source: &'a str, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            pos:      FilePosition::new(filename, source),
            base_dir: base_dir.into(),
        }
    }

    /// Resolves a file named inside a test body.
    fn resolve(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Errors unless the current line opens an annotation block.
    fn expect_start_of_multiline_comment(&self) -> Result<(), SpecError> {
        let line = self.pos.current_line();
        if line != BEGIN_MULTILINE_COMMENT_DELIMITER {
            return Err(self.pos.syntax_error(
                format!(
                    "missing expected start of multiline comment: \
                     \"{BEGIN_MULTILINE_COMMENT_DELIMITER}\""
                ),
                line,
            ));
        }
        Ok(())
    }

    /// Errors unless the current line closes an annotation block.
    fn expect_end_of_multiline_comment(&self) -> Result<(), SpecError> {
        let line = self.pos.current_line();
        if line != END_MULTILINE_COMMENT_DELIMITER {
            return Err(self.pos.syntax_error(
                format!(
                    "missing expected end of multiline comment: \
                     \"{END_MULTILINE_COMMENT_DELIMITER}\""
                ),
                line,
            ));
        }
        Ok(())
    }

    /// Reads an annotation block, `/*` through `*/`.
    fn read_annotations(&mut self) -> Result<Annotations, SpecError> {
        self.expect_start_of_multiline_comment()?;

        let mut annotations = Annotations::default();
        let mut line = self.pos.goto_next_line()?;
        while line.starts_with('@') {
            let (tag, value) = line::annotation(line).map_err(|_| {
                self.pos.syntax_error(
                    "missing attribute value? (attributes look like \"@name: value\")",
                    line,
                )
            })?;

            let stored = match tag {
                "points" => {
                    let points = parse_points(value).unwrap_or_else(|| {
                        tracing::warn!(
                            "{} points attribute has invalid value ({value}), using default \
                             value ({DEFAULT_POINTS})",
                            self.pos.here()
                        );
                        DEFAULT_POINTS
                    });
                    annotations.points = Some(points);
                    points.to_string()
                }
                "timeout" => {
                    let timeout = parse_timeout(value).unwrap_or_else(|| {
                        tracing::warn!(
                            "{} timeout attribute has invalid value ({value}), using default \
                             value ({DEFAULT_TIMEOUT})",
                            self.pos.here()
                        );
                        DEFAULT_TIMEOUT
                    });
                    annotations.timeout = Some(timeout);
                    timeout.to_string()
                }
                "visibility" => {
                    let visibility = value.parse::<GradescopeVisibility>().unwrap_or_else(|_| {
                        let fallback = GradescopeVisibility::default();
                        tracing::warn!(
                            "{} visibility attribute has invalid value ({value}), using default \
                             value ({fallback})",
                            self.pos.here()
                        );
                        fallback
                    });
                    annotations.visibility = Some(visibility);
                    visibility.to_string()
                }
                _ => value.to_string(),
            };

            if let Some(old) = annotations.insert(tag, stored.clone()) {
                tracing::warn!(
                    "{} tag \"{tag}\" already exists, old value will be overwritten: {old} --> \
                     {stored}",
                    self.pos.here()
                );
            }

            line = self.pos.goto_next_line()?;
        }

        self.expect_end_of_multiline_comment()?;
        Ok(annotations)
    }

    /// Checks that `name`, `points`, `type` and (unless exempt) `target` are
    /// present and non-empty.
    fn verify_required_annotations(&self, annotations: &Annotations) -> Result<(), SpecError> {
        let exempt = annotations
            .get("type")
            .and_then(|t| t.parse::<TestType>().ok())
            .is_some_and(|t| t.is_target_exempt());

        for attribute in ["name", "points", "type", "target"] {
            if attribute == "target" && exempt {
                continue;
            }
            match annotations.get(attribute) {
                None => {
                    return Err(SpecError::MissingAttribute {
                        location:  self.pos.location(),
                        attribute: attribute.to_string(),
                        collected: annotations.dump(),
                    });
                }
                Some("") => {
                    return Err(SpecError::EmptyAttribute {
                        location:  self.pos.location(),
                        attribute: attribute.to_string(),
                        collected: annotations.dump(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Reads the annotation block of the next test and applies defaults.
    ///
    /// Returns `Ok(None)` at the end of the file.
    fn read_attributes(&mut self) -> Result<Option<Header>, SpecError> {
        self.pos.skip_blank_lines();
        if self.pos.at_end() {
            return Ok(None);
        }

        let annotations = self.read_annotations()?;
        self.verify_required_annotations(&annotations)?;

        let type_name = annotations.get("type").unwrap_or_default();
        let kind = match type_name.parse::<TestType>() {
            Ok(kind) => kind,
            Err(_) => {
                return Ok(Some(Header::Unknown(UnknownTest {
                    number:    annotations.get("number").unwrap_or_default().to_string(),
                    name:      annotations.get("name").unwrap_or_default().to_string(),
                    type_name: type_name.to_string(),
                })));
            }
        };

        let mut test = Test::new(
            annotations.get("name").unwrap_or_default(),
            annotations.points.unwrap_or(DEFAULT_POINTS),
            kind,
        );
        test.number = annotations.get("number").unwrap_or_default().to_string();
        test.target = annotations.get("target").unwrap_or_default().to_string();
        test.timeout = annotations.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if let Some(show_output) = annotations.get("show_output") {
            test.show_output = show_output.eq_ignore_ascii_case("true");
        }
        test.include = annotations.get("include").unwrap_or_default().to_string();
        test.skip = annotations
            .get("skip")
            .is_some_and(|s| s.eq_ignore_ascii_case("true"));
        test.visibility = annotations.visibility.unwrap_or_default();

        Ok(Some(Header::Test(test)))
    }

    /// Errors unless the next line is `<test>`.
    fn expect_start_of_test_block(&mut self) -> Result<(), SpecError> {
        let line = self.pos.goto_next_line()?;
        if line != BEGIN_TEST_DELIMITER {
            return Err(self.pos.syntax_error(
                format!("missing expected start of test block: \"{BEGIN_TEST_DELIMITER}\""),
                line,
            ));
        }
        Ok(())
    }

    /// Errors unless the next line is `</test>`.
    fn expect_end_of_test_block(&mut self) -> Result<(), SpecError> {
        let line = self.pos.goto_next_line()?;
        if line != END_TEST_DELIMITER {
            return Err(self.pos.syntax_error(
                format!("missing expected end of test block: \"{END_TEST_DELIMITER}\""),
                line,
            ));
        }
        Ok(())
    }

    /// Collects non-blank lines up to `</test>`.
    fn read_lines_of_test(&mut self) -> Result<Vec<&'a str>, SpecError> {
        let mut lines = Vec::new();
        loop {
            let line = self.pos.goto_next_line()?;
            if line == END_TEST_DELIMITER {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    /// Reads the body of a unit or performance test.
    fn read_unit_test(&mut self) -> Result<String, SpecError> {
        self.expect_start_of_test_block()?;
        Ok(self
            .read_lines_of_test()?
            .into_iter()
            .map(|line| format!("{line}\n"))
            .collect())
    }

    /// Reads a file named in a test body, as a syntax error if it is missing.
    fn read_named_file(&self, what: &str, name: &str, line: &str) -> Result<String, SpecError> {
        std::fs::read_to_string(self.resolve(name))
            .map_err(|e| self.pos.syntax_error(format!("{what} file not found: {name} ({e})"), line))
    }

    /// Reads the body of an i/o test: `input:` and `output:` in either order.
    /// Returns the contents of both files.
    fn read_io_test(&mut self) -> Result<(String, String), SpecError> {
        self.expect_start_of_test_block()?;

        let mut input_filename = None;
        let mut output_filename = None;
        let mut line = "";
        for _ in 0..2 {
            line = self.pos.goto_next_line()?;
            let (tag, value) = line::tag_value(line)
                .map_err(|_| self.pos.syntax_error("expected \"tag: value\" pair", line))?;
            match tag {
                "input" => input_filename = Some(value),
                "output" => output_filename = Some(value),
                _ => {
                    return Err(self
                        .pos
                        .syntax_error(format!("unexpected tag ({tag}) in i/o test"), line));
                }
            }
        }

        self.expect_end_of_test_block()?;

        let input_filename = input_filename
            .filter(|name| !name.is_empty())
            .ok_or_else(|| self.pos.syntax_error("missing input filename in i/o test", line))?;
        let output_filename = output_filename
            .filter(|name| !name.is_empty())
            .ok_or_else(|| self.pos.syntax_error("missing output filename in i/o test", line))?;

        let expected_input = self.read_named_file("input", input_filename, line)?;
        let expected_output = self.read_named_file("output", output_filename, line)?;
        Ok((expected_input, expected_output))
    }

    /// Reads the body of a script test: a script path and optional arguments.
    /// Returns `(script_args, script_content)`; a missing script is only a
    /// warning.
    fn read_script_test(&mut self) -> Result<(String, String), SpecError> {
        self.expect_start_of_test_block()?;

        let line = self.pos.goto_next_line()?.trim();
        let (script_filename, script_args) = match line.split_once(char::is_whitespace) {
            Some((path, args)) => (path, args.trim_start()),
            None => (line, ""),
        };
        if script_filename.is_empty() {
            return Err(self.pos.syntax_error(
                "missing expected name of script, e.g. scripts/example.sh",
                line,
            ));
        }

        self.expect_end_of_test_block()?;

        let script_content = match std::fs::read_to_string(self.resolve(script_filename)) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("No such file or directory: '{script_filename}' ({e})");
                String::new()
            }
        };
        Ok((script_args.to_string(), script_content))
    }

    /// Reads one raw item per line up to `</test>`.
    fn read_approved_includes(&mut self) -> Result<Vec<String>, SpecError> {
        self.expect_start_of_test_block()?;
        Ok(self
            .read_lines_of_test()?
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Reads the body of a coverage test: `main:` (required) and `source:`.
    /// Returns `(main, sources)`.
    fn read_coverage_test(&mut self) -> Result<(String, Vec<String>), SpecError> {
        self.expect_start_of_test_block()?;

        let mut source = Vec::new();
        let mut main = String::new();
        let mut line = self.pos.goto_next_line()?;
        while line != END_TEST_DELIMITER {
            let (tag, values) = line::tag_value(line)
                .map_err(|_| self.pos.syntax_error("expected \"tag: value\" pair", line))?;
            match tag {
                "source" => source = values.split_whitespace().map(str::to_string).collect(),
                "main" => main = values.to_string(),
                _ => {
                    return Err(self
                        .pos
                        .syntax_error(format!("unexpected tag ({tag}) in coverage test"), line));
                }
            }
            line = self.pos.goto_next_line()?;
        }

        if main.is_empty() {
            return Err(self
                .pos
                .syntax_error("missing expected main in coverage test", line));
        }
        Ok((main, source))
    }

    /// Consumes the body of a test without interpreting it.
    fn eat_block_of_test(&mut self) -> Result<(), SpecError> {
        let mut line = self.pos.goto_next_line()?;
        if line == EMPTY_TEST_BLOCK {
            return Ok(());
        }
        if line != BEGIN_TEST_DELIMITER {
            return Err(self.pos.syntax_error(
                format!("missing expected start of test block: \"{BEGIN_TEST_DELIMITER}\""),
                line,
            ));
        }
        while line != END_TEST_DELIMITER {
            line = self.pos.goto_next_line()?;
        }
        Ok(())
    }

    /// Reads every test in the file.
    pub fn read_tests(mut self) -> Result<Vec<Test>, SpecError> {
        let mut tests = Vec::new();
        while !self.pos.at_end() {
            let mut test = match self.read_attributes()? {
                None => break,
                Some(Header::Test(test)) => test,
                Some(Header::Unknown(unknown)) => {
                    tracing::warn!("{} {unknown}", self.pos.here());
                    self.eat_block_of_test()?;
                    self.pos.advance();
                    continue;
                }
            };

            match test.kind {
                TestType::Unit | TestType::Performance => {
                    test.code = self.read_unit_test()?;
                }
                TestType::Io => {
                    (test.expected_input, test.expected_output) = self.read_io_test()?;
                }
                TestType::Script => {
                    (test.script_args, test.script_content) = self.read_script_test()?;
                }
                TestType::ApprovedIncludes
                | TestType::Compile
                | TestType::MemoryErrors
                | TestType::Style => {
                    test.approved_includes = self.read_approved_includes()?;
                }
                TestType::Coverage => {
                    (test.include, test.approved_includes) = self.read_coverage_test()?;
                }
            }
            tests.push(test);

            self.pos.advance();
        }
        Ok(tests)
    }
}

/// Parses specification text. Relative file names inside test bodies are
/// resolved against `base_dir`.
pub fn parse_tests(filename: &str, source: &str, base_dir: &Path) -> Result<Vec<Test>, SpecError> {
    SpecReader::new(filename, source, base_dir).read_tests()
}

/// Reads a specification file. Relative file names inside test bodies are
/// resolved against the current directory.
pub fn read_tests(path: impl AsRef<Path>) -> Result<Vec<Test>, SpecError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_tests(&path.display().to_string(), &source, Path::new(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_blank_lines_are_trimmed() {
        let pos = FilePosition::new("t", "/*\n*/\n\n  \n");
        assert_eq!(pos.lines.len(), 2);
    }

    #[test]
    fn goto_next_line_skips_blank_lines() {
        let mut pos = FilePosition::new("t", "a\n\n   \nb  \nc");
        assert_eq!(pos.goto_next_line().unwrap(), "b");
        assert_eq!(pos.location().line_number, 4);
        assert_eq!(pos.goto_next_line().unwrap(), "c");
        assert!(matches!(pos.goto_next_line(), Err(SpecError::UnexpectedEnd { .. })));
    }

    #[test]
    fn unknown_types_are_reported_with_number_and_name() {
        let source = "/*\n@number: 4\n@name: mutation testing\n@points: 1\n@type: fuzz\n\
                      @target: calc.h\n*/\n<test/>\n";
        let mut reader = SpecReader::new("t", source, Path::new(""));
        let unknown = match reader.read_attributes() {
            Ok(Some(Header::Unknown(unknown))) => unknown,
            other => panic!("expected an unknown test, got {other:?}"),
        };
        assert_eq!(
            unknown.to_string(),
            "unsupported test type: fuzz. this one will be ignored: 4 mutation testing"
        );
    }

    #[test]
    fn points_and_timeouts_reject_garbage() {
        assert_eq!(parse_points("2.5"), Some(2.5));
        assert_eq!(parse_points("0"), Some(0.0));
        assert_eq!(parse_points("-1"), None);
        assert_eq!(parse_points("NaN"), None);
        assert_eq!(parse_points("ten"), None);
        assert_eq!(parse_timeout("0"), None);
        assert_eq!(parse_timeout("inf"), None);
        assert_eq!(parse_timeout("0.5"), Some(0.5));
    }

    #[test]
    fn duplicate_annotations_overwrite_in_place() {
        let mut annotations = Annotations::default();
        assert_eq!(annotations.insert("name", "a".into()), None);
        assert_eq!(annotations.insert("type", "unit".into()), None);
        assert_eq!(annotations.insert("name", "b".into()), Some("a".into()));
        assert_eq!(annotations.dump(), "  name: b\n  type: unit\n");
    }
}
