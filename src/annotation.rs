use serde::Serialize;

/// Annotation parsing error enum.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationError {
    /// The first token of a line is not a non-negative integer.
    #[error("invalid class id `{token}` on line {line}")]
    InvalidClassId {
        /// One-based line number.
        line: usize,
        /// The offending token.
        token: String,
    },
}

/// One label line: a class id followed by opaque fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    /// Class index of the object.
    pub class_id: u32,
    /// Remaining tokens (box geometry), passed through untouched.
    pub fields: Vec<String>,
}

impl Annotation {
    /// Parse a single label line.
    ///
    /// Returns `Ok(None)` for lines without tokens.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Option<Self>, AnnotationError> {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            return Ok(None);
        };
        let class_id = first
            .parse::<u32>()
            .map_err(|_| AnnotationError::InvalidClassId {
                line: line_no,
                token: first.to_string(),
            })?;
        Ok(Some(Self {
            class_id,
            fields: tokens.map(str::to_string).collect(),
        }))
    }
}

impl std::fmt::Display for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.class_id)?;
        for field in &self.fields {
            write!(f, " {field}")?;
        }
        Ok(())
    }
}

/// Result of parsing a whole label file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLabel {
    /// Well-formed annotations in line order.
    pub annotations: Vec<Annotation>,
    /// Lines whose class id could not be parsed.
    pub malformed: Vec<AnnotationError>,
}

impl ParsedLabel {
    /// Whether every line parsed.
    pub fn is_well_formed(&self) -> bool {
        self.malformed.is_empty()
    }
}

/// Parse the contents of a label file, skipping blank lines.
pub fn parse_label(contents: &str) -> ParsedLabel {
    let mut parsed = ParsedLabel::default();
    for (index, line) in contents.lines().enumerate() {
        match Annotation::parse_line(line, index + 1) {
            Ok(Some(annotation)) => parsed.annotations.push(annotation),
            Ok(None) => {}
            Err(err) => parsed.malformed.push(err),
        }
    }
    parsed
}

/// Render annotations back into label file contents, one `\n`-terminated line each.
pub fn render_label(annotations: &[Annotation]) -> String {
    annotations.iter().map(|a| format!("{a}\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let annotation = Annotation::parse_line("3 0.5 0.5 0.2 0.1", 1)
            .unwrap()
            .unwrap();
        assert_eq!(annotation.class_id, 3);
        assert_eq!(annotation.fields, vec!["0.5", "0.5", "0.2", "0.1"]);
    }

    #[test]
    fn test_parse_blank_line() {
        assert_eq!(Annotation::parse_line("   \t", 4), Ok(None));
    }

    #[test]
    fn test_parse_invalid_class_id() {
        let err = Annotation::parse_line("-1 .1 .2 .3 .4", 7).unwrap_err();
        assert_eq!(
            err,
            AnnotationError::InvalidClassId {
                line: 7,
                token: "-1".to_string()
            }
        );
        assert!(Annotation::parse_line("person .1 .2", 1).is_err());
        assert!(Annotation::parse_line("1.0 .1 .2", 1).is_err());
    }

    #[test]
    fn test_parse_label_keeps_order() {
        let parsed = parse_label("2 a b\n\nx 1 2\n0 c d\n");
        let ids: Vec<u32> = parsed.annotations.iter().map(|a| a.class_id).collect();
        assert_eq!(ids, vec![2, 0]);
        assert_eq!(parsed.malformed.len(), 1);
        assert!(!parsed.is_well_formed());
    }

    #[test]
    fn test_render_normalizes_whitespace() {
        let parsed = parse_label("1   .1\t.2 .3 .4");
        assert_eq!(render_label(&parsed.annotations), "1 .1 .2 .3 .4\n");
        assert_eq!(render_label(&[]), "");
    }
}
