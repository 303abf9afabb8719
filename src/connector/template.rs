use crate::core::{Datum, EnrichError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(usize),
}

/// A request body pattern with positional placeholders.
///
/// `{0}` refers to the first request variable, `{}` to the next implicit
/// position, and `{{` / `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    pattern: String,
    segments: Vec<Segment>,
}

impl RequestTemplate {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid =
            || EnrichError::configuration(format!("Request pattern '{}' is invalid", pattern));

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut next_implicit = 0;
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut spec = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => spec.push(ch),
                            None => return Err(invalid()),
                        }
                    }
                    let index = if spec.is_empty() {
                        let index = next_implicit;
                        next_implicit += 1;
                        index
                    } else {
                        spec.trim().parse::<usize>().map_err(|_| invalid())?
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(index));
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(invalid()),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Number of variables the pattern needs.
    pub fn arity(&self) -> usize {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(index) => Some(index + 1),
                Segment::Literal(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    pub fn render(&self, variables: &[Datum]) -> Result<String> {
        let mut body = String::with_capacity(self.pattern.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => body.push_str(text),
                Segment::Placeholder(index) => {
                    let value = variables.get(*index).ok_or_else(|| {
                        EnrichError::configuration(format!(
                            "Request pattern '{}' is incompatible with variable",
                            self.pattern
                        ))
                    })?;
                    body.push_str(&value.to_string());
                }
            }
        }
        Ok(body)
    }
}
