// overture/src/generative/template.rs

//! Prompt templates with `{field_name}` placeholders.
//!
//! Parsing a template fixes the set of fields it reads, which is what a
//! generative step declares as its inputs. `{{` and `}}` produce literal braces.

use crate::core::state::{Field, StepInput};
use crate::error::{OvertureError, OvertureResult};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
  Literal(String),
  Placeholder(Field),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
  source: String,
  segments: Vec<Segment>,
  fields: Vec<Field>,
}

impl PromptTemplate {
  pub fn parse(source: impl Into<String>) -> OvertureResult<Self> {
    let source = source.into();
    let mut segments = Vec::new();
    let mut fields = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
      match c {
        '{' if chars.peek().map(|(_, n)| *n) == Some('{') => {
          chars.next();
          literal.push('{');
        }
        '}' if chars.peek().map(|(_, n)| *n) == Some('}') => {
          chars.next();
          literal.push('}');
        }
        '{' => {
          let mut name = String::new();
          let mut closed = false;
          for (_, n) in chars.by_ref() {
            match n {
              '}' => {
                closed = true;
                break;
              }
              '{' => break,
              other => name.push(other),
            }
          }
          if !closed {
            return Err(template_error(format!("unterminated placeholder starting at byte {}", pos)));
          }
          let name = name.trim();
          let field = Field::from_name(name)
            .ok_or_else(|| template_error(format!("unknown placeholder '{{{}}}'", name)))?;
          if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
          }
          segments.push(Segment::Placeholder(field));
          if !fields.contains(&field) {
            fields.push(field);
          }
        }
        '}' => return Err(template_error(format!("unmatched '}}' at byte {}", pos))),
        other => literal.push(other),
      }
    }
    if !literal.is_empty() {
      segments.push(Segment::Literal(literal));
    }

    Ok(Self {
      source,
      segments,
      fields,
    })
  }

  /// Fields referenced by the template, in order of first appearance.
  pub fn fields(&self) -> &[Field] {
    &self.fields
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn render(&self, input: &StepInput) -> OvertureResult<String> {
    let mut out = String::with_capacity(self.source.len());
    for segment in &self.segments {
      match segment {
        Segment::Literal(text) => out.push_str(text),
        Segment::Placeholder(field) => out.push_str(input.get(*field)?),
      }
    }
    Ok(out)
  }
}

impl FromStr for PromptTemplate {
  type Err = OvertureError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    PromptTemplate::parse(s)
  }
}

fn template_error(message: String) -> OvertureError {
  OvertureError::Template { message }
}
