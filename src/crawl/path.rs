use crate::error::PathError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static STEP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^\[\]/\s]+)(?:\[(\d+)\])?$").unwrap()
});

/// Which sub-tree of a record instance a path starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Body {
    /// The base feature body (`Feature/` prefix, or no prefix)
    #[default]
    Feature,
    /// The optional vendor-extension body (`Extension/` prefix)
    Extension,
}

/// One path step: a field name with an optional list index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub index: Option<usize>,
}

/// Parsed form of `step ("/" step)*` with `step = name ["[" index "]"]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathExpression {
    body: Body,
    steps: Vec<Step>,
    text: String,
}

impl PathExpression {
    pub fn body(&self) -> Body {
        self.body
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for PathExpression {
    type Err = PathError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut segments: Vec<&str> = text.split('/').collect();

        let body = match segments.first().copied() {
            Some("Extension") if segments.len() > 1 => Body::Extension,
            Some("Feature") if segments.len() > 1 => Body::Feature,
            _ => Body::default(),
        };
        if segments.len() > 1 && matches!(segments[0], "Extension" | "Feature") {
            segments.remove(0);
        }

        if text.trim().is_empty() {
            return Err(PathError::Empty);
        }

        let steps = segments
            .into_iter()
            .map(|segment| {
                let caps = STEP_REGEX
                    .captures(segment)
                    .ok_or_else(|| PathError::InvalidStep(segment.to_string()))?;
                let index = match caps.get(2) {
                    Some(m) => Some(
                        m.as_str()
                            .parse::<usize>()
                            .map_err(|_| PathError::InvalidStep(segment.to_string()))?,
                    ),
                    None => None,
                };
                Ok(Step {
                    name: caps[1].to_string(),
                    index,
                })
            })
            .collect::<Result<Vec<_>, PathError>>()?;

        Ok(PathExpression {
            body,
            steps,
            text: text.to_string(),
        })
    }
}

impl TryFrom<String> for PathExpression {
    type Error = PathError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<PathExpression> for String {
    fn from(path: PathExpression) -> Self {
        path.text
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
