//! Resolve the question that is sent to the model

use std::fmt;

/// The effective question for one interaction. Never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query(String);

impl Query {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Use the typed question verbatim, or ask the model to describe the images
pub fn resolve(typed: Option<&str>, image_count: usize) -> Query {
    match typed {
        Some(q) if !q.is_empty() => Query(q.to_string()),
        _ if image_count > 1 => Query(format!("Describe the {image_count} images:")),
        _ => Query("Describe the image:".into()),
    }
}
