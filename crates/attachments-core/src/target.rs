use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AttachmentsError;

/// Any entity that files can be attached to.
///
/// The pair `(type_key, object_id)` must identify the entity uniquely across
/// every kind in the host application.
pub trait Attachable: Send + Sync {
    /// Stable, lowercase name for the entity kind (e.g. `project`).
    fn type_key(&self) -> String;

    fn object_id(&self) -> String;

    fn target_ref(&self) -> TargetRef {
        TargetRef::new(self.type_key(), self.object_id())
    }
}

/// Polymorphic reference to an attachment target.
///
/// Kind and id always travel together, so a record can never point at half
/// a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetRef {
    #[serde(rename = "target_type")]
    pub kind: String,
    #[serde(rename = "target_id")]
    pub id: String,
}

impl TargetRef {
    /// Build a reference without validation. The kind is lowercased.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into().to_lowercase(),
            id: id.into(),
        }
    }

    /// Build a reference from untrusted input (URL segments, form data).
    ///
    /// Both parts end up in storage paths, so they must be single,
    /// non-empty path segments.
    pub fn parse(kind: &str, id: &str) -> Result<Self, AttachmentsError> {
        check_segment("kind", kind)?;
        check_segment("id", id)?;
        Ok(Self::new(kind, id))
    }
}

fn check_segment(field: &str, value: &str) -> Result<(), AttachmentsError> {
    if value.trim().is_empty() {
        return Err(AttachmentsError::InvalidTarget(format!("{field} is empty")));
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(AttachmentsError::InvalidTarget(format!(
            "{field} is not a single path segment: {value:?}"
        )));
    }
    Ok(())
}

impl Attachable for TargetRef {
    fn type_key(&self) -> String {
        self.kind.clone()
    }

    fn object_id(&self) -> String {
        self.id.clone()
    }

    fn target_ref(&self) -> TargetRef {
        self.clone()
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Project {
        id: u64,
    }

    impl Attachable for Project {
        fn type_key(&self) -> String {
            "Project".into()
        }

        fn object_id(&self) -> String {
            self.id.to_string()
        }
    }

    #[test]
    fn target_ref_from_attachable_lowercases_kind() {
        let target = Project { id: 42 }.target_ref();
        assert_eq!(target.kind, "project");
        assert_eq!(target.id, "42");
        assert_eq!(target.to_string(), "project:42");
    }

    #[test]
    fn parse_rejects_path_traversal() {
        assert!(TargetRef::parse("project", "42").is_ok());
        assert!(TargetRef::parse("", "42").is_err());
        assert!(TargetRef::parse("project", "  ").is_err());
        assert!(TargetRef::parse("..", "42").is_err());
        assert!(TargetRef::parse("project", "4/2").is_err());
        assert!(TargetRef::parse("pro\\ject", "42").is_err());
    }

    #[test]
    fn serializes_as_target_type_and_id() {
        let json = serde_json::to_value(TargetRef::new("project", "42")).unwrap();
        assert_eq!(json["target_type"], "project");
        assert_eq!(json["target_id"], "42");
    }
}
