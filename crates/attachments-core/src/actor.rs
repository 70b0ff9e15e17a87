use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attachment::Attachment;
use crate::AttachmentsError;

/// App label that prefixes fully qualified capability names.
pub const APP_LABEL: &str = "attachments";

/// A named permission an actor may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AddAttachment,
    DeleteAttachment,
    /// Delete attachments created by someone else.
    DeleteForeignAttachments,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::AddAttachment,
        Capability::DeleteAttachment,
        Capability::DeleteForeignAttachments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::AddAttachment => "add_attachment",
            Capability::DeleteAttachment => "delete_attachment",
            Capability::DeleteForeignAttachments => "delete_foreign_attachments",
        }
    }

    /// Accepts both the bare codename and the `attachments.`-qualified form.
    pub fn parse_str(s: &str) -> Option<Self> {
        let codename = s
            .strip_prefix(APP_LABEL)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(s);
        match codename {
            "add_attachment" => Some(Capability::AddAttachment),
            "delete_attachment" => Some(Capability::DeleteAttachment),
            "delete_foreign_attachments" => Some(Capability::DeleteForeignAttachments),
            _ => None,
        }
    }

    pub fn qualified(&self) -> String {
        format!("{APP_LABEL}.{}", self.as_str())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = AttachmentsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::parse_str(s).ok_or_else(|| AttachmentsError::UnknownCapability(s.to_string()))
    }
}

/// The user performing a request, as seen by this add-on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub username: String,
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    #[serde(default)]
    pub is_superuser: bool,
}

impl Actor {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            capabilities: BTreeSet::new(),
            is_superuser: false,
        }
    }

    pub fn superuser(username: impl Into<String>) -> Self {
        Self {
            is_superuser: true,
            ..Self::new(username)
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    /// Superusers implicitly hold every capability.
    pub fn has_perm(&self, capability: Capability) -> bool {
        self.is_superuser || self.capabilities.contains(&capability)
    }

    pub fn is_creator_of(&self, attachment: &Attachment) -> bool {
        self.username == attachment.creator
    }

    /// `delete_foreign_attachments` overrides ownership; plain
    /// `delete_attachment` only covers the actor's own uploads.
    pub fn can_delete(&self, attachment: &Attachment) -> bool {
        self.has_perm(Capability::DeleteForeignAttachments)
            || (self.has_perm(Capability::DeleteAttachment) && self.is_creator_of(attachment))
    }
}
