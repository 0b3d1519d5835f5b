use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An owning organization. Read-mostly from the intake pipeline's perspective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    /// Authoritative numeric account reference.
    pub reference_no: Option<i64>,
    /// Short stable code.
    pub code: Option<String>,
    /// Free-text reference, last-resort match target.
    pub reference_text: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    /// Machine-integrated companies consume documents by API; no human notifications.
    pub machine_integrated: bool,
    pub contact_emails: Vec<String>,
}

impl Company {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            reference_no: None,
            code: None,
            reference_text: None,
            parent_id: None,
            is_active: true,
            machine_integrated: false,
            contact_emails: Vec::new(),
        }
    }

    pub fn with_reference_no(mut self, reference_no: i64) -> Self {
        self.reference_no = Some(reference_no);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_reference_text(mut self, text: impl Into<String>) -> Self {
        self.reference_text = Some(text.into());
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_contacts(mut self, emails: &[&str]) -> Self {
        self.contact_emails = emails.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn machine_integrated(mut self) -> Self {
        self.machine_integrated = true;
        self
    }

    /// Whether a human should be emailed about this company's documents.
    pub fn wants_notifications(&self) -> bool {
        !self.machine_integrated && !self.contact_emails.is_empty()
    }
}
