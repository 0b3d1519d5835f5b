use serde_json::Value;

use super::NotifyError;

pub const DOCUMENT_AVAILABLE: &str = "document_available";
pub const DOCUMENT_DELETED: &str = "document_deleted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub body: String,
}

fn field<'a>(context: &'a Value, key: &str) -> &'a str {
    context.get(key).and_then(Value::as_str).unwrap_or("-")
}

/// Plain-text subject and body for a template.
pub fn render(template: &str, context: &Value) -> Result<Rendered, NotifyError> {
    let kind = field(context, "document_kind").replace('_', " ");
    let number = field(context, "document_number");
    let company = field(context, "company_name");

    match template {
        DOCUMENT_AVAILABLE => Ok(Rendered {
            subject: format!("New {} {} available", kind, number),
            body: format!(
                "Hello {},\n\nA new {} ({}) dated {} has been added to your account.\n",
                company,
                kind,
                number,
                field(context, "issue_date")
            ),
        }),
        DOCUMENT_DELETED => Ok(Rendered {
            subject: format!("{} {} removed", kind, number),
            body: format!(
                "Hello {},\n\nThe {} {} has reached the end of its retention period \
                 and was permanently deleted on {}.\n",
                company,
                kind,
                number,
                field(context, "deleted_at")
            ),
        }),
        other => Err(NotifyError::UnknownTemplate(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_available_notice() {
        let rendered = render(
            DOCUMENT_AVAILABLE,
            &json!({
                "document_kind": "credit_note",
                "document_number": "CN-7",
                "company_name": "Acme",
                "issue_date": "2026-03-01",
            }),
        )
        .unwrap();
        assert_eq!(rendered.subject, "New credit note CN-7 available");
        assert!(rendered.body.contains("Hello Acme"));
        assert!(rendered.body.contains("2026-03-01"));
    }

    #[test]
    fn missing_fields_render_as_dash() {
        let rendered = render(DOCUMENT_DELETED, &json!({})).unwrap();
        assert_eq!(rendered.subject, "- - removed");
    }

    #[test]
    fn unknown_template_is_an_error() {
        assert!(matches!(
            render("weekly_digest", &json!({})),
            Err(NotifyError::UnknownTemplate(_))
        ));
    }
}
