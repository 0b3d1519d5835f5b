//! Upload payloads and companies used across the integration tests.

use docintake_core::models::Company;
use serde_json::{json, Value};

/// Upload bytes the mock parser turns back into these fields.
pub fn payload(fields: Value) -> Vec<u8> {
    serde_json::to_vec(&fields).expect("Failed to encode payload")
}

pub fn invoice(account_number: &str, document_number: &str) -> Vec<u8> {
    payload(json!({
        "document_type": "Tax Invoice",
        "account_number": account_number,
        "document_number": document_number,
        "date": "2026-01-15",
        "amount": "1,250.00",
        "vat_amount": 187.5,
    }))
}

pub fn credit_note(account_number: &str, document_number: &str) -> Vec<u8> {
    payload(json!({
        "document_type": "Credit Note",
        "account_number": account_number,
        "document_number": document_number,
        "date": "15/01/2026",
        "amount": "-80.00",
    }))
}

/// Active company with reference number, code and one contact.
pub fn acme() -> Company {
    Company::new("Acme Trading")
        .with_reference_no(1001)
        .with_code("ACM")
        .with_contacts(&["accounts@acme.example"])
}

/// A company whose documents are consumed by a machine integration.
pub fn integrated() -> Company {
    Company::new("Bolt Logistics")
        .with_reference_no(2002)
        .with_contacts(&["edi@bolt.example"])
        .machine_integrated()
}
