//! Evidence file loading.
//!
//! The pipeline consumes normalized documents and snapshots; this module
//! reads them from JSON files named on the command line and validates the
//! ranged fields before they enter the session.

use crate::models::{BankingSnapshot, Document, PaymentSnapshot};
use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

/// Load the parsed-document list from a JSON file.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents file: {}", path.display()))?;

    let documents: Vec<Document> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse documents file: {}", path.display()))?;

    for doc in &documents {
        if !(0.0..=1.0).contains(&doc.confidence) {
            bail!(
                "document {} has confidence {} outside [0, 1]",
                doc.filename,
                doc.confidence
            );
        }
        if !(0.0..=1.0).contains(&doc.trust_score) {
            bail!(
                "document {} has trust score {} outside [0, 1]",
                doc.filename,
                doc.trust_score
            );
        }
    }

    info!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

/// Load a payment-processor snapshot from a JSON file.
pub fn load_payment_snapshot(path: &Path) -> Result<PaymentSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read payment snapshot: {}", path.display()))?;

    let snapshot: PaymentSnapshot = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse payment snapshot: {}", path.display()))?;

    for customer in &snapshot.top_customers {
        if !(0.0..=1.0).contains(&customer.share) {
            bail!(
                "customer {} has revenue share {} outside [0, 1]",
                customer.name,
                customer.share
            );
        }
    }

    Ok(snapshot)
}

/// Load a banking snapshot from a JSON file.
pub fn load_banking_snapshot(path: &Path) -> Result<BankingSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read banking snapshot: {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse banking snapshot: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("bankability-test-{}", name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_documents() {
        let path = write_temp(
            "docs.json",
            r#"[{
                "type": "profit_and_loss",
                "filename": "pnl.pdf",
                "parsed_at": "2025-11-02T10:00:00Z",
                "confidence": 0.92,
                "data": {"2024": {"revenue": 100000.0, "net_income": 9000.0}},
                "raw_text": "FY2024 statement",
                "trust_score": 0.85
            }]"#,
        );

        let documents = load_documents(&path).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].filename, "pnl.pdf");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_documents_rejects_bad_confidence() {
        let path = write_temp(
            "bad-docs.json",
            r#"[{
                "type": "other",
                "filename": "x.pdf",
                "parsed_at": "2025-11-02T10:00:00Z",
                "confidence": 1.4,
                "data": {},
                "trust_score": 0.5
            }]"#,
        );

        let err = load_documents(&path).unwrap_err();
        assert!(err.to_string().contains("confidence"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_payment_snapshot() {
        let path = write_temp(
            "payments.json",
            r#"{
                "mrr": 42000.0,
                "growth_rate": 0.04,
                "customer_count": 31,
                "churn_rate": 0.02,
                "top_customers": [{"name": "Anchor Corp", "share": 0.4}],
                "payment_history": {"on_time_rate": 0.97, "disputed_count": 1}
            }"#,
        );

        let snapshot = load_payment_snapshot(&path).unwrap();
        assert_eq!(snapshot.customer_count, 31);
        assert_eq!(snapshot.top_customers[0].share, 0.4);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_error_includes_path() {
        let err = load_documents(Path::new("/nonexistent/docs.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/docs.json"));
    }
}
