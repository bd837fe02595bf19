//! Document composition — turns a normalized invoice record plus a source
//! PDF into a Factur-X document (CII XML attached inside the PDF).

pub mod pdf;
pub mod xml;

use chrono::NaiveDate;

use crate::error::ComposeError;
use crate::manifest::InvoiceRecord;

/// Leading bytes every acceptable input PDF must carry.
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Checks the `%PDF-` magic bytes.
pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Given normalized invoice fields and a PDF byte buffer, returns a
/// compliant output PDF.
pub trait DocumentComposer: Send + Sync {
    fn compose(&self, record: &InvoiceRecord, pdf_bytes: &[u8]) -> Result<Vec<u8>, ComposeError>;
}

/// The in-repo composer: generates EN 16931 CII XML and embeds it as
/// `factur-x.xml` in the source PDF.
pub struct FacturXComposer;

impl FacturXComposer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FacturXComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentComposer for FacturXComposer {
    fn compose(&self, record: &InvoiceRecord, pdf_bytes: &[u8]) -> Result<Vec<u8>, ComposeError> {
        // Required fields; everything else degrades to omitted XML elements.
        require(&record.invoice_number, "invoiceNumber")?;
        require(&record.seller_name, "sellerName")?;
        require(&record.buyer_name, "buyerName")?;
        require(&record.total_excl_tax, "totalHT")?;
        require(&record.total_tax, "totalTVA")?;
        require(&record.total_incl_tax, "totalTTC")?;

        let raw_date = require(&record.invoice_date, "invoiceDate")?;
        let issue_date = normalize_date(raw_date)?;
        let due_date = match record.payment_due_date.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(normalize_date(raw)?),
            _ => None,
        };

        let xml = xml::build_cii_xml(record, &issue_date, due_date.as_deref())?;
        pdf::embed_xml(pdf_bytes, &xml)
    }
}

fn require<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ComposeError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ComposeError::MissingField(field))
}

/// Normalizes a manifest date into CII format 102 (`YYYYMMDD`).
/// Accepts `YYYY-MM-DD`, `DD/MM/YYYY` and `DD.MM.YYYY`.
pub(crate) fn normalize_date(raw: &str) -> Result<String, ComposeError> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date.format("%Y%m%d").to_string());
        }
    }
    Err(ComposeError::InvalidDate(raw.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn full_record() -> InvoiceRecord {
        InvoiceRecord {
            filename: Some("invoice.pdf".to_string()),
            invoice_number: Some("FA-2026-001".to_string()),
            invoice_date: Some("2026-01-15".to_string()),
            seller_name: Some("Acme SARL".to_string()),
            seller_siret: Some("73282932000074".to_string()),
            seller_vat_number: Some("FR32123456789".to_string()),
            seller_street: Some("1 rue de la Paix".to_string()),
            seller_zip_code: Some("75002".to_string()),
            seller_city: Some("Paris".to_string()),
            buyer_name: Some("Client SAS".to_string()),
            total_excl_tax: Some("100.00".to_string()),
            total_tax: Some("20.00".to_string()),
            total_incl_tax: Some("120.00".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_pdf_magic() {
        assert!(has_pdf_magic(b"%PDF-1.7 rest of file"));
        assert!(!has_pdf_magic(b"PK\x03\x04"));
        assert!(!has_pdf_magic(b""));
        assert!(!has_pdf_magic(b"%PD"));
    }

    #[test]
    fn test_normalize_date_formats() {
        assert_eq!(normalize_date("2026-01-15").unwrap(), "20260115");
        assert_eq!(normalize_date("15/01/2026").unwrap(), "20260115");
        assert_eq!(normalize_date("15.01.2026").unwrap(), "20260115");
        assert_eq!(normalize_date(" 2026-01-15 ").unwrap(), "20260115");
    }

    #[test]
    fn test_normalize_date_rejects_garbage() {
        assert!(matches!(
            normalize_date("janvier 2026"),
            Err(ComposeError::InvalidDate(_))
        ));
        assert!(matches!(
            normalize_date("2026-13-40"),
            Err(ComposeError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_compose_produces_pdf_with_attachment() {
        let composer = FacturXComposer::new();
        let source = test_support::minimal_pdf();

        let out = composer.compose(&full_record(), &source).unwrap();

        assert!(has_pdf_magic(&out));
        let haystack = String::from_utf8_lossy(&out);
        assert!(haystack.contains("factur-x.xml"));
        assert!(haystack.contains("EmbeddedFile"));
    }

    #[test]
    fn test_compose_missing_invoice_number() {
        let composer = FacturXComposer::new();
        let mut record = full_record();
        record.invoice_number = None;

        let err = composer.compose(&record, &test_support::minimal_pdf()).unwrap_err();
        assert!(matches!(err, ComposeError::MissingField("invoiceNumber")));
    }

    #[test]
    fn test_compose_blank_total_is_missing() {
        let composer = FacturXComposer::new();
        let mut record = full_record();
        record.total_incl_tax = Some("  ".to_string());

        let err = composer.compose(&record, &test_support::minimal_pdf()).unwrap_err();
        assert!(matches!(err, ComposeError::MissingField("totalTTC")));
    }

    #[test]
    fn test_compose_bad_date() {
        let composer = FacturXComposer::new();
        let mut record = full_record();
        record.invoice_date = Some("not a date".to_string());

        let err = composer.compose(&record, &test_support::minimal_pdf()).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidDate(_)));
    }

    #[test]
    fn test_compose_rejects_non_pdf_input() {
        let composer = FacturXComposer::new();
        let err = composer.compose(&full_record(), b"not a pdf at all").unwrap_err();
        assert!(matches!(err, ComposeError::Pdf(_)));
    }
}
