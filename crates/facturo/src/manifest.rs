//! Manifest parsing — one normalized invoice record per data row.
//!
//! The manifest is delimiter-tolerant tabular text (comma or semicolon,
//! sniffed from the header row). Every logical column is reachable under
//! several header spellings; resolution tries the aliases in a fixed
//! priority order (English first, French second) and takes the first
//! non-empty value per row. A row missing required fields is still
//! yielded — absence surfaces later as a composition failure so one bad
//! row never aborts the whole read.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use crate::error::ManifestError;

/// One normalized manifest row, paired with the PDF entry it names.
/// Ephemeral — lives only for the duration of a single batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceRecord {
    pub filename: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub seller_name: Option<String>,
    pub seller_siret: Option<String>,
    pub seller_vat_number: Option<String>,
    pub seller_street: Option<String>,
    pub seller_zip_code: Option<String>,
    pub seller_city: Option<String>,
    pub seller_country_code: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_siret: Option<String>,
    pub buyer_vat_number: Option<String>,
    pub buyer_street: Option<String>,
    pub buyer_zip_code: Option<String>,
    pub buyer_city: Option<String>,
    pub buyer_country_code: Option<String>,
    pub currency_code: Option<String>,
    pub total_excl_tax: Option<String>,
    pub total_tax: Option<String>,
    pub total_incl_tax: Option<String>,
    pub payment_terms: Option<String>,
    pub payment_due_date: Option<String>,
}

impl InvoiceRecord {
    /// Country of the seller, defaulting to France when the column is
    /// absent or empty.
    pub fn seller_country(&self) -> &str {
        self.seller_country_code.as_deref().unwrap_or("FR")
    }

    /// Country of the buyer, defaulting to France.
    pub fn buyer_country(&self) -> &str {
        self.buyer_country_code.as_deref().unwrap_or("FR")
    }

    /// Invoice currency, defaulting to EUR.
    pub fn currency(&self) -> &str {
        self.currency_code.as_deref().unwrap_or("EUR")
    }
}

// Logical field indices into `FIELD_ALIASES` / `HeaderMap`.
const F_FILENAME: usize = 0;
const F_INVOICE_NUMBER: usize = 1;
const F_INVOICE_DATE: usize = 2;
const F_SELLER_NAME: usize = 3;
const F_SELLER_SIRET: usize = 4;
const F_SELLER_VAT: usize = 5;
const F_SELLER_STREET: usize = 6;
const F_SELLER_ZIP: usize = 7;
const F_SELLER_CITY: usize = 8;
const F_SELLER_COUNTRY: usize = 9;
const F_BUYER_NAME: usize = 10;
const F_BUYER_SIRET: usize = 11;
const F_BUYER_VAT: usize = 12;
const F_BUYER_STREET: usize = 13;
const F_BUYER_ZIP: usize = 14;
const F_BUYER_CITY: usize = 15;
const F_BUYER_COUNTRY: usize = 16;
const F_CURRENCY: usize = 17;
const F_TOTAL_EXCL: usize = 18;
const F_TOTAL_TAX: usize = 19;
const F_TOTAL_INCL: usize = 20;
const F_PAYMENT_TERMS: usize = 21;
const F_PAYMENT_DUE: usize = 22;

/// Accepted header spellings per logical field, in priority order:
/// English spellings first, French second. Per-row resolution takes the
/// first alias whose cell is non-empty.
const FIELD_ALIASES: &[&[&str]] = &[
    &["filename", "fichier", "pdf"],
    &["invoiceNumber", "invoice_number", "numero"],
    &["invoiceDate", "invoice_date", "date"],
    &["sellerName", "vendeur"],
    &["sellerSiret", "siret_vendeur"],
    &["sellerVatNumber", "tva_vendeur"],
    &["sellerStreet", "adresse_vendeur"],
    &["sellerZipCode", "cp_vendeur"],
    &["sellerCity", "ville_vendeur"],
    &["sellerCountryCode", "pays_vendeur"],
    &["buyerName", "acheteur"],
    &["buyerSiret", "siret_acheteur"],
    &["buyerVatNumber", "tva_acheteur"],
    &["buyerStreet", "adresse_acheteur"],
    &["buyerZipCode", "cp_acheteur"],
    &["buyerCity", "ville_acheteur"],
    &["buyerCountryCode", "pays_acheteur"],
    &["currencyCode", "devise"],
    &["totalHT", "ht"],
    &["totalTVA", "tva"],
    &["totalTTC", "ttc"],
    &["paymentTerms", "conditions"],
    &["paymentDueDate", "echeance"],
];

/// Column indices per logical field, in alias priority order.
#[derive(Debug)]
struct HeaderMap(Vec<Vec<usize>>);

impl HeaderMap {
    fn resolve(headers: &[String]) -> Self {
        let map = FIELD_ALIASES
            .iter()
            .map(|aliases| {
                aliases
                    .iter()
                    .filter_map(|&alias| {
                        headers
                            .iter()
                            .position(|h| h.eq_ignore_ascii_case(alias))
                    })
                    .collect()
            })
            .collect();
        Self(map)
    }

    /// First non-empty cell among the field's alias columns.
    fn value(&self, field: usize, cells: &[&str]) -> Option<String> {
        self.0[field]
            .iter()
            .filter_map(|&i| cells.get(i))
            .map(|c| c.trim())
            .find(|c| !c.is_empty())
            .map(str::to_string)
    }
}

fn sniff_delimiter(header: &str) -> char {
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas {
        ';'
    } else {
        ','
    }
}

/// Lazy single-pass reader over a manifest file. Not restartable — open
/// the file again to parse it a second time.
#[derive(Debug)]
pub struct ManifestReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    delimiter: char,
    map: HeaderMap,
}

impl ManifestReader {
    pub fn open(path: &Path) -> Result<Self, ManifestError> {
        let file = File::open(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut lines = BufReader::new(file).lines();

        // First non-blank line is the header.
        let header = loop {
            match lines.next() {
                Some(Ok(line)) if line.trim().is_empty() => continue,
                Some(Ok(line)) => break line,
                Some(Err(e)) => {
                    return Err(ManifestError::Read {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
                None => return Err(ManifestError::Empty),
            }
        };

        let header = header.trim_start_matches('\u{feff}');
        let delimiter = sniff_delimiter(header);
        let headers: Vec<String> = header
            .split(delimiter)
            .map(|h| h.trim().to_string())
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            lines,
            delimiter,
            map: HeaderMap::resolve(&headers),
        })
    }

    /// The delimiter sniffed from the header row.
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Materializes all remaining rows, failing with `TooLarge` past the
    /// batch ceiling.
    pub fn read_all(self, limit: usize) -> Result<Vec<InvoiceRecord>, ManifestError> {
        let mut records = Vec::new();
        for record in self {
            let record = record?;
            if records.len() >= limit {
                return Err(ManifestError::TooLarge { limit });
            }
            records.push(record);
        }
        Ok(records)
    }

    fn record_from_line(&self, line: &str) -> InvoiceRecord {
        let cells: Vec<&str> = line.split(self.delimiter).collect();
        let map = &self.map;
        InvoiceRecord {
            filename: map.value(F_FILENAME, &cells),
            invoice_number: map.value(F_INVOICE_NUMBER, &cells),
            invoice_date: map.value(F_INVOICE_DATE, &cells),
            seller_name: map.value(F_SELLER_NAME, &cells),
            seller_siret: map.value(F_SELLER_SIRET, &cells),
            seller_vat_number: map.value(F_SELLER_VAT, &cells),
            seller_street: map.value(F_SELLER_STREET, &cells),
            seller_zip_code: map.value(F_SELLER_ZIP, &cells),
            seller_city: map.value(F_SELLER_CITY, &cells),
            seller_country_code: map.value(F_SELLER_COUNTRY, &cells),
            buyer_name: map.value(F_BUYER_NAME, &cells),
            buyer_siret: map.value(F_BUYER_SIRET, &cells),
            buyer_vat_number: map.value(F_BUYER_VAT, &cells),
            buyer_street: map.value(F_BUYER_STREET, &cells),
            buyer_zip_code: map.value(F_BUYER_ZIP, &cells),
            buyer_city: map.value(F_BUYER_CITY, &cells),
            buyer_country_code: map.value(F_BUYER_COUNTRY, &cells),
            currency_code: map.value(F_CURRENCY, &cells),
            total_excl_tax: map.value(F_TOTAL_EXCL, &cells),
            total_tax: map.value(F_TOTAL_TAX, &cells),
            total_incl_tax: map.value(F_TOTAL_INCL, &cells),
            payment_terms: map.value(F_PAYMENT_TERMS, &cells),
            payment_due_date: map.value(F_PAYMENT_DUE, &cells),
        }
    }
}

impl Iterator for ManifestReader {
    type Item = Result<InvoiceRecord, ManifestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(Ok(self.record_from_line(&line)));
                }
                Err(e) => {
                    return Some(Err(ManifestError::Read {
                        path: self.path.clone(),
                        source: e,
                    }))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_manifest(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    // ── Delimiter sniffing ──

    #[test]
    fn test_sniff_comma() {
        assert_eq!(sniff_delimiter("filename,numero,date"), ',');
    }

    #[test]
    fn test_sniff_semicolon() {
        assert_eq!(sniff_delimiter("fichier;numero;date"), ';');
    }

    #[test]
    fn test_comma_manifest() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "m.csv",
            "filename,invoiceNumber,invoiceDate\na.pdf,FA-1,2026-01-15\n",
        );

        let reader = ManifestReader::open(&path).unwrap();
        assert_eq!(reader.delimiter(), ',');
        let records = reader.read_all(100).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename.as_deref(), Some("a.pdf"));
        assert_eq!(records[0].invoice_number.as_deref(), Some("FA-1"));
        assert_eq!(records[0].invoice_date.as_deref(), Some("2026-01-15"));
    }

    #[test]
    fn test_semicolon_manifest() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "m.csv",
            "fichier;numero;ht;tva;ttc\nb.pdf;FA-2;100,00;20,00;120,00\n",
        );

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename.as_deref(), Some("b.pdf"));
        // Semicolon delimiter leaves decimal commas intact.
        assert_eq!(records[0].total_excl_tax.as_deref(), Some("100,00"));
        assert_eq!(records[0].total_incl_tax.as_deref(), Some("120,00"));
    }

    // ── Alias resolution ──

    #[test]
    fn test_french_alias_populates_field() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "m.csv",
            "fichier,numero,siret_vendeur\na.pdf,FA-1,73282932000074\n",
        );

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records[0].seller_siret.as_deref(), Some("73282932000074"));
    }

    #[test]
    fn test_english_alias_wins_over_french() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "m.csv",
            "sellerSiret,siret_vendeur\n11111111111111,22222222222222\n",
        );

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records[0].seller_siret.as_deref(), Some("11111111111111"));
    }

    #[test]
    fn test_empty_english_cell_falls_back_to_french() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "m.csv",
            "sellerSiret,siret_vendeur\n,22222222222222\n",
        );

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records[0].seller_siret.as_deref(), Some("22222222222222"));
    }

    #[test]
    fn test_snake_case_invoice_number_alias() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "m.csv", "invoice_number\nFA-3\n");

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records[0].invoice_number.as_deref(), Some("FA-3"));
    }

    #[test]
    fn test_pdf_alias_for_filename() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "m.csv", "pdf,numero\nscan.pdf,FA-4\n");

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records[0].filename.as_deref(), Some("scan.pdf"));
    }

    #[test]
    fn test_header_matching_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "m.csv", "FILENAME,Numero\na.pdf,FA-5\n");

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records[0].filename.as_deref(), Some("a.pdf"));
        assert_eq!(records[0].invoice_number.as_deref(), Some("FA-5"));
    }

    // ── Defaults ──

    #[test]
    fn test_country_and_currency_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "m.csv", "filename\na.pdf\n");

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records[0].seller_country(), "FR");
        assert_eq!(records[0].buyer_country(), "FR");
        assert_eq!(records[0].currency(), "EUR");
    }

    #[test]
    fn test_explicit_country_and_currency() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "m.csv",
            "filename,pays_vendeur,devise\na.pdf,DE,USD\n",
        );

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records[0].seller_country(), "DE");
        assert_eq!(records[0].currency(), "USD");
    }

    // ── Row tolerance ──

    #[test]
    fn test_missing_fields_do_not_reject_row() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "m.csv",
            "filename,numero,vendeur\na.pdf,,\nb.pdf,FA-2,Acme\n",
        );

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].invoice_number.is_none());
        assert!(records[0].seller_name.is_none());
        assert_eq!(records[1].seller_name.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "m.csv", "filename\n\na.pdf\n\n\nb.pdf\n");

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_short_row_yields_partial_record() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "m.csv", "filename,numero,ttc\na.pdf\n");

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records[0].filename.as_deref(), Some("a.pdf"));
        assert!(records[0].total_incl_tax.is_none());
    }

    // ── Failure modes ──

    #[test]
    fn test_empty_manifest_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "m.csv", "");

        let err = ManifestReader::open(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Empty));
    }

    #[test]
    fn test_missing_file_rejected() {
        let err = ManifestReader::open(Path::new("/nonexistent/m.csv")).unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }

    #[test]
    fn test_row_ceiling_enforced() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from("filename\n");
        for i in 0..6 {
            content.push_str(&format!("f{}.pdf\n", i));
        }
        let path = write_manifest(&dir, "m.csv", &content);

        let err = ManifestReader::open(&path).unwrap().read_all(5).unwrap_err();
        assert!(matches!(err, ManifestError::TooLarge { limit: 5 }));

        // At the ceiling exactly is fine.
        let records = ManifestReader::open(&path).unwrap().read_all(6).unwrap();
        assert_eq!(records.len(), 6);
    }

    #[test]
    fn test_bom_stripped_from_header() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "m.csv", "\u{feff}filename\na.pdf\n");

        let records = ManifestReader::open(&path).unwrap().read_all(100).unwrap();
        assert_eq!(records[0].filename.as_deref(), Some("a.pdf"));
    }
}
