//! Cross-Industry-Invoice XML generation (EN 16931 profile).

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::ComposeError;
use crate::manifest::InvoiceRecord;

const NS_RSM: &str = "urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100";
const NS_RAM: &str =
    "urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100";
const NS_UDT: &str = "urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100";

const GUIDELINE_EN16931: &str = "urn:cen.eu:en16931:2017";

/// Commercial invoice document type code.
const TYPE_CODE_INVOICE: &str = "380";

type W = Writer<Cursor<Vec<u8>>>;

fn xml_err<E: std::fmt::Display>(e: E) -> ComposeError {
    ComposeError::Xml(e.to_string())
}

fn open(w: &mut W, name: &str) -> Result<(), ComposeError> {
    w.write_event(Event::Start(BytesStart::new(name))).map_err(xml_err)
}

fn close(w: &mut W, name: &str) -> Result<(), ComposeError> {
    w.write_event(Event::End(BytesEnd::new(name))).map_err(xml_err)
}

fn leaf(w: &mut W, name: &str, value: &str) -> Result<(), ComposeError> {
    open(w, name)?;
    w.write_event(Event::Text(BytesText::new(value))).map_err(xml_err)?;
    close(w, name)
}

fn leaf_attr(w: &mut W, name: &str, attr: (&str, &str), value: &str) -> Result<(), ComposeError> {
    let mut start = BytesStart::new(name);
    start.push_attribute(attr);
    w.write_event(Event::Start(start)).map_err(xml_err)?;
    w.write_event(Event::Text(BytesText::new(value))).map_err(xml_err)?;
    close(w, name)
}

fn date_102(w: &mut W, name: &str, value: &str) -> Result<(), ComposeError> {
    open(w, name)?;
    leaf_attr(w, "udt:DateTimeString", ("format", "102"), value)?;
    close(w, name)
}

/// Serializes the record into a CII invoice document. `issue_date` and
/// `due_date` are already in format 102 (`YYYYMMDD`); required fields
/// have been validated by the caller.
pub(crate) fn build_cii_xml(
    record: &InvoiceRecord,
    issue_date: &str,
    due_date: Option<&str>,
) -> Result<Vec<u8>, ComposeError> {
    let mut w = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    let mut root = BytesStart::new("rsm:CrossIndustryInvoice");
    root.push_attribute(("xmlns:rsm", NS_RSM));
    root.push_attribute(("xmlns:ram", NS_RAM));
    root.push_attribute(("xmlns:udt", NS_UDT));
    w.write_event(Event::Start(root)).map_err(xml_err)?;

    // Document context
    open(&mut w, "rsm:ExchangedDocumentContext")?;
    open(&mut w, "ram:GuidelineSpecifiedDocumentContextParameter")?;
    leaf(&mut w, "ram:ID", GUIDELINE_EN16931)?;
    close(&mut w, "ram:GuidelineSpecifiedDocumentContextParameter")?;
    close(&mut w, "rsm:ExchangedDocumentContext")?;

    // Document header
    open(&mut w, "rsm:ExchangedDocument")?;
    leaf(&mut w, "ram:ID", record.invoice_number.as_deref().unwrap_or_default())?;
    leaf(&mut w, "ram:TypeCode", TYPE_CODE_INVOICE)?;
    date_102(&mut w, "ram:IssueDateTime", issue_date)?;
    close(&mut w, "rsm:ExchangedDocument")?;

    // Transaction
    open(&mut w, "rsm:SupplyChainTradeTransaction")?;

    open(&mut w, "ram:ApplicableHeaderTradeAgreement")?;
    write_party(
        &mut w,
        "ram:SellerTradeParty",
        record.seller_name.as_deref().unwrap_or_default(),
        record.seller_siret.as_deref(),
        record.seller_vat_number.as_deref(),
        record.seller_street.as_deref(),
        record.seller_zip_code.as_deref(),
        record.seller_city.as_deref(),
        record.seller_country(),
    )?;
    write_party(
        &mut w,
        "ram:BuyerTradeParty",
        record.buyer_name.as_deref().unwrap_or_default(),
        record.buyer_siret.as_deref(),
        record.buyer_vat_number.as_deref(),
        record.buyer_street.as_deref(),
        record.buyer_zip_code.as_deref(),
        record.buyer_city.as_deref(),
        record.buyer_country(),
    )?;
    close(&mut w, "ram:ApplicableHeaderTradeAgreement")?;

    w.write_event(Event::Empty(BytesStart::new("ram:ApplicableHeaderTradeDelivery")))
        .map_err(xml_err)?;

    open(&mut w, "ram:ApplicableHeaderTradeSettlement")?;
    leaf(&mut w, "ram:InvoiceCurrencyCode", record.currency())?;
    if record.payment_terms.is_some() || due_date.is_some() {
        open(&mut w, "ram:SpecifiedTradePaymentTerms")?;
        if let Some(terms) = record.payment_terms.as_deref() {
            leaf(&mut w, "ram:Description", terms)?;
        }
        if let Some(due) = due_date {
            date_102(&mut w, "ram:DueDateDateTime", due)?;
        }
        close(&mut w, "ram:SpecifiedTradePaymentTerms")?;
    }
    open(&mut w, "ram:SpecifiedTradeSettlementHeaderMonetarySummation")?;
    leaf(
        &mut w,
        "ram:TaxBasisTotalAmount",
        &amount(record.total_excl_tax.as_deref().unwrap_or_default()),
    )?;
    leaf_attr(
        &mut w,
        "ram:TaxTotalAmount",
        ("currencyID", record.currency()),
        &amount(record.total_tax.as_deref().unwrap_or_default()),
    )?;
    leaf(
        &mut w,
        "ram:GrandTotalAmount",
        &amount(record.total_incl_tax.as_deref().unwrap_or_default()),
    )?;
    leaf(
        &mut w,
        "ram:DuePayableAmount",
        &amount(record.total_incl_tax.as_deref().unwrap_or_default()),
    )?;
    close(&mut w, "ram:SpecifiedTradeSettlementHeaderMonetarySummation")?;
    close(&mut w, "ram:ApplicableHeaderTradeSettlement")?;

    close(&mut w, "rsm:SupplyChainTradeTransaction")?;
    close(&mut w, "rsm:CrossIndustryInvoice")?;

    Ok(w.into_inner().into_inner())
}

#[allow(clippy::too_many_arguments)]
fn write_party(
    w: &mut W,
    element: &str,
    name: &str,
    siret: Option<&str>,
    vat: Option<&str>,
    street: Option<&str>,
    zip_code: Option<&str>,
    city: Option<&str>,
    country: &str,
) -> Result<(), ComposeError> {
    open(w, element)?;
    leaf(w, "ram:Name", name)?;
    if let Some(siret) = siret {
        open(w, "ram:SpecifiedLegalOrganization")?;
        // 0002 = SIRENE registry scheme.
        leaf_attr(w, "ram:ID", ("schemeID", "0002"), siret)?;
        close(w, "ram:SpecifiedLegalOrganization")?;
    }
    open(w, "ram:PostalTradeAddress")?;
    if let Some(zip_code) = zip_code {
        leaf(w, "ram:PostcodeCode", zip_code)?;
    }
    if let Some(street) = street {
        leaf(w, "ram:LineOne", street)?;
    }
    if let Some(city) = city {
        leaf(w, "ram:CityName", city)?;
    }
    leaf(w, "ram:CountryID", country)?;
    close(w, "ram:PostalTradeAddress")?;
    if let Some(vat) = vat {
        open(w, "ram:SpecifiedTaxRegistration")?;
        leaf_attr(w, "ram:ID", ("schemeID", "VA"), vat)?;
        close(w, "ram:SpecifiedTaxRegistration")?;
    }
    close(w, element)
}

/// Amounts keep French decimal commas out of the XML.
fn amount(raw: &str) -> String {
    raw.trim().replace(',', ".")
}
