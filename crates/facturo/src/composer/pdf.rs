//! PDF attachment — embeds the generated CII XML into the source PDF.

use lopdf::{dictionary, Document, Object, Stream};

use crate::error::ComposeError;

/// Canonical name of the attached payload.
pub const ATTACHMENT_NAME: &str = "factur-x.xml";

fn pdf_err<E: std::fmt::Display>(e: E) -> ComposeError {
    ComposeError::Pdf(e.to_string())
}

/// Loads the source PDF, attaches `xml` as an embedded file named
/// `factur-x.xml` (EmbeddedFiles name tree + AF array, AFRelationship
/// Data) and returns the rewritten document bytes.
pub(crate) fn embed_xml(pdf_bytes: &[u8], xml: &[u8]) -> Result<Vec<u8>, ComposeError> {
    let mut doc = Document::load_mem(pdf_bytes).map_err(pdf_err)?;

    let embedded = Stream::new(
        dictionary! {
            "Type" => "EmbeddedFile",
            "Subtype" => "text/xml",
            "Params" => dictionary! {
                "Size" => xml.len() as i64,
            },
        },
        xml.to_vec(),
    );
    let embedded_id = doc.add_object(Object::Stream(embedded));

    let filespec_id = doc.add_object(dictionary! {
        "Type" => "Filespec",
        "F" => Object::string_literal(ATTACHMENT_NAME),
        "UF" => Object::string_literal(ATTACHMENT_NAME),
        "Desc" => Object::string_literal("Factur-X invoice data"),
        "AFRelationship" => "Data",
        "EF" => dictionary! {
            "F" => embedded_id,
            "UF" => embedded_id,
        },
    });

    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(pdf_err)?;
    let catalog = doc
        .get_object_mut(catalog_id)
        .and_then(Object::as_dict_mut)
        .map_err(pdf_err)?;

    catalog.set(
        "Names",
        dictionary! {
            "EmbeddedFiles" => dictionary! {
                "Names" => vec![Object::string_literal(ATTACHMENT_NAME), filespec_id.into()],
            },
        },
    );
    catalog.set("AF", vec![Object::Reference(filespec_id)]);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(pdf_err)?;
    Ok(buffer)
}
