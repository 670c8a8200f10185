//! Helpers for building small fillable PDFs in tests.

use lopdf::{dictionary, Document, Object, Stream};

pub struct TestField {
    pub name: &'static str,
    pub field_type: &'static [u8],
    pub flags: Option<i64>,
}

impl TestField {
    pub fn text(name: &'static str) -> Self {
        Self {
            name,
            field_type: b"Tx",
            flags: None,
        }
    }

    pub fn checkbox(name: &'static str) -> Self {
        Self {
            name,
            field_type: b"Btn",
            flags: None,
        }
    }

    pub fn radio(name: &'static str) -> Self {
        Self {
            name,
            field_type: b"Btn",
            flags: Some(1 << 15),
        }
    }

    pub fn dropdown(name: &'static str) -> Self {
        Self {
            name,
            field_type: b"Ch",
            flags: None,
        }
    }

    pub fn signature(name: &'static str) -> Self {
        Self {
            name,
            field_type: b"Sig",
            flags: None,
        }
    }
}

/// Builds a one-page PDF with an AcroForm holding the given fields, in
/// order, and returns the serialized bytes.
pub fn build_form_pdf(fields: &[TestField]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => Object::Reference(font_id) },
    });
    let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));

    let mut field_ids = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        let y = 700 - (i as i64) * 30;
        let mut dict = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => Object::Name(field.field_type.to_vec()),
            "T" => Object::string_literal(field.name),
            "Rect" => vec![50.into(), y.into(), 250.into(), (y + 20).into()],
        };
        if let Some(flags) = field.flags {
            dict.set("Ff", flags);
        }
        if field.field_type == b"Btn" {
            dict.set("V", Object::Name(b"Off".to_vec()));
            dict.set("AS", Object::Name(b"Off".to_vec()));
            dict.set(
                "AP",
                dictionary! {
                    "N" => dictionary! {
                        "Yes" => Object::Null,
                        "Off" => Object::Null,
                    },
                },
            );
        }
        if field.field_type == b"Ch" {
            dict.set(
                "Opt",
                vec![
                    Object::string_literal("CA"),
                    Object::string_literal("NY"),
                    Object::string_literal("TX"),
                ],
            );
        }
        field_ids.push(doc.add_object(dict));
    }

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "Contents" => Object::Reference(content_id),
        "Resources" => Object::Reference(resources_id),
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Annots" => field_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );

    let acroform_id = doc.add_object(dictionary! {
        "Fields" => field_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
        "AcroForm" => Object::Reference(acroform_id),
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("serialize test PDF");
    out
}

/// Reads back the /V entry of a named field from serialized PDF bytes.
pub fn field_value(bytes: &[u8], name: &str) -> Option<Object> {
    let doc = Document::load_mem(bytes).expect("reload test PDF");
    let (_, object_id) = crate::template::acroform_fields(&doc)
        .into_iter()
        .find(|(n, _)| n == name)?;
    let dict = doc.get_object(object_id).ok()?.as_dict().ok()?;
    dict.get(b"V").ok().cloned()
}
