use crate::error::{PipelineError, Result};
use std::path::Path;

/// Pulls plain text out of a document for the AI extraction path.
///
/// PDF is a known limitation: no text-layer extraction is attempted, the
/// downstream model only gets a placeholder naming the file. Fixing that is
/// a separate project, not a quick patch here.
pub async fn extract_text(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::Extraction(format!("cannot read {:?}: {}", path, e))),
        "docx" | "doc" => extract_from_word(path).await,
        "pdf" => Ok(pdf_placeholder(path)),
        _ => Err(PipelineError::UnsupportedFormat { extension }),
    }
}

async fn extract_from_word(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::Extraction(format!("cannot read {:?}: {}", path, e)))?;

    let doc = docx_rs::read_docx(&bytes)
        .map_err(|e| PipelineError::Extraction(format!("cannot parse Word document: {}", e)))?;

    let mut text = String::new();
    for child in &doc.document.children {
        collect_docx_text(child, &mut text);
    }
    Ok(text.trim().to_string())
}

fn collect_docx_text(element: &docx_rs::DocumentChild, output: &mut String) {
    match element {
        docx_rs::DocumentChild::Paragraph(paragraph) => {
            for child in &paragraph.children {
                collect_paragraph_text(child, output);
            }
            output.push('\n');
        }
        docx_rs::DocumentChild::Table(table) => {
            for row in &table.rows {
                let docx_rs::TableChild::TableRow(table_row) = row;
                for cell in &table_row.cells {
                    let docx_rs::TableRowChild::TableCell(table_cell) = cell;
                    for content in &table_cell.children {
                        if let docx_rs::TableCellContent::Paragraph(paragraph) = content {
                            for child in &paragraph.children {
                                collect_paragraph_text(child, output);
                            }
                            output.push(' ');
                        }
                    }
                }
                output.push('\n');
            }
        }
        _ => {}
    }
}

fn collect_paragraph_text(child: &docx_rs::ParagraphChild, output: &mut String) {
    match child {
        docx_rs::ParagraphChild::Run(run) => {
            for run_child in &run.children {
                if let docx_rs::RunChild::Text(text) = run_child {
                    output.push_str(&text.text);
                }
            }
        }
        docx_rs::ParagraphChild::Hyperlink(link) => {
            for nested in &link.children {
                if let docx_rs::ParagraphChild::Run(run) = nested {
                    for run_child in &run.children {
                        if let docx_rs::RunChild::Text(text) = run_child {
                            output.push_str(&text.text);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

fn pdf_placeholder(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    format!(
        "PDF Document: {}\n\nThis is a PDF document. Please extract any client/patient \
         information you can identify from the filename and context.",
        file_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn txt_returns_raw_content() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(b"Name: Ann Lee\nDOB: 1990-05-02").unwrap();

        let text = extract_text(file.path()).await.unwrap();
        assert_eq!(text, "Name: Ann Lee\nDOB: 1990-05-02");
    }

    #[tokio::test]
    async fn pdf_yields_placeholder_with_file_name() {
        let file = tempfile::Builder::new()
            .prefix("intake_form")
            .suffix(".pdf")
            .tempfile()
            .unwrap();

        let text = extract_text(file.path()).await.unwrap();
        assert!(text.starts_with("PDF Document: intake_form"));
        assert!(text.contains("client/patient information"));
    }

    #[tokio::test]
    async fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let err = extract_text(file.path()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnsupportedFormat { extension } if extension == "png"
        ));
    }

    #[tokio::test]
    async fn corrupt_docx_surfaces_extraction_error() {
        let mut file = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        file.write_all(b"not a zip archive").unwrap();

        let err = extract_text(file.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
    }
}
