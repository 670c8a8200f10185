use thiserror::Error;

/// Error taxonomy for the form-filling pipeline.
///
/// Batch operations (row ingestion, per-field fills, multi-file extraction)
/// recover from item-level failures internally and only surface these for
/// whole-operation problems.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported file format: .{extension}")]
    UnsupportedFormat { extension: String },

    #[error("validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("cannot parse PDF '{file}': {detail}")]
    UnparsablePdf { file: String, detail: String },

    #[error("template validation failed: {}", errors.join("; "))]
    TemplateValidation { errors: Vec<String> },

    #[error("AI service not configured")]
    NotConfigured,

    #[error("malformed AI response: {0}")]
    MalformedAiResponse(String),

    #[error("no output directory selected")]
    NoOutputDirectory,

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
