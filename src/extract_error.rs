#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractError {
    #[error("Malformed table: {0}")]
    MalformedTable(String),
    #[error("Failed to parse {field}: '{value}'")]
    UnparsableValue { field: &'static str, value: String },
}
