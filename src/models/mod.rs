pub mod analysis;
pub mod statement;

pub use analysis::{
    clamp_confidence, AnalysisEnvelope, AnalysisStatus, AnalyzeResult, Cell, CellKind, Document, ExtractedField,
    FieldType, FieldValue, KeyValuePair, Line, Page, RawAnalyzeResult, RawCell, RawDocument,
    RawField, RawTable, Table, TextElement, Word,
};
pub use statement::{FinancialStatement, StatementSummary, UserRecord};
