//! Invoice data models matching the JSON schema requested from the model.
//!
//! Field names are English in Rust and keep the prompt's Portuguese keys on
//! the wire. Every leaf is optional because the model is told to answer
//! `null` for anything it cannot read, and every leaf keeps the JSON value
//! the model sent. Keys outside the schema are carried along in `extra`.

use std::fmt;

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A leaf value exactly as the model returned it.
///
/// Strings stay strings and numbers keep their literal text: `"12,50"` is
/// never reinterpreted and `100.00` is never rewritten as `100.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scalar(Value);

impl Scalar {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// Render for a table cell: the value's own text, whitespace collapsed.
    pub fn to_cell(&self) -> String {
        clean_text(&self.to_string())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<Value> for Scalar {
    fn from(value: Value) -> Self {
        Scalar(value)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar(Value::String(s.to_string()))
    }
}

/// Structured result of one successful extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Issuer (seller) block.
    #[serde(rename = "emitente")]
    pub issuer: Issuer,

    /// Issue date as printed (the prompt asks for DD/MM/YYYY).
    #[serde(rename = "data_emissao", default)]
    pub issue_date: Option<Scalar>,

    /// Invoice number/identifier.
    #[serde(rename = "numero_nota", default)]
    pub invoice_number: Option<Scalar>,

    /// Line items in document order.
    #[serde(rename = "itens")]
    pub line_items: Vec<LineEntry>,

    /// Grand total of the invoice.
    #[serde(rename = "valor_total_nota", default)]
    pub grand_total: Option<Scalar>,

    /// Tax name to amount, normally an object whose amounts may be null.
    #[serde(rename = "impostos", default)]
    pub taxes: Option<Scalar>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Issuer identification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issuer {
    /// Legal company name.
    #[serde(rename = "razao_social", default)]
    pub name: Option<Scalar>,

    /// Tax identifier (CNPJ).
    #[serde(rename = "cnpj", default)]
    pub tax_id: Option<Scalar>,

    /// Address as a single line.
    #[serde(rename = "endereco", default)]
    pub address: Option<Scalar>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A line item on an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "descricao", default)]
    pub description: Option<Scalar>,

    #[serde(rename = "quantidade", default)]
    pub quantity: Option<Scalar>,

    #[serde(rename = "valor_unitario", default)]
    pub unit_price: Option<Scalar>,

    #[serde(rename = "valor_total", default)]
    pub total: Option<Scalar>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One element of `itens`: an item object, or whatever else the model put
/// there (null, a string, a number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineEntry {
    Item(LineItem),
    Other(Value),
}

impl LineEntry {
    pub fn as_item(&self) -> Option<&LineItem> {
        match self {
            LineEntry::Item(item) => Some(item),
            LineEntry::Other(_) => None,
        }
    }
}

impl From<LineItem> for LineEntry {
    fn from(item: LineItem) -> Self {
        LineEntry::Item(item)
    }
}

impl InvoiceRecord {
    /// Number of entries in `itens`.
    pub fn item_count(&self) -> usize {
        self.line_items.len()
    }

    /// Entries of `itens` that are item objects.
    pub fn items(&self) -> impl Iterator<Item = &LineItem> {
        self.line_items.iter().filter_map(LineEntry::as_item)
    }

    /// Amount for a named tax, ignoring case. Null amounts are `None`.
    pub fn tax(&self, name: &str) -> Option<Scalar> {
        self.taxes
            .as_ref()?
            .as_value()
            .as_object()?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
            .map(|v| Scalar(v.clone()))
    }
}

/// Facts about the extraction run itself, stored next to the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    /// Original file name.
    pub source_file: String,

    /// Lower-cased extension including the dot, e.g. `.pdf`.
    pub file_type: String,

    /// Number of page images sent to the model.
    pub pages: usize,

    /// When the extraction finished.
    pub extracted_at: DateTime<Local>,

    /// Model that produced the record.
    pub model: String,
}

/// On-disk artifact: the record as parsed plus run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceArtifact {
    #[serde(flatten)]
    pub record: InvoiceRecord,

    #[serde(rename = "_metadata")]
    pub metadata: ExtractionMetadata,
}

/// Flattened projection of a record, one row of the history table.
///
/// Field order is the column order of the CSV header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub extraction_timestamp: String,
    pub source_file: String,
    pub company_name: String,
    pub tax_id: String,
    pub issue_date: String,
    pub invoice_number: String,
    pub item_count: usize,
    pub grand_total: String,
}

/// CSV header of the history table.
pub const HISTORY_HEADER: [&str; 8] = [
    "extraction_timestamp",
    "source_file",
    "company_name",
    "tax_id",
    "issue_date",
    "invoice_number",
    "item_count",
    "grand_total",
];

impl HistoryEntry {
    /// Flatten a record for the history table.
    pub fn from_record(record: &InvoiceRecord, metadata: &ExtractionMetadata) -> Self {
        let text = |v: &Option<Scalar>| v.as_ref().map(Scalar::to_cell).unwrap_or_default();

        Self {
            extraction_timestamp: metadata
                .extracted_at
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            source_file: clean_text(&metadata.source_file),
            company_name: text(&record.issuer.name),
            tax_id: text(&record.issuer.tax_id),
            issue_date: text(&record.issue_date),
            invoice_number: text(&record.invoice_number),
            item_count: record.item_count(),
            grand_total: text(&record.grand_total),
        }
    }
}

/// Trim and collapse newlines and runs of whitespace to single spaces.
pub fn clean_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
