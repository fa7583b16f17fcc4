//! Invoice extraction through an external multimodal model.

mod gemini;
mod parser;

pub use gemini::GeminiClient;
pub use parser::{locate_json, parse_response};

use async_trait::async_trait;

use crate::error::Result;
use crate::normalize::PageImage;

/// Instruction sent ahead of the page images.
///
/// Describes the target schema: issuer block, dates, line items, totals
/// and taxes. The model must answer with a single JSON object.
pub const EXTRACTION_PROMPT: &str = r#"Analise a imagem desta nota fiscal/cupom.
Extraia os dados e retorne APENAS um objeto JSON válido seguindo esta estrutura, sem markdown e sem ```json```:

{
  "emitente": {
    "razao_social": "string",
    "cnpj": "string",
    "endereco": "string"
  },
  "data_emissao": "DD/MM/AAAA",
  "numero_nota": "string",
  "itens": [
    {
      "descricao": "string",
      "quantidade": float,
      "valor_unitario": float,
      "valor_total": float
    }
  ],
  "valor_total_nota": float,
  "impostos": {
    "icms": float,
    "iss": float
  }
}

REGRAS IMPORTANTES:
- Retorne APENAS o JSON, sem nenhum texto antes ou depois
- Se um campo estiver ilegível ou não existir, retorne null
- Não invente valores
- Use ponto como separador decimal (ex: 10.50)
- Mantenha a estrutura exata do JSON acima"#;

/// A model that turns an instruction plus page images into text.
#[async_trait]
pub trait ExtractionModel: Send + Sync {
    /// Identifier recorded in artifact metadata.
    fn model_id(&self) -> &str;

    /// Send one request holding `prompt` and every page, return the raw text.
    async fn generate(&self, prompt: &str, pages: &[PageImage]) -> Result<String>;
}
