use crate::errors::AppError;
use crate::extraction::{is_valid_email, normalize_phone};
use crate::llm_client::ChatModel;
use crate::models::{Catalog, Message, MessageRole, ScoringResult};
use std::sync::Arc;

/// Scores a transcript on the five qualification axes and extracts profile
/// fields, using JSON-mode generation.
///
/// This component never fails outward: any fault in generation or parsing
/// produces the neutral fallback result. Its only external effect is the
/// `ScoringResult` handed to `merge_lead_update` by the analysis worker.
pub struct LeadAnalyzer {
    model: Arc<dyn ChatModel>,
}

impl LeadAnalyzer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Analyzes the conversation history and returns a scoring result.
    /// Infallible: faults degrade to `ScoringResult::fallback()`.
    pub async fn analyze_conversation(
        &self,
        history: &[Message],
        catalog: &Catalog,
    ) -> ScoringResult {
        match self.try_analyze(history, catalog).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Error analyzing conversation: {}", e);
                ScoringResult::fallback()
            }
        }
    }

    async fn try_analyze(
        &self,
        history: &[Message],
        catalog: &Catalog,
    ) -> Result<ScoringResult, AppError> {
        let transcript = render_transcript(history);
        let system_prompt = build_scoring_prompt(catalog);
        let user_prompt = format!(
            "Analiza la siguiente conversación y devuelve el scoring en formato JSON:\n\n{}",
            transcript
        );

        let raw = self.model.generate_json(&system_prompt, &user_prompt).await?;
        let parsed: ScoringResult =
            serde_json::from_str(strip_code_fences(&raw)).map_err(|e| {
                AppError::GenerationError(format!("Failed to parse scoring output: {}", e))
            })?;

        sanitize(parsed, catalog)
    }
}

/// Renders the history as role-tagged lines for the scoring prompt.
fn render_transcript(history: &[Message]) -> String {
    let mut transcript = String::new();
    for message in history {
        let role = match message.role {
            MessageRole::User => "Usuario",
            MessageRole::Assistant => "Asistente",
        };
        transcript.push_str(role);
        transcript.push_str(": ");
        transcript.push_str(&message.content);
        transcript.push('\n');
    }
    transcript
}

fn build_scoring_prompt(catalog: &Catalog) -> String {
    let mut currencies: Vec<&str> = catalog.currencies.iter().map(String::as_str).collect();
    currencies.sort_unstable();
    let currency_list = if currencies.is_empty() {
        "(ninguna disponible)".to_string()
    } else {
        currencies.join(", ")
    };

    let preference_list = if catalog.contact_preferences.is_empty() {
        "(ninguna disponible)".to_string()
    } else {
        catalog
            .contact_preferences
            .iter()
            .map(|(id, name)| format!("{} = {}", id, name))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"Eres un experto en calificación de leads inmobiliarios. Tu tarea es analizar la conversación proporcionada, asignar un puntaje (score) para 5 criterios específicos y extraer datos de perfil del usuario cuando existan.

CRITERIOS DE CALIFICACIÓN:

1. ENGAGEMENT (Rango: -20 a 30):
   - Mide el interés del usuario. (30 = Pide cita o deja datos claros, 10-20 = Hace preguntas de negocio, -20 = Insulta o pide que lo borren).
2. FINANCE (Rango: -10 a 30):
   - Capacidad de pago detectada. (30 = Cash/Contado, 20-25 = Crédito pre-aprobado/Ingresos altos, -10 = Dice no tener dinero).
3. TIMELINE (Rango: 0 a 20):
   - Plazo de compra. (20 = Inmediato/Este mes, 15 = 1-3 meses, 5 = Solo viendo/Largo plazo).
4. MATCH (Rango: 0 a 15):
   - Ajuste al producto. (15 = Busca exactamente lo que el contexto ofrece, 7-9 = Interés general, 0 = Busca algo totalmente distinto).
5. INFO (Rango: -3 a 5):
   - Calidad del perfil. (5 = Nombre, Celular y Email detectados, 1-3 = Faltan datos críticos, -3 = Datos falsos/Evasivo).

EXTRACCIÓN DE PERFIL (todos opcionales, usa null si la conversación no lo menciona explícitamente):
- extracted_name: nombre completo declarado por el usuario.
- extracted_email: email declarado.
- extracted_phone: teléfono declarado.
- extracted_income: ingreso mensual declarado (número).
- extracted_debts: deudas actuales declaradas (número).
- extracted_currency: moneda de los montos. SOLO uno de: {currency_list}. Cualquier otra mención de moneda es null.
- extracted_contact_preference_id: canal de contacto preferido. SOLO uno de: {preference_list}. Cualquier otro canal es null.

INSTRUCCIONES:
- Analiza la INTENCIÓN del usuario, independientemente de si el Asistente pudo resolver la duda o no.
- Nunca inventes datos de perfil: solo extrae lo que el usuario dijo de forma explícita.
- Devuelve un JSON con los 5 scores, un campo 'reasoning' corto en español y los campos de extracción.
- Si no hay información suficiente para un criterio, usa el valor neutro (0)."#,
        currency_list = currency_list,
        preference_list = preference_list,
    )
}

/// Strips a Markdown code fence wrapper, if the model added one despite the
/// JSON response mime type.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

/// Applies extraction discipline to a parsed result.
///
/// Scores outside their declared interval fail the whole analysis (the
/// caller falls back to neutral). Profile fields that fail a guard or name
/// a categorical value missing from the catalog are dropped to `None`.
fn sanitize(mut result: ScoringResult, catalog: &Catalog) -> Result<ScoringResult, AppError> {
    result.validate().map_err(|e| {
        AppError::GenerationError(format!("Scoring output rejected: {}", e))
    })?;

    result.extracted_name = result
        .extracted_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    result.extracted_email = result.extracted_email.filter(|email| {
        let valid = is_valid_email(email);
        if !valid {
            tracing::debug!("Dropping invalid extracted email");
        }
        valid
    });

    result.extracted_phone = result
        .extracted_phone
        .as_deref()
        .and_then(normalize_phone);

    result.extracted_income = result.extracted_income.filter(|v| *v >= 0.0);
    result.extracted_debts = result.extracted_debts.filter(|v| *v >= 0.0);

    result.extracted_currency = result
        .extracted_currency
        .map(|c| c.trim().to_uppercase())
        .filter(|code| {
            let known = catalog.has_currency(code);
            if !known {
                tracing::debug!("Dropping currency '{}' not present in catalog", code);
            }
            known
        });

    result.extracted_contact_preference_id =
        result.extracted_contact_preference_id.filter(|id| {
            let known = catalog.has_contact_preference(*id);
            if !known {
                tracing::debug!("Dropping contact preference {} not present in catalog", id);
            }
            known
        });

    Ok(result)
}
