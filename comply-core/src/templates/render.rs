//! Placeholder substitution for email templates
//!
//! Templates use `{{placeholder}}` points filled from a JSON object. The
//! subject is rendered verbatim; the HTML body escapes substituted values.
//! Unknown placeholders render as empty strings.

use handlebars::Handlebars;
use serde::Serialize;

use super::model::EmailTemplate;
use crate::error::{TemplateError, TemplateResult};

/// Subject and body with placeholders filled in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

pub struct TemplateRenderer {
    subject: Handlebars<'static>,
    body: Handlebars<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut subject = Handlebars::new();
        subject.register_escape_fn(handlebars::no_escape);
        let body = Handlebars::new();
        Self { subject, body }
    }

    pub fn render<T: Serialize>(
        &self,
        template: &EmailTemplate,
        variables: &T,
    ) -> TemplateResult<RenderedEmail> {
        let render_failed = |e: handlebars::RenderError| TemplateError::Render {
            template_id: template.id,
            reason: e.to_string(),
        };
        Ok(RenderedEmail {
            subject: self
                .subject
                .render_template(&template.subject, variables)
                .map_err(render_failed)?,
            html: self
                .body
                .render_template(&template.body, variables)
                .map_err(render_failed)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn template(subject: &str, body: &str) -> EmailTemplate {
        EmailTemplate {
            id: Uuid::new_v4(),
            name: "t".to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            form_type: None,
            modality: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_placeholders_substituted() {
        let renderer = TemplateRenderer::new();
        let rendered = renderer
            .render(
                &template(
                    "Orçamento {{produto}} - {{empresa}}",
                    "<p>Olá {{ nome }}, total {{total}}</p>",
                ),
                &json!({
                    "produto": "Comply e-DOCS",
                    "empresa": "A & B",
                    "nome": "Ana",
                    "total": "R$ 1.000,00",
                }),
            )
            .unwrap();

        assert_eq!(rendered.subject, "Orçamento Comply e-DOCS - A & B");
        assert_eq!(rendered.html, "<p>Olá Ana, total R$ 1.000,00</p>");
    }

    #[test]
    fn test_body_escapes_html_and_missing_is_empty() {
        let renderer = TemplateRenderer::new();
        let rendered = renderer
            .render(
                &template("{{missing}}Assunto", "<p>{{empresa}}</p>"),
                &json!({"empresa": "<b>X</b>"}),
            )
            .unwrap();
        assert_eq!(rendered.subject, "Assunto");
        assert_eq!(rendered.html, "<p>&lt;b&gt;X&lt;/b&gt;</p>");
    }

    #[test]
    fn test_malformed_template_is_render_error() {
        let renderer = TemplateRenderer::new();
        let err = renderer
            .render(&template("{{#if}}", "x"), &json!({}))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemError);
    }
}
