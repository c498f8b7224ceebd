//! Rendering of the auto-submit form used by the POST bindings.

use crate::error::DispatchError;

/// Values handed to a [`TemplateRenderer`] for one POST form.
///
/// Values are unescaped; escaping is the renderer's job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    /// Form action URL.
    pub action: String,
    /// Name of the field carrying the message.
    pub name: String,
    /// Base64 encoded message.
    pub message: String,
    /// Additional hidden fields, in order.
    pub hidden: Vec<(String, String)>,
    /// Readable copy of the outgoing message, only in debug mode.
    pub trace: Option<String>,
}

impl FormFields {
    /// Returns the value of a hidden field.
    #[must_use]
    pub fn hidden_field(&self, name: &str) -> Option<&str> {
        self.hidden
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Turns form fields into an HTML page.
pub trait TemplateRenderer: Send + Sync {
    /// Renders the form.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Render`] if the page cannot be produced.
    fn render(&self, fields: &FormFields) -> Result<String, DispatchError>;
}

/// Renders a self-submitting form with a no-script fallback button.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoSubmitFormRenderer;

impl TemplateRenderer for AutoSubmitFormRenderer {
    fn render(&self, fields: &FormFields) -> Result<String, DispatchError> {
        let hidden: String = fields
            .hidden
            .iter()
            .map(|(name, value)| {
                format!(
                    r#"
        <input type="hidden" name="{}" value="{}"/>"#,
                    html_escape(name),
                    html_escape(value)
                )
            })
            .collect();

        let trace = fields
            .trace
            .as_deref()
            .map(|t| format!("\n    <pre>{}</pre>", html_escape(t)))
            .unwrap_or_default();

        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>{}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>{}
</body>
</html>"#,
            html_escape(&fields.action),
            html_escape(&fields.name),
            html_escape(&fields.message),
            hidden,
            trace
        ))
    }
}

/// Escapes HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
