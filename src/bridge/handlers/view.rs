//! Builder for the browser-facing node page.
//!
//! The page shows the node's bridge fields and a command form. After a
//! command ran, its output is embedded below the form.

use crate::bridge::types::Report;

/// Builder for the node detail page.
///
/// # Example
///
/// ```ignore
/// let html = NodeViewBuilder::new(&report)
///     .with_user("alice")
///     .with_response("up 3 days")
///     .build();
/// ```
pub struct NodeViewBuilder<'a> {
    report: &'a Report,
    user: String,
    response: Option<String>,
}

impl<'a> NodeViewBuilder<'a> {
    pub fn new(report: &'a Report) -> Self {
        Self {
            report,
            user: String::new(),
            response: None,
        }
    }

    /// Prefill the form's user field.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Command output to show under the form.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn build(&self) -> String {
        let report = self.report;
        let id = escape_html(&report.id);
        let title = if report.hostname.is_empty() {
            id.clone()
        } else {
            escape_html(&report.hostname)
        };

        let tunnel = match report.tunnel_port() {
            Some(port) => format!("{}:{}", escape_html(&report.ssh_server_host), port),
            None => "not connected".to_string(),
        };

        let mut lines = vec![
            "<!DOCTYPE html>".to_string(),
            "<html>".to_string(),
            format!("<head><meta charset=\"utf-8\"><title>{}</title></head>", title),
            "<body>".to_string(),
            format!("<h1>{}</h1>", title),
            "<table>".to_string(),
            format!("<tr><th>ID</th><td>{}</td></tr>", id),
        ];
        if !report.custom_id.is_empty() {
            lines.push(format!(
                "<tr><th>Custom ID</th><td>{}</td></tr>",
                escape_html(&report.custom_id)
            ));
        }
        if !report.agent_version.is_empty() {
            lines.push(format!(
                "<tr><th>Agent</th><td>{}</td></tr>",
                escape_html(&report.agent_version)
            ));
        }
        if !report.global_ip.is_empty() {
            lines.push(format!(
                "<tr><th>Global IP</th><td>{}</td></tr>",
                escape_html(&report.global_ip)
            ));
        }
        lines.push(format!("<tr><th>SSH</th><td>{}</td></tr>", tunnel));
        lines.push("</table>".to_string());

        lines.push(format!(
            "<form method=\"post\" action=\"/nodes/{}/command\">",
            id
        ));
        lines.push(format!(
            "<input name=\"user\" placeholder=\"user\" value=\"{}\">",
            escape_html(&self.user)
        ));
        lines.push("<input name=\"password\" type=\"password\" placeholder=\"password\">".to_string());
        lines.push("<textarea name=\"key\" placeholder=\"private key\"></textarea>".to_string());
        lines.push("<input name=\"command\" placeholder=\"command\">".to_string());
        lines.push("<input name=\"timeout\" placeholder=\"timeout (s)\">".to_string());
        lines.push("<button type=\"submit\">Run</button>".to_string());
        lines.push("</form>".to_string());

        if let Some(ref response) = self.response {
            lines.push(format!("<pre id=\"response\">{}</pre>", escape_html(response)));
        }

        lines.push("</body>".to_string());
        lines.push("</html>".to_string());
        lines.join("\n")
    }
}

/// Escape text for use in HTML content and double-quoted attributes.
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
