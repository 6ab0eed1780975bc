//! Diagnostic reports posted back into an endpoint's room

/// What went wrong while turning a request into a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    InvalidJson { error: String },
    MissingVariables { names: Vec<String>, partial: String },
}

/// The request data shown at the bottom of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Serialized JSON, fenced as `json`
    Json(&'a str),
    /// Anything else, such as a raw body that did not parse
    Text(&'a str),
}

/// Build a Markdown report for `endpoint`, including the payload in a
/// fenced block.
pub fn error_report(endpoint: &str, failure: &Failure, payload: Payload<'_>) -> String {
    let mut report = match failure {
        Failure::InvalidJson { error } => format!(
            "**Webhook `{}` failed:** the request body is not valid JSON ({}).\n",
            endpoint, error
        ),
        Failure::MissingVariables { names, partial } => {
            let missing: Vec<String> = names.iter().map(|n| format!("`{}`", n)).collect();
            format!(
                "**Webhook `{}` failed:** the template references variables the request did not provide.\n\
                 \nMissing variables: {}\n\
                 \nPartially rendered message:\n\n{}\n",
                endpoint,
                missing.join(", "),
                fenced(partial, "")
            )
        }
    };

    let (text, lang) = match payload {
        Payload::Json(text) => (text, "json"),
        Payload::Text(text) => (text, ""),
    };
    report.push_str("\nPayload:\n\n");
    report.push_str(&fenced(text, lang));
    report
}

/// Wrap `text` in a code fence longer than any backtick run it contains
fn fenced(text: &str, lang: &str) -> String {
    let longest = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest.max(2) + 1);
    format!("{fence}{lang}\n{}\n{fence}", text.trim_end())
}
