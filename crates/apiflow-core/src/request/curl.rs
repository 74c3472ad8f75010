//! cURL command export.

use apiflow_types::http::{HttpRequest, RequestBody};

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Render `request` as a shell command: the first line is the command and
/// every following line is a `\` continuation carrying one option.
pub fn to_curl(request: &HttpRequest) -> String {
    let mut lines = vec![format!("curl -X {} {}", quote(&request.method), quote(&request.url))];

    for (k, v) in &request.headers {
        lines.push(format!("-H {}", quote(&format!("{k}: {v}"))));
    }

    match &request.body {
        RequestBody::Empty => {}
        RequestBody::Raw { data } => {
            lines.push(format!("--data-raw {}", quote(&String::from_utf8_lossy(data))));
        }
        RequestBody::UrlEncoded { fields } => {
            for (k, v) in fields {
                lines.push(format!("--data-urlencode {}", quote(&format!("{k}={v}"))));
            }
        }
        RequestBody::Multipart { fields } => {
            for (k, v) in fields {
                lines.push(format!("-F {}", quote(&format!("{k}={v}"))));
            }
        }
    }

    lines.join(" \\\n  ")
}
