// Minimal Markdown to HTML conversion for model output.
//
// The model is asked for HTML but sometimes answers in Markdown anyway. This
// covers the handful of constructs it actually uses: headings, bold, bullet
// lists, links and paragraphs. Anything already in HTML passes through.

/// Convert model output to HTML.
///
/// Passes run in a fixed order: headings, bold, bullets, list wrapping,
/// links, then paragraph splitting on blank lines.
pub fn to_html(text: &str) -> String {
    let lines: Vec<String> = text
        .split('\n')
        .map(|line| bullet(&bold(&heading(line))))
        .collect();
    let html = wrap_lists(&lines);
    let html = links(&html);
    paragraphs(&html)
}

// ---------------------------------------------------------------------------
// Line passes
// ---------------------------------------------------------------------------

fn heading(line: &str) -> String {
    for prefix in ["### ", "## ", "# "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return format!("<h3>{rest}</h3>");
        }
    }
    line.to_string()
}

/// `**x**` pairs within one line, shortest match first.
fn bold(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find("**") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("**") else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str("<strong>");
        out.push_str(&after_open[..close]);
        out.push_str("</strong>");
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    out
}

fn bullet(line: &str) -> String {
    for prefix in ["* ", "- "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return format!("<li>{rest}</li>");
        }
    }
    line.to_string()
}

fn is_list_item(line: &str) -> bool {
    line.starts_with("<li>") && line.ends_with("</li>")
}

/// Rejoin lines, wrapping each run of consecutive list items in `<ul>`.
/// The newline after the last item of a run stays inside the `</ul>`.
fn wrap_lists(lines: &[String]) -> String {
    let mut out = String::new();
    let mut in_list = false;
    let last = lines.len().saturating_sub(1);

    for (i, line) in lines.iter().enumerate() {
        let item = is_list_item(line);
        if item && !in_list {
            out.push_str("<ul>");
            in_list = true;
        } else if !item && in_list {
            out.push_str("</ul>");
            in_list = false;
        }
        out.push_str(line);
        if i < last {
            out.push('\n');
        }
    }
    if in_list {
        out.push_str("</ul>");
    }
    out
}

// ---------------------------------------------------------------------------
// Whole-text passes
// ---------------------------------------------------------------------------

/// `[text](url)` to an anchor opening in a new tab. Text stops at the first
/// `]`, the url at the first `)`; both must be non-empty.
fn links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let candidate = &rest[open..];
        match parse_link(candidate) {
            Some((label, url, consumed)) => {
                out.push_str(&format!(
                    "<a href=\"{url}\" target=\"_blank\" rel=\"noreferrer\">{label}</a>"
                ));
                rest = &candidate[consumed..];
            }
            None => {
                out.push('[');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse a link at the start of `s` (which begins with `[`). Returns the
/// label, the url and the number of bytes consumed.
fn parse_link(s: &str) -> Option<(&str, &str, usize)> {
    let label_end = s[1..].find(']')? + 1;
    let label = &s[1..label_end];
    let after_label = &s[label_end + 1..];
    let target = after_label.strip_prefix('(')?;
    let url_len = target.find(')')?;
    let url = &target[..url_len];
    if label.is_empty() || url.is_empty() {
        return None;
    }
    // `[` + label + `](` + url + `)`
    let consumed = label_end + 2 + url_len + 1;
    Some((label, url, consumed))
}

/// Split on blank lines. Blocks that already start with a tag are kept as
/// is; other non-empty blocks become `<p>` paragraphs.
fn paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(|block| {
            let trimmed = block.trim();
            if trimmed.starts_with('<') {
                block.to_string()
            } else if trimmed.is_empty() {
                String::new()
            } else {
                format!("<p>{trimmed}</p>")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
