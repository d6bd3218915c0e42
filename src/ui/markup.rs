use crossterm::style::{Attribute, Color, ContentStyle};
use regex::Regex;
use std::sync::LazyLock;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(/?)([a-z]+)\]").unwrap());

fn apply_tag(style: &mut ContentStyle, tag: &str) -> bool {
    match tag {
        "bold" => style.attributes.set(Attribute::Bold),
        "dim" => style.attributes.set(Attribute::Dim),
        "italic" => style.attributes.set(Attribute::Italic),
        "red" => style.foreground_color = Some(Color::Red),
        "green" => style.foreground_color = Some(Color::Green),
        "yellow" => style.foreground_color = Some(Color::Yellow),
        "blue" => style.foreground_color = Some(Color::Blue),
        "magenta" => style.foreground_color = Some(Color::Magenta),
        "cyan" => style.foreground_color = Some(Color::Cyan),
        _ => return false,
    }
    true
}

fn is_style_tag(tag: &str) -> bool {
    apply_tag(&mut ContentStyle::new(), tag)
}

/// Split `text` into runs of plain text, each with the styles open at that point.
/// Brackets that are not known style tags are kept as literal text.
fn runs(text: &str) -> Vec<(Vec<&str>, &str)> {
    let mut open: Vec<&str> = Vec::new();
    let mut out = Vec::new();
    let mut last = 0;

    for caps in TAG.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        if !is_style_tag(name.as_str()) {
            continue;
        }
        if whole.start() > last {
            out.push((open.clone(), &text[last..whole.start()]));
        }
        last = whole.end();

        if caps.get(1).is_some_and(|m| !m.as_str().is_empty()) {
            if let Some(pos) = open.iter().rposition(|t| *t == name.as_str()) {
                open.remove(pos);
            }
        } else {
            open.push(name.as_str());
        }
    }
    if last < text.len() {
        out.push((open, &text[last..]));
    }
    out
}

/// Render markup as ANSI-styled text.
pub fn render(text: &str) -> String {
    runs(text)
        .into_iter()
        .map(|(tags, run)| {
            if tags.is_empty() {
                return run.to_string();
            }
            let mut style = ContentStyle::new();
            for tag in tags {
                apply_tag(&mut style, tag);
            }
            style.apply(run).to_string()
        })
        .collect()
}

/// Remove known style tags, keeping the text.
pub fn strip(text: &str) -> String {
    runs(text).into_iter().map(|(_, run)| run).collect()
}
