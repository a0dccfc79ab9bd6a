use scraper::{ElementRef, Html, Node};

/// Elements whose contents are never readable text.
const SKIPPED: &[&str] = &["script", "style", "noscript", "svg", "template", "head", "iframe"];

/// Elements that end a line of text.
const BLOCKS: &[&str] = &[
    "p", "br", "div", "li", "ul", "ol", "tr", "td", "th", "table", "section", "article",
    "header", "footer", "nav", "main", "aside", "h1", "h2", "h3", "h4", "h5", "h6", "title",
    "blockquote", "form", "figure", "figcaption", "dl", "dt", "dd", "hr",
];

/// Words starting with these attach to the previous word.
const CLOSING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '%'];

/// Reduces an html document to readable text, one block per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);
    walk(document.root_element(), &mut out);

    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of a fragment with its whitespace collapsed onto one line.
pub(crate) fn inline_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for text in element.text() {
        push_words(&mut out, text);
    }
    out
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_words(out, text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED.contains(&name) {
                    continue;
                }
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };

                let block = BLOCKS.contains(&name);
                if block {
                    break_line(out);
                }
                walk(child, out);
                if block {
                    break_line(out);
                }
            }
            _ => {}
        }
    }
}

fn break_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn push_words(out: &mut String, text: &str) {
    for word in text.split_whitespace() {
        let attach = out.is_empty()
            || out.ends_with('\n')
            || word.starts_with(CLOSING_PUNCTUATION);
        if !attach {
            out.push(' ');
        }
        out.push_str(word);
    }
}
