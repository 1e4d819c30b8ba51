//! Server-side HTML for the search page.

use crate::config::{DUMB_RESULTS, SMART_RESULTS, SliderRange};
use crate::facets::FacetCatalog;
use crate::filter::{Facet, FacetSelection, NO_FILTER};
use crate::render::{CardDetail, IMAGE_WIDTH, result_title};
use crate::traits::CardRecord;
use std::fmt::Write;

/// Which button produced the results being shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Smart,
    Filtered,
}

/// Everything the page needs to render.
pub struct PageView<'a> {
    pub catalog: &'a FacetCatalog,
    pub selection: &'a FacetSelection,
    pub query: &'a str,
    pub n_results: usize,
    pub dumb_limit: usize,
    pub results: Option<(SearchMode, &'a [CardRecord])>,
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:sans-serif;max-width:860px;margin:2em auto;padding:0 1em}\
.filters{display:grid;grid-template-columns:1fr 1fr;gap:.5em 2em}\
label{display:block;font-size:.9em}select,input[type=text]{width:100%}\
button{width:100%;padding:.6em;margin:.5em 0}\
.success{background:#e6f4ea;padding:.6em;border-radius:4px}\
details{border:1px solid #ddd;border-radius:4px;margin:.4em 0;padding:.4em}";

pub fn render_page(view: &PageView<'_>) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    html.push_str("<title>Weiss Card Search</title>");
    let _ = write!(html, "<style>{}</style></head><body>", STYLE);
    html.push_str("<h1>Weiss Card Search (Scuff)</h1>");
    html.push_str("<form method=\"get\" action=\"/\">");

    html.push_str("<h2>🔍 Filters</h2><div class=\"filters\">");
    // Two columns: set/color/level on the left, type/rarity/triggers on the right.
    for facet in Facet::ALL {
        render_select(&mut html, facet, view);
    }
    html.push_str("</div>");

    html.push_str("<h2>Smart Search (AI!!!!)</h2>");
    let _ = write!(
        html,
        "<label>Enter your query text:<input type=\"text\" name=\"q\" value=\"{}\" \
         placeholder=\"ex. 'counter send opponent to memory'\"></label>",
        escape(view.query)
    );
    render_slider(&mut html, "Number of results", "n_results", SMART_RESULTS, view.n_results);
    html.push_str("<button type=\"submit\" name=\"action\" value=\"smart\">🔎 Run Smart Search</button>");

    html.push_str("<hr><h2>Dumb Search (Filter-only mode)</h2>");
    render_slider(
        &mut html,
        "Max number of results",
        "dumb_limit",
        DUMB_RESULTS,
        view.dumb_limit,
    );
    html.push_str("<button type=\"submit\" name=\"action\" value=\"dumb\">📄 Show Filtered Cards</button>");
    html.push_str("</form>");

    if let Some((mode, results)) = view.results {
        render_results(&mut html, mode, results);
    }
    html.push_str("</body></html>");
    html
}

fn render_select(html: &mut String, facet: Facet, view: &PageView<'_>) {
    let selected = view.selection.get(facet).unwrap_or(NO_FILTER);
    let _ = write!(
        html,
        "<label>{}<select name=\"{}\">",
        facet.label(),
        facet.field()
    );
    let options = std::iter::once(NO_FILTER)
        .chain(view.catalog.options(facet).iter().map(String::as_str));
    for option in options {
        let _ = write!(
            html,
            "<option value=\"{0}\"{1}>{0}</option>",
            escape(option),
            if option == selected { " selected" } else { "" }
        );
    }
    html.push_str("</select></label>");
}

fn render_slider(html: &mut String, label: &str, name: &str, range: SliderRange, value: usize) {
    let _ = write!(
        html,
        "<label>{label}: <output>{value}</output>\
         <input type=\"range\" name=\"{name}\" min=\"{}\" max=\"{}\" value=\"{value}\" \
         oninput=\"this.previousElementSibling.value=this.value\"></label>",
        range.min, range.max
    );
}

fn render_results(html: &mut String, mode: SearchMode, results: &[CardRecord]) {
    let message = match mode {
        SearchMode::Smart => format!("Found {} result(s).", results.len()),
        SearchMode::Filtered => format!("Showing {} card(s).", results.len()),
    };
    let _ = write!(html, "<p class=\"success\">{}</p>", message);
    html.push_str("<div class=\"results\">");
    for record in results {
        let _ = write!(
            html,
            "<details><summary>{}</summary>",
            escape(&result_title(record))
        );
        render_detail(html, &CardDetail::from_metadata(&record.metadata));
        html.push_str("</details>");
    }
    html.push_str("</div>");
}

fn render_detail(html: &mut String, detail: &CardDetail) {
    if let Some(image) = &detail.image {
        let _ = write!(
            html,
            "<img src=\"{}\" width=\"{}\" alt=\"card image\">",
            escape(image),
            IMAGE_WIDTH
        );
    }
    for (label, value) in &detail.fields {
        let _ = write!(html, "<p><strong>{}</strong>: {}</p>", label, escape(value));
    }
}
