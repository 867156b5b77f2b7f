mod html;
mod json;
mod text;

pub use html::render_html_report;
pub use json::{format_json_report, parse_json_report};
pub use text::format_text_report;
