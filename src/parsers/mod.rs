pub mod docview;
pub mod filter;
pub mod package;

pub use docview::{decode_platform_name, parse_docview, DocView, DocViewNode};
pub use filter::{parse_filter_xml, render_filter_xml, FILTER_ENTRY};
pub use package::{parse_properties_xml, render_properties_xml, PROPERTIES_ENTRY};
