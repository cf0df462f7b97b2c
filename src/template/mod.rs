pub mod archive;
pub mod introspect;

pub use archive::ZipArchive;
pub use introspect::{
    DEFAULT_SYMBOLS, SYSTEM_ROOT_ENTRY, discover_template, extract_widths, introspect_archive,
    load_template_info, scan_parameter_symbols,
};
