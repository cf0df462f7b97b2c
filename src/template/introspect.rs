//! Template introspection without a schema.
//!
//! The circuit description is scanned with regular expressions rather than
//! parsed: only `par.<symbol>` references and the first S-Function block are
//! of interest. Width extraction from the embedded metadata blob is a
//! best-effort heuristic; any miss degrades to the 1x1 default.

use super::archive::ZipArchive;
use crate::core::{SFunctionSpec, SlxTemplateInfo};
use crate::error::TemplateError;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const SYSTEM_ROOT_ENTRY: &str = "simulink/systems/system_root.xml";

const PARAMETER_PATTERN: &str = r"par\.([A-Za-z_][A-Za-z0-9_]*)";
const SFUNCTION_BLOCK_PATTERN: &str =
    r#"(?s)<Block\b[^>]*\bBlockType="S-Function"[^>]*?(?:/>|>(.*?)</Block>)"#;
const PARAM_ELEMENT_PATTERN: &str = r"(?s)<P\b([^>]*?)(?:/>|>([^<]*)</P>)";
const ATTRIBUTE_PATTERN: &str = r#"([A-Za-z_:][A-Za-z0-9_:.-]*)\s*=\s*"([^"]*)""#;

/// Widths above this are treated as a failed match.
pub const MAX_PORT_WIDTH: usize = 256;

/// Symbols used when no template is available at all.
pub const DEFAULT_SYMBOLS: &[&str] = &["Vin", "L", "C", "Rload", "Ts", "Tstop"];

impl SlxTemplateInfo {
    /// Descriptor used when no template container exists.
    pub fn fallback() -> Self {
        Self {
            parameter_symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            sfunction: SFunctionSpec::default(),
        }
    }
}

/// Introspect a model-container file.
///
/// Errors only when the container itself or its circuit description cannot be
/// read; a missing block or metadata blob yields the default descriptor.
pub fn load_template_info(path: &Path) -> Result<SlxTemplateInfo, TemplateError> {
    let archive = ZipArchive::open(path)?;
    introspect_archive(&archive)
}

pub fn introspect_archive(archive: &ZipArchive) -> Result<SlxTemplateInfo, TemplateError> {
    let system_root = archive.read_to_string_lossy(SYSTEM_ROOT_ENTRY)?;
    let parameter_symbols = scan_parameter_symbols(&system_root);

    let Some(block) = find_sfunction_block(&system_root) else {
        debug!("template has no S-Function block, using 1x1 default");
        return Ok(SlxTemplateInfo {
            parameter_symbols,
            sfunction: SFunctionSpec::default(),
        });
    };

    let defaults = SFunctionSpec::default();
    let function_name = block
        .param("FunctionName")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or(defaults.function_name);
    let module_name = block
        .param("SFunctionModules")
        .and_then(|s| s.split_whitespace().next())
        .map(String::from)
        .unwrap_or(defaults.module_name);

    let mut input_width = defaults.input_width;
    let mut output_width = defaults.output_width;

    if let Some(entry) = block.param_ref("WizardData").and_then(entry_name_from_bdmx_ref) {
        match archive.read(&entry) {
            Ok(raw) => match extract_widths(&raw, &function_name) {
                Some((iw, ow)) => {
                    input_width = iw;
                    output_width = ow;
                }
                None => warn!(entry = %entry, "no width pattern in block metadata, using 1x1"),
            },
            Err(e) => warn!(entry = %entry, error = %e, "block metadata unreadable, using 1x1"),
        }
    }

    Ok(SlxTemplateInfo {
        parameter_symbols,
        sfunction: SFunctionSpec {
            function_name,
            module_name,
            input_width,
            output_width,
        },
    })
}

/// Deduplicated set of `par.<symbol>` references.
pub fn scan_parameter_symbols(text: &str) -> BTreeSet<String> {
    let Ok(re) = Regex::new(PARAMETER_PATTERN) else {
        return BTreeSet::new();
    };
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `<P>` parameters of one block element.
#[derive(Debug, Default)]
struct BlockParams {
    params: Vec<(String, Option<String>, Option<String>)>,
}

impl BlockParams {
    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _, _)| n == name)
            .and_then(|(_, text, _)| text.as_deref())
    }

    fn param_ref(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _, _)| n == name)
            .and_then(|(_, _, r)| r.as_deref())
    }
}

/// First S-Function block only; later ones are ignored.
fn find_sfunction_block(xml: &str) -> Option<BlockParams> {
    let block_re = Regex::new(SFUNCTION_BLOCK_PATTERN).ok()?;
    let param_re = Regex::new(PARAM_ELEMENT_PATTERN).ok()?;
    let attr_re = Regex::new(ATTRIBUTE_PATTERN).ok()?;

    let caps = block_re.captures(xml)?;
    let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");

    let mut block = BlockParams::default();
    for p in param_re.captures_iter(body) {
        let attrs = p.get(1).map(|m| m.as_str()).unwrap_or("");
        let mut name = None;
        let mut reference = None;
        for a in attr_re.captures_iter(attrs) {
            match &a[1] {
                "Name" => name = Some(unescape_xml(&a[2])),
                "Ref" => reference = Some(unescape_xml(&a[2])),
                _ => {}
            }
        }
        if let Some(name) = name {
            let text = p.get(2).map(|m| unescape_xml(m.as_str()));
            block.params.push((name, text, reference));
        }
    }
    Some(block)
}

/// Map a `bdmxdata:<id>` reference to its archive entry.
fn entry_name_from_bdmx_ref(reference: &str) -> Option<String> {
    let id = reference.strip_prefix("bdmxdata:")?;
    if id.is_empty() {
        return None;
    }
    Some(format!("simulink/bdmxdata/{}.mxarray", id))
}

/// First two `[N, 1]` width vectors after the function name.
///
/// The blob layout is undocumented; NUL bytes are dropped and everything
/// else is scanned as opaque bytes. Widths above [`MAX_PORT_WIDTH`] count as
/// no match.
pub fn extract_widths(raw: &[u8], function_name: &str) -> Option<(usize, usize)> {
    let cleaned: Vec<u8> = raw.iter().copied().filter(|&b| b != 0).collect();
    let pattern = format!(
        r"(?s-u){}.{{0,1200}}?\[(\d+),\s*1\].{{0,600}}?\[(\d+),\s*1\]",
        regex::escape(function_name)
    );
    let re = regex::bytes::Regex::new(&pattern).ok()?;
    let caps = re.captures(&cleaned)?;
    let parse = |i: usize| -> Option<usize> {
        std::str::from_utf8(caps.get(i)?.as_bytes())
            .ok()?
            .parse::<usize>()
            .ok()
            .filter(|w| *w <= MAX_PORT_WIDTH)
            .map(|w| w.max(1))
    };
    Some((parse(1)?, parse(2)?))
}

/// First `*.slx` container below `dir`, in sorted path order.
pub fn discover_template(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("slx"))
        })
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
