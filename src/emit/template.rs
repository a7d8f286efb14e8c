//! Template loading and section splitting (spec.md §4.7): the template
//! is plain text interrupted by `%%` separators, copied verbatim apart
//! from one substitution (`Parse` as a whole word becomes the
//! grammar's `%name`). Grounded on `report.c::tplt_open/tplt_xfer`.
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Resolves the template path by the precedence in spec.md §4.7: an
/// explicit `-T` override; `<grammar>.lt` beside the input; `lempar.c`
/// in the output directory; a last-resort `PATH` search.
pub fn resolve_template_path(
    explicit: Option<&Path>,
    grammar_path: &Path,
    output_dir: Option<&Path>,
) -> Result<PathBuf, Error> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::Emit(format!("template not found: {}", path.display())));
    }
    let beside_input = grammar_path.with_extension("lt");
    if beside_input.exists() {
        return Ok(beside_input);
    }
    let dir = output_dir.unwrap_or_else(|| Path::new("."));
    let in_output_dir = dir.join("lempar.c");
    if in_output_dir.exists() {
        return Ok(in_output_dir);
    }
    if let Ok(path_var) = env::var("PATH") {
        for entry in env::split_paths(&path_var) {
            let candidate = entry.join("lempar.c");
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }
    Err(Error::Emit("no parser template found (-T, <grammar>.lt, lempar.c, $PATH)".to_string()))
}

pub fn read_template(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|e| Error::Io(e))
}

/// Splits a template's text into the sections the emitter fills in
/// between `%%` markers, already rewriting `Parse` to the grammar's
/// declared `%name` (defaulting to `"Parse"` when none was given).
pub fn split_sections(template_text: &str, parser_name: &str) -> Vec<String> {
    template_text
        .split("%%")
        .map(|section| substitute_parse_name(section, parser_name))
        .collect()
}

/// Rewrites the literal identifier prefix `Parse` to `parser_name`
/// wherever it appears as a word (the previous character, if any, must
/// not be alphanumeric or `_`), matching `tplt_xfer`'s scan: only the
/// preceding character is checked, so `ParseInit`/`ParseAlloc`/
/// `ParseFree`/`ParseTrace` are rewritten to `<parser_name>Init` etc.
/// along with the bare `Parse` symbol itself.
pub fn substitute_parse_name(text: &str, parser_name: &str) -> String {
    if parser_name == "Parse" {
        return text.to_string();
    }
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if text[i..].starts_with("Parse") {
            let prev_ok = i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_');
            if prev_ok {
                out.push_str(parser_name);
                i += 5;
                continue;
            }
        }
        let ch = text[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prefix_is_rewritten_even_when_followed_by_more_identifier_chars() {
        let out = substitute_parse_name("void Parse(yyParser *p){ ParseInit(); myParse(); }", "Calc");
        assert_eq!(out, "void Calc(yyParser *p){ CalcInit(); myParse(); }");
    }

    #[test]
    fn default_parser_name_leaves_text_untouched() {
        let out = substitute_parse_name("Parse()", "Parse");
        assert_eq!(out, "Parse()");
    }

    #[test]
    fn sections_split_on_double_percent() {
        let sections = split_sections("a%%b%%c", "Parse");
        assert_eq!(sections, vec!["a", "b", "c"]);
    }
}
