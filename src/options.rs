//! Command-line surface (spec.md §6.2), using `structopt` the way the
//! teacher's `alap_gen_ng/src/main.rs` does. The CLI itself is named an
//! external collaborator in spec.md §1, but the ambient-stack rule
//! means it's still a real, working front end rather than a stub.
use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "lalr1gen", about = "LALR(1) parser generator")]
pub struct CLOptions {
    /// Report basis (kernel) items only, not the full closure.
    #[structopt(short = "b")]
    pub basis_only: bool,

    /// Disable table compression (default-reduce / shift-reduce fusion).
    #[structopt(short = "c")]
    pub no_compress: bool,

    /// Output directory for generated files.
    #[structopt(short = "d", parse(from_os_str))]
    pub output_dir: Option<PathBuf>,

    /// Define a preprocessor symbol for %if/%ifdef.
    #[structopt(short = "D")]
    pub defines: Vec<String>,

    /// Print preprocessed input to stdout and exit.
    #[structopt(short = "E")]
    pub print_preprocessed: bool,

    /// Compatibility placeholder, ignored.
    #[structopt(short = "f")]
    pub f_placeholder: Vec<String>,

    /// Compatibility placeholder, ignored.
    #[structopt(short = "I")]
    pub i_placeholder: Vec<String>,

    /// Compatibility placeholder, ignored.
    #[structopt(short = "O")]
    pub o_placeholder: Vec<String>,

    /// Compatibility placeholder, ignored.
    #[structopt(short = "W")]
    pub w_placeholder: Vec<String>,

    /// Reprint the grammar (stripped of code) and exit.
    #[structopt(short = "g")]
    pub reprint: bool,

    /// Suppress #line directives in generated code.
    #[structopt(short = "l")]
    pub no_line_directives: bool,

    /// makeheaders-compatible output: no separate .h file.
    #[structopt(short = "m")]
    pub makeheaders: bool,

    /// Show precedence-resolved conflicts in the report.
    #[structopt(short = "p")]
    pub show_resolved: bool,

    /// Suppress the .out report.
    #[structopt(short = "q")]
    pub quiet: bool,

    /// Skip state resort/renumbering.
    #[structopt(short = "r")]
    pub no_resort: bool,

    /// Print statistics to stdout.
    #[structopt(short = "s")]
    pub statistics: bool,

    /// Emit a .sql schema + data dump.
    #[structopt(short = "S")]
    pub sql_dump: bool,

    /// Print version and exit.
    #[structopt(short = "x")]
    pub version: bool,

    /// Override the parser template path.
    #[structopt(short = "T", parse(from_os_str))]
    pub template: Option<PathBuf>,

    /// The grammar file to compile.
    #[structopt(parse(from_os_str))]
    pub grammar_file: PathBuf,
}

impl CLOptions {
    pub fn define_set(&self) -> std::collections::HashSet<String> {
        self.defines.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_invocation() {
        let opts = CLOptions::from_iter(&["lalr1gen", "grammar.y"]);
        assert_eq!(opts.grammar_file, PathBuf::from("grammar.y"));
        assert!(!opts.quiet);
    }

    #[test]
    fn collects_repeated_define_flags() {
        let opts = CLOptions::from_iter(&["lalr1gen", "-DFOO", "-DBAR", "grammar.y"]);
        let defines = opts.define_set();
        assert!(defines.contains("FOO"));
        assert!(defines.contains("BAR"));
    }
}
