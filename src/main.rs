//! CLI driver (spec.md §6): reads the grammar and template files,
//! drives the generator pipeline, writes the generated artifacts, and
//! maps the outcome to a process exit code (spec.md §6.4).
use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;

use structopt::StructOpt;

use lalr1gen::emit::template;
use lalr1gen::{frontend, CLOptions};

const MAX_GRAMMAR_BYTES: u64 = 100 * 1024 * 1024;

fn base_path(grammar_file: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = grammar_file.file_stem().unwrap_or_default();
    match output_dir {
        Some(dir) => dir.join(stem),
        None => grammar_file.with_file_name(stem),
    }
}

/// Writes the `.h` file unless it would be byte-identical to what's
/// already there (spec.md §6.3: avoids needlessly bumping a dependent
/// build's timestamp).
fn write_header_if_changed(path: &Path, header: &str) {
    let unchanged = fs::read_to_string(path).map(|existing| existing == header).unwrap_or(false);
    if !unchanged {
        if let Err(e) = fs::write(path, header) {
            eprintln!("lalr1gen: {}: {}", path.display(), e);
        }
    }
}

fn main() {
    let options = CLOptions::from_args();

    if options.version {
        println!("lalr1gen {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let metadata = match fs::metadata(&options.grammar_file) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("lalr1gen: {}: {}", options.grammar_file.display(), e);
            exit(1);
        }
    };
    if metadata.len() > MAX_GRAMMAR_BYTES {
        eprintln!("lalr1gen: {}: grammar file too large", options.grammar_file.display());
        exit(1);
    }

    let grammar_text = match fs::read_to_string(&options.grammar_file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("lalr1gen: {}: {}", options.grammar_file.display(), e);
            exit(1);
        }
    };

    let defines = options.define_set();

    if options.print_preprocessed {
        match frontend::preprocessor::preprocess(&grammar_text, &defines) {
            Ok(text) => {
                print!("{}", text);
                return;
            }
            Err(e) => {
                eprintln!("lalr1gen: {}", e);
                exit(1);
            }
        }
    }

    let file_name = options
        .grammar_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if options.reprint {
        match frontend::parse(&grammar_text, &file_name, &defines) {
            Ok(grammar) => {
                for diagnostic in &grammar.diagnostics {
                    eprintln!("{}", diagnostic);
                }
                let mut out = std::io::stdout();
                let _ = lalr1gen::report::reprint(&grammar, &mut out);
                exit(if grammar.error_count > 0 { 1 } else { 0 });
            }
            Err(e) => {
                eprintln!("lalr1gen: {}", e);
                exit(1);
            }
        }
    }

    let template_path = match template::resolve_template_path(options.template.as_deref(), &options.grammar_file, options.output_dir.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("lalr1gen: {}", e);
            exit(1);
        }
    };
    let template_text = match template::read_template(&template_path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("lalr1gen: {}: {}", template_path.display(), e);
            exit(1);
        }
    };

    match lalr1gen::run(&options, &grammar_text, &file_name, &template_text) {
        Ok(output) => {
            let base = base_path(&options.grammar_file, options.output_dir.as_deref());

            if let Err(e) = fs::write(base.with_extension("c"), &output.parser_source) {
                eprintln!("lalr1gen: {}", e);
                exit(1);
            }
            if let Some(header) = &output.header {
                write_header_if_changed(&base.with_extension("h"), header);
            }
            if let Some(report_text) = &output.report {
                if let Err(e) = fs::write(base.with_extension("out"), report_text) {
                    eprintln!("lalr1gen: {}", e);
                }
            }
            if let Some(sql) = &output.sql {
                if let Err(e) = fs::write(base.with_extension("sql"), sql) {
                    eprintln!("lalr1gen: {}", e);
                }
            }
            if let Some(statistics) = &output.statistics {
                print!("{}", statistics);
            }
            if output.conflicts.total() > 0 {
                eprintln!(
                    "lalr1gen: {} shift/reduce conflict(s), {} reduce/reduce conflict(s), {} shift/shift conflict(s)",
                    output.conflicts.shift_reduce, output.conflicts.reduce_reduce, output.conflicts.shift_shift
                );
            }
            exit(output.exit_code());
        }
        Err(e) => {
            eprintln!("lalr1gen: {}", e);
            exit(1);
        }
    }
}
