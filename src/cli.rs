//! CLI: schema files → GBNF grammars, and JSON documents → validation report.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::Value;

use json_gbnf::validate::validate_with_defs;
use json_gbnf::{GrammarOptions, JsonSchema, SchemaMap, grammar_for_schema_with_defs};

// ─────────────────────────────────────────────────────────────────────────────
// TYPES
// ─────────────────────────────────────────────────────────────────────────────

/// compile JSON schemas into GBNF grammars for constrained decoding
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    /// log compilation details to stderr (overridden by RUST_LOG)
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// compile each schema into a grammar
    Grammar(GrammarOut),
    /// check JSON documents against a schema
    Validate(ValidateOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// JSON object of shared defs, visible to `$ref` in every schema
    #[arg(long)]
    defs: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct FormatSettings {
    /// keep every grammar on a single line of output
    #[arg(long, default_value_t = false)]
    no_new_lines: bool,

    /// spaces per indentation level
    #[arg(long, default_value_t = 4)]
    pad_spaces: u32,

    /// newlines allowed after the root value
    #[arg(long, default_value_t = 4)]
    trailing_new_lines: usize,
}

#[derive(clap::Parser, Debug)]
struct GrammarOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    format_settings: FormatSettings,

    /// write `<schema stem>.gbnf` files here (stdout if omitted)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(clap::Parser, Debug)]
struct ValidateOut {
    /// schema the documents must satisfy
    #[arg(long, short)]
    schema: PathBuf,

    #[command(flatten)]
    input_settings: InputSettings,

    /// treat each input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,
}

/// One compiled schema.
struct Compiled {
    source_path: PathBuf,
    grammar: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// IMPLEMENTATION
// ─────────────────────────────────────────────────────────────────────────────

impl FormatSettings {
    fn options(&self) -> GrammarOptions {
        GrammarOptions {
            allow_new_lines: !self.no_new_lines,
            scope_pad_spaces: self.pad_spaces,
            trailing_new_lines: self.trailing_new_lines,
        }
    }
}

impl InputSettings {
    fn source_paths(&self) -> Result<Vec<PathBuf>> {
        resolve_file_path_patterns(&self.input).context("failed to resolve input file paths")
    }

    fn load_defs(&self) -> Result<Option<SchemaMap>> {
        let Some(path) = self.defs.as_ref() else {
            return Ok(None);
        };
        let source = read_source(path)?;
        let defs = json_gbnf::path_de::from_str_with_path::<SchemaMap>(&source)
            .with_context(|| format!("failed to parse defs file ({})", path.display()))?;
        Ok(Some(defs))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Grammar(target) => {
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(());
                }
                target.run()
            }
            Command::Validate(target) => target.run(),
        }
    }
}

impl GrammarOut {
    fn run(&self) -> Result<()> {
        let source_paths = self.input_settings.source_paths()?;
        let defs = self.input_settings.load_defs()?;
        let options = self.format_settings.options();

        // Each schema gets its own generator, so compilations share nothing.
        let compiled = source_paths
            .par_iter()
            .map(|source_path| compile_file(source_path, defs.as_ref(), &options))
            .collect::<Result<Vec<_>>>()?;

        match self.out_dir.as_ref() {
            Some(out_dir) => {
                std::fs::create_dir_all(out_dir)
                    .with_context(|| format!("failed to create output directory ({})", out_dir.display()))?;
                for entry in &compiled {
                    let out = out_dir.join(grammar_file_name(&entry.source_path));
                    std::fs::write(&out, &entry.grammar)
                        .with_context(|| format!("failed to write grammar ({})", out.display()))?;
                    eprintln!("{} {}", "wrote".green(), out.display());
                }
            }
            None if compiled.len() == 1 => println!("{}", compiled[0].grammar),
            None => {
                for entry in &compiled {
                    println!("# {}", entry.source_path.display());
                    println!("{}\n", entry.grammar);
                }
            }
        }
        Ok(())
    }
}

impl ValidateOut {
    fn run(&self) -> Result<()> {
        let schema_source = read_source(&self.schema)?;
        let schema = JsonSchema::from_json_str(&schema_source)
            .with_context(|| format!("failed to parse schema ({})", self.schema.display()))?;
        let defs = self.input_settings.load_defs()?;

        let mut checked = 0usize;
        let mut failed = 0usize;
        for source_path in self.input_settings.source_paths()? {
            for (label, document) in self.load_documents(&source_path)? {
                checked += 1;
                let outcome = document
                    .map_err(|err| format!("invalid JSON: {err}"))
                    .and_then(|value| validate_with_defs(&value, &schema, defs.as_ref()).map_err(|err| err.to_string()));
                match outcome {
                    Ok(()) => println!("{} {label}", "✓".green()),
                    Err(message) => {
                        failed += 1;
                        println!("{} {label}: {}", "✗".red(), message);
                    }
                }
            }
        }

        if failed > 0 {
            bail!("{failed} of {checked} documents failed validation");
        }
        Ok(())
    }

    /// Every document in `path`, labelled for the report. With `--ndjson`
    /// each non-blank line is its own document.
    fn load_documents(&self, path: &Path) -> Result<Vec<(String, serde_json::Result<Value>)>> {
        let source = read_source(path)?;
        let label = path.display().to_string();
        if !self.ndjson {
            return Ok(vec![(label, serde_json::from_str(&source))]);
        }
        Ok(source
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| (format!("{label}:{}", index + 1), serde_json::from_str(line)))
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// INTERNAL HELPERS
// ─────────────────────────────────────────────────────────────────────────────

fn compile_file(source_path: &Path, defs: Option<&SchemaMap>, options: &GrammarOptions) -> Result<Compiled> {
    let source = read_source(source_path)?;
    let schema = JsonSchema::from_json_str(&source)
        .with_context(|| format!("failed to parse schema ({})", source_path.display()))?;
    let grammar = grammar_for_schema_with_defs(&schema, defs, options)
        .with_context(|| format!("failed to compile schema ({})", source_path.display()))?;
    tracing::info!(path = %source_path.display(), bytes = grammar.len(), "compiled grammar");
    Ok(Compiled { source_path: source_path.to_path_buf(), grammar })
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read source file ({})", path.display()))
}

fn grammar_file_name(source_path: &Path) -> PathBuf {
    let stem = source_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "schema".into());
    PathBuf::from(format!("{stem}.gbnf"))
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
