use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, WrapErr};

use qm::Session;
use qm::pandoc::{self, Document};

/// Pandoc filter: evaluates math blocks and rewrites them as TeX.
///
/// Reads a pandoc JSON document on stdin, replaces the payload of every
/// InlineMath/DisplayMath node with its evaluation, and writes the
/// document to stdout. Diagnostics go to stderr; a block that fails to
/// parse is replaced by whatever did evaluate, so the filter never
/// aborts the pipeline.
#[derive(Debug, Parser)]
struct Args {
    /// Definitions evaluated before the first math block.
    prelude: PathBuf,
}

fn main() -> miette::Result<()> {
    let args = Args::parse();

    let prelude = fs::read_to_string(&args.prelude)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading `{}` failed", args.prelude.display()))?;

    let mut json = Vec::new();
    io::stdin()
        .read_to_end(&mut json)
        .into_diagnostic()
        .wrap_err("reading stdin failed")?;

    let mut session = Session::new();
    let origin = args.prelude.display().to_string();
    // The prelude produces no document output; only its definitions and
    // diagnostics matter.
    for error in session.run(&prelude, &origin).errors {
        eprintln!("{error}");
    }

    let stdout = io::stdout().lock();
    let mut out = BufWriter::new(stdout);
    let mut document = Document::new(&json);
    while let Some(source) = document
        .next_math_block(&mut out)
        .into_diagnostic()
        .wrap_err("writing stdout failed")?
    {
        let block = session.run(&source, "<math>");
        for error in block.errors {
            eprintln!("{error}");
        }
        out.write_all(b"\"").into_diagnostic()?;
        pandoc::write_escaped(&mut out, block.markup.as_bytes()).into_diagnostic()?;
        out.write_all(b"\"").into_diagnostic()?;
    }
    out.flush().into_diagnostic()?;

    Ok(())
}
