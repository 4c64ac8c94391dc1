//! Parse XML files into trees and write them back out.

use std::{
    fs::File,
    io::{BufWriter, Write, stdout},
    process::exit,
};

use anyhow::Context;
use clap::Parser;
use exom::{
    builder::Builder,
    serializer::{LineSeparator, Serializer},
};

#[derive(clap::Parser, Debug)]
#[command(
    version,
    name = "exomlint",
    arg_required_else_help = true,
    about = "Parse the XML files and output the result of the parsing."
)]
struct CmdArgs {
    #[clap(required = true)]
    xml_files: Vec<String>,
    /// output in the given encoding
    #[arg(long, value_name = "name", default_value = "UTF-8")]
    encode: String,
    /// indent nested elements by the given number of spaces
    #[arg(long, value_name = "spaces", default_value_t = 0)]
    indent: usize,
    /// wrap lines longer than the given number of characters, 0 for no wrapping
    #[arg(long, value_name = "chars", default_value_t = 0)]
    max_length: usize,
    /// line separator, one of LF, CR or CRLF
    #[arg(long, value_name = "sep")]
    line_separator: Option<LineSeparator>,
    /// normalize the output to Unicode Normalization Form C
    #[arg(long)]
    nfc: bool,
    /// write xml:base attributes where the base URI changes
    #[arg(long)]
    preserve_base: bool,
    /// don't output the result tree
    #[arg(long)]
    noout: bool,
    /// save to a given file
    #[arg(short, long, value_name = "file")]
    output: Option<String>,
}

fn lint(args: &CmdArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let builder = Builder::new();
    for file in &args.xml_files {
        let doc = builder
            .build_file(file)
            .with_context(|| format!("{file} is not well-formed"))?;
        if args.noout {
            continue;
        }

        let mut serializer = Serializer::with_encoding(&mut *out, &args.encode)
            .with_context(|| format!("cannot write {}", args.encode))?;
        serializer.set_indent(args.indent);
        serializer.set_max_length(args.max_length);
        serializer.set_line_separator(args.line_separator);
        serializer.set_unicode_normalization(args.nfc);
        serializer.set_preserve_base_uri(args.preserve_base);
        serializer
            .write_document(&doc)
            .with_context(|| format!("failed to serialize {file}"))?;
    }
    Ok(())
}

fn main() {
    let args = CmdArgs::parse();

    let result = match args.output.as_deref() {
        Some(path) => File::create(path)
            .with_context(|| format!("failed to create {path}"))
            .and_then(|file| {
                let mut out = BufWriter::new(file);
                lint(&args, &mut out)?;
                out.flush()?;
                Ok(())
            }),
        None => {
            let mut out = stdout().lock();
            lint(&args, &mut out)
        }
    };

    if let Err(err) = result {
        eprintln!("exomlint: {err:#}");
        exit(1);
    }
}
