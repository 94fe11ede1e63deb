use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use fml::HeapConfig;

#[derive(Debug, Parser)]
#[clap(name = "fml", version)]
pub struct App {
  #[clap(subcommand)]
  command: Command,
}

#[derive(Clone, Debug, Subcommand)]
#[clap(rename_all = "snake_case")]
pub enum Command {
  /// Parse the source file and directly interpret the AST.
  AstInterpret(InputArgs),
  /// Load a serialized bytecode file and run it.
  BcInterpret(InputArgs),
  /// Parse and compile the source file, writing bytecode to stdout.
  BcCompile(InputArgs),
  /// Parse, compile in memory, and run.
  Run(InputArgs),
}

#[derive(Clone, Debug, Args)]
pub struct InputArgs {
  /// Heap size in MiB.
  #[clap(long = "heap-size", value_name = "SIZE", default_value_t = 200)]
  heap_size: usize,
  /// Append-only heap event log (CSV of timestamp, phase, allocated bytes).
  #[clap(long = "heap-log", value_name = "PATH")]
  heap_log: Option<PathBuf>,
  /// The file to process.
  #[clap(value_name = "FILE")]
  file: PathBuf,
}

impl InputArgs {
  fn heap_config(&self) -> HeapConfig {
    HeapConfig {
      heap_size: self.heap_size * 1024 * 1024,
      heap_log: self.heap_log.clone(),
    }
  }

  fn source(&self) -> anyhow::Result<String> {
    fs::read_to_string(&self.file)
      .with_context(|| format!("failed to read {}", self.file.display()))
  }

  fn bytes(&self) -> anyhow::Result<Vec<u8>> {
    fs::read(&self.file).with_context(|| format!("failed to read {}", self.file.display()))
  }
}

fn main() -> anyhow::Result<()> {
  let app = App::parse();
  let stdout = std::io::stdout();
  let mut stdout = stdout.lock();

  match &app.command {
    Command::AstInterpret(args) => {
      let source = args.source()?;
      fml::ast_interpret(&source, &mut stdout)?;
    }
    Command::BcInterpret(args) => {
      let bytes = args.bytes()?;
      fml::bc_interpret(&bytes, &args.heap_config(), &mut stdout)?;
    }
    Command::BcCompile(args) => {
      let source = args.source()?;
      fml::bc_compile(&source, &mut stdout)?;
      stdout.flush()?;
    }
    Command::Run(args) => {
      let source = args.source()?;
      fml::run(&source, &args.heap_config(), &mut stdout)?;
    }
  }
  Ok(())
}
