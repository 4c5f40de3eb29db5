use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use eyre::WrapErr;

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Get a reader for the given path.
///
/// If `-` or if `None`, use stdin, otherwise use the given file
pub fn get_input_reader(input: &Option<PathBuf>) -> eyre::Result<Box<dyn Read>> {
    match input {
        Some(path) if !is_stdio(path) => {
            let file = File::open(path).wrap_err(format!("Failed to open input file: {path:?}"))?;
            Ok(Box::new(file))
        }
        _ => Ok(Box::new(std::io::stdin())),
    }
}

/// Get a writer for the given path.
///
/// If `-` or if `None`, use stdout, otherwise use the given file
///
/// The generated writer is _not_ buffered, because [csv::Writer](https://docs.rs/csv) is buffered
pub fn get_output_writer(output: &Option<PathBuf>) -> eyre::Result<Box<dyn Write>> {
    match output {
        Some(path) if !is_stdio(path) => {
            let file =
                File::create(path).wrap_err(format!("Failed to create output file: {path:?}"))?;
            Ok(Box::new(file))
        }
        _ => Ok(Box::new(std::io::stdout())),
    }
}
