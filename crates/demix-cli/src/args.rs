//! Command line parsing
//!
//! ```text
//! demix <input> [--config PATH] [--output-dir DIR]
//! ```

use std::path::PathBuf;

use crate::error::{CliError, Result};

pub const USAGE: &str = "usage: demix <input> [--config PATH] [--output-dir DIR]";

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub input: PathBuf,
    pub config: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

impl Args {
    /// Parse arguments (without the program name)
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut input = None;
        let mut config = None;
        let mut output_dir = None;

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" | "-c" => config = Some(PathBuf::from(value_for(&arg, iter.next())?)),
                "--output-dir" | "-o" => {
                    output_dir = Some(PathBuf::from(value_for(&arg, iter.next())?))
                }
                flag if flag.starts_with('-') => {
                    return Err(CliError::InvalidArguments(format!(
                        "unknown flag {}\n{}",
                        flag, USAGE
                    )));
                }
                _ if input.is_some() => {
                    return Err(CliError::InvalidArguments(format!(
                        "more than one input given\n{}",
                        USAGE
                    )));
                }
                _ => input = Some(PathBuf::from(&arg)),
            }
        }

        let input = input
            .ok_or_else(|| CliError::InvalidArguments(format!("no input file\n{}", USAGE)))?;

        Ok(Self {
            input,
            config,
            output_dir,
        })
    }
}

fn value_for(flag: &str, value: Option<String>) -> Result<String> {
    value.ok_or_else(|| CliError::InvalidArguments(format!("{} needs a value\n{}", flag, USAGE)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_input_only() {
        let args = parse(&["song.flac"]).unwrap();
        assert_eq!(args.input, PathBuf::from("song.flac"));
        assert!(args.config.is_none());
        assert!(args.output_dir.is_none());
    }

    #[test]
    fn test_all_flags() {
        let args = parse(&["-c", "demix.yaml", "song.wav", "--output-dir", "out"]).unwrap();
        assert_eq!(args.input, PathBuf::from("song.wav"));
        assert_eq!(args.config, Some(PathBuf::from("demix.yaml")));
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["a.wav", "b.wav"]).is_err());
        assert!(parse(&["a.wav", "--config"]).is_err());
        assert!(parse(&["a.wav", "--verbose"]).is_err());
    }
}
