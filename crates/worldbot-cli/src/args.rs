//! Command-line flags.  Everything else lives in the config file.

use std::path::PathBuf;

use crate::config::{self, Config};

pub const USAGE: &str = "\
Usage: worldbot [OPTIONS]

Options:
  -c, --config <PATH>  Config file (default: ~/.worldbot/config.toml)
  -d, --debug          Debug-level logging
      --simulate       Use the simulated transport instead of UDP
  -h, --help           Print this help";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub debug: bool,
    pub simulate: bool,
    pub help: bool,
}

impl CliArgs {
    /// The config file to read and write.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config::config_path)
    }

    /// Flags win over the config file and the environment.
    pub fn apply(&self, cfg: &mut Config) {
        if self.debug {
            cfg.verbose = true;
        }
        if self.simulate {
            cfg.simulate = true;
        }
    }
}

/// Parse the arguments after the program name.
pub fn parse_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => match args.next() {
                Some(path) if !path.starts_with('-') => parsed.config = Some(PathBuf::from(path)),
                _ => return Err(format!("{arg} requires a path")),
            },
            "-d" | "--debug" => parsed.debug = true,
            "--simulate" => parsed.simulate = true,
            "-h" | "--help" => parsed.help = true,
            other => match other.strip_prefix("--config=") {
                Some(path) if !path.is_empty() => parsed.config = Some(PathBuf::from(path)),
                _ => return Err(format!("unexpected argument {other:?}")),
            },
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, String> {
        parse_args(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn no_arguments_means_defaults() {
        assert_eq!(parse(&[]).unwrap(), CliArgs::default());
    }

    #[test]
    fn config_path_and_debug() {
        let args = parse(&["--config", "/tmp/bot.toml", "--debug"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/bot.toml")));
        assert!(args.debug);
        assert!(!args.simulate);

        let args = parse(&["--config=alt.toml", "-d", "--simulate"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("alt.toml")));
        assert!(args.debug && args.simulate);

        assert_eq!(parse(&["-c", "x.toml"]).unwrap().config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn missing_path_and_unknown_flags_are_errors() {
        assert!(parse(&["--config"]).unwrap_err().contains("requires a path"));
        assert!(parse(&["--config", "--debug"]).is_err());
        assert!(parse(&["--config="]).is_err());
        assert!(parse(&["--verbose"]).unwrap_err().contains("--verbose"));
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "verbose = false\nremote_port = 9100\n").unwrap();

        let args = parse(&["--config", path.to_str().unwrap(), "--debug"]).unwrap();
        assert_eq!(args.config_path(), path);
        let mut cfg = config::load_from(&args.config_path()).unwrap().unwrap();
        args.apply(&mut cfg);
        assert!(cfg.verbose);
        assert!(!cfg.simulate);
        assert_eq!(cfg.remote_port, 9100);

        assert_eq!(CliArgs::default().config_path(), config::config_path());
    }

    #[test]
    fn help_flag() {
        assert!(parse(&["-h"]).unwrap().help);
        assert!(USAGE.contains("--config <PATH>"));
    }
}
