use std::fs;
use std::path::{Path, PathBuf};

use crate::frontend::config::Config;
use crate::infrastructure::init_logging;
use crate::session::Session;
use moonbridge_runtime::MarshalMode;

/// One unit of work, in command-line order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Source given with `-e`
    Code(String),
    /// Script file
    Script(PathBuf),
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub chunks: Vec<Chunk>,
    pub config_path: Option<PathBuf>,
    pub print: Vec<String>,
    pub strict: bool,
    pub log_level: Option<String>,
    pub color: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            config_path: None,
            print: Vec::new(),
            strict: false,
            log_level: None,
            color: true,
        }
    }
}

pub struct Cli {
    config: CliConfig,
}

impl Cli {
    pub fn new(config: CliConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<i32, String> {
        if self.config.chunks.is_empty() {
            return Err("Nothing to run".to_string());
        }

        let mut config = self.load_config()?;
        if let Some(level) = &self.config.log_level {
            config.logging.level = level.clone();
        }
        let log_config = config.logging.to_log_config().map_err(|e| e.to_string())?;
        let _log_guard = init_logging(log_config);

        let session = Session::with_config(&config).map_err(|e| e.to_string())?;
        if self.config.strict {
            session.set_marshal_mode(MarshalMode::Strict);
        }

        let mut failed_chunks = 0;
        for chunk in &self.config.chunks {
            let before = session.failures();
            let outcome = match chunk {
                Chunk::Code(source) => session.eval_chunk(source, "=(command line)"),
                Chunk::Script(path) => self.run_script(&session, path),
            };
            if let Err(e) = outcome {
                self.print_error(&e.to_string());
                failed_chunks += 1;
            } else if session.failures() > before {
                failed_chunks += 1;
            }
        }

        let mut failed_prints = 0;
        for name in &self.config.print {
            match session.get_global(name) {
                Ok(value) => println!("{} = {}", name, value),
                Err(e) => {
                    self.print_error(&format!("{}: {}", name, e));
                    failed_prints += 1;
                }
            }
        }

        match failure_summary(failed_chunks, self.config.chunks.len(), failed_prints) {
            Some(summary) => {
                self.print_error(&summary);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn load_config(&self) -> Result<Config, String> {
        match &self.config.config_path {
            Some(path) => Config::from_file(path).map_err(|e| e.to_string()),
            None => {
                let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
                Config::find_and_load(&cwd)
                    .map(Option::unwrap_or_default)
                    .map_err(|e| e.to_string())
            }
        }
    }

    fn run_script(&self, session: &Session, path: &Path) -> moonbridge_runtime::Result<()> {
        let source = fs::read_to_string(path)?;
        session.eval_chunk(&source, &format!("@{}", path.display()))
    }

    fn print_error(&self, msg: &str) {
        if self.config.color {
            eprintln!("\x1b[31m{}\x1b[0m", msg);
        } else {
            eprintln!("{}", msg);
        }
    }
}

fn plural(count: usize, noun: &str) -> String {
    format!("{} {}{}", count, noun, if count == 1 { "" } else { "s" })
}

/// One-line summary of what went wrong, if anything did
fn failure_summary(failed_chunks: usize, total_chunks: usize, failed_prints: usize) -> Option<String> {
    let mut parts = Vec::new();
    if failed_chunks > 0 {
        parts.push(format!("{} of {} failed", failed_chunks, plural(total_chunks, "chunk")));
    }
    if failed_prints > 0 {
        parts.push(format!("{} could not be read", plural(failed_prints, "printed global")));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

const USAGE: &str = "Usage: moonbridge [OPTIONS] [script]...\n\nOptions:\n  \
     -e CODE          Evaluate a chunk of source\n  \
     --config FILE    Read configuration from FILE\n  \
     --print NAME     Print a global after running\n  \
     --strict         Report unrepresentable values instead of reading them as nil\n  \
     --log-level LVL  trace, debug, info, warn or error\n  \
     --no-color       Disable colored output";

/// Parse an argument list (without the program name)
pub fn parse_args<I>(args: I) -> Result<CliConfig, String>
where
    I: IntoIterator<Item = String>,
{
    let mut config = CliConfig::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .ok_or_else(|| format!("{} requires an argument", flag))
        };
        match arg.as_str() {
            "-e" => config.chunks.push(Chunk::Code(value("-e")?)),
            "--config" => config.config_path = Some(PathBuf::from(value("--config")?)),
            "--print" => config.print.push(value("--print")?),
            "--log-level" => config.log_level = Some(value("--log-level")?),
            "--strict" => config.strict = true,
            "--no-color" => config.color = false,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(format!("Unknown option: {}\n\n{}", flag, USAGE));
            }
            path => config.chunks.push(Chunk::Script(PathBuf::from(path))),
        }
    }

    if config.chunks.is_empty() {
        return Err(USAGE.to_string());
    }

    Ok(config)
}

/// Entry point for CLI binary; returns the process exit code
pub fn cli_main() -> Result<i32, String> {
    let config = parse_args(std::env::args().skip(1))?;
    Cli::new(config).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_chunks_keep_command_line_order() {
        let config = parse_args(args(&["-e", "x = 1", "main.lua", "-e", "y = 2"])).unwrap();
        assert_eq!(
            config.chunks,
            vec![
                Chunk::Code("x = 1".to_string()),
                Chunk::Script(PathBuf::from("main.lua")),
                Chunk::Code("y = 2".to_string()),
            ]
        );
    }

    #[test]
    fn test_options() {
        let config = parse_args(args(&[
            "--strict", "--print", "x", "--log-level", "debug", "--no-color", "-e", "x = 1",
        ]))
        .unwrap();
        assert!(config.strict);
        assert!(!config.color);
        assert_eq!(config.print, vec!["x".to_string()]);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_missing_value_and_unknown_flag() {
        assert!(parse_args(args(&["-e"])).unwrap_err().contains("requires an argument"));
        assert!(parse_args(args(&["--bogus", "a.lua"])).unwrap_err().contains("Unknown option"));
        assert!(parse_args(args(&[])).is_err());
    }

    #[test]
    fn test_run_reports_failures() {
        let config = CliConfig {
            chunks: vec![Chunk::Code("x = 1".to_string()), Chunk::Code("error('no')".to_string())],
            color: false,
            ..CliConfig::default()
        };
        assert_eq!(Cli::new(config).run().unwrap(), 1);
    }

    #[test]
    fn test_failure_summary_separates_prints() {
        assert_eq!(failure_summary(0, 2, 0), None);
        assert_eq!(failure_summary(1, 2, 0).as_deref(), Some("1 of 2 chunks failed"));
        assert_eq!(
            failure_summary(0, 1, 1).as_deref(),
            Some("1 printed global could not be read")
        );
        assert_eq!(
            failure_summary(1, 1, 2).as_deref(),
            Some("1 of 1 chunk failed; 2 printed globals could not be read")
        );
    }

    #[test]
    fn test_unreadable_print_fails_run() {
        let config = CliConfig {
            chunks: vec![Chunk::Code("f = function() end".to_string())],
            print: vec!["f".to_string()],
            strict: true,
            color: false,
            ..CliConfig::default()
        };
        assert_eq!(Cli::new(config).run().unwrap(), 1);
    }
}
