//! Command lines handed to the package manager.
//!
//! Only the shape of the invocation lives here; deciding *what* to install
//! is the caller's business.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::requirement::Requirement;

/// A program plus its arguments, ready to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

// Rendered form is what gets persisted as the process command line.
impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(part: &str) -> String {
    if !part.is_empty() && !part.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
        return part.to_string();
    }
    format!("'{}'", part.replace('\'', r"'\''"))
}

/// Composer-style package manager invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageManager {
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Extra flags placed after the subcommand.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_binary() -> String {
    "composer".to_string()
}

fn default_args() -> Vec<String> {
    vec!["--no-interaction".to_string()]
}

impl Default for PackageManager {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            args: default_args(),
            working_dir: None,
        }
    }
}

impl PackageManager {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    /// `<binary> require <args..> <name>[:<constraint>]`
    pub fn install_command(&self, requirement: &Requirement) -> CommandLine {
        self.command("require").arg(requirement.to_string())
    }

    /// `<binary> remove <args..> <name>`
    pub fn uninstall_command(&self, requirement: &Requirement) -> CommandLine {
        self.command("remove").arg(requirement.name())
    }

    fn command(&self, subcommand: &str) -> CommandLine {
        let mut cmd = CommandLine::new(&self.binary)
            .arg(subcommand)
            .args(self.args.iter().cloned());
        if let Some(dir) = &self.working_dir {
            cmd = cmd.current_dir(dir);
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_command_pins_constraint() {
        let pm = PackageManager::default();
        let req = Requirement::new("acme/widget", "^1.0").unwrap();
        let cmd = pm.install_command(&req);
        assert_eq!(cmd.program, "composer");
        assert_eq!(cmd.args, vec!["require", "--no-interaction", "acme/widget:^1.0"]);
        assert_eq!(
            cmd.to_string(),
            "composer require --no-interaction acme/widget:^1.0"
        );
    }

    #[test]
    fn install_command_without_constraint() {
        let pm = PackageManager::default();
        let req = Requirement::unconstrained("acme/widget").unwrap();
        assert_eq!(
            pm.install_command(&req).to_string(),
            "composer require --no-interaction acme/widget"
        );
    }

    #[test]
    fn uninstall_command_ignores_constraint() {
        let pm = PackageManager::with_binary("/usr/local/bin/composer");
        let req = Requirement::new("acme/widget", "^1.0").unwrap();
        let cmd = pm.uninstall_command(&req);
        assert_eq!(
            cmd.to_string(),
            "/usr/local/bin/composer remove --no-interaction acme/widget"
        );
    }

    #[test]
    fn working_dir_is_carried_over() {
        let pm = PackageManager {
            working_dir: Some(PathBuf::from("/srv/app")),
            ..Default::default()
        };
        let req = Requirement::unconstrained("acme/widget").unwrap();
        assert_eq!(
            pm.install_command(&req).working_dir,
            Some(PathBuf::from("/srv/app"))
        );
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let cmd = CommandLine::new("composer").arg("require").arg("acme/widget:>=1.0 <2.0");
        assert_eq!(cmd.to_string(), "composer require 'acme/widget:>=1.0 <2.0'");
    }

    #[test]
    fn deserialize_partial_table() {
        let pm: PackageManager = toml::from_str(r#"binary = "composer2""#).unwrap();
        assert_eq!(pm.binary, "composer2");
        assert_eq!(pm.args, vec!["--no-interaction"]);
        assert!(pm.working_dir.is_none());
    }
}
