use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::{CommandConfig, LoadedConfig};

const DEFAULT_SHELL: &str = "sh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
}

pub fn commands_from_config(loaded: &LoadedConfig, cwd: &Path) -> Result<Vec<Command>> {
    loaded
        .config
        .commands
        .iter()
        .enumerate()
        .map(|(index, command)| {
            command_from_config(index, command, cwd)
                .with_context(|| format!("invalid command in {}", loaded.path.display()))
        })
        .collect()
}

fn command_from_config(index: usize, command: &CommandConfig, cwd: &Path) -> Result<Command> {
    let label = command.label.trim();
    if label.is_empty() {
        bail!("command #{} has an empty label", index + 1);
    }

    let (program, args) = match (&command.shell, &command.args) {
        (Some(_), Some(_)) => {
            bail!("command '{label}' sets both `shell` and `args`; pick one")
        }
        (Some(snippet), None) => {
            let program = command
                .command
                .clone()
                .filter(|program| !program.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SHELL.to_string());
            (program, vec!["-c".to_string(), snippet.clone()])
        }
        (None, args) => {
            let Some(program) = command
                .command
                .clone()
                .filter(|program| !program.trim().is_empty())
            else {
                bail!("command '{label}' needs either `command` or `shell`");
            };
            (program, args.clone().unwrap_or_default())
        }
    };

    let env = command
        .env
        .iter()
        .map(|entry| parse_env_entry(label, entry))
        .collect::<Result<Vec<_>>>()?;

    let working_dir = command.working_dir.as_ref().map(|raw| {
        let path = PathBuf::from(raw);
        if path.is_absolute() {
            path
        } else {
            cwd.join(path)
        }
    });

    Ok(Command {
        label: label.to_string(),
        program,
        args,
        env,
        working_dir,
    })
}

fn parse_env_entry(label: &str, entry: &str) -> Result<(String, String)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => bail!("command '{label}' has a malformed env entry '{entry}' (expected KEY=VALUE)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn catalog_from(raw: &str) -> Result<Vec<Command>> {
        let config: Config = toml::from_str(raw).unwrap();
        let loaded = LoadedConfig {
            config,
            path: PathBuf::from("/work/frequencmd.toml"),
        };
        commands_from_config(&loaded, Path::new("/work"))
    }

    #[test]
    fn shell_snippet_defaults_to_sh() {
        let commands = catalog_from(
            r#"
[[commands]]
label = "greet"
shell = "echo hi && echo there"
"#,
        )
        .unwrap();
        assert_eq!(commands[0].program, "sh");
        assert_eq!(commands[0].args, vec!["-c", "echo hi && echo there"]);
    }

    #[test]
    fn shell_snippet_honours_explicit_shell() {
        let commands = catalog_from(
            r#"
[[commands]]
label = "greet"
command = "bash"
shell = "echo $BASH_VERSION"
"#,
        )
        .unwrap();
        assert_eq!(commands[0].program, "bash");
        assert_eq!(commands[0].args[0], "-c");
    }

    #[test]
    fn env_entries_split_on_first_equals() {
        let commands = catalog_from(
            r#"
[[commands]]
label = "env"
command = "env"
env = ["A=1", "B=x=y"]
working_dir = "sub"
"#,
        )
        .unwrap();
        assert_eq!(
            commands[0].env,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "x=y".to_string())
            ]
        );
        assert_eq!(commands[0].working_dir, Some(PathBuf::from("/work/sub")));
        assert!(commands[0].args.is_empty());
    }

    #[test]
    fn rejects_malformed_definitions() {
        let missing_program = catalog_from("[[commands]]\nlabel = \"x\"\n").unwrap_err();
        assert!(format!("{missing_program:#}").contains("needs either"));
        assert!(missing_program.to_string().contains("/work/frequencmd.toml"));

        let bad_env =
            catalog_from("[[commands]]\nlabel = \"x\"\ncommand = \"y\"\nenv = [\"NOPE\"]\n")
                .unwrap_err();
        assert!(format!("{bad_env:#}").contains("malformed env"));

        let both = catalog_from(
            "[[commands]]\nlabel = \"x\"\nshell = \"true\"\nargs = \"-v\"\n",
        )
        .unwrap_err();
        assert!(format!("{both:#}").contains("both"));

        let empty_label = catalog_from("[[commands]]\nlabel = \" \"\ncommand = \"y\"\n").unwrap_err();
        assert!(format!("{empty_label:#}").contains("empty label"));
    }
}
