//! Renders a Sensu `CheckConfig` for a check binary from its clap command.
//!
//! Options with a default are wired to an annotation token carrying that default, so the
//! definition works unchanged and can be tuned per entity. Other options are listed as comments.

pub struct CheckDefinition {
    options: Vec<OptionDescription>,
}

pub struct OptionDescription {
    long: String,
    annotation: String,
    description: Option<String>,
    is_flag: bool,
    default_value: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ToSensuCheckError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid executable path")]
    InvalidExecutablePath,
    #[error("error converting to check definition: {0}")]
    CheckDefinitionFromError(#[from] CheckDefinitionFromError),
}

pub const DEFAULT_INTERVAL_SECONDS: u32 = 60;

impl CheckDefinition {
    pub fn to_sensu_check(&self, name: &str, executable: &str) -> String {
        let mut command = executable.to_owned();
        for option in self.options.iter().filter(|o| !o.is_flag) {
            if let Some(default_value) = &option.default_value {
                // the default is a Go template string literal, escaped again for YAML below
                command.push_str(&format!(
                    " --{} {{{{ .annotations.{} | default \"{}\" }}}}",
                    option.long,
                    option.annotation,
                    escape_string(default_value)
                ));
            }
        }
        let command = escape_string(&command);

        let mut out = String::new();
        out.push_str("type: CheckConfig\n");
        out.push_str("api_version: core/v2\n");
        out.push_str("metadata:\n");
        out.push_str(&format!("  name: {name}\n"));
        out.push_str("spec:\n");
        out.push_str(&format!("  command: \"{command}\"\n"));
        out.push_str(&format!("  interval: {DEFAULT_INTERVAL_SECONDS}\n"));
        out.push_str("  publish: true\n");
        out.push_str("  subscriptions: []\n");

        let unset: Vec<_> = self
            .options
            .iter()
            .filter(|o| o.is_flag || o.default_value.is_none())
            .collect();
        if !unset.is_empty() {
            out.push_str("# further options:\n");
            for option in unset {
                match &option.description {
                    Some(description) => {
                        out.push_str(&format!("#   --{}: {}\n", option.long, description))
                    }
                    None => out.push_str(&format!("#   --{}\n", option.long)),
                }
            }
        }

        out
    }
}

fn escape_string(s: &str) -> String {
    ["\\", "\""]
        .iter()
        .fold(s.to_string(), |acc, c| acc.replace(c, &format!("\\{}", c)))
}

#[derive(Debug, thiserror::Error)]
pub enum CheckDefinitionFromError {
    #[error("missing long argument")]
    MissingLongArgument,
}

impl TryFrom<&clap::Command> for CheckDefinition {
    type Error = CheckDefinitionFromError;

    fn try_from(cmd: &clap::Command) -> Result<Self, Self::Error> {
        let mut options = Vec::new();

        for arg in cmd.get_arguments() {
            // clap's generated --help/--version
            if matches!(arg.get_id().as_str(), "help" | "version") {
                continue;
            }

            let long = arg
                .get_long()
                .ok_or(CheckDefinitionFromError::MissingLongArgument)?
                .to_owned();

            let annotation = long.replace('-', "_");
            let description = arg.get_help().map(|s| s.to_string());
            let is_flag = !arg.get_action().takes_values();

            let default_value = arg
                .get_default_values()
                .first()
                .and_then(|v| v.to_str())
                .map(|s| s.to_string());

            options.push(OptionDescription {
                long,
                annotation,
                description,
                is_flag,
                default_value,
            });
        }

        Ok(CheckDefinition { options })
    }
}

/// Prints the Sensu check definition if the GENERATE_CHECK_DEFINITION environment variable is
/// set and exits the process.
pub fn print_check_definition_if_env_and_exit(
    name: &str,
    cmd: &clap::Command,
) -> Result<(), ToSensuCheckError> {
    if std::env::var_os("GENERATE_CHECK_DEFINITION").is_none() {
        return Ok(());
    }

    let definition = CheckDefinition::try_from(cmd)?;
    let executable = std::env::current_exe()?
        .to_str()
        .ok_or(ToSensuCheckError::InvalidExecutablePath)?
        .to_owned();

    println!("{}", definition.to_sensu_check(name, &executable).trim());
    std::process::exit(0);
}
