//! Turning webhook query parameters into Rainmeter bang commands.
//!
//! Each configured command names the query parameter whose value it forwards.
//! A request runs every command whose parameter is present, in config order.

mod launcher;

pub use launcher::{Launcher, ProcessLauncher};

#[cfg(test)]
pub use launcher::MockLauncher;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{CommandDefinition, Config};
use crate::error::RelayError;

/// Decoded query string of a webhook request.
pub type QueryParams = HashMap<String, String>;

/// Reply text for a request that was relayed.
pub const SUCCESS_MESSAGE: &str = "Finished processing request.";

/// A command whose parameter was found in the request, with that parameter's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedCommand<'a> {
    pub index: usize,
    pub definition: &'a CommandDefinition,
    pub value: &'a str,
}

/// Find the commands triggered by `query`. Every definition must name its
/// parameter, even ones the request does not use.
pub fn match_commands<'a>(
    commands: &'a [CommandDefinition],
    query: &'a QueryParams,
) -> Result<Vec<MatchedCommand<'a>>, RelayError> {
    let mut matched = Vec::new();
    for (idx, definition) in commands.iter().enumerate() {
        let param = definition
            .webhook_parameter_to_use_as_value
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(RelayError::MissingQueryParameterSetting)?;

        if let Some(value) = query.get(param) {
            info!(parameter = param, value = %value, "Matched query parameter in received request");
            matched.push(MatchedCommand {
                index: idx + 1,
                definition,
                value,
            });
        }
    }
    Ok(matched)
}

/// Rainmeter arguments for one matched command, e.g.
/// `!SetOption MeasureText String hello Skin\Main`.
pub fn build_command_args(
    rainmeter_path: Option<&str>,
    matched: &MatchedCommand<'_>,
) -> Result<String, RelayError> {
    let def = matched.definition;
    let non_blank = |v: &Option<String>| v.as_deref().filter(|s| !s.trim().is_empty()).is_some();

    let mut missing = Vec::new();
    if rainmeter_path.filter(|p| !p.trim().is_empty()).is_none() {
        missing.push("RainmeterPath");
    }
    if !non_blank(&def.bang_command) {
        missing.push("BangCommand");
    }
    if !non_blank(&def.measure_name) {
        missing.push("MeasureName");
    }
    if def.option_name.is_none() {
        missing.push("OptionName");
    }
    if !missing.is_empty() {
        return Err(RelayError::MissingSettings {
            index: matched.index,
            missing: missing.join(", "),
        });
    }

    let bang = def.bang_command.as_deref().unwrap_or_default();
    let bang = if bang.starts_with('!') {
        bang.to_string()
    } else {
        format!("!{bang}")
    };

    let args = format!(
        "{} {} {} {} {}",
        bang,
        def.measure_name.as_deref().unwrap_or_default(),
        def.option_name.as_deref().unwrap_or_default(),
        matched.value,
        def.skin_config_name.as_deref().unwrap_or_default(),
    );
    Ok(args.trim_end().to_string())
}

/// Relays webhook requests to Rainmeter.
pub struct Relay {
    rainmeter_path: Option<String>,
    commands: Vec<CommandDefinition>,
    delay: Duration,
    launcher: Arc<dyn Launcher>,
}

impl Relay {
    pub fn new(config: &Config, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            rainmeter_path: config.rainmeter_path().map(str::to_string),
            commands: config.commands().to_vec(),
            delay: config.command_delay(),
            launcher,
        }
    }

    /// Argument strings to send for `query`, without launching anything.
    pub fn plan(&self, query: &QueryParams) -> Result<Vec<String>, RelayError> {
        let matched = match_commands(&self.commands, query)?;
        let args = matched
            .iter()
            .map(|m| build_command_args(self.rainmeter_path.as_deref(), m))
            .collect::<Result<Vec<_>, _>>()?;

        if args.is_empty() {
            return Err(RelayError::NoCommands);
        }
        Ok(args)
    }

    /// Launch every command triggered by `query`, pausing between launches.
    pub async fn relay(&self, query: &QueryParams) -> Result<&'static str, RelayError> {
        let commands = self.plan(query)?;
        let program = self.rainmeter_path.as_deref().unwrap_or_default();
        debug!("Rainmeter commands:\n    {}", commands.join("\n    "));

        for (idx, args) in commands.iter().enumerate() {
            if idx > 0 {
                tokio::time::sleep(self.delay).await;
            }
            self.launcher.launch(program, args).map_err(|e| {
                warn!(error = %e, args = %args, "Failed to start Rainmeter");
                RelayError::Launch(e)
            })?;
        }

        info!(count = commands.len(), "Sent commands to Rainmeter");
        Ok(SUCCESS_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn definition(param: &str, measure: &str) -> CommandDefinition {
        CommandDefinition {
            bang_command: Some("SetOption".into()),
            measure_name: Some(measure.into()),
            skin_config_name: Some(r"Skin\Main".into()),
            webhook_parameter_to_use_as_value: Some(param.into()),
            option_name: Some("String".into()),
        }
    }

    fn query(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn relay_with(commands: Vec<CommandDefinition>, launcher: MockLauncher) -> Relay {
        Relay {
            rainmeter_path: Some(r"C:\Rainmeter\Rainmeter.exe".into()),
            commands,
            delay: Duration::from_millis(1),
            launcher: Arc::new(launcher),
        }
    }

    #[test]
    fn test_only_present_parameters_match() {
        let commands = vec![definition("text", "A"), definition("color", "B")];
        let q = query(&[("color", "red"), ("other", "x")]);

        let matched = match_commands(&commands, &q).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].index, 2);
        assert_eq!(matched[0].value, "red");
    }

    #[test]
    fn test_definition_without_parameter_fails_request() {
        let mut incomplete = definition("", "B");
        incomplete.webhook_parameter_to_use_as_value = None;
        let commands = vec![definition("text", "A"), incomplete];

        let err = match_commands(&commands, &query(&[("text", "hi")])).unwrap_err();
        assert!(matches!(err, RelayError::MissingQueryParameterSetting));
    }

    #[test]
    fn test_args_layout_and_bang_prefix() {
        let def = definition("text", "MeasureText");
        let matched = MatchedCommand {
            index: 1,
            definition: &def,
            value: "hello",
        };
        assert_eq!(
            build_command_args(Some("Rainmeter.exe"), &matched).unwrap(),
            r"!SetOption MeasureText String hello Skin\Main"
        );

        let mut prefixed = def.clone();
        prefixed.bang_command = Some("!SetOption".into());
        prefixed.skin_config_name = None;
        let matched = MatchedCommand {
            definition: &prefixed,
            ..matched
        };
        assert_eq!(
            build_command_args(Some("Rainmeter.exe"), &matched).unwrap(),
            "!SetOption MeasureText String hello"
        );
    }

    #[test]
    fn test_empty_option_and_value_are_allowed() {
        let mut def = definition("text", "M");
        def.option_name = Some(String::new());
        def.skin_config_name = None;
        let matched = MatchedCommand {
            index: 1,
            definition: &def,
            value: "",
        };
        assert_eq!(
            build_command_args(Some("Rainmeter.exe"), &matched).unwrap(),
            "!SetOption M"
        );
    }

    #[test]
    fn test_missing_settings_are_named() {
        let def = CommandDefinition {
            bang_command: Some("  ".into()),
            webhook_parameter_to_use_as_value: Some("text".into()),
            ..CommandDefinition::default()
        };
        let matched = MatchedCommand {
            index: 3,
            definition: &def,
            value: "v",
        };

        match build_command_args(None, &matched).unwrap_err() {
            RelayError::MissingSettings { index, missing } => {
                assert_eq!(index, 3);
                assert_eq!(missing, "RainmeterPath, BangCommand, MeasureName, OptionName");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_match_means_no_commands() {
        let relay = relay_with(vec![definition("text", "A")], MockLauncher::new());
        let err = relay.plan(&query(&[("unrelated", "1")])).unwrap_err();
        assert_eq!(err.to_string(), "No commands to send to Rainmeter.");
    }

    #[tokio::test]
    async fn test_relay_launches_in_config_order() {
        let mut launcher = MockLauncher::new();
        let mut seq = Sequence::new();
        launcher
            .expect_launch()
            .with(
                eq(r"C:\Rainmeter\Rainmeter.exe"),
                eq(r"!SetOption A String hi Skin\Main"),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        launcher
            .expect_launch()
            .with(
                eq(r"C:\Rainmeter\Rainmeter.exe"),
                eq(r"!SetOption B String red Skin\Main"),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let relay = relay_with(
            vec![definition("text", "A"), definition("color", "B")],
            launcher,
        );
        let reply = relay
            .relay(&query(&[("color", "red"), ("text", "hi")]))
            .await
            .unwrap();
        assert_eq!(reply, SUCCESS_MESSAGE);
    }

    #[tokio::test]
    async fn test_launch_failure_stops_request() {
        let mut launcher = MockLauncher::new();
        launcher
            .expect_launch()
            .times(1)
            .returning(|_, _| Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing")));

        let relay = relay_with(
            vec![definition("text", "A"), definition("color", "B")],
            launcher,
        );
        let err = relay
            .relay(&query(&[("color", "red"), ("text", "hi")]))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Error sending command:"));
    }
}
