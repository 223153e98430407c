//! What each tray menu item does.

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use super::menu::MenuAction;
use super::TrayEvent;
use crate::config::{self, template};
use crate::dialog;

const PROJECT_PAGE: &str = "https://github.com/ThioJoe/Rainmeter-Webhook-Monitor";

/// Whether the tray message loop should keep running after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOutcome {
    Continue,
    Quit,
}

pub struct MenuActions {
    config_path: PathBuf,
    events: UnboundedSender<TrayEvent>,
}

impl MenuActions {
    pub fn new(config_path: PathBuf, events: UnboundedSender<TrayEvent>) -> Self {
        Self {
            config_path,
            events,
        }
    }

    /// Run `action`. Failures are reported to the user or the log, never
    /// propagated into the window procedure.
    pub fn handle(&self, action: MenuAction) -> MenuOutcome {
        match action {
            MenuAction::OpenConfigFile => {
                self.open_config_file();
                MenuOutcome::Continue
            }
            MenuAction::ReloadConfig => self.request(TrayEvent::Restart),
            MenuAction::CreateTemplate => {
                self.create_template();
                MenuOutcome::Continue
            }
            MenuAction::About => {
                dialog::show_info("About Rainmeter Webhook Monitor", &about_text());
                MenuOutcome::Continue
            }
            MenuAction::Help => {
                dialog::show_info("Rainmeter Webhook Monitor Help", &help_text());
                MenuOutcome::Continue
            }
            MenuAction::Exit => self.request(TrayEvent::Exit),
        }
    }

    fn request(&self, event: TrayEvent) -> MenuOutcome {
        info!(event = ?event, "Tray requested shutdown");
        if self.events.send(event).is_err() {
            warn!("Host is no longer listening for tray events");
        }
        MenuOutcome::Quit
    }

    fn open_config_file(&self) {
        #[cfg(windows)]
        {
            // SE_ERR_NOASSOC
            const NO_ASSOCIATION: u32 = 31;

            match super::win32::shell_open(&self.config_path) {
                Ok(()) => {}
                Err(e) if e.code == NO_ASSOCIATION => {
                    if let Err(e) = std::process::Command::new("notepad.exe")
                        .arg(&self.config_path)
                        .spawn()
                    {
                        error!(error = %e, "Failed to open config file in notepad");
                    }
                }
                Err(e) => {
                    error!(error_code = e.code, path = ?self.config_path, "Failed to open config file")
                }
            }
        }

        #[cfg(not(windows))]
        {
            warn!(path = ?self.config_path, "Opening the config file is only supported on Windows");
        }
    }

    fn create_template(&self) {
        let dir = self
            .config_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(config::paths::app_dir);

        match template::write_template(&dir) {
            Ok(path) => {
                info!(path = ?path, "Template config file created");
                dialog::show_info(
                    "Template Config Created",
                    &format!("Template config file created at: {}", path.display()),
                );
            }
            Err(e) => {
                error!(error = %e, "Template config file not created");
                dialog::show_error(
                    "Error Creating Template Config",
                    &format!("Error: Template config file not created.\n\n{e}"),
                );
            }
        }
    }
}

pub fn about_text() -> String {
    format!(
        "Rainmeter Webhook Monitor\n\n\
         Author: ThioJoe\n\
         Project Page: {PROJECT_PAGE}\n\n\
         Release Version: {}\n",
        env!("CARGO_PKG_VERSION")
    )
}

pub fn help_text() -> String {
    let config_name = config::paths::CONFIG_FILE_NAME;
    format!(
        "How To Use:\n\
         Edit the \"{config_name}\" file to configure how the app will receive and use webhook messages. \
         The {config_name} file should be placed next to the exe.\n\n\
         To generate a new config, click the template option in the tray menu. It will not overwrite an \
         existing file, but be sure to name it {config_name} for it to be used.\n\n\
         In the \"Commands\" section under \"RainmeterSettings\", you can have multiple sets of commands \
         that can run, where each group corresponds to a different parameter that might be sent in the webhook.\n\n\
         When the name you set in \"WebhookParameterToUseAsValue\" appears as a parameter in the webhook message, \
         its value will be passed along in the \"Bang\" command sent to Rainmeter, along with the other \
         command arguments in its group.\n\n\
         Also set the Port and path to the Rainmeter executable accordingly.\n\n\
         Command line:\n\
         \t--debug : Shows a console window with app activity and writes debug logs\n\
         \ttemplate : Creates a template json file"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_exit_requests_shutdown_and_quits_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let actions = MenuActions::new(PathBuf::from("appsettings.json"), tx);

        assert_eq!(actions.handle(MenuAction::Exit), MenuOutcome::Quit);
        assert_eq!(rx.try_recv().unwrap(), TrayEvent::Exit);
    }

    #[test]
    fn test_reload_requests_restart() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let actions = MenuActions::new(PathBuf::from("appsettings.json"), tx);

        assert_eq!(actions.handle(MenuAction::ReloadConfig), MenuOutcome::Quit);
        assert_eq!(rx.try_recv().unwrap(), TrayEvent::Restart);
    }

    #[test]
    fn test_exit_survives_closed_host_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let actions = MenuActions::new(PathBuf::from("appsettings.json"), tx);
        assert_eq!(actions.handle(MenuAction::Exit), MenuOutcome::Quit);
    }

    #[test]
    fn test_help_mentions_config_keys() {
        let help = help_text();
        assert!(help.contains("appsettings.json"));
        assert!(help.contains("WebhookParameterToUseAsValue"));
        assert!(about_text().contains(env!("CARGO_PKG_VERSION")));
    }
}
