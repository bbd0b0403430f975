use std::path::PathBuf;

use super::command_registry::{CommandSpec, NO_ARG_COMMANDS, PATH_ARG_COMMANDS, TEXT_ARG_COMMANDS};

/// One line of session input, resolved to what the form should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Noop,
    /// Empty text resets the field to its default.
    SetVibe(String),
    SetLogo(PathBuf),
    Design,
    Status,
    Help,
    Quit,
    Unknown { command: String, arg: String },
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect::<Vec<String>>()
            .join(" "),
        Err(_) => arg.trim().to_string(),
    }
}

pub fn parse_command(text: &str) -> SessionCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return SessionCommand::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return SessionCommand::SetVibe(raw_trimmed.to_string());
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return SessionCommand::SetVibe(raw_trimmed.to_string());
    }

    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    if find_action(&command, TEXT_ARG_COMMANDS).is_some() {
        return SessionCommand::SetVibe(arg.to_string());
    }

    if find_action(&command, PATH_ARG_COMMANDS).is_some() {
        let path = parse_path_arg(arg);
        if path.is_empty() {
            return SessionCommand::Unknown {
                command,
                arg: String::new(),
            };
        }
        return SessionCommand::SetLogo(PathBuf::from(path));
    }

    match find_action(&command, NO_ARG_COMMANDS) {
        Some("design") => SessionCommand::Design,
        Some("status") => SessionCommand::Status,
        Some("help") => SessionCommand::Help,
        Some("quit") => SessionCommand::Quit,
        _ => SessionCommand::Unknown {
            command,
            arg: arg.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{parse_command, SessionCommand};

    #[test]
    fn blank_lines_are_noop() {
        assert_eq!(parse_command(""), SessionCommand::Noop);
        assert_eq!(parse_command("   \n"), SessionCommand::Noop);
    }

    #[test]
    fn bare_text_sets_vibe() {
        assert_eq!(
            parse_command("  Rustic Coffee Roastery "),
            SessionCommand::SetVibe("Rustic Coffee Roastery".to_string())
        );
    }

    #[test]
    fn vibe_command_keeps_raw_text() {
        assert_eq!(
            parse_command("/vibe Neon \"Tokyo\" Ramen"),
            SessionCommand::SetVibe("Neon \"Tokyo\" Ramen".to_string())
        );
        assert_eq!(parse_command("/vibe"), SessionCommand::SetVibe(String::new()));
    }

    #[test]
    fn logo_command_accepts_quoted_paths() {
        assert_eq!(
            parse_command("/logo \"/tmp/my logo.png\""),
            SessionCommand::SetLogo(PathBuf::from("/tmp/my logo.png"))
        );
        assert_eq!(
            parse_command("/LOGO logo.png"),
            SessionCommand::SetLogo(PathBuf::from("logo.png"))
        );
    }

    #[test]
    fn logo_without_path_is_unknown() {
        assert_eq!(
            parse_command("/logo"),
            SessionCommand::Unknown {
                command: "logo".to_string(),
                arg: String::new(),
            }
        );
    }

    #[test]
    fn trigger_aliases() {
        assert_eq!(parse_command("/design"), SessionCommand::Design);
        assert_eq!(parse_command("/go"), SessionCommand::Design);
        assert_eq!(parse_command("/status"), SessionCommand::Status);
        assert_eq!(parse_command("/help"), SessionCommand::Help);
        assert_eq!(parse_command("/quit"), SessionCommand::Quit);
        assert_eq!(parse_command("/exit"), SessionCommand::Quit);
    }

    #[test]
    fn unknown_command_reports_name_and_arg() {
        assert_eq!(
            parse_command("/magic foo bar"),
            SessionCommand::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string(),
            }
        );
    }
}
