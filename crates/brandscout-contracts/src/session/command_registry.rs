#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const TEXT_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "vibe",
    action: "set_vibe",
}];

pub(crate) const PATH_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "logo",
    action: "set_logo",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "design",
        action: "design",
    },
    CommandSpec {
        command: "go",
        action: "design",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/vibe <text>",
    "/logo <path.png>",
    "/design",
    "/go",
    "/status",
    "/help",
    "/quit",
];
