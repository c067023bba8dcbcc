//! Command registry and help text.
//!
//! The registry is assembled at load time from the plugins' static command
//! tables, the daemon built-ins, and a couple of client-side commands that
//! only exist for `help` output.

use std::collections::BTreeMap;

use crate::plugins::CommandSpec;

/// A parsed command argument: `<required>` or `[optional]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArg {
    pub value: String,
    pub required: bool,
}

/// Complete information about one command.
#[derive(Debug, Clone)]
pub struct CommandInfo {
    pub name: String,
    pub args: Vec<CommandArg>,
    pub short: String,
    pub detail: String,
    /// `"built-in"`, `"client"`, or the owning plugin's name.
    pub source: String,
}

/// Commands served by the daemon itself, in-band.
pub const BUILTIN_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "help",
        args: "[command]",
        short: "Show available commands or detailed help for a specific command.",
        detail: "Usage:\n  pypr help           List all commands\n  pypr help <command> Show detailed help",
    },
    CommandSpec {
        name: "exit",
        args: "",
        short: "Terminate the pyprland daemon.",
        detail: "",
    },
    CommandSpec {
        name: "version",
        args: "",
        short: "Show the pypr version.",
        detail: "",
    },
    CommandSpec {
        name: "reload",
        args: "",
        short: "Reload the configuration file.",
        detail: "New plugins will be loaded and configuration options will be updated.\nMost plugins will use the new values on the next command invocation.",
    },
    CommandSpec {
        name: "dumpjson",
        args: "",
        short: "Dump the configuration in JSON format (after includes are processed).",
        detail: "",
    },
];

/// Client-only commands, listed in help but never sent to the daemon.
pub const CLIENT_COMMANDS: &[CommandSpec] = &[CommandSpec {
    name: "edit",
    args: "",
    short: "Open the configuration file in $EDITOR, then reload.",
    detail: "Opens the config file in your preferred editor (EDITOR or VISUAL\nenvironment variable, defaults to vi). After the editor closes, the\nconfiguration is reloaded.",
}];

/// Normalize a user-typed command to internal form (dashes to underscores).
#[must_use]
pub fn normalize_command_name(cmd: &str) -> String {
    cmd.replace('-', "_")
}

/// Parse a bracketed argument spec like `"<a|b|c> [name]"`.
#[must_use]
pub fn parse_arg_spec(spec: &str) -> Vec<CommandArg> {
    let mut args = Vec::new();
    let mut chars = spec.chars().peekable();
    while let Some(c) = chars.next() {
        let closing = match c {
            '<' => '>',
            '[' => ']',
            _ => continue,
        };
        let mut value = String::new();
        for inner in chars.by_ref() {
            if inner == closing {
                break;
            }
            value.push(inner);
        }
        if !value.is_empty() {
            args.push(CommandArg {
                value,
                required: closing == '>',
            });
        }
    }
    args
}

fn info_from_spec(spec: &CommandSpec, source: &str) -> CommandInfo {
    CommandInfo {
        name: spec.name.to_string(),
        args: parse_arg_spec(spec.args),
        short: spec.short.to_string(),
        detail: if spec.detail.is_empty() {
            spec.short.to_string()
        } else {
            format!("{}\n\n{}", spec.short, spec.detail)
        },
        source: source.to_string(),
    }
}

/// Registry of every known command, keyed by name.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandInfo>,
}

impl CommandRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::default();
        for spec in BUILTIN_COMMANDS {
            registry.insert(spec, "built-in");
        }
        for spec in CLIENT_COMMANDS {
            registry.insert(spec, "client");
        }
        registry
    }

    pub fn insert(&mut self, spec: &CommandSpec, source: &str) {
        self.commands
            .insert(spec.name.to_string(), info_from_spec(spec, source));
    }

    pub fn register_plugin(&mut self, plugin_name: &str, specs: &[CommandSpec]) {
        for spec in specs {
            self.insert(spec, plugin_name);
        }
    }

    /// Drop every command owned by `plugin_name` (plugin unloaded).
    pub fn unregister_source(&mut self, plugin_name: &str) {
        self.commands.retain(|_, info| info.source != plugin_name);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandInfo> {
        self.commands.get(name)
    }

    /// The `help` listing.
    #[must_use]
    pub fn get_help(&self) -> String {
        let mut out = String::from(
            "Syntax: pypr <command>\n\nCommands are sent to the running daemon; start it separately with pypr-daemon.\n\nAvailable commands:\n",
        );
        for (name, info) in &self.commands {
            let suffix = match info.source.as_str() {
                "built-in" | "client" => String::new(),
                plugin => format!(" [{plugin}]"),
            };
            out.push_str(&format!(" {name:20} {}{suffix}\n", info.short));
        }
        out
    }

    /// Detailed help for one command.
    #[must_use]
    pub fn get_command_help(&self, command: &str) -> String {
        let command = normalize_command_name(command);
        match self.commands.get(&command) {
            Some(info) => {
                let source = match info.source.as_str() {
                    "built-in" | "client" => String::new(),
                    plugin => format!(" [{plugin}]"),
                };
                let args = if info.args.is_empty() {
                    String::new()
                } else {
                    let rendered: Vec<String> = info
                        .args
                        .iter()
                        .map(|a| {
                            if a.required {
                                format!("<{}>", a.value)
                            } else {
                                format!("[{}]", a.value)
                            }
                        })
                        .collect();
                    format!(" {}", rendered.join(" "))
                };
                format!("{command}{args}{source}\n\n{}\n", info.detail)
            }
            None => format!("Unknown command: {command}\nRun 'pypr help' for available commands.\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOO_SPEC: CommandSpec = CommandSpec {
        name: "foo",
        args: "<arg>",
        short: "do foo",
        detail: "",
    };

    #[test]
    fn test_parse_arg_spec() {
        let args = parse_arg_spec("<a|b|c> [name]");
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].value, "a|b|c");
        assert!(args[0].required);
        assert_eq!(args[1].value, "name");
        assert!(!args[1].required);
    }

    #[test]
    fn test_parse_arg_spec_empty() {
        assert!(parse_arg_spec("").is_empty());
    }

    #[test]
    fn test_normalize_command_name() {
        assert_eq!(normalize_command_name("toggle-special"), "toggle_special");
    }

    #[test]
    fn test_help_lists_plugin_command_with_source() {
        let mut registry = CommandRegistry::new();
        registry.register_plugin("testplug", &[FOO_SPEC]);

        let help = registry.get_help();
        assert!(help.contains("foo"));
        assert!(help.contains("do foo [testplug]"), "{help}");
        // Built-ins carry no suffix.
        assert!(help.contains("Reload the configuration file.\n"));
    }

    #[test]
    fn test_command_help_renders_args() {
        let mut registry = CommandRegistry::new();
        registry.register_plugin("scratchpads", &[CommandSpec {
            name: "toggle",
            args: "<name>",
            short: "toggles visibility of a scratchpad",
            detail: "Give the scratchpad name as argument.",
        }]);

        let help = registry.get_command_help("toggle");
        assert!(help.starts_with("toggle <name> [scratchpads]"), "{help}");
        assert!(help.contains("Give the scratchpad name"));
    }

    #[test]
    fn test_command_help_unknown() {
        let registry = CommandRegistry::new();
        assert!(registry.get_command_help("frobnicate").contains("Unknown command"));
    }

    #[test]
    fn test_unregister_source() {
        let mut registry = CommandRegistry::new();
        registry.register_plugin("testplug", &[FOO_SPEC]);
        assert!(registry.get("foo").is_some());
        registry.unregister_source("testplug");
        assert!(registry.get("foo").is_none());
        assert!(registry.get("help").is_some());
    }

    #[test]
    fn test_dash_alias_resolves() {
        let mut registry = CommandRegistry::new();
        registry.register_plugin("p", &[CommandSpec {
            name: "toggle_special",
            args: "",
            short: "x",
            detail: "",
        }]);
        assert!(
            !registry
                .get_command_help("toggle-special")
                .contains("Unknown command")
        );
    }
}
