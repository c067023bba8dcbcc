//! pypr control client.
//!
//! Sends one command per connection to the daemon's control socket and
//! maps the response onto stable exit codes: 0 success, 1 usage error,
//! 2 environment error, 3 connection error, 4 command error.

use std::process::ExitCode as ProcessExitCode;

use clap::Parser;
use pypr_core::paths::{config_file, control_socket_path};
use pypr_types::{ExitCode, RESPONSE_ERROR, RESPONSE_OK};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// pypr - control the pypr daemon
#[derive(Parser)]
#[command(name = "pypr")]
#[command(about = "Control client for the pypr daemon")]
#[command(version)]
#[command(after_help = "\
Examples:
  pypr toggle term        Toggle the \"term\" scratchpad
  pypr relayout           Recompute the monitor layout
  pypr reload             Reload the configuration
  pypr help               List commands known to the daemon
  pypr edit               Edit the config file, then reload

Keybinding examples (Hyprland):
  bind = SUPER, T, exec, pypr toggle term
  bind = SUPER, Z, exec, pypr zoom
")]
struct Cli {
    /// Command and arguments to send to the daemon
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn run_editor() -> ExitCode {
    let Some(config) = config_file() else {
        eprintln!("Error: cannot determine the configuration directory");
        return ExitCode::EnvError;
    };
    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "vi".to_string());

    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("{editor} \"{}\"", config.display()))
        .status();
    match status {
        Ok(s) if s.success() => ExitCode::Success,
        Ok(_) => ExitCode::CommandError,
        Err(e) => {
            eprintln!("Error: failed to run {editor}: {e}");
            ExitCode::EnvError
        }
    }
}

async fn send_command(command: &str) -> ExitCode {
    let socket = control_socket_path();
    let Ok(mut stream) = UnixStream::connect(&socket).await else {
        eprintln!(
            "Cannot connect to the pypr daemon at {}.\nIs the daemon running? Start it with: pypr-daemon",
            socket.display()
        );
        return ExitCode::ConnectionError;
    };

    let mut payload = command.to_string();
    payload.push('\n');
    if stream.write_all(payload.as_bytes()).await.is_err() {
        return ExitCode::ConnectionError;
    }
    let _ = stream.shutdown().await;

    let mut response = String::new();
    if stream.read_to_string(&mut response).await.is_err() {
        return ExitCode::ConnectionError;
    }

    if let Some(rest) = response.strip_prefix(RESPONSE_ERROR) {
        let message = rest.trim_start_matches(':').trim();
        eprintln!("Error: {message}");
        return ExitCode::CommandError;
    }
    if let Some(rest) = response.strip_prefix(RESPONSE_OK) {
        let body = rest.trim();
        if !body.is_empty() {
            println!("{body}");
        }
        return ExitCode::Success;
    }
    // Legacy responses carry no prefix and mean success.
    let body = response.trim_end();
    if !body.is_empty() {
        println!("{body}");
    }
    ExitCode::Success
}

#[tokio::main]
async fn main() -> ProcessExitCode {
    let cli = Cli::parse();

    if cli.command.is_empty() {
        eprintln!("No command provided. Try: pypr help");
        return ExitCode::UsageError.into();
    }

    if cli.command[0] == "edit" {
        let edit_result = run_editor();
        if edit_result != ExitCode::Success {
            return edit_result.into();
        }
        return send_command("reload").await.into();
    }

    send_command(&cli.command.join(" ")).await.into()
}
