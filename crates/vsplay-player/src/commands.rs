//! Line-based control from stdin
//!
//! Stands in for the keyboard of a windowed player:
//!
//! ```text
//! left / right     seek -/+ short step
//! down / up        seek -/+ long step
//! s <seconds>      seek by an arbitrary (signed) amount
//! q                quit
//! ```

use std::io::BufRead;
use std::thread::{self, JoinHandle};
use vsplay_core::playback::CommandHandle;

/// A parsed command line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCommand {
    Seek(f64),
    Quit,
}

/// Parse one input line; unknown input yields `None`
pub fn parse_command(line: &str, step: f64, long_step: f64) -> Option<PlayerCommand> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "left" | "h" => PlayerCommand::Seek(-step),
        "right" | "l" => PlayerCommand::Seek(step),
        "down" | "j" => PlayerCommand::Seek(-long_step),
        "up" | "k" => PlayerCommand::Seek(long_step),
        "s" | "seek" => {
            let secs: f64 = words.next()?.parse().ok()?;
            if !secs.is_finite() {
                return None;
            }
            PlayerCommand::Seek(secs)
        }
        "q" | "quit" => PlayerCommand::Quit,
        _ => return None,
    };
    Some(command)
}

/// Forward parsed lines from `input` to the session until quit or EOF
pub fn forward_commands<R: BufRead>(input: R, commands: &CommandHandle, step: f64, long_step: f64) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!("[INPUT] Failed to read command: {}", e);
                break;
            }
        };

        let delivered = match parse_command(&line, step, long_step) {
            Some(PlayerCommand::Seek(secs)) => {
                log::info!("[INPUT] Seek {:+.1}s", secs);
                commands.seek(secs)
            }
            Some(PlayerCommand::Quit) => {
                commands.quit();
                return;
            }
            None => {
                if !line.trim().is_empty() {
                    log::warn!("[INPUT] Unknown command: {:?}", line.trim());
                }
                true
            }
        };

        // Session already gone
        if !delivered {
            return;
        }
    }
}

/// Read commands from stdin on a detached thread
///
/// The thread is never joined: a blocking stdin read cannot be interrupted,
/// and it ends by itself once the session stops accepting commands.
pub fn spawn_stdin_reader(
    commands: CommandHandle,
    step: f64,
    long_step: f64,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("vsplay-input".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            forward_commands(stdin.lock(), &commands, step, long_step);
            log::debug!("[INPUT] Command reader finished");
        })
}
