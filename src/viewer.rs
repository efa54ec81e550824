use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use std::process::Command;

/// Opens the exported image, either with the user's command or with the
/// platform's default viewer.
pub fn open(path: impl AsRef<Path>, user_command: Option<&str>) -> Result<()> {
    let path = path
        .as_ref()
        .to_str()
        .context("Failed to convert export path to a UTF-8 string")?;

    log::debug!("Opening image at path {path}.");

    if let Some(command) = user_command {
        return open_userdefined(path, command);
    }

    match env::consts::OS {
        "linux" | "freebsd" | "openbsd" | "netbsd" => run(Command::new("xdg-open").arg(path), "xdg-open"),
        "macos" => run(Command::new("open").arg(path), "open"),
        "windows" => run(Command::new("cmd").args(["/C", "start", "", path]), "start"),
        os => bail!("Don't know how to open images on {os}; pass --open-command instead."),
    }
}

fn open_userdefined(path: &str, command: &str) -> Result<()> {
    run(
        Command::new("sh").args(["-c", &format!("{command} \"{path}\"")]),
        command,
    )
}

fn run(command: &mut Command, name: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("Failed to run {name}"))?;

    if !output.status.success() {
        bail!(
            "{name} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn user_command_succeeds() -> Result<()> {
        open("card.png", Some("true"))
    }

    #[test]
    fn failing_user_command_is_an_error() {
        assert!(open("card.png", Some("false")).is_err());
    }
}
