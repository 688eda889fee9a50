//! Invocación de herramientas externas.

use std::{
    io::Read,
    process::{Command, Output, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::debug;

use crate::error::FlashError;

const POLL: Duration = Duration::from_millis(50);

/// Ejecuta un comando hasta que termine y captura su salida.
pub fn run(command: &mut Command) -> Result<Output, FlashError> {
    debug!(command = %describe(command), "running");

    let name = program(command);
    command.output().map_err(|source| FlashError::Spawn { program: name, source })
}

/// Como [`run`], pero mata el proceso si excede `limit`.
///
/// Retorna `None` si se agotó el tiempo.
pub fn run_with_timeout(command: &mut Command, limit: Duration) -> Result<Option<Output>, FlashError> {
    debug!(command = %describe(command), "running with timeout");

    let name = program(command);
    let spawn_error = |source| FlashError::Spawn {
        program: name.clone(),
        source,
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    // Las tuberías se vacían en paralelo para que el hijo no se bloquee
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + limit;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }

            Ok(None) => thread::sleep(POLL),
            Err(source) => return Err(spawn_error(source)),
        }
    };

    Ok(Some(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    }))
}

/// Salida combinada de un proceso, stderr primero.
pub fn combined(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    format!("{}\n{}", stderr.trim(), stdout.trim()).trim().to_owned()
}

/// Reduce la salida de un programador a las líneas que reportan fallos.
///
/// Si ninguna línea parece un error se conservan las últimas.
pub fn error_lines(output: &str) -> String {
    const MARKERS: &[&str] = &["error", "fail", "not ", "can't", "cannot", "timeout", "timed out"];
    const TAIL: usize = 10;

    let lines: Vec<_> = output.lines().map(str::trim_end).filter(|line| !line.is_empty()).collect();
    let errors: Vec<_> = lines
        .iter()
        .filter(|line| {
            let line = line.to_lowercase();
            MARKERS.iter().any(|marker| line.contains(marker))
        })
        .copied()
        .collect();

    if errors.is_empty() {
        lines[lines.len().saturating_sub(TAIL)..].join("\n")
    } else {
        errors.join("\n")
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer);
        buffer
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|handle| handle.join().ok()).unwrap_or_default()
}

fn program(command: &Command) -> String {
    command.get_program().to_string_lossy().into_owned()
}

fn describe(command: &Command) -> String {
    let mut line = program(command);
    for arg in command.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keeps_only_error_bearing_lines() {
        let output = "avrdude: Version 6.3\n\
                      avrdude: stk500_recv(): programmer is not responding\n\
                      reading input file\n\
                      avrdude: stk500_getsync() attempt 10 of 10: not in sync\n";

        assert_eq!(
            error_lines(output),
            "avrdude: stk500_recv(): programmer is not responding\n\
             avrdude: stk500_getsync() attempt 10 of 10: not in sync"
        );
    }

    #[test]
    fn falls_back_to_the_tail() {
        let output: String = (1..=15).map(|n| format!("line {}\n", n)).collect();
        let tail = error_lines(&output);

        assert!(tail.starts_with("line 6\n"));
        assert!(tail.ends_with("line 15"));
    }

    #[test]
    fn missing_programs_are_spawn_errors() {
        let error = run(&mut Command::new("tsuki-flash-no-such-tool")).unwrap_err();
        assert!(matches!(error, FlashError::Spawn { program, .. } if program == "tsuki-flash-no-such-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn slow_programs_time_out() {
        let mut command = Command::new("sleep");
        command.arg("5");

        let output = run_with_timeout(&mut command, Duration::from_millis(100)).unwrap();
        assert!(output.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn fast_programs_report_their_output() {
        let mut command = Command::new("sh");
        command.args(&["-c", "echo out; echo err >&2"]);

        let output = run_with_timeout(&mut command, Duration::from_secs(10)).unwrap().unwrap();
        assert!(output.status.success());
        assert_eq!(combined(&output), "err\nout");
    }
}
